use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};

use crate::infrastructure::media::DEFAULT_MAX_UPLOAD_BYTES;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// PostgreSQL URL. Without one the server runs on the in-process store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub media_root: PathBuf,
    /// How long a rendered home page is served from cache.
    pub cache_ttl: Duration,
    pub session_ttl_hours: i64,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".into());
        let port = lookup("PORT")
            .unwrap_or_else(|| "8080".into())
            .parse()
            .map_err(|e| anyhow!("invalid PORT: {}", e))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;
        let media_root = PathBuf::from(lookup("MEDIA_ROOT").unwrap_or_else(|| "media".into()));
        let cache_ttl_secs: u64 = lookup("CACHE_TTL_SECS")
            .unwrap_or_else(|| "20".into())
            .parse()
            .context("invalid CACHE_TTL_SECS")?;
        let session_ttl_hours: i64 = lookup("SESSION_TTL_HOURS")
            .unwrap_or_else(|| "24".into())
            .parse()
            .context("invalid SESSION_TTL_HOURS")?;
        if !(1..=24 * 365).contains(&session_ttl_hours) {
            return Err(anyhow!(
                "SESSION_TTL_HOURS must be between 1 and 8760, got {}",
                session_ttl_hours
            ));
        }
        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|| DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse()
            .context("invalid MAX_UPLOAD_BYTES")?;

        Ok(Self {
            host,
            port,
            database_url,
            jwt_secret,
            media_root,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            session_ttl_hours,
            max_upload_bytes,
        })
    }
}
