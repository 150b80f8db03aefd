use anyhow::Context;
use social_server::app::{Services, start_http_server};
use social_server::data::Repositories;
use social_server::data::memory::MemoryStore;
use social_server::infrastructure::config::AppConfig;
use social_server::infrastructure::database::{create_pool, run_migrations};
use social_server::infrastructure::logging::init_logging;
use social_server::infrastructure::media::MediaStorage;
use social_server::infrastructure::security::JwtKeys;
use tracing::warn;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let repos = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url)
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            Repositories::postgres(pool)
        }
        None => {
            warn!("DATABASE_URL not set, data lives in memory and is lost on exit");
            Repositories::in_memory(MemoryStore::new())
        }
    };

    let keys = JwtKeys::new(config.jwt_secret.clone(), config.session_ttl_hours);
    let media = MediaStorage::new(config.media_root.clone())
        .with_max_upload_bytes(config.max_upload_bytes);
    let services = Services::new(repos, keys, media, config.cache_ttl);

    start_http_server(services, &config.host, config.port)
        .await
        .context("HTTP server failed")
}
