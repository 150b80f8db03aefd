//! Uploaded images: validation and on-disk storage under the media root.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use image::{ImageError, ImageFormat, ImageReader, Limits};
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::error::DomainError;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub const INVALID_IMAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Raw file from a form submission.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Widest or tallest image accepted, in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 4096;

/// Upper bound on what a single decode may allocate.
const MAX_DECODE_ALLOC: u64 = 64 * 1024 * 1024;

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Detects the format from the content and makes sure it fully decodes
/// within [`MAX_IMAGE_DIMENSION`] and the allocation limit.
pub fn inspect_image(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    let format = image::guess_format(bytes)?;
    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(decode_limits());
    reader.decode()?;
    Ok(format)
}

/// Runs [`inspect_image`] on the blocking pool and hands the bytes back.
pub async fn inspect_upload(
    bytes: Vec<u8>,
) -> Result<(Vec<u8>, Result<ImageFormat, ImageError>), DomainError> {
    tokio::task::spawn_blocking(move || {
        let inspected = inspect_image(&bytes);
        (bytes, inspected)
    })
    .await
    .map_err(|e| {
        error!("image inspection task failed: {}", e);
        DomainError::Internal(e.to_string())
    })
}

#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    max_upload_bytes: usize,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Largest accepted size of a single form field, uploads included.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Writes an already inspected image and returns its path relative to the root.
    pub async fn save(&self, bytes: &[u8], format: ImageFormat) -> Result<String, DomainError> {
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let relative = format!("posts/{}.{}", Uuid::new_v4(), extension);
        let path = self.root.join(&relative);

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                error!("failed to create media dir {}: {}", dir.display(), e);
                DomainError::Internal(e.to_string())
            })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("failed to write {}: {}", path.display(), e);
            DomainError::Internal(e.to_string())
        })?;

        info!(path = %relative, size = bytes.len(), "image stored");
        Ok(relative)
    }

    /// Maps a relative media path onto the root, refusing anything that could
    /// escape it.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let candidate = Path::new(relative);
        if relative.is_empty()
            || !candidate
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(candidate))
    }

    /// File contents and MIME type, or `None` if there is no such image.
    pub async fn read(&self, relative: &str) -> Result<Option<(Vec<u8>, &'static str)>, DomainError> {
        let Some(path) = self.resolve(relative) else {
            return Ok(None);
        };
        let Ok(format) = ImageFormat::from_path(&path) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some((bytes, format.to_mime_type()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("failed to read {}: {}", path.display(), e);
                Err(DomainError::Internal(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::from_pixel(2, 2, image::Rgb([200, 30, 30]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_real_png() {
        assert_eq!(inspect_image(&sample_png()).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn rejects_text_and_truncated_images() {
        assert!(inspect_image(b"just some text").is_err());
        let png = sample_png();
        assert!(inspect_image(&png[..png.len() / 2]).is_err());
    }

    #[test]
    fn rejects_images_beyond_the_dimension_limit() {
        let mut bytes = Vec::new();
        image::GrayImage::new(MAX_IMAGE_DIMENSION + 1, 1)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        assert!(matches!(
            inspect_image(&bytes),
            Err(ImageError::Limits(_))
        ));
    }

    #[tokio::test]
    async fn upload_inspection_returns_the_bytes() {
        let png = sample_png();
        let (bytes, inspected) = inspect_upload(png.clone()).await.unwrap();
        assert_eq!(bytes, png);
        assert_eq!(inspected.unwrap(), ImageFormat::Png);
    }

    #[test]
    fn resolve_stays_inside_root() {
        let storage = MediaStorage::new("/srv/media");
        assert_eq!(
            storage.resolve("posts/a.png"),
            Some(PathBuf::from("/srv/media/posts/a.png"))
        );
        assert_eq!(storage.resolve("../etc/passwd"), None);
        assert_eq!(storage.resolve("/etc/passwd"), None);
        assert_eq!(storage.resolve(""), None);
    }

    #[tokio::test]
    async fn saved_images_can_be_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        let png = sample_png();

        let relative = storage.save(&png, ImageFormat::Png).await.unwrap();
        assert!(relative.starts_with("posts/"));
        assert!(relative.ends_with(".png"));

        let (bytes, mime) = storage.read(&relative).await.unwrap().unwrap();
        assert_eq!(bytes, png);
        assert_eq!(mime, "image/png");
        assert!(storage.read("posts/missing.png").await.unwrap().is_none());
    }
}
