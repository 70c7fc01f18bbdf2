use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use rand::distributions::Alphanumeric;
use rand::Rng;
use time::OffsetDateTime;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infra::storage::BlobStore;

const ACCEPTED_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// An image picked by the user, before validation and compression.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePolicy {
    pub max_width: u32,
    pub quality: u8,
    pub max_bytes: usize,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            max_width: 1200,
            quality: 80,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

pub fn validate_image(upload: &ImageUpload, policy: &ImagePolicy) -> AppResult<()> {
    if !ACCEPTED_TYPES.contains(&upload.content_type.as_str()) {
        return Err(AppError::validation(
            "unsupported image format, use JPG, PNG or WebP",
        ));
    }
    if upload.bytes.len() > policy.max_bytes {
        return Err(AppError::validation(format!(
            "image is too large (max {}MB)",
            policy.max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Shrink to at most `max_width` pixels wide, keeping the aspect ratio, and
/// re-encode as JPEG at the policy quality.
pub fn compress_image(bytes: &[u8], policy: &ImagePolicy) -> AppResult<Bytes> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| AppError::validation(format!("could not read image: {}", err)))?;

    let (width, height) = image.dimensions();
    let image = if width > policy.max_width {
        let scaled_height = ((height as u64 * policy.max_width as u64) / width as u64).max(1);
        image.resize_exact(policy.max_width, scaled_height as u32, FilterType::Triangle)
    } else {
        image
    };

    let mut encoded = Vec::new();
    image
        .to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, policy.quality))
        .map_err(|err| AppError::Remote(anyhow::anyhow!("failed to encode image: {}", err)))?;

    Ok(Bytes::from(encoded))
}

/// Validate, compress and upload under `<prefix>/<millis>_<random>.jpg`.
pub async fn upload_image(
    blobs: &dyn BlobStore,
    policy: &ImagePolicy,
    prefix: &str,
    upload: ImageUpload,
) -> AppResult<String> {
    validate_image(&upload, policy)?;
    let compressed = compress_image(&upload.bytes, policy)?;

    let path = format!("{}/{}", prefix, object_name());
    let size = compressed.len();
    let url = blobs.upload(&path, compressed, "image/jpeg").await?;

    info!(path = %path, bytes = size, "image uploaded");
    Ok(url)
}

fn object_name() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}_{}.jpg", millis, suffix)
}
