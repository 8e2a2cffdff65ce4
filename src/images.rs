//! Capture-side image preparation: bound the dimensions, re-encode, and
//! base64 the result for the provider request.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use log::debug;

use crate::config::ImageConfig;
use crate::error::ScanError;

/// Where a captured photo comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// File on local storage
    Path(PathBuf),
    /// Already-encoded image bytes, optionally as a `data:` URL
    Base64(String),
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        ImageSource::Path(path.into())
    }

    /// Whether the prepared upload should stay PNG. Files go by extension,
    /// raw bytes by their signature.
    fn wants_png(&self, bytes: &[u8]) -> bool {
        match self {
            ImageSource::Path(path) => mime_type_for(path) == "image/png",
            ImageSource::Base64(_) => image::guess_format(bytes).ok() == Some(ImageFormat::Png),
        }
    }

    /// Human-readable label for logs and session state
    pub fn label(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Base64(data) => format!("<base64 {} chars>", data.len()),
        }
    }
}

/// A photo ready to upload
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub base64: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    /// Size of the encoded bytes, before base64
    pub size_bytes: u64,
}

/// Mime type from a file extension, JPEG when unrecognized
pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

async fn read_source(source: &ImageSource) -> Result<Vec<u8>, ScanError> {
    match source {
        ImageSource::Path(path) => tokio::fs::read(path).await.map_err(|e| {
            ScanError::api(format!("Failed to read image '{}': {e}", path.display()))
        }),
        ImageSource::Base64(data) => {
            let payload = match data.split_once(";base64,") {
                Some((_, rest)) => rest,
                None => data.as_str(),
            };
            STANDARD
                .decode(payload.trim())
                .map_err(|e| ScanError::api(format!("Invalid base64 image data: {e}")))
        }
    }
}

fn fit_within(image: DynamicImage, config: &ImageConfig) -> DynamicImage {
    if image.width() <= config.max_width && image.height() <= config.max_height {
        return image;
    }
    // resize keeps the aspect ratio and fits inside the box
    image.resize(config.max_width, config.max_height, FilterType::Triangle)
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Decode, bound and re-encode as PNG or JPEG
fn encode(bytes: &[u8], as_png: bool, config: &ImageConfig) -> Result<PreparedImage, ScanError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ScanError::api(format!("Failed to decode image: {e}")))?;
    let resized = fit_within(decoded, config);

    let mut out = Vec::new();
    let mime_type = if as_png {
        resized
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| ScanError::api(format!("Failed to encode PNG: {e}")))?;
        "image/png"
    } else {
        let rgb = resized.to_rgb8();
        JpegEncoder::new_with_quality(&mut out, jpeg_quality(config.quality))
            .encode_image(&rgb)
            .map_err(|e| ScanError::api(format!("Failed to encode JPEG: {e}")))?;
        "image/jpeg"
    };

    let size_bytes = out.len() as u64;
    let max_bytes = config.max_size_bytes();
    if size_bytes > max_bytes {
        return Err(ScanError::ImageTooLarge {
            size_bytes,
            max_bytes,
        });
    }

    Ok(PreparedImage {
        base64: STANDARD.encode(&out),
        mime_type,
        width: resized.width(),
        height: resized.height(),
        size_bytes,
    })
}

/// Prepare a single photo for upload.
///
/// Fails with [`ScanError::ImageTooLarge`] if the encoded output is still over
/// the configured ceiling.
pub async fn prepare_image(
    source: &ImageSource,
    config: &ImageConfig,
) -> Result<PreparedImage, ScanError> {
    let bytes = read_source(source).await?;
    let as_png = source.wants_png(&bytes);
    let config = config.clone();

    let prepared = tokio::task::spawn_blocking(move || encode(&bytes, as_png, &config))
        .await
        .map_err(|e| ScanError::api(format!("Image task failed: {e}")))??;

    debug!(
        "Prepared {} as {} {}x{} ({} bytes)",
        source.label(),
        prepared.mime_type,
        prepared.width,
        prepared.height,
        prepared.size_bytes
    );
    Ok(prepared)
}

/// Prepare several photos in order, stopping at the first failure
pub async fn prepare_images(
    sources: &[ImageSource],
    config: &ImageConfig,
) -> Result<Vec<PreparedImage>, ScanError> {
    let mut prepared = Vec::with_capacity(sources.len());
    for source in sources {
        prepared.push(prepare_image(source, config).await?);
    }
    Ok(prepared)
}
