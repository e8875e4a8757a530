use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image::codecs::tiff::TiffDecoder;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::ingest::upload::{UploadedFile, MIME_JPEG, MIME_PNG, MIME_WEBP};

pub const TIFF_DECODE_USER_MESSAGE: &str =
    "Không thể xử lý tệp TIF/TIFF. Tệp có thể bị hỏng hoặc có định dạng không được hỗ trợ.";

/// The only mime types a normalized image may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImageMime {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageMime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => MIME_PNG,
            Self::Jpeg => MIME_JPEG,
            Self::Webp => MIME_WEBP,
        }
    }

    pub fn from_content_type(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            MIME_PNG => Some(Self::Png),
            MIME_JPEG => Some(Self::Jpeg),
            MIME_WEBP => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn from_extension(value: &str) -> Option<Self> {
        match value {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedImage {
    pub base64_payload: String,
    pub mime_type: ImageMime,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to decode TIFF '{file_name}': {source}")]
    Decode {
        file_name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("unsupported image type '{content_type}' for '{file_name}'")]
    Unsupported {
        file_name: String,
        content_type: String,
    },
    #[error("normalization task failed: {0}")]
    Task(String),
}

impl NormalizeError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode { .. } => String::from(TIFF_DECODE_USER_MESSAGE),
            Self::Unsupported { file_name, .. } => {
                format!("Định dạng tệp không được hỗ trợ: {file_name}")
            }
            Self::Task(_) => String::from("Không thể xử lý tệp hình ảnh. Vui lòng thử lại."),
        }
    }
}

pub fn normalize(file: &UploadedFile) -> Result<NormalizedImage, NormalizeError> {
    if file.is_tiff() {
        return transcode_tiff_to_png(file);
    }

    let mime_type = ImageMime::from_content_type(file.content_type())
        .or_else(|| {
            file.extension()
                .as_deref()
                .and_then(ImageMime::from_extension)
        })
        .ok_or_else(|| NormalizeError::Unsupported {
            file_name: file.name().to_string(),
            content_type: file.content_type().to_string(),
        })?;

    Ok(NormalizedImage {
        base64_payload: BASE64_STANDARD.encode(file.bytes()),
        mime_type,
    })
}

/// Decodes the first frame only; later pages of a multi-page TIFF are
/// dropped without notice.
fn transcode_tiff_to_png(file: &UploadedFile) -> Result<NormalizedImage, NormalizeError> {
    let decode_error = |source: image::ImageError| {
        warn!(file = file.name(), error = %source, "tiff normalization failed");
        NormalizeError::Decode {
            file_name: file.name().to_string(),
            source,
        }
    };

    let decoder = TiffDecoder::new(Cursor::new(file.bytes())).map_err(decode_error)?;
    let frame = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    let rgba = frame.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(decode_error)?;
    debug!(
        file = file.name(),
        width,
        height,
        png_bytes = png.len(),
        "transcoded tiff to png"
    );

    Ok(NormalizedImage {
        base64_payload: BASE64_STANDARD.encode(png.as_slice()),
        mime_type: ImageMime::Png,
    })
}

/// Normalizes every file concurrently on the blocking pool. Output order
/// follows input order; the first failure rejects the whole batch.
pub async fn normalize_batch(
    files: Vec<UploadedFile>,
) -> Result<Vec<NormalizedImage>, NormalizeError> {
    let count = files.len();
    let mut tasks = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        tasks.spawn_blocking(move || (index, normalize(&file)));
    }

    let mut slots: Vec<Option<NormalizedImage>> = vec![None; count];
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| NormalizeError::Task(e.to_string()))?;
        match result {
            Ok(image) => slots[index] = Some(image),
            Err(error) => {
                tasks.abort_all();
                return Err(error);
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}
