use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_WEBP: &str = "image/webp";
pub const MIME_TIFF: &str = "image/tiff";

pub const ACCEPTED_CONTENT_TYPES: [&str; 4] = [MIME_PNG, MIME_JPEG, MIME_WEBP, MIME_TIFF];

/// One user-selected file. Bytes are shared so selections and analysis
/// batches can hold the same upload without copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    name: String,
    content_type: String,
    bytes: Arc<[u8]>,
}

impl UploadedFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into().trim().to_ascii_lowercase(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Self::new(name, mime_for_path(path), bytes))
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_str()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }

    pub fn is_tiff(&self) -> bool {
        self.content_type == MIME_TIFF || self.has_tiff_extension()
    }

    /// Browsers and CLI callers often hand TIFFs over with an empty or
    /// generic content-type, so the extension alone is enough for them.
    pub fn is_accepted(&self) -> bool {
        ACCEPTED_CONTENT_TYPES.contains(&self.content_type.as_str()) || self.has_tiff_extension()
    }

    fn has_tiff_extension(&self) -> bool {
        matches!(self.extension().as_deref(), Some("tif" | "tiff"))
    }
}

pub fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => String::from(MIME_PNG),
        "jpg" | "jpeg" => String::from(MIME_JPEG),
        "webp" => String::from(MIME_WEBP),
        "tif" | "tiff" => String::from(MIME_TIFF),
        "pdf" => String::from("application/pdf"),
        "txt" => String::from("text/plain"),
        _ => String::from("application/octet-stream"),
    }
}
