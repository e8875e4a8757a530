use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};

use crate::ingest::upload::UploadedFile;

pub const TIFF_PLACEHOLDER: &str = "data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 384 512' fill='%239ca3af'%3E%3Cpath d='M369.9 97.9L286 14C277 5 264.8-.1 252.1-.1H48C21.5 0 0 21.5 0 48v416c0 26.5 21.5 48 48 48h288c26.5 0 48-21.5 48-48V131.9c0-12.7-5.1-25-14.1-34zM332.1 128H256V51.9l76.1 76.1zM48 464V48h160v104c0 13.3 10.7 24 24 24h104v288H48z'/%3E%3C/svg%3E";

/// Thumbnail source for the selection grid. Never sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    DataUrl(String),
    Placeholder,
}

impl Preview {
    pub fn as_src(&self) -> &str {
        match self {
            Self::DataUrl(url) => url.as_str(),
            Self::Placeholder => TIFF_PLACEHOLDER,
        }
    }
}

impl Serialize for Preview {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_src())
    }
}

pub fn build_preview(file: &UploadedFile) -> Preview {
    if file.is_tiff() {
        return Preview::Placeholder;
    }
    Preview::DataUrl(format!(
        "data:{};base64,{}",
        file.content_type(),
        BASE64_STANDARD.encode(file.bytes())
    ))
}
