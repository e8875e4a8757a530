pub mod normalize;
pub mod preview;
pub mod selection;
pub mod upload;

pub use normalize::{normalize, normalize_batch, ImageMime, NormalizeError, NormalizedImage};
pub use preview::{build_preview, Preview};
pub use selection::{SelectedFile, Selection, SelectionManager};
pub use upload::UploadedFile;
