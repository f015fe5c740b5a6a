pub mod hybrid;
pub mod poppler;
pub mod quality;

pub use hybrid::{HybridOptions, HybridProcessor, HybridResult, PreviewResult};
pub use poppler::{PageSource, PdfError, PopplerSource};
