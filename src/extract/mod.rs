pub mod clean;
pub mod normalize;
pub mod registry;
pub mod router;
pub mod types;

pub use clean::clean_text;
pub use registry::Registry;
pub use router::{ExtractRequest, Router};
pub use types::{
    build_counts, ExtractError, Extractor, ExtractionResult, Job, PageMethod, PageResult,
};
