//! # cdidb Formats Library
//!
//! Checklist format definitions, percentile lookup tables and presentation
//! formats: models, file loaders, the cached registry, and the percentile
//! engine.

pub mod loader;
pub mod model;
pub mod percentile;
pub mod registry;

pub use model::{
    ChecklistDetails, ChecklistFormat, FormatMetadataRow, PercentileTable, PresentationFormat,
    WordCategory, WordOption,
};
pub use percentile::find_percentile;
pub use registry::FormatRegistry;
