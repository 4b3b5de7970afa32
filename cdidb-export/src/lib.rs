//! # cdidb Export Library
//!
//! Serializes snapshot sets back to researchers: one consolidated
//! column-major CSV, or a ZIP archive with one CSV member per study.

pub mod archive;
pub mod consolidated;

pub use archive::{export_archive, render_archive};
pub use consolidated::{
    export_consolidated, render_consolidated, sort_snapshots, ExportSnapshot,
    METADATA_HEADER_LABELS,
};
