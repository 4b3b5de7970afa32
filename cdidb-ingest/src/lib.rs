//! # cdidb Ingest Library
//!
//! Batch ingest of spreadsheet-shaped snapshot data: the column-major
//! parsing automaton, the typed record builder with explicit deferred
//! fields, the reconciliation layer that re-derives computed values, and
//! the single-transaction persistence pipeline.

pub mod automaton;
pub mod builder;
pub mod pipeline;
pub mod reconcile;
pub mod values;

pub use automaton::Automaton;
pub use builder::{ParsedRecord, Provided};
pub use pipeline::{run_ingest, IngestOutcome};
pub use reconcile::{reconcile_record, ReconciledRecord};
