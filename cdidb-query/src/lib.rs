//! # cdidb Query Library
//!
//! Snapshot querying: operand interpreters, the whitelisting filter
//! compiler, the search/delete/restore executor, and the metadata
//! recalculator.

pub mod executor;
pub mod filters;
pub mod interpret;
pub mod recalc;

pub use executor::{run_delete_query, run_search_query};
pub use filters::{compile, Filter, StatementKind};
pub use interpret::{Interpreter, SqlValue};
pub use recalc::{recalculate_snapshots, update_participant_metadata, ParticipantPatch};
