//! Database schema, models and snapshot persistence

pub mod init;
pub mod models;
pub mod snapshots;

pub use init::*;
pub use models::*;
pub use snapshots::*;
