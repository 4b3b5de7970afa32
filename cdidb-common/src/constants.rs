//! Sentinel constants shared across cdidb crates
//!
//! Snapshot rows store enumerated values as small integers. The names here
//! are also the keys used by presentation formats when translating sentinel
//! values to display strings on export.

/// Gender sentinel: male
pub const MALE: i64 = 1;
/// Gender sentinel: female
pub const FEMALE: i64 = 2;
/// Gender sentinel: other
pub const OTHER_GENDER: i64 = 3;

/// Boolean-like sentinel: true (hard_of_hearing, deleted)
pub const EXPLICIT_TRUE: i64 = 1;
/// Boolean-like sentinel: false
pub const EXPLICIT_FALSE: i64 = 0;

/// Word value recorded when a snapshot has no entry for a checklist word
pub const NO_DATA: i64 = -100;

/// Checklist format used when a snapshot's cdi_type cannot be resolved
pub const DEFAULT_CDI_TYPE: &str = "full_english_mcdi";

/// Snapshot metadata table name
pub const SNAPSHOTS_TABLE: &str = "snapshots";
/// Word-level content table name
pub const SNAPSHOT_CONTENT_TABLE: &str = "snapshot_content";

/// Marker character on word tokens that is ignored when comparing identifiers
pub const WORD_MARKER: char = '*';

/// Canonical identifier form of a word token: marker stripped, lowercased.
pub fn canonical_word(token: &str) -> String {
    token
        .chars()
        .filter(|c| *c != WORD_MARKER)
        .collect::<String>()
        .to_lowercase()
}
