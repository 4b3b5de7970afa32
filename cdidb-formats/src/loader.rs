//! Definition file parsing
//!
//! Checklist and presentation bodies are YAML; percentile tables are CSV
//! grids. Parsers validate structural invariants before anything reaches the
//! registry caches.

use crate::model::{ChecklistDetails, PercentileTable};
use cdidb_common::{Error, Result};
use std::collections::HashMap;

/// Parse a checklist format YAML body
pub fn parse_checklist_yaml(body: &str) -> Result<ChecklistDetails> {
    let details: ChecklistDetails = serde_yaml::from_str(body)?;
    Ok(details)
}

/// Parse a presentation format YAML body: a flat string-to-string map
pub fn parse_presentation_yaml(body: &str) -> Result<HashMap<String, String>> {
    let details: HashMap<String, String> = serde_yaml::from_str(body)?;
    Ok(details)
}

/// Parse a percentile table CSV body into its numeric grid.
///
/// Cell (0,0) is a label and reads as 0.0; every other cell must be a
/// number.
pub fn parse_percentile_csv(body: &str) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut values = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = Vec::with_capacity(record.len());
        for (col_index, cell) in record.iter().enumerate() {
            if row_index == 0 && col_index == 0 {
                row.push(0.0);
                continue;
            }
            let parsed: f64 = cell.trim().parse().map_err(|_| {
                Error::FormatDefinition(format!(
                    "percentile table cell ({}, {}) is not numeric: '{}'",
                    row_index, col_index, cell
                ))
            })?;
            row.push(parsed);
        }
        values.push(row);
    }

    if values.is_empty() {
        return Err(Error::FormatDefinition(
            "percentile table file is empty".to_string(),
        ));
    }

    Ok(values)
}

/// Parse and validate a percentile table file into a model value
pub fn build_percentile_table(
    safe_name: &str,
    human_name: &str,
    filename: &str,
    body: &str,
) -> Result<PercentileTable> {
    let table = PercentileTable {
        safe_name: safe_name.to_string(),
        human_name: human_name.to_string(),
        filename: filename.to_string(),
        values: parse_percentile_csv(body)?,
    };
    table.validate()?;
    Ok(table)
}
