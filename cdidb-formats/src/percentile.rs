//! Percentile computation
//!
//! Maps a spoken-word count and an age in months to a percentile rank by a
//! monotonic reverse scan over one age column of a lookup table, with linear
//! interpolation between tabulated ranks.

use crate::model::PercentileTable;

/// Cap returned when the word count clears the table's top rank row
const TOP_PERCENTILE: f64 = 99.0;

/// Compute a percentile rank from a lookup table.
///
/// `table` is the raw grid: row 0 holds a label cell then ages-in-months
/// ascending; rows 1.. hold a descending percentile rank followed by the
/// word-count thresholds per age column. `max_words` is the checklist's
/// total word count and anchors the top of the scan; it must be at least
/// `target_words`.
///
/// Ages beyond the table clamp to the nearest age column. The result is in
/// [0, 99] and never NaN.
pub fn find_percentile(
    table: &[Vec<f64>],
    target_words: i64,
    age_months: f64,
    max_words: i64,
) -> f64 {
    // Rank list flanked by zero sentinels so both scan ends interpolate
    let mut percentiles: Vec<f64> = Vec::with_capacity(table.len() + 1);
    percentiles.push(0.0);
    percentiles.extend(table.iter().skip(1).map(|row| row[0]));
    percentiles.push(0.0);

    // Age column, clamped to the table's month range
    let first_month = table[0][1];
    let last_column = table[0].len() - 1;
    let month_index = ((age_months - first_month + 1.0).floor() as i64)
        .clamp(1, last_column as i64) as usize;

    // Word thresholds for that column, anchored by max_words above and zero
    // below
    let mut words: Vec<f64> = Vec::with_capacity(table.len() + 1);
    words.push(max_words as f64);
    words.extend(table.iter().skip(1).map(|row| row[month_index]));
    words.push(0.0);

    // Largest index whose threshold still covers the target
    let target = target_words as f64;
    let mut i = words.len() - 1;
    while words[i] < target && i > 0 {
        i -= 1;
    }

    if i == 0 {
        // Above the top rank row
        return TOP_PERCENTILE;
    }

    let upper_words = words[i];
    let upper_percentile = percentiles[i];
    let lower_words = if i + 1 < words.len() {
        words[i + 1]
    } else {
        upper_words - 1.0
    };
    let lower_percentile = if i + 1 < percentiles.len() {
        percentiles[i + 1]
    } else {
        upper_percentile - 1.0
    };

    let percentile_range = upper_percentile - lower_percentile;
    let words_range = upper_words - lower_words;
    (percentile_range / words_range) * (target - lower_words) + lower_percentile
}

impl PercentileTable {
    /// Engine entry point on a loaded table
    pub fn find_percentile(&self, target_words: i64, age_months: f64, max_words: i64) -> f64 {
        find_percentile(&self.values, target_words, age_months, max_words)
    }
}
