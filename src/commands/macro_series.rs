use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct MacroRow {
    date: NaiveDate,
    score: f64,
}

/// Loads the externally-supplied macroeconomic adjustment series
/// (`date,score` CSV). The engine never computes this term itself.
pub fn load_macro_scores(path: &Path) -> Result<BTreeMap<NaiveDate, f64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open macro series at {}", path.display()))?;

    let mut scores = BTreeMap::new();
    for (row_number, row) in reader.deserialize::<MacroRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid macro series row {}", row_number + 2))?;
        if row.score.is_finite() {
            scores.insert(row.date, row.score);
        }
    }

    info!("Loaded {} macro scores from {}", scores.len(), path.display());
    Ok(scores)
}
