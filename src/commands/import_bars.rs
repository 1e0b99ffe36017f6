use crate::bar_store::BarStore;
use crate::models::{Bar, RawField};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CsvBarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    open_interest: i64,
    #[serde(default)]
    implied_volatility: Option<String>,
    #[serde(default)]
    net_commercial_position: Option<String>,
}

/// Builds a bar snapshot from a daily-bar CSV export. Numeric-looking text
/// in the auxiliary columns becomes a number; anything else is preserved
/// verbatim as unparseable rather than silently imported as zero.
pub fn run(commodity: &str, csv_path: &Path, output: &Path) -> Result<()> {
    info!(
        "Importing {} bars from {}",
        commodity,
        csv_path.display()
    );

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open bar CSV at {}", csv_path.display()))?;

    let mut store = BarStore::new(commodity);
    let mut unparseable_cells = 0usize;

    for (row_number, row) in reader.deserialize::<CsvBarRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid bar CSV row {}", row_number + 2))?;

        if !(row.open.is_finite()
            && row.high.is_finite()
            && row.low.is_finite()
            && row.close.is_finite())
        {
            return Err(anyhow!(
                "Bar CSV row {} contains non-finite prices",
                row_number + 2
            ));
        }

        let implied_volatility = row
            .implied_volatility
            .as_deref()
            .and_then(RawField::parse);
        let net_commercial_position = row
            .net_commercial_position
            .as_deref()
            .and_then(RawField::parse);
        for field in [&implied_volatility, &net_commercial_position]
            .into_iter()
            .flatten()
        {
            if matches!(field, RawField::Unparseable(_)) {
                unparseable_cells += 1;
            }
        }

        store.insert(Bar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            open_interest: row.open_interest,
            implied_volatility,
            net_commercial_position,
        });
    }

    if store.is_empty() {
        return Err(anyhow!("Bar CSV at {} contained no rows", csv_path.display()));
    }
    if unparseable_cells > 0 {
        warn!(
            "{} auxiliary cells could not be parsed as numbers and were kept as text",
            unparseable_cells
        );
    }

    store.save_to_file(output)?;
    info!(
        "Imported {} bars ({} - {})",
        store.len(),
        store.first_date().expect("store is non-empty"),
        store.last_date().expect("store is non-empty")
    );
    Ok(())
}
