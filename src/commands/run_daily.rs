use crate::bar_store::BarStore;
use crate::commands::macro_series::load_macro_scores;
use crate::commands::snapshot_file::ensure_snapshot_file;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::pipeline;
use crate::report;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub fn run(
    data_file: &Path,
    config_path: Option<&Path>,
    macro_file: Option<&Path>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    output: Option<&Path>,
) -> Result<()> {
    ensure_snapshot_file(data_file)?;
    let store = BarStore::load_from_file(data_file)?;

    let config = match config_path {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    let settings = RuntimeSettings::from_settings_map(&config.settings)?;

    let macro_scores = match macro_file {
        Some(path) => load_macro_scores(path)?,
        None => BTreeMap::new(),
    };

    let first = store
        .first_date()
        .ok_or_else(|| anyhow!("Bar snapshot contains no bars"))?;
    let last = store.last_date().expect("non-empty store has a last date");
    let from = from.unwrap_or(first);
    let to = to.unwrap_or(last);
    if from > to {
        return Err(anyhow!("Range start {} is after range end {}", from, to));
    }

    info!(
        "Running daily pipeline for {} over {} - {}",
        store.commodity(),
        from,
        to
    );
    let outcomes = pipeline::run_range(&store, &config, &settings, &macro_scores, from, to);
    let reports = report::daily_reports(&outcomes, &config, &settings);

    let stale_days = reports.iter().filter(|r| r.stale).count();
    if let Some(status) = report::position_status(&outcomes) {
        info!(
            "Latest session {}: position {} (YTD {:.2}%), {} stale day(s) in range",
            status.date, status.position, status.ytd_performance, stale_days
        );
    }

    let json = serde_json::to_string_pretty(&reports).context("Report encode failed")?;
    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Wrote {} daily reports to {}", reports.len(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
