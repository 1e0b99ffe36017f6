use crate::bar_store::BarStore;
use crate::commands::macro_series::load_macro_scores;
use crate::commands::snapshot_file::ensure_snapshot_file;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::models::PerformanceRecord;
use crate::optimizer::OptimizationEngine;
use crate::report::PromotionHistoryEntry;
use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub fn run(
    data_file: &Path,
    config_path: Option<&Path>,
    macro_file: Option<&Path>,
    output_config: Option<&Path>,
    history: Option<&Path>,
) -> Result<()> {
    ensure_snapshot_file(data_file)?;
    let store = Arc::new(BarStore::load_from_file(data_file)?);

    let mut config = match config_path {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    let settings = RuntimeSettings::from_settings_map(&config.settings)?;

    let macro_scores = Arc::new(match macro_file {
        Some(path) => load_macro_scores(path)?,
        None => BTreeMap::new(),
    });

    let engine = OptimizationEngine::new(store, macro_scores, settings);
    let records = engine.optimize(&mut config)?;
    print_records(&records);

    if let Some(path) = output_config {
        config.save_to_file(path)?;
        info!("Wrote updated configuration to {}", path.display());
    }

    if let Some(path) = history {
        let entries: Vec<PromotionHistoryEntry> =
            records.iter().map(PromotionHistoryEntry::from).collect();
        let json = serde_json::to_string_pretty(&entries).context("History encode failed")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write promotion history to {}", path.display()))?;
        info!("Wrote {} promotion records to {}", entries.len(), path.display());
    }

    Ok(())
}

fn print_records(records: &[PerformanceRecord]) {
    let promoted = records.iter().filter(|r| r.promoted).count();
    println!(
        "\n=== PARAMETER SEARCH RESULTS ({} searched, {} promoted) ===\n",
        records.len(),
        promoted
    );

    for record in records {
        println!("Parameter: {}", record.parameter);
        println!("  Metric: {}", record.metric_name);
        println!("  Champion: {:.4}", record.champion_value);
        println!(
            "  Challenger: {:.4} (setting {})",
            record.challenger_value, record.challenger_setting
        );
        println!("  Margin: {}", record.margin);
        println!("  Promoted: {}", record.promoted);
        println!();
    }
}
