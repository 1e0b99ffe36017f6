use crate::bar_store::BarStore;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::error::EngineError;
use crate::performance::{evaluate_decisions, DecisionPerformance};
use crate::pipeline;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Result of replaying the full daily pipeline over a historical window
/// under one candidate configuration.
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub performance: DecisionPerformance,
    pub sessions: usize,
}

/// Replays indicator calculation, normalization, composite scoring and the
/// decision machine over `[from, to]` under `config`, then scores the
/// resulting decision stream against realized closes.
///
/// A window too short to produce an evaluable decision stream is an
/// `InsufficientHistory` error; the optimizer maps that onto a skipped
/// challenger rather than a failed run.
pub fn backtest_config(
    store: &BarStore,
    config: &EngineConfig,
    settings: &RuntimeSettings,
    macro_scores: &BTreeMap<NaiveDate, f64>,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<BacktestOutcome, EngineError> {
    let outcomes = pipeline::run_range(store, config, settings, macro_scores, from, to);

    let closes: BTreeMap<NaiveDate, f64> = outcomes
        .iter()
        .filter_map(|outcome| outcome.bar.as_ref().map(|bar| (bar.date, bar.close)))
        .collect();
    let records: Vec<_> = outcomes.iter().map(|outcome| outcome.record.clone()).collect();

    let sessions = records.len();
    let performance =
        evaluate_decisions(&records, &closes).ok_or_else(|| EngineError::InsufficientHistory {
            indicator: "decision stream".to_string(),
            required: 2,
            available: closes.len(),
        })?;

    Ok(BacktestOutcome {
        performance,
        sessions,
    })
}
