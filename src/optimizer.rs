use crate::backtest::backtest_config;
use crate::bar_store::BarStore;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::error::EngineError;
use crate::models::PerformanceRecord;
use crate::param_utils::enumerate_grid;
use anyhow::Result;
use chrono::NaiveDate;
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Champion/challenger promotion rule: the challenger must beat the
/// champion by at least the configured margin. Meeting the margin exactly
/// promotes.
pub fn should_promote(champion: f64, challenger: f64, margin: f64) -> bool {
    champion.is_finite() && challenger.is_finite() && challenger - champion >= margin
}

struct ChallengerTask {
    parameter: String,
    value: f64,
}

struct ChallengerOutcome {
    value: f64,
    metric: Option<f64>,
    skipped: Option<String>,
}

/// Coordinate search over the tunable parameters.
///
/// Parameters are searched one at a time in their configured order, each
/// holding the others at their champion values; a promotion takes effect
/// before the next parameter's search. Within a parameter, the challenger
/// grid is backtested in parallel on a worker pool over a read-only
/// snapshot of the bar history. Promotion itself happens only on the
/// coordinating thread, which is the single writer of the active
/// configuration.
pub struct OptimizationEngine {
    store: Arc<BarStore>,
    macro_scores: Arc<BTreeMap<NaiveDate, f64>>,
    settings: RuntimeSettings,
    cancel: Arc<AtomicBool>,
}

impl OptimizationEngine {
    pub fn new(
        store: Arc<BarStore>,
        macro_scores: Arc<BTreeMap<NaiveDate, f64>>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            store,
            macro_scores,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle a scheduler can use to abandon the run when the bar history
    /// it was started against is superseded. Cancellation discards the
    /// in-flight challengers; the active configuration is never left in a
    /// partial state.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn optimize(&self, config: &mut EngineConfig) -> Result<Vec<PerformanceRecord>> {
        let dates = self.store.dates();
        let window = self.settings.backtest_window_sessions;
        let Some((&to, rest)) = dates.split_last() else {
            warn!("Bar store is empty; nothing to optimize");
            return Ok(Vec::new());
        };
        let from = if rest.len() + 1 > window {
            dates[dates.len() - window]
        } else {
            dates[0]
        };

        let objective = self.settings.objective;
        let margin = self.settings.promotion_margin;
        let started_at_revision = self.store.revision();
        info!(
            "Optimizing {} parameters over {} - {} (objective: {}, margin: {})",
            config.parameters.len(),
            from,
            to,
            objective.label(),
            margin
        );

        let parameter_names: Vec<String> =
            config.parameters.iter().map(|p| p.name.clone()).collect();
        let mut records = Vec::new();

        for parameter in parameter_names {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Optimization cancelled; leaving the active configuration untouched");
                break;
            }
            if self.store.revision() != started_at_revision {
                info!("Bar store was superseded mid-run; abandoning the remaining searches");
                break;
            }

            let champion_metric = match backtest_config(
                &self.store,
                config,
                &self.settings,
                &self.macro_scores,
                from,
                to,
            ) {
                Ok(outcome) => outcome.performance.metric(objective),
                Err(error) => {
                    warn!(
                        "{}",
                        EngineError::OptimizerSkipped {
                            parameter: parameter.clone(),
                            reason: format!("champion cannot be backtested: {}", error),
                        }
                    );
                    break;
                }
            };

            let Some(spec) = config.parameter(&parameter).cloned() else {
                continue;
            };
            let grid = enumerate_grid(&spec);
            if grid.is_empty() {
                continue;
            }

            info!(
                "Searching {} over {} challenger values (champion {}: {:.4})",
                parameter,
                grid.len(),
                objective.label(),
                champion_metric
            );

            let outcomes = self.run_challenger_grid(config, &parameter, &grid, from, to);

            let mut best: Option<(f64, f64)> = None;
            for outcome in &outcomes {
                if let Some(reason) = &outcome.skipped {
                    warn!(
                        "{}",
                        EngineError::OptimizerSkipped {
                            parameter: parameter.clone(),
                            reason: reason.clone(),
                        }
                    );
                    continue;
                }
                let Some(metric) = outcome.metric.filter(|m| m.is_finite()) else {
                    continue;
                };
                if best.map(|(_, m)| metric > m).unwrap_or(true) {
                    best = Some((outcome.value, metric));
                }
            }

            let Some((best_value, best_metric)) = best else {
                info!("No challenger for {} could be backtested", parameter);
                continue;
            };

            let promoted = should_promote(champion_metric, best_metric, margin);
            if promoted {
                config.set_active(&parameter, best_value);
                info!(
                    "Promoted {} = {} ({}: {:.4} over champion {:.4}, margin {})",
                    parameter,
                    best_value,
                    objective.label(),
                    best_metric,
                    champion_metric,
                    margin
                );
            } else {
                config.set_challenger(&parameter, Some(best_value));
                info!(
                    "Champion retained for {} (best challenger {}: {:.4} vs {:.4})",
                    parameter,
                    best_value,
                    best_metric,
                    champion_metric
                );
            }

            records.push(PerformanceRecord {
                parameter: parameter.clone(),
                metric_name: objective.label().to_string(),
                champion_value: champion_metric,
                challenger_value: best_metric,
                challenger_setting: best_value,
                margin,
                promoted,
            });
        }

        Ok(records)
    }

    fn run_challenger_grid(
        &self,
        config: &EngineConfig,
        parameter: &str,
        grid: &[f64],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<ChallengerOutcome> {
        let task_count = grid.len();
        let num_workers = std::cmp::min(task_count, std::cmp::max(1, num_cpus::get()));

        let (tx, rx): (Sender<ChallengerTask>, Receiver<ChallengerTask>) = bounded(task_count);
        let (result_tx, result_rx) = bounded::<ChallengerOutcome>(task_count);

        let base_config = Arc::new(config.clone());
        let mut handles = Vec::new();
        for _ in 0..num_workers {
            let rx = rx.clone();
            let result_tx = result_tx.clone();
            let store = Arc::clone(&self.store);
            let macro_scores = Arc::clone(&self.macro_scores);
            let settings = self.settings.clone();
            let base_config = Arc::clone(&base_config);
            let cancel = Arc::clone(&self.cancel);

            let handle = thread::spawn(move || {
                while let Ok(task) = rx.recv() {
                    if cancel.load(Ordering::Relaxed) {
                        let _ = result_tx.send(ChallengerOutcome {
                            value: task.value,
                            metric: None,
                            skipped: Some("cancelled".to_string()),
                        });
                        continue;
                    }

                    let mut challenger = (*base_config).clone();
                    challenger.set_active(&task.parameter, task.value);
                    challenger.set_challenger(&task.parameter, Some(task.value));

                    let outcome = match backtest_config(
                        &store,
                        &challenger,
                        &settings,
                        &macro_scores,
                        from,
                        to,
                    ) {
                        Ok(result) => ChallengerOutcome {
                            value: task.value,
                            metric: Some(result.performance.metric(settings.objective)),
                            skipped: None,
                        },
                        Err(error) => ChallengerOutcome {
                            value: task.value,
                            metric: None,
                            skipped: Some(error.to_string()),
                        },
                    };

                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }

        for &value in grid {
            let task = ChallengerTask {
                parameter: parameter.to_string(),
                value,
            };
            if tx.send(task).is_err() {
                break;
            }
        }
        drop(tx);
        drop(result_tx);

        let pb = ProgressBar::new(task_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut outcomes = Vec::with_capacity(task_count);
        while let Ok(outcome) = result_rx.recv() {
            outcomes.push(outcome);
            pb.set_position(outcomes.len() as u64);
        }
        pb.finish_and_clear();

        for handle in handles {
            let _ = handle.join();
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;

    #[test]
    fn promotion_requires_the_full_margin() {
        assert!(should_promote(0.10, 0.12, 0.02));
        // Meeting the margin exactly promotes.
        assert!(should_promote(0.10, 0.12, 0.02 - 1e-12));
        assert!(!should_promote(0.10, 0.11, 0.02));
        assert!(!should_promote(f64::NEG_INFINITY, 0.5, 0.02));
        assert!(!should_promote(0.5, f64::NAN, 0.02));
    }

    #[test]
    fn too_little_history_yields_no_records_and_no_mutation() {
        let store = Arc::new(BarStore::from_bars(
            "CC",
            vec![Bar {
                date: "2024-03-04".parse().unwrap(),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000,
                open_interest: 4_000,
                implied_volatility: None,
                net_commercial_position: None,
            }],
        ));

        let mut config = EngineConfig::default();
        let before = config.clone();
        let settings = RuntimeSettings::from_settings_map(&config.settings).unwrap();
        let engine = OptimizationEngine::new(store, Arc::new(BTreeMap::new()), settings);

        let records = engine.optimize(&mut config).unwrap();
        assert!(records.is_empty());
        for (spec, original) in config.parameters.iter().zip(before.parameters.iter()) {
            assert_eq!(spec.active, original.active);
        }
    }

    #[test]
    fn cancellation_stops_before_any_search() {
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar {
                date: "2024-03-04".parse::<chrono::NaiveDate>().unwrap()
                    + chrono::Days::new(i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000,
                open_interest: 4_000,
                implied_volatility: None,
                net_commercial_position: None,
            })
            .collect();
        let store = Arc::new(BarStore::from_bars("CC", bars));
        let mut config = EngineConfig::default();
        let settings = RuntimeSettings::from_settings_map(&config.settings).unwrap();
        let engine = OptimizationEngine::new(store, Arc::new(BTreeMap::new()), settings);

        engine.cancel_flag().store(true, Ordering::Relaxed);
        let records = engine.optimize(&mut config).unwrap();
        assert!(records.is_empty());
    }
}
