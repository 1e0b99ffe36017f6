use crate::bar_store::BarStore;
use crate::composite;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::decision::DecisionEngine;
use crate::error::EngineError;
use crate::indicators::{self, value_at};
use crate::models::{self, Bar, CompositeScore, IndicatorSnapshot, PositionRecord};
use crate::normalize::{classify, normalize};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use log::warn;
use std::collections::BTreeMap;

/// Everything the engine produced for one session: the per-indicator
/// snapshots, auxiliary technical series for display, the composite score
/// and the emitted position record.
#[derive(Debug, Clone)]
pub struct DayOutcome {
    pub date: NaiveDate,
    pub bar: Option<Bar>,
    pub snapshots: BTreeMap<String, IndicatorSnapshot>,
    pub technicals: BTreeMap<String, f64>,
    pub composite: Option<CompositeScore>,
    pub record: PositionRecord,
}

/// Trading sessions between two dates, inclusive: weekdays only. A weekday
/// without a canonical bar is a Bar Store gap, not a non-session.
pub fn sessions_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut sessions = Vec::new();
    let mut current = from;
    while current <= to {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            sessions.push(current);
        }
        match current.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    sessions
}

struct SeriesBundle {
    dates: Vec<NaiveDate>,
    rsi: Vec<f64>,
    macd: Vec<f64>,
    macd_signal: Vec<f64>,
    percent_k: Vec<f64>,
    percent_d: Vec<f64>,
    atr: Vec<f64>,
    close_pivot: Vec<f64>,
    vol_oi: Vec<f64>,
    ema_fast: Vec<f64>,
    ema_slow: Vec<f64>,
    bollinger: indicators::BollingerSeries,
}

impl SeriesBundle {
    fn compute(bars: &[&Bar], config: &EngineConfig) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

        let rsi_period = config.param_value("rsi_period", 14.0).round() as usize;
        let macd_fast = config.param_value("macd_fast_period", 12.0).round() as usize;
        let macd_slow = config.param_value("macd_slow_period", 26.0).round() as usize;
        let macd_signal = config.param_value("macd_signal_period", 9.0).round() as usize;
        let stoch_period = config.param_value("stochastic_period", 14.0).round() as usize;
        let stoch_smoothing = config.param_value("stochastic_smoothing", 3.0).round() as usize;
        let atr_period = config.param_value("atr_period", 14.0).round() as usize;
        let bollinger_period = config.param_value("bollinger_period", 20.0).round() as usize;
        let bollinger_multiplier = config.param_value("bollinger_multiplier", 2.0);

        let macd_series = indicators::calculate_macd(&closes, macd_fast, macd_slow, macd_signal);
        let stochastic =
            indicators::calculate_stochastic(&highs, &lows, &closes, stoch_period, stoch_smoothing);

        Self {
            dates: bars.iter().map(|b| b.date).collect(),
            rsi: indicators::calculate_rsi(&closes, rsi_period),
            macd: macd_series.macd,
            macd_signal: macd_series.signal,
            percent_k: stochastic.percent_k,
            percent_d: stochastic.percent_d,
            atr: indicators::calculate_atr(&highs, &lows, &closes, atr_period),
            close_pivot: indicators::calculate_close_pivot(bars),
            vol_oi: indicators::calculate_vol_oi(bars),
            ema_fast: indicators::calculate_ema(&closes, macd_fast),
            ema_slow: indicators::calculate_ema(&closes, macd_slow),
            bollinger: indicators::calculate_bollinger(
                &closes,
                bollinger_period,
                bollinger_multiplier,
            ),
        }
    }

    fn raw_value(&self, name: &str, index: usize) -> Option<f64> {
        match name {
            models::RSI => value_at(&self.rsi, index),
            models::MACD => value_at(&self.macd, index),
            models::STOCHASTIC_K => value_at(&self.percent_k, index),
            models::ATR => value_at(&self.atr, index),
            models::CLOSE_PIVOT => value_at(&self.close_pivot, index),
            models::VOL_OI => value_at(&self.vol_oi, index),
            _ => None,
        }
    }

    fn technicals_at(&self, bars: &[&Bar], index: usize) -> BTreeMap<String, f64> {
        let mut technicals = BTreeMap::new();
        let mut put = |key: &str, value: Option<f64>| {
            if let Some(value) = value {
                technicals.insert(key.to_string(), value);
            }
        };

        put("EMA_FAST", value_at(&self.ema_fast, index));
        put("EMA_SLOW", value_at(&self.ema_slow, index));
        put("MACD_SIGNAL", value_at(&self.macd_signal, index));
        put("%D", value_at(&self.percent_d, index));
        put("BOLLINGER_MID", value_at(&self.bollinger.middle, index));
        put("BOLLINGER_UPPER", value_at(&self.bollinger.upper, index));
        put("BOLLINGER_LOWER", value_at(&self.bollinger.lower, index));
        put("BOLLINGER_WIDTH", value_at(&self.bollinger.width, index));

        if index > 0 {
            let levels = indicators::pivot_levels(bars[index - 1]);
            technicals.insert("PIVOT".to_string(), levels.pivot);
            technicals.insert("R1".to_string(), levels.r1);
            technicals.insert("R2".to_string(), levels.r2);
            technicals.insert("R3".to_string(), levels.r3);
            technicals.insert("S1".to_string(), levels.s1);
            technicals.insert("S2".to_string(), levels.s2);
            technicals.insert("S3".to_string(), levels.s3);
        }

        technicals
    }
}

/// Runs the daily pipeline over every session in `[from, to]`.
///
/// The run is deterministic and idempotent: identical bar history, macro
/// series and configuration reproduce identical outcomes. Sessions whose
/// bar is missing, or whose composite cannot be computed yet, hold the
/// previous position flagged stale.
pub fn run_range(
    store: &BarStore,
    config: &EngineConfig,
    settings: &RuntimeSettings,
    macro_scores: &BTreeMap<NaiveDate, f64>,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<DayOutcome> {
    let bars = store.bars_through(to);
    let series = SeriesBundle::compute(&bars, config);
    let index_by_date: BTreeMap<NaiveDate, usize> = series
        .dates
        .iter()
        .enumerate()
        .map(|(idx, date)| (*date, idx))
        .collect();

    let open_threshold = config.param_value("open_threshold", 1.5);
    let hedge_threshold = config.param_value("hedge_threshold", -1.5);
    let mut decision = DecisionEngine::new(
        open_threshold,
        hedge_threshold,
        settings.confirmation_sessions,
    );

    let mut outcomes = Vec::new();
    for date in sessions_between(from, to) {
        let Some(&index) = index_by_date.get(&date) else {
            warn!(
                "{}",
                EngineError::StaleDecision {
                    date,
                    reason: "no canonical bar in the store".to_string(),
                }
            );
            let record = decision.step(date, None);
            outcomes.push(DayOutcome {
                date,
                bar: None,
                snapshots: BTreeMap::new(),
                technicals: BTreeMap::new(),
                composite: None,
                record,
            });
            continue;
        };

        let mut snapshots = BTreeMap::new();
        for indicator in &config.indicators {
            let raw = if indicator.name == models::MACROECO {
                macro_scores.get(&date).copied()
            } else {
                series.raw_value(&indicator.name, index)
            };
            let Some(raw) = raw else {
                continue;
            };

            let normalized = normalize(
                raw,
                indicator.domain_min,
                indicator.domain_max,
                settings.scale_min,
                settings.scale_max,
            );
            let band = match classify(raw, indicator) {
                Ok(color) => Some(color),
                Err(EngineError::UnclassifiedValue { .. }) => {
                    warn!(
                        "{} value {} on {} is outside every configured band",
                        indicator.name, raw, date
                    );
                    None
                }
                Err(_) => None,
            };

            snapshots.insert(
                indicator.name.clone(),
                IndicatorSnapshot {
                    raw,
                    normalized,
                    band,
                },
            );
        }

        let normalized: BTreeMap<String, f64> = snapshots
            .iter()
            .map(|(name, snap)| (name.clone(), snap.normalized))
            .collect();
        let composite = composite::score_day(
            date,
            &normalized,
            macro_scores.get(&date).copied(),
            config,
            settings,
        );

        let record = decision.step(date, composite.as_ref().map(|c| c.final_score));
        outcomes.push(DayOutcome {
            date,
            bar: Some(bars[index].clone()),
            snapshots,
            technicals: series.technicals_at(&bars, index),
            composite,
            record,
        });
    }

    outcomes
}

/// Year-to-date performance as the mean of the final composite scores for
/// the calendar year of `as_of`, expressed as a percentage.
pub fn ytd_performance(outcomes: &[DayOutcome], as_of: NaiveDate) -> f64 {
    let scores: Vec<f64> = outcomes
        .iter()
        .filter(|outcome| outcome.date.year() == as_of.year() && outcome.date <= as_of)
        .filter_map(|outcome| outcome.composite.as_ref().map(|c| c.final_score))
        .collect();

    if scores.is_empty() {
        return 0.0;
    }

    scores.iter().sum::<f64>() / scores.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_skip_weekends() {
        let from: NaiveDate = "2024-03-01".parse().unwrap(); // Friday
        let to: NaiveDate = "2024-03-05".parse().unwrap(); // Tuesday
        let sessions = sessions_between(from, to);
        let expected: Vec<NaiveDate> = ["2024-03-01", "2024-03-04", "2024-03-05"]
            .iter()
            .map(|d| d.parse().unwrap())
            .collect();
        assert_eq!(sessions, expected);
    }
}
