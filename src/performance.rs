use crate::config::Objective;
use crate::models::{Position, PositionRecord};
use chrono::NaiveDate;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Market exposure implied by a daily position: OPEN is long, HEDGE is
/// short, MONITOR is flat.
pub fn exposure(position: Position) -> f64 {
    match position {
        Position::Open => 1.0,
        Position::Hedge => -1.0,
        Position::Monitor => 0.0,
    }
}

/// Realized performance of a decision stream had positions been taken as
/// decided: each day's exposure is applied to the following session's
/// close-to-close return.
#[derive(Debug, Clone)]
pub struct DecisionPerformance {
    pub cumulative_return: f64,
    pub sharpe_ratio: f64,
    pub hit_rate: f64,
    pub active_sessions: usize,
    pub evaluated_sessions: usize,
}

impl DecisionPerformance {
    pub fn metric(&self, objective: Objective) -> f64 {
        let value = match objective {
            Objective::CumulativeReturn => self.cumulative_return,
            Objective::Sharpe => self.sharpe_ratio,
        };
        if value.is_finite() {
            value
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// Scores a decision stream against realized closes. Pairs where either
/// session lacks a close (store gap, stale day) are skipped. Returns
/// `None` when fewer than two sessions could be evaluated, which callers
/// treat as "cannot be backtested".
pub fn evaluate_decisions(
    records: &[PositionRecord],
    closes: &BTreeMap<NaiveDate, f64>,
) -> Option<DecisionPerformance> {
    let mut daily_returns = Vec::new();
    let mut active_sessions = 0usize;
    let mut wins = 0usize;

    for pair in records.windows(2) {
        let (today, next) = (&pair[0], &pair[1]);
        let (Some(close_today), Some(close_next)) =
            (closes.get(&today.date), closes.get(&next.date))
        else {
            continue;
        };
        if *close_today <= 0.0 {
            continue;
        }

        let market_return = close_next / close_today - 1.0;
        let contribution = exposure(today.position) * market_return;
        daily_returns.push(contribution);

        if today.position != Position::Monitor {
            active_sessions += 1;
            if contribution > 0.0 {
                wins += 1;
            }
        }
    }

    if daily_returns.len() < 2 {
        return None;
    }

    let cumulative_return = daily_returns.iter().sum();
    let sharpe_ratio = sharpe(&daily_returns);
    let hit_rate = if active_sessions > 0 {
        wins as f64 / active_sessions as f64
    } else {
        0.0
    };

    Some(DecisionPerformance {
        cumulative_return,
        sharpe_ratio,
        hit_rate,
        active_sessions,
        evaluated_sessions: daily_returns.len(),
    })
}

fn sharpe(daily_returns: &[f64]) -> f64 {
    if daily_returns.len() < 2 {
        return 0.0;
    }

    let mean = daily_returns.to_vec().mean();
    let std_dev = daily_returns.to_vec().std_dev();
    if std_dev == 0.0 || !std_dev.is_finite() {
        return 0.0;
    }

    (mean * TRADING_DAYS_PER_YEAR) / (std_dev * TRADING_DAYS_PER_YEAR.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn record(date: NaiveDate, position: Position) -> PositionRecord {
        PositionRecord {
            date,
            position,
            score: Some(0.0),
            previous: position,
            stale: false,
        }
    }

    fn stream(positions: &[Position], closes: &[f64]) -> (Vec<PositionRecord>, BTreeMap<NaiveDate, f64>) {
        let start: NaiveDate = "2024-03-04".parse().unwrap();
        let mut records = Vec::new();
        let mut close_map = BTreeMap::new();
        for (i, (&position, &close)) in positions.iter().zip(closes.iter()).enumerate() {
            let date = start.checked_add_days(Days::new(i as u64)).unwrap();
            records.push(record(date, position));
            close_map.insert(date, close);
        }
        (records, close_map)
    }

    #[test]
    fn open_exposure_captures_next_session_return() {
        let (records, closes) = stream(
            &[Position::Open, Position::Open, Position::Monitor],
            &[100.0, 110.0, 110.0],
        );
        let perf = evaluate_decisions(&records, &closes).unwrap();
        // Day 1: +10% captured long; day 2: flat market.
        assert!((perf.cumulative_return - 0.10).abs() < 1e-12);
        assert_eq!(perf.active_sessions, 2);
        assert!((perf.hit_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn hedge_profits_from_falling_closes() {
        let (records, closes) = stream(
            &[Position::Hedge, Position::Hedge, Position::Hedge],
            &[100.0, 90.0, 81.0],
        );
        let perf = evaluate_decisions(&records, &closes).unwrap();
        assert!((perf.cumulative_return - 0.20).abs() < 1e-12);
        assert!((perf.hit_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn monitor_days_contribute_nothing() {
        let (records, closes) = stream(
            &[Position::Monitor, Position::Monitor, Position::Monitor],
            &[100.0, 150.0, 50.0],
        );
        let perf = evaluate_decisions(&records, &closes).unwrap();
        assert!((perf.cumulative_return - 0.0).abs() < 1e-12);
        assert_eq!(perf.active_sessions, 0);
    }

    #[test]
    fn gaps_are_skipped_not_guessed() {
        let (mut records, mut closes) = stream(
            &[Position::Open, Position::Open, Position::Open],
            &[100.0, 110.0, 121.0],
        );
        // Remove the middle close: both adjacent pairs become unusable.
        closes.remove(&records[1].date);
        assert!(evaluate_decisions(&records, &closes).is_none());

        records.push(record(
            "2024-03-07".parse().unwrap(),
            Position::Open,
        ));
        closes.insert("2024-03-07".parse().unwrap(), 133.1);
        // Still only one usable pair.
        assert!(evaluate_decisions(&records, &closes).is_none());
    }

    #[test]
    fn too_short_streams_cannot_be_scored() {
        let (records, closes) = stream(&[Position::Open], &[100.0]);
        assert!(evaluate_decisions(&records, &closes).is_none());
    }
}
