use crate::config::RuntimeSettings;
use crate::pipeline::DayOutcome;

/// Generates the short natural-language recommendation lines shown on the
/// dashboard: one sentence per tracked raw field whose day-over-day change
/// clears the configured noise floor (absolute or relative).
pub fn daily_recommendations(
    previous: &DayOutcome,
    today: &DayOutcome,
    settings: &RuntimeSettings,
) -> Vec<String> {
    let mut lines = Vec::new();

    for (label, prior, current) in tracked_fields(previous, today) {
        let delta = current - prior;
        let absolute = delta.abs();
        let relative = if prior.abs() > f64::EPSILON {
            absolute / prior.abs()
        } else {
            0.0
        };

        if absolute < settings.noise_floor_absolute && relative < settings.noise_floor_relative {
            continue;
        }

        let direction = if delta > 0.0 { "rose" } else { "fell" };
        if prior.abs() > f64::EPSILON {
            lines.push(format!(
                "{} {} to {:.2} from {:.2} ({:+.1}%)",
                label,
                direction,
                current,
                prior,
                delta / prior.abs() * 100.0
            ));
        } else {
            lines.push(format!(
                "{} {} to {:.2} from {:.2}",
                label, direction, current, prior
            ));
        }
    }

    lines
}

fn tracked_fields(previous: &DayOutcome, today: &DayOutcome) -> Vec<(String, f64, f64)> {
    let mut fields = Vec::new();

    if let (Some(prior), Some(current)) = (&previous.bar, &today.bar) {
        fields.push(("close".to_string(), prior.close, current.close));
        fields.push((
            "volume".to_string(),
            prior.volume as f64,
            current.volume as f64,
        ));
        fields.push((
            "open interest".to_string(),
            prior.open_interest as f64,
            current.open_interest as f64,
        ));

        if let (Some(prior_iv), Some(current_iv)) = (
            prior.implied_volatility.as_ref().and_then(|f| f.as_number()),
            current
                .implied_volatility
                .as_ref()
                .and_then(|f| f.as_number()),
        ) {
            fields.push(("implied volatility".to_string(), prior_iv, current_iv));
        }
    }

    for (name, snapshot) in &today.snapshots {
        if let Some(prior) = previous.snapshots.get(name) {
            fields.push((name.clone(), prior.raw, snapshot.raw));
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, RuntimeSettings};
    use crate::models::{Bar, IndicatorSnapshot, Position, PositionRecord};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn settings() -> RuntimeSettings {
        RuntimeSettings::from_settings_map(&EngineConfig::default().settings).unwrap()
    }

    fn outcome(date: &str, close: f64, rsi: Option<f64>) -> DayOutcome {
        let date: NaiveDate = date.parse().unwrap();
        let mut snapshots = BTreeMap::new();
        if let Some(raw) = rsi {
            snapshots.insert(
                "RSI".to_string(),
                IndicatorSnapshot {
                    raw,
                    normalized: 0.0,
                    band: None,
                },
            );
        }
        DayOutcome {
            date,
            bar: Some(Bar {
                date,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10_000,
                open_interest: 40_000,
                implied_volatility: None,
                net_commercial_position: None,
            }),
            snapshots,
            technicals: BTreeMap::new(),
            composite: None,
            record: PositionRecord {
                date,
                position: Position::Monitor,
                score: None,
                previous: Position::Monitor,
                stale: false,
            },
        }
    }

    #[test]
    fn large_moves_produce_one_sentence_per_field() {
        let previous = outcome("2024-03-04", 3400.0, Some(55.0));
        let today = outcome("2024-03-05", 3468.0, Some(61.0));

        let lines = daily_recommendations(&previous, &today, &settings());
        assert!(lines.iter().any(|l| l.starts_with("close rose to 3468.00")));
        assert!(lines.iter().any(|l| l.starts_with("RSI rose to 61.00")));
    }

    #[test]
    fn changes_under_the_noise_floor_stay_silent() {
        let mut quiet = settings();
        quiet.noise_floor_absolute = 10.0;
        quiet.noise_floor_relative = 0.05;

        let previous = outcome("2024-03-04", 3400.0, Some(55.0));
        let today = outcome("2024-03-05", 3404.0, Some(55.4));

        assert!(daily_recommendations(&previous, &today, &quiet).is_empty());
    }

    #[test]
    fn falling_fields_report_direction() {
        let previous = outcome("2024-03-04", 3400.0, None);
        let today = outcome("2024-03-05", 3300.0, None);

        let lines = daily_recommendations(&previous, &today, &settings());
        assert!(lines.iter().any(|l| l.contains("close fell to 3300.00")));
        assert!(lines.iter().any(|l| l.contains("-2.9%")));
    }
}
