use crate::config::{EngineConfig, RuntimeSettings};
use crate::models::{CompositeScore, Conclusion};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Combines the day's normalized indicator values and the macro adjustment
/// into the final composite score.
///
/// The score is a weighted mean over exactly the indicators present that
/// day: absent indicators (insufficient history) are excluded from both
/// the numerator and the weight denominator, never padded with zeros.
/// Zero-weight indicators are display-only and do not contribute. The
/// macro term enters additively after clamping to the configured range.
/// Returns `None` when no weighted indicator is present; that day cannot
/// be scored.
pub fn score_day(
    date: NaiveDate,
    normalized: &BTreeMap<String, f64>,
    macro_adjustment: Option<f64>,
    config: &EngineConfig,
    settings: &RuntimeSettings,
) -> Option<CompositeScore> {
    let mut contributions = BTreeMap::new();
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for (name, value) in normalized {
        let Some(indicator) = config.indicator(name) else {
            continue;
        };
        if indicator.weight <= 0.0 || !value.is_finite() {
            continue;
        }
        contributions.insert(name.clone(), *value);
        weighted_sum += indicator.weight * value;
        weight_total += indicator.weight;
    }

    if weight_total <= 0.0 {
        return None;
    }

    let macro_bonus = macro_adjustment
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(settings.macro_bonus_min, settings.macro_bonus_max))
        .unwrap_or(0.0);

    let final_score = weighted_sum / weight_total + macro_bonus;
    let conclusion = conclude(final_score, settings);

    Some(CompositeScore {
        date,
        contributions,
        macro_bonus,
        final_score,
        conclusion,
    })
}

/// Thresholds the final score against the configured cut points. These are
/// independent of the per-indicator range bands.
pub fn conclude(final_score: f64, settings: &RuntimeSettings) -> Conclusion {
    if final_score >= settings.bullish_cut {
        Conclusion::Bullish
    } else if final_score <= settings.bearish_cut {
        Conclusion::Bearish
    } else {
        Conclusion::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models;

    fn settings() -> RuntimeSettings {
        RuntimeSettings::from_settings_map(&EngineConfig::default().settings).unwrap()
    }

    fn day() -> NaiveDate {
        "2024-03-05".parse().unwrap()
    }

    #[test]
    fn missing_indicators_renormalize_the_denominator() {
        let config = EngineConfig::default();
        let settings = settings();

        let mut full = BTreeMap::new();
        full.insert(models::RSI.to_string(), 2.0);
        full.insert(models::MACD.to_string(), 1.0);
        full.insert(models::ATR.to_string(), 0.0);
        let full_score = score_day(day(), &full, None, &config, &settings).unwrap();
        assert!((full_score.final_score - 1.0).abs() < 1e-12);

        let mut reduced = full.clone();
        reduced.remove(models::ATR);
        let reduced_score = score_day(day(), &reduced, None, &config, &settings).unwrap();

        // The mean over the remaining two, not the zero-padded three.
        assert!((reduced_score.final_score - 1.5).abs() < 1e-12);
        assert_eq!(reduced_score.contributions.len(), 2);
    }

    #[test]
    fn zero_weight_indicators_are_display_only() {
        let config = EngineConfig::default();
        let settings = settings();

        let mut values = BTreeMap::new();
        values.insert(models::RSI.to_string(), 1.0);
        values.insert(models::MACROECO.to_string(), -3.0);
        let score = score_day(day(), &values, None, &config, &settings).unwrap();

        assert!((score.final_score - 1.0).abs() < 1e-12);
        assert!(!score.contributions.contains_key(models::MACROECO));
    }

    #[test]
    fn macro_bonus_is_additive_and_capped() {
        let config = EngineConfig::default();
        let settings = settings();

        let mut values = BTreeMap::new();
        values.insert(models::RSI.to_string(), 0.5);

        let boosted = score_day(day(), &values, Some(0.4), &config, &settings).unwrap();
        assert!((boosted.final_score - 0.9).abs() < 1e-12);
        assert!((boosted.macro_bonus - 0.4).abs() < 1e-12);

        let capped = score_day(day(), &values, Some(5.0), &config, &settings).unwrap();
        assert!((capped.macro_bonus - settings.macro_bonus_max).abs() < 1e-12);
    }

    #[test]
    fn conclusion_follows_the_cut_points() {
        let settings = settings();
        assert_eq!(conclude(1.0, &settings), Conclusion::Bullish);
        assert_eq!(conclude(0.99, &settings), Conclusion::Neutral);
        assert_eq!(conclude(-1.0, &settings), Conclusion::Bearish);
    }

    #[test]
    fn a_day_with_no_weighted_indicators_cannot_be_scored() {
        let config = EngineConfig::default();
        let settings = settings();

        let empty = BTreeMap::new();
        assert!(score_day(day(), &empty, Some(1.0), &config, &settings).is_none());

        let mut macro_only = BTreeMap::new();
        macro_only.insert(models::MACROECO.to_string(), 2.0);
        assert!(score_day(day(), &macro_only, None, &config, &settings).is_none());
    }
}
