use crate::config::{EngineConfig, IndicatorConfig, RuntimeSettings};
use crate::models::{IndicatorSnapshot, PerformanceRecord};
use crate::pipeline::{self, DayOutcome};
use crate::recommend;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dashboard payloads produced by the engine. Field names follow the API
/// layer's camelCase convention.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStatus {
    pub date: NaiveDate,
    pub position: String,
    pub ytd_performance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeRange {
    pub low: f64,
    pub high: f64,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorGauge {
    pub label: String,
    pub raw_value: f64,
    pub normalized_value: f64,
    pub min: f64,
    pub max: f64,
    pub band: Option<String>,
    pub ranges: Vec<GaugeRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeBreakdown {
    pub date: NaiveDate,
    pub contributions: BTreeMap<String, f64>,
    pub macro_bonus: f64,
    pub final_score: f64,
    pub conclusion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionHistoryEntry {
    pub parameter: String,
    pub metric_name: String,
    pub champion_value: f64,
    pub challenger_value: f64,
    pub challenger_setting: f64,
    pub margin: f64,
    pub promoted: bool,
}

impl From<&PerformanceRecord> for PromotionHistoryEntry {
    fn from(record: &PerformanceRecord) -> Self {
        Self {
            parameter: record.parameter.clone(),
            metric_name: record.metric_name.clone(),
            champion_value: record.champion_value,
            challenger_value: record.challenger_value,
            challenger_setting: record.challenger_setting,
            margin: record.margin,
            promoted: record.promoted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub position: String,
    pub stale: bool,
    pub ytd_performance: f64,
    pub indicators: BTreeMap<String, IndicatorGauge>,
    pub technicals: BTreeMap<String, f64>,
    pub composite: Option<CompositeBreakdown>,
    pub recommendations: Vec<String>,
}

/// The day's position summary for the dashboard header.
pub fn position_status(outcomes: &[DayOutcome]) -> Option<PositionStatus> {
    let latest = outcomes.last()?;
    Some(PositionStatus {
        date: latest.date,
        position: latest.record.position.as_str().to_string(),
        ytd_performance: pipeline::ytd_performance(outcomes, latest.date),
    })
}

/// Builds the gauge payload for one indicator: raw and normalized value,
/// the domain bounds and the configured color ranges.
pub fn gauge(indicator: &IndicatorConfig, snapshot: &IndicatorSnapshot) -> IndicatorGauge {
    IndicatorGauge {
        label: indicator.label.clone(),
        raw_value: snapshot.raw,
        normalized_value: snapshot.normalized,
        min: indicator.domain_min,
        max: indicator.domain_max,
        band: snapshot.band.map(|color| color.as_str().to_string()),
        ranges: indicator
            .bands
            .iter()
            .map(|band| GaugeRange {
                low: band.low,
                high: band.high,
                color: band.color.as_str().to_string(),
            })
            .collect(),
    }
}

/// Assembles the full per-day dashboard document for a run's outcomes, in
/// session order. Recommendations compare each session against the
/// previous non-gap session.
pub fn daily_reports(
    outcomes: &[DayOutcome],
    config: &EngineConfig,
    settings: &RuntimeSettings,
) -> Vec<DailyReport> {
    let mut reports = Vec::with_capacity(outcomes.len());
    let mut previous: Option<&DayOutcome> = None;

    for outcome in outcomes {
        let indicators = outcome
            .snapshots
            .iter()
            .filter_map(|(name, snapshot)| {
                config
                    .indicator(name)
                    .map(|indicator| (name.clone(), gauge(indicator, snapshot)))
            })
            .collect();

        let recommendations = previous
            .map(|prior| recommend::daily_recommendations(prior, outcome, settings))
            .unwrap_or_default();

        reports.push(DailyReport {
            date: outcome.date,
            position: outcome.record.position.as_str().to_string(),
            stale: outcome.record.stale,
            ytd_performance: pipeline::ytd_performance(outcomes, outcome.date),
            indicators,
            technicals: outcome.technicals.clone(),
            composite: outcome.composite.as_ref().map(|score| CompositeBreakdown {
                date: score.date,
                contributions: score.contributions.clone(),
                macro_bonus: score.macro_bonus,
                final_score: score.final_score,
                conclusion: score.conclusion.as_str().to_string(),
            }),
            recommendations,
        });

        if outcome.bar.is_some() {
            previous = Some(outcome);
        }
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Color, IndicatorSnapshot};

    #[test]
    fn gauge_carries_domain_and_ranges() {
        let config = EngineConfig::default();
        let rsi = config.indicator(crate::models::RSI).unwrap();
        let snapshot = IndicatorSnapshot {
            raw: 82.0,
            normalized: 1.92,
            band: Some(Color::Red),
        };

        let payload = gauge(rsi, &snapshot);
        assert_eq!(payload.label, "RSI");
        assert_eq!(payload.min, 0.0);
        assert_eq!(payload.max, 100.0);
        assert_eq!(payload.band.as_deref(), Some("RED"));
        assert_eq!(payload.ranges.len(), 3);
        assert_eq!(payload.ranges[0].color, "GREEN");
    }
}
