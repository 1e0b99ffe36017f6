use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Canonical indicator names. Dashboards and configuration key everything
/// by these strings, so adding an indicator is a config change, not a
/// structural one.
pub const MACROECO: &str = "MACROECO";
pub const RSI: &str = "RSI";
pub const MACD: &str = "MACD";
pub const STOCHASTIC_K: &str = "%K";
pub const ATR: &str = "ATR";
pub const CLOSE_PIVOT: &str = "CLOSE/PIVOT";
pub const VOL_OI: &str = "VOL/OI";

/// A numeric field as found in historical source data. Spreadsheet-era
/// history occasionally carries formula text where a number was intended;
/// the original text is preserved instead of silently becoming zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawField {
    Number(f64),
    Unparseable(String),
}

impl RawField {
    /// Parses a source cell. Empty text means the field was absent.
    pub fn parse(text: &str) -> Option<RawField> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(RawField::Number(value)),
            _ => Some(RawField::Unparseable(trimmed.to_string())),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawField::Number(value) => Some(*value),
            RawField::Unparseable(_) => None,
        }
    }
}

/// One trading day of market data. Immutable once written; corrections
/// append a superseding bar for the same date (see `BarStore`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub open_interest: i64,
    #[serde(default)]
    pub implied_volatility: Option<RawField>,
    #[serde(default)]
    pub net_commercial_position: Option<RawField>,
}

/// Color band assigned to an indicator value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Red,
    Orange,
    Green,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "RED",
            Color::Orange => "ORANGE",
            Color::Green => "GREEN",
        }
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RED" => Ok(Color::Red),
            "ORANGE" => Ok(Color::Orange),
            "GREEN" => Ok(Color::Green),
            other => Err(anyhow!("Unknown color band '{}'", other)),
        }
    }
}

/// Daily position emitted by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Open,
    Hedge,
    Monitor,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Open => "OPEN",
            Position::Hedge => "HEDGE",
            Position::Monitor => "MONITOR",
        }
    }
}

impl FromStr for Position {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Position::Open),
            "HEDGE" => Ok(Position::Hedge),
            "MONITOR" => Ok(Position::Monitor),
            other => Err(anyhow!("Unknown position '{}'", other)),
        }
    }
}

/// Qualitative label derived from the final composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conclusion {
    Bullish,
    Neutral,
    Bearish,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Bullish => "BULLISH",
            Conclusion::Neutral => "NEUTRAL",
            Conclusion::Bearish => "BEARISH",
        }
    }
}

/// Per-day, per-indicator result of the calculation + normalization pass.
/// `band` is `None` when the value fell outside every configured range;
/// consumers must surface that explicitly rather than defaulting a color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub raw: f64,
    pub normalized: f64,
    pub band: Option<Color>,
}

/// Per-day composite result. Contributions hold the normalized values of
/// the indicators that were actually present that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub date: NaiveDate,
    pub contributions: BTreeMap<String, f64>,
    pub macro_bonus: f64,
    pub final_score: f64,
    pub conclusion: Conclusion,
}

/// Per-day decision, append-only. `score` is `None` and `stale` is set when
/// the day's pipeline could not complete and the previous state was held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub date: NaiveDate,
    pub position: Position,
    pub score: Option<f64>,
    pub previous: Position,
    pub stale: bool,
}

/// Outcome of one parameter's champion-vs-challenger search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub parameter: String,
    pub metric_name: String,
    pub champion_value: f64,
    pub challenger_value: f64,
    pub challenger_setting: f64,
    pub margin: f64,
    pub promoted: bool,
}
