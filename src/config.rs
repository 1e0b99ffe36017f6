use crate::error::EngineError;
use crate::models::{self, Color};
use crate::normalize::{validate_bands, RangeBand};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Objective maximized by the parameter optimizer's backtests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    CumulativeReturn,
    Sharpe,
}

impl Objective {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cumulative_return" | "return" => Ok(Self::CumulativeReturn),
            "sharpe" | "sharpe_ratio" => Ok(Self::Sharpe),
            other => Err(anyhow!(
                "OPTIMIZATION_OBJECTIVE must be CUMULATIVE_RETURN or SHARPE (value: {})",
                other
            )),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CumulativeReturn => "cumulative_return",
            Self::Sharpe => "sharpe_ratio",
        }
    }
}

/// Per-indicator configuration: display label, value domain, composite
/// weight and the ordered color bands over the domain. A weight of zero
/// keeps the gauge but excludes the indicator from the composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub name: String,
    pub label: String,
    pub domain_min: f64,
    pub domain_max: f64,
    pub weight: f64,
    #[serde(default)]
    pub inverted: bool,
    pub bands: Vec<RangeBand>,
}

/// One tunable parameter: expert-supplied bounds and step, the active
/// (champion) value, and the challenger value while a search is running.
/// Only the optimizer writes `active`; everything else reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub indicator: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub active: f64,
    #[serde(default)]
    pub challenger: Option<f64>,
}

/// The engine configuration document: indicator tables, the tunable
/// parameter table and free-form string settings typed on access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub commodity: String,
    pub indicators: Vec<IndicatorConfig>,
    pub parameters: Vec<ParameterSpec>,
    pub settings: HashMap<String, String>,
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config at {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid engine config at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).context("Engine config encode failed")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write engine config at {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for indicator in &self.indicators {
            if !(indicator.domain_min.is_finite() && indicator.domain_max.is_finite())
                || indicator.domain_min >= indicator.domain_max
            {
                return Err(EngineError::invalid_config(format!(
                    "{} domain [{}, {}] is not a valid interval",
                    indicator.name, indicator.domain_min, indicator.domain_max
                )));
            }
            if !indicator.weight.is_finite() || indicator.weight < 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "{} weight {} must be a finite non-negative number",
                    indicator.name, indicator.weight
                )));
            }
            validate_bands(indicator)?;
        }

        for parameter in &self.parameters {
            if !(parameter.min.is_finite() && parameter.max.is_finite())
                || parameter.min > parameter.max
            {
                return Err(EngineError::invalid_config(format!(
                    "parameter {} bounds [{}, {}] are invalid",
                    parameter.name, parameter.min, parameter.max
                )));
            }
            if !parameter.step.is_finite() || parameter.step <= 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "parameter {} step {} must be positive",
                    parameter.name, parameter.step
                )));
            }
            if parameter.active < parameter.min || parameter.active > parameter.max {
                return Err(EngineError::invalid_config(format!(
                    "parameter {} active value {} is outside [{}, {}]",
                    parameter.name, parameter.active, parameter.min, parameter.max
                )));
            }
        }

        Ok(())
    }

    pub fn indicator(&self, name: &str) -> Option<&IndicatorConfig> {
        self.indicators.iter().find(|i| i.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Active value of a tunable parameter, falling back to `default` when
    /// the parameter is not configured.
    pub fn param_value(&self, name: &str, default: f64) -> f64 {
        self.parameter(name).map(|p| p.active).unwrap_or(default)
    }

    pub fn set_active(&mut self, name: &str, value: f64) {
        if let Some(parameter) = self.parameters.iter_mut().find(|p| p.name == name) {
            parameter.active = value.clamp(parameter.min, parameter.max);
            parameter.challenger = None;
        }
    }

    pub fn set_challenger(&mut self, name: &str, value: Option<f64>) {
        if let Some(parameter) = self.parameters.iter_mut().find(|p| p.name == name) {
            parameter.challenger = value;
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let band = |low: f64, high: f64, color: Color| RangeBand { low, high, color };

        let indicators = vec![
            IndicatorConfig {
                name: models::MACROECO.to_string(),
                label: "MACROECO".to_string(),
                domain_min: -3.0,
                domain_max: 3.0,
                weight: 0.0,
                inverted: false,
                bands: vec![
                    band(-3.0, -1.0, Color::Red),
                    band(-1.0, 1.0, Color::Orange),
                    band(1.0, 3.0, Color::Green),
                ],
            },
            IndicatorConfig {
                name: models::RSI.to_string(),
                label: "RSI".to_string(),
                domain_min: 0.0,
                domain_max: 100.0,
                weight: 1.0,
                inverted: false,
                bands: vec![
                    band(0.0, 30.0, Color::Green),
                    band(30.0, 70.0, Color::Orange),
                    band(70.0, 100.0, Color::Red),
                ],
            },
            IndicatorConfig {
                name: models::MACD.to_string(),
                label: "MACD".to_string(),
                domain_min: -200.0,
                domain_max: 200.0,
                weight: 1.0,
                inverted: false,
                bands: vec![
                    band(-200.0, -50.0, Color::Red),
                    band(-50.0, 50.0, Color::Orange),
                    band(50.0, 200.0, Color::Green),
                ],
            },
            IndicatorConfig {
                name: models::STOCHASTIC_K.to_string(),
                label: "%K".to_string(),
                domain_min: 0.0,
                domain_max: 100.0,
                weight: 1.0,
                inverted: false,
                bands: vec![
                    band(0.0, 20.0, Color::Green),
                    band(20.0, 80.0, Color::Orange),
                    band(80.0, 100.0, Color::Red),
                ],
            },
            IndicatorConfig {
                name: models::ATR.to_string(),
                label: "ATR".to_string(),
                domain_min: 0.0,
                domain_max: 300.0,
                weight: 1.0,
                inverted: true,
                bands: vec![
                    band(200.0, 300.0, Color::Red),
                    band(80.0, 200.0, Color::Orange),
                    band(0.0, 80.0, Color::Green),
                ],
            },
            IndicatorConfig {
                name: models::CLOSE_PIVOT.to_string(),
                label: "CLOSE/PIVOT".to_string(),
                domain_min: 0.9,
                domain_max: 1.1,
                weight: 1.0,
                inverted: false,
                bands: vec![
                    band(0.9, 0.98, Color::Red),
                    band(0.98, 1.02, Color::Orange),
                    band(1.02, 1.1, Color::Green),
                ],
            },
            IndicatorConfig {
                name: models::VOL_OI.to_string(),
                label: "VOL/OI".to_string(),
                domain_min: 0.0,
                domain_max: 2.0,
                weight: 1.0,
                inverted: false,
                bands: vec![
                    band(0.0, 0.4, Color::Red),
                    band(0.4, 1.0, Color::Orange),
                    band(1.0, 2.0, Color::Green),
                ],
            },
        ];

        let param = |name: &str, indicator: &str, min: f64, max: f64, step: f64, active: f64| {
            ParameterSpec {
                name: name.to_string(),
                indicator: indicator.to_string(),
                min,
                max,
                step,
                active,
                challenger: None,
            }
        };

        let parameters = vec![
            param("rsi_period", models::RSI, 5.0, 30.0, 1.0, 14.0),
            param("macd_fast_period", models::MACD, 6.0, 18.0, 1.0, 12.0),
            param("macd_slow_period", models::MACD, 20.0, 40.0, 1.0, 26.0),
            param("macd_signal_period", models::MACD, 5.0, 15.0, 1.0, 9.0),
            param("stochastic_period", models::STOCHASTIC_K, 5.0, 30.0, 1.0, 14.0),
            param("stochastic_smoothing", models::STOCHASTIC_K, 2.0, 6.0, 1.0, 3.0),
            param("atr_period", models::ATR, 5.0, 30.0, 1.0, 14.0),
            param("bollinger_period", "BOLLINGER", 10.0, 40.0, 1.0, 20.0),
            param("bollinger_multiplier", "BOLLINGER", 1.0, 3.0, 0.25, 2.0),
            param("open_threshold", "DECISION", 0.5, 3.0, 0.25, 1.5),
            param("hedge_threshold", "DECISION", -3.0, -0.5, 0.25, -1.5),
        ];

        let mut settings = HashMap::new();
        let mut set = |key: &str, value: &str| {
            settings.insert(key.to_string(), value.to_string());
        };
        set("SCALE_MIN", "-3");
        set("SCALE_MAX", "3");
        set("BULLISH_CUT", "1.0");
        set("BEARISH_CUT", "-1.0");
        set("CONFIRMATION_SESSIONS", "2");
        set("MACRO_BONUS_MIN", "-1.0");
        set("MACRO_BONUS_MAX", "1.0");
        set("PROMOTION_MARGIN", "0.02");
        set("OPTIMIZATION_OBJECTIVE", "cumulative_return");
        set("BACKTEST_WINDOW_SESSIONS", "100");
        set("NOISE_FLOOR_ABSOLUTE", "0.5");
        set("NOISE_FLOOR_RELATIVE", "0.002");

        EngineConfig {
            commodity: "CC".to_string(),
            indicators,
            parameters,
            settings,
        }
    }
}

/// Typed view over the string settings map. All values are validated up
/// front so the pipeline never re-parses configuration mid-run.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub scale_min: f64,
    pub scale_max: f64,
    pub bullish_cut: f64,
    pub bearish_cut: f64,
    pub confirmation_sessions: usize,
    pub macro_bonus_min: f64,
    pub macro_bonus_max: f64,
    pub promotion_margin: f64,
    pub objective: Objective,
    pub backtest_window_sessions: usize,
    pub noise_floor_absolute: f64,
    pub noise_floor_relative: f64,
}

impl RuntimeSettings {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let scale_min = require_setting_f64(settings, "SCALE_MIN", None, None)?;
        let scale_max = require_setting_f64(settings, "SCALE_MAX", None, None)?;
        if scale_max <= scale_min {
            return Err(anyhow!(
                "SCALE_MAX ({}) must be > SCALE_MIN ({})",
                scale_max,
                scale_min
            ));
        }

        let bullish_cut = require_setting_f64(settings, "BULLISH_CUT", None, None)?;
        let bearish_cut = require_setting_f64(settings, "BEARISH_CUT", None, None)?;
        if bearish_cut >= bullish_cut {
            return Err(anyhow!(
                "BEARISH_CUT ({}) must be < BULLISH_CUT ({})",
                bearish_cut,
                bullish_cut
            ));
        }

        let confirmation_sessions = require_setting_usize(settings, "CONFIRMATION_SESSIONS", 1)?;
        let macro_bonus_min = require_setting_f64(settings, "MACRO_BONUS_MIN", None, None)?;
        let macro_bonus_max = require_setting_f64(settings, "MACRO_BONUS_MAX", None, None)?;
        if macro_bonus_max < macro_bonus_min {
            return Err(anyhow!(
                "MACRO_BONUS_MAX ({}) must be >= MACRO_BONUS_MIN ({})",
                macro_bonus_max,
                macro_bonus_min
            ));
        }

        let promotion_margin = require_setting_f64(settings, "PROMOTION_MARGIN", Some(0.0), None)?;
        let raw_objective = settings
            .get("OPTIMIZATION_OBJECTIVE")
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or("cumulative_return");
        let objective = Objective::parse(raw_objective)?;
        let backtest_window_sessions =
            require_setting_usize(settings, "BACKTEST_WINDOW_SESSIONS", 10)?;
        let noise_floor_absolute =
            require_setting_f64(settings, "NOISE_FLOOR_ABSOLUTE", Some(0.0), None)?;
        let noise_floor_relative =
            require_setting_f64(settings, "NOISE_FLOOR_RELATIVE", Some(0.0), None)?;

        Ok(Self {
            scale_min,
            scale_max,
            bullish_cut,
            bearish_cut,
            confirmation_sessions,
            macro_bonus_min,
            macro_bonus_max,
            promotion_margin,
            objective,
            backtest_window_sessions,
            noise_floor_absolute,
            noise_floor_relative,
        })
    }
}

fn require_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("Missing required setting {}", key))
}

fn require_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn require_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
) -> Result<usize> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            raw
        ));
    }
    if value < min as f64 {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(RuntimeSettings::from_settings_map(&config.settings).is_ok());
    }

    #[test]
    fn settings_validation_catches_inverted_bounds() {
        let mut config = EngineConfig::default();
        config
            .settings
            .insert("BULLISH_CUT".to_string(), "-2.0".to_string());
        assert!(RuntimeSettings::from_settings_map(&config.settings).is_err());

        let mut config = EngineConfig::default();
        config.settings.remove("PROMOTION_MARGIN");
        assert!(RuntimeSettings::from_settings_map(&config.settings).is_err());
    }

    #[test]
    fn set_active_clamps_and_clears_challenger() {
        let mut config = EngineConfig::default();
        config.set_challenger("rsi_period", Some(21.0));
        assert_eq!(
            config.parameter("rsi_period").unwrap().challenger,
            Some(21.0)
        );

        config.set_active("rsi_period", 99.0);
        let spec = config.parameter("rsi_period").unwrap();
        assert_eq!(spec.active, 30.0);
        assert_eq!(spec.challenger, None);
    }

    #[test]
    fn validation_rejects_out_of_range_active_value() {
        let mut config = EngineConfig::default();
        config.parameters[0].active = 1_000.0;
        assert!(config.validate().is_err());
    }
}
