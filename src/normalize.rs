use crate::config::IndicatorConfig;
use crate::error::EngineError;
use crate::models::Color;
use serde::{Deserialize, Serialize};

const BOUNDARY_EPSILON: f64 = 1e-9;

/// One labeled sub-interval of an indicator's value domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBand {
    pub low: f64,
    pub high: f64,
    pub color: Color,
}

/// Linearly rescales a raw indicator value from its configured domain onto
/// the fixed comparison scale, clamping out-of-domain values to the scale
/// bounds rather than extrapolating.
pub fn normalize(raw: f64, domain_min: f64, domain_max: f64, scale_min: f64, scale_max: f64) -> f64 {
    if !raw.is_finite() || domain_max <= domain_min {
        return scale_min;
    }
    let clamped = raw.clamp(domain_min, domain_max);
    let fraction = (clamped - domain_min) / (domain_max - domain_min);
    scale_min + fraction * (scale_max - scale_min)
}

/// Returns the band containing `value`.
///
/// Boundary tie-break, uniform across indicators: for ascending tables a
/// boundary value belongs to the band that lists it as its upper edge; for
/// inverted (high-to-low) tables it belongs to the band that lists it as
/// its lower edge. The band at the domain edge also owns that edge. Values
/// outside every band are an explicit error, never a defaulted color.
pub fn classify(value: f64, indicator: &IndicatorConfig) -> Result<Color, EngineError> {
    let unclassified = || EngineError::UnclassifiedValue {
        indicator: indicator.name.clone(),
        value,
    };

    if !value.is_finite() {
        return Err(unclassified());
    }

    if indicator.inverted {
        for (position, band) in indicator.bands.iter().enumerate() {
            let inside = value >= band.low && value < band.high;
            let owns_domain_edge = position == 0 && (value - band.high).abs() <= BOUNDARY_EPSILON;
            if inside || owns_domain_edge {
                return Ok(band.color);
            }
        }
    } else {
        for (position, band) in indicator.bands.iter().enumerate() {
            let inside = value > band.low && value <= band.high;
            let owns_domain_edge = position == 0 && (value - band.low).abs() <= BOUNDARY_EPSILON;
            if inside || owns_domain_edge {
                return Ok(band.color);
            }
        }
    }

    Err(unclassified())
}

/// Validates that an indicator's bands partition its declared domain with
/// no gaps and no overlaps, in the declared direction.
pub fn validate_bands(indicator: &IndicatorConfig) -> Result<(), EngineError> {
    let bands = &indicator.bands;
    if bands.is_empty() {
        return Err(EngineError::invalid_config(format!(
            "{} has no range bands",
            indicator.name
        )));
    }

    for band in bands {
        if !(band.low.is_finite() && band.high.is_finite()) || band.low >= band.high {
            return Err(EngineError::invalid_config(format!(
                "{} band [{}, {}] is not a valid interval",
                indicator.name, band.low, band.high
            )));
        }
    }

    let close = |a: f64, b: f64| (a - b).abs() <= BOUNDARY_EPSILON;

    if indicator.inverted {
        if !close(bands[0].high, indicator.domain_max) {
            return Err(EngineError::invalid_config(format!(
                "{} inverted bands must start at the domain maximum {}",
                indicator.name, indicator.domain_max
            )));
        }
        for pair in bands.windows(2) {
            if !close(pair[0].low, pair[1].high) {
                return Err(EngineError::invalid_config(format!(
                    "{} bands leave a gap or overlap between {} and {}",
                    indicator.name, pair[0].low, pair[1].high
                )));
            }
        }
        if !close(bands[bands.len() - 1].low, indicator.domain_min) {
            return Err(EngineError::invalid_config(format!(
                "{} inverted bands must end at the domain minimum {}",
                indicator.name, indicator.domain_min
            )));
        }
    } else {
        if !close(bands[0].low, indicator.domain_min) {
            return Err(EngineError::invalid_config(format!(
                "{} bands must start at the domain minimum {}",
                indicator.name, indicator.domain_min
            )));
        }
        for pair in bands.windows(2) {
            if !close(pair[0].high, pair[1].low) {
                return Err(EngineError::invalid_config(format!(
                    "{} bands leave a gap or overlap between {} and {}",
                    indicator.name, pair[0].high, pair[1].low
                )));
            }
        }
        if !close(bands[bands.len() - 1].high, indicator.domain_max) {
            return Err(EngineError::invalid_config(format!(
                "{} bands must end at the domain maximum {}",
                indicator.name, indicator.domain_max
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorConfig;

    fn ascending_indicator() -> IndicatorConfig {
        IndicatorConfig {
            name: "RSI".to_string(),
            label: "RSI".to_string(),
            domain_min: 0.0,
            domain_max: 100.0,
            weight: 1.0,
            inverted: false,
            bands: vec![
                RangeBand {
                    low: 0.0,
                    high: 30.0,
                    color: Color::Green,
                },
                RangeBand {
                    low: 30.0,
                    high: 70.0,
                    color: Color::Orange,
                },
                RangeBand {
                    low: 70.0,
                    high: 100.0,
                    color: Color::Red,
                },
            ],
        }
    }

    fn inverted_indicator() -> IndicatorConfig {
        IndicatorConfig {
            name: "ATR".to_string(),
            label: "ATR".to_string(),
            domain_min: 0.0,
            domain_max: 300.0,
            weight: 1.0,
            inverted: true,
            bands: vec![
                RangeBand {
                    low: 200.0,
                    high: 300.0,
                    color: Color::Red,
                },
                RangeBand {
                    low: 80.0,
                    high: 200.0,
                    color: Color::Orange,
                },
                RangeBand {
                    low: 0.0,
                    high: 80.0,
                    color: Color::Green,
                },
            ],
        }
    }

    #[test]
    fn normalize_clamps_to_scale_bounds() {
        assert!((normalize(50.0, 0.0, 100.0, -3.0, 3.0) - 0.0).abs() < 1e-12);
        assert!((normalize(100.0, 0.0, 100.0, -3.0, 3.0) - 3.0).abs() < 1e-12);
        assert!((normalize(250.0, 0.0, 100.0, -3.0, 3.0) - 3.0).abs() < 1e-12);
        assert!((normalize(-40.0, 0.0, 100.0, -3.0, 3.0) + 3.0).abs() < 1e-12);
        assert!((normalize(f64::NAN, 0.0, 100.0, -3.0, 3.0) + 3.0).abs() < 1e-12);
    }

    #[test]
    fn boundary_belongs_to_the_band_listing_it_as_upper_edge() {
        let indicator = ascending_indicator();
        assert_eq!(classify(30.0, &indicator).unwrap(), Color::Green);
        assert_eq!(classify(70.0, &indicator).unwrap(), Color::Orange);
        assert_eq!(classify(30.1, &indicator).unwrap(), Color::Orange);
        assert_eq!(classify(0.0, &indicator).unwrap(), Color::Green);
        assert_eq!(classify(100.0, &indicator).unwrap(), Color::Red);
    }

    #[test]
    fn inverted_tables_swap_the_comparison_direction() {
        let indicator = inverted_indicator();
        assert_eq!(classify(300.0, &indicator).unwrap(), Color::Red);
        assert_eq!(classify(200.0, &indicator).unwrap(), Color::Red);
        assert_eq!(classify(199.9, &indicator).unwrap(), Color::Orange);
        assert_eq!(classify(80.0, &indicator).unwrap(), Color::Orange);
        assert_eq!(classify(0.0, &indicator).unwrap(), Color::Green);
    }

    #[test]
    fn values_outside_all_bands_are_unclassified() {
        let indicator = ascending_indicator();
        assert!(matches!(
            classify(120.0, &indicator),
            Err(EngineError::UnclassifiedValue { .. })
        ));
        assert!(matches!(
            classify(-5.0, &indicator),
            Err(EngineError::UnclassifiedValue { .. })
        ));
        assert!(classify(f64::NAN, &indicator).is_err());
    }

    #[test]
    fn validation_rejects_gaps_and_overlaps() {
        let mut gapped = ascending_indicator();
        gapped.bands[1].low = 35.0;
        assert!(validate_bands(&gapped).is_err());

        let mut overlapping = ascending_indicator();
        overlapping.bands[1].high = 80.0;
        assert!(validate_bands(&overlapping).is_err());

        let mut short = ascending_indicator();
        short.bands.pop();
        assert!(validate_bands(&short).is_err());

        assert!(validate_bands(&ascending_indicator()).is_ok());
        assert!(validate_bands(&inverted_indicator()).is_ok());
    }
}
