use crate::config::ParameterSpec;
use std::collections::HashMap;

/// Extract a parameter as usize with a default value
pub fn get_param_usize(params: &HashMap<String, f64>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round().max(1.0) as usize)
        .unwrap_or(default)
}

/// Extract a parameter as f64 with a default value
pub fn get_param_f64(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Stable textual signature of a parameter map, used to deduplicate
/// candidate configurations.
pub fn parameter_signature(parameters: &HashMap<String, f64>) -> String {
    let mut sorted: Vec<_> = parameters.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    format!("{:?}", sorted)
}

/// Enumerates the full grid `[min, max]` at `step`, inclusive of both ends
/// (the maximum is included even when the last step overshoots within
/// epsilon). The currently active value is excluded; it is the champion.
pub fn enumerate_grid(spec: &ParameterSpec) -> Vec<f64> {
    let mut values = Vec::new();
    if spec.step <= 0.0 || spec.max < spec.min {
        return values;
    }

    let steps = ((spec.max - spec.min) / spec.step).round() as usize;
    for i in 0..=steps {
        let candidate = (spec.min + i as f64 * spec.step).min(spec.max);
        if (candidate - spec.active).abs() < 1e-9 {
            continue;
        }
        if values
            .last()
            .map(|last: &f64| (candidate - last).abs() < 1e-9)
            .unwrap_or(false)
        {
            continue;
        }
        values.push(candidate);
    }

    values
}
