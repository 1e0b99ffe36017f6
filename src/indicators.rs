use crate::models::Bar;

/// Pure indicator calculators over trailing windows of daily bars.
///
/// Series functions return one value per input index; indices where the
/// indicator is not yet defined (insufficient trailing history) carry
/// `f64::NAN`. `value_at` converts that sentinel into an `Option` for
/// point reads. No calculator raises for short or degenerate input.

pub fn value_at(series: &[f64], index: usize) -> Option<f64> {
    series
        .get(index)
        .copied()
        .filter(|value| value.is_finite())
}

pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut sma = vec![f64::NAN; n];
    if period == 0 || n < period {
        return sma;
    }

    let mut window_sum: f64 = values[..period].iter().sum();
    sma[period - 1] = window_sum / period as f64;
    for i in period..n {
        window_sum += values[i] - values[i - period];
        sma[i] = window_sum / period as f64;
    }
    sma
}

/// EMA with multiplier 2/(period+1), seeded by the SMA of the first
/// `period` values. Undefined before index `period - 1`.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut ema = vec![f64::NAN; n];
    if period == 0 || n < period {
        return ema;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    ema[period - 1] = seed;
    for i in period..n {
        ema[i] = (values[i] - ema[i - 1]) * multiplier + ema[i - 1];
    }
    ema
}

pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD line = EMA(fast) - EMA(slow); the signal line is an EMA of the
/// defined portion of the MACD line, seeded the same SMA way.
pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdSeries {
    let n = closes.len();
    let fast = calculate_ema(closes, fast_period);
    let slow = calculate_ema(closes, slow_period);

    let mut macd = vec![f64::NAN; n];
    for i in 0..n {
        if fast[i].is_finite() && slow[i].is_finite() {
            macd[i] = fast[i] - slow[i];
        }
    }

    let mut signal = vec![f64::NAN; n];
    let first_defined = macd.iter().position(|v| v.is_finite());
    if let Some(start) = first_defined {
        let defined: Vec<f64> = macd[start..].to_vec();
        let signal_tail = calculate_ema(&defined, signal_period);
        for (offset, value) in signal_tail.into_iter().enumerate() {
            signal[start + offset] = value;
        }
    }

    let mut histogram = vec![f64::NAN; n];
    for i in 0..n {
        if macd[i].is_finite() && signal[i].is_finite() {
            histogram[i] = macd[i] - signal[i];
        }
    }

    MacdSeries {
        macd,
        signal,
        histogram,
    }
}

/// Wilder RSI. Undefined before index `period`.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut rsi = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return rsi;
    }

    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..n {
        let delta = closes[i] - closes[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    rsi
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

pub struct StochasticSeries {
    pub percent_k: Vec<f64>,
    pub percent_d: Vec<f64>,
}

/// Stochastic oscillator. %K = (close - LL) / (HH - LL) * 100 over
/// `k_period` bars; %D is the `d_period` SMA of the defined %K values.
/// A flat window (HH == LL) reports the 50 midpoint.
pub fn calculate_stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    d_period: usize,
) -> StochasticSeries {
    let n = closes.len();
    let mut percent_k = vec![f64::NAN; n];
    if k_period == 0 || n < k_period {
        return StochasticSeries {
            percent_k,
            percent_d: vec![f64::NAN; n],
        };
    }

    for i in (k_period - 1)..n {
        let window_start = i + 1 - k_period;
        let highest = highs[window_start..=i]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = lows[window_start..=i]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);

        percent_k[i] = if highest > lowest {
            (closes[i] - lowest) / (highest - lowest) * 100.0
        } else {
            50.0
        };
    }

    let start = k_period - 1;
    let defined: Vec<f64> = percent_k[start..].to_vec();
    let d_tail = calculate_sma(&defined, d_period);
    let mut percent_d = vec![f64::NAN; n];
    for (offset, value) in d_tail.into_iter().enumerate() {
        percent_d[start + offset] = value;
    }

    StochasticSeries {
        percent_k,
        percent_d,
    }
}

/// Wilder ATR. Undefined before index `period`.
pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut atr = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return atr;
    }

    let mut tr_sum = 0.0f64;
    let mut prev_atr = f64::NAN;
    for i in 1..n {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());

        if i <= period {
            tr_sum += tr;
            if i == period {
                prev_atr = tr_sum / period as f64;
                atr[i] = prev_atr;
            }
        } else {
            prev_atr = (prev_atr * (period as f64 - 1.0) + tr) / period as f64;
            atr[i] = prev_atr;
        }
    }

    atr
}

pub struct BollingerSeries {
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    pub width: Vec<f64>,
}

/// Bollinger bands: SMA(period) +/- multiplier * population standard
/// deviation of the window. Width = upper - lower.
pub fn calculate_bollinger(closes: &[f64], period: usize, multiplier: f64) -> BollingerSeries {
    let n = closes.len();
    let middle = calculate_sma(closes, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    let mut width = vec![f64::NAN; n];

    if period == 0 || n < period {
        return BollingerSeries {
            middle,
            upper,
            lower,
            width,
        };
    }

    for i in (period - 1)..n {
        let window_start = i + 1 - period;
        let mean = middle[i];
        let variance = closes[window_start..=i]
            .iter()
            .map(|&value| (value - mean).powi(2))
            .sum::<f64>()
            / period as f64;
        let deviation = variance.sqrt();

        upper[i] = mean + multiplier * deviation;
        lower[i] = mean - multiplier * deviation;
        width[i] = upper[i] - lower[i];
    }

    BollingerSeries {
        middle,
        upper,
        lower,
        width,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Floor-trader pivot levels from the prior day's high/low/close.
pub fn pivot_levels(prior: &Bar) -> PivotLevels {
    let pivot = (prior.high + prior.low + prior.close) / 3.0;
    PivotLevels {
        pivot,
        r1: 2.0 * pivot - prior.low,
        s1: 2.0 * pivot - prior.high,
        r2: pivot + (prior.high - prior.low),
        s2: pivot - (prior.high - prior.low),
        r3: prior.high + 2.0 * (pivot - prior.low),
        s3: prior.low - 2.0 * (prior.high - pivot),
    }
}

/// Close divided by the prior day's pivot. Undefined at index 0 and for a
/// non-positive pivot.
pub fn calculate_close_pivot(bars: &[&Bar]) -> Vec<f64> {
    let n = bars.len();
    let mut ratios = vec![f64::NAN; n];
    for i in 1..n {
        let pivot = pivot_levels(bars[i - 1]).pivot;
        if pivot > 0.0 {
            ratios[i] = bars[i].close / pivot;
        }
    }
    ratios
}

/// Volume / open interest liquidity ratio. Undefined when open interest is
/// not positive.
pub fn calculate_vol_oi(bars: &[&Bar]) -> Vec<f64> {
    bars.iter()
        .map(|bar| {
            if bar.open_interest > 0 {
                bar.volume as f64 / bar.open_interest as f64
            } else {
                f64::NAN
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            date: date.parse().unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000,
            open_interest: 4_000,
            implied_volatility: None,
            net_commercial_position: None,
        }
    }

    #[test]
    fn sma_is_undefined_until_window_fills() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(sma[0].is_nan());
        assert!(sma[1].is_nan());
        assert!((sma[2] - 2.0).abs() < 1e-12);
        assert!((sma[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn ema_seeds_with_simple_average() {
        let values = [2.0, 4.0, 6.0, 8.0];
        let ema = calculate_ema(&values, 3);
        assert!(ema[1].is_nan());
        assert!((ema[2] - 4.0).abs() < 1e-12);
        // multiplier 0.5: 4 + (8 - 4) * 0.5
        assert!((ema[3] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn rsi_saturates_on_monotonic_closes() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + 2.0 * i as f64).collect();
        let rsi = calculate_rsi(&closes, 14);
        assert!(rsi[13].is_nan());
        assert!((rsi[14] - 100.0).abs() < 1e-9);
        assert!(rsi[29] > 99.0);

        let falling: Vec<f64> = (0..30).map(|i| 200.0 - 2.0 * i as f64).collect();
        let rsi = calculate_rsi(&falling, 14);
        assert!(rsi[29] < 1.0);
    }

    #[test]
    fn rsi_matches_wilder_smoothing_by_hand() {
        // One loss after 14 straight gains of 1.0.
        let mut closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        closes.push(closes[14] - 7.0);
        let rsi = calculate_rsi(&closes, 14);

        let avg_gain = (1.0 * 13.0) / 14.0;
        let avg_loss = 7.0 / 14.0;
        let expected = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert!((rsi[15] - expected).abs() < 1e-9);
    }

    #[test]
    fn stochastic_reports_midpoint_for_flat_window() {
        let flat = [5.0; 6];
        let series = calculate_stochastic(&flat, &flat, &flat, 5, 3);
        assert!((series.percent_k[4] - 50.0).abs() < 1e-12);
        assert!((series.percent_k[5] - 50.0).abs() < 1e-12);
    }

    #[test]
    fn stochastic_k_spans_full_range() {
        let highs = [10.0, 11.0, 12.0, 13.0, 14.0];
        let lows = [9.0, 10.0, 11.0, 12.0, 13.0];
        let closes = [9.5, 10.5, 11.5, 12.5, 14.0];
        let series = calculate_stochastic(&highs, &lows, &closes, 5, 3);
        // Close at the highest high of the window.
        assert!((series.percent_k[4] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn atr_uses_wilder_smoothing() {
        let highs = [11.0, 12.0, 13.0, 12.5, 13.5];
        let lows = [9.0, 10.0, 11.0, 10.5, 11.5];
        let closes = [10.0, 11.0, 12.0, 11.0, 13.0];
        let atr = calculate_atr(&highs, &lows, &closes, 3);

        assert!(atr[2].is_nan());
        // First three true ranges are all 2.0.
        assert!((atr[3] - 2.0).abs() < 1e-12);
        // Next TR = max(13.5-11.5, |13.5-11|, |11.5-11|) = 2.5.
        assert!((atr[4] - (2.0 * 2.0 + 2.5) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_brackets_the_mean() {
        let closes = [10.0, 12.0, 14.0, 16.0, 18.0];
        let bands = calculate_bollinger(&closes, 5, 2.0);
        assert!((bands.middle[4] - 14.0).abs() < 1e-12);
        let variance = closes.iter().map(|c| (c - 14.0_f64).powi(2)).sum::<f64>() / 5.0;
        let expected = 2.0 * variance.sqrt();
        assert!((bands.upper[4] - (14.0 + expected)).abs() < 1e-12);
        assert!((bands.lower[4] - (14.0 - expected)).abs() < 1e-12);
        assert!((bands.width[4] - 2.0 * expected).abs() < 1e-12);
    }

    #[test]
    fn pivot_levels_follow_floor_trader_formula() {
        let prior = bar("2024-03-04", 100.0, 110.0, 90.0, 105.0);
        let levels = pivot_levels(&prior);
        let pivot = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((levels.pivot - pivot).abs() < 1e-12);
        assert!((levels.r1 - (2.0 * pivot - 90.0)).abs() < 1e-12);
        assert!((levels.s1 - (2.0 * pivot - 110.0)).abs() < 1e-12);
        assert!((levels.r2 - (pivot + 20.0)).abs() < 1e-12);
        assert!((levels.s2 - (pivot - 20.0)).abs() < 1e-12);
        assert!((levels.r3 - (110.0 + 2.0 * (pivot - 90.0))).abs() < 1e-12);
        assert!((levels.s3 - (90.0 - 2.0 * (110.0 - pivot))).abs() < 1e-12);
    }

    #[test]
    fn vol_oi_is_undefined_without_open_interest() {
        let mut a = bar("2024-03-04", 1.0, 2.0, 0.5, 1.5);
        a.volume = 500;
        a.open_interest = 2_000;
        let mut b = bar("2024-03-05", 1.0, 2.0, 0.5, 1.5);
        b.open_interest = 0;

        let series = calculate_vol_oi(&[&a, &b]);
        assert!((series[0] - 0.25).abs() < 1e-12);
        assert!(series[1].is_nan());
    }

    #[test]
    fn macd_signal_defined_after_slow_plus_signal_warmup() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let series = calculate_macd(&closes, 12, 26, 9);
        assert!(series.macd[24].is_nan());
        assert!(series.macd[25].is_finite());
        assert!(series.signal[32].is_nan());
        assert!(series.signal[33].is_finite());
        assert!(series.histogram[33].is_finite());
    }

    #[test]
    fn short_input_yields_all_undefined() {
        let closes = [100.0, 101.0];
        assert!(calculate_rsi(&closes, 14).iter().all(|v| v.is_nan()));
        assert!(calculate_ema(&closes, 12).iter().all(|v| v.is_nan()));
        assert!(value_at(&calculate_rsi(&closes, 14), 1).is_none());
    }
}
