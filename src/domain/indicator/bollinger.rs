//! Bollinger bands: SMA(n) middle band, upper/lower at `mult` population
//! standard deviations. The first (n-1) points are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_bollinger(
    candles: &[Candle],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Bollinger {
        period,
        stddev_mult_x100,
    };
    if period == 0 {
        return IndicatorSeries::empty(indicator_type);
    }

    let mult = stddev_mult_x100 as f64 / 100.0;
    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let valid = i + 1 >= period;
            let (upper, middle, lower) = if valid {
                let window = &candles[i + 1 - period..=i];
                let middle = window.iter().map(|c| c.close).sum::<f64>() / period as f64;
                let variance = window
                    .iter()
                    .map(|c| (c.close - middle).powi(2))
                    .sum::<f64>()
                    / period as f64;
                let spread = mult * variance.sqrt();
                (middle + spread, middle, middle - spread)
            } else {
                (0.0, 0.0, 0.0)
            };
            IndicatorPoint {
                ts: candle.ts,
                valid,
                value: IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::hourly;

    fn bands(series: &IndicatorSeries, i: usize) -> (f64, f64, f64) {
        match series.values[i].value {
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => (upper, middle, lower),
            other => panic!("expected bands, got {other:?}"),
        }
    }

    #[test]
    fn bollinger_warmup() {
        let series = calculate_bollinger(&hourly(&[1.0, 2.0, 3.0, 4.0]), 3, 200);
        let valid: Vec<bool> = series.values.iter().map(|p| p.valid).collect();
        assert_eq!(valid, vec![false, false, true, true]);
    }

    #[test]
    fn flat_prices_collapse_bands() {
        let series = calculate_bollinger(&hourly(&[5.0; 4]), 3, 200);
        let (upper, middle, lower) = bands(&series, 3);
        assert!((upper - 5.0).abs() < f64::EPSILON);
        assert!((middle - 5.0).abs() < f64::EPSILON);
        assert!((lower - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn population_standard_deviation() {
        // mean 5, population stddev 2 for [2, 4, 4, 4, 5, 5, 7, 9]
        let closes = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let series = calculate_bollinger(&hourly(&closes), 8, 200);
        let (upper, middle, lower) = bands(&series, 7);
        assert!((middle - 5.0).abs() < 1e-9);
        assert!((upper - 9.0).abs() < 1e-9);
        assert!((lower - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_period_is_empty() {
        assert!(calculate_bollinger(&hourly(&[1.0]), 0, 200).values.is_empty());
    }
}
