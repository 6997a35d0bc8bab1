//! Cumulative integrator (trapezoidal rule)
//!
//! `S(T) = ∫ f dt`, `BXS(T) = ∫ S dt` and the size-only baseline
//! `BXScore(T) = ∫ W dt` all share one accumulator.
//!
//! The step `dt` is taken from the FIRST interval of the timestamp series and
//! reused for every later interval. Irregular sampling therefore biases the
//! integral; [`integrate_cumulative_per_interval`] is the separate algorithm
//! that uses each interval's own width.

use super::error::{EngineError, EngineResult};

/// Resumable trapezoidal accumulator with a fixed step
///
/// The first pushed value contributes nothing (cumulative value 0 at the
/// start of a series). Resuming from a persisted `(last value, total)` pair
/// continues the same sequence of additions a one-pass integration would make.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningIntegral {
    dt: f64,
    total: f64,
    prev: Option<f64>,
}

impl RunningIntegral {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            total: 0.0,
            prev: None,
        }
    }

    /// Continue a series whose last point was `prev_value` with running total `total`
    pub fn resume(dt: f64, prev_value: f64, total: f64) -> Self {
        Self {
            dt,
            total,
            prev: Some(prev_value),
        }
    }

    /// Add the next point and return the cumulative value at that point
    pub fn push(&mut self, value: f64) -> f64 {
        if let Some(prev) = self.prev {
            self.total += (value + prev) / 2.0 * self.dt;
        }
        self.prev = Some(value);
        self.total
    }
}

/// Trapezoidal running integral with a single step `dt`
///
/// `cumulative[0] = 0`, `cumulative[k] = cumulative[k-1] + (x[k] + x[k-1]) / 2 · dt`.
/// A series of length ≤ 1 yields `[0.0]`.
pub fn integrate_cumulative(series: &[f64], dt: f64) -> Vec<f64> {
    if series.len() <= 1 {
        return vec![0.0];
    }

    let mut integral = RunningIntegral::new(dt);
    series.iter().map(|&x| integral.push(x)).collect()
}

/// Check that timestamps are strictly increasing
pub fn validate_timestamps(timestamps: &[i64]) -> EngineResult<()> {
    if let Some(pair) = timestamps.windows(2).find(|w| w[1] <= w[0]) {
        return Err(EngineError::invalid(format!(
            "timestamps must be strictly increasing: {} followed by {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

fn validate_series(series: &[f64], timestamps: &[i64]) -> EngineResult<()> {
    if series.len() != timestamps.len() {
        return Err(EngineError::invalid(format!(
            "series length {} does not match timestamp count {}",
            series.len(),
            timestamps.len()
        )));
    }
    validate_timestamps(timestamps)
}

/// Step size used for a whole series: the width of its first interval
pub fn first_interval(timestamps: &[i64]) -> f64 {
    match timestamps {
        [first, second, ..] => (second - first) as f64,
        _ => 0.0,
    }
}

fn integrate_fixed_step(series: &[f64], timestamps: &[i64]) -> EngineResult<Vec<f64>> {
    validate_series(series, timestamps)?;
    Ok(integrate_cumulative(series, first_interval(timestamps)))
}

/// Cumulative durable claims S(T) from the flow series f(t)
pub fn integrate_s(f_series: &[f64], timestamps: &[i64]) -> EngineResult<Vec<f64>> {
    integrate_fixed_step(f_series, timestamps)
}

/// Bitcoin-Seconds BXS(T) from the cumulative series S(T)
pub fn integrate_bxs(s_series: &[f64], timestamps: &[i64]) -> EngineResult<Vec<f64>> {
    integrate_fixed_step(s_series, timestamps)
}

/// Size-only baseline BXScore(T) from raw holdings W(t)
pub fn compute_baseline_bxscore(w_series: &[f64], timestamps: &[i64]) -> EngineResult<Vec<f64>> {
    integrate_fixed_step(w_series, timestamps)
}

/// Trapezoidal running integral using each interval's own width
///
/// Matches [`integrate_cumulative`] when sampling is regular and diverges
/// whenever it is not.
pub fn integrate_cumulative_per_interval(series: &[f64], timestamps: &[i64]) -> EngineResult<Vec<f64>> {
    validate_series(series, timestamps)?;
    if series.len() <= 1 {
        return Ok(vec![0.0]);
    }

    let mut cumulative = Vec::with_capacity(series.len());
    let mut total = 0.0;
    cumulative.push(total);

    for k in 1..series.len() {
        let dt = (timestamps[k] - timestamps[k - 1]) as f64;
        total += (series[k] + series[k - 1]) / 2.0 * dt;
        cumulative.push(total);
    }

    Ok(cumulative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point_is_zero() {
        for (x, dt) in [(5.0, 600.0), (-3.2, 1.0), (0.0, 0.0), (1e12, 86_400.0)] {
            assert_eq!(integrate_cumulative(&[x], dt), vec![0.0]);
        }
        assert_eq!(integrate_cumulative(&[], 600.0), vec![0.0]);
    }

    #[test]
    fn test_integrate_s_worked_example() {
        let s = integrate_s(&[10.0, 20.0, 10.0], &[0, 600, 1200]).unwrap();
        assert_eq!(s, vec![0.0, 9000.0, 18000.0]);
    }

    #[test]
    fn test_bxs_double_integration() {
        let ts = [0, 600, 1200];
        let s = integrate_s(&[10.0, 20.0, 10.0], &ts).unwrap();
        let bxs = integrate_bxs(&s, &ts).unwrap();
        // (0 + 9000)/2·600 = 2.7e6, + (9000 + 18000)/2·600 = 8.1e6
        assert_eq!(bxs, vec![0.0, 2_700_000.0, 10_800_000.0]);
    }

    #[test]
    fn test_baseline_bxscore_constant_holdings() {
        let score = compute_baseline_bxscore(&[100.0; 4], &[0, 10, 20, 30]).unwrap();
        assert_eq!(score, vec![0.0, 1000.0, 2000.0, 3000.0]);
    }

    #[test]
    fn test_additive_across_split() {
        let dt = 600.0;
        let head = [1.5, -2.25, 3.125, 7.0, 0.3];
        let tail = [4.4, -1.1, 2.0, 9.75];
        let whole: Vec<f64> = head.iter().chain(tail.iter()).copied().collect();

        let one_pass = integrate_cumulative(&whole, dt);

        let head_result = integrate_cumulative(&head, dt);
        let mut resumed = RunningIntegral::resume(dt, head[head.len() - 1], head_result[head.len() - 1]);
        let tail_result: Vec<f64> = tail.iter().map(|&x| resumed.push(x)).collect();

        let stitched: Vec<f64> = head_result.into_iter().chain(tail_result).collect();
        assert_eq!(stitched, one_pass);
    }

    #[test]
    fn test_fixed_dt_from_first_interval() {
        // Irregular cadence: the second interval is twice as wide
        let ts = [0, 600, 1800];
        let fixed = integrate_s(&[1.0, 1.0, 1.0], &ts).unwrap();
        let per_interval = integrate_cumulative_per_interval(&[1.0, 1.0, 1.0], &ts).unwrap();

        assert_eq!(fixed, vec![0.0, 600.0, 1200.0]);
        assert_eq!(per_interval, vec![0.0, 600.0, 1800.0]);
    }

    #[test]
    fn test_per_interval_matches_on_regular_cadence() {
        let ts = [100, 160, 220, 280];
        let series = [2.0, 4.0, 8.0, 16.0];
        assert_eq!(
            integrate_s(&series, &ts).unwrap(),
            integrate_cumulative_per_interval(&series, &ts).unwrap()
        );
    }

    #[test]
    fn test_rejects_unordered_or_mismatched() {
        assert!(matches!(
            integrate_s(&[1.0, 2.0], &[600, 600]),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(integrate_bxs(&[1.0, 2.0, 3.0], &[0, 600, 300]).is_err());
        assert!(integrate_s(&[1.0, 2.0], &[0]).is_err());
        assert!(integrate_cumulative_per_interval(&[1.0], &[0, 1]).is_err());
    }

    #[test]
    fn test_deterministic() {
        let ts: Vec<i64> = (0..50).map(|k| k * 600).collect();
        let f: Vec<f64> = (0..50).map(|k| (k as f64 * 0.37).sin() * 1e4).collect();
        assert_eq!(integrate_s(&f, &ts).unwrap(), integrate_s(&f, &ts).unwrap());
    }
}
