//! Timing Statistics
//!
//! Summaries of one timer across repeated runs of an experiment.

use serde::{Deserialize, Serialize};

/// Summary of a set of timings in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    /// Number of samples
    pub samples: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Median (linear interpolation)
    pub median: f64,
    /// Sample standard deviation (0 for a single sample)
    pub std_dev: f64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
}

/// Percentile of `samples` by linear interpolation between nearest ranks.
///
/// `pct` is clamped to `0..=100`.
pub fn percentile(samples: &[f64], pct: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    if samples.len() == 1 {
        return samples[0];
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    let fraction = rank - lower as f64;

    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

/// Summarize `samples`; `None` when there are none
pub fn summarize(samples: &[f64]) -> Option<TimingSummary> {
    if samples.is_empty() {
        return None;
    }

    let n = samples.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let std_dev = if n < 2 {
        0.0
    } else {
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    };

    Some(TimingSummary {
        samples: n,
        mean,
        median: percentile(samples, 50.0),
        std_dev,
        min: samples.iter().copied().fold(f64::INFINITY, f64::min),
        max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize() {
        let s = summarize(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(s.samples, 4);
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!((s.median - 2.5).abs() < 1e-12);
        assert!((s.std_dev - 1.290_994_448_735_805_6).abs() < 1e-9);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
    }

    #[test]
    fn test_single_and_empty() {
        let s = summarize(&[7.5]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.median, 7.5);
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_percentile_interpolates() {
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&samples, 50.0), 3.0);
        assert!((percentile(&samples, 90.0) - 4.6).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_out_of_range() {
        let samples = [3.0, 1.0, 2.0];
        assert_eq!(percentile(&samples, 250.0), 3.0);
        assert_eq!(percentile(&samples, -5.0), 1.0);
        assert_eq!(percentile(&samples, 100.0), 3.0);
    }
}
