use serde::{Deserialize, Serialize};

/// Summary of per-sample generation latencies, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencyMetrics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
}

impl LatencyMetrics {
    pub fn from_measurements(measurements: &[f64]) -> Self {
        if measurements.is_empty() {
            return Self::default();
        }

        let mut sorted = measurements.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
        }
    }
}

/// Nearest-rank percentile over already sorted values.
pub fn percentile(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (percentile / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_latency_summary() {
        let metrics = LatencyMetrics::from_measurements(&[0.4, 0.1, 0.3, 0.2, 0.5]);
        assert_eq!(metrics.count, 5);
        assert_relative_eq!(metrics.min, 0.1);
        assert_relative_eq!(metrics.max, 0.5);
        assert_relative_eq!(metrics.mean, 0.3, epsilon = 1e-9);
        assert_relative_eq!(metrics.p50, 0.3);
    }

    #[test]
    fn test_empty_measurements() {
        assert_eq!(LatencyMetrics::from_measurements(&[]), LatencyMetrics::default());
    }
}
