use crate::types::SampleStats;
use statrs::statistics::{Data, Distribution};

/// Nearest-rank order statistic: the value at `floor((n - 1) * p)` of an
/// ascending slice.
fn nearest_rank(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((sorted.len() - 1) as f64 * p).floor() as usize;
    sorted.get(index).copied()
}

/// Summarize a sample set. Non-finite values are dropped first; an empty
/// (or all non-finite) input yields `count == 0` and no data elsewhere.
pub fn summarize(samples: &[f64]) -> SampleStats {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return SampleStats::default();
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let std_dev = if count >= 2 {
        Data::new(sorted.clone())
            .std_dev()
            .filter(|v| v.is_finite())
    } else {
        None
    };

    SampleStats {
        count,
        min: sorted.first().copied(),
        p50: nearest_rank(&sorted, 0.50),
        p95: nearest_rank(&sorted, 0.95),
        p99: nearest_rank(&sorted, 0.99),
        max: sorted.last().copied(),
        mean: Some(mean.round()),
        std_dev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_one_to_ten() {
        let samples: Vec<f64> = (1..=10).map(f64::from).collect();
        let stats = summarize(&samples);

        assert_eq!(stats.count, 10);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.p50, Some(5.0));
        assert_eq!(stats.p95, Some(9.0));
        assert_eq!(stats.p99, Some(9.0));
        assert_eq!(stats.max, Some(10.0));
        // 5.5 rounds half away from zero
        assert_eq!(stats.mean, Some(6.0));
    }

    #[test]
    fn test_summarize_sorts_unordered_input() {
        let stats = summarize(&[30.0, 10.0, 20.0]);
        assert_eq!(stats.min, Some(10.0));
        assert_eq!(stats.p50, Some(20.0));
        assert_eq!(stats.max, Some(30.0));
        assert_eq!(stats.mean, Some(20.0));
    }

    #[test]
    fn test_summarize_empty() {
        let stats = summarize(&[]);
        assert_eq!(stats, SampleStats::default());
        assert_eq!(stats.count, 0);
        assert!(stats.min.is_none());
        assert!(stats.p50.is_none());
        assert!(stats.mean.is_none());
    }

    #[test]
    fn test_summarize_all_non_finite() {
        let stats = summarize(&[f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        assert_eq!(stats.count, 0);
        assert!(stats.max.is_none());
        assert!(stats.p99.is_none());
    }

    #[test]
    fn test_summarize_filters_non_finite() {
        let stats = summarize(&[f64::NAN, 4.0, f64::INFINITY, 2.0]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, Some(2.0));
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.mean, Some(3.0));
    }

    #[test]
    fn test_summarize_single_sample() {
        let stats = summarize(&[123.45]);
        assert_eq!(stats.min, Some(123.45));
        assert_eq!(stats.p50, Some(123.45));
        assert_eq!(stats.p99, Some(123.45));
        assert_eq!(stats.mean, Some(123.0));
        assert!(stats.std_dev.is_none());
    }

    #[test]
    fn test_summarize_ordering_holds() {
        let samples = [812.0, 95.5, 301.2, 301.2, 44.0, 1020.7, 77.1, 650.0];
        let stats = summarize(&samples);
        let (min, p50, p95, p99, max) = (
            stats.min.unwrap(),
            stats.p50.unwrap(),
            stats.p95.unwrap(),
            stats.p99.unwrap(),
            stats.max.unwrap(),
        );
        assert!(min <= p50 && p50 <= p95 && p95 <= p99 && p99 <= max);
        assert!(stats.std_dev.unwrap() > 0.0);
    }
}
