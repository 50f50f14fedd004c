use crate::prelude::{CoreError, CoreResult};

pub struct StatsHelper;

impl StatsHelper {
    /// Folds one more sample into a running mean. `new_count` includes the new sample.
    pub fn iterative_mean(prev_mean: f64, new_sample: f64, new_count: usize) -> f64 {
        debug_assert!(new_count >= 1, "iterative_mean needs a positive count");
        if new_count <= 1 {
            return new_sample;
        }
        let n = new_count as f64;
        ((n - 1.0) / n) * prev_mean + (1.0 / n) * new_sample
    }

    pub fn mean(numbers: &[f64]) -> CoreResult<f64> {
        if numbers.is_empty() {
            return Err(CoreError::InvalidArgument("mean of empty sequence".into()));
        }
        Ok(numbers
            .iter()
            .enumerate()
            .fold(0.0, |acc, (i, &v)| Self::iterative_mean(acc, v, i + 1)))
    }

    pub fn median(numbers: &[f64]) -> CoreResult<f64> {
        if numbers.is_empty() {
            return Err(CoreError::InvalidArgument("median of empty sequence".into()));
        }
        let sorted = Self::sorted(numbers);
        let half = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Ok((sorted[half - 1] + sorted[half]) / 2.0)
        } else {
            Ok(sorted[half])
        }
    }

    /// Percentile with linear interpolation between closest ranks, `p` in `[0, 1]`.
    pub fn percentile(numbers: &[f64], p: f64) -> CoreResult<f64> {
        if numbers.is_empty() {
            return Err(CoreError::InvalidArgument(
                "percentile of empty sequence".into(),
            ));
        }
        if !(0.0..=1.0).contains(&p) {
            return Err(CoreError::InvalidArgument(format!(
                "percentile {} outside [0, 1]",
                p
            )));
        }
        let sorted = Self::sorted(numbers);
        let rank = p * (sorted.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let fraction = rank - lower as f64;
        Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
    }

    fn sorted(numbers: &[f64]) -> Vec<f64> {
        let mut sorted = numbers.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_odd_and_single() {
        assert_eq!(StatsHelper::median(&[1.0, 2.0, 3.0, 4.0]).unwrap(), 2.5);
        assert_eq!(StatsHelper::median(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
        assert_eq!(StatsHelper::median(&[5.0]).unwrap(), 5.0);
        assert_eq!(StatsHelper::median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
    }

    #[test]
    fn median_rejects_empty_input() {
        assert!(matches!(
            StatsHelper::median(&[]),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn iterative_mean_first_sample_ignores_previous_mean() {
        assert_eq!(StatsHelper::iterative_mean(123.0, 7.0, 1), 7.0);
        assert_eq!(StatsHelper::iterative_mean(f64::NAN, 7.0, 1), 7.0);
    }

    #[test]
    fn folded_iterative_mean_matches_batch_mean() {
        let samples = [3.5, -1.25, 8.0, 0.5, 12.75, 4.0, -6.5];
        let folded = samples
            .iter()
            .enumerate()
            .fold(0.0, |acc, (i, &v)| StatsHelper::iterative_mean(acc, v, i + 1));
        let batch = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((folded - batch).abs() < 1e-12);
        assert!((StatsHelper::mean(&samples).unwrap() - batch).abs() < 1e-12);
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(StatsHelper::percentile(&values, 0.0).unwrap(), 1.0);
        assert_eq!(StatsHelper::percentile(&values, 1.0).unwrap(), 4.0);
        assert_eq!(StatsHelper::percentile(&values, 0.5).unwrap(), 2.5);
        assert!((StatsHelper::percentile(&values, 0.25).unwrap() - 1.75).abs() < 1e-12);
        assert!(StatsHelper::percentile(&values, 1.5).is_err());
    }
}
