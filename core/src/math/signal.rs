use crate::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Local extremum reported by [`SignalHelper::find_peaks`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub value: f64,
    pub index: usize,
}

pub struct SignalHelper;

impl SignalHelper {
    /// Re-references a signal so its first sample becomes zero.
    pub fn offset_from_first(signal: &[f64]) -> CoreResult<Vec<f64>> {
        let first = *signal
            .first()
            .ok_or_else(|| CoreError::InvalidArgument("offset of empty signal".into()))?;
        Ok(signal.iter().map(|v| v - first).collect())
    }

    pub fn diff(signal: &[f64]) -> CoreResult<Vec<f64>> {
        Self::diff_range(signal, 0, signal.len())
    }

    /// First difference over `[start, start + count]`, both ends inclusive.
    ///
    /// Output length always matches the input. Samples outside the range pass
    /// through untouched. Where `i + 1` runs off the end, the previous
    /// difference is repeated; this keeps the length stable but is not a true
    /// derivative at the boundary. Fails with `InvalidArgument` when there is
    /// no earlier difference to repeat, i.e. the first in-range element is the
    /// last sample.
    pub fn diff_range(signal: &[f64], start: usize, count: usize) -> CoreResult<Vec<f64>> {
        if signal.is_empty() {
            return Err(CoreError::InvalidArgument("diff of empty signal".into()));
        }
        let last_in_range = start.saturating_add(count);
        let mut output = Vec::with_capacity(signal.len());
        let mut previous: Option<f64> = None;

        for i in 0..signal.len() {
            if i < start || i > last_in_range {
                output.push(signal[i]);
            } else if i + 1 < signal.len() {
                let delta = signal[i + 1] - signal[i];
                previous = Some(delta);
                output.push(delta);
            } else {
                let repeated = previous.ok_or_else(|| {
                    CoreError::InvalidArgument(format!(
                        "no difference available to repeat at index {}",
                        i
                    ))
                })?;
                output.push(repeated);
            }
        }

        Ok(output)
    }

    /// Reversal-based peak scan.
    ///
    /// While looking for a maximum, any drop below the running max emits that
    /// max as a peak and flips to tracking minima; any rise above the running
    /// min flips back. There is no hysteresis, so every reversal counts.
    pub fn find_peaks(signal: &[f64]) -> Vec<Peak> {
        let mut peaks = Vec::new();
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        let mut max_index = 0;
        let mut looking_for_max = true;

        for (i, &value) in signal.iter().enumerate() {
            if value > max {
                max = value;
                max_index = i;
            }
            if value < min {
                min = value;
            }

            if looking_for_max {
                if value < max {
                    peaks.push(Peak {
                        value: max,
                        index: max_index,
                    });
                    min = value;
                    looking_for_max = false;
                }
            } else if value > min {
                max = value;
                max_index = i;
                looking_for_max = true;
            }
        }

        peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_from_first_zeroes_first_sample() {
        let out = SignalHelper::offset_from_first(&[5.0, 7.0, 4.0]).unwrap();
        assert_eq!(out, vec![0.0, 2.0, -1.0]);
        assert!(SignalHelper::offset_from_first(&[]).is_err());
    }

    #[test]
    fn diff_repeats_last_difference_at_boundary() {
        let out = SignalHelper::diff_range(&[1.0, 4.0, 9.0, 16.0], 0, 3).unwrap();
        assert_eq!(out, vec![3.0, 5.0, 7.0, 7.0]);
        assert_eq!(SignalHelper::diff(&[1.0, 4.0, 9.0, 16.0]).unwrap(), out);
    }

    #[test]
    fn diff_passes_through_samples_outside_range() {
        let out = SignalHelper::diff_range(&[1.0, 2.0, 4.0, 7.0, 11.0, 16.0], 1, 2).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 11.0, 16.0]);
    }

    #[test]
    fn diff_without_any_difference_fails() {
        assert!(SignalHelper::diff(&[3.0]).is_err());
        assert!(SignalHelper::diff(&[]).is_err());
    }

    #[test]
    fn diff_range_starting_on_last_sample_fails() {
        let result = SignalHelper::diff_range(&[1.0, 2.0, 4.0], 2, 5);
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
        assert!(SignalHelper::diff_range(&[1.0, 2.0, 4.0], 1, 5).is_ok());
    }

    #[test]
    fn find_peaks_ignores_monotonic_input() {
        assert!(SignalHelper::find_peaks(&[1.0, 2.0, 3.0, 4.0]).is_empty());
    }

    #[test]
    fn find_peaks_reports_each_reversal() {
        let peaks = SignalHelper::find_peaks(&[1.0, 3.0, 2.0, 5.0, 1.0]);
        assert_eq!(
            peaks,
            vec![
                Peak {
                    value: 3.0,
                    index: 1
                },
                Peak {
                    value: 5.0,
                    index: 3
                }
            ]
        );
    }
}
