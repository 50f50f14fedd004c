use crate::prelude::{CoreError, CoreResult};
use crate::model::parameter::StageParameter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Data stream produced by the motor board, one per trial channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Timestamp,
    DeviceValue,
    IrSensorValue,
    Unknown,
}

/// Sample range of the hit window; `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitWindow {
    pub start: usize,
    pub end: usize,
}

impl HitWindow {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when a signal of `available` samples covers the whole window.
    pub fn fits_within(&self, available: usize) -> bool {
        self.start <= self.end && self.end <= available
    }
}

/// Experimental protocol: timing, parameters and the streams every trial carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<StageParameter>,
    pub sampling_rate_hz: f64,
    pub pre_trial_seconds: f64,
    pub hit_window_seconds: f64,
    pub streams: Vec<StreamKind>,
}

impl Stage {
    pub fn new(
        name: impl Into<String>,
        sampling_rate_hz: f64,
        pre_trial_seconds: f64,
        hit_window_seconds: f64,
        streams: Vec<StreamKind>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            sampling_rate_hz,
            pre_trial_seconds,
            hit_window_seconds,
            streams,
        }
    }

    pub fn with_parameter(mut self, parameter: StageParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !(self.sampling_rate_hz.is_finite() && self.sampling_rate_hz > 0.0) {
            return Err(CoreError::InvalidArgument(format!(
                "stage {} sampling rate must be positive",
                self.name
            )));
        }
        for (label, value) in [
            ("pre-trial duration", self.pre_trial_seconds),
            ("hit window duration", self.hit_window_seconds),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CoreError::InvalidArgument(format!(
                    "stage {} {} must be non-negative",
                    self.name, label
                )));
            }
        }
        if self.streams.is_empty() {
            return Err(CoreError::InvalidArgument(format!(
                "stage {} declares no data streams",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for parameter in &self.parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(CoreError::InvalidArgument(format!(
                    "stage {} declares parameter {} twice",
                    self.name, parameter.name
                )));
            }
        }
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<&StageParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub(crate) fn parameter_mut(&mut self, name: &str) -> CoreResult<&mut StageParameter> {
        self.parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| CoreError::UnknownParameter(name.to_string()))
    }

    pub fn parameter_value(&self, name: &str) -> CoreResult<f64> {
        self.parameter(name)
            .map(|p| p.current)
            .ok_or_else(|| CoreError::UnknownParameter(name.to_string()))
    }

    pub fn samples_before_hit_window(&self) -> usize {
        self.seconds_to_samples(self.pre_trial_seconds)
    }

    pub fn samples_in_hit_window(&self) -> usize {
        self.hit_window().len()
    }

    /// `[round(rate * pre), round(rate * (pre + hit)))`
    pub fn hit_window(&self) -> HitWindow {
        HitWindow {
            start: self.samples_before_hit_window(),
            end: self.seconds_to_samples(self.pre_trial_seconds + self.hit_window_seconds),
        }
    }

    /// Samples a live trial records: through the window's closing index, so
    /// the inclusive summary window `[start, end]` is always covered.
    pub fn expected_trial_samples(&self) -> usize {
        self.hit_window().end + 1
    }

    pub fn sample_period_ms(&self) -> f64 {
        1000.0 / self.sampling_rate_hz
    }

    /// Position of the device value stream among the declared streams.
    pub fn device_channel(&self) -> CoreResult<usize> {
        self.streams
            .iter()
            .position(|kind| *kind == StreamKind::DeviceValue)
            .ok_or_else(|| {
                CoreError::InvalidArgument(format!(
                    "stage {} declares no device value stream",
                    self.name
                ))
            })
    }

    fn seconds_to_samples(&self, seconds: f64) -> usize {
        (self.sampling_rate_hz * seconds).round().max(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parameter::HIT_THRESHOLD;

    fn pull_stage() -> Stage {
        Stage::new(
            "PULL",
            100.0,
            1.0,
            2.0,
            vec![StreamKind::Timestamp, StreamKind::DeviceValue],
        )
        .with_parameter(StageParameter::fixed(HIT_THRESHOLD, "grams", 35.0))
    }

    #[test]
    fn hit_window_rounds_durations_to_samples() {
        let mut stage = pull_stage();
        stage.pre_trial_seconds = 0.504;
        stage.hit_window_seconds = 0.5;
        let window = stage.hit_window();
        assert_eq!(window, HitWindow { start: 50, end: 100 });
        assert_eq!(stage.expected_trial_samples(), 101);
        assert!(window.contains(50));
        assert!(!window.contains(100));
    }

    #[test]
    fn device_channel_follows_stream_order() {
        assert_eq!(pull_stage().device_channel().unwrap(), 1);
        let stage = Stage::new("NO DEVICE", 100.0, 1.0, 1.0, vec![StreamKind::Timestamp]);
        assert!(stage.device_channel().is_err());
    }

    #[test]
    fn validate_rejects_bad_timing_and_duplicates() {
        assert!(pull_stage().validate().is_ok());

        let mut stage = pull_stage();
        stage.sampling_rate_hz = 0.0;
        assert!(stage.validate().is_err());

        let stage = pull_stage().with_parameter(StageParameter::fixed(HIT_THRESHOLD, "grams", 1.0));
        assert!(stage.validate().is_err());
    }

    #[test]
    fn parameter_lookup_reports_unknown_names() {
        let stage = pull_stage();
        assert_eq!(stage.parameter_value(HIT_THRESHOLD).unwrap(), 35.0);
        assert!(matches!(
            stage.parameter_value("Lever Angle"),
            Err(CoreError::UnknownParameter(_))
        ));
    }
}
