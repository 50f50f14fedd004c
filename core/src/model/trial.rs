use crate::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Outcome recorded for a trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialResult {
    #[default]
    Unscored,
    Hit,
    Miss,
    Unscorable,
    ManualFeed,
}

impl TrialResult {
    /// Single-byte result code used by legacy session files.
    pub fn code(self) -> u8 {
        match self {
            TrialResult::Unscored => 0,
            TrialResult::Hit => b'H',
            TrialResult::Miss => b'M',
            TrialResult::ManualFeed => b'F',
            TrialResult::Unscorable => b'U',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrialResult::Unscored => "UNSCORED",
            TrialResult::Hit => "HIT",
            TrialResult::Miss => "MISS",
            TrialResult::Unscorable => "UNSCORABLE",
            TrialResult::ManualFeed => "MANUAL FEED",
        }
    }
}

/// One recorded trial. Channel data is fixed once the trial is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    index: usize,
    timestamp: f64,
    channels: Vec<Vec<f64>>,
    #[serde(default)]
    result: TrialResult,
}

impl Trial {
    pub fn new(index: usize, timestamp: f64, channels: Vec<Vec<f64>>) -> CoreResult<Self> {
        let trial = Self {
            index,
            timestamp,
            channels,
            result: TrialResult::Unscored,
        };
        trial.validate()?;
        Ok(trial)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let expected = self
            .channels
            .first()
            .map(Vec::len)
            .ok_or_else(|| CoreError::InvalidArgument("trial carries no channels".into()))?;
        if let Some((position, channel)) = self
            .channels
            .iter()
            .enumerate()
            .find(|(_, channel)| channel.len() != expected)
        {
            return Err(CoreError::InvalidArgument(format!(
                "trial {} channel {} holds {} samples, expected {}",
                self.index,
                position,
                channel.len(),
                expected
            )));
        }
        Ok(())
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn result(&self) -> TrialResult {
        self.result
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn channel(&self, position: usize) -> CoreResult<&[f64]> {
        self.channels
            .get(position)
            .map(Vec::as_slice)
            .ok_or(CoreError::IndexOutOfRange {
                what: "channel",
                index: position,
                available: self.channels.len(),
            })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub(crate) fn set_result(&mut self, result: TrialResult) {
        self.result = result;
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}
