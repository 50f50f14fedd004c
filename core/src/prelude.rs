use crate::model::{HitWindow, StageParameter};
use serde::{Deserialize, Serialize};

/// Common error type for core operations.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("{what} index {index} out of range ({available} available)")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        available: usize,
    },
    #[error("scoring strategy failure: {0}")]
    StrategyFailure(#[from] StrategyError),
    #[error("session is closed")]
    SessionClosed,
    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failure raised by a scoring strategy while evaluating a trial.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrategyError {
    #[error("missing stage parameter: {0}")]
    MissingParameter(String),
    #[error("device channel {0} not present in trial signal")]
    MissingChannel(usize),
    #[error("{0}")]
    Failed(String),
}

/// Kind of event a strategy reports for a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    ThresholdCrossing,
    SustainedHold,
    WindowExpired,
}

impl EventKind {
    /// Whether the event counts towards a hit when it lies inside the hit window.
    pub fn is_qualifying(self) -> bool {
        !matches!(self, EventKind::WindowExpired)
    }
}

/// Event produced while scoring a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub trial_index: usize,
    pub offset: usize,
    pub kind: EventKind,
}

impl ScoringEvent {
    pub fn new(trial_index: usize, offset: usize, kind: EventKind) -> Self {
        Self {
            trial_index,
            offset,
            kind,
        }
    }
}

/// Everything a strategy may look at when scoring one trial.
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub trial_index: usize,
    pub channels: &'a [Vec<f64>],
    pub device_channel: usize,
    pub parameters: &'a [StageParameter],
    pub window: HitWindow,
    pub sampling_rate_hz: f64,
}

impl<'a> ScoringRequest<'a> {
    pub fn device_signal(&self) -> Result<&'a [f64], StrategyError> {
        self.channels
            .get(self.device_channel)
            .map(Vec::as_slice)
            .ok_or(StrategyError::MissingChannel(self.device_channel))
    }

    pub fn parameter_value(&self, name: &str) -> Result<f64, StrategyError> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.current)
            .ok_or_else(|| StrategyError::MissingParameter(name.to_string()))
    }

    pub fn event(&self, offset: usize, kind: EventKind) -> ScoringEvent {
        ScoringEvent::new(self.trial_index, offset, kind)
    }
}

/// Pluggable per-stage scoring algorithm.
///
/// Implementations must be deterministic for identical requests and must not
/// keep state between calls; the scorer re-runs them during offline review and
/// expects the same events back. Bridges to external scripting engines plug in
/// here.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, request: &ScoringRequest<'_>) -> Result<Vec<ScoringEvent>, StrategyError>;
}
