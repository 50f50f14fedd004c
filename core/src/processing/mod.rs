pub mod acquisition;
pub mod aggregator;
pub mod sample_ring;
pub mod scorer;
pub mod sustained;
pub mod threshold;

pub use acquisition::{Acquisition, DeviceCalibration, TrialReport};
pub use aggregator::{SessionAggregator, SessionSummary};
pub use sample_ring::SampleRing;
pub use scorer::{FinishedTrial, ScorerState, StageScorer, TrialOutcome, UnscorableReason};
pub use sustained::SustainedHold;
pub use threshold::ThresholdCrossing;
