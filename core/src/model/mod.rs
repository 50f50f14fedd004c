pub mod parameter;
pub mod session;
pub mod stage;
pub mod trial;

pub use parameter::{AdaptiveRule, ParameterMode, StageParameter};
pub use session::Session;
pub use stage::{HitWindow, Stage, StreamKind};
pub use trial::{Trial, TrialResult};
