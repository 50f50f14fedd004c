pub mod matrix;
pub mod signal;
pub mod stats;

pub use matrix::MatrixHelper;
pub use signal::{Peak, SignalHelper};
pub use stats::StatsHelper;
