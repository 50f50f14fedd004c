use crate::model::parameter::HIT_THRESHOLD;
use crate::prelude::{EventKind, ScoringEvent, ScoringRequest, ScoringStrategy, StrategyError};

/// Scores a hit when the device signal crosses the hit threshold inside the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdCrossing;

impl ScoringStrategy for ThresholdCrossing {
    fn name(&self) -> &str {
        "threshold-crossing"
    }

    fn evaluate(&self, request: &ScoringRequest<'_>) -> Result<Vec<ScoringEvent>, StrategyError> {
        let threshold = request.parameter_value(HIT_THRESHOLD)?;
        let signal = request.device_signal()?;
        let window = request.window;
        let end = window.end.min(signal.len());

        let mut events = Vec::new();
        for offset in window.start..end {
            let above = signal[offset] >= threshold;
            let rising = offset == window.start || signal[offset - 1] < threshold;
            if above && rising {
                events.push(request.event(offset, EventKind::ThresholdCrossing));
            }
        }

        if events.is_empty() {
            events.push(request.event(window.end, EventKind::WindowExpired));
        }
        Ok(events)
    }
}
