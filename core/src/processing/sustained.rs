use crate::model::parameter::{HIT_THRESHOLD, HOLD_TIME};
use crate::prelude::{EventKind, ScoringEvent, ScoringRequest, ScoringStrategy, StrategyError};

/// Scores a hit once the device signal has stayed at or above the hit
/// threshold for the hold time (milliseconds). Pulls that start before the
/// window still count if the hold completes inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SustainedHold;

impl ScoringStrategy for SustainedHold {
    fn name(&self) -> &str {
        "sustained-hold"
    }

    fn evaluate(&self, request: &ScoringRequest<'_>) -> Result<Vec<ScoringEvent>, StrategyError> {
        let threshold = request.parameter_value(HIT_THRESHOLD)?;
        let hold_ms = request.parameter_value(HOLD_TIME)?;
        if !(request.sampling_rate_hz.is_finite() && request.sampling_rate_hz > 0.0) {
            return Err(StrategyError::Failed(format!(
                "sampling rate {} cannot time a hold",
                request.sampling_rate_hz
            )));
        }
        let period_ms = 1000.0 / request.sampling_rate_hz;
        let signal = request.device_signal()?;

        let mut events = Vec::new();
        let mut run_start: Option<usize> = None;
        let mut reported = false;

        for (offset, &value) in signal.iter().enumerate() {
            if value < threshold {
                run_start = None;
                reported = false;
                continue;
            }
            let start = *run_start.get_or_insert(offset);
            let held_ms = (offset - start + 1) as f64 * period_ms;
            if !reported && held_ms >= hold_ms {
                events.push(request.event(offset, EventKind::SustainedHold));
                reported = true;
            }
        }

        if !events.iter().any(|e| request.window.contains(e.offset)) {
            events.push(request.event(request.window.end, EventKind::WindowExpired));
        }
        Ok(events)
    }
}
