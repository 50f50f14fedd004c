use crate::math::{Peak, SignalHelper, StatsHelper};
use crate::model::parameter::HIT_THRESHOLD;
use crate::model::{Session, Stage, Trial, TrialResult};
use crate::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Session-level numbers for the review overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: usize,
    pub hits: usize,
    pub misses: usize,
    pub unscorable: usize,
    pub manual_feeds: usize,
    pub unscored: usize,
    /// Hits over hits plus misses; `None` before any trial is scored.
    pub hit_rate: Option<f64>,
    /// Hit-window maximum per trial, `None` where the window was not recorded.
    pub extremes: Vec<Option<f64>>,
    pub median_extreme: Option<f64>,
    pub messages: Vec<String>,
}

/// Derives per-trial and per-session values from a session and its stage.
pub struct SessionAggregator;

impl SessionAggregator {
    /// Largest device value over `[start, end]`, both ends inclusive.
    pub fn trial_hit_window_extreme(stage: &Stage, trial: &Trial) -> CoreResult<f64> {
        let signal = Self::device_signal(stage, trial)?;
        let window = stage.hit_window();
        if window.start > window.end || window.end >= signal.len() {
            return Err(CoreError::IndexOutOfRange {
                what: "hit window end",
                index: window.end,
                available: signal.len(),
            });
        }
        Ok(signal[window.start..=window.end]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    pub fn trial_peaks(stage: &Stage, trial: &Trial) -> CoreResult<Vec<Peak>> {
        Ok(SignalHelper::find_peaks(Self::device_signal(stage, trial)?))
    }

    pub fn trial_derivative(stage: &Stage, trial: &Trial) -> CoreResult<Vec<f64>> {
        SignalHelper::diff(Self::device_signal(stage, trial)?)
    }

    pub fn trial_offset(stage: &Stage, trial: &Trial) -> CoreResult<Vec<f64>> {
        SignalHelper::offset_from_first(Self::device_signal(stage, trial)?)
    }

    /// One-line report shown after each trial.
    pub fn end_of_trial_message(stage: &Stage, trial: &Trial) -> String {
        let mut message = format!("Trial {} {}", trial.index() + 1, trial.result().label());
        if let Ok(extreme) = Self::trial_hit_window_extreme(stage, trial) {
            message.push_str(&format!(", maximal force = {}", extreme.floor()));
            if let Some(units) = stage
                .parameter(HIT_THRESHOLD)
                .map(|p| p.units.as_str())
                .filter(|units| !units.is_empty())
            {
                message.push(' ');
                message.push_str(units);
            }
        }
        message.push('.');
        message
    }

    pub fn session_summary(session: &Session) -> CoreResult<SessionSummary> {
        let stage = session.stage();
        stage.device_channel()?;

        let extremes: Vec<Option<f64>> = session
            .trials()
            .iter()
            .map(|trial| Self::trial_hit_window_extreme(stage, trial).ok())
            .collect();
        let recorded: Vec<f64> = extremes.iter().flatten().copied().collect();
        let median_extreme = StatsHelper::median(&recorded).ok();

        let hits = session.count(TrialResult::Hit);
        let misses = session.count(TrialResult::Miss);
        let scored = hits + misses;
        let hit_rate = (scored > 0).then(|| hits as f64 / scored as f64);

        let mut messages = vec![format!(
            "{}: {} trials, {} hits, {} misses",
            session.subject(),
            session.trials().len(),
            hits,
            misses
        )];
        if let Some(median) = median_extreme {
            messages.push(format!("Median peak force: {:.1}", median));
        }

        Ok(SessionSummary {
            total: session.trials().len(),
            hits,
            misses,
            unscorable: session.count(TrialResult::Unscorable),
            manual_feeds: session.count(TrialResult::ManualFeed),
            unscored: session.count(TrialResult::Unscored),
            hit_rate,
            extremes,
            median_extreme,
            messages,
        })
    }

    fn device_signal<'a>(stage: &Stage, trial: &'a Trial) -> CoreResult<&'a [f64]> {
        trial.channel(stage.device_channel()?)
    }
}
