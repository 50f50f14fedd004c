use crate::model::{HitWindow, Session, Stage, Trial, TrialResult};
use crate::prelude::{
    CoreError, CoreResult, ScoringEvent, ScoringRequest, ScoringStrategy, StrategyError,
};
use crate::telemetry::{LogManager, MetricsRecorder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Phase of the scoring state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScorerState {
    Idle,
    Sampling,
    Evaluating,
    Hit,
    Miss,
    Unscorable,
}

impl ScorerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScorerState::Hit | ScorerState::Miss | ScorerState::Unscorable
        )
    }
}

/// Why a trial could not be classified as hit or miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnscorableReason {
    InsufficientSamples { required: usize, available: usize },
    Aborted { collected: usize },
    StrategyFailure(StrategyError),
    InvalidSignal(String),
}

impl fmt::Display for UnscorableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnscorableReason::InsufficientSamples {
                required,
                available,
            } => write!(f, "needs {} samples, recorded {}", required, available),
            UnscorableReason::Aborted { collected } => {
                write!(f, "aborted after {} samples", collected)
            }
            UnscorableReason::StrategyFailure(err) => write!(f, "strategy failure: {}", err),
            UnscorableReason::InvalidSignal(msg) => write!(f, "invalid signal: {}", msg),
        }
    }
}

/// Result of evaluating one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub trial_index: usize,
    pub result: TrialResult,
    pub window: HitWindow,
    pub events: Vec<ScoringEvent>,
    pub hit_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unscorable: Option<UnscorableReason>,
}

impl TrialOutcome {
    fn unscorable(trial_index: usize, window: HitWindow, reason: UnscorableReason) -> Self {
        Self {
            trial_index,
            result: TrialResult::Unscorable,
            window,
            events: Vec::new(),
            hit_offset: None,
            unscorable: Some(reason),
        }
    }

    pub fn state(&self) -> ScorerState {
        match self.result {
            TrialResult::Hit => ScorerState::Hit,
            TrialResult::Miss => ScorerState::Miss,
            _ => ScorerState::Unscorable,
        }
    }
}

/// Trial handed back once the scorer reaches a terminal state.
#[derive(Debug, Clone)]
pub struct FinishedTrial {
    pub trial: Trial,
    pub outcome: TrialOutcome,
}

struct ActiveTrial {
    index: usize,
    timestamp: f64,
    channels: Vec<Vec<f64>>,
    window: HitWindow,
    expected: usize,
}

impl ActiveTrial {
    fn collected(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Drives one trial at a time from sampling to a terminal classification.
///
/// The stage is passed into every call rather than stored, so review code can
/// override parameters on the session and re-score with the same scorer.
pub struct StageScorer {
    strategy: Arc<dyn ScoringStrategy>,
    state: ScorerState,
    active: Option<ActiveTrial>,
    pending: Option<FinishedTrial>,
    state_tx: watch::Sender<ScorerState>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl StageScorer {
    pub fn new(strategy: Arc<dyn ScoringStrategy>) -> Self {
        Self::with_metrics(strategy, Arc::new(MetricsRecorder::new()))
    }

    pub fn with_metrics(strategy: Arc<dyn ScoringStrategy>, metrics: Arc<MetricsRecorder>) -> Self {
        let (state_tx, _) = watch::channel(ScorerState::Idle);
        Self {
            strategy,
            state: ScorerState::Idle,
            active: None,
            pending: None,
            state_tx,
            metrics,
            logger: LogManager::scoped("scorer"),
        }
    }

    pub fn state(&self) -> ScorerState {
        self.state
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ScorerState> {
        self.state_tx.subscribe()
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Samples gathered so far for the trial in progress.
    pub fn collected(&self) -> usize {
        self.active.as_ref().map_or(0, ActiveTrial::collected)
    }

    /// Scores a full trial signal without touching the state machine.
    pub fn evaluate(
        &self,
        stage: &Stage,
        trial_index: usize,
        channels: &[Vec<f64>],
    ) -> TrialOutcome {
        let window = stage.hit_window();

        let device_channel = match stage.device_channel() {
            Ok(position) => position,
            Err(err) => {
                return TrialOutcome::unscorable(
                    trial_index,
                    window,
                    UnscorableReason::InvalidSignal(err.to_string()),
                )
            }
        };
        if channels.len() != stage.streams.len() {
            return TrialOutcome::unscorable(
                trial_index,
                window,
                UnscorableReason::InvalidSignal(format!(
                    "{} channels for {} declared streams",
                    channels.len(),
                    stage.streams.len()
                )),
            );
        }

        let available = channels.iter().map(Vec::len).min().unwrap_or(0);
        if !window.fits_within(available) {
            return TrialOutcome::unscorable(
                trial_index,
                window,
                UnscorableReason::InsufficientSamples {
                    required: window.end,
                    available,
                },
            );
        }

        let request = ScoringRequest {
            trial_index,
            channels,
            device_channel,
            parameters: &stage.parameters,
            window,
            sampling_rate_hz: stage.sampling_rate_hz,
        };
        let mut events = match self.strategy.evaluate(&request) {
            Ok(events) => events,
            Err(err) => {
                self.metrics.record_strategy_failure();
                self.logger.warn(&format!(
                    "{} failed on trial {}: {}",
                    self.strategy.name(),
                    trial_index,
                    err
                ));
                return TrialOutcome::unscorable(
                    trial_index,
                    window,
                    UnscorableReason::StrategyFailure(err),
                );
            }
        };
        events.sort_by_key(|event| event.offset);

        let hit_offset = events
            .iter()
            .find(|event| event.kind.is_qualifying() && window.contains(event.offset))
            .map(|event| event.offset);
        let result = if hit_offset.is_some() {
            TrialResult::Hit
        } else {
            TrialResult::Miss
        };

        TrialOutcome {
            trial_index,
            result,
            window,
            events,
            hit_offset,
            unscorable: None,
        }
    }

    /// Starts sampling a trial, seeded with its pre-trial samples.
    pub fn begin_trial(
        &mut self,
        stage: &Stage,
        trial_index: usize,
        timestamp: f64,
        pre_trial: Vec<Vec<f64>>,
    ) -> CoreResult<()> {
        if matches!(self.state, ScorerState::Sampling | ScorerState::Evaluating) {
            return Err(CoreError::InvalidState(format!(
                "cannot begin trial {} while {:?}",
                trial_index, self.state
            )));
        }
        if self.pending.is_some() {
            return Err(CoreError::InvalidState(
                "previous trial has not been finalized".into(),
            ));
        }
        if pre_trial.len() != stage.streams.len() {
            return Err(CoreError::InvalidArgument(format!(
                "pre-trial data has {} channels, stage declares {}",
                pre_trial.len(),
                stage.streams.len()
            )));
        }
        let seeded = pre_trial.first().map_or(0, Vec::len);
        if pre_trial.iter().any(|channel| channel.len() != seeded) {
            return Err(CoreError::InvalidArgument(
                "pre-trial channels differ in length".into(),
            ));
        }

        self.active = Some(ActiveTrial {
            index: trial_index,
            timestamp,
            channels: pre_trial,
            window: stage.hit_window(),
            expected: stage.expected_trial_samples(),
        });
        self.transition(ScorerState::Sampling);
        self.logger.record(&format!(
            "trial {} sampling ({} of {} samples seeded)",
            trial_index,
            seeded,
            stage.expected_trial_samples()
        ));

        if seeded >= stage.expected_trial_samples() {
            self.complete(stage)?;
        }
        Ok(())
    }

    /// Adds one sample per channel to the trial in progress.
    pub fn push_frame(&mut self, stage: &Stage, frame: &[f64]) -> CoreResult<ScorerState> {
        let active = match (self.state, self.active.as_mut()) {
            (ScorerState::Sampling, Some(active)) => active,
            _ => {
                return Err(CoreError::InvalidState(format!(
                    "no trial is sampling (state {:?})",
                    self.state
                )))
            }
        };
        if frame.len() != active.channels.len() {
            return Err(CoreError::InvalidArgument(format!(
                "frame has {} values for {} channels",
                frame.len(),
                active.channels.len()
            )));
        }
        for (channel, &value) in active.channels.iter_mut().zip(frame) {
            channel.push(value);
        }
        if active.collected() >= active.expected {
            self.complete(stage)?;
        }
        Ok(self.state)
    }

    /// Stops the trial in progress; it becomes unscorable and awaits finalization.
    pub fn abort_trial(&mut self) -> CoreResult<TrialOutcome> {
        if self.state != ScorerState::Sampling {
            return Err(CoreError::InvalidState(format!(
                "nothing to abort (state {:?})",
                self.state
            )));
        }
        let active = self.take_active()?;
        let collected = active.collected();
        let outcome = TrialOutcome::unscorable(
            active.index,
            active.window,
            UnscorableReason::Aborted { collected },
        );
        self.logger
            .warn(&format!("trial {} aborted after {} samples", active.index, collected));
        self.settle(active, outcome.clone())?;
        Ok(outcome)
    }

    /// Hands back the finished trial, evaluating early if sampling was cut short.
    pub fn finalize_trial(&mut self, stage: &Stage) -> CoreResult<FinishedTrial> {
        if self.state == ScorerState::Sampling {
            self.complete(stage)?;
        }
        self.pending.take().ok_or_else(|| {
            CoreError::InvalidState(format!("no trial to finalize (state {:?})", self.state))
        })
    }

    /// Re-evaluates a recorded trial. Not allowed while a live trial is sampling.
    pub fn rescore(&mut self, stage: &Stage, trial: &Trial) -> CoreResult<TrialOutcome> {
        if matches!(self.state, ScorerState::Sampling | ScorerState::Evaluating) {
            return Err(CoreError::InvalidState(format!(
                "cannot re-score trial {} while {:?}",
                trial.index(),
                self.state
            )));
        }
        self.transition(ScorerState::Evaluating);
        let outcome = self.evaluate(stage, trial.index(), trial.channels());
        self.metrics.record_result(outcome.result);
        self.transition(outcome.state());
        Ok(outcome)
    }

    /// Re-scores every trial of a session and writes the results back.
    ///
    /// Trials marked as manual feeds keep their result. A failing trial becomes
    /// unscorable and the pass continues.
    pub fn rescore_session(&mut self, session: &mut Session) -> CoreResult<Vec<TrialOutcome>> {
        let stage = session.stage().clone();
        let mut outcomes = Vec::with_capacity(session.trials().len());
        for index in 0..session.trials().len() {
            let (outcome, previous) = {
                let trial = session.trial(index)?;
                (self.rescore(&stage, trial)?, trial.result())
            };
            if previous != TrialResult::ManualFeed {
                session.set_result(index, outcome.result)?;
            }
            outcomes.push(outcome);
        }
        self.logger.record(&format!(
            "re-scored {} trials with {}",
            outcomes.len(),
            self.strategy.name()
        ));
        Ok(outcomes)
    }

    fn complete(&mut self, stage: &Stage) -> CoreResult<()> {
        let active = self.take_active()?;
        self.transition(ScorerState::Evaluating);
        let outcome = self.evaluate(stage, active.index, &active.channels);
        self.settle(active, outcome)
    }

    fn settle(&mut self, active: ActiveTrial, outcome: TrialOutcome) -> CoreResult<()> {
        let index = active.index;
        let mut trial = match Trial::new(index, active.timestamp, active.channels) {
            Ok(trial) => trial,
            Err(err) => {
                self.logger.warn(&format!("trial {} dropped: {}", index, err));
                self.transition(ScorerState::Idle);
                return Err(err);
            }
        };
        trial.set_result(outcome.result);
        self.metrics.record_result(outcome.result);
        match &outcome.unscorable {
            Some(reason) => self.logger.warn(&format!(
                "trial {} unscorable: {}",
                outcome.trial_index, reason
            )),
            None => self.logger.record(&format!(
                "trial {} {}",
                outcome.trial_index,
                outcome.result.label()
            )),
        }
        self.transition(outcome.state());
        self.pending = Some(FinishedTrial { trial, outcome });
        Ok(())
    }

    fn take_active(&mut self) -> CoreResult<ActiveTrial> {
        self.active
            .take()
            .ok_or_else(|| CoreError::InvalidState("no active trial".into()))
    }

    fn transition(&mut self, next: ScorerState) {
        self.state = next;
        self.state_tx.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parameter::HIT_THRESHOLD;
    use crate::model::{StageParameter, StreamKind};
    use crate::prelude::EventKind;
    use crate::processing::threshold::ThresholdCrossing;

    struct Failing;

    impl ScoringStrategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn evaluate(&self, _: &ScoringRequest<'_>) -> Result<Vec<ScoringEvent>, StrategyError> {
            Err(StrategyError::Failed("script raised".into()))
        }
    }

    // 10 Hz, 0.3 s pre-trial, 0.5 s window -> window [3, 8), 9 samples recorded
    fn stage() -> Stage {
        Stage::new(
            "PULL",
            10.0,
            0.3,
            0.5,
            vec![StreamKind::Timestamp, StreamKind::DeviceValue],
        )
        .with_parameter(StageParameter::fixed(HIT_THRESHOLD, "grams", 10.0))
    }

    fn channels(device: Vec<f64>) -> Vec<Vec<f64>> {
        let timestamps = (0..device.len()).map(|i| i as f64 * 0.1).collect();
        vec![timestamps, device]
    }

    fn scorer() -> StageScorer {
        StageScorer::new(Arc::new(ThresholdCrossing))
    }

    #[test]
    fn first_qualifying_event_decides_the_hit() {
        let signal = vec![0.0, 0.0, 0.0, 1.0, 12.0, 2.0, 15.0, 0.0];
        let outcome = scorer().evaluate(&stage(), 0, &channels(signal));
        assert_eq!(outcome.result, TrialResult::Hit);
        assert_eq!(outcome.hit_offset, Some(4));
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[1].offset, 6);
    }

    #[test]
    fn crossing_before_window_is_a_miss() {
        let signal = vec![0.0, 20.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let outcome = scorer().evaluate(&stage(), 0, &channels(signal));
        assert_eq!(outcome.result, TrialResult::Miss);
        assert_eq!(outcome.events[0].kind, EventKind::WindowExpired);
    }

    #[test]
    fn short_trial_is_unscorable() {
        let outcome = scorer().evaluate(&stage(), 2, &channels(vec![0.0, 0.0, 50.0, 50.0]));
        assert_eq!(outcome.result, TrialResult::Unscorable);
        assert_eq!(
            outcome.unscorable,
            Some(UnscorableReason::InsufficientSamples {
                required: 8,
                available: 4
            })
        );
    }

    #[test]
    fn live_trial_runs_to_terminal_state() {
        let stage = stage();
        let mut scorer = scorer();
        let states = scorer.subscribe();

        scorer
            .begin_trial(&stage, 0, 0.0, channels(vec![0.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(scorer.state(), ScorerState::Sampling);
        assert_eq!(*states.borrow(), ScorerState::Sampling);

        for (i, value) in [0.0, 11.0, 3.0, 0.0, 0.0].into_iter().enumerate() {
            let state = scorer
                .push_frame(&stage, &[0.3 + i as f64 * 0.1, value])
                .unwrap();
            assert_eq!(state, ScorerState::Sampling);
        }
        let state = scorer.push_frame(&stage, &[0.8, 0.0]).unwrap();
        assert_eq!(state, ScorerState::Hit);
        assert_eq!(*states.borrow(), ScorerState::Hit);

        let finished = scorer.finalize_trial(&stage).unwrap();
        assert_eq!(finished.trial.sample_count(), 9);
        assert_eq!(finished.trial.result(), TrialResult::Hit);
        assert_eq!(finished.outcome.hit_offset, Some(4));
        assert!(scorer.finalize_trial(&stage).is_err());
    }

    #[test]
    fn abort_marks_trial_unscorable() {
        let stage = stage();
        let mut scorer = scorer();
        scorer
            .begin_trial(&stage, 0, 0.0, channels(vec![0.0, 0.0, 0.0]))
            .unwrap();
        scorer.push_frame(&stage, &[0.3, 20.0]).unwrap();

        let outcome = scorer.abort_trial().unwrap();
        assert_eq!(outcome.result, TrialResult::Unscorable);
        assert_eq!(
            outcome.unscorable,
            Some(UnscorableReason::Aborted { collected: 4 })
        );
        assert_eq!(scorer.state(), ScorerState::Unscorable);

        let finished = scorer.finalize_trial(&stage).unwrap();
        assert_eq!(finished.trial.result(), TrialResult::Unscorable);
        assert!(scorer.abort_trial().is_err());
    }

    #[test]
    fn early_finalize_evaluates_what_was_collected() {
        let stage = stage();
        let mut scorer = scorer();
        scorer
            .begin_trial(&stage, 0, 0.0, channels(vec![0.0, 0.0, 0.0]))
            .unwrap();
        let finished = scorer.finalize_trial(&stage).unwrap();
        assert_eq!(finished.outcome.result, TrialResult::Unscorable);
        assert!(matches!(
            finished.outcome.unscorable,
            Some(UnscorableReason::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn rescore_is_refused_while_sampling() {
        let stage = stage();
        let mut scorer = scorer();
        let trial = Trial::new(0, 0.0, channels(vec![0.0; 8])).unwrap();
        scorer
            .begin_trial(&stage, 1, 0.0, channels(vec![0.0, 0.0, 0.0]))
            .unwrap();
        assert!(matches!(
            scorer.rescore(&stage, &trial),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn rescore_is_idempotent() {
        let stage = stage();
        let mut scorer = scorer();
        let trial = Trial::new(0, 0.0, channels(vec![0.0, 0.0, 0.0, 0.0, 30.0, 0.0, 30.0, 0.0]))
            .unwrap();
        let first = scorer.rescore(&stage, &trial).unwrap();
        let first_state = scorer.state();
        let second = scorer.rescore(&stage, &trial).unwrap();
        assert_eq!(first, second);
        assert_eq!(first_state, scorer.state());
        assert_eq!(scorer.state(), ScorerState::Hit);
    }

    #[test]
    fn strategy_failure_only_affects_its_trial() {
        let stage = stage();
        let trials = vec![
            Trial::new(0, 0.0, channels(vec![0.0; 8])).unwrap(),
            Trial::new(1, 1.0, channels(vec![0.0; 8])).unwrap(),
        ];
        let mut session = Session::from_parts("R7", 0.0, stage, trials).unwrap();
        let mut scorer = StageScorer::new(Arc::new(Failing));

        let outcomes = scorer.rescore_session(&mut session).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(
            o.unscorable,
            Some(UnscorableReason::StrategyFailure(StrategyError::Failed(_)))
        )));
        assert_eq!(session.count(TrialResult::Unscorable), 2);
        assert_eq!(scorer.metrics().snapshot().strategy_failures, 2);
    }

    #[test]
    fn rescore_after_override_changes_result() {
        let stage = stage();
        let signal = vec![0.0, 0.0, 0.0, 8.0, 9.0, 8.0, 0.0, 0.0];
        let trials = vec![Trial::new(0, 0.0, channels(signal)).unwrap()];
        let mut session = Session::from_parts("R7", 0.0, stage, trials).unwrap();
        let mut scorer = scorer();

        scorer.rescore_session(&mut session).unwrap();
        assert_eq!(session.trial(0).unwrap().result(), TrialResult::Miss);

        session.override_parameter(HIT_THRESHOLD, 8.5).unwrap();
        assert_eq!(session.trial(0).unwrap().result(), TrialResult::Miss);
        scorer.rescore_session(&mut session).unwrap();
        assert_eq!(session.trial(0).unwrap().result(), TrialResult::Hit);
    }

    #[test]
    fn unbuildable_trial_returns_scorer_to_idle() {
        let bare = Stage::new("BARE", 10.0, 0.3, 0.5, Vec::new());
        let mut scorer = scorer();

        scorer.begin_trial(&bare, 0, 0.0, Vec::new()).unwrap();
        assert!(scorer.finalize_trial(&bare).is_err());
        assert_eq!(scorer.state(), ScorerState::Idle);

        scorer.begin_trial(&bare, 1, 0.0, Vec::new()).unwrap();
        assert!(scorer.abort_trial().is_err());
        assert_eq!(scorer.state(), ScorerState::Idle);

        let stage = stage();
        scorer
            .begin_trial(&stage, 2, 0.0, channels(vec![0.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(scorer.state(), ScorerState::Sampling);
    }
}
