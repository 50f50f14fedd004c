use crate::math::{MatrixHelper, StatsHelper};
use crate::model::parameter::{HIT_THRESHOLD, INITIATION_THRESHOLD};
use crate::model::{ParameterMode, Session, StreamKind, Trial};
use crate::prelude::{CoreError, CoreResult, ScoringStrategy};
use crate::processing::aggregator::SessionAggregator;
use crate::processing::sample_ring::SampleRing;
use crate::processing::scorer::{ScorerState, StageScorer, TrialOutcome};
use crate::telemetry::LogManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Linear map from raw device counts to calibrated units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCalibration {
    pub slope: f64,
    pub baseline: f64,
}

impl Default for DeviceCalibration {
    fn default() -> Self {
        Self {
            slope: 1.0,
            baseline: 0.0,
        }
    }
}

impl DeviceCalibration {
    pub fn apply(&self, raw: f64) -> f64 {
        self.slope * (raw - self.baseline)
    }

    /// Sets the baseline to the mean of raw samples taken at rest.
    pub fn rebaseline(&mut self, raw: &[f64]) -> CoreResult<f64> {
        self.baseline = StatsHelper::mean(raw)?;
        Ok(self.baseline)
    }
}

/// Finished trial as recorded in the session, with its outcome and summary line.
#[derive(Debug, Clone)]
pub struct TrialReport {
    pub trial: Trial,
    pub outcome: TrialOutcome,
    pub message: String,
}

/// Live acquisition path: rings per stream, trial initiation, scoring and recording.
pub struct Acquisition {
    session: Session,
    scorer: StageScorer,
    rings: Vec<Arc<SampleRing>>,
    calibration: DeviceCalibration,
    device_channel: usize,
    samples_seen: u64,
    logger: LogManager,
}

impl Acquisition {
    pub fn new(
        session: Session,
        strategy: Arc<dyn ScoringStrategy>,
        ring_capacity: usize,
    ) -> CoreResult<Self> {
        if session.is_closed() {
            return Err(CoreError::SessionClosed);
        }
        let stage = session.stage();
        let device_channel = stage.device_channel()?;
        let pre_trial = stage.samples_before_hit_window();
        if ring_capacity <= pre_trial {
            return Err(CoreError::InvalidArgument(format!(
                "ring capacity {} cannot hold {} pre-trial samples plus the initiating sample",
                ring_capacity, pre_trial
            )));
        }
        let rings = stage
            .streams
            .iter()
            .map(|_| SampleRing::with_capacity(ring_capacity).map(Arc::new))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            session,
            scorer: StageScorer::new(strategy),
            rings,
            calibration: DeviceCalibration::default(),
            device_channel,
            samples_seen: 0,
            logger: LogManager::scoped("acquisition"),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn scorer(&self) -> &StageScorer {
        &self.scorer
    }

    pub fn state(&self) -> ScorerState {
        self.scorer.state()
    }

    pub fn calibration(&self) -> DeviceCalibration {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: DeviceCalibration) {
        self.calibration = calibration;
    }

    pub fn rebaseline(&mut self, raw_device: &[f64]) -> CoreResult<f64> {
        let baseline = self.calibration.rebaseline(raw_device)?;
        self.logger.record(&format!("device baseline reset to {:.2}", baseline));
        Ok(baseline)
    }

    /// Shared handle to the ring buffering one stream, for read-only observers.
    pub fn ring(&self, kind: StreamKind) -> Option<Arc<SampleRing>> {
        self.session
            .stage()
            .streams
            .iter()
            .position(|k| *k == kind)
            .map(|position| Arc::clone(&self.rings[position]))
    }

    pub fn override_parameter(&mut self, name: &str, value: f64) -> CoreResult<()> {
        self.session.override_parameter(name, value)
    }

    /// Ingests one raw frame (one value per stream).
    pub fn push_frame(&mut self, raw: &[f64]) -> CoreResult<Option<TrialReport>> {
        self.check_width(raw)?;
        let mut frame = raw.to_vec();
        frame[self.device_channel] = self.calibration.apply(frame[self.device_channel]);
        self.ingest(frame)
    }

    /// Ingests a block of raw frames, one row per time step.
    pub fn push_frames(&mut self, frames: &[Vec<f64>]) -> CoreResult<Vec<TrialReport>> {
        for frame in frames {
            self.check_width(frame)?;
        }
        let mut streams = MatrixHelper::transpose(frames);
        if let Some(device) = streams.get_mut(self.device_channel) {
            for value in device.iter_mut() {
                *value = self.calibration.apply(*value);
            }
        }

        let mut reports = Vec::new();
        for step in 0..frames.len() {
            let frame: Vec<f64> = streams.iter().map(|stream| stream[step]).collect();
            if let Some(report) = self.ingest(frame)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Starts a trial without waiting for the initiation threshold.
    pub fn begin_trial(&mut self) -> CoreResult<()> {
        if self.scorer.state() == ScorerState::Sampling {
            return Err(CoreError::InvalidState("a trial is already sampling".into()));
        }
        self.start_trial()
    }

    /// Stops the running trial; it is recorded as unscorable.
    pub fn abort_trial(&mut self) -> CoreResult<TrialReport> {
        self.scorer.abort_trial()?;
        self.finish()
    }

    /// Ends the running trial now and scores whatever was collected.
    pub fn finalize_trial(&mut self) -> CoreResult<TrialReport> {
        if self.scorer.state() != ScorerState::Sampling {
            return Err(CoreError::InvalidState(format!(
                "no trial is sampling (state {:?})",
                self.scorer.state()
            )));
        }
        self.finish()
    }

    /// Closes the session. Fails while a trial is still sampling.
    pub fn into_session(mut self) -> CoreResult<Session> {
        if self.scorer.state() == ScorerState::Sampling {
            return Err(CoreError::InvalidState(
                "abort or finalize the running trial first".into(),
            ));
        }
        self.session.close();
        Ok(self.session)
    }

    fn check_width(&self, frame: &[f64]) -> CoreResult<()> {
        if frame.len() != self.rings.len() {
            return Err(CoreError::InvalidArgument(format!(
                "frame has {} values for {} streams",
                frame.len(),
                self.rings.len()
            )));
        }
        Ok(())
    }

    fn ingest(&mut self, frame: Vec<f64>) -> CoreResult<Option<TrialReport>> {
        self.samples_seen += 1;

        if self.scorer.state() != ScorerState::Sampling && self.initiation_crossed(&frame) {
            self.start_trial()?;
            if self.scorer.state().is_terminal() {
                self.push_rings(&frame);
                return self.finish().map(Some);
            }
        }

        self.push_rings(&frame);
        if self.scorer.state() != ScorerState::Sampling {
            return Ok(None);
        }
        let state = self.scorer.push_frame(self.session.stage(), &frame)?;
        if state.is_terminal() {
            return self.finish().map(Some);
        }
        Ok(None)
    }

    fn initiation_crossed(&self, frame: &[f64]) -> bool {
        let pre_trial = self.session.stage().samples_before_hit_window();
        let warmed_up = self.rings[self.device_channel].len() >= pre_trial;
        let threshold = self
            .session
            .stage()
            .parameter(INITIATION_THRESHOLD)
            .map(|p| p.current);
        match threshold {
            Some(threshold) => warmed_up && frame[self.device_channel] >= threshold,
            None => false,
        }
    }

    fn start_trial(&mut self) -> CoreResult<()> {
        let stage = self.session.stage();
        let pre_trial = stage.samples_before_hit_window();
        let buffered = self.rings[self.device_channel].len();
        if buffered < pre_trial {
            return Err(CoreError::InvalidState(format!(
                "only {} of {} pre-trial samples buffered",
                buffered, pre_trial
            )));
        }
        let seed: Vec<Vec<f64>> = self.rings.iter().map(|ring| ring.tail(pre_trial)).collect();
        let index = self.session.trials().len();
        let timestamp =
            self.session.start_time() + self.samples_seen as f64 / stage.sampling_rate_hz;
        self.scorer.begin_trial(stage, index, timestamp, seed)
    }

    fn push_rings(&self, frame: &[f64]) {
        for (ring, &value) in self.rings.iter().zip(frame) {
            ring.push(value);
        }
    }

    fn finish(&mut self) -> CoreResult<TrialReport> {
        let finished = self.scorer.finalize_trial(self.session.stage())?;
        let index = self.session.append_trial(finished.trial)?;

        let (extreme, message, adaptive) = {
            let stage = self.session.stage();
            let trial = self.session.trial(index)?;
            let adaptive = stage
                .parameter(HIT_THRESHOLD)
                .map_or(false, |p| p.mode == ParameterMode::Variable);
            (
                SessionAggregator::trial_hit_window_extreme(stage, trial).ok(),
                SessionAggregator::end_of_trial_message(stage, trial),
                adaptive,
            )
        };
        if let (Some(extreme), true) = (extreme, adaptive) {
            self.session.adapt_parameter(HIT_THRESHOLD, extreme)?;
        }

        for ring in &self.rings {
            ring.drain();
        }
        self.logger.record(&message);

        Ok(TrialReport {
            trial: self.session.trial(index)?.clone(),
            outcome: finished.outcome,
            message,
        })
    }
}
