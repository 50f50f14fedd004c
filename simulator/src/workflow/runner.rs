use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trakcore::model::Session;
use trakcore::processing::{
    Acquisition, ScorerState, SessionAggregator, SessionSummary, StageScorer, TrialOutcome,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub outcomes: Vec<TrialOutcome>,
    pub summary: SessionSummary,
    pub messages: Vec<String>,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Streams frames through live acquisition and returns the closed session.
    pub fn run_live(
        &self,
        session: Session,
        frames: &[Vec<f64>],
    ) -> anyhow::Result<(Session, WorkflowResult)> {
        let mut acquisition = Acquisition::new(
            session,
            self.config.scoring_strategy(),
            self.config.ring_capacity,
        )
        .context("starting acquisition")?;
        let mut reports = acquisition
            .push_frames(frames)
            .context("ingesting board frames")?;
        if acquisition.state() == ScorerState::Sampling {
            reports.push(
                acquisition
                    .finalize_trial()
                    .context("finalizing the last trial")?,
            );
        }

        let session = acquisition.into_session().context("closing session")?;
        let summary = SessionAggregator::session_summary(&session).context("summarising session")?;
        let messages = reports.iter().map(|report| report.message.clone()).collect();
        let outcomes = reports.into_iter().map(|report| report.outcome).collect();
        Ok((
            session,
            WorkflowResult {
                outcomes,
                summary,
                messages,
            },
        ))
    }

    /// Applies overrides, then re-scores every trial of a recorded session.
    pub fn review(
        &self,
        session: &mut Session,
        overrides: &BTreeMap<String, f64>,
    ) -> anyhow::Result<WorkflowResult> {
        session
            .override_parameters(overrides.iter().map(|(name, value)| (name.as_str(), *value)))
            .context("applying parameter overrides")?;
        let mut scorer = StageScorer::new(self.config.scoring_strategy());
        let outcomes = scorer
            .rescore_session(session)
            .context("re-scoring session")?;
        let summary = SessionAggregator::session_summary(session).context("summarising session")?;
        let messages = session
            .trials()
            .iter()
            .map(|trial| SessionAggregator::end_of_trial_message(session.stage(), trial))
            .collect();
        Ok(WorkflowResult {
            outcomes,
            summary,
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::build_frames;
    use crate::workflow::config::StrategyKind;
    use trakcore::model::parameter::HIT_THRESHOLD;
    use trakcore::model::TrialResult;

    fn live(cfg: WorkflowConfig) -> (Session, WorkflowResult) {
        let stage = cfg.to_stage().unwrap();
        let frames = build_frames(&cfg.generator, &stage).unwrap();
        let session = Session::new("R7", 0.0, stage).unwrap();
        Runner::new(cfg).run_live(session, &frames).unwrap()
    }

    fn with_hit_fraction(hit_fraction: f64) -> WorkflowConfig {
        let mut cfg = WorkflowConfig::from_args(3, 11);
        cfg.generator.hit_fraction = hit_fraction;
        cfg
    }

    #[test]
    fn runner_scores_every_simulated_pull() {
        let (session, result) = live(with_hit_fraction(1.0));
        assert!(session.is_closed());
        assert_eq!(result.outcomes.len(), 3);
        assert!(result
            .outcomes
            .iter()
            .all(|outcome| outcome.result == TrialResult::Hit));
        assert_eq!(result.summary.hits, 3);
        assert_eq!(result.summary.hit_rate, Some(1.0));
        assert!(result.messages[0].starts_with("Trial 1 HIT, maximal force = "));
    }

    #[test]
    fn weak_pulls_are_misses() {
        let (_, result) = live(with_hit_fraction(0.0));
        assert_eq!(result.summary.total, 3);
        assert_eq!(result.summary.misses, 3);
        assert_eq!(result.summary.hit_rate, Some(0.0));
    }

    #[test]
    fn sustained_strategy_scores_held_pulls() {
        let mut cfg = with_hit_fraction(1.0);
        cfg.strategy = StrategyKind::Sustained;
        cfg.hold_time_ms = Some(100.0);
        let (_, result) = live(cfg);
        assert_eq!(result.summary.hits, 3);
    }

    #[test]
    fn review_rescores_after_override() {
        let (session, _) = live(with_hit_fraction(1.0));
        let json = serde_json::to_string(&session).unwrap();
        let mut recorded: Session = serde_json::from_str(&json).unwrap();
        recorded.validate().unwrap();

        let runner = Runner::new(WorkflowConfig::default());
        let overrides = BTreeMap::from([(HIT_THRESHOLD.to_string(), 500.0)]);
        let result = runner.review(&mut recorded, &overrides).unwrap();
        assert_eq!(result.summary.misses, 3);
        assert_eq!(recorded.trial(0).unwrap().result(), TrialResult::Miss);
        assert_eq!(result.messages.len(), 3);
    }

    #[test]
    fn rejected_review_leaves_parameters_untouched() {
        let (mut session, _) = live(with_hit_fraction(1.0));
        let runner = Runner::new(WorkflowConfig::default());
        let overrides = BTreeMap::from([
            (HIT_THRESHOLD.to_string(), 999.0),
            ("Pellet Count".to_string(), 2.0),
        ]);
        assert!(runner.review(&mut session, &overrides).is_err());
        assert_eq!(session.count(TrialResult::Hit), 3);
        assert_eq!(
            session.stage().parameter_value(HIT_THRESHOLD).unwrap(),
            50.0
        );
    }
}
