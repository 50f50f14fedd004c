use crate::generator::profile::GeneratorConfig;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use trakcore::model::parameter::{HIT_THRESHOLD, HOLD_TIME, INITIATION_THRESHOLD};
use trakcore::model::{AdaptiveRule, Stage, StageParameter, StreamKind};
use trakcore::processing::{SustainedHold, ThresholdCrossing};
use trakcore::ScoringStrategy;

/// Built-in scoring strategy selected by the workflow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Threshold,
    Sustained,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub stage_name: String,
    pub sampling_rate_hz: f64,
    pub pre_trial_seconds: f64,
    pub hit_window_seconds: f64,
    pub units: String,
    pub hit_threshold: f64,
    pub initiation_threshold: f64,
    /// Makes the hit threshold adaptive when set.
    pub adaptive_rule: Option<AdaptiveRule>,
    pub threshold_increment: f64,
    pub threshold_min: Option<f64>,
    pub threshold_max: Option<f64>,
    pub hold_time_ms: Option<f64>,
    pub strategy: StrategyKind,
    pub ring_capacity: usize,
    pub generator: GeneratorConfig,
    /// Parameter overrides applied before re-scoring a recorded session.
    pub overrides: BTreeMap<String, f64>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            stage_name: "PULL".into(),
            sampling_rate_hz: 100.0,
            pre_trial_seconds: 1.0,
            hit_window_seconds: 2.0,
            units: "grams".into(),
            hit_threshold: 50.0,
            initiation_threshold: 10.0,
            adaptive_rule: None,
            threshold_increment: 5.0,
            threshold_min: None,
            threshold_max: None,
            hold_time_ms: None,
            strategy: StrategyKind::Threshold,
            ring_capacity: 500,
            generator: GeneratorConfig::default(),
            overrides: BTreeMap::new(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(trials: usize, seed: u64) -> Self {
        let mut config = Self::default();
        config.generator.trials = trials;
        config.generator.seed = seed;
        config
    }

    pub fn to_stage(&self) -> anyhow::Result<Stage> {
        let mut hit = match self.adaptive_rule {
            Some(rule) => StageParameter::adaptive(
                HIT_THRESHOLD,
                self.units.as_str(),
                rule,
                self.hit_threshold,
                self.threshold_increment,
            ),
            None => StageParameter::fixed(HIT_THRESHOLD, self.units.as_str(), self.hit_threshold),
        };
        if let (Some(min), Some(max)) = (self.threshold_min, self.threshold_max) {
            hit = hit.with_bounds(min, max);
        }

        let mut stage = Stage::new(
            self.stage_name.as_str(),
            self.sampling_rate_hz,
            self.pre_trial_seconds,
            self.hit_window_seconds,
            vec![StreamKind::Timestamp, StreamKind::DeviceValue],
        )
        .with_parameter(hit)
        .with_parameter(StageParameter::fixed(
            INITIATION_THRESHOLD,
            self.units.as_str(),
            self.initiation_threshold,
        ));

        match (self.strategy, self.hold_time_ms) {
            (_, Some(hold)) => {
                stage = stage.with_parameter(StageParameter::fixed(HOLD_TIME, "ms", hold));
            }
            (StrategyKind::Sustained, None) => {
                bail!("stage {} uses the sustained strategy without hold_time_ms", self.stage_name)
            }
            (StrategyKind::Threshold, None) => {}
        }

        stage
            .validate()
            .with_context(|| format!("validating stage {}", self.stage_name))?;
        Ok(stage)
    }

    pub fn scoring_strategy(&self) -> Arc<dyn ScoringStrategy> {
        match self.strategy {
            StrategyKind::Threshold => Arc::new(ThresholdCrossing),
            StrategyKind::Sustained => Arc::new(SustainedHold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use trakcore::model::ParameterMode;

    #[test]
    fn config_from_args_produces_stage() {
        let cfg = WorkflowConfig::from_args(4, 9);
        let stage = cfg.to_stage().unwrap();
        assert_eq!(cfg.generator.trials, 4);
        assert_eq!(stage.hit_window().start, 100);
        assert_eq!(stage.expected_trial_samples(), 301);
        assert_eq!(stage.parameter_value(HIT_THRESHOLD).unwrap(), 50.0);
        assert!(stage.parameter(HOLD_TIME).is_none());
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        let yaml = "\
stage_name: HOLD
hit_threshold: 80
adaptive_rule: Median
strategy: sustained
hold_time_ms: 250
overrides:
  Hit Threshold: 60
";
        temp.write_all(yaml.as_bytes()).unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.strategy, StrategyKind::Sustained);
        assert_eq!(cfg.overrides[HIT_THRESHOLD], 60.0);
        assert_eq!(cfg.sampling_rate_hz, 100.0);

        let stage = cfg.to_stage().unwrap();
        let hit = stage.parameter(HIT_THRESHOLD).unwrap();
        assert_eq!(hit.mode, ParameterMode::Variable);
        assert_eq!(hit.rule, AdaptiveRule::Median);
        assert_eq!(stage.parameter_value(HOLD_TIME).unwrap(), 250.0);
        assert_eq!(cfg.scoring_strategy().name(), "sustained-hold");
    }

    #[test]
    fn sustained_strategy_requires_hold_time() {
        let cfg = WorkflowConfig {
            strategy: StrategyKind::Sustained,
            ..WorkflowConfig::default()
        };
        assert!(cfg.to_stage().is_err());
    }

    #[test]
    fn invalid_stage_timing_is_rejected() {
        let cfg = WorkflowConfig {
            sampling_rate_hz: 0.0,
            ..WorkflowConfig::default()
        };
        assert!(cfg.to_stage().is_err());
    }
}
