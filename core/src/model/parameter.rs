use crate::math::StatsHelper;
use crate::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const HIT_THRESHOLD: &str = "Hit Threshold";
pub const INITIATION_THRESHOLD: &str = "Initiation Threshold";
/// Minimum hold duration in milliseconds for sustained-pull stages.
pub const HOLD_TIME: &str = "Hold Time";

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Whether a parameter stays put for the session or adapts trial by trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterMode {
    #[default]
    Fixed,
    Variable,
}

/// How a variable parameter derives its next value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptiveRule {
    #[default]
    Static,
    Median,
    Percentile25,
    Percentile75,
    Linear,
}

impl AdaptiveRule {
    fn uses_history(self) -> bool {
        matches!(
            self,
            AdaptiveRule::Median | AdaptiveRule::Percentile25 | AdaptiveRule::Percentile75
        )
    }
}

/// Named, bounded stage parameter with an observation history for adaptive rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageParameter {
    pub name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal: Option<String>,
    #[serde(default)]
    pub mode: ParameterMode,
    #[serde(default)]
    pub rule: AdaptiveRule,
    pub initial: f64,
    pub current: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub increment: f64,
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    history: VecDeque<f64>,
}

impl StageParameter {
    pub fn fixed(name: impl Into<String>, units: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            nominal: None,
            mode: ParameterMode::Fixed,
            rule: AdaptiveRule::Static,
            initial: value,
            current: value,
            minimum: None,
            maximum: None,
            increment: 0.0,
            history: VecDeque::new(),
        }
    }

    pub fn adaptive(
        name: impl Into<String>,
        units: impl Into<String>,
        rule: AdaptiveRule,
        initial: f64,
        increment: f64,
    ) -> Self {
        Self {
            mode: ParameterMode::Variable,
            rule,
            increment,
            ..Self::fixed(name, units, initial)
        }
    }

    pub fn with_bounds(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn with_nominal(mut self, nominal: impl Into<String>) -> Self {
        self.nominal = Some(nominal.into());
        self
    }

    pub fn validate_value(&self, value: f64) -> CoreResult<()> {
        if !value.is_finite() {
            return Err(CoreError::InvalidArgument(format!(
                "{} must be finite, got {}",
                self.name, value
            )));
        }
        let below = self.minimum.map_or(false, |min| value < min);
        let above = self.maximum.map_or(false, |max| value > max);
        if below || above {
            return Err(CoreError::InvalidArgument(format!(
                "{} value {} outside [{}, {}]",
                self.name,
                value,
                self.minimum.unwrap_or(f64::NEG_INFINITY),
                self.maximum.unwrap_or(f64::INFINITY)
            )));
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.history.clear();
    }

    /// Observations kept for history-based rules. A positive increment sets the limit.
    pub fn history_limit(&self) -> usize {
        if self.rule.uses_history() && self.increment >= 1.0 {
            self.increment.round() as usize
        } else {
            DEFAULT_HISTORY_LIMIT
        }
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn record_observation(&mut self, value: f64) {
        self.history.push_back(value);
        while self.history.len() > self.history_limit() {
            self.history.pop_front();
        }
    }

    /// Recomputes the current value from the adaptive rule. Returns whether it changed.
    pub fn adapt(&mut self) -> CoreResult<bool> {
        if self.mode != ParameterMode::Variable {
            return Ok(false);
        }
        let before = self.current;
        match self.rule {
            AdaptiveRule::Static => {}
            AdaptiveRule::Linear => {
                self.current = self.clamp(self.current + self.increment);
            }
            rule => {
                if self.history.len() < self.history_limit() {
                    return Ok(false);
                }
                let observed: Vec<f64> = self.history.iter().copied().collect();
                let statistic = match rule {
                    AdaptiveRule::Percentile25 => StatsHelper::percentile(&observed, 0.25)?,
                    AdaptiveRule::Percentile75 => StatsHelper::percentile(&observed, 0.75)?,
                    _ => StatsHelper::median(&observed)?,
                };
                self.current = self.clamp(statistic);
            }
        }
        Ok(self.current != before)
    }

    fn clamp(&self, value: f64) -> f64 {
        let value = self.minimum.map_or(value, |min| value.max(min));
        self.maximum.map_or(value, |max| value.min(max))
    }
}
