use crate::prelude::{CoreError, CoreResult};
use crate::model::stage::Stage;
use crate::model::trial::{Trial, TrialResult};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// In-memory session: one stage and the ordered trials recorded against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    subject: String,
    start_time: f64,
    stage: Stage,
    #[serde(default)]
    trials: Vec<Trial>,
    #[serde(default)]
    closed: bool,
}

impl Session {
    pub fn new(subject: impl Into<String>, start_time: f64, stage: Stage) -> CoreResult<Self> {
        stage.validate()?;
        Ok(Self {
            subject: subject.into(),
            start_time,
            stage,
            trials: Vec::new(),
            closed: false,
        })
    }

    /// Builds a fully materialized, closed session for review.
    pub fn from_parts(
        subject: impl Into<String>,
        start_time: f64,
        stage: Stage,
        trials: Vec<Trial>,
    ) -> CoreResult<Self> {
        let mut session = Self::new(subject, start_time, stage)?;
        for trial in trials {
            session.append_trial(trial)?;
        }
        session.close();
        Ok(session)
    }

    /// Checks stage and trial invariants, e.g. after deserializing.
    pub fn validate(&self) -> CoreResult<()> {
        self.stage.validate()?;
        for (position, trial) in self.trials.iter().enumerate() {
            trial.validate()?;
            if trial.index() != position {
                return Err(CoreError::InvalidArgument(format!(
                    "trial at position {} carries index {}",
                    position,
                    trial.index()
                )));
            }
            self.check_channel_count(trial)?;
        }
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn trial(&self, index: usize) -> CoreResult<&Trial> {
        self.trials.get(index).ok_or(CoreError::IndexOutOfRange {
            what: "trial",
            index,
            available: self.trials.len(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn count(&self, result: TrialResult) -> usize {
        self.trials.iter().filter(|t| t.result() == result).count()
    }

    /// Appends a finished trial and returns its ordinal index.
    pub fn append_trial(&mut self, mut trial: Trial) -> CoreResult<usize> {
        if self.closed {
            return Err(CoreError::SessionClosed);
        }
        trial.validate()?;
        self.check_channel_count(&trial)?;
        let index = self.trials.len();
        trial.set_index(index);
        self.trials.push(trial);
        Ok(index)
    }

    pub fn set_result(&mut self, index: usize, result: TrialResult) -> CoreResult<()> {
        let available = self.trials.len();
        let trial = self
            .trials
            .get_mut(index)
            .ok_or(CoreError::IndexOutOfRange {
                what: "trial",
                index,
                available,
            })?;
        trial.set_result(result);
        Ok(())
    }

    /// Changes a declared parameter's current value. Nothing is re-scored.
    pub fn override_parameter(&mut self, name: &str, value: f64) -> CoreResult<()> {
        let parameter = self.stage.parameter_mut(name)?;
        parameter.validate_value(value)?;
        let previous = parameter.current;
        parameter.current = value;
        LogManager::new().record(&format!(
            "parameter {} overridden {} -> {}",
            name, previous, value
        ));
        Ok(())
    }

    /// Applies several overrides together. Every name and value is checked
    /// first; on any failure no parameter changes.
    pub fn override_parameters<'a, I>(&mut self, overrides: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let overrides: Vec<(&str, f64)> = overrides.into_iter().collect();
        for &(name, value) in &overrides {
            self.stage
                .parameter(name)
                .ok_or_else(|| CoreError::UnknownParameter(name.to_string()))?
                .validate_value(value)?;
        }
        for (name, value) in overrides {
            self.override_parameter(name, value)?;
        }
        Ok(())
    }

    /// Feeds one observation to a parameter's adaptive rule; returns its current value.
    pub fn adapt_parameter(&mut self, name: &str, observation: f64) -> CoreResult<f64> {
        let parameter = self.stage.parameter_mut(name)?;
        parameter.record_observation(observation);
        if parameter.adapt()? {
            LogManager::new().record(&format!(
                "parameter {} adapted to {:.3}",
                name, parameter.current
            ));
        }
        Ok(parameter.current)
    }

    pub fn reset_parameters(&mut self) {
        for parameter in &mut self.stage.parameters {
            parameter.reset();
        }
    }

    fn check_channel_count(&self, trial: &Trial) -> CoreResult<()> {
        if trial.channel_count() != self.stage.streams.len() {
            return Err(CoreError::InvalidArgument(format!(
                "trial has {} channels but stage {} declares {} streams",
                trial.channel_count(),
                self.stage.name,
                self.stage.streams.len()
            )));
        }
        Ok(())
    }
}
