use crate::workflow::runner::WorkflowResult;
use serde::{Deserialize, Serialize};
use trakcore::model::parameter::HIT_THRESHOLD;
use trakcore::model::Session;
use trakcore::processing::{SessionSummary, TrialOutcome};

/// Read-only review snapshot served to plotting clients.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisualizationModel {
    pub subject: String,
    pub stage: String,
    pub hit_threshold: Option<f64>,
    pub summary: Option<SessionSummary>,
    pub outcomes: Vec<TrialOutcome>,
    pub messages: Vec<String>,
}

impl VisualizationModel {
    pub fn from_review(session: &Session, result: &WorkflowResult) -> Self {
        Self {
            subject: session.subject().to_string(),
            stage: session.stage().name.clone(),
            hit_threshold: session.stage().parameter(HIT_THRESHOLD).map(|p| p.current),
            summary: Some(result.summary.clone()),
            outcomes: result.outcomes.clone(),
            messages: result.messages.clone(),
        }
    }
}
