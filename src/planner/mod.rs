//! Planner/Validator: LLM-driven decomposition, grounded and statically validated.

pub mod validator;

use crate::domain::{Plan, Worker};
use crate::error::ControlPlaneError;
use async_trait::async_trait;

/// Abstracts the LLM provider so a test double can stand in.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn propose_plan(
        &self,
        action: &str,
        action_fields: &[String],
        workers: &[Worker],
        feedback: Option<&str>,
    ) -> Result<Plan, ControlPlaneError>;
}

pub struct Planner {
    reasoner: std::sync::Arc<dyn Reasoner>,
    max_attempts: u32,
}

impl Planner {
    pub fn new(reasoner: std::sync::Arc<dyn Reasoner>, max_attempts: u32) -> Self {
        Self { reasoner, max_attempts }
    }

    /// Ask the Reasoner for a plan, validating and re-requesting with
    /// feedback on failure, up to `max_attempts`. Persistent failure is the
    /// caller's cue to mark the orchestration `not_actionable`.
    #[tracing::instrument(skip(self, workers))]
    pub async fn plan(
        &self,
        action: &str,
        action_fields: &[String],
        workers: &[Worker],
    ) -> Result<Plan, ControlPlaneError> {
        let mut feedback: Option<String> = None;
        for attempt in 0..self.max_attempts {
            let plan = self.reasoner.propose_plan(action, action_fields, workers, feedback.as_deref()).await?;
            match validator::validate(&plan, workers, action_fields) {
                Ok(()) => return Ok(plan),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "planner attempt produced an invalid plan");
                    feedback = Some(e.to_string());
                }
            }
        }
        Err(ControlPlaneError::NotActionable {
            orchestration_id: String::new(),
            reason: feedback.unwrap_or_else(|| "no registered worker can satisfy this action".to_string()),
        })
    }
}
