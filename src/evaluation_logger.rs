use serde::{Deserialize, Serialize};

use crate::{ErrorCode, Reason, Value};

/// Record of one flag resolution, suitable for exporting to a data warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    /// Unix timestamp (seconds).
    pub creation_date: i64,
    pub key: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Receives an [`EvaluationEvent`] for every single-flag resolution.
pub trait EvaluationLogger {
    fn log_evaluation(&self, event: EvaluationEvent);
}

pub(crate) struct NoopEvaluationLogger;
impl EvaluationLogger for NoopEvaluationLogger {
    fn log_evaluation(&self, _event: EvaluationEvent) {}
}

impl<T: Fn(EvaluationEvent)> EvaluationLogger for T {
    fn log_evaluation(&self, event: EvaluationEvent) {
        self(event);
    }
}
