//! Run results returned by every check-in operation.

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::{CallError, FailureKind};

/// Payload attached to a run. Only the fields a step produced are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdk: Option<String>,
    /// Confirmed quota; the redemption figure once redeemed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<Number>,
    /// Nominal quota announced by the lottery, kept when redemption fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_quota: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Raw `data` of a direct sign-in response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Value>,
}

/// Outcome of one workflow invocation or reward action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RunData>,
}

impl RunResult {
    pub fn succeeded(message: impl Into<String>, data: RunData) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: None,
            data: Some(data),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: Some(kind),
            data: None,
        }
    }

    /// Failure describing a call error for the named step.
    pub fn from_call_error(step: &str, e: &CallError) -> Self {
        let message = match e {
            CallError::Http { status, body } if body.is_empty() => {
                format!("{step} request failed with HTTP {status}")
            }
            CallError::Http { status, body } => {
                format!("{step} request failed with HTTP {status}: {body}")
            }
            other => format!("{step} request error: {other}"),
        };
        Self::failed(FailureKind::from(e), message)
    }

    pub fn with_data(mut self, data: RunData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn cdk(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.cdk.as_deref())
    }
}

/// A run result plus the line to record in the outcome log.
#[derive(Debug, Clone)]
pub struct Completed {
    pub result: RunResult,
    pub log_message: String,
}

impl From<RunResult> for Completed {
    fn from(result: RunResult) -> Self {
        let log_message = result.message.clone();
        Self {
            result,
            log_message,
        }
    }
}
