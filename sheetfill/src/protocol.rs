//! Messages exchanged between the orchestrator and the page-side operator

use crate::errors::FillError;
use crate::form::FillReport;
use crate::records::Record;
use serde::{Deserialize, Serialize};

/// A request to the operator
///
/// Wire format: `{"action":"ping"}` or `{"action":"fillForm","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OperatorRequest {
    /// Liveness probe
    Ping,
    FillForm { data: Record },
}

impl OperatorRequest {
    pub fn action(&self) -> &'static str {
        match self {
            OperatorRequest::Ping => "ping",
            OperatorRequest::FillForm { .. } => "fillForm",
        }
    }
}

/// The operator's answer to a `fillForm`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_fields: Option<Vec<String>>,
    /// Human readable failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failure as a typed error, when the operator could provide one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<FillError>,
}

/// Any reply from the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperatorResponse {
    /// `{"status":"ok"}`, the answer to a ping
    Status { status: String },
    Fill(FillReply),
}

impl OperatorResponse {
    pub fn pong() -> Self {
        OperatorResponse::Status {
            status: "ok".to_string(),
        }
    }

    pub fn is_pong(&self) -> bool {
        matches!(self, OperatorResponse::Status { status } if status == "ok")
    }

    /// Recover the operator's result on the orchestrator side
    pub fn into_fill_result(self) -> Result<FillReport, FillError> {
        match self {
            OperatorResponse::Fill(FillReply {
                success: true,
                message,
                filled_fields,
                ..
            }) => {
                let filled_fields = filled_fields.unwrap_or_default();
                let message =
                    message.unwrap_or_else(|| format!("Fields filled: {}", filled_fields.len()));
                Ok(FillReport {
                    filled_fields,
                    message,
                })
            }
            OperatorResponse::Fill(FillReply {
                error,
                error_detail,
                ..
            }) => Err(error_detail.unwrap_or_else(|| {
                FillError::Page(error.unwrap_or_else(|| "unknown error".to_string()))
            })),
            OperatorResponse::Status { status } => Err(FillError::Transport(format!(
                "expected a fill reply, got status {status:?}"
            ))),
        }
    }
}

impl From<Result<FillReport, FillError>> for OperatorResponse {
    fn from(result: Result<FillReport, FillError>) -> Self {
        let reply = match result {
            Ok(report) => FillReply {
                success: true,
                message: Some(report.message),
                filled_fields: Some(report.filled_fields),
                error: None,
                error_detail: None,
            },
            Err(e) => FillReply {
                success: false,
                message: None,
                filled_fields: None,
                error: Some(e.to_string()),
                error_detail: Some(e),
            },
        };
        OperatorResponse::Fill(reply)
    }
}
