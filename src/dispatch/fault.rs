use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Kind of fault a handler raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    InvalidParameter,
    Unexpected,
}

/// Structured form of a handler fault, as returned to the job
/// infrastructure in the completion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub kind: FaultKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl FaultReport {
    /// `None` for failures the dispatcher detects before a handler runs.
    pub fn from_error(err: &DispatchError) -> Option<Self> {
        match err {
            DispatchError::InvalidParameter(message) => Some(Self {
                kind: FaultKind::InvalidParameter,
                message: message.clone(),
                causes: Vec::new(),
            }),
            DispatchError::Unexpected(inner) => Some(Self {
                kind: FaultKind::Unexpected,
                message: inner.to_string(),
                causes: inner.chain().skip(1).map(ToString::to_string).collect(),
            }),
            _ => None,
        }
    }

    pub fn marshal(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}

/// Completion message for a failed dispatch. Handler faults are marshaled
/// as a [`FaultReport`]; failures the dispatcher detects itself keep their
/// plain diagnostic text.
pub fn marshal_result(err: &DispatchError) -> String {
    FaultReport::from_error(err).map_or_else(|| err.to_string(), |report| report.marshal())
}
