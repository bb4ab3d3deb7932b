//! Resource status codes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::resource_body;

/// Closed set of status codes reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum StatusCode {
    Waiting,
    Queued,
    Started,
    InProgress,
    Summarized,
    Finished,
    Uploading,
    Faulty,
    Unknown,
    Runnable,
}

impl StatusCode {
    pub fn as_i32(self) -> i32 {
        match self {
            StatusCode::Waiting => 0,
            StatusCode::Queued => 1,
            StatusCode::Started => 2,
            StatusCode::InProgress => 3,
            StatusCode::Summarized => 4,
            StatusCode::Finished => 5,
            StatusCode::Uploading => 6,
            StatusCode::Faulty => -1,
            StatusCode::Unknown => -2,
            StatusCode::Runnable => -3,
        }
    }

    /// Finished and faulty resources never change status again
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusCode::Finished | StatusCode::Faulty)
    }
}

impl TryFrom<i32> for StatusCode {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => StatusCode::Waiting,
            1 => StatusCode::Queued,
            2 => StatusCode::Started,
            3 => StatusCode::InProgress,
            4 => StatusCode::Summarized,
            5 => StatusCode::Finished,
            6 => StatusCode::Uploading,
            -1 => StatusCode::Faulty,
            -2 => StatusCode::Unknown,
            -3 => StatusCode::Runnable,
            other => return Err(format!("unknown status code {}", other)),
        })
    }
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        code.as_i32()
    }
}

/// Status object attached to every resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(default)]
    pub message: String,
}

impl Status {
    /// Reads the status of a resource JSON, with or without `object` envelope
    pub fn from_resource(resource: &Value) -> Option<Status> {
        let status = resource_body(resource)
            .get("status")
            .or_else(|| resource.get("status"))?;
        serde_json::from_value(status.clone()).ok()
    }
}
