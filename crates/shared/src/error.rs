use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::MAX_NAME_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    LoadFailure,
    Timeout,
    NotLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("please enter your name")]
    Empty,
    #[error("name must not exceed {} characters", MAX_NAME_LEN)]
    TooLong,
    #[error("please enter a valid name")]
    InvalidFormat,
}

/// Why a single attempt did not produce the report. Both variants follow the
/// same retry path; the split only matters for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("report image could not be loaded: {reason}")]
    LoadFailed { reason: String },
    #[error("report image did not load within {}ms", .after.as_millis())]
    TimedOut { after: Duration },
}

impl FetchFailure {
    pub fn code(&self) -> ErrorCode {
        match self {
            FetchFailure::LoadFailed { .. } => ErrorCode::LoadFailure,
            FetchFailure::TimedOut { .. } => ErrorCode::Timeout,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchFailure::TimedOut { .. })
    }
}

impl From<ValidationError> for ErrorReport {
    fn from(value: ValidationError) -> Self {
        Self::new(ErrorCode::Validation, value.to_string())
    }
}

impl From<&FetchFailure> for ErrorReport {
    fn from(value: &FetchFailure) -> Self {
        Self::new(value.code(), value.to_string())
    }
}
