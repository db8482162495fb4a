use serde::{Deserialize, Serialize};

use crate::{
    domain::{AttemptId, Notice, ViewState},
    error::ErrorReport,
};

/// Notifications published to the presentation layer. The core never renders;
/// anything visual subscribes to these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    ViewChanged {
        from: ViewState,
        to: ViewState,
    },
    Notice(Notice),
    InputErrorHighlight {
        clear_after_ms: u64,
    },
    InputCleared,
    FocusInput,
    DisplayName {
        name: String,
    },
    AttemptStarted {
        attempt: AttemptId,
        index: u32,
        total: u32,
        locator: String,
    },
    AttemptFailed {
        attempt: AttemptId,
        index: u32,
        error: ErrorReport,
    },
    NetworkStatus {
        online: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reachable: Option<bool>,
    },
    ReportReady {
        locator: String,
        size_bytes: usize,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::ViewChanged { .. } => "view_changed",
            SessionEvent::Notice(_) => "notice",
            SessionEvent::InputErrorHighlight { .. } => "input_error_highlight",
            SessionEvent::InputCleared => "input_cleared",
            SessionEvent::FocusInput => "focus_input",
            SessionEvent::DisplayName { .. } => "display_name",
            SessionEvent::AttemptStarted { .. } => "attempt_started",
            SessionEvent::AttemptFailed { .. } => "attempt_failed",
            SessionEvent::NetworkStatus { .. } => "network_status",
            SessionEvent::ReportReady { .. } => "report_ready",
        }
    }
}
