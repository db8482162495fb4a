//! Terminal presenter: turns session events into lines on stdout.

use shared::{protocol::SessionEvent, NoticeLevel, ViewState};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    /// One serialized event per line.
    Json,
}

pub fn spawn_presenter(
    mut events: broadcast::Receiver<SessionEvent>,
    format: Format,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render(&event, format) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "viewer: presenter lagged behind session events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub fn render(event: &SessionEvent, format: Format) -> Option<String> {
    match format {
        Format::Json => match serde_json::to_string(event) {
            Ok(line) => Some(line),
            Err(err) => {
                warn!(kind = event.kind(), "viewer: failed to encode event: {err}");
                None
            }
        },
        Format::Text => render_text(event),
    }
}

fn render_text(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::ViewChanged { from, to } if from != to => Some(match to {
            ViewState::Input => "enter a name (:q to quit)".to_string(),
            ViewState::Loading => "generating your learning journey...".to_string(),
            ViewState::Result => "report ready".to_string(),
            ViewState::Error => {
                "could not load the report; press Enter to try another name".to_string()
            }
        }),
        SessionEvent::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Error => "error",
            };
            Some(format!("[{tag}] {}", notice.message))
        }
        SessionEvent::DisplayName { name } => Some(format!("hello, {name}")),
        SessionEvent::AttemptStarted {
            index,
            total,
            locator,
            ..
        } if *index > 0 => Some(format!("attempt {}/{total}: {locator}", index + 1)),
        SessionEvent::ReportReady {
            locator,
            size_bytes,
        } => Some(format!("{locator} ({size_bytes} bytes)")),
        _ => None,
    }
}
