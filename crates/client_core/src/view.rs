//! Panel gating for the page: exactly one of Input, Loading, Result or Error
//! is active, and only the active panel accepts interaction.

use shared::{protocol::SessionEvent, ViewState};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::fetcher::{FetchEffect, ReportFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Escape,
    Enter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ResetToInput,
    Submit,
}

/// Escape leaves Result or Error; Enter submits only from the focused name
/// field on the Input panel. Everything else is unbound.
pub fn key_action(active: ViewState, key: KeyInput, input_focused: bool) -> Option<KeyAction> {
    match (key, active) {
        (KeyInput::Escape, ViewState::Result | ViewState::Error) => Some(KeyAction::ResetToInput),
        (KeyInput::Enter, ViewState::Input) if input_focused => Some(KeyAction::Submit),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTransition {
    pub from: ViewState,
    pub to: ViewState,
}

impl ViewTransition {
    pub fn is_replay(&self) -> bool {
        self.from == self.to
    }
}

pub struct ViewController {
    active: ViewState,
    identity_field: String,
    events: broadcast::Sender<SessionEvent>,
}

impl ViewController {
    pub fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            active: ViewState::Input,
            identity_field: String::new(),
            events,
        }
    }

    pub fn active(&self) -> ViewState {
        self.active
    }

    /// Hidden panels are inert: no focus, no submit, not announced.
    pub fn is_interactive(&self, panel: ViewState) -> bool {
        panel == self.active
    }

    pub fn panels(&self) -> [(ViewState, bool); 4] {
        ViewState::ALL.map(|panel| (panel, self.is_interactive(panel)))
    }

    /// Always succeeds. Showing the active panel again only replays its entry.
    pub fn show(&mut self, state: ViewState) -> ViewTransition {
        let transition = ViewTransition {
            from: self.active,
            to: state,
        };
        self.active = state;

        if transition.is_replay() {
            debug!(view = %state, "view: replaying active panel");
        } else {
            info!(from = %transition.from, to = %transition.to, "view: panel changed");
        }
        self.publish(SessionEvent::ViewChanged {
            from: transition.from,
            to: transition.to,
        });
        transition
    }

    pub fn identity_field(&self) -> &str {
        &self.identity_field
    }

    /// Typing only lands while the Input panel is active.
    pub fn set_identity_field(&mut self, text: impl Into<String>) -> bool {
        if !self.is_interactive(ViewState::Input) {
            debug!(view = %self.active, "view: ignoring input on inert panel");
            return false;
        }
        self.identity_field = text.into();
        true
    }

    /// Fetcher reset, Input panel, empty field, focus request. Returns the
    /// fetcher's cancellation effects for the caller to execute.
    pub fn reset_to_input(&mut self, fetcher: &mut ReportFetcher) -> Vec<FetchEffect> {
        let effects = fetcher.reset();
        self.show(ViewState::Input);
        self.identity_field.clear();
        self.publish(SessionEvent::InputCleared);
        self.publish(SessionEvent::FocusInput);
        effects
    }

    pub fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; the page may run headless.
        let _ = self.events.send(event);
    }
}
