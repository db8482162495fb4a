//! The page session: one tokio task owning the fetcher and the view.
//!
//! Commands (submit, keys, reset, download) and completion signals (load
//! results, timer firings, network checks) are handled one at a time in the
//! same task, so handlers never interleave. Loads, timers and probes run as
//! spawned tasks that only report back through the signal queue, tagged with
//! the attempt or ticket they belong to.

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hasher},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::anyhow;
use shared::{
    domain::DelayTicket, protocol::SessionEvent, validate, AttemptId, ErrorReport, IdentityToken,
    Notice, ViewState,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    download::{DownloadAction, DownloadError},
    fetcher::{FetchEffect, FetchState, ReportFetcher, TimerKind, TOTAL_ATTEMPTS},
    locator::ResourceLocator,
    view::{key_action, KeyAction, KeyInput, ViewController},
    ImageLoader, LoadedImage, NetworkProbe,
};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;
const INPUT_ERROR_HIGHLIGHT: Duration = Duration::from_secs(3);

pub enum SessionCommand {
    /// Replace the name field's text (typing).
    Input(String),
    /// Set the name field and submit it.
    Submit(String),
    Key {
        key: KeyInput,
        input_focused: bool,
    },
    ResetToInput,
    Download {
        reply: oneshot::Sender<Result<DownloadAction, DownloadError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown,
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::Input(_) => "input",
            SessionCommand::Submit(_) => "submit",
            SessionCommand::Key { .. } => "key",
            SessionCommand::ResetToInput => "reset_to_input",
            SessionCommand::Download { .. } => "download",
            SessionCommand::Snapshot { .. } => "snapshot",
            SessionCommand::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub view: ViewState,
    pub fetch: FetchState,
    pub loads_issued: u64,
    pub identity_field: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("session command queue is full; please retry")]
    QueueFull,
    #[error("session stopped; no further commands are accepted")]
    Disconnected,
}

enum Signal {
    LoadingDelayElapsed(DelayTicket),
    LoadFinished {
        attempt: AttemptId,
        outcome: Result<LoadedImage, String>,
    },
    TimerFired {
        attempt: AttemptId,
        kind: TimerKind,
    },
    NetworkChecked {
        attempt: AttemptId,
        online: bool,
        reachable: Option<Result<(), String>>,
    },
}

struct Armed<K> {
    key: K,
    handle: JoinHandle<()>,
}

fn arm<K>(slot: &mut Option<Armed<K>>, key: K, handle: JoinHandle<()>) {
    if let Some(previous) = slot.replace(Armed { key, handle }) {
        previous.handle.abort();
    }
}

fn disarm<K>(slot: &mut Option<Armed<K>>, matches: impl Fn(&K) -> bool) {
    if slot.as_ref().is_some_and(|armed| matches(&armed.key)) {
        if let Some(armed) = slot.take() {
            armed.handle.abort();
        }
    }
}

fn abort_slot<K>(slot: &mut Option<Armed<K>>) {
    if let Some(armed) = slot.take() {
        armed.handle.abort();
    }
}

/// Clears a slot whose task has already finished and reported `key`.
fn settle<K: PartialEq>(slot: &mut Option<Armed<K>>, key: K) -> bool {
    if slot.as_ref().is_some_and(|armed| armed.key == key) {
        *slot = None;
        return true;
    }
    false
}

struct LoadedReport {
    token: IdentityToken,
    locator: ResourceLocator,
    image: LoadedImage,
}

pub struct ReportSession {
    settings: ClientSettings,
    fetcher: ReportFetcher,
    view: ViewController,
    loader: Arc<dyn ImageLoader>,
    network: Arc<dyn NetworkProbe>,
    events: broadcast::Sender<SessionEvent>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    next_delay_ticket: u64,
    delay: Option<Armed<DelayTicket>>,
    pending_token: Option<IdentityToken>,
    load: Option<Armed<AttemptId>>,
    timer: Option<Armed<(AttemptId, TimerKind)>>,
    probe: Option<Armed<AttemptId>>,
    arrived: Option<LoadedImage>,
    report: Option<LoadedReport>,
}

impl ReportSession {
    pub fn new(
        settings: ClientSettings,
        loader: Arc<dyn ImageLoader>,
        network: Arc<dyn NetworkProbe>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            fetcher: ReportFetcher::from_settings(&settings),
            view: ViewController::new(events.clone()),
            settings,
            loader,
            network,
            events,
            signal_tx,
            signal_rx,
            next_delay_ticket: 1,
            delay: None,
            pending_token: None,
            load: None,
            timer: None,
            probe: None,
            arrived: None,
            report: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let handle = SessionHandle {
            commands,
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!(origin = %self.settings.report_origin, "session: started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(SessionCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal),
            }
        }
        self.abort_outstanding();
        info!("session: stopped");
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            view: self.view.active(),
            fetch: self.fetcher.state(),
            loads_issued: self.fetcher.loads_issued(),
            identity_field: self.view.identity_field().to_string(),
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(command = command.name(), view = %self.view.active(), "session: command");
        match command {
            SessionCommand::Input(text) => {
                self.view.set_identity_field(text);
            }
            SessionCommand::Submit(text) => {
                if self.view.set_identity_field(text) {
                    self.submit();
                }
            }
            SessionCommand::Key { key, input_focused } => {
                match key_action(self.view.active(), key, input_focused) {
                    Some(KeyAction::ResetToInput) => self.reset_to_input(),
                    Some(KeyAction::Submit) => self.submit(),
                    None => debug!(?key, "session: key unbound in current view"),
                }
            }
            SessionCommand::ResetToInput => self.reset_to_input(),
            SessionCommand::Download { reply } => {
                let _ = reply.send(self.download());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn submit(&mut self) {
        if !self.view.is_interactive(ViewState::Input) {
            debug!(view = %self.view.active(), "session: submit ignored outside input view");
            return;
        }

        let token = match validate(self.view.identity_field()) {
            Ok(token) => token,
            Err(err) => {
                warn!(error = ?err, "session: rejected name input");
                self.publish(SessionEvent::Notice(Notice::error(err.to_string())));
                self.publish(SessionEvent::InputErrorHighlight {
                    clear_after_ms: INPUT_ERROR_HIGHLIGHT.as_millis() as u64,
                });
                return;
            }
        };

        self.report = None;
        self.view.show(ViewState::Loading);

        let ticket = DelayTicket(self.next_delay_ticket);
        self.next_delay_ticket += 1;
        let delay = loading_delay(self.settings.loading_delay_min, self.settings.loading_delay_max);
        info!(name = %token, delay_ms = delay.as_millis() as u64, "session: loading report");

        let tx = self.signal_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Signal::LoadingDelayElapsed(ticket));
        });
        arm(&mut self.delay, ticket, handle);
        self.pending_token = Some(token);
    }

    fn reset_to_input(&mut self) {
        abort_slot(&mut self.delay);
        self.pending_token = None;
        abort_slot(&mut self.probe);
        self.arrived = None;
        self.report = None;

        let effects = self.view.reset_to_input(&mut self.fetcher);
        self.apply(effects);
    }

    fn download(&self) -> Result<DownloadAction, DownloadError> {
        match (&self.report, self.view.active()) {
            (Some(report), ViewState::Result) => {
                let action = DownloadAction::new(
                    &report.token,
                    report.locator.clone(),
                    report.image.bytes.clone(),
                );
                info!(file_name = %action.file_name, "session: download prepared");
                self.publish(SessionEvent::Notice(Notice::success("download started")));
                Ok(action)
            }
            _ => {
                self.publish(SessionEvent::Notice(Notice::error(
                    DownloadError::NotLoaded.to_string(),
                )));
                Err(DownloadError::NotLoaded)
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::LoadingDelayElapsed(ticket) => {
                if !settle(&mut self.delay, ticket) {
                    debug!(ticket = ticket.0, "session: ignoring stale loading delay");
                    return;
                }
                let Some(token) = self.pending_token.take() else {
                    return;
                };
                let effects = self.fetcher.begin(token);
                self.apply(effects);
            }
            Signal::LoadFinished { attempt, outcome } => {
                settle(&mut self.load, attempt);
                let effects = match outcome {
                    Ok(image) => {
                        self.arrived = Some(image);
                        self.fetcher.on_loaded(attempt)
                    }
                    Err(reason) => self.fetcher.on_load_error(attempt, reason),
                };
                self.apply(effects);
                self.arrived = None;
            }
            Signal::TimerFired { attempt, kind } => {
                settle(&mut self.timer, (attempt, kind));
                let effects = match kind {
                    TimerKind::AttemptTimeout => self.fetcher.on_timeout(attempt),
                    TimerKind::RetryBackoff => self.fetcher.on_backoff_elapsed(attempt),
                };
                self.apply(effects);
            }
            Signal::NetworkChecked {
                attempt,
                online,
                reachable,
            } => {
                if !settle(&mut self.probe, attempt) {
                    debug!(attempt = attempt.0, "session: ignoring stale network check");
                    return;
                }
                self.report_network(online, reachable);
            }
        }
    }

    fn report_network(&mut self, online: bool, reachable: Option<Result<(), String>>) {
        self.publish(SessionEvent::NetworkStatus {
            online,
            reachable: reachable.as_ref().map(Result::is_ok),
        });
        if !online {
            warn!("network: connection lost");
            self.publish(SessionEvent::Notice(Notice::error(
                "network connection lost; please check your network settings",
            )));
            return;
        }
        match reachable {
            Some(Err(err)) => {
                warn!("network: origin probe failed: {err}");
                self.publish(SessionEvent::Notice(Notice::error(
                    "network may be unstable; please check your network settings",
                )));
            }
            _ => info!("network: origin reachable"),
        }
    }

    fn apply(&mut self, effects: Vec<FetchEffect>) {
        for effect in effects {
            match effect {
                FetchEffect::StartLoad {
                    attempt,
                    index,
                    locator,
                } => {
                    if let Some(current) = self.fetcher.current_attempt() {
                        self.publish(SessionEvent::DisplayName {
                            name: current.token.to_string(),
                        });
                    }
                    self.publish(SessionEvent::AttemptStarted {
                        attempt,
                        index,
                        total: TOTAL_ATTEMPTS,
                        locator: locator.to_string(),
                    });
                    let loader = Arc::clone(&self.loader);
                    let tx = self.signal_tx.clone();
                    let handle = tokio::spawn(async move {
                        let outcome = loader.load(&locator).await.map_err(|err| format!("{err:#}"));
                        let _ = tx.send(Signal::LoadFinished { attempt, outcome });
                    });
                    arm(&mut self.load, attempt, handle);
                }
                FetchEffect::CancelLoad { attempt } => disarm(&mut self.load, |key| *key == attempt),
                FetchEffect::ArmTimer {
                    attempt,
                    kind,
                    after,
                } => {
                    let tx = self.signal_tx.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(Signal::TimerFired { attempt, kind });
                    });
                    arm(&mut self.timer, (attempt, kind), handle);
                }
                FetchEffect::CancelTimer { attempt } => {
                    disarm(&mut self.timer, |(armed, _)| *armed == attempt)
                }
                FetchEffect::ProbeNetwork { attempt } => {
                    let network = Arc::clone(&self.network);
                    let tx = self.signal_tx.clone();
                    let handle = tokio::spawn(async move {
                        let online = network.is_online().await;
                        let reachable = if online {
                            Some(network.probe_origin().await.map_err(|err| format!("{err:#}")))
                        } else {
                            None
                        };
                        let _ = tx.send(Signal::NetworkChecked {
                            attempt,
                            online,
                            reachable,
                        });
                    });
                    arm(&mut self.probe, attempt, handle);
                }
                FetchEffect::RetryScheduled {
                    attempt,
                    failed_index,
                    failure,
                } => {
                    self.publish(SessionEvent::AttemptFailed {
                        attempt,
                        index: failed_index,
                        error: ErrorReport::from(&failure),
                    });
                    self.publish(SessionEvent::Notice(Notice::error(format!(
                        "report image failed to load, retrying... ({}/{})",
                        failed_index + 1,
                        TOTAL_ATTEMPTS
                    ))));
                }
                FetchEffect::Succeeded {
                    attempt,
                    token,
                    locator,
                } => {
                    let Some(image) = self.arrived.take() else {
                        warn!(attempt = attempt.0, "session: success without image payload");
                        continue;
                    };
                    self.publish(SessionEvent::ReportReady {
                        locator: locator.to_string(),
                        size_bytes: image.bytes.len(),
                    });
                    self.report = Some(LoadedReport {
                        token,
                        locator,
                        image,
                    });
                    self.view.show(ViewState::Result);
                }
                FetchEffect::Failed { attempt, failure } => {
                    let index = TOTAL_ATTEMPTS - 1;
                    self.publish(SessionEvent::AttemptFailed {
                        attempt,
                        index,
                        error: ErrorReport::from(&failure),
                    });
                    self.view.show(ViewState::Error);
                }
            }
        }
    }

    fn abort_outstanding(&mut self) {
        abort_slot(&mut self.load);
        abort_slot(&mut self.timer);
        abort_slot(&mut self.probe);
        abort_slot(&mut self.delay);
    }

    fn publish(&self, event: SessionEvent) {
        self.view.publish(event);
    }
}

/// Uniform pick in `[min, max]`, seeded from the process hasher and the clock.
fn loading_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span_ms = u64::try_from((max - min).as_millis()).unwrap_or(u64::MAX);
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    let offset_ms = hasher
        .finish()
        .checked_rem(span_ms.saturating_add(1))
        .unwrap_or(0);
    min.saturating_add(Duration::from_millis(offset_ms))
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn dispatch(&self, command: SessionCommand) -> Result<(), DispatchError> {
        let name = command.name();
        match self.commands.try_send(command) {
            Ok(()) => {
                debug!(command = name, "queued session command");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(DispatchError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Disconnected),
        }
    }

    pub fn input(&self, text: impl Into<String>) -> Result<(), DispatchError> {
        self.dispatch(SessionCommand::Input(text.into()))
    }

    pub fn submit(&self, text: impl Into<String>) -> Result<(), DispatchError> {
        self.dispatch(SessionCommand::Submit(text.into()))
    }

    pub fn key(&self, key: KeyInput, input_focused: bool) -> Result<(), DispatchError> {
        self.dispatch(SessionCommand::Key { key, input_focused })
    }

    pub fn reset_to_input(&self) -> Result<(), DispatchError> {
        self.dispatch(SessionCommand::ResetToInput)
    }

    pub fn shutdown(&self) -> Result<(), DispatchError> {
        self.dispatch(SessionCommand::Shutdown)
    }

    pub async fn download(&self) -> anyhow::Result<DownloadAction> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Download { reply })?;
        let action = rx
            .await
            .map_err(|_| anyhow!("session stopped before answering download"))??;
        Ok(action)
    }

    pub async fn snapshot(&self) -> anyhow::Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Snapshot { reply })?;
        rx.await
            .map_err(|_| anyhow!("session stopped before answering snapshot"))
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
