//! Client-side session expiry monitoring.
//!
//! [`SessionMonitor`] owns a background task that mirrors the session state,
//! checks the remaining lifetime on a fixed interval and refreshes the token
//! before it runs out. Consumers read [`MonitorView`] snapshots and may ask
//! for an immediate refresh. The task stops when the monitor is dropped.

mod client;
mod tracker;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use client::SessionClient;
pub use tracker::{
    AuthEvent, SessionSnapshot, SessionState, SessionTracker, SessionUser, TickAction,
};

pub const DEFAULT_POLL_SECS: u64 = 60;
pub const DEFAULT_WARNING_SECS: u64 = 5 * 60;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid base URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub warning_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            warning_threshold: Duration::from_secs(DEFAULT_WARNING_SECS),
        }
    }
}

fn secs_from_env(name: &str, default: u64) -> Duration {
    let secs = match std::env::var(name) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                warn!(var = %name, value = %value, "Ignoring invalid duration, using default");
                default
            }
        },
        Err(_) => default,
    };
    Duration::from_secs(secs)
}

impl MonitorConfig {
    /// Defaults overridden by `SESSION_POLL_SECS` and `SESSION_WARNING_SECS`.
    pub fn from_env() -> Self {
        Self {
            poll_interval: secs_from_env("SESSION_POLL_SECS", DEFAULT_POLL_SECS),
            warning_threshold: secs_from_env("SESSION_WARNING_SECS", DEFAULT_WARNING_SECS),
        }
    }
}

/// Where the monitor reads and renews the session.
#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// `Ok(None)` when there is no session.
    async fn current_session(&self) -> Result<Option<SessionSnapshot>, MonitorError>;

    /// Obtain a new token for the same identity.
    async fn refresh(&self) -> Result<SessionSnapshot, MonitorError>;
}

/// What a warning component renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorView {
    pub state: SessionState,
    pub time_remaining: Option<Duration>,
    pub warning_visible: bool,
}

impl MonitorView {
    fn of(tracker: &SessionTracker) -> Self {
        let now = Utc::now();
        Self {
            state: tracker.state().clone(),
            time_remaining: tracker
                .time_remaining(now)
                .and_then(|remaining| remaining.to_std().ok()),
            warning_visible: tracker.warning_visible(now),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }
}

enum Command {
    Refresh(oneshot::Sender<bool>),
    DismissWarning,
}

pub struct SessionMonitor {
    view: watch::Receiver<MonitorView>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl SessionMonitor {
    /// Spawn the monitoring task on the current runtime.
    pub fn start<B: SessionBackend>(
        backend: Arc<B>,
        events: broadcast::Receiver<AuthEvent>,
        config: MonitorConfig,
    ) -> Self {
        let threshold = chrono::Duration::from_std(config.warning_threshold)
            .unwrap_or(chrono::Duration::minutes(5));
        let tracker = SessionTracker::new(threshold);

        let (view_tx, view) = watch::channel(MonitorView::of(&tracker));
        let (commands, command_rx) = mpsc::channel(8);

        let task = tokio::spawn(run(
            backend,
            tracker,
            events,
            command_rx,
            view_tx,
            config.poll_interval,
        ));

        Self {
            view,
            commands,
            task,
        }
    }

    /// Latest published view.
    pub fn state(&self) -> MonitorView {
        self.view.borrow().clone()
    }

    /// Receiver that is notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<MonitorView> {
        self.view.clone()
    }

    /// Refresh now (the warning's "extend" action). Returns whether the
    /// session survived.
    pub async fn refresh(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Refresh(reply)).await.is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub async fn dismiss_warning(&self) {
        let _ = self.commands.send(Command::DismissWarning).await;
    }

    /// Stop the background task.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn refresh_session<B: SessionBackend>(backend: &B, tracker: &mut SessionTracker) -> bool {
    match backend.refresh().await {
        Ok(snapshot) => {
            debug!(expires_at = %snapshot.expires_at, "Session refreshed");
            tracker.apply_refresh_result(Some(snapshot));
            true
        }
        Err(e) => {
            info!(error = %e, "Session refresh failed, signing out locally");
            tracker.apply_refresh_result(None);
            false
        }
    }
}

async fn load_session<B: SessionBackend>(backend: &B) -> Option<SessionSnapshot> {
    backend.current_session().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read session");
        None
    })
}

async fn run<B: SessionBackend>(
    backend: Arc<B>,
    mut tracker: SessionTracker,
    mut events: broadcast::Receiver<AuthEvent>,
    mut commands: mpsc::Receiver<Command>,
    view: watch::Sender<MonitorView>,
    poll_interval: Duration,
) {
    tracker.apply_initial_load(load_session(backend.as_ref()).await);
    view.send_replace(MonitorView::of(&tracker));

    let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if tracker.on_tick(Utc::now()) == TickAction::Refresh {
                    refresh_session(backend.as_ref(), &mut tracker).await;
                }
            }
            event = events.recv(), if events_open => match event {
                Ok(event) => tracker.apply_event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Missed transitions; resynchronise from the source of truth
                    debug!(skipped, "Auth events lagged, reloading session");
                    match load_session(backend.as_ref()).await {
                        Some(snapshot) => tracker.apply_event(AuthEvent::SignedIn(snapshot)),
                        None => tracker.apply_event(AuthEvent::SignedOut),
                    }
                }
                Err(broadcast::error::RecvError::Closed) => events_open = false,
            },
            command = commands.recv() => match command {
                Some(Command::Refresh(reply)) => {
                    let ok = refresh_session(backend.as_ref(), &mut tracker).await;
                    // Caller observes the new state as soon as it has the answer
                    view.send_replace(MonitorView::of(&tracker));
                    let _ = reply.send(ok);
                }
                Some(Command::DismissWarning) => tracker.dismiss_warning(),
                None => break,
            },
        }

        view.send_replace(MonitorView::of(&tracker));
    }
}
