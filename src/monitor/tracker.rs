//! Session state machine. Pure: callers pass the current time in.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in user as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A live session: who, and until when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Authenticated {
        user: SessionUser,
        expires_at: DateTime<Utc>,
    },
    Anonymous,
}

/// Authentication state change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(SessionSnapshot),
    SignedOut,
    TokenRefreshed(SessionSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    None,
    Refresh,
}

#[derive(Debug, Clone)]
pub struct SessionTracker {
    state: SessionState,
    warning_threshold: Duration,
    /// Expiry for which the user dismissed the warning
    dismissed_for: Option<DateTime<Utc>>,
}

impl SessionTracker {
    pub fn new(warning_threshold: Duration) -> Self {
        Self {
            state: SessionState::Loading,
            warning_threshold,
            dismissed_for: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            SessionState::Authenticated { expires_at, .. } => Some(*expires_at),
            _ => None,
        }
    }

    fn authenticate(&mut self, snapshot: SessionSnapshot) {
        self.dismissed_for = None;
        self.state = SessionState::Authenticated {
            user: snapshot.user,
            expires_at: snapshot.expires_at,
        };
    }

    fn clear(&mut self) {
        self.dismissed_for = None;
        self.state = SessionState::Anonymous;
    }

    /// Result of the one-off read at startup. Ignored if an event already
    /// settled the state.
    pub fn apply_initial_load(&mut self, session: Option<SessionSnapshot>) {
        if self.state != SessionState::Loading {
            return;
        }
        match session {
            Some(snapshot) => self.authenticate(snapshot),
            None => self.clear(),
        }
    }

    pub fn apply_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(snapshot) | AuthEvent::TokenRefreshed(snapshot) => {
                self.authenticate(snapshot)
            }
            AuthEvent::SignedOut => self.clear(),
        }
    }

    /// Periodic check. An expired session is dropped; one inside the warning
    /// window asks for a refresh.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> TickAction {
        let Some(remaining) = self.time_remaining(now) else {
            return TickAction::None;
        };
        if remaining <= Duration::zero() {
            self.clear();
            TickAction::None
        } else if remaining <= self.warning_threshold {
            TickAction::Refresh
        } else {
            TickAction::None
        }
    }

    /// Outcome of a refresh attempt. Failure signs the user out locally.
    pub fn apply_refresh_result(&mut self, result: Option<SessionSnapshot>) {
        match result {
            Some(snapshot) => self.authenticate(snapshot),
            None => self.clear(),
        }
    }

    /// Time until expiry, floored at zero. `None` unless authenticated.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at()
            .map(|expires_at| (expires_at - now).max(Duration::zero()))
    }

    pub fn warning_visible(&self, now: DateTime<Utc>) -> bool {
        let Some(remaining) = self.time_remaining(now) else {
            return false;
        };
        let dismissed = self.dismissed_for.is_some() && self.dismissed_for == self.expires_at();
        !dismissed && remaining > Duration::zero() && remaining <= self.warning_threshold
    }

    /// Hide the warning until the expiry changes.
    pub fn dismiss_warning(&mut self) {
        self.dismissed_for = self.expires_at();
    }
}
