//! Network session state machine.
//!
//! ```text
//!            [retry interval elapsed]
//!  DISCONNECTED ─────────────────────▶ JOINING
//!       ▲   ▲                            │
//!       │   └──[rejected / timed out]────┤
//!       │                                │ [join accepted]
//!       │                                ▼
//!       └────────[link lost]────────── ONLINE
//! ```
//!
//! The dispatcher owns the one [`NetworkSession`] and drives it from the
//! main loop only.  Each [`poll`](NetworkSession::poll) runs the update
//! handler of the current state (see [`states`]); a handler that returns
//! `Some(next)` triggers a transition with its enter-side effects.
//!
//! [`send`](NetworkSession::send) is the single uplink primitive: it
//! refuses without touching the radio unless the state is `Online`, which
//! is what keeps the reporting tasks gated.

mod states;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{RadioPort, SessionInfo};
use crate::config::RelayConfig;
use crate::error::LinkError;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Joining = 1,
    Online = 2,
}

/// A state change reported back to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Timing knobs copied out of [`RelayConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub join_retry_interval_ms: u64,
    pub join_timeout_ms: u64,
    pub link_check_interval_ms: u64,
    pub max_consecutive_send_failures: u8,
}

impl From<&RelayConfig> for SessionTiming {
    fn from(cfg: &RelayConfig) -> Self {
        Self {
            join_retry_interval_ms: u64::from(cfg.join_retry_interval_ms),
            join_timeout_ms: u64::from(cfg.join_timeout_ms),
            link_check_interval_ms: u64::from(cfg.link_check_interval_ms),
            max_consecutive_send_failures: cfg.max_consecutive_send_failures.max(1),
        }
    }
}

/// Join/link counters reported in heartbeats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub join_attempts: u32,
    pub join_failures: u32,
    pub link_losses: u32,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct NetworkSession {
    state: SessionState,
    timing: SessionTiming,
    info: Option<SessionInfo>,
    /// Start time of the previous join request, if any.
    last_join_attempt_ms: Option<u64>,
    join_deadline_ms: u64,
    last_link_check_ms: u64,
    consecutive_send_failures: u8,
    stats: SessionStats,
}

impl NetworkSession {
    pub fn new(timing: SessionTiming) -> Self {
        Self {
            state: SessionState::Disconnected,
            timing,
            info: None,
            last_join_attempt_ms: None,
            join_deadline_ms: 0,
            last_link_check_ms: 0,
            consecutive_send_failures: 0,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == SessionState::Online
    }

    /// Identifiers of the current (or last) network session.
    pub fn info(&self) -> Option<SessionInfo> {
        self.info
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Seed the last known session identifiers (from a recovered snapshot).
    pub fn restore_info(&mut self, info: SessionInfo) {
        self.info = Some(info);
    }

    /// Run the current state's update handler once.
    pub fn poll(&mut self, now_ms: u64, radio: &mut impl RadioPort) -> Option<Transition> {
        let next = match self.state {
            SessionState::Disconnected => states::disconnected_update(self, now_ms, radio),
            SessionState::Joining => states::joining_update(self, now_ms, radio),
            SessionState::Online => states::online_update(self, now_ms, radio),
        };
        next.map(|to| self.transition(to, now_ms))
    }

    /// Send one uplink through the session gate.
    ///
    /// Refuses with [`LinkError::NotJoined`] unless `Online`.  A link-loss
    /// error, or `max_consecutive_send_failures` transient errors in a row,
    /// drops the session back to `Disconnected`.
    pub fn send(
        &mut self,
        now_ms: u64,
        radio: &mut impl RadioPort,
        port: u8,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        if self.state != SessionState::Online {
            return Err(LinkError::NotJoined);
        }

        match radio.send_uplink(port, payload) {
            Ok(()) => {
                self.consecutive_send_failures = 0;
                Ok(())
            }
            Err(e) if e.is_link_loss() => {
                warn!("Session: uplink reported {}, dropping session", e);
                self.link_lost(now_ms);
                Err(e)
            }
            Err(e) => {
                self.consecutive_send_failures = self.consecutive_send_failures.saturating_add(1);
                if self.consecutive_send_failures >= self.timing.max_consecutive_send_failures {
                    warn!(
                        "Session: {} consecutive uplink failures, dropping session",
                        self.consecutive_send_failures
                    );
                    self.link_lost(now_ms);
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn link_lost(&mut self, now_ms: u64) {
        self.stats.link_losses = self.stats.link_losses.saturating_add(1);
        self.transition(SessionState::Disconnected, now_ms);
    }

    fn transition(&mut self, to: SessionState, now_ms: u64) -> Transition {
        let from = self.state;
        info!("Session transition: {:?} -> {:?}", from, to);

        match to {
            SessionState::Disconnected => {
                self.consecutive_send_failures = 0;
            }
            SessionState::Joining => {
                self.join_deadline_ms = now_ms.saturating_add(self.timing.join_timeout_ms);
            }
            SessionState::Online => {
                self.last_link_check_ms = now_ms;
                self.consecutive_send_failures = 0;
            }
        }

        self.state = to;
        Transition { from, to }
    }
}
