//! Per-state update handlers.
//!
//! Each handler inspects the session (and, where needed, the radio) and
//! returns `Some(next)` to request a transition or `None` to stay.

use log::{debug, info, warn};

use super::{NetworkSession, SessionState};
use crate::app::ports::{JoinPoll, LinkStatus, RadioPort};

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED — issue a join request, at most once per retry interval
// ═══════════════════════════════════════════════════════════════════════════

pub(super) fn disconnected_update(
    s: &mut NetworkSession,
    now_ms: u64,
    radio: &mut impl RadioPort,
) -> Option<SessionState> {
    if let Some(last) = s.last_join_attempt_ms {
        if now_ms.saturating_sub(last) < s.timing.join_retry_interval_ms {
            return None;
        }
    }

    s.last_join_attempt_ms = Some(now_ms);
    s.stats.join_attempts = s.stats.join_attempts.saturating_add(1);

    match radio.request_join() {
        Ok(()) => {
            info!("DISCONNECTED: join #{} requested", s.stats.join_attempts);
            Some(SessionState::Joining)
        }
        Err(e) => {
            s.stats.join_failures = s.stats.join_failures.saturating_add(1);
            warn!(
                "DISCONNECTED: join request refused ({}), retry in {}ms",
                e, s.timing.join_retry_interval_ms
            );
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  JOINING — wait for the network's answer, bounded by the join timeout
// ═══════════════════════════════════════════════════════════════════════════

pub(super) fn joining_update(
    s: &mut NetworkSession,
    now_ms: u64,
    radio: &mut impl RadioPort,
) -> Option<SessionState> {
    match radio.poll_join() {
        JoinPoll::Joined(info) => {
            info!("JOINING: accepted, DevAddr={:08X}", info.dev_addr);
            s.info = Some(info);
            Some(SessionState::Online)
        }
        JoinPoll::Failed => {
            s.stats.join_failures = s.stats.join_failures.saturating_add(1);
            warn!("JOINING: rejected by network");
            Some(SessionState::Disconnected)
        }
        JoinPoll::Pending if now_ms >= s.join_deadline_ms => {
            s.stats.join_failures = s.stats.join_failures.saturating_add(1);
            warn!("JOINING: no answer after {}ms", s.timing.join_timeout_ms);
            Some(SessionState::Disconnected)
        }
        JoinPoll::Pending => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ONLINE — periodic status query catches a session the module dropped
// ═══════════════════════════════════════════════════════════════════════════

pub(super) fn online_update(
    s: &mut NetworkSession,
    now_ms: u64,
    radio: &mut impl RadioPort,
) -> Option<SessionState> {
    if now_ms.saturating_sub(s.last_link_check_ms) < s.timing.link_check_interval_ms {
        return None;
    }
    s.last_link_check_ms = now_ms;

    match radio.query_status() {
        Ok(LinkStatus::Joined) => {
            debug!("ONLINE: link check ok");
            None
        }
        Ok(LinkStatus::NotJoined) => {
            warn!("ONLINE: module reports no session");
            s.stats.link_losses = s.stats.link_losses.saturating_add(1);
            Some(SessionState::Disconnected)
        }
        Err(e) if e.is_link_loss() => {
            warn!("ONLINE: link check failed ({})", e);
            s.stats.link_losses = s.stats.link_losses.saturating_add(1);
            Some(SessionState::Disconnected)
        }
        Err(e) => {
            // A transient query failure is not evidence of link loss.
            debug!("ONLINE: link check inconclusive ({})", e);
            None
        }
    }
}
