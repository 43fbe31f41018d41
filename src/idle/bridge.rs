//! Scheduler bridge: the single armed timer and its execution substrate.
//!
//! The bridge maps a [`Candidate`] onto an opaque "fire at T, carry this
//! payload" request for a [`TimerSubstrate`] and matches fired timers back
//! to what was armed. At most one timer is outstanding: arming replaces,
//! a fire is delivered once and leaves the bridge unarmed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;

use super::candidate::{Candidate, TimerEvent};

// ── Substrate interface ──────────────────────────────────────────────

/// A "fire at `fire_at` ms since epoch" request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRequest {
    pub fire_at: i64,
    pub event_type: String,
    pub event_data: Value,
}

/// A timer reported as fired by the substrate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredTimer {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Value,
}

/// Reachability of the substrate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubstrateStatus {
    /// In-process substrate, always available.
    Ready,
    Connecting,
    Connected,
    Disconnected(String),
}

impl SubstrateStatus {
    pub fn label(&self) -> String {
        match self {
            Self::Ready => "ready".to_string(),
            Self::Connecting => "connecting".to_string(),
            Self::Connected => "connected".to_string(),
            Self::Disconnected(reason) => format!("offline ({reason})"),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ready | Self::Connected)
    }
}

/// Something that can keep one timer alive and report when it fires.
///
/// Fired timers are delivered out of band on the channel the substrate was
/// built with; the host loop feeds them to [`SchedulerBridge::accept`].
pub trait TimerSubstrate: Send {
    /// Short name shown in the status bar.
    fn label(&self) -> &'static str;

    fn status(&self) -> SubstrateStatus;

    /// Replace any outstanding timer with `request`.
    fn schedule_timer(&mut self, request: TimerRequest) -> Result<()>;

    /// Drop the outstanding timer, if any.
    fn cancel_timer(&mut self) -> Result<()>;

    /// Retry the connection now instead of waiting out the backoff.
    fn reconnect(&mut self) {}
}

// ── Bridge ───────────────────────────────────────────────────────────

struct ArmedTimer {
    id: u64,
    candidate: Candidate,
}

/// Owner of the single outstanding timer.
pub struct SchedulerBridge {
    substrate: Box<dyn TimerSubstrate>,
    armed: Option<ArmedTimer>,
    next_id: u64,
}

impl SchedulerBridge {
    pub fn new(substrate: Box<dyn TimerSubstrate>) -> Self {
        // Ids start at the wall clock so fires left over from a previous
        // process never match a fresh arm.
        let next_id = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(1);
        Self {
            substrate,
            armed: None,
            next_id,
        }
    }

    /// Arm `candidate`, replacing whatever was armed before.
    pub fn arm(&mut self, candidate: Candidate) -> Result<()> {
        self.next_id += 1;
        let id = self.next_id;

        let mut event_data = serde_json::to_value(&candidate.event)?;
        if let Value::Object(map) = &mut event_data {
            map.insert("timerId".to_string(), Value::from(id));
        }
        let request = TimerRequest {
            fire_at: candidate.time.timestamp_millis(),
            event_type: candidate.event.event_type().to_string(),
            event_data,
        };

        self.armed = None;
        self.substrate.schedule_timer(request)?;
        debug!(id, kind = candidate.kind().label(), at = %candidate.time, "timer armed");
        self.armed = Some(ArmedTimer { id, candidate });
        Ok(())
    }

    /// Clear the armed timer. A no-op when nothing is armed.
    pub fn cancel(&mut self) -> Result<()> {
        if let Some(armed) = self.armed.take() {
            debug!(id = armed.id, "timer cancelled");
            self.substrate.cancel_timer()?;
        }
        Ok(())
    }

    /// Match a fired timer against the armed one.
    ///
    /// Returns the armed event exactly once and leaves the bridge unarmed;
    /// fires that do not belong to the current timer are dropped.
    pub fn accept(&mut self, fired: &FiredTimer) -> Option<TimerEvent> {
        let fired_id = fired.event_data.get("timerId").and_then(Value::as_u64);
        let matches = self.armed.as_ref().is_some_and(|armed| {
            Some(armed.id) == fired_id && armed.candidate.event.event_type() == fired.event_type
        });
        if !matches {
            debug!(event_type = %fired.event_type, ?fired_id, "dropping stale timer fire");
            return None;
        }

        let armed = self.armed.take()?;
        info!(id = armed.id, kind = armed.candidate.kind().label(), "timer fired");
        Some(armed.candidate.event)
    }

    /// The candidate currently armed, for the next-event indicator.
    pub fn armed(&self) -> Option<&Candidate> {
        self.armed.as_ref().map(|armed| &armed.candidate)
    }

    pub fn status(&self) -> SubstrateStatus {
        self.substrate.status()
    }

    pub fn label(&self) -> &'static str {
        self.substrate.label()
    }

    pub fn reconnect(&mut self) {
        self.substrate.reconnect();
    }
}
