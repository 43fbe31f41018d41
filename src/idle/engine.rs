//! Idle engine: owns the settings record and the single armed timer.
//!
//! Every trigger (startup, reply, settings edit, toggle, fire) recomputes
//! the next event from scratch and re-arms the bridge. All calls happen on
//! the host loop, which is what keeps at most one timer armed.

use std::fmt::Display;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::constants::{BUSY_RETRY_SECS, OVERDUE_GRACE_SECS, TEST_FIRE_SECS};
use crate::error::Result;

use super::bridge::{FiredTimer, SchedulerBridge, SubstrateStatus, TimerSubstrate};
use super::candidate::{Candidate, TimerEvent, compute_next};
use super::dispatch::{HostContext, Outgoing, build_outgoing};
use super::settings::{Settings, SettingsStore};

/// What happened to a fired timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    /// Not the armed timer; dropped.
    Stale,
    /// Matched, but there was nothing to send.
    Ignored,
    /// Host was busy; the same event was re-armed a little later.
    Deferred(DateTime<Utc>),
    /// Ready for delivery.
    Sent(Outgoing),
}

pub struct IdleEngine {
    settings: Settings,
    store: SettingsStore,
    bridge: SchedulerBridge,
    rng: StdRng,
    problem: Option<String>,
}

impl IdleEngine {
    pub fn new(settings: Settings, store: SettingsStore, substrate: Box<dyn TimerSubstrate>) -> Self {
        Self::with_rng(settings, store, substrate, StdRng::from_entropy())
    }

    pub fn with_rng(
        settings: Settings,
        store: SettingsStore,
        substrate: Box<dyn TimerSubstrate>,
        rng: StdRng,
    ) -> Self {
        Self {
            settings,
            store,
            bridge: SchedulerBridge::new(substrate),
            rng,
            problem: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn next_event(&self) -> Option<&Candidate> {
        self.bridge.armed()
    }

    /// Last configuration error, cleared by the next successful recompute.
    pub fn problem(&self) -> Option<&str> {
        self.problem.as_deref()
    }

    pub fn substrate_status(&self) -> SubstrateStatus {
        self.bridge.status()
    }

    pub fn substrate_label(&self) -> &'static str {
        self.bridge.label()
    }

    #[cfg(test)]
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Arm the first timer of the session.
    ///
    /// A persisted anchor older than the idle timer means the deadline was
    /// missed while nothing was running: a delayed idle message goes out
    /// after the grace window.
    pub fn startup<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Option<Candidate>> {
        let now_utc = now.with_timezone(&Utc);
        let settings = &self.settings;
        let overdue = settings.enabled
            && settings.use_idle_timer
            && settings.validate().is_ok()
            && settings.last_ai_reply_time.is_some_and(|anchor| {
                now_utc - anchor > Duration::seconds(settings.timer as i64)
            });

        if !overdue {
            return self.rearm(now, false);
        }

        info!("idle deadline passed while offline, catching up");
        let candidate = Candidate {
            time: now_utc + Duration::seconds(OVERDUE_GRACE_SECS),
            event: TimerEvent::IdleReply { is_delayed: true },
        };
        self.problem = None;
        self.bridge.arm(candidate.clone())?;
        Ok(Some(candidate))
    }

    /// Recompute the next event and replace whatever is armed.
    ///
    /// Configuration errors leave nothing armed and are kept in
    /// [`IdleEngine::problem`] as well as returned.
    pub fn rearm<Tz: TimeZone>(
        &mut self,
        now: &DateTime<Tz>,
        force_immediate: bool,
    ) -> Result<Option<Candidate>> {
        match compute_next(&self.settings, now, force_immediate, &mut self.rng) {
            Ok(Some(next)) => {
                self.problem = None;
                self.bridge.arm(next.clone())?;
                Ok(Some(next))
            }
            Ok(None) => {
                self.problem = None;
                self.bridge.cancel()?;
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "not arming");
                self.problem = Some(err.to_string());
                self.bridge.cancel()?;
                Err(err)
            }
        }
    }

    /// A non-user message landed in the transcript.
    pub fn on_reply_detected<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Option<Candidate>> {
        let now_utc = now.with_timezone(&Utc);
        self.settings.last_ai_reply_time = Some(now_utc);
        self.store.save_debounced(now_utc);
        if !self.settings.enabled {
            return Ok(None);
        }
        self.rearm(now, true)
    }

    /// Switch the feature on or off.
    ///
    /// Turning it on seeds the anchor only when none was saved, so an
    /// overdue reply survives a disable/enable cycle.
    pub fn set_enabled<Tz: TimeZone>(&mut self, enabled: bool, now: &DateTime<Tz>) -> Result<Option<Candidate>> {
        let now_utc = now.with_timezone(&Utc);
        self.settings.enabled = enabled;
        if enabled && self.settings.last_ai_reply_time.is_none() {
            self.settings.last_ai_reply_time = Some(now_utc);
        }
        self.store.save_debounced(now_utc);
        info!(enabled, "idle toggled");

        if enabled {
            self.rearm(now, false)
        } else {
            self.problem = None;
            self.bridge.cancel()?;
            Ok(None)
        }
    }

    pub fn toggle<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Option<Candidate>> {
        let enabled = !self.settings.enabled;
        self.set_enabled(enabled, now)
    }

    /// Apply an edit to the settings, persist it and re-arm.
    pub fn update_settings<Tz, F>(&mut self, now: &DateTime<Tz>, edit: F) -> Result<Option<Candidate>>
    where
        Tz: TimeZone,
        F: FnOnce(&mut Settings),
    {
        edit(&mut self.settings);
        self.store.save_debounced(now.with_timezone(&Utc));
        self.rearm(now, false)
    }

    /// Arm an idle event a couple of seconds out, bypassing the schedule.
    pub fn arm_test<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Candidate> {
        let candidate = Candidate {
            time: now.with_timezone(&Utc) + Duration::seconds(TEST_FIRE_SECS),
            event: TimerEvent::IdleReply { is_delayed: false },
        };
        self.bridge.arm(candidate.clone())?;
        Ok(candidate)
    }

    pub fn reconnect(&mut self) {
        self.bridge.reconnect();
    }

    // ── Fire handling ────────────────────────────────────────────────

    /// Handle a timer reported by the substrate.
    ///
    /// The caller delivers [`FireOutcome::Sent`] through the matching
    /// channel. One-time entries are consumed before this returns.
    pub fn handle_fired<Tz>(
        &mut self,
        fired: &FiredTimer,
        ctx: &HostContext<'_>,
        now: &DateTime<Tz>,
    ) -> Result<FireOutcome>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let Some(event) = self.bridge.accept(fired) else {
            return Ok(FireOutcome::Stale);
        };
        let now_utc = now.with_timezone(&Utc);

        if ctx.generating {
            let retry_at = now_utc + Duration::seconds(BUSY_RETRY_SECS);
            info!(kind = event.kind().label(), "host busy, retrying shortly");
            self.bridge.arm(Candidate {
                time: retry_at,
                event,
            })?;
            return Ok(FireOutcome::Deferred(retry_at));
        }

        let outgoing = build_outgoing(&event, &self.settings, ctx, now, &mut self.rng);
        match &event {
            TimerEvent::IdleReply { .. } => {
                if outgoing.is_some() {
                    self.settings.last_idle_sent = Some(now_utc);
                }
            }
            TimerEvent::Once {
                index,
                time,
                prompt,
            } => self.consume_once(*index, time, prompt, now_utc),
            TimerEvent::Daily { .. } => {}
        }

        // A config error here must not lose the message already composed.
        if let Err(err) = self.rearm(now, false) {
            warn!(error = %err, "re-arm after fire failed");
        }

        Ok(match outgoing {
            Some(outgoing) => FireOutcome::Sent(outgoing),
            None => FireOutcome::Ignored,
        })
    }

    fn consume_once(&mut self, index: usize, time: &str, prompt: &str, now: DateTime<Utc>) {
        let list = &mut self.settings.schedule_once_list;
        let same = |entry: &super::settings::ScheduleOnce| entry.time == time && entry.prompt == prompt;
        let position = match list.get(index) {
            Some(entry) if same(entry) => Some(index),
            // The list was edited after arming; find the entry again.
            _ => list.iter().position(|entry| entry.enabled && same(entry)),
        };
        match position.and_then(|i| list.get_mut(i)) {
            Some(entry) => {
                entry.enabled = false;
                self.store.save_debounced(now);
            }
            None => warn!(index, "fired one-time schedule no longer exists"),
        }
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write settings if the debounce window has passed.
    pub fn flush_due<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<bool> {
        self.store.flush_due(&self.settings, now.with_timezone(&Utc))
    }

    /// Write any pending settings now.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush(&self.settings)
    }
}
