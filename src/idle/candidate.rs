//! Next-event calculation.
//!
//! [`compute_next`] is a pure function of the settings record, the current
//! instant, and a random source. It returns the single earliest upcoming
//! event among the idle reply, the one-time schedules, and the daily
//! schedules. Candidates are never cached; every trigger recomputes from
//! scratch and the caller re-arms the one outstanding timer.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{EVENT_DAILY, EVENT_IDLE, EVENT_ONCE, OVERDUE_GRACE_SECS};
use crate::error::Result;

use super::settings::Settings;

// ── Types ────────────────────────────────────────────────────────────

/// Which sub-system produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    IdleReply,
    Once,
    Daily,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::IdleReply => "idle",
            Self::Once => "once",
            Self::Daily => "daily",
        }
    }
}

/// Kind-specific payload carried through the timer substrate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerEvent {
    IdleReply {
        #[serde(rename = "isDelayed")]
        is_delayed: bool,
    },
    Once {
        index: usize,
        time: String,
        prompt: String,
    },
    Daily {
        index: usize,
        time: String,
        prompt: String,
    },
}

impl TimerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::IdleReply { .. } => EventKind::IdleReply,
            Self::Once { .. } => EventKind::Once,
            Self::Daily { .. } => EventKind::Daily,
        }
    }

    /// Event type string used on the substrate wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IdleReply { .. } => EVENT_IDLE,
            Self::Once { .. } => EVENT_ONCE,
            Self::Daily { .. } => EVENT_DAILY,
        }
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self, Self::IdleReply { is_delayed: true })
    }
}

/// A computed, not-yet-armed next event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub time: DateTime<Utc>,
    pub event: TimerEvent,
}

impl Candidate {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn is_delayed(&self) -> bool {
        self.event.is_delayed()
    }
}

// ── Calculation ──────────────────────────────────────────────────────

/// Compute the earliest upcoming event.
///
/// Returns `Ok(None)` when the feature is off or nothing is eligible, and
/// `Err(IdleError::Config)` when the idle-reply settings are inconsistent.
/// With `force_immediate` set (a reply was just observed) the overdue
/// branch is skipped.
///
/// Ties go to the first candidate in idle → once (list order) → daily
/// (list order) order.
pub fn compute_next<Tz, R>(
    settings: &Settings,
    now: &DateTime<Tz>,
    force_immediate: bool,
    rng: &mut R,
) -> Result<Option<Candidate>>
where
    Tz: TimeZone,
    R: Rng + ?Sized,
{
    if !settings.enabled {
        return Ok(None);
    }
    settings.validate()?;

    let mut candidates = Vec::new();
    if settings.use_idle_timer {
        candidates.push(idle_candidate(settings, now, force_immediate, rng));
    }
    candidates.extend(once_candidates(settings, now));
    candidates.extend(daily_candidates(settings, now));

    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        match &best {
            Some(current) if candidate.time >= current.time => {}
            _ => best = Some(candidate),
        }
    }

    if let Some(next) = &best {
        debug!(kind = next.kind().label(), at = %next.time, delayed = next.is_delayed(), "next event");
    }
    Ok(best)
}

/// Draw the idle delay in seconds: fixed, or uniform in `[timer_min, timer]`.
///
/// Expects validated settings.
pub fn draw_delay<R: Rng + ?Sized>(settings: &Settings, rng: &mut R) -> u64 {
    if settings.random_time {
        rng.gen_range(settings.timer_min..=settings.timer)
    } else {
        settings.timer
    }
}

fn idle_candidate<Tz, R>(
    settings: &Settings,
    now: &DateTime<Tz>,
    force_immediate: bool,
    rng: &mut R,
) -> Candidate
where
    Tz: TimeZone,
    R: Rng + ?Sized,
{
    let now = now.with_timezone(&Utc);
    let anchor = settings.idle_anchor().unwrap_or(now);
    let delay = Duration::seconds(draw_delay(settings, rng) as i64);

    if !force_immediate && now - anchor > delay {
        return Candidate {
            time: now + Duration::seconds(OVERDUE_GRACE_SECS),
            event: TimerEvent::IdleReply { is_delayed: true },
        };
    }

    Candidate {
        time: anchor + delay,
        event: TimerEvent::IdleReply { is_delayed: false },
    }
}

fn once_candidates<Tz: TimeZone>(settings: &Settings, now: &DateTime<Tz>) -> Vec<Candidate> {
    let tz = now.timezone();
    let now = now.with_timezone(&Utc);
    settings
        .schedule_once_list
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.enabled)
        .filter_map(|(index, entry)| {
            let Some(time) = entry.resolve(&tz) else {
                warn!(index, time = %entry.time, "skipping one-time schedule with invalid time");
                return None;
            };
            (time > now).then(|| Candidate {
                time,
                event: TimerEvent::Once {
                    index,
                    time: entry.time.clone(),
                    prompt: entry.prompt.clone(),
                },
            })
        })
        .collect()
}

fn daily_candidates<Tz: TimeZone>(settings: &Settings, now: &DateTime<Tz>) -> Vec<Candidate> {
    settings
        .schedule_daily_list
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.enabled)
        .filter_map(|(index, entry)| {
            let Some(time_of_day) = entry.time_of_day() else {
                warn!(index, time = %entry.time, "skipping daily schedule with invalid time");
                return None;
            };
            let time = next_daily_occurrence(now, time_of_day)?;
            Some(Candidate {
                time,
                event: TimerEvent::Daily {
                    index,
                    time: entry.time.clone(),
                    prompt: entry.prompt.clone(),
                },
            })
        })
        .collect()
}

/// Today's occurrence of `time_of_day` in `now`'s zone, or tomorrow's when
/// today's is not strictly in the future.
pub fn next_daily_occurrence<Tz: TimeZone>(
    now: &DateTime<Tz>,
    time_of_day: chrono::NaiveTime,
) -> Option<DateTime<Utc>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let now_utc = now.with_timezone(&Utc);

    if let Some(at) = resolve_local(&tz, today.and_time(time_of_day)) {
        if at > now_utc {
            return Some(at);
        }
    }
    let tomorrow = today.succ_opt()?;
    resolve_local(&tz, tomorrow.and_time(time_of_day))
}

/// Longest clock jump a local time is pushed across.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Map a wall-clock time to an instant. Ambiguous times take the earlier
/// instant; times skipped by a forward clock change move to the first
/// minute that exists after the gap.
fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    (0..=MAX_GAP_MINUTES).find_map(|minutes| {
        tz.from_local_datetime(&(local + Duration::minutes(minutes)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}
