//! Idle settings record: defaults, validation, and debounced persistence.
//!
//! The record lives under the `"idle"` key of a shared extension-settings
//! JSON file so other extensions can keep their own namespaces alongside.
//! Field names keep the camelCase wire names the record has always used.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::{
    APP_NAME, DEFAULT_PROMPTS, DEFAULT_TIMER_MIN_SECS, DEFAULT_TIMER_SECS, MAX_TIMER_SECS,
    SETTINGS_DEBOUNCE_MS, SETTINGS_FILE, SETTINGS_NAMESPACE,
};
use crate::error::{IdleError, Result};
use crate::util::env_first;

// ── Record types ─────────────────────────────────────────────────────

/// Delivery channel for outgoing idle messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendAs {
    /// Addressed as the user.
    #[default]
    User,
    /// Addressed as the character (quiet prompt).
    Char,
    /// Narrator / system line.
    Sys,
    /// Injected into the input line and submitted.
    Raw,
}

impl SendAs {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "char" | "character" => Some(Self::Char),
            "sys" | "system" | "narrator" => Some(Self::Sys),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Char => "char",
            Self::Sys => "sys",
            Self::Raw => "raw",
        }
    }
}

/// A one-shot schedule entry, consumed after it fires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOnce {
    pub enabled: bool,
    /// Absolute local date-time, `YYYY-MM-DDTHH:MM`.
    pub time: String,
    pub prompt: String,
}

/// A recurring schedule entry, evaluated every day.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleDaily {
    pub enabled: bool,
    /// Time of day, `HH:MM`.
    pub time: String,
    pub prompt: String,
}

/// The single shared settings record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub enabled: bool,
    pub use_idle_timer: bool,
    #[serde(deserialize_with = "lenient_secs")]
    pub timer: u64,
    pub random_time: bool,
    #[serde(deserialize_with = "lenient_secs")]
    pub timer_min: u64,
    pub prompts: Vec<String>,
    pub send_as: SendAs,
    pub include_prompt: bool,
    #[serde(rename = "lastAIReplyTime")]
    pub last_ai_reply_time: Option<DateTime<Utc>>,
    pub schedule_once_list: Vec<ScheduleOnce>,
    pub schedule_daily_list: Vec<ScheduleDaily>,
    /// When this process last sent an idle message. Session-only.
    #[serde(skip)]
    pub last_idle_sent: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            use_idle_timer: true,
            timer: DEFAULT_TIMER_SECS,
            random_time: false,
            timer_min: DEFAULT_TIMER_MIN_SECS,
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            send_as: SendAs::User,
            include_prompt: false,
            last_ai_reply_time: None,
            schedule_once_list: Vec::new(),
            schedule_daily_list: Vec::new(),
            last_idle_sent: None,
        }
    }
}

/// Accept integer seconds given either as a JSON number or a numeric string.
fn lenient_secs<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| D::Error::custom(format!("invalid seconds: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("invalid seconds: {s:?}"))),
        other => Err(D::Error::custom(format!("invalid seconds: {other}"))),
    }
}

// ── Validation & derived values ──────────────────────────────────────

impl Settings {
    /// Reject setting combinations the scheduler cannot honour.
    ///
    /// Only the idle-reply fields are checked, and only while the idle reply
    /// is switched on.
    pub fn validate(&self) -> Result<()> {
        if !self.use_idle_timer {
            return Ok(());
        }
        if self.timer < 1 {
            return Err(IdleError::Config("idle timer must be at least 1 second".into()));
        }
        if self.timer > MAX_TIMER_SECS {
            return Err(IdleError::Config(format!(
                "idle timer must not exceed {MAX_TIMER_SECS} seconds"
            )));
        }
        if self.random_time {
            if self.timer_min < 1 {
                return Err(IdleError::Config(
                    "idle timer minimum must be at least 1 second".into(),
                ));
            }
            if self.timer_min > self.timer {
                return Err(IdleError::Config(format!(
                    "idle timer minimum ({}s) exceeds idle timer ({}s)",
                    self.timer_min, self.timer
                )));
            }
        }
        if self.active_prompts().is_empty() {
            return Err(IdleError::Config(
                "idle reply is on but no prompts are configured".into(),
            ));
        }
        Ok(())
    }

    /// Prompts with blank lines dropped.
    pub fn active_prompts(&self) -> Vec<&str> {
        self.prompts
            .iter()
            .map(|p| p.as_str())
            .filter(|p| !p.trim().is_empty())
            .collect()
    }

    /// The instant the idle delay is measured from.
    ///
    /// The later of the last observed reply and the last idle message this
    /// process sent, so the idle loop repeats at the configured cadence.
    pub fn idle_anchor(&self) -> Option<DateTime<Utc>> {
        match (self.last_ai_reply_time, self.last_idle_sent) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

impl ScheduleOnce {
    /// Resolve the entry's absolute instant in the zone of `tz`.
    pub fn resolve<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Utc>> {
        parse_absolute(&self.time, tz)
    }
}

impl ScheduleDaily {
    /// The entry's time of day; seconds are dropped.
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        let raw = self.time.trim();
        let parsed = NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()?;
        NaiveTime::from_hms_opt(parsed.hour(), parsed.minute(), 0)
    }
}

/// Parse `YYYY-MM-DDTHH:MM[:SS]` in `tz`, or an RFC 3339 instant.
pub fn parse_absolute<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Load-time repair ─────────────────────────────────────────────────

/// Build settings from a stored JSON object, merging defaults for missing
/// keys and replacing keys whose value does not deserialize.
///
/// Returns the settings plus the names of the keys that were repaired.
pub fn merge_with_defaults(stored: Value) -> (Settings, Vec<String>) {
    let defaults = Settings::default();
    let Ok(Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
        return (defaults, Vec::new());
    };
    let Value::Object(stored) = stored else {
        return (defaults, vec![SETTINGS_NAMESPACE.to_string()]);
    };

    let mut repaired = Vec::new();
    for (key, value) in stored {
        let Some(previous) = merged.get(&key).cloned() else {
            debug!(key = %key, "dropping unknown settings key");
            continue;
        };
        merged.insert(key.clone(), value);
        if serde_json::from_value::<Settings>(Value::Object(merged.clone())).is_err() {
            merged.insert(key.clone(), previous);
            repaired.push(key);
        }
    }

    match serde_json::from_value::<Settings>(Value::Object(merged)) {
        Ok(settings) => (settings, repaired),
        Err(_) => (defaults, repaired),
    }
}

// ── Persistence ──────────────────────────────────────────────────────

/// Debounced writer for the shared extension-settings file.
///
/// A `save_debounced` call only marks the store dirty; the host loop calls
/// [`SettingsStore::flush_due`] on every tick and the write happens once the
/// debounce window has passed without further edits.
pub struct SettingsStore {
    path: Option<PathBuf>,
    pending_until: Option<DateTime<Utc>>,
}

impl SettingsStore {
    /// Store backed by `path`.
    pub fn at(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            pending_until: None,
        }
    }

    /// Store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            pending_until: None,
        }
    }

    /// Resolve the settings path from `IDLE_SETTINGS_PATH` or the config dir.
    pub fn from_env() -> Self {
        if let Some(path) = env_first(&["IDLE_SETTINGS_PATH"]) {
            return Self::at(PathBuf::from(path));
        }
        match ProjectDirs::from("com", APP_NAME, APP_NAME) {
            Some(dirs) => Self::at(dirs.config_dir().join(SETTINGS_FILE)),
            None => {
                warn!("no config directory available, settings will not persist");
                Self::in_memory()
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load settings, repairing anything missing or malformed.
    ///
    /// Never fails: unreadable files fall back to defaults.
    pub fn load(&self) -> (Settings, Vec<String>) {
        match self.read_namespace() {
            Ok(Some(value)) => merge_with_defaults(value),
            Ok(None) => (Settings::default(), Vec::new()),
            Err(err) => {
                warn!(error = %err, "settings unreadable, using defaults");
                (Settings::default(), Vec::new())
            }
        }
    }

    /// Request a write; coalesced with other requests inside the window.
    pub fn save_debounced(&mut self, now: DateTime<Utc>) {
        self.pending_until = Some(now + Duration::milliseconds(SETTINGS_DEBOUNCE_MS));
    }

    #[cfg(test)]
    pub fn is_dirty(&self) -> bool {
        self.pending_until.is_some()
    }

    /// Write `settings` if a debounced save has come due. Returns whether it wrote.
    pub fn flush_due(&mut self, settings: &Settings, now: DateTime<Utc>) -> Result<bool> {
        match self.pending_until {
            Some(due) if due <= now => {
                self.flush(settings)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Write immediately if anything is pending.
    pub fn flush(&mut self, settings: &Settings) -> Result<()> {
        if self.pending_until.take().is_none() {
            return Ok(());
        }
        self.write(settings)
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut root = match self.read_root()? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        root.insert(SETTINGS_NAMESPACE.to_string(), serde_json::to_value(settings)?);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                IdleError::Settings(format!("create {}: {err}", parent.display()))
            })?;
        }
        let contents = serde_json::to_string_pretty(&Value::Object(root))?;
        fs::write(path, contents)
            .map_err(|err| IdleError::Settings(format!("write {}: {err}", path.display())))?;
        debug!(path = %path.display(), "settings written");
        Ok(())
    }

    fn read_root(&self) -> Result<Option<Value>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .map_err(|err| IdleError::Settings(format!("read {}: {err}", path.display())))?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn read_namespace(&self) -> Result<Option<Value>> {
        Ok(self
            .read_root()?
            .and_then(|mut root| root.get_mut(SETTINGS_NAMESPACE).map(Value::take)))
    }
}
