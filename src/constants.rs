//! Compile-time constants and tunables shared across the crate.

/// Application name used for config directories and the log file.
pub const APP_NAME: &str = "idle-nudge";
/// Application version injected from `Cargo.toml` at compile time.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extension namespace this crate owns inside the settings file.
pub const SETTINGS_NAMESPACE: &str = "idle";
/// File name of the shared extension-settings record.
pub const SETTINGS_FILE: &str = "extension_settings.json";
/// Debounce window for settings writes (milliseconds).
pub const SETTINGS_DEBOUNCE_MS: i64 = 1000;

/// Default OpenAI chat model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum number of log entries kept in the activity panel.
pub const MAX_LOGS: usize = 1000;
/// Maximum number of messages sent to the LLM as conversation context.
pub const MAX_THREAD_MESSAGES: usize = 30;

// ── Idle / schedule constants ────────────────────────────────────────

/// Default idle delay in seconds.
pub const DEFAULT_TIMER_SECS: u64 = 120;
/// Default lower bound of the random idle delay in seconds.
pub const DEFAULT_TIMER_MIN_SECS: u64 = 60;
/// Upper bound accepted for the idle delay (one year).
pub const MAX_TIMER_SECS: u64 = 365 * 24 * 3600;
/// Grace window before an overdue idle message goes out.
pub const OVERDUE_GRACE_SECS: i64 = 10;
/// Retry delay when a timer fires while the host is generating.
pub const BUSY_RETRY_SECS: i64 = 5;
/// Delay used by `/idle test`.
pub const TEST_FIRE_SECS: i64 = 2;

/// Stock idle prompts shipped as defaults.
pub const DEFAULT_PROMPTS: [&str; 10] = [
    "*stands silently, looking deep in thought*",
    "*pauses, eyes wandering over the surroundings*",
    "*hesitates, appearing lost for a moment*",
    "*takes a deep breath, collecting their thoughts*",
    "*gazes into the distance, seemingly distracted*",
    "*remains still, absorbing the ambiance*",
    "*lingers in silence, a contemplative look on their face*",
    "*stops, fingers brushing against an old memory*",
    "*seems to drift into a momentary daydream*",
    "*waits quietly, allowing the weight of the moment to settle*",
];

/// Notice prepended to an idle message that went out late.
pub const DELAYED_NOTICE: &str =
    "{{char}}'s previous message never went out and needs to tell {{user}}";

// ── Timer substrate constants ────────────────────────────────────────

/// Default URL of the network timer service.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8765";
/// Fixed backoff between reconnect attempts to the timer service.
pub const RECONNECT_BACKOFF_SECS: u64 = 5;
/// Longest single sleep of the in-process timer before re-checking the clock.
pub const LOCAL_TIMER_SLICE_SECS: u64 = 15;

/// Wire event type for the idle reply.
pub const EVENT_IDLE: &str = "IDLE_TRIGGER";
/// Wire event type for a one-time schedule.
pub const EVENT_ONCE: &str = "SCHEDULE_ONCE_TRIGGER";
/// Wire event type for a daily schedule.
pub const EVENT_DAILY: &str = "SCHEDULE_DAILY_TRIGGER";

// ── Chat host defaults ───────────────────────────────────────────────

/// Default character name used for `{{char}}`.
pub const DEFAULT_CHAR_NAME: &str = "Companion";
/// Default user name used for `{{user}}`.
pub const DEFAULT_USER_NAME: &str = "User";
