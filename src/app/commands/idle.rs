//! `/idle`, `/set` and `/backend` command handlers.

use chrono::{DateTime, Local, Utc};

use crate::error::Result as IdleResult;
use crate::idle::{Candidate, SendAs, Settings, SubstrateStatus};
use crate::util::format_countdown;

use super::super::App;
use super::super::log_src;
use super::super::logging::LogLevel;

// ── /idle ────────────────────────────────────────────────────────────

impl App {
    pub(crate) fn handle_idle_command(&mut self, args: Vec<&str>) {
        let now = Local::now();
        match args.first().copied() {
            None | Some("toggle") => {
                let result = self.engine.toggle(&now);
                self.report_toggle(result);
            }
            Some("on") => {
                let result = self.engine.set_enabled(true, &now);
                self.report_toggle(result);
            }
            Some("off") => {
                let result = self.engine.set_enabled(false, &now);
                self.report_toggle(result);
            }
            Some("status") => self.show_idle_status(),
            Some("test") => match self.engine.arm_test(&now) {
                Ok(next) => self.log(
                    LogLevel::Event,
                    format!("Test message armed: {}.", describe_candidate(&next, now.with_timezone(&Utc))),
                ),
                Err(err) => log_src!(self, LogLevel::Error, format!("Test failed: {err}")),
            },
            Some(other) => log_src!(
                self,
                LogLevel::Warn,
                format!("Unknown /idle command: {other} (try on, off, status, test)")
            ),
        }
    }

    fn report_toggle(&mut self, result: IdleResult<Option<Candidate>>) {
        let state = if self.engine.settings().enabled {
            "enabled"
        } else {
            "disabled"
        };
        self.log(LogLevel::Info, format!("Idle replies {state}."));
        self.report_schedule(result);
    }

    /// Log the outcome of a recompute: the next event or why there is none.
    pub(crate) fn report_schedule(&mut self, result: IdleResult<Option<Candidate>>) {
        match result {
            Ok(Some(next)) => {
                let line = describe_candidate(&next, Utc::now());
                self.log(LogLevel::Event, format!("Next: {line}."));
            }
            Ok(None) => {
                if self.engine.settings().enabled {
                    self.log(LogLevel::Info, "Nothing scheduled.".to_string());
                }
            }
            Err(err) => log_src!(self, LogLevel::Error, format!("Not scheduling: {err}")),
        }
    }

    fn show_idle_status(&mut self) {
        let settings = self.engine.settings().clone();
        let onoff = |flag: bool| if flag { "on" } else { "off" };
        let delay = if settings.random_time {
            format!("{}-{}s random", settings.timer_min, settings.timer)
        } else {
            format!("{}s", settings.timer)
        };
        let anchor = settings
            .last_ai_reply_time
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());

        let mut lines = vec![
            format!("Idle replies: {}", onoff(settings.enabled)),
            format!(
                "Idle timer: {} ({delay}), send as {}, show prompt {}",
                onoff(settings.use_idle_timer),
                settings.send_as.as_str(),
                onoff(settings.include_prompt)
            ),
            format!("Last reply: {anchor}"),
            format!(
                "Prompts: {}, one-time: {}, daily: {}",
                settings.active_prompts().len(),
                enabled_count(settings.schedule_once_list.iter().map(|e| e.enabled)),
                enabled_count(settings.schedule_daily_list.iter().map(|e| e.enabled)),
            ),
        ];
        lines.push(match self.engine.next_event() {
            Some(next) => format!("Next: {}", describe_candidate(next, Utc::now())),
            None => "Next: nothing armed".to_string(),
        });
        for line in lines {
            self.log(LogLevel::Info, line);
        }
        let status = self.engine.substrate_status();
        if !status.is_available() {
            log_src!(
                self,
                LogLevel::Warn,
                format!("Timer backend {}; idle messages are paused.", status.label())
            );
        }
        if let Some(problem) = self.engine.problem().map(str::to_string) {
            log_src!(self, LogLevel::Warn, format!("Configuration problem: {problem}"));
        }
    }
}

fn enabled_count(flags: impl Iterator<Item = bool>) -> String {
    let flags: Vec<bool> = flags.collect();
    let on = flags.iter().filter(|flag| **flag).count();
    format!("{on}/{}", flags.len())
}

/// `idle at 14:05:00 (in 3m05s)`, with a `delayed` marker when overdue.
pub(crate) fn describe_candidate(candidate: &Candidate, now: DateTime<Utc>) -> String {
    let at = candidate.time.with_timezone(&Local).format("%H:%M:%S");
    let left = format_countdown((candidate.time - now).num_seconds());
    let delayed = if candidate.is_delayed() { ", delayed" } else { "" };
    format!("{} at {at} (in {left}{delayed})", candidate.kind().label())
}

// ── /set ─────────────────────────────────────────────────────────────

/// Parse `on`/`off` style switches.
pub(crate) fn parse_switch(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// A validated `/set` edit.
#[derive(Debug, PartialEq, Eq)]
enum SettingEdit {
    Timer(u64),
    TimerMin(u64),
    Random(bool),
    UseTimer(bool),
    SendAs(SendAs),
    IncludePrompt(bool),
}

impl SettingEdit {
    fn parse(name: &str, value: &str) -> Result<Self, String> {
        let seconds = || {
            value
                .parse::<u64>()
                .map_err(|_| format!("{value} is not a whole number of seconds"))
        };
        let switch = || parse_switch(value).ok_or_else(|| format!("{value} is not on/off"));
        match name {
            "timer" => seconds().map(Self::Timer),
            "min" | "timermin" => seconds().map(Self::TimerMin),
            "random" => switch().map(Self::Random),
            "usetimer" => switch().map(Self::UseTimer),
            "sendas" => SendAs::parse(value)
                .map(Self::SendAs)
                .ok_or_else(|| format!("{value} is not one of user, char, sys, raw")),
            "include" => switch().map(Self::IncludePrompt),
            other => Err(format!("unknown setting {other}")),
        }
    }

    fn apply(self, settings: &mut Settings) {
        match self {
            Self::Timer(secs) => settings.timer = secs,
            Self::TimerMin(secs) => settings.timer_min = secs,
            Self::Random(on) => settings.random_time = on,
            Self::UseTimer(on) => settings.use_idle_timer = on,
            Self::SendAs(channel) => settings.send_as = channel,
            Self::IncludePrompt(on) => settings.include_prompt = on,
        }
    }
}

impl App {
    pub(crate) fn handle_set_command(&mut self, args: Vec<&str>) {
        let (Some(name), Some(value)) = (args.first(), args.get(1)) else {
            log_src!(
                self,
                LogLevel::Warn,
                "Usage: /set <timer|min|random|usetimer|sendas|include> <value>".to_string()
            );
            return;
        };

        let edit = match SettingEdit::parse(&name.to_lowercase(), value) {
            Ok(edit) => edit,
            Err(err) => {
                log_src!(self, LogLevel::Warn, format!("Not changed: {err}."));
                return;
            }
        };
        self.log(LogLevel::Info, format!("Set {name} = {value}."));
        let result = self.engine.update_settings(&Local::now(), |settings| edit.apply(settings));
        self.report_schedule(result);
    }
}

// ── /backend ─────────────────────────────────────────────────────────

impl App {
    pub(crate) fn handle_backend_command(&mut self, args: Vec<&str>) {
        match args.first().copied() {
            None | Some("status") => {
                let status = self.engine.substrate_status();
                let label = self.engine.substrate_label();
                let level = match status {
                    SubstrateStatus::Disconnected(_) => LogLevel::Warn,
                    _ => LogLevel::Info,
                };
                self.log(level, format!("Timer backend: {label} ({}).", status.label()));
            }
            Some("reconnect") => {
                self.engine.reconnect();
                self.log(LogLevel::Info, "Reconnecting to the timer service…".to_string());
            }
            Some(other) => log_src!(
                self,
                LogLevel::Warn,
                format!("Unknown /backend command: {other}")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::app::tests::test_app;
    use crate::idle::candidate::{EventKind, TimerEvent};

    #[test]
    fn switches() {
        assert_eq!(parse_switch("ON"), Some(true));
        assert_eq!(parse_switch("no"), Some(false));
        assert_eq!(parse_switch("maybe"), None);
    }

    #[test]
    fn setting_edits_parse() {
        assert_eq!(SettingEdit::parse("timer", "90"), Ok(SettingEdit::Timer(90)));
        assert_eq!(
            SettingEdit::parse("sendas", "narrator"),
            Ok(SettingEdit::SendAs(SendAs::Sys))
        );
        assert!(SettingEdit::parse("timer", "-4").is_err());
        assert!(SettingEdit::parse("colour", "red").is_err());
    }

    #[test]
    fn candidate_description() {
        let now = Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap();
        let candidate = Candidate {
            time: now + Duration::seconds(185),
            event: TimerEvent::IdleReply { is_delayed: true },
        };
        let text = describe_candidate(&candidate, now);
        assert!(text.starts_with("idle at "));
        assert!(text.ends_with("(in 3m05s, delayed)"));
        assert_eq!(candidate.kind(), EventKind::IdleReply);
    }

    #[test]
    fn idle_toggle_arms_and_disarms() {
        let (mut app, substrate) = test_app(Settings::default());
        app.handle_command("/idle").unwrap();
        assert!(app.engine.settings().enabled);
        assert!(substrate.outstanding().is_some());
        assert!(app.logs.iter().any(|l| l.message == "Idle replies enabled."));

        app.handle_command("/idle off").unwrap();
        assert!(!app.engine.settings().enabled);
        assert!(substrate.outstanding().is_none());
    }

    #[test]
    fn set_rearms_and_rejects_bad_range() {
        let (mut app, _) = test_app(Settings::default());
        app.handle_command("/idle on").unwrap();
        app.handle_command("/set timer 30").unwrap();
        assert_eq!(app.engine.settings().timer, 30);

        app.handle_command("/set random on").unwrap();
        assert!(app.engine.problem().is_some());
        assert!(app.engine.next_event().is_none());
        assert!(app.logs.iter().any(|l| l.message.starts_with("Not scheduling")));

        app.handle_command("/set min 10").unwrap();
        assert!(app.engine.problem().is_none());
        assert!(app.engine.next_event().is_some());
    }

    #[test]
    fn bad_set_value_changes_nothing() {
        let (mut app, _) = test_app(Settings::default());
        app.handle_command("/set sendas pigeon").unwrap();
        assert_eq!(app.engine.settings().send_as, SendAs::User);
        assert!(app.logs.last().unwrap().message.starts_with("Not changed"));
    }

    #[test]
    fn status_and_backend_report() {
        let (mut app, _) = test_app(Settings::default());
        app.handle_command("/idle status").unwrap();
        assert!(app.logs.iter().any(|l| l.message == "Idle replies: off"));
        app.handle_command("/backend").unwrap();
        assert_eq!(
            app.logs.last().unwrap().message,
            "Timer backend: recording (ready)."
        );
    }
}
