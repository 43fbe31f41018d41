//! `/prompts`, `/once` and `/daily` command handlers.
//!
//! Entries are numbered from 1 in listings and arguments.

use chrono::Local;

use crate::constants::DEFAULT_PROMPTS;
use crate::idle::settings::parse_absolute;
use crate::idle::{ScheduleDaily, ScheduleOnce, Settings};

use super::super::App;
use super::super::log_src;
use super::super::logging::LogLevel;

/// Turn a 1-based argument into an index into a list of `len` items.
fn entry_index(raw: Option<&&str>, len: usize) -> Result<usize, String> {
    let raw = raw.ok_or_else(|| "missing entry number".to_string())?;
    match raw.parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Ok(n - 1),
        _ => Err(format!("no entry {raw} (have {len})")),
    }
}

impl App {
    /// Apply a settings edit from a command and report the new schedule.
    fn edit_settings(&mut self, done: String, edit: impl FnOnce(&mut Settings)) {
        self.log(LogLevel::Info, done);
        let result = self.engine.update_settings(&Local::now(), edit);
        self.report_schedule(result);
    }
}

// ── /prompts ─────────────────────────────────────────────────────────

impl App {
    pub(crate) fn handle_prompts_command(&mut self, args: Vec<&str>) {
        match args.first().copied() {
            None | Some("list") => self.list_prompts(),
            Some("add") => {
                let text = args[1..].join(" ");
                if text.trim().is_empty() {
                    log_src!(self, LogLevel::Warn, "Usage: /prompts add <text>".to_string());
                    return;
                }
                self.edit_settings(format!("Added prompt: {text}"), |s| s.prompts.push(text));
            }
            Some("remove") | Some("rm") => {
                match entry_index(args.get(1), self.engine.settings().prompts.len()) {
                    Ok(index) => self.edit_settings(format!("Removed prompt {}.", index + 1), |s| {
                        s.prompts.remove(index);
                    }),
                    Err(err) => log_src!(self, LogLevel::Warn, format!("Not removed: {err}.")),
                }
            }
            Some("clear") => {
                self.edit_settings("Cleared all prompts.".to_string(), |s| s.prompts.clear())
            }
            Some("reset") => self.edit_settings("Restored the stock prompts.".to_string(), |s| {
                s.prompts = DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect();
            }),
            Some(other) => log_src!(
                self,
                LogLevel::Warn,
                format!("Unknown /prompts command: {other}")
            ),
        }
    }

    fn list_prompts(&mut self) {
        let prompts = self.engine.settings().prompts.clone();
        if prompts.is_empty() {
            self.log(LogLevel::Info, "No prompts. Add one with /prompts add <text>.".to_string());
            return;
        }
        for (i, prompt) in prompts.iter().enumerate() {
            self.log(LogLevel::Info, format!("{:>3}. {prompt}", i + 1));
        }
    }
}

// ── /once ────────────────────────────────────────────────────────────

impl App {
    pub(crate) fn handle_once_command(&mut self, args: Vec<&str>) {
        let len = self.engine.settings().schedule_once_list.len();
        match args.first().copied() {
            None | Some("list") => self.list_once(),
            Some("add") => {
                let (Some(when), Some(_)) = (args.get(1), args.get(2)) else {
                    log_src!(
                        self,
                        LogLevel::Warn,
                        "Usage: /once add <YYYY-MM-DDTHH:MM> <message>".to_string()
                    );
                    return;
                };
                if parse_absolute(when, &Local).is_none() {
                    log_src!(
                        self,
                        LogLevel::Warn,
                        format!("Not added: {when} is not YYYY-MM-DDTHH:MM.")
                    );
                    return;
                }
                let entry = ScheduleOnce {
                    enabled: true,
                    time: when.to_string(),
                    prompt: args[2..].join(" "),
                };
                self.edit_settings(format!("Added one-time message at {when}."), |s| {
                    s.schedule_once_list.push(entry)
                });
            }
            Some("remove") | Some("rm") => match entry_index(args.get(1), len) {
                Ok(index) => self.edit_settings(format!("Removed one-time message {}.", index + 1), |s| {
                    s.schedule_once_list.remove(index);
                }),
                Err(err) => log_src!(self, LogLevel::Warn, format!("Not removed: {err}.")),
            },
            Some("toggle") => match entry_index(args.get(1), len) {
                Ok(index) => self.edit_settings(format!("Toggled one-time message {}.", index + 1), |s| {
                    let entry = &mut s.schedule_once_list[index];
                    entry.enabled = !entry.enabled;
                }),
                Err(err) => log_src!(self, LogLevel::Warn, format!("Not toggled: {err}.")),
            },
            Some(other) => log_src!(self, LogLevel::Warn, format!("Unknown /once command: {other}")),
        }
    }

    fn list_once(&mut self) {
        let entries = self.engine.settings().schedule_once_list.clone();
        if entries.is_empty() {
            self.log(LogLevel::Info, "No one-time messages.".to_string());
            return;
        }
        let now = Local::now();
        for (i, entry) in entries.iter().enumerate() {
            let state = match entry.resolve(&Local) {
                _ if !entry.enabled => "off",
                None => "invalid",
                Some(at) if at <= now => "past",
                Some(_) => "on",
            };
            self.log(
                LogLevel::Info,
                format!("{:>3}. [{state}] {} {}", i + 1, entry.time, entry.prompt),
            );
        }
    }
}

// ── /daily ───────────────────────────────────────────────────────────

impl App {
    pub(crate) fn handle_daily_command(&mut self, args: Vec<&str>) {
        let len = self.engine.settings().schedule_daily_list.len();
        match args.first().copied() {
            None | Some("list") => self.list_daily(),
            Some("add") => {
                let (Some(when), Some(_)) = (args.get(1), args.get(2)) else {
                    log_src!(self, LogLevel::Warn, "Usage: /daily add <HH:MM> <message>".to_string());
                    return;
                };
                let entry = ScheduleDaily {
                    enabled: true,
                    time: when.to_string(),
                    prompt: args[2..].join(" "),
                };
                if entry.time_of_day().is_none() {
                    log_src!(self, LogLevel::Warn, format!("Not added: {when} is not HH:MM."));
                    return;
                }
                self.edit_settings(format!("Added daily message at {when}."), |s| {
                    s.schedule_daily_list.push(entry)
                });
            }
            Some("remove") | Some("rm") => match entry_index(args.get(1), len) {
                Ok(index) => self.edit_settings(format!("Removed daily message {}.", index + 1), |s| {
                    s.schedule_daily_list.remove(index);
                }),
                Err(err) => log_src!(self, LogLevel::Warn, format!("Not removed: {err}.")),
            },
            Some("toggle") => match entry_index(args.get(1), len) {
                Ok(index) => self.edit_settings(format!("Toggled daily message {}.", index + 1), |s| {
                    let entry = &mut s.schedule_daily_list[index];
                    entry.enabled = !entry.enabled;
                }),
                Err(err) => log_src!(self, LogLevel::Warn, format!("Not toggled: {err}.")),
            },
            Some(other) => log_src!(self, LogLevel::Warn, format!("Unknown /daily command: {other}")),
        }
    }

    fn list_daily(&mut self) {
        let entries = self.engine.settings().schedule_daily_list.clone();
        if entries.is_empty() {
            self.log(LogLevel::Info, "No daily messages.".to_string());
            return;
        }
        for (i, entry) in entries.iter().enumerate() {
            let state = if entry.enabled { "on" } else { "off" };
            self.log(
                LogLevel::Info,
                format!("{:>3}. [{state}] {} {}", i + 1, entry.time, entry.prompt),
            );
        }
    }
}
