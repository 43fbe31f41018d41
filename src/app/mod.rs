//! Application core: state, lifecycle, and event dispatch.
//!
//! The [`App`] struct holds all runtime state and is the single entry point
//! for the rest of the binary. It is also the one place the idle engine is
//! driven from, so every recompute, arm and settings write happens on the
//! draw loop thread. Heavy concerns are delegated to focused submodules:
//!
//! | Module       | Responsibility                              |
//! |--------------|---------------------------------------------|
//! | `character`  | Character / user names and persona          |
//! | `chat`       | Transcript, generation, idle delivery       |
//! | `commands`   | Slash-command dispatch & handlers           |
//! | `input`      | Text-input editing (cursor, history)        |
//! | `logging`    | `LogLevel`, `LogLine`, `mask_key`           |
//! | `ui`         | TUI rendering & status-bar helpers          |

mod character;
mod chat;
mod commands;
mod input;
mod logging;
mod ui;

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::constants::{DEFAULT_BACKEND_URL, MAX_LOGS, RECONNECT_BACKOFF_SECS};
use crate::idle::{
    FireOutcome, FiredTimer, HostContext, IdleEngine, ReplyMonitor, SettingsStore, SubstrateStatus,
    TimerSubstrate,
};
use crate::openai::OpenAiClient;
use crate::substrate::{LocalTimer, RemoteTimer};
use crate::util::env_first;

use self::character::Character;
use self::chat::{ChatEntry, ChatEvent};
use self::logging::{LogLevel, LogLine, mask_key};

// ── Application state ────────────────────────────────────────────────

/// Top-level application state.
///
/// Fields use `pub(crate)` visibility so that the sibling submodules
/// (`commands`, `chat`, `ui`, …) can access them directly.
pub struct App {
    pub(crate) runtime: Runtime,
    pub(crate) input: String,
    pub(crate) cursor: usize,
    pub(crate) input_history: Vec<String>,
    pub(crate) history_index: Option<usize>,
    pub(crate) history_stash: String,
    pub(crate) logs: Vec<LogLine>,
    pub(crate) transcript: Vec<ChatEntry>,
    pub(crate) monitor: ReplyMonitor,
    pub(crate) engine: IdleEngine,
    pub(crate) fired_rx: UnboundedReceiver<FiredTimer>,
    pub(crate) chat_tx: UnboundedSender<ChatEvent>,
    pub(crate) chat_rx: UnboundedReceiver<ChatEvent>,
    /// Generations in flight; non-zero is the host's busy signal.
    pub(crate) generating: usize,
    pub(crate) character: Character,
    pub(crate) openai: OpenAiClient,
    pub(crate) openai_key: Option<String>,
    pub(crate) last_status: Option<SubstrateStatus>,
    pub(crate) scroll_offset: u16,
    pub(crate) should_quit: bool,
}

// ── Lifecycle ────────────────────────────────────────────────────────

impl App {
    /// Create and initialise a new application instance.
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new().context("create tokio runtime")?;
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let backend_url = env_first(&["IDLE_BACKEND_URL"]).or_else(|| {
            (env_first(&["IDLE_BACKEND"]).as_deref() == Some("service"))
                .then(|| DEFAULT_BACKEND_URL.to_string())
        });
        let substrate: Box<dyn TimerSubstrate> = match backend_url {
            Some(url) => Box::new(
                RemoteTimer::connect(runtime.handle(), &url, fired_tx)
                    .context("start timer service client")?,
            ),
            None => Box::new(LocalTimer::new(runtime.handle().clone(), fired_tx)),
        };

        let store = SettingsStore::from_env();
        let (settings, repaired) = store.load();
        let location = store
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "memory only".to_string());
        let engine = IdleEngine::new(settings, store, substrate);

        let mut app = Self::assemble(
            runtime,
            engine,
            fired_rx,
            Character::from_env(),
            env_first(&["OPENAI_API_KEY"]),
        );

        app.log(LogLevel::Info, format!("Settings: {location}"));
        if !repaired.is_empty() {
            app.log(
                LogLevel::Warn,
                format!("Repaired malformed settings: {}", repaired.join(", ")),
            );
        }
        if let Some(key) = &app.openai_key {
            let hint = mask_key(key);
            app.log(LogLevel::Info, format!("OpenAI key from environment ({hint})."));
        }
        app.log(
            LogLevel::Info,
            format!(
                "Chatting with {} as {}. Type /help for commands, /idle to toggle idle replies.",
                app.character.name, app.character.user_name
            ),
        );

        app.bootstrap();
        Ok(app)
    }

    fn assemble(
        runtime: Runtime,
        engine: IdleEngine,
        fired_rx: UnboundedReceiver<FiredTimer>,
        character: Character,
        openai_key: Option<String>,
    ) -> Self {
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        App {
            runtime,
            input: String::new(),
            cursor: 0,
            input_history: Vec::new(),
            history_index: None,
            history_stash: String::new(),
            logs: Vec::new(),
            transcript: Vec::new(),
            monitor: ReplyMonitor::new(),
            engine,
            fired_rx,
            chat_tx,
            chat_rx,
            generating: 0,
            character,
            openai: OpenAiClient::new(),
            openai_key,
            last_status: None,
            scroll_offset: 0,
            should_quit: false,
        }
    }

    /// Arm the first timer, catching up on a deadline missed while closed.
    fn bootstrap(&mut self) {
        let now = Local::now();
        let result = self.engine.startup(&now);
        if let Ok(Some(next)) = &result {
            if next.is_delayed() {
                self.log(
                    LogLevel::Event,
                    "Idle deadline passed while closed; a delayed message goes out shortly.".to_string(),
                );
            }
        }
        self.report_schedule(result);
    }

    /// Whether the user has requested to quit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Flush pending settings before exit.
    pub fn shutdown(&mut self) -> Result<()> {
        self.engine.flush().context("write settings")?;
        info!("shutdown complete");
        Ok(())
    }
}

// ── Background work ──────────────────────────────────────────────────

impl App {
    /// One pass of background bookkeeping, run every loop iteration.
    pub fn tick(&mut self) {
        self.drain_chat_events();
        self.scan_replies();
        self.drain_fired_timers();
        self.watch_substrate();

        if let Err(err) = self.engine.flush_due(&Local::now()) {
            log_src!(self, LogLevel::Error, format!("Saving settings failed: {err}"));
        }
    }

    /// Feed new transcript entries through the reply monitor.
    fn scan_replies(&mut self) {
        let replies = self.monitor.scan(&self.transcript);
        if replies == 0 {
            return;
        }
        debug!(replies, "reply detected");
        let result = self.engine.on_reply_detected(&Local::now());
        if let Err(err) = result {
            log_src!(self, LogLevel::Error, format!("Not scheduling: {err}"));
        }
    }

    fn drain_fired_timers(&mut self) {
        while let Ok(fired) = self.fired_rx.try_recv() {
            let now = Local::now();
            let ctx = HostContext {
                generating: self.generating > 0,
                char_name: &self.character.name,
                user_name: &self.character.user_name,
            };
            let outcome = match self.engine.handle_fired(&fired, &ctx, &now) {
                Ok(outcome) => outcome,
                Err(err) => {
                    log_src!(self, LogLevel::Error, format!("Timer handling failed: {err}"));
                    continue;
                }
            };

            match outcome {
                FireOutcome::Stale => {}
                FireOutcome::Ignored => {
                    log_src!(self, LogLevel::Warn, "Timer fired but there is no prompt to send.".to_string())
                }
                FireOutcome::Deferred(_) => self.log(
                    LogLevel::Event,
                    "Still generating; trying again in a few seconds.".to_string(),
                ),
                FireOutcome::Sent(outgoing) => {
                    let delayed = if outgoing.delayed { " (delayed)" } else { "" };
                    self.log(
                        LogLevel::Event,
                        format!(
                            "Sent {} message as {}{delayed}.",
                            outgoing.kind.label(),
                            outgoing.channel.as_str()
                        ),
                    );
                    self.deliver(outgoing);
                }
            }
        }
    }

    /// Surface substrate connection changes in the activity log.
    fn watch_substrate(&mut self) {
        let status = self.engine.substrate_status();
        if self.last_status.as_ref() == Some(&status) {
            return;
        }
        match &status {
            SubstrateStatus::Connected => {
                self.log(LogLevel::Info, "Timer service connected.".to_string())
            }
            SubstrateStatus::Disconnected(reason) => log_src!(
                self,
                LogLevel::Warn,
                format!(
                    "Timer service unreachable ({reason}); retrying every {RECONNECT_BACKOFF_SECS}s. \
                     Idle messages are paused until it is back."
                )
            ),
            SubstrateStatus::Ready | SubstrateStatus::Connecting => {}
        }
        self.last_status = Some(status);
    }
}

// ── Event handling ───────────────────────────────────────────────────

impl App {
    /// Route a terminal event to the appropriate handler.
    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        if let Event::Key(key) = event {
            self.handle_key(key)?;
        }
        Ok(())
    }

    /// Dispatch a key press to input editing, commands, or control actions.
    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match key {
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => self.should_quit = true,

            KeyEvent {
                code: KeyCode::Char('l'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => self.logs.clear(),

            KeyEvent {
                code: KeyCode::Char('u'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => self.clear_line(),

            KeyEvent {
                code: KeyCode::Char('w'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => self.delete_word(),

            KeyEvent { code, .. } => match code {
                KeyCode::Char(ch) => self.insert_char(ch),
                KeyCode::Backspace => self.backspace(),
                KeyCode::Delete => self.delete(),
                KeyCode::Left => self.move_cursor_left(),
                KeyCode::Right => self.move_cursor_right(),
                KeyCode::Home => self.move_cursor_home(),
                KeyCode::End => self.move_cursor_end(),
                KeyCode::Up => self.history_prev(),
                KeyCode::Down => self.history_next(),
                KeyCode::PageUp => self.scroll_up(10),
                KeyCode::PageDown => self.scroll_down(10),
                KeyCode::Enter => {
                    self.scroll_offset = 0; // snap to bottom on submit
                    self.submit_input()?;
                }
                KeyCode::Esc => self.should_quit = true,
                _ => {}
            },
        }
        Ok(())
    }

    /// Submit the current input line for processing.
    pub(crate) fn submit_input(&mut self) -> Result<()> {
        let line = self.input.trim().to_string();
        self.input.clear();
        self.cursor = 0;
        self.history_index = None;

        if line.is_empty() {
            return Ok(());
        }
        self.remember_input(&line);

        if line.starts_with('/') {
            self.handle_command(&line)?;
        } else {
            self.handle_chat_message(&line);
        }

        Ok(())
    }
}

// ── Scrolling ────────────────────────────────────────────────────────

impl App {
    /// Scroll the transcript up by `n` lines.
    pub(crate) fn scroll_up(&mut self, n: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(n);
    }

    /// Scroll the transcript down by `n` lines (towards the latest).
    pub(crate) fn scroll_down(&mut self, n: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }
}

// ── Logging ──────────────────────────────────────────────────────────

/// Log a `Warn`/`Error` message, attaching `[file:line]` in debug-logs builds.
///
/// In release (no `debug-logs` feature) this behaves like `self.log()`.
///
/// ```ignore
/// log_src!(self, LogLevel::Warn, format!("something broke: {err:#}"));
/// ```
macro_rules! log_src {
    ($app:expr, $level:expr, $msg:expr) => {{
        #[cfg(feature = "debug-logs")]
        {
            let loc = format!("{}:{}", file!(), line!());
            $app.log_with_src($level, $msg, &loc);
        }
        #[cfg(not(feature = "debug-logs"))]
        {
            $app.log($level, $msg);
        }
    }};
}
pub(crate) use log_src;

impl App {
    /// Append a message to the activity log.
    pub(crate) fn log(&mut self, level: LogLevel, message: String) {
        match level {
            LogLevel::Warn => tracing::warn!(target: "idle_nudge::activity", "{message}"),
            LogLevel::Error => tracing::error!(target: "idle_nudge::activity", "{message}"),
            LogLevel::Info | LogLevel::Event => {
                tracing::info!(target: "idle_nudge::activity", "{message}")
            }
        }
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        self.logs.push(LogLine {
            timestamp,
            level,
            message,
        });
        if self.logs.len() > MAX_LOGS {
            let overflow = self.logs.len() - MAX_LOGS;
            self.logs.drain(0..overflow);
        }
    }

    /// Append a message with a source location suffix (debug-logs builds only).
    #[cfg(feature = "debug-logs")]
    pub(crate) fn log_with_src(&mut self, level: LogLevel, message: String, src: &str) {
        let tagged = match level {
            LogLevel::Warn | LogLevel::Error => format!("{message}  [{src}]"),
            _ => message,
        };
        self.log(level, tagged);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::idle::bridge::tests::RecordingSubstrate;
    use crate::idle::{Author, Settings};

    /// App wired to a recording substrate, in-memory settings, and no key.
    pub(crate) fn test_app(settings: Settings) -> (App, RecordingSubstrate) {
        let runtime = Runtime::new().unwrap();
        let substrate = RecordingSubstrate::default();
        let engine = IdleEngine::with_rng(
            settings,
            SettingsStore::in_memory(),
            Box::new(substrate.clone()),
            StdRng::seed_from_u64(11),
        );
        let (_fired_tx, fired_rx) = mpsc::unbounded_channel();
        let character = Character {
            name: "Ava".into(),
            user_name: "Sam".into(),
            persona: "Test persona.".into(),
        };
        let app = App::assemble(runtime, engine, fired_rx, character, None);
        (app, substrate)
    }

    fn type_line(app: &mut App, line: &str) {
        app.input = line.to_string();
        app.cursor = line.len();
        app.submit_input().unwrap();
    }

    fn enabled() -> Settings {
        Settings {
            enabled: true,
            ..Settings::default()
        }
    }

    #[test]
    fn assistant_reply_rearms_from_now() {
        let (mut app, substrate) = test_app(enabled());
        app.chat_tx.send(ChatEvent::Reply("hello there".into())).unwrap();
        app.tick();

        assert_eq!(app.transcript.len(), 1);
        assert!(app.engine.settings().last_ai_reply_time.is_some());
        let armed = app.engine.next_event().unwrap();
        assert!(!armed.is_delayed());
        assert_eq!(substrate.outstanding().unwrap().event_type, "IDLE_TRIGGER");
    }

    #[test]
    fn user_message_is_not_a_reply() {
        let (mut app, substrate) = test_app(enabled());
        type_line(&mut app, "hi!");
        app.tick();
        assert_eq!(app.transcript[0].author, Author::User);
        assert!(app.engine.settings().last_ai_reply_time.is_none());
        assert_eq!(substrate.commands(), 0);
        // No key configured, so no generation started.
        assert_eq!(app.generating, 0);
    }

    #[test]
    fn failed_generation_clears_busy_flag() {
        let (mut app, _) = test_app(enabled());
        app.generating = 1;
        app.chat_tx.send(ChatEvent::Failed("boom".into())).unwrap();
        app.tick();
        assert_eq!(app.generating, 0);
        assert!(app.logs.iter().any(|l| l.message.contains("boom")));
        assert!(app.transcript.is_empty());
    }

    #[test]
    fn narrator_delivery_lands_in_transcript() {
        let (mut app, _) = test_app(enabled());
        app.deliver(crate::idle::Outgoing {
            channel: crate::idle::SendAs::Sys,
            text: "[2024-06-12 09:00:00] *waits*".into(),
            include_prompt: false,
            kind: crate::idle::candidate::EventKind::IdleReply,
            delayed: false,
        });
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript[0].author, Author::Narrator);
    }

    #[test]
    fn raw_delivery_submits_as_user() {
        let (mut app, _) = test_app(enabled());
        app.deliver(crate::idle::Outgoing {
            channel: crate::idle::SendAs::Raw,
            text: "[2024-06-12 09:00:00] *waits*".into(),
            include_prompt: false,
            kind: crate::idle::candidate::EventKind::IdleReply,
            delayed: false,
        });
        assert!(app.input.is_empty());
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript[0].author, Author::User);
        assert_eq!(app.transcript[0].text, "[2024-06-12 09:00:00] *waits*");
    }

    #[test]
    fn raw_delivery_keeps_the_draft() {
        let (mut app, _) = test_app(enabled());
        for ch in "half a thou".chars() {
            app.insert_char(ch);
        }
        app.move_cursor_left();
        app.deliver(crate::idle::Outgoing {
            channel: crate::idle::SendAs::Raw,
            text: "[2024-06-12 09:00:00] *taps the glass*".into(),
            include_prompt: false,
            kind: crate::idle::candidate::EventKind::IdleReply,
            delayed: false,
        });
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript[0].text, "[2024-06-12 09:00:00] *taps the glass*");
        assert_eq!(app.input, "half a thou");
        assert_eq!(app.cursor, "half a tho".len());
    }

    #[test]
    fn char_delivery_echoes_prompt_when_asked() {
        let (mut app, _) = test_app(enabled());
        app.deliver(crate::idle::Outgoing {
            channel: crate::idle::SendAs::Char,
            text: "Good morning!".into(),
            include_prompt: true,
            kind: crate::idle::candidate::EventKind::Daily,
            delayed: false,
        });
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript[0].author, Author::Prompt);
    }

    #[test]
    fn fired_timer_is_delivered() {
        let (mut app, substrate) = test_app(Settings {
            send_as: crate::idle::SendAs::Sys,
            ..enabled()
        });
        app.engine.arm_test(&Local::now()).unwrap();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        app.fired_rx = fired_rx;
        fired_tx.send(substrate.fire()).unwrap();
        app.tick();

        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript[0].author, Author::Narrator);
        assert!(app.logs.iter().any(|l| l.message.starts_with("Sent idle message as sys")));
    }

    #[test]
    fn fired_timer_while_generating_is_deferred() {
        let (mut app, substrate) = test_app(enabled());
        app.engine.arm_test(&Local::now()).unwrap();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        app.fired_rx = fired_rx;
        fired_tx.send(substrate.fire()).unwrap();
        app.generating = 1;
        app.tick();

        assert!(app.transcript.is_empty());
        assert!(app.engine.next_event().is_some());
        assert!(app.logs.iter().any(|l| l.message.starts_with("Still generating")));
    }
}
