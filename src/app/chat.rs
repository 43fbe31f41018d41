//! Chat transcript, background generation, and idle-message delivery.

use chrono::Local;
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::MAX_THREAD_MESSAGES;
use crate::idle::{Author, Authored, Outgoing, SendAs};
use crate::openai::input_message;

use super::App;
use super::log_src;
use super::logging::LogLevel;

/// One line of the visible conversation.
#[derive(Clone, Debug)]
pub struct ChatEntry {
    pub author: Author,
    pub text: String,
    pub timestamp: String,
}

impl Authored for ChatEntry {
    fn author(&self) -> Author {
        self.author
    }
}

/// Result of a background generation.
#[derive(Debug)]
pub enum ChatEvent {
    Reply(String),
    Failed(String),
}

impl App {
    pub(crate) fn push_entry(&mut self, author: Author, text: String) {
        self.transcript.push(ChatEntry {
            author,
            text,
            timestamp: Local::now().format("%H:%M").to_string(),
        });
    }

    /// Plain text typed by the user.
    pub(crate) fn handle_chat_message(&mut self, message: &str) {
        self.push_entry(Author::User, message.to_string());
        self.start_generation(None);
    }

    /// Ask the model for the character's next message.
    ///
    /// `instruction` is a quiet prompt: sent as a system message after the
    /// history, visible in the transcript only if the caller echoed it.
    pub(crate) fn start_generation(&mut self, instruction: Option<&str>) {
        let Some(key) = self.openai_key.clone() else {
            log_src!(self, LogLevel::Error, "OpenAI key not set; no reply will be generated.".to_string());
            self.log(LogLevel::Info, "Use /key <key> or set OPENAI_API_KEY.".to_string());
            return;
        };

        let mut input = self.thread_input();
        if let Some(instruction) = instruction {
            input.push(input_message("system", instruction));
        }
        let instructions = self.character.instructions();
        let openai = self.openai.clone();
        let tx = self.chat_tx.clone();

        self.generating += 1;
        self.runtime.spawn(async move {
            let event = match openai.reply(&key, &instructions, &input).await {
                Ok(text) => ChatEvent::Reply(text),
                Err(err) => ChatEvent::Failed(format!("{err:#}")),
            };
            let _ = tx.send(event);
        });
    }

    /// The most recent transcript entries as Responses API input.
    fn thread_input(&self) -> Vec<Value> {
        let start = self.transcript.len().saturating_sub(MAX_THREAD_MESSAGES);
        self.transcript[start..]
            .iter()
            .map(|entry| match entry.author {
                Author::User => input_message("user", &entry.text),
                Author::Assistant => input_message("assistant", &entry.text),
                Author::Narrator => input_message("user", &format!("[Narrator] {}", entry.text)),
                Author::Prompt => input_message("system", &entry.text),
            })
            .collect()
    }

    /// Apply finished generations to the transcript.
    pub(crate) fn drain_chat_events(&mut self) {
        while let Ok(event) = self.chat_rx.try_recv() {
            self.generating = self.generating.saturating_sub(1);
            match event {
                ChatEvent::Reply(text) => {
                    debug!(chars = text.len(), "reply received");
                    self.push_entry(Author::Assistant, text);
                }
                ChatEvent::Failed(err) => {
                    warn!(error = %err, "generation failed");
                    log_src!(self, LogLevel::Error, format!("Generation failed: {err}"));
                }
            }
        }
    }

    /// Send a composed idle/schedule message through its channel.
    pub(crate) fn deliver(&mut self, outgoing: Outgoing) {
        match outgoing.channel {
            SendAs::User => {
                self.push_entry(Author::User, outgoing.text);
                self.start_generation(None);
            }
            SendAs::Char => {
                if outgoing.include_prompt {
                    self.push_entry(Author::Prompt, outgoing.text.clone());
                }
                self.start_generation(Some(&outgoing.text));
            }
            SendAs::Sys => self.push_entry(Author::Narrator, outgoing.text),
            SendAs::Raw => {
                // Submitted through the input line; a half-typed draft survives.
                let draft = std::mem::replace(&mut self.input, outgoing.text);
                let draft_cursor = self.cursor;
                self.cursor = self.input.len();
                if let Err(err) = self.submit_input() {
                    log_src!(self, LogLevel::Error, format!("Raw send failed: {err:#}"));
                }
                self.input = draft;
                self.cursor = draft_cursor.min(self.input.len());
            }
        }
    }
}
