//! `/key`: OpenAI key for the current session.

use super::super::App;
use super::super::logging::{LogLevel, mask_key};

impl App {
    pub(crate) fn handle_key_command(&mut self, args: Vec<&str>) {
        match args.first().copied() {
            None => self.show_key_status(),
            Some("clear") => {
                self.openai_key = None;
                self.log(LogLevel::Info, "OpenAI key cleared.".to_string());
            }
            Some(key) => {
                self.openai_key = Some(key.to_string());
                self.log(
                    LogLevel::Info,
                    format!("OpenAI key set for this session ({}).", mask_key(key)),
                );
            }
        }
    }

    fn show_key_status(&mut self) {
        let message = match &self.openai_key {
            Some(key) => format!("OpenAI key set ({}), model {}.", mask_key(key), self.openai.model),
            None => "OpenAI key not set. Use /key <key> or OPENAI_API_KEY.".to_string(),
        };
        self.log(LogLevel::Info, message);
    }
}
