//! Activity-log entries shown in the lower panel.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    /// Something the scheduler did on its own (sent, deferred, re-armed).
    Event,
    Warn,
    Error,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Event => "idle",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Info => Color::Gray,
            Self::Event => Color::Cyan,
            Self::Warn => Color::Yellow,
            Self::Error => Color::Red,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn render(&self) -> Line<'static> {
        let color = self.level.color();
        Line::from(vec![
            Span::styled(
                format!("{} ", self.timestamp),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(
                format!("{:<5} ", self.level.tag()),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(self.message.clone(), Style::default().fg(color)),
        ])
    }
}

/// Show only the first and last four characters of a secret.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
