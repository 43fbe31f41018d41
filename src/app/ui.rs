//! Terminal UI rendering: status bar, transcript, activity panel and input.

use chrono::Utc;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::idle::{Author, SubstrateStatus};
use crate::util::format_countdown;

use super::App;
use super::chat::ChatEntry;

/// Rows given to the activity panel, borders included.
const ACTIVITY_HEIGHT: u16 = 9;

impl App {
    /// Render the full TUI frame.
    pub fn draw(&mut self, frame: &mut Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(ACTIVITY_HEIGHT),
                Constraint::Length(3),
            ])
            .split(frame.area());

        frame.render_widget(Paragraph::new(self.status_line()), chunks[0]);
        self.draw_transcript(frame, chunks[1]);
        self.draw_activity(frame, chunks[2]);

        // ── Input prompt ─────────────────────────────────────────────
        let title = format!("Message {} (/help)", self.character.name);
        let input_panel = Paragraph::new(self.input.as_str())
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(input_panel, chunks[3]);

        let input_width = chunks[3].width.saturating_sub(2) as usize;
        let cursor = self.cursor_column().min(input_width);
        frame.set_cursor_position(Position::new(
            chunks[3].x + 1 + cursor as u16,
            chunks[3].y + 1,
        ));
    }

    fn draw_transcript(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let inner_width = area.width.saturating_sub(2);
        let inner_height = area.height.saturating_sub(2) as usize;

        let lines: Vec<Line> = self
            .transcript
            .iter()
            .map(|entry| self.render_entry(entry))
            .collect();
        let paragraph = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });

        let total_visual = paragraph.line_count(inner_width);
        let max_scroll = total_visual.saturating_sub(inner_height);

        // scroll_offset counts lines up from the bottom.
        if (self.scroll_offset as usize) > max_scroll {
            self.scroll_offset = max_scroll as u16;
        }
        let top_row = max_scroll.saturating_sub(self.scroll_offset as usize) as u16;

        let title = if self.scroll_offset > 0 {
            format!(" {} [↑{}] ", self.character.name, self.scroll_offset)
        } else {
            format!(" {} ", self.character.name)
        };
        let panel = paragraph
            .block(Block::default().borders(Borders::ALL).title(title))
            .scroll((top_row, 0));
        frame.render_widget(panel, area);
    }

    fn draw_activity(&self, frame: &mut Frame<'_>, area: Rect) {
        let visible = area.height.saturating_sub(2) as usize;
        let start = self.logs.len().saturating_sub(visible);
        let lines: Vec<Line> = self.logs[start..].iter().map(|l| l.render()).collect();
        let panel = Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::ALL).title(" Activity "));
        frame.render_widget(panel, area);
    }

    fn render_entry(&self, entry: &ChatEntry) -> Line<'static> {
        let (name, color) = match entry.author {
            Author::User => (self.character.user_name.clone(), Color::Green),
            Author::Assistant => (self.character.name.clone(), Color::Magenta),
            Author::Narrator => ("*".to_string(), Color::Blue),
            Author::Prompt => ("prompt".to_string(), Color::DarkGray),
        };
        let body_style = match entry.author {
            Author::Narrator | Author::Prompt => Style::default()
                .fg(color)
                .add_modifier(Modifier::ITALIC),
            _ => Style::default(),
        };
        Line::from(vec![
            Span::styled(
                format!("{} ", entry.timestamp),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(
                format!("{name}: "),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(entry.text.clone(), body_style),
        ])
    }

    // ── Status-bar helpers ───────────────────────────────────────────

    fn status_line(&self) -> Line<'static> {
        let settings = self.engine.settings();
        let (idle_label, idle_color) = if settings.enabled {
            ("on", Color::Green)
        } else {
            ("off", Color::DarkGray)
        };
        let status = self.engine.substrate_status();

        let mut spans = vec![
            Span::styled("Idle: ", Style::default().fg(Color::DarkGray)),
            Span::styled(idle_label, Style::default().fg(idle_color)),
            Span::styled("  Timer: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format!("{} ({})", self.engine.substrate_label(), status.label()),
                Style::default().fg(substrate_color(&status)),
            ),
            Span::styled("  Next: ", Style::default().fg(Color::DarkGray)),
            Span::styled(self.next_event_label(), Style::default().fg(Color::Cyan)),
        ];
        if self.engine.problem().is_some() {
            spans.push(Span::styled(
                "  config problem (/idle status)",
                Style::default().fg(Color::Red),
            ));
        }
        if self.generating > 0 {
            spans.push(Span::styled(
                "  generating…",
                Style::default().fg(Color::Yellow),
            ));
        }
        Line::from(spans)
    }

    fn next_event_label(&self) -> String {
        match self.engine.next_event() {
            Some(next) => {
                let left = format_countdown((next.time - Utc::now()).num_seconds());
                format!("{} in {left}", next.kind().label())
            }
            None => "none".to_string(),
        }
    }
}

fn substrate_color(status: &SubstrateStatus) -> Color {
    match status {
        SubstrateStatus::Ready | SubstrateStatus::Connected => Color::Green,
        SubstrateStatus::Connecting => Color::Yellow,
        SubstrateStatus::Disconnected(_) => Color::Red,
    }
}
