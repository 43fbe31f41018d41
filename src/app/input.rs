//! Input-line editing and history browsing.
//!
//! `cursor` is a byte offset into `input` and always sits on a char
//! boundary, so names and prompts with non-ASCII text edit cleanly.

use super::App;

impl App {
    fn prev_boundary(&self) -> Option<usize> {
        self.input[..self.cursor].char_indices().next_back().map(|(i, _)| i)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.input[self.cursor..]
            .chars()
            .next()
            .map(|ch| self.cursor + ch.len_utf8())
    }

    /// Column of the cursor in characters, for placing the terminal cursor.
    pub(crate) fn cursor_column(&self) -> usize {
        self.input[..self.cursor].chars().count()
    }

    pub(crate) fn insert_char(&mut self, ch: char) {
        if ch.is_control() {
            return;
        }
        self.input.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub(crate) fn backspace(&mut self) {
        if let Some(prev) = self.prev_boundary() {
            self.input.replace_range(prev..self.cursor, "");
            self.cursor = prev;
        }
    }

    pub(crate) fn delete(&mut self) {
        if let Some(next) = self.next_boundary() {
            self.input.replace_range(self.cursor..next, "");
        }
    }

    /// Delete back to the start of the previous word (Ctrl-W).
    pub(crate) fn delete_word(&mut self) {
        let before = &self.input[..self.cursor];
        let trimmed = before.trim_end();
        let start = trimmed
            .rfind(char::is_whitespace)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.input.replace_range(start..self.cursor, "");
        self.cursor = start;
    }

    /// Discard the whole line (Ctrl-U).
    pub(crate) fn clear_line(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.history_index = None;
    }

    pub(crate) fn move_cursor_left(&mut self) {
        if let Some(prev) = self.prev_boundary() {
            self.cursor = prev;
        }
    }

    pub(crate) fn move_cursor_right(&mut self) {
        if let Some(next) = self.next_boundary() {
            self.cursor = next;
        }
    }

    pub(crate) fn move_cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub(crate) fn move_cursor_end(&mut self) {
        self.cursor = self.input.len();
    }

    /// Record a submitted line, skipping immediate repeats.
    pub(crate) fn remember_input(&mut self, line: &str) {
        if self.input_history.last().map(String::as_str) != Some(line) {
            self.input_history.push(line.to_string());
        }
        self.history_index = None;
    }

    /// Step back through submitted lines (Up). The line being typed is
    /// stashed and comes back after stepping past the newest entry.
    pub(crate) fn history_prev(&mut self) {
        let index = match self.history_index {
            None if self.input_history.is_empty() => return,
            None => {
                self.history_stash = std::mem::take(&mut self.input);
                self.input_history.len() - 1
            }
            Some(0) => return,
            Some(i) => i - 1,
        };
        self.show_history(Some(index));
    }

    pub(crate) fn history_next(&mut self) {
        let Some(index) = self.history_index else {
            return;
        };
        if index + 1 < self.input_history.len() {
            self.show_history(Some(index + 1));
        } else {
            self.show_history(None);
        }
    }

    fn show_history(&mut self, index: Option<usize>) {
        self.history_index = index;
        self.input = match index {
            Some(i) => self.input_history[i].clone(),
            None => std::mem::take(&mut self.history_stash),
        };
        self.cursor = self.input.len();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use crate::app::tests::test_app;
    use crate::idle::Settings;

    #[test]
    fn edits_multibyte_text() {
        let (mut app, _) = test_app(Settings::default());
        for ch in "héllo".chars() {
            app.insert_char(ch);
        }
        assert_eq!(app.cursor_column(), 5);
        app.move_cursor_left();
        app.move_cursor_left();
        app.move_cursor_left();
        app.backspace();
        assert_eq!(app.input, "hllo");
        app.insert_char('é');
        app.delete();
        assert_eq!(app.input, "hélo");
        assert_eq!(app.cursor_column(), 2);
    }

    #[test]
    fn delete_word_and_clear() {
        let (mut app, _) = test_app(Settings::default());
        for ch in "/once add  ".chars() {
            app.insert_char(ch);
        }
        app.delete_word();
        assert_eq!(app.input, "/once ");
        app.clear_line();
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn history_round_trip_restores_draft() {
        let (mut app, _) = test_app(Settings::default());
        app.remember_input("/idle on");
        app.remember_input("/idle on");
        app.remember_input("/idle status");
        assert_eq!(app.input_history.len(), 2);

        app.insert_char('x');
        app.history_prev();
        assert_eq!(app.input, "/idle status");
        app.history_prev();
        app.history_prev();
        assert_eq!(app.input, "/idle on");
        app.history_next();
        app.history_next();
        assert_eq!(app.input, "x");
        assert_eq!(app.history_index, None);
    }
}
