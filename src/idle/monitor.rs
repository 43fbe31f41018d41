//! Reply monitor: turns transcript appends into "assistant replied" signals.
//!
//! The host transcript is the feed: the monitor keeps a cursor into it and,
//! on every scan, reports how many messages were appended by someone other
//! than the user since the last scan.

/// Who authored a transcript entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Author {
    User,
    Assistant,
    /// Narrator / system line.
    Narrator,
    /// Echo of an instruction sent on the user's behalf.
    Prompt,
}

impl Author {
    /// Whether an append by this author counts as a reply.
    pub fn is_reply(self) -> bool {
        matches!(self, Self::Assistant | Self::Narrator)
    }
}

/// Anything in the transcript that has an author.
pub trait Authored {
    fn author(&self) -> Author;
}

/// Cursor over the host transcript.
#[derive(Debug, Default)]
pub struct ReplyMonitor {
    seen: usize,
}

impl ReplyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching from the current end of `feed`.
    #[cfg(test)]
    pub fn attach<T: Authored>(feed: &[T]) -> Self {
        Self { seen: feed.len() }
    }

    /// Count reply appends since the last scan.
    ///
    /// A feed that shrank (cleared chat) restarts the cursor without
    /// reporting anything.
    pub fn scan<T: Authored>(&mut self, feed: &[T]) -> usize {
        if feed.len() < self.seen {
            self.seen = feed.len();
            return 0;
        }
        let replies = feed[self.seen..]
            .iter()
            .filter(|entry| entry.author().is_reply())
            .count();
        self.seen = feed.len();
        replies
    }
}
