//! Messages a fight sends to the characters involved in it.
//!
//! The engine does not talk to connections. Every message is wrapped in a
//! [`Notice`] addressed to explicit recipients and queued in an [`Outbox`];
//! the host drains the outbox after each command and delivers the text
//! however it likes.
//!
//! # Example
//!
//! ```
//! use fray_core::character::CharacterId;
//! use fray_core::output::{NoticeKind, Outbox};
//!
//! let mut outbox = Outbox::new();
//! outbox.push(vec![CharacterId::new(1)], NoticeKind::Prompt, "It is your turn.");
//!
//! let notices = outbox.drain();
//! assert_eq!(notices.len(), 1);
//! assert!(notices[0].is_for(CharacterId::new(1)));
//! assert!(outbox.is_empty());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::character::CharacterId;

/// What a notice is about, so hosts can style or filter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeKind {
    /// Story text of what happened.
    Narration,
    /// Raw roll numbers for the people involved.
    Roll,
    /// Phase, round and turn changes.
    Status,
    /// A request for someone to act.
    Prompt,
    /// Messages for GMs only.
    Gm,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Narration => write!(f, "Narration"),
            Self::Roll => write!(f, "Roll"),
            Self::Status => write!(f, "Status"),
            Self::Prompt => write!(f, "Prompt"),
            Self::Gm => write!(f, "Gm"),
        }
    }
}

/// One message for one or more characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    recipients: Vec<CharacterId>,
    kind: NoticeKind,
    text: String,
    sequence: u64,
}

impl Notice {
    /// Who should see it.
    #[must_use]
    pub fn recipients(&self) -> &[CharacterId] {
        &self.recipients
    }

    /// What it is about.
    #[must_use]
    pub const fn kind(&self) -> NoticeKind {
        self.kind
    }

    /// The message.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Position in the order notices were emitted.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether `id` is a recipient.
    #[must_use]
    pub fn is_for(&self, id: CharacterId) -> bool {
        self.recipients.contains(&id)
    }
}

/// Queue of notices waiting to be delivered.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    pending: Vec<Notice>,
    sequence: u64,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a notice. Notices with no recipients are dropped.
    pub fn push(&mut self, recipients: Vec<CharacterId>, kind: NoticeKind, text: impl Into<String>) {
        if recipients.is_empty() {
            return;
        }
        let text = text.into();
        tracing::trace!(%kind, recipients = recipients.len(), %text, "notice");
        self.pending.push(Notice {
            recipients,
            kind,
            text,
            sequence: self.sequence,
        });
        self.sequence += 1;
    }

    /// Queues a notice for a single character.
    pub fn tell(&mut self, to: CharacterId, kind: NoticeKind, text: impl Into<String>) {
        self.push(vec![to], kind, text);
    }

    /// Takes every queued notice, oldest first.
    pub fn drain(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.pending)
    }

    /// Queued notices, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[Notice] {
        &self.pending
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_recipient_lists_are_dropped() {
        let mut outbox = Outbox::new();
        outbox.push(Vec::new(), NoticeKind::Narration, "nobody hears this");
        assert!(outbox.is_empty());
    }

    #[test]
    fn sequence_numbers_survive_drains() {
        let mut outbox = Outbox::new();
        outbox.tell(CharacterId::new(1), NoticeKind::Status, "one");
        let first = outbox.drain();
        outbox.tell(CharacterId::new(1), NoticeKind::Status, "two");
        let second = outbox.drain();
        assert_eq!(first[0].sequence(), 0);
        assert_eq!(second[0].sequence(), 1);
        assert_eq!(second[0].text(), "two");
    }

    #[test]
    fn kinds_display() {
        assert_eq!(NoticeKind::Roll.to_string(), "Roll");
    }
}
