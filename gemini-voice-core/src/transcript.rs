//! Per-role transcript accumulation.
//!
//! Fragments are appended in arrival order. As soon as the accumulated text
//! of a role contains any sentence terminator the whole buffer is emitted as
//! one utterance and cleared. Several terminators inside one fragment still
//! produce a single utterance.

use serde::{Deserialize, Serialize};

/// Characters that close an utterance (CJK full-width and ASCII).
pub const SENTENCE_TERMINATORS: [char; 6] = ['。', '！', '？', '.', '!', '?'];

/// Speaker attribution of a transcript fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Console label.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "AI",
        }
    }
}

/// A finished, printable utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    user: String,
    assistant: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragment` to `role`'s buffer; return the utterance if it is now
    /// complete.
    pub fn push(&mut self, role: Role, fragment: &str) -> Option<Utterance> {
        let buffer = self.buffer_mut(role);
        buffer.push_str(fragment);

        if buffer.contains(SENTENCE_TERMINATORS) {
            Some(Utterance {
                role,
                text: std::mem::take(buffer),
            })
        } else {
            None
        }
    }

    /// Text accumulated for `role` that has not been emitted yet.
    pub fn pending(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
        }
    }

    fn buffer_mut(&mut self, role: Role) -> &mut String {
        match role {
            Role::User => &mut self.user,
            Role::Assistant => &mut self.assistant,
        }
    }
}
