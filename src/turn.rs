//! Conversation data: turns, moods and resolved replies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// Coarse emotion label attached to bot replies, used for display styling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Joy,
    Anger,
    Sadness,
    Fear,
    Love,
    #[default]
    Neutral,
    Error,
}

impl Mood {
    /// Parse a backend mood label. Unknown labels (the emotion model also
    /// emits `surprise`) fall back to `Neutral`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "joy" => Self::Joy,
            "anger" => Self::Anger,
            "sadness" => Self::Sadness,
            "fear" => Self::Fear,
            "love" => Self::Love,
            "error" => Self::Error,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Anger => "anger",
            Self::Sadness => "sadness",
            Self::Fear => "fear",
            Self::Love => "love",
            Self::Neutral => "neutral",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in the conversation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            mood: None,
        }
    }

    pub fn bot(reply: ReplyResult) -> Self {
        Self {
            role: Role::Bot,
            text: reply.text,
            mood: Some(reply.mood),
        }
    }
}

/// Normalized reply, whichever backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyResult {
    pub text: String,
    pub mood: Mood,
}

impl ReplyResult {
    pub fn new(text: impl Into<String>, mood: Mood) -> Self {
        Self {
            text: text.into(),
            mood,
        }
    }

    pub fn neutral(text: impl Into<String>) -> Self {
        Self::new(text, Mood::Neutral)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, Mood::Error)
    }
}

/// What the display layer sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    pub turns: Vec<Turn>,
    pub pending_reply: bool,
    pub listening: bool,
}
