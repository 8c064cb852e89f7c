pub mod agi;
pub mod artifacts;
pub mod audio;
pub mod chat;
pub mod config;
pub mod providers;
pub mod session;
pub mod speech;

use serde::Serialize;

/// Who spoke a turn. Serializes to the `"user"` / `"assistant"` role strings
/// every chat provider understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One entry of the in-call conversation history. History is append-only for
/// the duration of a call and discarded when the call ends.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub role: TurnRole,
    pub text: String,
}

impl TurnRecord {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}
