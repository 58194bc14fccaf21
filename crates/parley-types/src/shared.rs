//! Small value types shared by inbound and outbound messages.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The speaker of a chat message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    /// A role introduced by a newer server revision.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

/// A role/content pair carried by `user_message` and `assistant_message`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
        }
    }
}

/// Severity attached to a `tool_error`.
///
/// [`FromStr`] is strict: anything outside `info`, `warn` and `error` is
/// rejected. Deserialization is not, so an echoed `tool_error` carrying a
/// level from a newer server still decodes, as [`ErrorLevel::Other`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warn,
    Error,
    /// Only produced by decoding.
    #[serde(other)]
    Other,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLevel::Info => write!(f, "info"),
            ErrorLevel::Warn => write!(f, "warn"),
            ErrorLevel::Error => write!(f, "error"),
            ErrorLevel::Other => write!(f, "other"),
        }
    }
}

/// Returned when a string is not one of the known [`ErrorLevel`] values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid error level '{0}', expected one of: info, warn, error")]
pub struct InvalidErrorLevel(pub String);

impl FromStr for ErrorLevel {
    type Err = InvalidErrorLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(ErrorLevel::Info),
            "warn" => Ok(ErrorLevel::Warn),
            "error" => Ok(ErrorLevel::Error),
            other => Err(InvalidErrorLevel(other.to_string())),
        }
    }
}
