//! Business return messages (BAPI `RETURN` structures)
//!
//! Remote functions report business outcomes through return messages rather
//! than backend error codes. A message of type `E` or `A` means the call was
//! executed but the application refused it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message type of a business return message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnMessageType {
    #[serde(rename = "S")]
    Success,
    #[serde(rename = "I")]
    Info,
    #[serde(rename = "W")]
    Warning,
    #[serde(rename = "E")]
    Error,
    #[serde(rename = "A")]
    Abort,
}

impl ReturnMessageType {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'S' => Some(Self::Success),
            'I' => Some(Self::Info),
            'W' => Some(Self::Warning),
            'E' => Some(Self::Error),
            'A' => Some(Self::Abort),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Success => 'S',
            Self::Info => 'I',
            Self::Warning => 'W',
            Self::Error => 'E',
            Self::Abort => 'A',
        }
    }

    /// Error and abort messages indicate the application rejected the call
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Abort)
    }
}

/// A single business return message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnMessage {
    #[serde(rename = "type")]
    pub message_type: ReturnMessageType,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub number: String,
    pub message: String,
    #[serde(default)]
    pub message_v1: String,
    #[serde(default)]
    pub message_v2: String,
    #[serde(default)]
    pub message_v3: String,
    #[serde(default)]
    pub message_v4: String,
}

impl ReturnMessage {
    pub fn new(message_type: ReturnMessageType, message: impl Into<String>) -> Self {
        Self {
            message_type,
            id: String::new(),
            number: String::new(),
            message: message.into(),
            message_v1: String::new(),
            message_v2: String::new(),
            message_v3: String::new(),
            message_v4: String::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.message_type.is_failure()
    }
}

impl fmt::Display for ReturnMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message_type.as_char())?;
        if !self.id.is_empty() {
            write!(f, " {}/{}", self.id, self.number)?;
        }
        write!(f, ": {}", self.message)
    }
}
