//! Identity types for sessions, events and characters

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Longest accepted character identifier
pub const MAX_CHARACTER_ID_LEN: usize = 64;

/// Sequence identifier of an event within one session
///
/// Ids start at 1, grow by one per append and are never reused. On the wire
/// they are rendered as `e_` followed by the zero-padded sequence number so
/// that lexical and numeric order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl EventId {
    /// Create a new event ID
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Get the raw sequence number
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The id that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e_{:010}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("e_").unwrap_or(s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::new("id", format!("`{}` is not an event id", s)));
        }
        digits
            .parse::<u64>()
            .map(EventId)
            .map_err(|e| ValidationError::new("id", e.to_string()))
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Caller-supplied session identifier
///
/// Opaque to the core; `YYYY-MM-DD-NNNN` is only a convention.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a character (player or NPC)
///
/// Syntax is checked when an event is validated; existence is a reducer concern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    /// Create a character ID without checking its syntax
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse and check a character ID, naming `field` on failure
    pub fn parse(field: &str, raw: &str) -> Result<Self, ValidationError> {
        if is_valid_character_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::new(
                field,
                format!(
                    "`{}` is not a character id (lowercase letters, digits, '-' or '_', at most {} chars)",
                    raw, MAX_CHARACTER_ID_LEN
                ),
            ))
        }
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// `^[a-z0-9][a-z0-9_-]{0,63}$`
pub fn is_valid_character_id(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_CHARACTER_ID_LEN {
        return false;
    }
    let head_ok = bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit();
    head_ok
        && bytes
            .iter()
            .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}
