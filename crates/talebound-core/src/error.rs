//! Error types for talebound-core

use crate::identity::{CharacterId, EventId, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed event, rejected before it can reach the log
///
/// `field` names the violated field using dotted paths relative to the wire
/// shape, e.g. `data.character.hp.current` or `target`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    /// The offending field
    pub field: String,
    /// What is wrong with it
    pub reason: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// A required field is absent
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "required field is missing")
    }

    /// Prefix the field path, e.g. `hp.max` under `data.character`
    pub fn nested(mut self, parent: &str) -> Self {
        self.field = format!("{}.{}", parent, self.field);
        self
    }
}

/// Why an event could not be applied during reduction
///
/// Never raised: the reducer records it next to the event id and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReductionWarning {
    #[error("unknown character {character}")]
    UnknownCharacter { character: CharacterId },

    #[error("event is not after the last applied event {last}")]
    OutOfOrder { last: EventId },

    #[error("event belongs to session {got}, not {expected}")]
    SessionMismatch { expected: SessionId, got: SessionId },

    #[error("{character} does not hold {item}")]
    ItemNotHeld { character: CharacterId, item: String },

    #[error("{character} holds {held} of {item}, needs {needed}")]
    InsufficientQuantity {
        character: CharacterId,
        item: String,
        needed: u32,
        held: u32,
    },

    #[error("{character} has {held} {currency}, needs {needed}")]
    InsufficientCurrency {
        character: CharacterId,
        currency: String,
        needed: i64,
        held: i64,
    },

    #[error("{character} has {held} {currency}; adding {delta} overflows")]
    CurrencyOverflow {
        character: CharacterId,
        currency: String,
        held: i64,
        delta: i64,
    },

    #[error("{character} has {held} {resource}, needs {needed}")]
    InsufficientResource {
        character: CharacterId,
        resource: String,
        needed: i64,
        held: i64,
    },

    #[error("{character} has no resource pool {resource}")]
    UnknownResource {
        character: CharacterId,
        resource: String,
    },

    #[error("slot {slot} of {character} is empty")]
    SlotEmpty { character: CharacterId, slot: String },

    #[error("{character} does not know ability {ability}")]
    UnknownAbility {
        character: CharacterId,
        ability: String,
    },

    #[error("{character} does not know recipe {recipe}")]
    UnknownRecipe {
        character: CharacterId,
        recipe: String,
    },

    #[error("status effect {effect} is not active on {character}")]
    StatusNotActive {
        character: CharacterId,
        effect: String,
    },

    #[error("attribute {attribute} of {character} is not numeric")]
    NotNumeric {
        character: CharacterId,
        attribute: String,
    },
}

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
