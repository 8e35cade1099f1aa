//! The immutable event record and its wire shape
//!
//! An event goes through three stages:
//! - [`NewEvent`]: what a caller submits (kind as a string, untyped `data`)
//! - [`EventDraft`]: a validated event that has no id or timestamp yet
//! - [`Event`]: the stored fact, stamped by the log store
//!
//! Only a draft can become an event, so nothing unvalidated is ever stored.
//!
//! # Example
//!
//! ```rust
//! use talebound_core::{EventId, NewEvent, SessionId};
//! use serde_json::json;
//!
//! let draft = NewEvent::new("damage")
//!     .actor("hero")
//!     .target("goblin")
//!     .data(json!({"amount": 4}))
//!     .validate()
//!     .unwrap();
//!
//! let event = draft.stamp(EventId::new(1), SessionId::new("2024-01-15-0001"), chrono::Utc::now());
//! assert_eq!(event.to_wire().t, "damage");
//! ```

use crate::error::ValidationError;
use crate::identity::{CharacterId, EventId, SessionId};
use crate::kind::EventKind;
use crate::payload::EventData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event as submitted by a collaborator, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event kind (`t` on the wire)
    pub kind: String,
    pub actor: Option<String>,
    pub target: Option<String>,
    pub data: Option<Value>,
    /// Pre-resolved outcome (dice rolls and the like)
    pub result: Option<Value>,
}

impl NewEvent {
    /// Start building an event of the given kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Check every field and build the typed payload
    pub fn validate(self) -> Result<EventDraft, ValidationError> {
        let kind: EventKind = self.kind.parse()?;
        let actor = self
            .actor
            .as_deref()
            .map(|raw| CharacterId::parse("actor", raw))
            .transpose()?;
        let target = self
            .target
            .as_deref()
            .map(|raw| CharacterId::parse("target", raw))
            .transpose()?;
        let data = self.data.filter(|v| !v.is_null());
        let result = self.result.filter(|v| !v.is_null());
        if result.as_ref().is_some_and(|r| !r.is_object()) {
            return Err(ValidationError::new("result", "expected an object or null"));
        }

        let payload = EventData::parse(
            kind,
            actor.as_ref(),
            target.as_ref(),
            data.as_ref(),
            result.as_ref(),
        )?;

        Ok(EventDraft {
            kind,
            actor,
            target,
            payload,
            data,
            result,
        })
    }
}

/// A validated event waiting for an id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    kind: EventKind,
    actor: Option<CharacterId>,
    target: Option<CharacterId>,
    payload: EventData,
    data: Option<Value>,
    result: Option<Value>,
}

impl EventDraft {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &EventData {
        &self.payload
    }

    /// Assign identity and time, producing the stored event
    pub fn stamp(self, id: EventId, session_id: SessionId, ts: DateTime<Utc>) -> Event {
        Event {
            id,
            session_id,
            ts,
            kind: self.kind,
            actor: self.actor,
            target: self.target,
            payload: self.payload,
            data: self.data,
            result: self.result,
        }
    }
}

/// An immutable, stored event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub session_id: SessionId,
    /// Append time
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub actor: Option<CharacterId>,
    pub target: Option<CharacterId>,
    /// Typed view of `data`
    pub payload: EventData,
    /// `data` exactly as it was appended
    pub data: Option<Value>,
    pub result: Option<Value>,
}

impl Event {
    /// The persisted shape of this event
    pub fn to_wire(&self) -> WireEvent {
        WireEvent {
            id: self.id,
            ts: self.ts,
            t: self.kind.as_str().to_string(),
            actor: self.actor.as_ref().map(|a| a.as_str().to_string()),
            target: self.target.as_ref().map(|t| t.as_str().to_string()),
            data: self.data.clone(),
            result: self.result.clone(),
        }
    }

    /// Rebuild a stored event, validating it again on the way in
    pub fn from_wire(session_id: SessionId, wire: WireEvent) -> Result<Self, ValidationError> {
        let WireEvent {
            id,
            ts,
            t,
            actor,
            target,
            data,
            result,
        } = wire;
        let draft = NewEvent {
            kind: t,
            actor,
            target,
            data,
            result,
        }
        .validate()?;
        Ok(draft.stamp(id, session_id, ts))
    }
}

/// Wire/storage format of an event
///
/// `{ "id", "ts", "t", "actor", "target", "data", "result" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub id: EventId,
    /// RFC3339 timestamp
    pub ts: DateTime<Utc>,
    pub t: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
}
