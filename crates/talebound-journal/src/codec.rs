//! Session documents and JSON lines
//!
//! A session document is the `{ "id", "campaign", "events": [...] }` file
//! sessions have always been kept in. Event ids inside a document are
//! reassigned by position on import: the document's order is the log order,
//! and older documents carry free-form ids such as `e_k3v9x0qa`.

use crate::error::{Result, StoreError};
use crate::store::{LogStore, SessionMeta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use talebound_core::{Event, EventId, SessionId, ValidationError, WireEvent};
use tracing::debug;

/// A whole session log as one JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub id: SessionId,
    #[serde(default)]
    pub campaign: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Events in wire shape, kept loose until decoded
    #[serde(default)]
    pub events: Vec<Value>,
}

impl SessionDocument {
    pub fn new(id: SessionId, campaign: impl Into<String>) -> Self {
        Self {
            id,
            campaign: campaign.into(),
            created_at: None,
            events: Vec::new(),
        }
    }

    /// Build a document from a stored log
    pub fn from_log(meta: &SessionMeta, events: &[Event]) -> Result<Self> {
        let events = events
            .iter()
            .map(|e| serde_json::to_value(e.to_wire()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            id: meta.id.clone(),
            campaign: meta.campaign.clone(),
            created_at: Some(meta.created_at),
            events,
        })
    }

    /// Read the whole log of `session` out of a store
    pub fn export(store: &dyn LogStore, session: &SessionId) -> Result<Self> {
        let meta = store.session_meta(session)?;
        let events = store.list(session, EventId::new(0))?;
        Self::from_log(&meta, &events)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Validate every event and stamp it with its position
    ///
    /// Validation failures name the event, e.g. `events[3].data.amount`.
    pub fn decode_events(&self) -> Result<Vec<Event>> {
        self.events
            .iter()
            .enumerate()
            .map(|(index, raw)| decode_positioned(&self.id, index, raw.clone()))
            .collect()
    }

    /// Load this document into a store as a new session
    pub fn import_into(&self, store: &dyn LogStore) -> Result<SessionMeta> {
        let events = self.decode_events()?;
        let created_at = self
            .created_at
            .or_else(|| events.first().map(|e| e.ts))
            .unwrap_or_else(Utc::now);
        store.import_session(&self.id, &self.campaign, created_at, events)
    }
}

fn decode_positioned(session: &SessionId, index: usize, mut raw: Value) -> Result<Event> {
    let field = format!("events[{}]", index);
    let seq = EventId::new(index as u64 + 1).to_string();
    let object = raw.as_object_mut().ok_or_else(|| {
        StoreError::Validation(ValidationError::new(field.as_str(), "expected an object"))
    })?;
    if let Some(original) = object.insert("id".to_string(), Value::String(seq.clone())) {
        if original.as_str() != Some(seq.as_str()) {
            debug!(session = %session, %original, id = %seq, "event renumbered");
        }
    }
    let wire: WireEvent = serde_json::from_value(raw)
        .map_err(|e| StoreError::Codec(format!("{}: {}", field, e)))?;
    Ok(Event::from_wire(session.clone(), wire).map_err(|e| e.nested(&field))?)
}

/// One wire event per line
pub fn to_json_lines(events: &[Event]) -> Result<String> {
    let mut output = String::new();
    for event in events {
        output.push_str(&serde_json::to_string(&event.to_wire())?);
        output.push('\n');
    }
    Ok(output)
}

/// Parse JSON lines written by [`to_json_lines`]; blank lines are skipped
///
/// Unlike documents, ids are taken as written.
pub fn from_json_lines(session: &SessionId, text: &str) -> Result<Vec<Event>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let field = format!("lines[{}]", n + 1);
            let wire: WireEvent = serde_json::from_str(line)
                .map_err(|e| StoreError::Codec(format!("{}: {}", field, e)))?;
            Ok(Event::from_wire(session.clone(), wire).map_err(|e| e.nested(&field))?)
        })
        .collect()
}
