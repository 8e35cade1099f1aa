//! Reduced session state
//!
//! `State` is a pure projection of a session log. Every map in it is an
//! `IndexMap` so that serializing two states built from the same log yields
//! the same bytes.

use crate::character::CharacterSnapshot;
use crate::error::{self, ReductionWarning};
use crate::identity::{CharacterId, EventId, SessionId};
use crate::kind::EventKind;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recorded check or attack outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub event_id: EventId,
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub actor: Option<CharacterId>,
    pub target: Option<CharacterId>,
    /// Skill checked or weapon used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The event `result`, verbatim
    #[serde(default)]
    pub result: Option<Value>,
}

/// Result of folding a session's events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub session_id: SessionId,
    pub characters: IndexMap<CharacterId, CharacterSnapshot>,
    #[serde(default)]
    pub action_log: Vec<ActionRecord>,
    /// Highest event id folded so far (applied or not)
    pub last_event_id: Option<EventId>,
    /// Events folded so far, applied or not
    pub events_seen: u64,
}

impl State {
    /// Empty state for a session
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            characters: IndexMap::new(),
            action_log: Vec::new(),
            last_event_id: None,
            events_seen: 0,
        }
    }

    pub fn character(&self, id: &CharacterId) -> Option<&CharacterSnapshot> {
        self.characters.get(id)
    }

    /// Run `f` against a copy of one character and keep the copy only on success
    pub fn with_character<T>(
        &mut self,
        id: &CharacterId,
        f: impl FnOnce(&mut CharacterSnapshot) -> Result<T, ReductionWarning>,
    ) -> Result<T, ReductionWarning> {
        let current = self
            .characters
            .get(id)
            .ok_or_else(|| ReductionWarning::UnknownCharacter {
                character: id.clone(),
            })?;
        let mut working = current.clone();
        let value = f(&mut working)?;
        self.characters.insert(id.clone(), working);
        Ok(value)
    }

    /// Like [`State::with_character`] for two distinct characters at once
    pub fn with_pair<T>(
        &mut self,
        first: &CharacterId,
        second: &CharacterId,
        f: impl FnOnce(&mut CharacterSnapshot, &mut CharacterSnapshot) -> Result<T, ReductionWarning>,
    ) -> Result<T, ReductionWarning> {
        let lookup = |id: &CharacterId| {
            self.characters
                .get(id)
                .cloned()
                .ok_or_else(|| ReductionWarning::UnknownCharacter {
                    character: id.clone(),
                })
        };
        let mut a = lookup(first)?;
        let mut b = lookup(second)?;
        let value = f(&mut a, &mut b)?;
        self.characters.insert(first.clone(), a);
        self.characters.insert(second.clone(), b);
        Ok(value)
    }
}

/// An event that was folded but could not be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unresolved {
    pub event_id: EventId,
    pub kind: EventKind,
    pub warning: ReductionWarning,
}

/// State plus the diagnostics gathered while building it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reduction {
    pub state: State,
    pub unresolved: Vec<Unresolved>,
}

impl Reduction {
    /// Empty reduction for a session
    pub fn new(session_id: SessionId) -> Self {
        Self {
            state: State::new(session_id),
            unresolved: Vec::new(),
        }
    }

    /// Ids of every event that was not applied
    pub fn unresolved_ids(&self) -> Vec<EventId> {
        self.unresolved.iter().map(|u| u.event_id).collect()
    }

    /// Number of events that were applied
    pub fn resolved_count(&self) -> u64 {
        self.state
            .events_seen
            .saturating_sub(self.unresolved.len() as u64)
    }

    /// Canonical JSON bytes of the state
    pub fn state_bytes(&self) -> error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.state)?)
    }
}
