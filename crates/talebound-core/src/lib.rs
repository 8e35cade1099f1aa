//! Talebound Core - event model and deterministic reducer for RPG sessions
//!
//! This crate provides:
//! - Identifiers for sessions, events and characters
//! - The closed set of event kinds and their typed payloads
//! - Validation of submitted events (`NewEvent` -> `EventDraft` -> `Event`)
//! - Character snapshots and the reduced session `State`
//! - Skill progression (XP thresholds, tiers, derived level-ups)
//! - The `Reducer`, dispatching each event kind to a `Policy`
//!
//! ## Reduction
//!
//! Reduction is a pure fold: the same events in the same order always produce
//! byte-identical state. Events that cannot be applied (unknown character,
//! insufficient funds, ...) leave the state unchanged and are reported next to
//! it instead of aborting the replay.
//!
//! ```rust
//! use talebound_core::{CharacterId, EventId, NewEvent, Reducer, SessionId};
//! use serde_json::json;
//!
//! let session = SessionId::new("2024-01-15-0001");
//! let events: Vec<_> = [
//!     NewEvent::new("create_char")
//!         .data(json!({"character": {"id": "a", "name": "Ayla", "hp": {"max": 50, "current": 50}}})),
//!     NewEvent::new("damage").target("a").data(json!({"amount": 30})),
//!     NewEvent::new("heal").target("a").data(json!({"amount": 100})),
//! ]
//! .into_iter()
//! .enumerate()
//! .map(|(i, e)| e.validate().unwrap().stamp(EventId::new(i as u64 + 1), session.clone(), chrono::Utc::now()))
//! .collect();
//!
//! let reduction = Reducer::default().replay(session, &events);
//! assert_eq!(reduction.state.characters[&CharacterId::new("a")].hp.current, 50);
//! assert!(reduction.unresolved.is_empty());
//! ```

mod character;
mod error;
mod event;
mod identity;
mod kind;
pub mod payload;
pub mod policy;
pub mod progression;
mod reducer;
mod state;

pub use character::{
    Ability, AbilityKind, CharacterSnapshot, EffectKind, Hp, Item, ItemKind, Location, Resource,
    Skill, StatusEffect, ValueMap,
};
pub use error::{Error, ReductionWarning, Result, ValidationError};
pub use event::{Event, EventDraft, NewEvent, WireEvent};
pub use identity::{is_valid_character_id, CharacterId, EventId, SessionId, MAX_CHARACTER_ID_LEN};
pub use kind::EventKind;
pub use payload::{EventData, MovementType};
pub use progression::{level_ups, LevelUp, Tier, MAX_LEVEL};
pub use reducer::{Policy, Reducer, ReducerConfig};
pub use state::{ActionRecord, Reduction, State, Unresolved};
