//! Talebound Hub - session coordination for talebound
//!
//! This crate sits between collaborators (HTTP handlers, CLI tools, a game
//! master) and the session logs. It exposes the two core operations:
//!
//! - [`SessionCoordinator::append`]: validate and append one event
//! - [`SessionCoordinator::get_state`]: reduced state plus unresolved event ids
//!
//! ## Architecture
//!
//! ```text
//! SessionCoordinator
//!  │
//!  ├── DashMap<SessionId, SessionSlot>
//!  │    └── write lock + cached reduction (per session)
//!  │
//!  ├── Reducer (talebound-core)
//!  └── LogStore (talebound-journal) ← owns ids and order
//! ```
//!
//! ## Design Principles
//!
//! 1. **The log is the only source of truth** - the cache can be dropped at any time
//! 2. **One writer per session** - appends to a session never interleave
//! 3. **Sessions are independent** - no lock is ever shared between sessions
//!
//! # Example
//!
//! ```rust
//! use talebound_core::{CharacterId, NewEvent, SessionId};
//! use talebound_hub::{HubConfig, SessionCoordinator};
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let hub = SessionCoordinator::in_memory(HubConfig::default());
//! let session = SessionId::new("2024-01-15-0001");
//! hub.create_session(&session, "bastards-blood").await?;
//!
//! hub.append(&session, NewEvent::new("create_char")
//!     .data(json!({"character": {"id": "a", "name": "Ayla", "hp": {"max": 50, "current": 50}}})))
//!     .await?;
//! hub.append(&session, NewEvent::new("damage").target("a").data(json!({"amount": 30}))).await?;
//! hub.append(&session, NewEvent::new("heal").target("a").data(json!({"amount": 100}))).await?;
//!
//! let (state, unresolved) = hub.get_state(&session).await?;
//! assert_eq!(state.characters[&CharacterId::new("a")].hp.current, 50);
//! assert!(unresolved.is_empty());
//! # Ok::<(), talebound_hub::Error>(())
//! # }).unwrap();
//! ```

mod cache;
mod config;
mod coordinator;
mod error;
pub mod hash;

pub use cache::{CachedState, Staleness};
pub use config::{HubConfig, DEFAULT_LOCK_TIMEOUT_MS, MAX_LOCK_TIMEOUT_MS};
pub use coordinator::SessionCoordinator;
pub use error::{Error, Result};
