//! Append-only session logs
//!
//! A [`LogStore`] is the only owner of event ids and ordering. Appends are
//! validated before anything is recorded, ids grow by one per session, and
//! nothing is ever updated or removed. Reading back with [`LogStore::list`]
//! always yields events in strictly ascending id order.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use talebound_core::{Event, EventDraft, EventId, NewEvent, SessionId, ValidationError};
use tracing::{debug, info};

/// Descriptive data about one session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: SessionId,
    pub campaign: String,
    pub created_at: DateTime<Utc>,
    /// Number of events appended so far
    pub event_count: u64,
    /// Id of the newest event, if any
    pub head: Option<EventId>,
}

/// Storage for per-session, append-only event logs
///
/// Implementations must be safe to share between threads. Ordering of
/// concurrent appends to the same session is the caller's concern; the store
/// only guarantees that every successful append gets the next id.
pub trait LogStore: Send + Sync {
    /// Start an empty log
    fn create_session(&self, id: &SessionId, campaign: &str) -> Result<SessionMeta>;

    /// Load a complete log in one step, e.g. from a session document
    ///
    /// `events` must belong to `id` and carry strictly increasing ids.
    fn import_session(
        &self,
        id: &SessionId,
        campaign: &str,
        created_at: DateTime<Utc>,
        events: Vec<Event>,
    ) -> Result<SessionMeta>;

    /// Stamp an already validated event with the next id and the append time
    fn append_draft(&self, session: &SessionId, draft: EventDraft) -> Result<Event>;

    /// Validate and append an event
    fn append(&self, session: &SessionId, event: NewEvent) -> Result<Event> {
        let draft = event.validate()?;
        self.append_draft(session, draft)
    }

    /// Events with `id >= from`, ascending. `EventId::new(0)` lists everything.
    fn list(&self, session: &SessionId, from: EventId) -> Result<Vec<Event>>;

    fn session_meta(&self, session: &SessionId) -> Result<SessionMeta>;

    /// Every session, in creation order
    fn list_sessions(&self) -> Result<Vec<SessionMeta>>;

    /// Id of the newest event in a session
    fn head(&self, session: &SessionId) -> Result<Option<EventId>> {
        Ok(self.session_meta(session)?.head)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug)]
struct SessionLog {
    campaign: String,
    created_at: DateTime<Utc>,
    events: Vec<Event>,
}

impl SessionLog {
    fn meta(&self, id: &SessionId) -> SessionMeta {
        SessionMeta {
            id: id.clone(),
            campaign: self.campaign.clone(),
            created_at: self.created_at,
            event_count: self.events.len() as u64,
            head: self.events.last().map(|e| e.id),
        }
    }

    fn next_id(&self) -> EventId {
        self.events
            .last()
            .map(|e| e.id.next())
            .unwrap_or(EventId::new(1))
    }

    /// Append time, never earlier than the previous event's
    fn next_ts(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.events.last() {
            Some(last) if last.ts > now => last.ts,
            _ => now,
        }
    }
}

/// A [`LogStore`] held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<IndexMap<SessionId, SessionLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexMap<SessionId, SessionLog>>> {
        self.sessions
            .read()
            .map_err(|_| StoreError::Unavailable("session registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexMap<SessionId, SessionLog>>> {
        self.sessions
            .write()
            .map_err(|_| StoreError::Unavailable("session registry lock poisoned".to_string()))
    }
}

impl LogStore for MemoryStore {
    fn create_session(&self, id: &SessionId, campaign: &str) -> Result<SessionMeta> {
        let mut sessions = self.write()?;
        if sessions.contains_key(id) {
            return Err(StoreError::SessionExists(id.clone()));
        }
        let log = SessionLog {
            campaign: campaign.to_string(),
            created_at: Utc::now(),
            events: Vec::new(),
        };
        let meta = log.meta(id);
        sessions.insert(id.clone(), log);
        info!(session = %id, campaign, "session created");
        Ok(meta)
    }

    fn import_session(
        &self,
        id: &SessionId,
        campaign: &str,
        created_at: DateTime<Utc>,
        events: Vec<Event>,
    ) -> Result<SessionMeta> {
        let mut previous: Option<EventId> = None;
        for (index, event) in events.iter().enumerate() {
            if &event.session_id != id {
                return Err(ValidationError::new(
                    format!("events[{}].session_id", index),
                    format!("belongs to session {}", event.session_id),
                )
                .into());
            }
            if event.id.raw() == 0 || previous.is_some_and(|p| event.id <= p) {
                return Err(ValidationError::new(
                    format!("events[{}].id", index),
                    format!("{} does not follow the previous event", event.id),
                )
                .into());
            }
            previous = Some(event.id);
        }

        let mut sessions = self.write()?;
        if sessions.contains_key(id) {
            return Err(StoreError::SessionExists(id.clone()));
        }
        let log = SessionLog {
            campaign: campaign.to_string(),
            created_at,
            events,
        };
        let meta = log.meta(id);
        sessions.insert(id.clone(), log);
        info!(session = %id, events = meta.event_count, "session imported");
        Ok(meta)
    }

    fn append_draft(&self, session: &SessionId, draft: EventDraft) -> Result<Event> {
        let mut sessions = self.write()?;
        let log = sessions
            .get_mut(session)
            .ok_or_else(|| StoreError::UnknownSession(session.clone()))?;
        let event = draft.stamp(log.next_id(), session.clone(), log.next_ts());
        log.events.push(event.clone());
        debug!(session = %session, id = %event.id, kind = %event.kind, "event appended");
        Ok(event)
    }

    fn list(&self, session: &SessionId, from: EventId) -> Result<Vec<Event>> {
        let sessions = self.read()?;
        let log = sessions
            .get(session)
            .ok_or_else(|| StoreError::UnknownSession(session.clone()))?;
        let start = log.events.partition_point(|e| e.id < from);
        Ok(log.events[start..].to_vec())
    }

    fn session_meta(&self, session: &SessionId) -> Result<SessionMeta> {
        let sessions = self.read()?;
        sessions
            .get(session)
            .map(|log| log.meta(session))
            .ok_or_else(|| StoreError::UnknownSession(session.clone()))
    }

    fn list_sessions(&self) -> Result<Vec<SessionMeta>> {
        let sessions = self.read()?;
        Ok(sessions.iter().map(|(id, log)| log.meta(id)).collect())
    }
}

// ============================================================================
// Fault injection
// ============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub use flaky::FlakyStore;

#[cfg(any(test, feature = "test-utils"))]
mod flaky {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Wraps a store and fails a chosen number of appends with
    /// [`StoreError::Unavailable`] before anything is recorded
    #[derive(Debug)]
    pub struct FlakyStore<S> {
        inner: S,
        failing_appends: AtomicU32,
    }

    impl<S: LogStore> FlakyStore<S> {
        pub fn new(inner: S) -> Self {
            Self {
                inner,
                failing_appends: AtomicU32::new(0),
            }
        }

        /// Fail the next `n` appends
        pub fn fail_next_appends(&self, n: u32) {
            self.failing_appends.store(n, Ordering::SeqCst);
        }

        /// Appends still set to fail
        pub fn pending_failures(&self) -> u32 {
            self.failing_appends.load(Ordering::SeqCst)
        }

        pub fn inner(&self) -> &S {
            &self.inner
        }
    }

    impl<S: LogStore> LogStore for FlakyStore<S> {
        fn create_session(&self, id: &SessionId, campaign: &str) -> Result<SessionMeta> {
            self.inner.create_session(id, campaign)
        }

        fn import_session(
            &self,
            id: &SessionId,
            campaign: &str,
            created_at: DateTime<Utc>,
            events: Vec<Event>,
        ) -> Result<SessionMeta> {
            self.inner.import_session(id, campaign, created_at, events)
        }

        fn append_draft(&self, session: &SessionId, draft: EventDraft) -> Result<Event> {
            let injected = self
                .failing_appends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
            self.inner.append_draft(session, draft)
        }

        fn list(&self, session: &SessionId, from: EventId) -> Result<Vec<Event>> {
            self.inner.list(session, from)
        }

        fn session_meta(&self, session: &SessionId) -> Result<SessionMeta> {
            self.inner.session_meta(session)
        }

        fn list_sessions(&self) -> Result<Vec<SessionMeta>> {
            self.inner.list_sessions()
        }
    }
}
