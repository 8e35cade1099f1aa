//! Session Coordinator - single writer per session, cached reads
//!
//! ```text
//! append ──► validate ──► session write lock (bounded wait)
//!                              │
//!                              ├── LogStore::append_draft  (id + ts)
//!                              └── cache write lock ──► fold new event
//!
//! get_state ──► cache read lock ──► head matches log? ──► clone
//!                     └─ otherwise: cache write lock ──► catch up or rebuild
//! ```
//!
//! Sessions never share a lock. The registry itself is a `DashMap`, so
//! looking up one session does not contend with another.

use crate::cache::CachedState;
use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::hash::fingerprint;
use dashmap::DashMap;
use std::sync::Arc;
use talebound_core::{Event, EventId, NewEvent, Reducer, Reduction, SessionId, State};
use talebound_journal::{LogStore, MemoryStore, SessionDocument, SessionMeta};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Per-session locks and cache
#[derive(Debug, Default)]
struct SessionSlot {
    /// Held for the whole of an append
    writer: Mutex<()>,
    /// Only written by the writer, or by a reader catching up
    cache: RwLock<Option<CachedState>>,
}

/// Serializes appends per session and serves reduced state
pub struct SessionCoordinator {
    store: Arc<dyn LogStore>,
    reducer: Arc<Reducer>,
    config: HubConfig,
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
}

impl SessionCoordinator {
    /// Create a coordinator over a store with the standard reducer
    pub fn new(store: Arc<dyn LogStore>, config: HubConfig) -> Self {
        let reducer = Reducer::standard(config.reducer_config());
        Self {
            store,
            reducer: Arc::new(reducer),
            config,
            sessions: DashMap::new(),
        }
    }

    /// Create a coordinator over a fresh [`MemoryStore`]
    pub fn in_memory(config: HubConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Replace the reducer (e.g. with custom policies)
    ///
    /// Cached states are dropped.
    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = Arc::new(reducer);
        self.sessions.clear();
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Start a new, empty session
    #[instrument(skip(self), fields(session = %id))]
    pub async fn create_session(&self, id: &SessionId, campaign: &str) -> Result<SessionMeta> {
        let meta = self.store.create_session(id, campaign)?;
        self.sessions.insert(id.clone(), Arc::new(SessionSlot::default()));
        Ok(meta)
    }

    /// Load a session document as a new session
    #[instrument(skip(self, document), fields(session = %document.id))]
    pub async fn import(&self, document: &SessionDocument) -> Result<SessionMeta> {
        let meta = document.import_into(self.store.as_ref())?;
        self.sessions
            .insert(document.id.clone(), Arc::new(SessionSlot::default()));
        Ok(meta)
    }

    /// Every known session
    pub fn sessions(&self) -> Result<Vec<SessionMeta>> {
        Ok(self.store.list_sessions()?)
    }

    /// Validate and append an event, returning its id
    ///
    /// Waits at most `lock_timeout` for the session's write lock and fails
    /// with [`Error::Busy`] otherwise. Dropping the returned future before
    /// the lock is taken has no effect on the log.
    #[instrument(skip(self, event), fields(session = %session, kind = %event.kind))]
    pub async fn append(&self, session: &SessionId, event: NewEvent) -> Result<EventId> {
        let draft = event.validate()?;
        let slot = self.slot(session)?;

        let waited = self.config.lock_timeout();
        let _writer = tokio::time::timeout(waited, slot.writer.lock())
            .await
            .map_err(|_| {
                warn!(?waited, "write lock not acquired");
                Error::Busy {
                    session: session.clone(),
                    waited,
                }
            })?;

        let event = self.store.append_draft(session, draft)?;
        debug!(id = %event.id, "appended");

        if self.config.cache_enabled() {
            let mut cache = slot.cache.write().await;
            self.advance_cache(session, &mut cache, &event);
        }
        Ok(event.id)
    }

    /// Reduced state and the ids of events that could not be applied
    pub async fn get_state(&self, session: &SessionId) -> Result<(State, Vec<EventId>)> {
        let reduction = self.reduce(session).await?;
        let unresolved = reduction.unresolved_ids();
        Ok((reduction.state, unresolved))
    }

    /// Full reduction of a session, served from the cache when it is current
    #[instrument(skip(self), fields(session = %session))]
    pub async fn reduce(&self, session: &SessionId) -> Result<Reduction> {
        let slot = self.slot(session)?;
        if !self.config.cache_enabled() {
            return self.replay(session);
        }

        let head = self.store.head(session)?;
        {
            let cache = slot.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.check_version().is_ok() && cached.head() == head {
                    return Ok(cached.reduction().clone());
                }
            }
        }

        let mut cache = slot.cache.write().await;
        self.catch_up(session, &mut cache)?;
        match cache.as_ref() {
            Some(cached) => Ok(cached.reduction().clone()),
            None => self.replay(session),
        }
    }

    /// Events with `id >= from`, ascending
    pub fn list(&self, session: &SessionId, from: EventId) -> Result<Vec<Event>> {
        Ok(self.store.list(session, from)?)
    }

    /// Drop a session's cached state; the next read rebuilds it
    pub async fn invalidate(&self, session: &SessionId) {
        if let Some(slot) = self.sessions.get(session).map(|s| Arc::clone(s.value())) {
            *slot.cache.write().await = None;
        }
    }

    /// Newest event id reflected in a session's cache
    pub async fn cached_head(&self, session: &SessionId) -> Option<EventId> {
        let slot = self.sessions.get(session).map(|s| Arc::clone(s.value()))?;
        let cache = slot.cache.read().await;
        cache.as_ref().and_then(|c| c.head())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Slot of an existing session, registering it on first use
    fn slot(&self, session: &SessionId) -> Result<Arc<SessionSlot>> {
        if let Some(slot) = self.sessions.get(session) {
            return Ok(Arc::clone(slot.value()));
        }
        // sessions created directly on the store are adopted here
        self.store.session_meta(session)?;
        let slot = self
            .sessions
            .entry(session.clone())
            .or_insert_with(|| Arc::new(SessionSlot::default()));
        Ok(Arc::clone(slot.value()))
    }

    fn replay(&self, session: &SessionId) -> Result<Reduction> {
        let events = self.store.list(session, EventId::new(0))?;
        Ok(self.reducer.replay(session.clone(), &events))
    }

    /// Fold a just-appended event into the cache
    ///
    /// An empty cache stays empty until the next read. Failures drop the
    /// cache rather than the append, which is already durable.
    fn advance_cache(&self, session: &SessionId, cache: &mut Option<CachedState>, event: &Event) {
        let Some(cached) = cache.as_mut() else {
            return;
        };
        let from = cached.head().map(|h| h.next()).unwrap_or(EventId::new(0));
        let pending = if cached.head().map(|h| h.next()) == Some(event.id) {
            Ok(vec![event.clone()])
        } else {
            self.store.list(session, from)
        };

        let outcome = pending.map_err(|e| e.to_string()).and_then(|events| {
            cached
                .advance(&self.reducer, &events)
                .map_err(|stale| stale.to_string())
        });
        match outcome {
            Ok(ups) => {
                for up in ups {
                    info!(
                        character = %up.character,
                        skill = %up.skill,
                        from = up.from,
                        to = up.to,
                        tier = %up.tier,
                        "level up"
                    );
                }
            }
            Err(reason) => {
                warn!(%reason, "cache dropped");
                *cache = None;
                return;
            }
        }

        if self.config.verify_cache() {
            self.verify(session, cache);
        }
    }

    /// Bring the cache up to the log's head, rebuilding when it cannot be advanced
    ///
    /// The listing starts at the cached head itself, so a cache that is ahead
    /// of the log (or off it) shows up as a missing first event.
    fn catch_up(&self, session: &SessionId, cache: &mut Option<CachedState>) -> Result<()> {
        if let Some(cached) = cache.as_mut() {
            let head = cached.head();
            let listed = self.store.list(session, head.unwrap_or(EventId::new(0)))?;
            let pending = match (head, listed.split_first()) {
                (None, _) => Some(&listed[..]),
                (Some(head), Some((first, rest))) if first.id == head => Some(rest),
                _ => None,
            };
            match pending.map(|events| (events.len(), cached.advance(&self.reducer, events))) {
                Some((folded, Ok(_))) => {
                    debug!(folded, "cache caught up");
                    return Ok(());
                }
                Some((_, Err(stale))) => warn!(reason = %stale, "cache inconsistent"),
                None => warn!(head = ?head, "cached head is not in the log"),
            }
        }

        let events = self.store.list(session, EventId::new(0))?;
        *cache = Some(CachedState::replay(&self.reducer, session.clone(), &events));
        info!(events = events.len(), "cache rebuilt");
        Ok(())
    }

    /// Compare the cache against a full replay and keep the replay on mismatch
    fn verify(&self, session: &SessionId, cache: &mut Option<CachedState>) {
        let Some(cached) = cache.as_ref() else {
            return;
        };
        let full = match self.replay(session) {
            Ok(full) => full,
            Err(e) => {
                warn!(error = %e, "cache verification skipped");
                return;
            }
        };
        let matches = match (fingerprint(&cached.reduction().state), fingerprint(&full.state)) {
            (Ok(a), Ok(b)) => a == b && cached.reduction().unresolved == full.unresolved,
            _ => false,
        };
        if !matches {
            warn!("cached state diverged from replay; replaced");
            *cache = Some(CachedState::new(full, Reducer::VERSION));
        }
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("reducer", &self.reducer)
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
