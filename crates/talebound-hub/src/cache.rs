//! Cached reductions
//!
//! A [`CachedState`] is the newest reduction of a session plus the reducer
//! version that produced it. It owns nothing the log does not: it can be
//! dropped at any time and rebuilt by replaying the session.

use talebound_core::{
    progression, Event, EventId, EventKind, LevelUp, Reducer, Reduction, SessionId,
};

/// Why a cached reduction cannot be advanced and must be rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Built by a different reducer version
    Version { cached: u32, current: u32 },
    /// The events to fold do not continue from the cached head
    Gap {
        head: Option<EventId>,
        next: EventId,
    },
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Staleness::Version { cached, current } => {
                write!(f, "reducer version {} (current {})", cached, current)
            }
            Staleness::Gap { head, next } => match head {
                Some(head) => write!(f, "{} does not follow cached head {}", next, head),
                None => write!(f, "{} does not follow an empty cache", next),
            },
        }
    }
}

/// A reduction and the reducer version that built it
#[derive(Debug, Clone)]
pub struct CachedState {
    reduction: Reduction,
    reducer_version: u32,
}

impl CachedState {
    pub fn new(reduction: Reduction, reducer_version: u32) -> Self {
        Self {
            reduction,
            reducer_version,
        }
    }

    /// Full replay of a session's events
    pub fn replay(reducer: &Reducer, session: SessionId, events: &[Event]) -> Self {
        Self::new(reducer.replay(session, events), Reducer::VERSION)
    }

    pub fn reduction(&self) -> &Reduction {
        &self.reduction
    }

    pub fn into_reduction(self) -> Reduction {
        self.reduction
    }

    /// Id of the newest event folded in
    pub fn head(&self) -> Option<EventId> {
        self.reduction.state.last_event_id
    }

    /// Whether this cache was built by the running reducer
    pub fn check_version(&self) -> Result<(), Staleness> {
        if self.reducer_version == Reducer::VERSION {
            Ok(())
        } else {
            Err(Staleness::Version {
                cached: self.reducer_version,
                current: Reducer::VERSION,
            })
        }
    }

    /// Fold events newer than the head, in order
    ///
    /// Level-ups caused by the folded events are returned. On any
    /// inconsistency the cache is left untouched.
    pub fn advance(&mut self, reducer: &Reducer, events: &[Event]) -> Result<Vec<LevelUp>, Staleness> {
        self.check_version()?;
        if let Some(first) = events.first() {
            if self.head().is_some_and(|head| first.id <= head) {
                return Err(Staleness::Gap {
                    head: self.head(),
                    next: first.id,
                });
            }
        }

        let mut ups = Vec::new();
        for event in events {
            let before = grants_xp(event.kind).then(|| self.reduction.state.clone());
            reducer.fold(&mut self.reduction, event);
            if let Some(before) = before {
                ups.extend(progression::level_ups(&before, &self.reduction.state));
            }
        }
        Ok(ups)
    }
}

fn grants_xp(kind: EventKind) -> bool {
    matches!(kind, EventKind::GainXp | EventKind::LevelUp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use talebound_core::NewEvent;

    fn session() -> SessionId {
        SessionId::new("s")
    }

    fn stamp(seq: u64, event: NewEvent) -> Event {
        event
            .validate()
            .unwrap()
            .stamp(EventId::new(seq), session(), Utc::now())
    }

    fn log() -> Vec<Event> {
        vec![
            stamp(
                1,
                NewEvent::new("create_char").data(json!({
                    "character": {"id": "kara", "name": "Kara", "hp": {"max": 20}}
                })),
            ),
            stamp(
                2,
                NewEvent::new("gain_xp")
                    .actor("kara")
                    .data(json!({"skill": "mining", "amount": 200})),
            ),
            stamp(3, NewEvent::new("damage").target("kara").data(json!({"amount": 3}))),
        ]
    }

    #[test]
    fn test_advance_matches_replay() {
        let reducer = Reducer::default();
        let events = log();

        let mut cache = CachedState::new(Reduction::new(session()), Reducer::VERSION);
        cache.advance(&reducer, &events[..1]).unwrap();
        let ups = cache.advance(&reducer, &events[1..]).unwrap();

        assert_eq!(cache.reduction(), &reducer.replay(session(), &events));
        assert_eq!(cache.head(), Some(EventId::new(3)));
        assert_eq!(ups.len(), 1);
        assert_eq!((ups[0].from, ups[0].to), (1, 3));
    }

    #[test]
    fn test_advance_refuses_old_events() {
        let reducer = Reducer::default();
        let events = log();
        let mut cache = CachedState::replay(&reducer, session(), &events);
        let before = cache.reduction().clone();

        let err = cache.advance(&reducer, &events[2..]).unwrap_err();
        assert!(matches!(err, Staleness::Gap { .. }));
        assert_eq!(cache.reduction(), &before);
    }

    #[test]
    fn test_version_mismatch_is_stale() {
        let reducer = Reducer::default();
        let mut cache = CachedState::new(Reduction::new(session()), Reducer::VERSION + 1);
        assert!(matches!(
            cache.advance(&reducer, &log()),
            Err(Staleness::Version { .. })
        ));
    }
}
