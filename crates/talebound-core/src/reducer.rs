//! Deterministic fold from an ordered event sequence to [`State`]
//!
//! The reducer dispatches every event to the [`Policy`] registered for its
//! kind. A policy that cannot apply an event returns a [`ReductionWarning`];
//! the reducer records it and continues with the next event, so a single bad
//! event never blocks the rest of the log. Kinds without a policy (and
//! `custom`) change nothing but still count as applied.

use crate::error::ReductionWarning;
use crate::event::Event;
use crate::identity::SessionId;
use crate::kind::EventKind;
use crate::policy;
use crate::progression::MAX_LEVEL;
use crate::state::{Reduction, State, Unresolved};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tunables of the standard policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    /// Default stack cap for status effects without their own `max_stacks`
    pub max_status_stacks: u32,
    /// Skill level cap
    pub max_skill_level: u32,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            max_status_stacks: 10,
            max_skill_level: MAX_LEVEL,
        }
    }
}

impl ReducerConfig {
    pub fn with_max_status_stacks(mut self, stacks: u32) -> Self {
        self.max_status_stacks = stacks.max(1);
        self
    }

    pub fn with_max_skill_level(mut self, level: u32) -> Self {
        self.max_skill_level = level.clamp(1, MAX_LEVEL);
        self
    }
}

/// How one event kind changes the in-progress state
///
/// Implementations must be deterministic and must leave `state` untouched
/// when they return an error.
pub trait Policy: Send + Sync {
    fn apply(
        &self,
        state: &mut State,
        event: &Event,
        config: &ReducerConfig,
    ) -> Result<(), ReductionWarning>;
}

impl<F> Policy for F
where
    F: Fn(&mut State, &Event, &ReducerConfig) -> Result<(), ReductionWarning> + Send + Sync,
{
    fn apply(
        &self,
        state: &mut State,
        event: &Event,
        config: &ReducerConfig,
    ) -> Result<(), ReductionWarning> {
        self(state, event, config)
    }
}

/// Event kind -> policy dispatcher
pub struct Reducer {
    policies: IndexMap<EventKind, Box<dyn Policy>>,
    config: ReducerConfig,
}

impl Reducer {
    /// Bumped whenever a standard policy changes behaviour; cached states built
    /// by another version are discarded.
    pub const VERSION: u32 = 1;

    /// A reducer with no policies at all
    pub fn new(config: ReducerConfig) -> Self {
        Self {
            policies: IndexMap::new(),
            config,
        }
    }

    /// A reducer with every standard policy registered
    pub fn standard(config: ReducerConfig) -> Self {
        policy::register_standard(Self::new(config))
    }

    /// Register (or replace) the policy for a kind
    pub fn with_policy(mut self, kind: EventKind, policy: impl Policy + 'static) -> Self {
        self.policies.insert(kind, Box::new(policy));
        self
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    /// Whether a kind has a policy
    pub fn handles(&self, kind: EventKind) -> bool {
        self.policies.contains_key(&kind)
    }

    /// Fold one event into a reduction
    ///
    /// Events from another session, or whose id is not after the last folded
    /// id, are skipped and reported. Returns the warning when the event was
    /// not applied.
    pub fn fold(&self, reduction: &mut Reduction, event: &Event) -> Option<ReductionWarning> {
        let outcome = self.check_sequence(&reduction.state, event).and_then(|()| {
            match self.policies.get(&event.kind) {
                Some(policy) => policy.apply(&mut reduction.state, event, &self.config),
                None => Ok(()),
            }
        });

        let sequenced = !matches!(
            outcome,
            Err(ReductionWarning::OutOfOrder { .. } | ReductionWarning::SessionMismatch { .. })
        );
        if sequenced {
            reduction.state.last_event_id = Some(event.id);
            reduction.state.events_seen += 1;
        }

        match outcome {
            Ok(()) => {
                tracing::debug!(event = %event.id, kind = %event.kind, "applied event");
                None
            }
            Err(warning) => {
                tracing::warn!(event = %event.id, kind = %event.kind, %warning, "event not applied");
                reduction.unresolved.push(Unresolved {
                    event_id: event.id,
                    kind: event.kind,
                    warning: warning.clone(),
                });
                Some(warning)
            }
        }
    }

    /// Fold a whole event sequence, starting from empty
    pub fn replay<'a>(
        &self,
        session_id: SessionId,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Reduction {
        let mut reduction = Reduction::new(session_id);
        for event in events {
            self.fold(&mut reduction, event);
        }
        reduction
    }

    fn check_sequence(&self, state: &State, event: &Event) -> Result<(), ReductionWarning> {
        if event.session_id != state.session_id {
            return Err(ReductionWarning::SessionMismatch {
                expected: state.session_id.clone(),
                got: event.session_id.clone(),
            });
        }
        match state.last_event_id {
            Some(last) if event.id <= last => Err(ReductionWarning::OutOfOrder { last }),
            _ => Ok(()),
        }
    }
}

impl Default for Reducer {
    fn default() -> Self {
        Self::standard(ReducerConfig::default())
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducer")
            .field("kinds", &self.policies.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NewEvent;
    use crate::identity::{CharacterId, EventId};
    use chrono::Utc;
    use serde_json::json;

    fn session() -> SessionId {
        SessionId::new("2024-01-15-0001")
    }

    fn event(seq: u64, new: NewEvent) -> Event {
        new.validate()
            .unwrap()
            .stamp(EventId::new(seq), session(), Utc::now())
    }

    fn create(seq: u64, id: &str, max: i64) -> Event {
        event(
            seq,
            NewEvent::new("create_char").data(json!({
                "character": {"id": id, "name": id, "hp": {"max": max, "current": max}}
            })),
        )
    }

    #[test]
    fn test_damage_then_heal_clamps() {
        let events = vec![
            create(1, "a", 50),
            event(2, NewEvent::new("damage").target("a").data(json!({"amount": 30}))),
            event(3, NewEvent::new("heal").target("a").data(json!({"amount": 100}))),
        ];
        let reduction = Reducer::default().replay(session(), &events);

        let a = &reduction.state.characters[&CharacterId::new("a")];
        assert_eq!(a.hp.current, 50);
        assert!(reduction.unresolved.is_empty());
        assert_eq!(reduction.resolved_count(), 3);
    }

    #[test]
    fn test_unknown_character_is_reported_not_fatal() {
        let events = vec![
            event(1, NewEvent::new("damage").target("ghost").data(json!({"amount": 3}))),
            create(2, "a", 10),
        ];
        let reduction = Reducer::default().replay(session(), &events);

        assert_eq!(reduction.unresolved_ids(), vec![EventId::new(1)]);
        assert!(reduction.state.characters.contains_key(&CharacterId::new("a")));
    }

    #[test]
    fn test_out_of_order_events_are_skipped() {
        let reducer = Reducer::default();
        let mut reduction = Reduction::new(session());
        reducer.fold(&mut reduction, &create(5, "a", 10));
        let warning = reducer.fold(&mut reduction, &create(5, "b", 10));

        assert!(matches!(warning, Some(ReductionWarning::OutOfOrder { .. })));
        assert!(!reduction.state.characters.contains_key(&CharacterId::new("b")));
        assert_eq!(reduction.state.last_event_id, Some(EventId::new(5)));
        assert_eq!(reduction.state.events_seen, 1);
    }

    #[test]
    fn test_foreign_session_is_skipped() {
        let reducer = Reducer::default();
        let mut reduction = Reduction::new(SessionId::new("other"));
        let warning = reducer.fold(&mut reduction, &create(1, "a", 10));
        assert!(matches!(warning, Some(ReductionWarning::SessionMismatch { .. })));
        assert!(reduction.state.characters.is_empty());
    }

    fn ignore(_: &mut State, _: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
        Ok(())
    }

    #[test]
    fn test_custom_policy_overrides_standard() {
        let reducer = Reducer::default().with_policy(EventKind::Damage, ignore);
        let events = vec![
            create(1, "a", 10),
            event(2, NewEvent::new("damage").target("a").data(json!({"amount": 3}))),
        ];
        let reduction = reducer.replay(session(), &events);
        assert_eq!(reduction.state.characters[&CharacterId::new("a")].hp.current, 10);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = vec![
            create(1, "a", 10),
            create(2, "b", 12),
            event(3, NewEvent::new("gain_item").actor("a").data(json!({"item": "rope"}))),
            event(4, NewEvent::new("gain_xp").actor("b").data(json!({"skill": "mining", "amount": 500}))),
        ];
        let reducer = Reducer::default();
        let first = reducer.replay(session(), &events).state_bytes().unwrap();
        let second = reducer.replay(session(), &events).state_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_config_from_ron() {
        let config: ReducerConfig = ron::from_str("(max_status_stacks: 3)").unwrap();
        assert_eq!(config.max_status_stacks, 3);
        assert_eq!(config.max_skill_level, MAX_LEVEL);
    }
}
