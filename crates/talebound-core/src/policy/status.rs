//! Status effects and the passage of turns

use crate::character::CharacterSnapshot;
use crate::error::ReductionWarning;
use crate::event::Event;
use crate::payload::EventData;
use crate::reducer::ReducerConfig;
use crate::state::State;

/// Add an effect, or stack onto an active one with the same id
///
/// Stacks are capped by the effect's own `max_stacks`, falling back to the
/// reducer default. Re-applying refreshes the duration.
pub fn status_apply(
    state: &mut State,
    event: &Event,
    config: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::StatusApply(application) = &event.payload else {
        return Ok(());
    };
    let incoming = &application.effect;
    state.with_character(&application.character, |c| {
        match c.status_effects.iter_mut().find(|e| e.id == incoming.id) {
            Some(active) => {
                let cap = incoming
                    .max_stacks
                    .or(active.max_stacks)
                    .unwrap_or(config.max_status_stacks);
                active.stacks = active.stacks.saturating_add(incoming.stacks).min(cap);
                if incoming.duration.is_some() {
                    active.duration = incoming.duration;
                }
                if incoming.max_stacks.is_some() {
                    active.max_stacks = incoming.max_stacks;
                }
            }
            None => {
                let mut effect = incoming.clone();
                let cap = effect.max_stacks.unwrap_or(config.max_status_stacks);
                effect.stacks = effect.stacks.min(cap);
                c.status_effects.push(effect);
            }
        }
        Ok(())
    })
}

/// Remove an effect entirely, or only some of its stacks
pub fn status_remove(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::StatusRemove(removal) = &event.payload else {
        return Ok(());
    };
    state.with_character(&removal.character, |c| {
        let index = c
            .status_effects
            .iter()
            .position(|e| e.id == removal.effect_id)
            .ok_or_else(|| ReductionWarning::StatusNotActive {
                character: c.id.clone(),
                effect: removal.effect_id.clone(),
            })?;
        match removal.stacks {
            Some(stacks) if stacks < c.status_effects[index].stacks => {
                c.status_effects[index].stacks -= stacks;
            }
            _ => {
                c.status_effects.remove(index);
            }
        }
        Ok(())
    })
}

/// Count down effect durations; effects reaching zero expire
pub fn advance_turn(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::AdvanceTurn(advance) = &event.payload else {
        return Ok(());
    };
    match &advance.character {
        Some(id) => state.with_character(id, |c| {
            tick_effects(c, advance.turns);
            Ok(())
        }),
        None => {
            for c in state.characters.values_mut() {
                tick_effects(c, advance.turns);
            }
            Ok(())
        }
    }
}

fn tick_effects(character: &mut CharacterSnapshot, turns: u32) {
    for effect in character.status_effects.iter_mut() {
        if let Some(remaining) = effect.duration.as_mut() {
            *remaining = remaining.saturating_sub(turns);
        }
    }
    character
        .status_effects
        .retain(|effect| effect.duration != Some(0));
}

#[cfg(test)]
mod tests {
    use crate::error::ReductionWarning;
    use crate::event::NewEvent;
    use crate::policy::testing::{character, create, reduce};
    use serde_json::json;

    fn apply(effect: serde_json::Value) -> NewEvent {
        NewEvent::new("status_apply")
            .target("a")
            .data(json!({ "effect": effect }))
    }

    #[test]
    fn test_reapplying_stacks_instead_of_duplicating() {
        let r = reduce(vec![
            create("a", json!({})),
            apply(json!({"id": "bleed", "duration": 3})),
            apply(json!({"id": "bleed", "duration": 5, "stacks": 2})),
        ]);
        let effects = &character(&r, "a").status_effects;
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].stacks, 3);
        assert_eq!(effects[0].duration, Some(5));
    }

    #[test]
    fn test_stacks_are_capped() {
        let mut events = vec![create("a", json!({}))];
        for _ in 0..15 {
            events.push(apply(json!({"id": "rage"})));
        }
        events.push(apply(json!({"id": "focus", "max_stacks": 2, "stacks": 5})));
        let r = reduce(events);
        let a = character(&r, "a");
        assert_eq!(a.status("rage").unwrap().stacks, 10);
        assert_eq!(a.status("focus").unwrap().stacks, 2);
    }

    #[test]
    fn test_remove_some_or_all_stacks() {
        let r = reduce(vec![
            create("a", json!({})),
            apply(json!({"id": "shield", "stacks": 3})),
            NewEvent::new("status_remove")
                .target("a")
                .data(json!({"effect_id": "shield", "stacks": 1})),
        ]);
        assert_eq!(character(&r, "a").status("shield").unwrap().stacks, 2);

        let r = reduce(vec![
            create("a", json!({})),
            apply(json!({"id": "shield", "stacks": 3})),
            NewEvent::new("status_remove")
                .target("a")
                .data(json!({"effect_id": "shield"})),
            NewEvent::new("status_remove")
                .target("a")
                .data(json!({"effect_id": "shield"})),
        ]);
        assert!(character(&r, "a").status("shield").is_none());
        assert!(matches!(
            r.unresolved[0].warning,
            ReductionWarning::StatusNotActive { .. }
        ));
    }

    #[test]
    fn test_advance_turn_expires_effects() {
        let r = reduce(vec![
            create("a", json!({})),
            create("b", json!({})),
            apply(json!({"id": "stun", "duration": 1})),
            apply(json!({"id": "blessed"})),
            NewEvent::new("status_apply")
                .target("b")
                .data(json!({"effect": {"id": "haste", "duration": 2}})),
            NewEvent::new("advance_turn"),
        ]);
        let a = character(&r, "a");
        assert!(a.status("stun").is_none());
        assert!(a.status("blessed").is_some());
        assert_eq!(character(&r, "b").status("haste").unwrap().duration, Some(1));
    }
}
