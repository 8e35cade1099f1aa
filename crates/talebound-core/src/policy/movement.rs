//! Moving through the world
//!
//! A move costs stamina (`rate(movement_type) * distance`, rounded) when the
//! character has a `stamina` pool; a teleport is free.

use crate::character::Location;
use crate::error::ReductionWarning;
use crate::event::Event;
use crate::payload::EventData;
use crate::reducer::ReducerConfig;
use crate::state::State;

/// Name of the pool movement draws on
pub const STAMINA: &str = "stamina";

pub fn character_move(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::CharacterMove(movement) = &event.payload else {
        return Ok(());
    };
    state.with_character(&movement.character, |c| {
        let distance = c
            .location
            .as_ref()
            .map(|from| from.distance_to(&movement.to))
            .unwrap_or(0.0);
        let cost = movement
            .stamina_cost
            .unwrap_or_else(|| movement.mode.stamina_cost(distance));

        if let Some(pool) = c.resources.get_mut(STAMINA) {
            if pool.current < cost {
                return Err(ReductionWarning::InsufficientResource {
                    character: c.id.clone(),
                    resource: STAMINA.to_string(),
                    needed: cost,
                    held: pool.current,
                });
            }
            pool.current -= cost;
        }

        c.location = Some(carry_over(c.location.as_ref(), &movement.to));
        Ok(())
    })
}

pub fn teleport(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::Teleport(teleport) = &event.payload else {
        return Ok(());
    };
    state.with_character(&teleport.character, |c| {
        c.location = Some(teleport.destination.clone());
        Ok(())
    })
}

/// A walk stays in the current region and area unless the destination names new ones
fn carry_over(from: Option<&Location>, to: &Location) -> Location {
    let mut next = to.clone();
    if let Some(from) = from {
        if next.region.is_none() {
            next.region = from.region.clone();
        }
        if next.area.is_none() {
            next.area = from.area.clone();
        }
    }
    next
}
