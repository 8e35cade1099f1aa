//! Checks and attacks: the outcome in `result` is trusted verbatim
//!
//! Nothing on the characters changes. The outcome is appended to the
//! session's action log so it stays visible in the reduced state.

use crate::error::ReductionWarning;
use crate::event::Event;
use crate::payload::EventData;
use crate::reducer::ReducerConfig;
use crate::state::{ActionRecord, State};

pub fn record_action(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let detail = match &event.payload {
        EventData::Check(check) | EventData::SkillCheck(check) => Some(check.skill.clone()),
        EventData::Attack(attack) => attack.weapon.clone(),
        _ => return Ok(()),
    };
    state.action_log.push(ActionRecord {
        event_id: event.id,
        ts: event.ts,
        kind: event.kind,
        actor: event.actor.clone(),
        target: event.target.clone(),
        detail,
        result: event.result.clone(),
    });
    Ok(())
}
