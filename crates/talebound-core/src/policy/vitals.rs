//! Character lifecycle, hit points and the numeric parts of a sheet

use crate::character::{CharacterSnapshot, Resource};
use crate::error::ReductionWarning;
use crate::event::Event;
use crate::payload::{AttributeOp, EventData, StatOp};
use crate::reducer::ReducerConfig;
use crate::state::State;
use serde_json::{Number, Value};

/// Insert the sheet; an existing character with the same id is replaced wholesale
pub fn create_char(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::CreateChar(sheet) = &event.payload else {
        return Ok(());
    };
    let sheet: CharacterSnapshot = sheet.as_ref().clone();
    if state.characters.contains_key(&sheet.id) {
        tracing::debug!(character = %sheet.id, event = %event.id, "character re-created");
    }
    state.characters.insert(sheet.id.clone(), sheet);
    Ok(())
}

pub fn update_char(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::UpdateChar(update) = &event.payload else {
        return Ok(());
    };
    let patch = &update.patch;
    state.with_character(&update.character, |c| {
        if let Some(name) = &patch.name {
            c.name = name.clone();
        }
        if let Some(class_name) = &patch.class_name {
            c.class_name = Some(class_name.clone());
        }
        if let Some(race) = &patch.race {
            c.race = Some(race.clone());
        }
        if let Some(level) = patch.level {
            c.level = Some(level);
        }
        if let Some(notes) = &patch.notes {
            c.notes = Some(notes.clone());
        }
        if let Some(tags) = &patch.tags {
            c.tags = tags.clone();
        }
        for (stat, value) in &patch.stats {
            c.stats.insert(stat.clone(), *value);
        }
        for (key, value) in &patch.attributes {
            c.attributes.insert(key.clone(), value.clone());
        }
        if let Some(hp) = &patch.hp {
            c.hp = hp.clone();
        }
        if let Some(location) = &patch.location {
            c.location = Some(location.clone());
        }
        Ok(())
    })
}

/// Restore hp and resource pools, clear temporary hp and status effects
///
/// Inventory, equipment, skills and currency are kept.
pub fn respawn(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::Respawn(respawn) = &event.payload else {
        return Ok(());
    };
    state.with_character(&respawn.character, |c| {
        c.hp.current = c.hp.max;
        c.hp.temp = 0;
        for pool in c.resources.values_mut() {
            pool.current = pool.max;
        }
        c.status_effects.clear();
        if let Some(location) = &respawn.location {
            c.location = Some(location.clone());
        }
        Ok(())
    })
}

/// Drain temporary hp first, then current hp, flooring at zero
pub fn damage(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::Damage(change) = &event.payload else {
        return Ok(());
    };
    state.with_character(&change.character, |c| {
        let absorbed = c.hp.temp.min(change.amount).max(0);
        c.hp.temp -= absorbed;
        c.hp.current = (c.hp.current - (change.amount - absorbed)).max(0);
        Ok(())
    })
}

/// Raise current hp, capped at max
pub fn heal(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::Heal(change) = &event.payload else {
        return Ok(());
    };
    state.with_character(&change.character, |c| {
        c.hp.current = c.hp.current.saturating_add(change.amount).min(c.hp.max);
        Ok(())
    })
}

pub fn modify_stat(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::ModifyStat(change) = &event.payload else {
        return Ok(());
    };
    state.with_character(&change.character, |c| {
        let stat = c.stats.entry(change.stat.clone()).or_insert(0);
        *stat = match change.op {
            StatOp::Set => change.value,
            StatOp::Add => stat.saturating_add(change.value),
        };
        Ok(())
    })
}

pub fn modify_attribute(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::ModifyAttribute(change) = &event.payload else {
        return Ok(());
    };
    state.with_character(&change.character, |c| {
        let not_numeric = || ReductionWarning::NotNumeric {
            character: c.id.clone(),
            attribute: change.attribute.clone(),
        };
        let updated = match change.op {
            AttributeOp::Set => change.value.clone(),
            AttributeOp::Add | AttributeOp::Multiply => {
                let current = match c.attributes.get(&change.attribute) {
                    // Adding to a missing attribute starts from zero
                    None if change.op == AttributeOp::Add => Value::from(0),
                    None => return Err(not_numeric()),
                    Some(value) => value.clone(),
                };
                combine(&current, &change.value, change.op).ok_or_else(not_numeric)?
            }
        };
        c.attributes.insert(change.attribute.clone(), updated);
        Ok(())
    })
}

/// Integer arithmetic when both sides are integers, float otherwise
fn combine(current: &Value, operand: &Value, op: AttributeOp) -> Option<Value> {
    if let (Some(a), Some(b)) = (current.as_i64(), operand.as_i64()) {
        let value = match op {
            AttributeOp::Add => a.checked_add(b)?,
            AttributeOp::Multiply => a.checked_mul(b)?,
            AttributeOp::Set => b,
        };
        return Some(Value::from(value));
    }
    let (a, b) = (current.as_f64()?, operand.as_f64()?);
    let value = match op {
        AttributeOp::Add => a + b,
        AttributeOp::Multiply => a * b,
        AttributeOp::Set => b,
    };
    Number::from_f64(value).map(Value::Number)
}

/// Adjust a resource pool; a new `max` creates the pool if needed
pub fn modify_resource(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::ModifyResource(change) = &event.payload else {
        return Ok(());
    };
    state.with_character(&change.character, |c| {
        if let Some(max) = change.max {
            c.resources
                .entry(change.resource.clone())
                .and_modify(|pool| {
                    pool.max = max;
                    pool.current = pool.current.min(max);
                })
                .or_insert_with(|| Resource::full(max));
        }
        let pool = c.resource_mut(&change.resource)?;
        pool.adjust(change.amount);
        Ok(())
    })
}
