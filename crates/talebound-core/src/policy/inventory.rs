//! Items: gaining, losing, equipment slots, crafting and consumables

use crate::character::CharacterSnapshot;
use crate::error::ReductionWarning;
use crate::event::Event;
use crate::payload::{EventData, ItemEffect};
use crate::reducer::ReducerConfig;
use crate::state::State;

pub fn gain_item(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::GainItem(gain) = &event.payload else {
        return Ok(());
    };
    state.with_character(&gain.character, |c| {
        c.add_item(gain.item.clone());
        Ok(())
    })
}

/// Remove units of an item; asking for more than is held clamps to what is held
pub fn lose_item(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::LoseItem(loss) = &event.payload else {
        return Ok(());
    };
    state.with_character(&loss.character, |c| {
        if c.held(&loss.item_id) == 0 {
            return Err(ReductionWarning::ItemNotHeld {
                character: c.id.clone(),
                item: loss.item_id.clone(),
            });
        }
        c.remove_up_to(&loss.item_id, loss.quantity);
        Ok(())
    })
}

/// Move one unit from inventory into a slot, swapping out any previous occupant
pub fn equip_item(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::EquipItem(equip) = &event.payload else {
        return Ok(());
    };
    state.with_character(&equip.character, |c| {
        let item = c.take_item(&equip.item_id, 1)?;
        if let Some(previous) = c.equipment.insert(equip.slot.clone(), item) {
            c.add_item(previous);
        }
        Ok(())
    })
}

pub fn unequip_item(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::UnequipItem(unequip) = &event.payload else {
        return Ok(());
    };
    state.with_character(&unequip.character, |c| {
        let item = c
            .equipment
            .shift_remove(&unequip.slot)
            .ok_or_else(|| ReductionWarning::SlotEmpty {
                character: c.id.clone(),
                slot: unequip.slot.clone(),
            })?;
        c.add_item(item);
        Ok(())
    })
}

/// Consume the inputs of a known recipe and add its output, all or nothing
pub fn craft_item(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::CraftItem(craft) = &event.payload else {
        return Ok(());
    };
    state.with_character(&craft.character, |c| {
        if !c.knows_recipe(&craft.recipe_id) {
            return Err(ReductionWarning::UnknownRecipe {
                character: c.id.clone(),
                recipe: craft.recipe_id.clone(),
            });
        }
        for input in &craft.inputs {
            c.take_item(&input.item_id, input.quantity.saturating_mul(craft.quantity))?;
        }
        let produced = craft.output.quantity.saturating_mul(craft.quantity);
        c.add_item(craft.output.clone().with_quantity(produced));
        Ok(())
    })
}

/// Consume one unit and apply its effect to the user or to another character
pub fn use_item(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::UseItem(usage) = &event.payload else {
        return Ok(());
    };
    match &usage.target {
        Some(target) if *target != usage.character => {
            state.with_pair(&usage.character, target, |user, receiver| {
                user.take_item(&usage.item_id, 1)?;
                apply_effect(receiver, usage.effect.as_ref())
            })
        }
        _ => state.with_character(&usage.character, |user| {
            user.take_item(&usage.item_id, 1)?;
            apply_effect(user, usage.effect.as_ref())
        }),
    }
}

fn apply_effect(
    receiver: &mut CharacterSnapshot,
    effect: Option<&ItemEffect>,
) -> Result<(), ReductionWarning> {
    match effect {
        None => Ok(()),
        Some(ItemEffect::Heal(amount)) => {
            receiver.hp.current = receiver.hp.current.saturating_add(*amount).min(receiver.hp.max);
            Ok(())
        }
        Some(ItemEffect::Restore { resource, amount }) => {
            let pool = receiver.resource_mut(resource)?;
            pool.adjust(*amount);
            Ok(())
        }
    }
}
