//! Skill XP and levels, abilities and recipes

use crate::error::ReductionWarning;
use crate::event::Event;
use crate::payload::EventData;
use crate::progression;
use crate::reducer::ReducerConfig;
use crate::state::State;

/// Add XP and recompute the level; several thresholds may be crossed at once
pub fn gain_xp(state: &mut State, event: &Event, config: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::GainXp(grant) = &event.payload else {
        return Ok(());
    };
    state.with_character(&grant.character, |c| {
        let skill = c.skills.entry(grant.skill.clone()).or_default();
        progression::grant_xp(skill, grant.amount, config.max_skill_level);
        Ok(())
    })
}

/// Raise a skill by whole levels
pub fn level_up(state: &mut State, event: &Event, config: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::LevelUp(grant) = &event.payload else {
        return Ok(());
    };
    state.with_character(&grant.character, |c| {
        let skill = c.skills.entry(grant.skill.clone()).or_default();
        progression::raise_levels(skill, grant.levels, config.max_skill_level);
        Ok(())
    })
}

/// Learn an ability, replacing any known ability with the same id
pub fn learn_ability(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::LearnAbility(grant) = &event.payload else {
        return Ok(());
    };
    state.with_character(&grant.character, |c| {
        match c.abilities.iter_mut().find(|a| a.id == grant.ability.id) {
            Some(known) => *known = grant.ability.clone(),
            None => c.abilities.push(grant.ability.clone()),
        }
        Ok(())
    })
}

/// Pay a known ability's resource cost
pub fn use_ability(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::UseAbility(usage) = &event.payload else {
        return Ok(());
    };
    state.with_character(&usage.character, |c| {
        let cost = c
            .ability(&usage.ability_id)
            .map(|a| a.cost.clone())
            .ok_or_else(|| ReductionWarning::UnknownAbility {
                character: c.id.clone(),
                ability: usage.ability_id.clone(),
            })?;
        c.spend(&cost)
    })
}

pub fn learn_recipe(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::LearnRecipe(grant) = &event.payload else {
        return Ok(());
    };
    state.with_character(&grant.character, |c| {
        if !c.knows_recipe(&grant.recipe_id) {
            c.known_recipes.push(grant.recipe_id.clone());
        }
        Ok(())
    })
}
