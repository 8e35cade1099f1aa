//! Standard reduction policies, one function per event kind
//!
//! - `vitals`: character creation and updates, hp, stats, attributes, resources
//! - `inventory`: gaining, losing, equipping, crafting and using items
//! - `economy`: trades and currency
//! - `skills`: XP, levels, abilities and recipes
//! - `status`: status effects and turn advancement
//! - `movement`: moves and teleports
//! - `informational`: checks and attacks whose outcome is recorded verbatim
//!
//! Every function matches the [`Policy`](crate::Policy) signature and leaves
//! the state untouched when it returns a warning.

pub mod economy;
pub mod informational;
pub mod inventory;
pub mod movement;
pub mod skills;
pub mod status;
pub mod vitals;

use crate::kind::EventKind;
use crate::reducer::Reducer;

/// Register every standard policy on a reducer
pub(crate) fn register_standard(reducer: Reducer) -> Reducer {
    reducer
        .with_policy(EventKind::CreateChar, vitals::create_char)
        .with_policy(EventKind::UpdateChar, vitals::update_char)
        .with_policy(EventKind::Respawn, vitals::respawn)
        .with_policy(EventKind::Damage, vitals::damage)
        .with_policy(EventKind::Heal, vitals::heal)
        .with_policy(EventKind::ModifyStat, vitals::modify_stat)
        .with_policy(EventKind::ModifyAttribute, vitals::modify_attribute)
        .with_policy(EventKind::ModifyResource, vitals::modify_resource)
        .with_policy(EventKind::GainItem, inventory::gain_item)
        .with_policy(EventKind::LoseItem, inventory::lose_item)
        .with_policy(EventKind::EquipItem, inventory::equip_item)
        .with_policy(EventKind::UnequipItem, inventory::unequip_item)
        .with_policy(EventKind::CraftItem, inventory::craft_item)
        .with_policy(EventKind::UseItem, inventory::use_item)
        .with_policy(EventKind::TradeItem, economy::trade_item)
        .with_policy(EventKind::ModifyCurrency, economy::modify_currency)
        .with_policy(EventKind::GainXp, skills::gain_xp)
        .with_policy(EventKind::LevelUp, skills::level_up)
        .with_policy(EventKind::LearnAbility, skills::learn_ability)
        .with_policy(EventKind::UseAbility, skills::use_ability)
        .with_policy(EventKind::LearnRecipe, skills::learn_recipe)
        .with_policy(EventKind::StatusApply, status::status_apply)
        .with_policy(EventKind::StatusRemove, status::status_remove)
        .with_policy(EventKind::AdvanceTurn, status::advance_turn)
        .with_policy(EventKind::CharacterMove, movement::character_move)
        .with_policy(EventKind::Teleport, movement::teleport)
        .with_policy(EventKind::Check, informational::record_action)
        .with_policy(EventKind::SkillCheck, informational::record_action)
        .with_policy(EventKind::Attack, informational::record_action)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::character::{CharacterSnapshot, Resource};
    use crate::event::{Event, NewEvent};
    use crate::identity::{CharacterId, EventId, SessionId};
    use crate::reducer::Reducer;
    use crate::state::Reduction;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    pub fn session() -> SessionId {
        SessionId::new("2024-01-15-0001")
    }

    /// `create_char` for a character with 20 hp plus any extra sheet fields
    pub fn create(id: &str, extra: Value) -> NewEvent {
        let mut sheet = json!({"id": id, "name": id, "hp": {"max": 20, "current": 20}});
        if let (Some(sheet), Value::Object(extra)) = (sheet.as_object_mut(), extra) {
            sheet.extend(extra);
        }
        NewEvent::new("create_char").data(json!({ "character": sheet }))
    }

    /// Validate and number events from 1, then fold them with the standard reducer
    pub fn reduce(events: Vec<NewEvent>) -> Reduction {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap();
        let events: Vec<Event> = events
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                e.validate()
                    .unwrap()
                    .stamp(EventId::new(i as u64 + 1), session(), ts)
            })
            .collect();
        Reducer::default().replay(session(), &events)
    }

    /// Fold more events onto an existing reduction, numbering after its head
    pub fn extend(reduction: &mut Reduction, events: Vec<NewEvent>) {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 19, 0, 0).unwrap();
        let reducer = Reducer::default();
        for e in events {
            let id = reduction
                .state
                .last_event_id
                .map(|last| last.next())
                .unwrap_or(EventId::new(1));
            let event = e.validate().unwrap().stamp(id, session(), ts);
            reducer.fold(reduction, &event);
        }
    }

    /// Overwrite a resource pool without validation, as a hand-edited log would
    pub fn corrupt_pool(reduction: &mut Reduction, id: &str, resource: &str, max: i64, current: i64) {
        let c = reduction
            .state
            .characters
            .get_mut(&CharacterId::new(id))
            .unwrap();
        c.resources
            .insert(resource.to_string(), Resource { max, current });
    }

    pub fn character<'a>(reduction: &'a Reduction, id: &str) -> &'a CharacterSnapshot {
        &reduction.state.characters[&CharacterId::new(id)]
    }
}
