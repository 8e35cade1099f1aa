//! The closed set of event kinds

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares `EventKind` together with its wire names, so the enum, `as_str`
/// and `FromStr` can never drift apart.
macro_rules! event_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// The kind of an event (the wire `t` field)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EventKind {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl EventKind {
            /// Every kind, in declaration order
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant),+];

            /// The wire name of this kind
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)+
                }
            }
        }

        impl FromStr for EventKind {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(EventKind::$variant),)+
                    other => Err(ValidationError::new(
                        "t",
                        format!("unknown event kind `{}`", other),
                    )),
                }
            }
        }
    };
}

event_kinds! {
    Note => "note",
    Check => "check",
    Attack => "attack",
    Damage => "damage",
    Heal => "heal",
    GainItem => "gain_item",
    LoseItem => "lose_item",
    StatusApply => "status_apply",
    StatusRemove => "status_remove",
    CreateChar => "create_char",
    UpdateChar => "update_char",
    Respawn => "respawn",
    EquipItem => "equip_item",
    UnequipItem => "unequip_item",
    CraftItem => "craft_item",
    UseItem => "use_item",
    TradeItem => "trade_item",
    LearnAbility => "learn_ability",
    UseAbility => "use_ability",
    LearnRecipe => "learn_recipe",
    GainXp => "gain_xp",
    LevelUp => "level_up",
    ModifyStat => "modify_stat",
    ModifyAttribute => "modify_attribute",
    ModifyResource => "modify_resource",
    ModifyCurrency => "modify_currency",
    AdvanceTurn => "advance_turn",
    CharacterMove => "character_move",
    Teleport => "teleport",
    SkillCheck => "skill_check",
    Custom => "custom",
}

impl EventKind {
    /// Kinds whose outcome lives in `result` and is only recorded, never recomputed
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            EventKind::Note
                | EventKind::Check
                | EventKind::Attack
                | EventKind::SkillCheck
                | EventKind::Custom
        )
    }

    /// Kinds whose subject defaults to the event `target` rather than the `actor`
    pub fn subject_is_target(&self) -> bool {
        matches!(
            self,
            EventKind::Damage
                | EventKind::Heal
                | EventKind::StatusApply
                | EventKind::StatusRemove
                | EventKind::Respawn
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_round_trips_through_its_name() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_unknown_kind_names_the_t_field() {
        let err = "dance".parse::<EventKind>().unwrap_err();
        assert_eq!(err.field, "t");
        assert!(err.reason.contains("dance"));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&EventKind::GainXp).unwrap();
        assert_eq!(json, "\"gain_xp\"");
        let kind: EventKind = serde_json::from_str("\"character_move\"").unwrap();
        assert_eq!(kind, EventKind::CharacterMove);
    }

    #[test]
    fn test_informational_kinds() {
        assert!(EventKind::Attack.is_informational());
        assert!(EventKind::Custom.is_informational());
        assert!(!EventKind::Damage.is_informational());
    }
}
