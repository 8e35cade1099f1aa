//! Typed event payloads
//!
//! On the wire `data` is an open JSON object. [`EventData::parse`] turns it into
//! one strongly typed variant per [`EventKind`], resolving the subject character
//! and rejecting malformed input with a [`ValidationError`] naming the field.
//!
//! The subject of a single-character kind is `data.character_id` (or the legacy
//! `data.id`), falling back to the event `target` for damage, heal, status and
//! respawn events and to the `actor` for everything else.

use crate::character::{Ability, CharacterSnapshot, Hp, Item, Location, StatusEffect, ValueMap};
use crate::error::ValidationError;
use crate::identity::CharacterId;
use crate::kind::EventKind;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

type Parsed<T> = std::result::Result<T, ValidationError>;

// ============================================================================
// Payload types
// ============================================================================

/// Free-form narration
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub text: String,
}

/// A resolved ability or skill check; the outcome lives in the event `result`
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub character: Option<CharacterId>,
    pub skill: String,
    pub dc: Option<i64>,
}

/// A resolved attack; the outcome lives in the event `result`
#[derive(Debug, Clone, PartialEq)]
pub struct Attack {
    pub attacker: CharacterId,
    pub defender: CharacterId,
    pub weapon: Option<String>,
}

/// Damage or healing
#[derive(Debug, Clone, PartialEq)]
pub struct HpChange {
    pub character: CharacterId,
    /// Non-negative; taken from `result.amount` when present
    pub amount: i64,
    pub damage_type: Option<String>,
}

/// Fields `update_char` may change
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CharacterPatch {
    pub name: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub race: Option<String>,
    #[serde(alias = "lvl")]
    pub level: Option<u32>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Merged into existing stats
    #[serde(default)]
    pub stats: IndexMap<String, i64>,
    /// Merged into existing attributes
    #[serde(default)]
    pub attributes: ValueMap,
    pub hp: Option<Hp>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterUpdate {
    pub character: CharacterId,
    pub patch: CharacterPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Respawn {
    pub character: CharacterId,
    pub location: Option<Location>,
}

/// An item id with a quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemGain {
    pub character: CharacterId,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemLoss {
    pub character: CharacterId,
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Equip {
    pub character: CharacterId,
    pub item_id: String,
    pub slot: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unequip {
    pub character: CharacterId,
    pub slot: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Craft {
    pub character: CharacterId,
    pub recipe_id: String,
    /// Number of crafts performed
    pub quantity: u32,
    /// Consumed per craft
    pub inputs: Vec<ItemStack>,
    /// Produced per craft
    pub output: Item,
}

/// What using an item does
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEffect {
    Heal(i64),
    Restore { resource: String, amount: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemUse {
    pub character: CharacterId,
    pub item_id: String,
    /// Receiver of the effect; the user when absent
    pub target: Option<CharacterId>,
    pub effect: Option<ItemEffect>,
}

/// Items and currency moving from one character to another
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub from: CharacterId,
    pub to: CharacterId,
    pub items: Vec<ItemStack>,
    /// Paid by `from` to `to`
    pub currency: IndexMap<String, i64>,
    /// Paid by `to` to `from`
    pub price: IndexMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbilityGrant {
    pub character: CharacterId,
    pub ability: Ability,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbilityUse {
    pub character: CharacterId,
    pub ability_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeGrant {
    pub character: CharacterId,
    pub recipe_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XpGrant {
    pub character: CharacterId,
    pub skill: String,
    pub amount: u64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelGrant {
    pub character: CharacterId,
    pub skill: String,
    pub levels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOp {
    Set,
    Add,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatChange {
    pub character: CharacterId,
    pub stat: String,
    pub value: i64,
    pub op: StatOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeOp {
    Set,
    Add,
    Multiply,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub character: CharacterId,
    pub attribute: String,
    /// Always a number for `Add` and `Multiply`
    pub value: Value,
    pub op: AttributeOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChange {
    pub character: CharacterId,
    pub resource: String,
    /// Delta applied to `current`
    pub amount: i64,
    /// New maximum; creates the pool when it does not exist yet
    pub max: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyChange {
    pub character: CharacterId,
    pub currency: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusApplication {
    pub character: CharacterId,
    pub effect: StatusEffect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusRemoval {
    pub character: CharacterId,
    pub effect_id: String,
    /// Stacks to remove; the whole effect when absent
    pub stacks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnAdvance {
    /// Only this character; every character when absent
    pub character: Option<CharacterId>,
    pub turns: u32,
}

/// How a character moves, which sets the stamina rate per unit of distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    #[default]
    Walk,
    Run,
    Sprint,
    Sneak,
    Crawl,
    Swim,
    Fly,
    Climb,
    Jump,
}

impl MovementType {
    /// Stamina spent per unit of distance
    pub fn stamina_rate(&self) -> f64 {
        match self {
            MovementType::Walk => 0.1,
            MovementType::Run => 0.3,
            MovementType::Sprint => 0.6,
            MovementType::Sneak => 0.15,
            MovementType::Crawl => 0.2,
            MovementType::Swim => 0.4,
            MovementType::Fly => 0.5,
            MovementType::Climb => 0.5,
            MovementType::Jump => 0.3,
        }
    }

    /// Stamina needed to cover `distance`, rounded to the nearest point
    pub fn stamina_cost(&self, distance: f64) -> i64 {
        (self.stamina_rate() * distance).round() as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Walk => "walk",
            MovementType::Run => "run",
            MovementType::Sprint => "sprint",
            MovementType::Sneak => "sneak",
            MovementType::Crawl => "crawl",
            MovementType::Swim => "swim",
            MovementType::Fly => "fly",
            MovementType::Climb => "climb",
            MovementType::Jump => "jump",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "walk" => Ok(MovementType::Walk),
            "run" => Ok(MovementType::Run),
            "sprint" => Ok(MovementType::Sprint),
            "sneak" => Ok(MovementType::Sneak),
            "crawl" => Ok(MovementType::Crawl),
            "swim" => Ok(MovementType::Swim),
            "fly" => Ok(MovementType::Fly),
            "climb" => Ok(MovementType::Climb),
            "jump" => Ok(MovementType::Jump),
            other => Err(format!("unknown movement type `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub character: CharacterId,
    pub to: Location,
    pub mode: MovementType,
    /// Recorded cost that overrides the rate table
    pub stamina_cost: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Teleport {
    pub character: CharacterId,
    pub destination: Location,
    pub reason: Option<String>,
}

// ============================================================================
// EventData
// ============================================================================

/// The validated, kind-specific payload of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Note(Note),
    Check(Check),
    SkillCheck(Check),
    Attack(Attack),
    Damage(HpChange),
    Heal(HpChange),
    GainItem(ItemGain),
    LoseItem(ItemLoss),
    StatusApply(StatusApplication),
    StatusRemove(StatusRemoval),
    CreateChar(Box<CharacterSnapshot>),
    UpdateChar(CharacterUpdate),
    Respawn(Respawn),
    EquipItem(Equip),
    UnequipItem(Unequip),
    CraftItem(Craft),
    UseItem(ItemUse),
    TradeItem(Trade),
    LearnAbility(AbilityGrant),
    UseAbility(AbilityUse),
    LearnRecipe(RecipeGrant),
    GainXp(XpGrant),
    LevelUp(LevelGrant),
    ModifyStat(StatChange),
    ModifyAttribute(AttributeChange),
    ModifyResource(ResourceChange),
    ModifyCurrency(CurrencyChange),
    AdvanceTurn(TurnAdvance),
    CharacterMove(Movement),
    Teleport(Teleport),
    /// Open payload kept verbatim
    Custom(ValueMap),
}

impl EventData {
    /// Validate the raw parts of an event and build its typed payload
    ///
    /// `actor` and `target` must already be syntactically valid ids.
    pub fn parse(
        kind: EventKind,
        actor: Option<&CharacterId>,
        target: Option<&CharacterId>,
        data: Option<&Value>,
        result: Option<&Value>,
    ) -> Parsed<EventData> {
        let empty = Map::new();
        let data = Fields::new(object_or_empty(data, "data", &empty)?, "data");
        let result = Fields::new(object_or_empty(result, "result", &empty)?, "result");
        let ctx = Context {
            kind,
            actor,
            target,
        };

        let parsed = match kind {
            EventKind::Note => EventData::Note(Note {
                text: data.req_str("text")?.to_string(),
            }),
            EventKind::Check => EventData::Check(ctx.check(&data)?),
            EventKind::SkillCheck => EventData::SkillCheck(ctx.check(&data)?),
            EventKind::Attack => EventData::Attack(Attack {
                attacker: actor.cloned().ok_or_else(|| ValidationError::missing("actor"))?,
                defender: target.cloned().ok_or_else(|| ValidationError::missing("target"))?,
                weapon: data.str("weapon")?.map(str::to_string),
            }),
            EventKind::Damage => EventData::Damage(ctx.hp_change(&data, &result)?),
            EventKind::Heal => EventData::Heal(ctx.hp_change(&data, &result)?),
            EventKind::CreateChar => EventData::CreateChar(Box::new(parse_sheet(&data)?)),
            EventKind::UpdateChar => {
                let patch: CharacterPatch = data
                    .typed("patch")?
                    .ok_or_else(|| data.missing("patch"))?;
                if let Some(hp) = &patch.hp {
                    check_hp(hp).map_err(|e| e.nested("data.patch.hp"))?;
                }
                EventData::UpdateChar(CharacterUpdate {
                    character: ctx.subject(&data)?,
                    patch,
                })
            }
            EventKind::Respawn => EventData::Respawn(Respawn {
                character: ctx.subject(&data)?,
                location: data.typed("location")?,
            }),
            EventKind::GainItem => {
                let mut item = data.item("item")?.ok_or_else(|| data.missing("item"))?;
                if let Some(quantity) = data.positive_count("quantity")? {
                    item.quantity = quantity;
                }
                EventData::GainItem(ItemGain {
                    character: ctx.subject(&data)?,
                    item,
                })
            }
            EventKind::LoseItem => {
                let (item_id, item_quantity) = data.item_ref()?;
                EventData::LoseItem(ItemLoss {
                    character: ctx.subject(&data)?,
                    item_id,
                    quantity: data.positive_count("quantity")?.or(item_quantity).unwrap_or(1),
                })
            }
            EventKind::EquipItem => EventData::EquipItem(Equip {
                character: ctx.subject(&data)?,
                item_id: data.item_ref()?.0,
                slot: data.req_str("slot")?.to_string(),
            }),
            EventKind::UnequipItem => EventData::UnequipItem(Unequip {
                character: ctx.subject(&data)?,
                slot: data.req_str("slot")?.to_string(),
            }),
            EventKind::CraftItem => {
                let recipe_id = data.req_str("recipe_id")?.to_string();
                let output = data
                    .item("output")?
                    .unwrap_or_else(|| Item::new(recipe_id.clone()));
                EventData::CraftItem(Craft {
                    character: ctx.subject(&data)?,
                    quantity: data.positive_count("quantity")?.unwrap_or(1),
                    inputs: data.stacks("inputs")?,
                    output,
                    recipe_id,
                })
            }
            EventKind::UseItem => EventData::UseItem(ItemUse {
                character: ctx.subject(&data)?,
                item_id: data.item_ref()?.0,
                target: data.character("target_id")?,
                effect: parse_item_effect(&data)?,
            }),
            EventKind::TradeItem => EventData::TradeItem(ctx.trade(&data)?),
            EventKind::LearnAbility => {
                let ability = data.object("ability")?.ok_or_else(|| data.missing("ability"))?;
                ability.req_str("id")?;
                ability.req_str("name")?;
                let grant: Ability = data.typed("ability")?.ok_or_else(|| data.missing("ability"))?;
                check_ability(&grant, &ability.prefix)?;
                EventData::LearnAbility(AbilityGrant {
                    character: ctx.subject(&data)?,
                    ability: grant,
                })
            }
            EventKind::UseAbility => EventData::UseAbility(AbilityUse {
                character: ctx.subject(&data)?,
                ability_id: data.req_str("ability_id")?.to_string(),
            }),
            EventKind::LearnRecipe => EventData::LearnRecipe(RecipeGrant {
                character: ctx.subject(&data)?,
                recipe_id: data.req_str("recipe_id")?.to_string(),
            }),
            EventKind::GainXp => EventData::GainXp(XpGrant {
                character: ctx.subject(&data)?,
                skill: data.req_str("skill")?.to_string(),
                amount: data
                    .non_negative("amount")?
                    .ok_or_else(|| data.missing("amount"))? as u64,
                reason: data.str("reason")?.map(str::to_string),
            }),
            EventKind::LevelUp => EventData::LevelUp(LevelGrant {
                character: ctx.subject(&data)?,
                skill: data.req_str("skill")?.to_string(),
                levels: data.positive_count("levels")?.unwrap_or(1),
            }),
            EventKind::ModifyStat => {
                let op = match data.str("operation")?.unwrap_or("set") {
                    "set" => StatOp::Set,
                    "add" => StatOp::Add,
                    other => {
                        return Err(data.invalid(
                            "operation",
                            format!("`{}` is not one of set, add", other),
                        ))
                    }
                };
                EventData::ModifyStat(StatChange {
                    character: ctx.subject(&data)?,
                    stat: data.req_str("stat")?.to_string(),
                    value: data.int("value")?.ok_or_else(|| data.missing("value"))?,
                    op,
                })
            }
            EventKind::ModifyAttribute => EventData::ModifyAttribute(ctx.attribute(&data)?),
            EventKind::ModifyResource => {
                let amount = data.int("amount")?;
                let max = data.non_negative("max")?;
                if amount.is_none() && max.is_none() {
                    return Err(data.missing("amount"));
                }
                EventData::ModifyResource(ResourceChange {
                    character: ctx.subject(&data)?,
                    resource: data.req_str("resource")?.to_string(),
                    amount: amount.unwrap_or(0),
                    max,
                })
            }
            EventKind::ModifyCurrency => EventData::ModifyCurrency(CurrencyChange {
                character: ctx.subject(&data)?,
                currency: data.req_str("currency")?.to_string(),
                amount: data.int("amount")?.ok_or_else(|| data.missing("amount"))?,
            }),
            EventKind::StatusApply => EventData::StatusApply(ctx.status_apply(&data)?),
            EventKind::StatusRemove => {
                let effect_id = match data.str("effect_id")? {
                    Some(id) => id.to_string(),
                    None => match data.get("effect") {
                        Some(Value::String(id)) => id.clone(),
                        Some(Value::Object(_)) => data
                            .object("effect")?
                            .ok_or_else(|| data.missing("effect_id"))?
                            .req_str("id")?
                            .to_string(),
                        _ => return Err(data.missing("effect_id")),
                    },
                };
                EventData::StatusRemove(StatusRemoval {
                    character: ctx.subject(&data)?,
                    effect_id,
                    stacks: data.positive_count("stacks")?,
                })
            }
            EventKind::AdvanceTurn => EventData::AdvanceTurn(TurnAdvance {
                character: match data.character("character_id")? {
                    Some(id) => Some(id),
                    None => data.character("id")?,
                },
                turns: data.positive_count("turns")?.unwrap_or(1),
            }),
            EventKind::CharacterMove => {
                let mode = match data.str("movement_type")? {
                    Some(raw) => raw
                        .parse::<MovementType>()
                        .map_err(|reason| data.invalid("movement_type", reason))?,
                    None => MovementType::Walk,
                };
                let stamina_cost = match result.non_negative("stamina_cost")? {
                    Some(cost) => Some(cost),
                    None => data.non_negative("stamina_cost")?,
                };
                EventData::CharacterMove(Movement {
                    character: ctx.subject(&data)?,
                    to: data.typed("to")?.ok_or_else(|| data.missing("to"))?,
                    mode,
                    stamina_cost,
                })
            }
            EventKind::Teleport => EventData::Teleport(Teleport {
                character: ctx.subject(&data)?,
                destination: data
                    .typed("destination")?
                    .ok_or_else(|| data.missing("destination"))?,
                reason: data.str("reason")?.map(str::to_string),
            }),
            EventKind::Custom => EventData::Custom(
                data.map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        };
        Ok(parsed)
    }

    /// The kind this payload belongs to
    pub fn kind(&self) -> EventKind {
        match self {
            EventData::Note(_) => EventKind::Note,
            EventData::Check(_) => EventKind::Check,
            EventData::SkillCheck(_) => EventKind::SkillCheck,
            EventData::Attack(_) => EventKind::Attack,
            EventData::Damage(_) => EventKind::Damage,
            EventData::Heal(_) => EventKind::Heal,
            EventData::GainItem(_) => EventKind::GainItem,
            EventData::LoseItem(_) => EventKind::LoseItem,
            EventData::StatusApply(_) => EventKind::StatusApply,
            EventData::StatusRemove(_) => EventKind::StatusRemove,
            EventData::CreateChar(_) => EventKind::CreateChar,
            EventData::UpdateChar(_) => EventKind::UpdateChar,
            EventData::Respawn(_) => EventKind::Respawn,
            EventData::EquipItem(_) => EventKind::EquipItem,
            EventData::UnequipItem(_) => EventKind::UnequipItem,
            EventData::CraftItem(_) => EventKind::CraftItem,
            EventData::UseItem(_) => EventKind::UseItem,
            EventData::TradeItem(_) => EventKind::TradeItem,
            EventData::LearnAbility(_) => EventKind::LearnAbility,
            EventData::UseAbility(_) => EventKind::UseAbility,
            EventData::LearnRecipe(_) => EventKind::LearnRecipe,
            EventData::GainXp(_) => EventKind::GainXp,
            EventData::LevelUp(_) => EventKind::LevelUp,
            EventData::ModifyStat(_) => EventKind::ModifyStat,
            EventData::ModifyAttribute(_) => EventKind::ModifyAttribute,
            EventData::ModifyResource(_) => EventKind::ModifyResource,
            EventData::ModifyCurrency(_) => EventKind::ModifyCurrency,
            EventData::AdvanceTurn(_) => EventKind::AdvanceTurn,
            EventData::CharacterMove(_) => EventKind::CharacterMove,
            EventData::Teleport(_) => EventKind::Teleport,
            EventData::Custom(_) => EventKind::Custom,
        }
    }

    /// Characters this payload touches, in the order they are touched
    pub fn characters(&self) -> Vec<&CharacterId> {
        match self {
            EventData::Note(_) | EventData::Custom(_) => Vec::new(),
            EventData::Check(c) | EventData::SkillCheck(c) => c.character.iter().collect(),
            EventData::Attack(a) => vec![&a.attacker, &a.defender],
            EventData::Damage(p) | EventData::Heal(p) => vec![&p.character],
            EventData::GainItem(p) => vec![&p.character],
            EventData::LoseItem(p) => vec![&p.character],
            EventData::StatusApply(p) => vec![&p.character],
            EventData::StatusRemove(p) => vec![&p.character],
            EventData::CreateChar(sheet) => vec![&sheet.id],
            EventData::UpdateChar(p) => vec![&p.character],
            EventData::Respawn(p) => vec![&p.character],
            EventData::EquipItem(p) => vec![&p.character],
            EventData::UnequipItem(p) => vec![&p.character],
            EventData::CraftItem(p) => vec![&p.character],
            EventData::UseItem(p) => {
                let mut ids = vec![&p.character];
                ids.extend(p.target.iter().filter(|t| **t != p.character));
                ids
            }
            EventData::TradeItem(p) => vec![&p.from, &p.to],
            EventData::LearnAbility(p) => vec![&p.character],
            EventData::UseAbility(p) => vec![&p.character],
            EventData::LearnRecipe(p) => vec![&p.character],
            EventData::GainXp(p) => vec![&p.character],
            EventData::LevelUp(p) => vec![&p.character],
            EventData::ModifyStat(p) => vec![&p.character],
            EventData::ModifyAttribute(p) => vec![&p.character],
            EventData::ModifyResource(p) => vec![&p.character],
            EventData::ModifyCurrency(p) => vec![&p.character],
            EventData::AdvanceTurn(p) => p.character.iter().collect(),
            EventData::CharacterMove(p) => vec![&p.character],
            EventData::Teleport(p) => vec![&p.character],
        }
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn object_or_empty<'a>(
    value: Option<&'a Value>,
    field: &str,
    empty: &'a Map<String, Value>,
) -> Parsed<&'a Map<String, Value>> {
    match value {
        None | Some(Value::Null) => Ok(empty),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ValidationError::new(field, "expected an object or null")),
    }
}

/// Integral JSON numbers, including floats with no fractional part
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
            .map(|f| f as i64)
    })
}

fn check_hp(hp: &Hp) -> Parsed<()> {
    if hp.max < 0 {
        return Err(ValidationError::new("max", "must be >= 0"));
    }
    if hp.current < 0 || hp.current > hp.max {
        return Err(ValidationError::new(
            "current",
            format!("must be between 0 and max ({})", hp.max),
        ));
    }
    if hp.temp < 0 {
        return Err(ValidationError::new("temp", "must be >= 0"));
    }
    Ok(())
}

/// Typed view over one JSON object, reporting errors with dotted paths
struct Fields<'a> {
    map: &'a Map<String, Value>,
    prefix: String,
}

impl<'a> Fields<'a> {
    fn new(map: &'a Map<String, Value>, prefix: impl Into<String>) -> Self {
        Self {
            map,
            prefix: prefix.into(),
        }
    }

    fn path(&self, key: &str) -> String {
        format!("{}.{}", self.prefix, key)
    }

    fn missing(&self, key: &str) -> ValidationError {
        ValidationError::missing(self.path(key))
    }

    fn invalid(&self, key: &str, reason: impl Into<String>) -> ValidationError {
        ValidationError::new(self.path(key), reason)
    }

    /// Present and non-null
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn str(&self, key: &str) -> Parsed<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    fn req_str(&self, key: &str) -> Parsed<&'a str> {
        let s = self.str(key)?.ok_or_else(|| self.missing(key))?;
        if s.is_empty() {
            return Err(self.invalid(key, "must not be empty"));
        }
        Ok(s)
    }

    fn int(&self, key: &str) -> Parsed<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => as_integer(v)
                .map(Some)
                .ok_or_else(|| self.invalid(key, "expected an integer")),
        }
    }

    fn non_negative(&self, key: &str) -> Parsed<Option<i64>> {
        match self.int(key)? {
            Some(n) if n < 0 => Err(self.invalid(key, "must be >= 0")),
            other => Ok(other),
        }
    }

    fn positive_count(&self, key: &str) -> Parsed<Option<u32>> {
        match self.int(key)? {
            None => Ok(None),
            Some(n) if n < 1 => Err(self.invalid(key, "must be >= 1")),
            Some(n) => u32::try_from(n)
                .map(Some)
                .map_err(|_| self.invalid(key, "too large")),
        }
    }

    fn object(&self, key: &str) -> Parsed<Option<Fields<'a>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Fields::new(map, self.path(key)))),
            Some(_) => Err(self.invalid(key, "expected an object")),
        }
    }

    fn typed<T: DeserializeOwned>(&self, key: &str) -> Parsed<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| self.invalid(key, e.to_string())),
        }
    }

    fn character(&self, key: &str) -> Parsed<Option<CharacterId>> {
        match self.str(key)? {
            None => Ok(None),
            Some(raw) => CharacterId::parse(&self.path(key), raw).map(Some),
        }
    }

    /// An item given either as a bare id or as a full item object
    fn item(&self, key: &str) -> Parsed<Option<Item>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(id)) if !id.is_empty() => Ok(Some(Item::new(id.clone()))),
            Some(Value::Object(map)) => {
                let fields = Fields::new(map, self.path(key));
                fields.req_str("id")?;
                fields.positive_count("quantity")?;
                self.typed(key)
            }
            Some(_) => Err(self.invalid(key, "expected an item id or an item object")),
        }
    }

    /// `item_id`, or the id of `item`, plus the quantity an item object carries
    fn item_ref(&self) -> Parsed<(String, Option<u32>)> {
        if let Some(id) = self.str("item_id")? {
            if id.is_empty() {
                return Err(self.invalid("item_id", "must not be empty"));
            }
            return Ok((id.to_string(), None));
        }
        match self.item("item")? {
            Some(item) => {
                let explicit = self
                    .object("item")?
                    .map(|f| f.get("quantity").is_some())
                    .unwrap_or(false);
                Ok((item.id, explicit.then_some(item.quantity)))
            }
            None => Err(self.missing("item_id")),
        }
    }

    /// An array of stacks, each a bare id or `{item_id|id, quantity}`
    fn stacks(&self, key: &str) -> Parsed<Vec<ItemStack>> {
        let entries = match self.get(key) {
            None => return Ok(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(self.invalid(key, "expected an array")),
        };
        let mut stacks = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let path = format!("{}[{}]", self.path(key), index);
            let stack = match entry {
                Value::String(id) if !id.is_empty() => ItemStack {
                    item_id: id.clone(),
                    quantity: 1,
                },
                Value::Object(map) => {
                    let fields = Fields::new(map, path);
                    let item_id = match fields.str("item_id")? {
                        Some(id) => id,
                        None => fields.req_str("id")?,
                    };
                    ItemStack {
                        item_id: item_id.to_string(),
                        quantity: fields.positive_count("quantity")?.unwrap_or(1),
                    }
                }
                _ => {
                    return Err(ValidationError::new(
                        path,
                        "expected an item id or an item object",
                    ))
                }
            };
            stacks.push(stack);
        }
        Ok(stacks)
    }

    /// A map of currency name to a non-negative amount
    fn amounts(&self, key: &str) -> Parsed<IndexMap<String, i64>> {
        let amounts: IndexMap<String, i64> = self.typed(key)?.unwrap_or_default();
        if let Some((name, _)) = amounts.iter().find(|(_, v)| **v < 0) {
            return Err(ValidationError::new(
                format!("{}.{}", self.path(key), name),
                "must be >= 0",
            ));
        }
        Ok(amounts)
    }
}

/// Event-level context for resolving subjects
struct Context<'a> {
    kind: EventKind,
    actor: Option<&'a CharacterId>,
    target: Option<&'a CharacterId>,
}

impl Context<'_> {
    fn explicit_subject(&self, data: &Fields<'_>) -> Parsed<Option<CharacterId>> {
        match data.character("character_id")? {
            Some(id) => Ok(Some(id)),
            None => data.character("id"),
        }
    }

    fn subject(&self, data: &Fields<'_>) -> Parsed<CharacterId> {
        if let Some(id) = self.explicit_subject(data)? {
            return Ok(id);
        }
        let fallback = if self.kind.subject_is_target() {
            self.target
        } else {
            self.actor
        };
        fallback
            .cloned()
            .ok_or_else(|| data.missing("character_id"))
    }

    fn check(&self, data: &Fields<'_>) -> Parsed<Check> {
        Ok(Check {
            character: self.explicit_subject(data)?.or_else(|| self.actor.cloned()),
            skill: data.req_str("skill")?.to_string(),
            dc: data.int("dc")?,
        })
    }

    fn hp_change(&self, data: &Fields<'_>, result: &Fields<'_>) -> Parsed<HpChange> {
        let amount = match result.non_negative("amount")? {
            Some(amount) => amount,
            None => data
                .non_negative("amount")?
                .ok_or_else(|| data.missing("amount"))?,
        };
        Ok(HpChange {
            character: self.subject(data)?,
            amount,
            damage_type: data.str("damage_type")?.map(str::to_string),
        })
    }

    fn trade(&self, data: &Fields<'_>) -> Parsed<Trade> {
        let from = match data.character("from_character_id")? {
            Some(id) => id,
            None => self
                .actor
                .cloned()
                .ok_or_else(|| data.missing("from_character_id"))?,
        };
        let to = match data.character("to_character_id")? {
            Some(id) => id,
            None => self
                .target
                .cloned()
                .ok_or_else(|| data.missing("to_character_id"))?,
        };
        if from == to {
            return Err(data.invalid("to_character_id", "must differ from the source"));
        }

        let mut items = data.stacks("items")?;
        if data.get("item_id").is_some() || data.get("item").is_some() {
            let (item_id, item_quantity) = data.item_ref()?;
            items.push(ItemStack {
                item_id,
                quantity: data.positive_count("quantity")?.or(item_quantity).unwrap_or(1),
            });
        }
        let currency = data.amounts("currency")?;
        if items.is_empty() && currency.values().all(|&v| v == 0) {
            return Err(data.invalid("items", "trade must move at least one item or some currency"));
        }

        Ok(Trade {
            from,
            to,
            items,
            currency,
            price: data.amounts("price")?,
        })
    }

    fn attribute(&self, data: &Fields<'_>) -> Parsed<AttributeChange> {
        let op = match data.str("operation")?.unwrap_or("set") {
            "set" => AttributeOp::Set,
            "add" => AttributeOp::Add,
            "multiply" => AttributeOp::Multiply,
            other => {
                return Err(data.invalid(
                    "operation",
                    format!("`{}` is not one of set, add, multiply", other),
                ))
            }
        };
        let value = data.get("value").cloned().ok_or_else(|| data.missing("value"))?;
        if op != AttributeOp::Set && !value.is_number() {
            return Err(data.invalid("value", "must be a number for add and multiply"));
        }
        Ok(AttributeChange {
            character: self.subject(data)?,
            attribute: data.req_str("attribute")?.to_string(),
            value,
            op,
        })
    }

    fn status_apply(&self, data: &Fields<'_>) -> Parsed<StatusApplication> {
        let fields = data.object("effect")?.ok_or_else(|| data.missing("effect"))?;
        fields.req_str("id")?;
        fields.positive_count("stacks")?;
        fields.positive_count("max_stacks")?;
        let effect: StatusEffect = data.typed("effect")?.ok_or_else(|| data.missing("effect"))?;
        Ok(StatusApplication {
            character: self.subject(data)?,
            effect,
        })
    }
}

fn parse_item_effect(data: &Fields<'_>) -> Parsed<Option<ItemEffect>> {
    let Some(effect) = data.object("effect")? else {
        return Ok(None);
    };
    if let Some(heal) = effect.non_negative("heal")? {
        return Ok(Some(ItemEffect::Heal(heal)));
    }
    match effect.str("resource")? {
        Some(resource) => Ok(Some(ItemEffect::Restore {
            resource: resource.to_string(),
            amount: effect.int("amount")?.ok_or_else(|| effect.missing("amount"))?,
        })),
        None => Err(data.invalid("effect", "expected `heal` or `resource` with `amount`")),
    }
}

/// Validate and normalise a `create_char` sheet
fn parse_sheet(data: &Fields<'_>) -> Parsed<CharacterSnapshot> {
    let sheet = data.object("character")?.ok_or_else(|| data.missing("character"))?;
    CharacterId::parse(&sheet.path("id"), sheet.req_str("id")?)?;
    sheet.req_str("name")?;

    let hp = sheet.object("hp")?.ok_or_else(|| sheet.missing("hp"))?;
    let max = hp.non_negative("max")?.ok_or_else(|| hp.missing("max"))?;
    let current = hp.non_negative("current")?.unwrap_or(max);
    if current > max {
        return Err(hp.invalid("current", format!("must not exceed max ({})", max)));
    }
    hp.non_negative("temp")?;

    let mut normalised = sheet.map.clone();
    if let Some(Value::Object(hp)) = normalised.get_mut("hp") {
        hp.entry("current").or_insert(Value::from(current));
    }
    // Legacy sheets list items as bare ids
    if let Some(Value::Array(items)) = normalised.get_mut("inventory") {
        for item in items.iter_mut() {
            if let Value::String(id) = item {
                *item = serde_json::json!({ "id": id });
            }
        }
    }
    if let Some(Value::Object(slots)) = normalised.get_mut("equipment") {
        for item in slots.values_mut() {
            if let Value::String(id) = item {
                *item = serde_json::json!({ "id": id });
            }
        }
    }

    let snapshot: CharacterSnapshot = serde_json::from_value(Value::Object(normalised))
        .map_err(|e| ValidationError::new(sheet.prefix.clone(), e.to_string()))?;
    check_sheet(&snapshot, &sheet.prefix)?;
    Ok(snapshot)
}

/// Rules a sheet must satisfy beyond its shape
fn check_sheet(sheet: &CharacterSnapshot, prefix: &str) -> Parsed<()> {
    if let Some(index) = sheet.inventory.iter().position(|i| i.quantity == 0) {
        return Err(ValidationError::new(
            format!("{}.inventory[{}].quantity", prefix, index),
            "must be >= 1",
        ));
    }
    for (name, pool) in &sheet.resources {
        let path = format!("{}.resources.{}", prefix, name);
        if pool.max < 0 {
            return Err(ValidationError::new(format!("{}.max", path), "must be >= 0"));
        }
        if pool.current < 0 {
            return Err(ValidationError::new(format!("{}.current", path), "must be >= 0"));
        }
        if pool.current > pool.max {
            return Err(ValidationError::new(
                format!("{}.current", path),
                format!("must not exceed max ({})", pool.max),
            ));
        }
    }
    if let Some((name, _)) = sheet.currency.iter().find(|(_, v)| **v < 0) {
        return Err(ValidationError::new(
            format!("{}.currency.{}", prefix, name),
            "must be >= 0",
        ));
    }
    for (index, effect) in sheet.status_effects.iter().enumerate() {
        let path = format!("{}.status_effects[{}]", prefix, index);
        if effect.stacks == 0 {
            return Err(ValidationError::new(format!("{}.stacks", path), "must be >= 1"));
        }
        if effect.max_stacks == Some(0) {
            return Err(ValidationError::new(format!("{}.max_stacks", path), "must be >= 1"));
        }
    }
    for (index, ability) in sheet.abilities.iter().enumerate() {
        check_ability(ability, &format!("{}.abilities[{}]", prefix, index))?;
    }
    Ok(())
}

fn check_ability(ability: &Ability, prefix: &str) -> Parsed<()> {
    match ability.cost.iter().find(|(_, v)| **v < 0) {
        Some((name, _)) => Err(ValidationError::new(
            format!("{}.cost.{}", prefix, name),
            "must be >= 0",
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(kind: EventKind, actor: Option<&str>, target: Option<&str>, data: Value) -> Parsed<EventData> {
        let actor = actor.map(CharacterId::new);
        let target = target.map(CharacterId::new);
        EventData::parse(kind, actor.as_ref(), target.as_ref(), Some(&data), None)
    }

    #[test]
    fn test_damage_subject_falls_back_to_target() {
        let data = parse(EventKind::Damage, Some("hero"), Some("goblin"), json!({"amount": 4})).unwrap();
        match data {
            EventData::Damage(p) => {
                assert_eq!(p.character.as_str(), "goblin");
                assert_eq!(p.amount, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_legacy_id_field_names_the_subject() {
        let data = parse(EventKind::Heal, None, None, json!({"id": "kara", "amount": 2})).unwrap();
        assert_eq!(data.characters(), vec![&CharacterId::new("kara")]);
    }

    #[test]
    fn test_result_amount_wins() {
        let data = json!({"character_id": "a", "amount": 1});
        let result = json!({"amount": 9});
        let parsed =
            EventData::parse(EventKind::Damage, None, None, Some(&data), Some(&result)).unwrap();
        assert!(matches!(parsed, EventData::Damage(HpChange { amount: 9, .. })));
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let err = parse(EventKind::Damage, None, Some("a"), json!({"amount": -3})).unwrap_err();
        assert_eq!(err.field, "data.amount");
    }

    #[test]
    fn test_missing_subject_names_character_id() {
        let err = parse(EventKind::GainXp, None, None, json!({"skill": "mining", "amount": 5})).unwrap_err();
        assert_eq!(err.field, "data.character_id");
    }

    #[test]
    fn test_attack_requires_actor_and_target() {
        let err = parse(EventKind::Attack, Some("a"), None, json!({})).unwrap_err();
        assert_eq!(err.field, "target");
        assert!(parse(EventKind::Attack, Some("a"), Some("b"), json!({"weapon": "axe"})).is_ok());
    }

    #[test]
    fn test_create_char_checks_hp() {
        let err = parse(
            EventKind::CreateChar,
            None,
            None,
            json!({"character": {"id": "a", "name": "A", "hp": {"max": 5, "current": 6}}}),
        )
        .unwrap_err();
        assert_eq!(err.field, "data.character.hp.current");

        let err = parse(
            EventKind::CreateChar,
            None,
            None,
            json!({"character": {"id": "Bad", "name": "A", "hp": {"max": 5}}}),
        )
        .unwrap_err();
        assert_eq!(err.field, "data.character.id");
    }

    #[test]
    fn test_create_char_normalises_legacy_items() {
        let parsed = parse(
            EventKind::CreateChar,
            None,
            None,
            json!({"character": {
                "id": "a", "name": "A", "hp": {"max": 5},
                "inventory": ["rope", {"id": "arrow", "quantity": 20}]
            }}),
        )
        .unwrap();
        let EventData::CreateChar(sheet) = parsed else {
            panic!("expected create_char");
        };
        assert_eq!(sheet.hp.current, 5);
        assert_eq!(sheet.held("rope"), 1);
        assert_eq!(sheet.held("arrow"), 20);
    }

    #[test]
    fn test_gain_item_accepts_string_or_object() {
        let parsed = parse(EventKind::GainItem, Some("a"), None, json!({"item": "torch"})).unwrap();
        assert!(matches!(parsed, EventData::GainItem(ItemGain { ref item, .. }) if item.id == "torch"));

        let err = parse(
            EventKind::GainItem,
            Some("a"),
            None,
            json!({"item": {"id": "torch", "quantity": 0}}),
        )
        .unwrap_err();
        assert_eq!(err.field, "data.item.quantity");
    }

    #[test]
    fn test_trade_defaults_and_checks() {
        let parsed = parse(
            EventKind::TradeItem,
            Some("a"),
            Some("b"),
            json!({"item_id": "gem", "quantity": 2, "price": {"gold": 10}}),
        )
        .unwrap();
        let EventData::TradeItem(trade) = parsed else {
            panic!("expected trade_item");
        };
        assert_eq!(trade.from.as_str(), "a");
        assert_eq!(trade.to.as_str(), "b");
        assert_eq!(trade.items, vec![ItemStack { item_id: "gem".into(), quantity: 2 }]);
        assert_eq!(trade.price["gold"], 10);

        let err = parse(EventKind::TradeItem, Some("a"), Some("b"), json!({})).unwrap_err();
        assert_eq!(err.field, "data.items");

        let err = parse(EventKind::TradeItem, Some("a"), Some("a"), json!({"item_id": "gem"})).unwrap_err();
        assert_eq!(err.field, "data.to_character_id");
    }

    #[test]
    fn test_unknown_movement_type() {
        let err = parse(
            EventKind::CharacterMove,
            Some("a"),
            None,
            json!({"to": {"x": 1.0, "y": 2.0}, "movement_type": "teleport"}),
        )
        .unwrap_err();
        assert_eq!(err.field, "data.movement_type");
    }

    #[test]
    fn test_movement_cost_table() {
        assert_eq!(MovementType::Walk.stamina_cost(10.0), 1);
        assert_eq!(MovementType::Sprint.stamina_cost(10.0), 6);
        assert_eq!(MovementType::Sneak.stamina_cost(10.0), 2);
    }

    #[test]
    fn test_data_must_be_an_object() {
        let err = EventData::parse(EventKind::Note, None, None, Some(&json!([1, 2])), None).unwrap_err();
        assert_eq!(err.field, "data");
    }

    #[test]
    fn test_attribute_math_requires_numbers() {
        let err = parse(
            EventKind::ModifyAttribute,
            Some("a"),
            None,
            json!({"attribute": "speed", "value": "fast", "operation": "add"}),
        )
        .unwrap_err();
        assert_eq!(err.field, "data.value");
    }

    #[test]
    fn test_update_patch_rejects_unknown_fields() {
        let err = parse(
            EventKind::UpdateChar,
            Some("a"),
            None,
            json!({"patch": {"inventory": []}}),
        )
        .unwrap_err();
        assert_eq!(err.field, "data.patch");
    }

    #[test]
    fn test_custom_keeps_data_verbatim() {
        let parsed = parse(EventKind::Custom, None, None, json!({"anything": [1, 2, 3]})).unwrap();
        let EventData::Custom(map) = parsed else {
            panic!("expected custom");
        };
        assert_eq!(map["anything"], json!([1, 2, 3]));
    }

    fn sheet_error(extra: Value) -> ValidationError {
        let mut character = json!({"id": "kara", "name": "Kara", "hp": {"max": 10}});
        if let (Value::Object(sheet), Value::Object(extra)) = (&mut character, extra) {
            sheet.extend(extra);
        }
        parse(EventKind::CreateChar, None, None, json!({"character": character})).unwrap_err()
    }

    #[test]
    fn test_sheet_resources_must_be_in_range() {
        let err = sheet_error(json!({"resources": {"mana": {"max": -5, "current": 0}}}));
        assert_eq!(err.field, "data.character.resources.mana.max");

        let err = sheet_error(json!({"resources": {"mana": {"max": 5, "current": -1}}}));
        assert_eq!(err.field, "data.character.resources.mana.current");

        let err = sheet_error(json!({"resources": {"mana": {"max": 5, "current": 6}}}));
        assert_eq!(err.field, "data.character.resources.mana.current");
    }

    #[test]
    fn test_sheet_currency_must_not_be_negative() {
        let err = sheet_error(json!({"currency": {"gold": -50}}));
        assert_eq!(err.field, "data.character.currency.gold");
    }

    #[test]
    fn test_sheet_status_effects_need_a_stack() {
        let err = sheet_error(json!({"status_effects": [{"id": "poison", "stacks": 0}]}));
        assert_eq!(err.field, "data.character.status_effects[0].stacks");
    }

    #[test]
    fn test_ability_costs_must_not_be_negative() {
        let err = sheet_error(json!({
            "abilities": [{"id": "fireball", "name": "Fireball", "cost": {"mana": -5}}]
        }));
        assert_eq!(err.field, "data.character.abilities[0].cost.mana");

        let err = parse(
            EventKind::LearnAbility,
            Some("kara"),
            None,
            json!({"ability": {"id": "fireball", "name": "Fireball", "cost": {"mana": -5}}}),
        )
        .unwrap_err();
        assert_eq!(err.field, "data.ability.cost.mana");
    }

    #[test]
    fn test_valid_sheet_is_accepted() {
        let data = json!({"character": {
            "id": "kara",
            "name": "Kara",
            "hp": {"max": 10},
            "resources": {"mana": {"max": 5, "current": 5}},
            "currency": {"gold": 0},
            "abilities": [{"id": "fireball", "name": "Fireball", "cost": {"mana": 3}}]
        }});
        assert!(parse(EventKind::CreateChar, None, None, data).is_ok());
    }
}
