//! Character snapshot and the value types it is built from
//!
//! A `CharacterSnapshot` is the reducer's working copy of one character. It is
//! never stored on its own: it is created from a `create_char` payload and then
//! only changed by later events that reference its id.

use crate::error::ReductionWarning;
use crate::identity::CharacterId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Open key/value data carried verbatim (attributes, item properties)
pub type ValueMap = IndexMap<String, serde_json::Value>;

/// Hit points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hp {
    pub max: i64,
    pub current: i64,
    /// Temporary hit points, drained before `current`
    #[serde(default)]
    pub temp: i64,
}

impl Hp {
    /// Full health with no temporary hit points
    pub fn full(max: i64) -> Self {
        Self {
            max,
            current: max,
            temp: 0,
        }
    }
}

impl Default for Hp {
    fn default() -> Self {
        Self::full(0)
    }
}

/// A named pool such as mana or stamina
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub max: i64,
    pub current: i64,
}

impl Resource {
    pub fn full(max: i64) -> Self {
        Self { max, current: max }
    }

    /// Add a signed amount, keeping `current` within `0..=max`
    pub fn adjust(&mut self, delta: i64) {
        self.current = self.current.saturating_add(delta).clamp(0, self.max.max(0));
    }
}

/// Broad item category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Weapon,
    Armor,
    Consumable,
    Material,
    Quest,
    #[default]
    Misc,
}

/// A stack of identical items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: ItemKind,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: ValueMap,
}

fn one() -> u32 {
    1
}

impl Item {
    /// A single plain item with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: ItemKind::Misc,
            quantity: 1,
            weight: None,
            value: None,
            rarity: None,
            properties: ValueMap::new(),
        }
    }

    /// Same item, different stack size
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
}

/// Progress in one skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    #[serde(default = "one")]
    pub level: u32,
    #[serde(default)]
    pub xp: u64,
}

impl Default for Skill {
    fn default() -> Self {
        Self { level: 1, xp: 0 }
    }
}

/// Whether a status effect helps or hurts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Buff,
    Debuff,
    #[default]
    Neutral,
}

/// An active buff or debuff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: EffectKind,
    /// Remaining turns; `None` lasts until removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default = "one")]
    pub stacks: u32,
    /// Per-effect stack cap, overriding the reducer default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stacks: Option<u32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub modifiers: IndexMap<String, i64>,
}

/// Kind of ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbilityKind {
    Spell,
    #[default]
    Ability,
    Skill,
    Passive,
}

/// A spell, power or technique a character knows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: AbilityKind,
    /// Resource cost per use, e.g. `{"mana": 5}`
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub cost: IndexMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// World position
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

impl Location {
    /// Euclidean distance in three dimensions
    pub fn distance_to(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// The reducer's representation of one character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: CharacterId,
    pub name: String,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(default, alias = "lvl", skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Named ability scores (STR, DEX, ...)
    #[serde(default)]
    pub stats: IndexMap<String, i64>,
    /// Derived or custom attributes (speed, armor_class, ...)
    #[serde(default)]
    pub attributes: ValueMap,
    #[serde(default)]
    pub hp: Hp,
    #[serde(default)]
    pub resources: IndexMap<String, Resource>,
    #[serde(default)]
    pub inventory: Vec<Item>,
    /// Slot -> equipped item; an equipped item is not part of `inventory`
    #[serde(default)]
    pub equipment: IndexMap<String, Item>,
    #[serde(default)]
    pub skills: IndexMap<String, Skill>,
    #[serde(default)]
    pub abilities: Vec<Ability>,
    #[serde(default)]
    pub known_recipes: Vec<String>,
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
    #[serde(default)]
    pub currency: IndexMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CharacterSnapshot {
    /// A bare character with the given id, name and maximum hp
    pub fn new(id: impl Into<CharacterId>, name: impl Into<String>, max_hp: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class_name: None,
            race: None,
            level: None,
            stats: IndexMap::new(),
            attributes: ValueMap::new(),
            hp: Hp::full(max_hp),
            resources: IndexMap::new(),
            inventory: Vec::new(),
            equipment: IndexMap::new(),
            skills: IndexMap::new(),
            abilities: Vec::new(),
            known_recipes: Vec::new(),
            status_effects: Vec::new(),
            currency: IndexMap::new(),
            location: None,
            tags: Vec::new(),
            notes: None,
        }
    }

    // ========================================================================
    // Inventory
    // ========================================================================

    /// Units of `item_id` in general inventory (equipped items excluded)
    pub fn held(&self, item_id: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|i| i.id == item_id)
            .map(|i| i.quantity)
            .sum()
    }

    /// Add a stack, merging into an existing stack with the same id
    pub fn add_item(&mut self, item: Item) {
        if item.quantity == 0 {
            return;
        }
        match self.inventory.iter_mut().find(|i| i.id == item.id) {
            Some(stack) => stack.quantity = stack.quantity.saturating_add(item.quantity),
            None => self.inventory.push(item),
        }
    }

    /// Take exactly `quantity` units out of inventory
    ///
    /// Returns the removed units as one stack, or a warning (and no change)
    /// when fewer are held.
    pub fn take_item(&mut self, item_id: &str, quantity: u32) -> Result<Item, ReductionWarning> {
        let held = self.held(item_id);
        if held == 0 {
            return Err(ReductionWarning::ItemNotHeld {
                character: self.id.clone(),
                item: item_id.to_string(),
            });
        }
        if held < quantity {
            return Err(ReductionWarning::InsufficientQuantity {
                character: self.id.clone(),
                item: item_id.to_string(),
                needed: quantity,
                held,
            });
        }
        Ok(self.remove_up_to(item_id, quantity))
    }

    /// Remove up to `quantity` units, dropping emptied stacks
    ///
    /// The returned stack carries the number of units actually removed.
    pub fn remove_up_to(&mut self, item_id: &str, quantity: u32) -> Item {
        let mut template: Option<Item> = None;
        let mut remaining = quantity;
        for stack in self.inventory.iter_mut().filter(|i| i.id == item_id) {
            if template.is_none() {
                template = Some(stack.clone());
            }
            let taken = stack.quantity.min(remaining);
            stack.quantity -= taken;
            remaining -= taken;
            if remaining == 0 {
                break;
            }
        }
        self.inventory.retain(|i| i.quantity > 0);
        template
            .unwrap_or_else(|| Item::new(item_id))
            .with_quantity(quantity - remaining)
    }

    // ========================================================================
    // Currency
    // ========================================================================

    /// Current balance of a currency (0 when never seen)
    pub fn balance(&self, currency: &str) -> i64 {
        self.currency.get(currency).copied().unwrap_or(0)
    }

    /// Add a signed amount to a balance; balances never go negative
    pub fn adjust_currency(&mut self, currency: &str, delta: i64) -> Result<(), ReductionWarning> {
        let held = self.balance(currency);
        let balance = held
            .checked_add(delta)
            .ok_or_else(|| ReductionWarning::CurrencyOverflow {
                character: self.id.clone(),
                currency: currency.to_string(),
                held,
                delta,
            })?;
        if balance < 0 {
            return Err(ReductionWarning::InsufficientCurrency {
                character: self.id.clone(),
                currency: currency.to_string(),
                needed: delta.saturating_neg(),
                held,
            });
        }
        self.currency.insert(currency.to_string(), balance);
        Ok(())
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Look up a resource pool mutably, or warn that it does not exist
    pub fn resource_mut(&mut self, name: &str) -> Result<&mut Resource, ReductionWarning> {
        let character = self.id.clone();
        self.resources
            .get_mut(name)
            .ok_or_else(|| ReductionWarning::UnknownResource {
                character,
                resource: name.to_string(),
            })
    }

    /// Check that every pool in `cost` can cover its amount
    pub fn can_afford(&self, cost: &IndexMap<String, i64>) -> Result<(), ReductionWarning> {
        for (name, &amount) in cost {
            let pool = self
                .resources
                .get(name)
                .ok_or_else(|| ReductionWarning::UnknownResource {
                    character: self.id.clone(),
                    resource: name.clone(),
                })?;
            if pool.current < amount {
                return Err(ReductionWarning::InsufficientResource {
                    character: self.id.clone(),
                    resource: name.clone(),
                    needed: amount,
                    held: pool.current,
                });
            }
        }
        Ok(())
    }

    /// Deduct a multi-pool cost, all or nothing
    pub fn spend(&mut self, cost: &IndexMap<String, i64>) -> Result<(), ReductionWarning> {
        self.can_afford(cost)?;
        for (name, &amount) in cost {
            if let Some(pool) = self.resources.get_mut(name) {
                pool.adjust(amount.saturating_neg());
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Find a known ability by id
    pub fn ability(&self, ability_id: &str) -> Option<&Ability> {
        self.abilities.iter().find(|a| a.id == ability_id)
    }

    /// Find an active status effect by id
    pub fn status(&self, effect_id: &str) -> Option<&StatusEffect> {
        self.status_effects.iter().find(|e| e.id == effect_id)
    }

    /// Whether a recipe has been learned
    pub fn knows_recipe(&self, recipe_id: &str) -> bool {
        self.known_recipes.iter().any(|r| r == recipe_id)
    }
}
