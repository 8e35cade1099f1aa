//! Skill progression: XP thresholds, tiers and derived level-ups
//!
//! Level `L` requires cumulative XP
//! `T(L) = floor( sum_{n=1}^{L-1} floor(n + 300 * 2^(n/7)) / 4 )`,
//! so `T(2) = 83`, `T(10) = 1154` and `T(99) = 13_034_431`.
//!
//! Level-ups are never stored as events. They are recomputed on demand by
//! diffing skill levels between two states with [`level_ups`].

use crate::character::Skill;
use crate::identity::CharacterId;
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Highest reachable skill level
pub const MAX_LEVEL: u32 = 120;

/// `XP_TABLE[L]` is the cumulative XP needed for level `L` (index 0 unused)
static XP_TABLE: LazyLock<Vec<u64>> = LazyLock::new(|| {
    let mut table = vec![0u64; MAX_LEVEL as usize + 1];
    let mut points: u64 = 0;
    for level in 2..=MAX_LEVEL as usize {
        let n = (level - 1) as f64;
        points += (n + 300.0 * 2f64.powf(n / 7.0)).floor() as u64;
        table[level] = points / 4;
    }
    table
});

/// Cumulative XP required to reach `level` (levels above the cap use the cap)
pub fn xp_for_level(level: u32) -> u64 {
    XP_TABLE[level.clamp(1, MAX_LEVEL) as usize]
}

/// The level reached with `xp` total XP, never above `cap`
pub fn level_for_xp(xp: u64, cap: u32) -> u32 {
    let cap = cap.clamp(1, MAX_LEVEL) as usize;
    // Levels 1..=cap whose threshold is <= xp form a prefix of the table
    let reached = XP_TABLE[1..=cap].partition_point(|&needed| needed <= xp);
    reached.max(1) as u32
}

/// Add XP to a skill and recompute its level
///
/// The level never decreases: a skill whose stored level is already above the
/// level its XP implies (e.g. seeded that way by `create_char`) keeps it.
/// Returns `(old_level, new_level)`.
pub fn grant_xp(skill: &mut Skill, amount: u64, cap: u32) -> (u32, u32) {
    let old = skill.level;
    skill.xp = skill.xp.saturating_add(amount);
    skill.level = old.max(level_for_xp(skill.xp, cap));
    (old, skill.level)
}

/// Raise a skill by whole levels, lifting XP to the new level's threshold
pub fn raise_levels(skill: &mut Skill, levels: u32, cap: u32) -> (u32, u32) {
    let old = skill.level;
    let target = old.saturating_add(levels).min(cap.clamp(1, MAX_LEVEL)).max(old);
    skill.level = target;
    skill.xp = skill.xp.max(xp_for_level(target));
    (old, target)
}

/// XP still needed for the next level (0 at the cap)
pub fn xp_to_next(skill: &Skill) -> u64 {
    if skill.level >= MAX_LEVEL {
        return 0;
    }
    xp_for_level(skill.level + 1).saturating_sub(skill.xp)
}

/// Fraction of the way from the current level to the next, in `[0, 1]`
pub fn progress_to_next(skill: &Skill) -> f64 {
    if skill.level >= MAX_LEVEL {
        return 1.0;
    }
    let floor = xp_for_level(skill.level);
    let ceiling = xp_for_level(skill.level + 1);
    let span = ceiling.saturating_sub(floor);
    if span == 0 {
        return 0.0;
    }
    (skill.xp.saturating_sub(floor) as f64 / span as f64).clamp(0.0, 1.0)
}

/// Check bonus granted by a level: +1 per ten levels
pub fn bonus(level: u32) -> u32 {
    level / 10
}

/// Level-gated quality bracket for equipment and resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Iron,
    Steel,
    Mithril,
    Adamant,
    Rune,
    Dragon,
}

impl Tier {
    /// All tiers, lowest first
    pub const ALL: [Tier; 7] = [
        Tier::Bronze,
        Tier::Iron,
        Tier::Steel,
        Tier::Mithril,
        Tier::Adamant,
        Tier::Rune,
        Tier::Dragon,
    ];

    /// Minimum level that unlocks this tier
    pub fn level_required(&self) -> u32 {
        match self {
            Tier::Bronze => 1,
            Tier::Iron => 15,
            Tier::Steel => 30,
            Tier::Mithril => 50,
            Tier::Adamant => 70,
            Tier::Rune => 90,
            Tier::Dragon => 99,
        }
    }

    /// Highest tier unlocked at `level`
    pub fn for_level(level: u32) -> Tier {
        Tier::ALL
            .iter()
            .rev()
            .find(|t| level >= t.level_required())
            .copied()
            .unwrap_or(Tier::Bronze)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Bronze => "bronze",
            Tier::Iron => "iron",
            Tier::Steel => "steel",
            Tier::Mithril => "mithril",
            Tier::Adamant => "adamant",
            Tier::Rune => "rune",
            Tier::Dragon => "dragon",
        };
        f.write_str(name)
    }
}

/// A level increase observed between two states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub character: CharacterId,
    pub skill: String,
    pub from: u32,
    pub to: u32,
    /// Tier reached at the new level
    pub tier: Tier,
}

/// Diff skill levels between two states
///
/// Skills that did not exist in `before` count as rising from level 1.
/// Characters absent from `after` are ignored.
pub fn level_ups(before: &State, after: &State) -> Vec<LevelUp> {
    let mut ups = Vec::new();
    for (id, character) in &after.characters {
        let previous = before.characters.get(id);
        for (name, skill) in &character.skills {
            let from = previous
                .and_then(|c| c.skills.get(name))
                .map(|s| s.level)
                .unwrap_or(1);
            if skill.level > from {
                ups.push(LevelUp {
                    character: id.clone(),
                    skill: name.clone(),
                    from,
                    to: skill.level,
                    tier: Tier::for_level(skill.level),
                });
            }
        }
    }
    ups
}

/// Sum of all skill levels of one character
pub fn total_level(skills: &indexmap::IndexMap<String, Skill>) -> u32 {
    skills.values().map(|s| s.level).sum()
}
