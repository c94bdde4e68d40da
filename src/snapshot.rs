//! Snapshot and decision value types.
//!
//! A [`Snapshot`] is an immutable picture of the game world at one tick. It is
//! produced by the ingress bridge, consumed read-only by every tier during one
//! decision, and discarded afterwards. Nothing in this module is shared across
//! decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Decision tiers in ascending cost and escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Sub-millisecond emergency reactions. Never skipped.
    Reflex,
    /// Deterministic tactical rules (<10ms target).
    Rule,
    /// Learned model scoring (<100ms target).
    Learned,
    /// Slow strategic planner (seconds).
    Strategic,
}

impl Tier {
    /// All tiers in escalation order.
    pub fn all() -> &'static [Tier] {
        &[Tier::Reflex, Tier::Rule, Tier::Learned, Tier::Strategic]
    }

    /// The next, more expensive tier.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Reflex => Some(Tier::Rule),
            Tier::Rule => Some(Tier::Learned),
            Tier::Learned => Some(Tier::Strategic),
            Tier::Strategic => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Reflex => write!(f, "reflex"),
            Tier::Rule => write!(f, "rule"),
            Tier::Learned => write!(f, "learned"),
            Tier::Strategic => write!(f, "strategic"),
        }
    }
}

/// Request priority. A hint for the starting tier after the reflex check;
/// never causes the reflex tier to be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Map position of an actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub map: String,
    pub x: i32,
    pub y: i32,
}

/// The controlled character's state at snapshot time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterState {
    pub name: String,
    pub level: u32,
    pub hp: u32,
    pub max_hp: u32,
    pub sp: u32,
    pub max_sp: u32,
    pub position: Position,
    pub weight: u32,
    pub max_weight: u32,
    pub zeny: u64,
    pub job_class: String,
    pub status_effects: Vec<String>,
}

/// A monster visible in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monster {
    pub id: String,
    pub name: String,
    pub hp: u32,
    pub max_hp: u32,
    pub distance: u32,
    pub is_aggressive: bool,
}

/// An inventory stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: String,
    pub name: String,
    pub amount: u32,
}

/// Another player visible in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyPlayer {
    pub name: String,
    pub level: u32,
    pub distance: u32,
    pub is_party_member: bool,
}

/// Immutable world-state snapshot for one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub character: CharacterState,
    pub monsters: Vec<Monster>,
    pub inventory: Vec<ItemStack>,
    pub nearby_players: Vec<NearbyPlayer>,
}

impl Snapshot {
    /// Create a snapshot for the given character with no surroundings.
    pub fn new(character: CharacterState) -> Self {
        Self {
            captured_at: Utc::now(),
            character,
            monsters: Vec::new(),
            inventory: Vec::new(),
            nearby_players: Vec::new(),
        }
    }

    /// HP as a fraction of max (0.0 when max is unknown).
    pub fn hp_ratio(&self) -> f64 {
        ratio(self.character.hp, self.character.max_hp)
    }

    /// SP as a fraction of max (0.0 when max is unknown).
    pub fn sp_ratio(&self) -> f64 {
        ratio(self.character.sp, self.character.max_sp)
    }

    /// Carried weight as a fraction of max (0.0 when max is unknown).
    pub fn weight_ratio(&self) -> f64 {
        ratio(self.character.weight, self.character.max_weight)
    }

    /// Whether an aggressive monster is within `range`.
    pub fn under_attack(&self, range: u32) -> bool {
        self.monsters
            .iter()
            .any(|m| m.is_aggressive && m.distance <= range)
    }
}

fn ratio(value: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        f64::from(value) / f64::from(max)
    }
}

/// Kind of action handed to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Attack,
    Skill,
    Move,
    UseItem,
    Command,
    Talk,
    Sit,
    Stand,
    None,
}

/// The chosen next action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub parameters: BTreeMap<String, String>,
    pub reason: String,
}

impl Action {
    /// Create an action with a single named parameter.
    pub fn with_param(kind: ActionKind, key: &str, value: &str, reason: impl Into<String>) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(key.to_string(), value.to_string());
        Self {
            kind,
            parameters,
            reason: reason.into(),
        }
    }

    /// The safe no-op action.
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::None,
            parameters: BTreeMap::new(),
            reason: reason.into(),
        }
    }
}

/// One decision request: a snapshot plus a deadline measured from call entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Unique request id.
    pub id: String,
    pub snapshot: Snapshot,
    pub priority: Priority,
    /// Total time budget for this decision. Zero means "fallback now".
    pub deadline: Duration,
}

impl DecisionRequest {
    /// Create a request with a fresh uuid.
    pub fn new(snapshot: Snapshot, priority: Priority, deadline: Duration) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            snapshot,
            priority,
            deadline,
        }
    }
}

/// The result of one decision. Always produced, even in total failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub request_id: String,
    pub action: Action,
    pub tier_used: Tier,
    /// Wall-clock time spent inside `decide()`.
    pub elapsed: Duration,
    /// Confidence in [0, 1]. Zero for the fallback.
    pub confidence: f64,
    /// Human-readable path description, including per-tier outcomes.
    pub rationale: String,
    /// Whether this is the static safe fallback rather than a tier result.
    pub fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Reflex < Tier::Rule);
        assert!(Tier::Rule < Tier::Learned);
        assert!(Tier::Learned < Tier::Strategic);
        assert_eq!(Tier::all().len(), 4);
    }

    #[test]
    fn test_tier_next_chain() {
        assert_eq!(Tier::Reflex.next(), Some(Tier::Rule));
        assert_eq!(Tier::Rule.next(), Some(Tier::Learned));
        assert_eq!(Tier::Learned.next(), Some(Tier::Strategic));
        assert_eq!(Tier::Strategic.next(), None);
    }

    #[test]
    fn test_ratios_guard_zero_max() {
        let snapshot = Snapshot::new(CharacterState::default());
        assert_eq!(snapshot.hp_ratio(), 0.0);
        assert_eq!(snapshot.sp_ratio(), 0.0);
        assert_eq!(snapshot.weight_ratio(), 0.0);
    }

    #[test]
    fn test_under_attack_respects_range() {
        let mut snapshot = Snapshot::new(CharacterState::default());
        snapshot.monsters.push(Monster {
            id: "m1".to_string(),
            name: "Poring".to_string(),
            hp: 50,
            max_hp: 50,
            distance: 8,
            is_aggressive: true,
        });
        assert!(!snapshot.under_attack(5));
        assert!(snapshot.under_attack(10));
    }

    #[test]
    fn test_action_none_is_safe() {
        let action = Action::none("fallback");
        assert_eq!(action.kind, ActionKind::None);
        assert!(action.parameters.is_empty());
    }

    #[test]
    fn test_tier_serde_snake_case() {
        let json = serde_json::to_string(&Tier::Strategic).unwrap();
        assert_eq!(json, "\"strategic\"");
        let back: Tier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Tier::Strategic);
    }
}
