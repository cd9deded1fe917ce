//! Purchasable global upgrades: belt speed, mine efficiency and extra mines.
//!
//! Each upgrade has a use counter capped at the table's `max_uses`, and a
//! cost schedule indexed by how many uses have been spent so far. The
//! effects of speed and efficiency are never stored on individual
//! structures; they are derived from the counters as a list of
//! [`UpgradeEffect`]s and folded at the point of use. Reloading a save
//! therefore re-derives exactly the same effects without replaying
//! purchases.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, f64_to_fixed64, pow_fixed};
use crate::id::Value;

// ---------------------------------------------------------------------------
// Kinds and errors
// ---------------------------------------------------------------------------

/// The three purchasable upgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeKind {
    Speed,
    Efficiency,
    Mine,
}

impl UpgradeKind {
    pub fn all() -> [UpgradeKind; 3] {
        [UpgradeKind::Speed, UpgradeKind::Efficiency, UpgradeKind::Mine]
    }
}

/// Why an upgrade attempt did not go through this frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error("{0:?} upgrade has no uses left")]
    Capped(UpgradeKind),
    #[error("need {needed} points, have {available}")]
    InsufficientPoints { needed: i64, available: i64 },
    #[error("no structure or conveyor the upgrade could affect")]
    NoEligibleTarget,
    #[error("no empty cell for a new mine")]
    NoEmptyCell,
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// How many times each upgrade has been bought. Persisted verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpgradeCounters {
    #[serde(default)]
    pub speed_uses_used: u32,
    #[serde(default)]
    pub eff_uses_used: u32,
    #[serde(default)]
    pub mine_uses_used: u32,
}

impl UpgradeCounters {
    pub fn uses(&self, kind: UpgradeKind) -> u32 {
        match kind {
            UpgradeKind::Speed => self.speed_uses_used,
            UpgradeKind::Efficiency => self.eff_uses_used,
            UpgradeKind::Mine => self.mine_uses_used,
        }
    }

    pub(crate) fn increment(&mut self, kind: UpgradeKind) {
        let counter = match kind {
            UpgradeKind::Speed => &mut self.speed_uses_used,
            UpgradeKind::Efficiency => &mut self.eff_uses_used,
            UpgradeKind::Mine => &mut self.mine_uses_used,
        };
        *counter = counter.saturating_add(1);
    }
}

// ---------------------------------------------------------------------------
// Cost table
// ---------------------------------------------------------------------------

/// Costs and magnitudes of every upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeTable {
    /// Uses allowed per upgrade kind.
    pub max_uses: u32,
    /// Cost of the n-th speed upgrade, indexed by uses already spent.
    pub speed_costs: Vec<i64>,
    pub efficiency_costs: Vec<i64>,
    pub mine_costs: Vec<i64>,
    /// Multiplier applied to belt travel time and the production interval
    /// per speed use.
    pub speed_factor: f64,
    /// Added to mine output and well requirements per efficiency use.
    pub efficiency_bonus: Value,
    /// Value of the n-th purchased mine.
    pub mine_values: Vec<Value>,
}

impl Default for UpgradeTable {
    fn default() -> Self {
        Self {
            max_uses: 10,
            speed_costs: vec![20, 40, 70, 110, 160, 220, 290, 370, 460, 560],
            efficiency_costs: vec![30, 60, 100, 150, 210, 280, 360, 450, 550, 660],
            mine_costs: vec![50, 100, 150, 200, 250, 300, 350, 400, 450, 500],
            speed_factor: 0.9,
            efficiency_bonus: 1,
            mine_values: vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29],
        }
    }
}

impl UpgradeTable {
    fn schedule(&self, kind: UpgradeKind) -> &[i64] {
        match kind {
            UpgradeKind::Speed => &self.speed_costs,
            UpgradeKind::Efficiency => &self.efficiency_costs,
            UpgradeKind::Mine => &self.mine_costs,
        }
    }

    /// Cost of the next use, or `None` when the upgrade is capped.
    pub fn next_cost(&self, kind: UpgradeKind, counters: &UpgradeCounters) -> Option<i64> {
        let used = counters.uses(kind);
        if used >= self.max_uses {
            return None;
        }
        self.schedule(kind).get(used as usize).copied()
    }

    /// Uses left before the cap.
    pub fn remaining(&self, kind: UpgradeKind, counters: &UpgradeCounters) -> u32 {
        self.max_uses.saturating_sub(counters.uses(kind))
    }

    /// Value of the next purchased mine.
    pub fn next_mine_value(&self, counters: &UpgradeCounters) -> Option<Value> {
        self.mine_values.get(counters.mine_uses_used as usize).copied()
    }

    /// Re-derive the active effects from the counters: one folded entry per
    /// upgrade kind that has been used at least once.
    pub fn effects(&self, counters: &UpgradeCounters) -> Vec<UpgradeEffect> {
        let mut effects = Vec::with_capacity(2);
        if counters.speed_uses_used > 0 {
            effects.push(UpgradeEffect::Speed {
                factor: pow_fixed(f64_to_fixed64(self.speed_factor), counters.speed_uses_used),
            });
        }
        if counters.eff_uses_used > 0 {
            effects.push(UpgradeEffect::Efficiency {
                bonus: self
                    .efficiency_bonus
                    .saturating_mul(Value::from(counters.eff_uses_used)),
            });
        }
        effects
    }

    /// The first kind whose counter exceeds `max_uses`, with its count.
    pub fn over_cap(&self, counters: &UpgradeCounters) -> Option<(UpgradeKind, u32)> {
        UpgradeKind::all()
            .into_iter()
            .map(|kind| (kind, counters.uses(kind)))
            .find(|&(_, uses)| uses > self.max_uses)
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// The combined effect of every use of a speed or efficiency upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeEffect {
    /// Multiplies belt travel time and the production interval.
    Speed { factor: Fixed64 },
    /// Added to mine output and well requirements.
    Efficiency { bonus: Value },
}

/// Product of every speed factor. One when no speed upgrade is active.
pub fn speed_factor(effects: &[UpgradeEffect]) -> Fixed64 {
    effects.iter().fold(Fixed64::ONE, |acc, e| match e {
        UpgradeEffect::Speed { factor } => acc.saturating_mul(*factor),
        UpgradeEffect::Efficiency { .. } => acc,
    })
}

/// Sum of every efficiency bonus.
pub fn efficiency_bonus(effects: &[UpgradeEffect]) -> Value {
    effects.iter().fold(0, |acc: Value, e| match e {
        UpgradeEffect::Efficiency { bonus } => acc.saturating_add(*bonus),
        UpgradeEffect::Speed { .. } => acc,
    })
}
