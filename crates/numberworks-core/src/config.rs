//! Game configuration loaded from TOML.
//!
//! Every field has a default, so an empty document (or a partial one) yields
//! a playable configuration. [`GameConfig::validate`] rejects values the
//! simulation cannot run with; loaders call it before handing the config
//! out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::BuildKind;
use crate::event::DEFAULT_EVENT_CAPACITY;
use crate::fixed::Millis;
use crate::id::{GridPos, Value};
use crate::upgrade::UpgradeTable;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Limits on the upgrade action queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLimits {
    /// Attempts made per frame at most.
    pub actions_per_frame: u32,
    /// Failed attempts before an action is dropped.
    pub max_tries: u32,
}

impl Default for ActionLimits {
    fn default() -> Self {
        Self {
            actions_per_frame: 5,
            max_tries: 3,
        }
    }
}

/// Point costs of player-built structures and belts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildCosts {
    pub sum: i64,
    pub multiply: i64,
    pub divide: i64,
    pub splitter: i64,
    pub merger: i64,
    /// Charged per cell of manhattan length.
    pub conveyor_per_cell: i64,
}

impl Default for BuildCosts {
    fn default() -> Self {
        Self {
            sum: 10,
            multiply: 20,
            divide: 20,
            splitter: 5,
            merger: 5,
            conveyor_per_cell: 1,
        }
    }
}

impl BuildCosts {
    pub fn cost(&self, kind: BuildKind) -> i64 {
        match kind {
            BuildKind::Sum => self.sum,
            BuildKind::Multiply => self.multiply,
            BuildKind::Divide => self.divide,
            BuildKind::Splitter => self.splitter,
            BuildKind::Merger => self.merger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineSpec {
    pub x: i32,
    pub y: i32,
    pub number: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellSpec {
    pub x: i32,
    pub y: i32,
    pub consuming_number: Value,
}

/// Score a player must reach before wells requiring `consuming_number`
/// unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub consuming_number: Value,
    pub required_score: i64,
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    /// Pixel size of a cell. Conveyor endpoints are stored at cell centers.
    pub cell_size: u32,
    /// Milliseconds between production ticks, before speed upgrades.
    pub production_interval_ms: Millis,
    /// Base travel time of a belt per cell of manhattan length.
    pub conveyor_ms_per_cell: Millis,
    pub starting_points: i64,
    /// Undrained event records kept before the oldest are evicted.
    pub event_capacity: usize,
    pub upgrades: UpgradeTable,
    pub actions: ActionLimits,
    pub build_costs: BuildCosts,
    pub starting_mines: Vec<MineSpec>,
    pub starting_wells: Vec<WellSpec>,
    pub objectives: Vec<Objective>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mine = |x, y, number| MineSpec { x, y, number };
        let well = |x, y, consuming_number| WellSpec {
            x,
            y,
            consuming_number,
        };
        Self {
            grid_width: 16,
            grid_height: 12,
            cell_size: 64,
            production_interval_ms: 2000,
            conveyor_ms_per_cell: 1000,
            starting_points: 0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            upgrades: UpgradeTable::default(),
            actions: ActionLimits::default(),
            build_costs: BuildCosts::default(),
            starting_mines: vec![mine(1, 2, 2), mine(1, 5, 3), mine(1, 8, 5)],
            starting_wells: vec![well(14, 2, 2), well(14, 5, 3), well(14, 8, 6), well(14, 10, 10)],
            objectives: vec![
                Objective {
                    consuming_number: 6,
                    required_score: 50,
                },
                Objective {
                    consuming_number: 10,
                    required_score: 200,
                },
            ],
        }
    }
}

impl GameConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(
            target: "numberworks::config",
            path = %path.display(),
            "config.loaded"
        );
        Ok(config)
    }

    /// Required score for wells consuming `number`, if it is an objective.
    pub fn objective_for(&self, number: Value) -> Option<i64> {
        self.objectives
            .iter()
            .find(|o| o.consuming_number == number)
            .map(|o| o.required_score)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.grid_width == 0 || self.grid_height == 0 {
            return invalid(format!(
                "grid must be non-empty, got {}x{}",
                self.grid_width, self.grid_height
            ));
        }
        if self.cell_size == 0 {
            return invalid("cell_size must be positive".into());
        }
        if self.production_interval_ms == 0 {
            return invalid("production_interval_ms must be positive".into());
        }
        if self.event_capacity == 0 {
            return invalid("event_capacity must be positive".into());
        }
        if self.actions.actions_per_frame == 0 {
            return invalid("actions.actions_per_frame must be positive".into());
        }
        if self.actions.max_tries == 0 {
            return invalid("actions.max_tries must be positive".into());
        }
        let factor = self.upgrades.speed_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return invalid(format!("upgrades.speed_factor must be in (0, 1], got {factor}"));
        }
        let schedules = [
            ("speed_costs", &self.upgrades.speed_costs),
            ("efficiency_costs", &self.upgrades.efficiency_costs),
            ("mine_costs", &self.upgrades.mine_costs),
        ];
        for (name, costs) in schedules {
            if costs.iter().any(|&c| c < 0) {
                return invalid(format!("upgrades.{name} contains a negative cost"));
            }
        }
        let b = &self.build_costs;
        if [b.sum, b.multiply, b.divide, b.splitter, b.merger, b.conveyor_per_cell]
            .iter()
            .any(|&c| c < 0)
        {
            return invalid("build_costs contains a negative cost".into());
        }

        let mut seen = HashSet::new();
        let positions = self
            .starting_mines
            .iter()
            .map(|m| GridPos::new(m.x, m.y))
            .chain(self.starting_wells.iter().map(|w| GridPos::new(w.x, w.y)));
        for pos in positions {
            let in_bounds = pos.x >= 0
                && pos.y >= 0
                && (pos.x as u32) < self.grid_width
                && (pos.y as u32) < self.grid_height;
            if !in_bounds {
                return invalid(format!("starting structure at {pos:?} is outside the grid"));
            }
            if !seen.insert(pos) {
                return invalid(format!("two starting structures share cell {pos:?}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = GameConfig::from_toml_str("").unwrap();
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.cell_size, 64);
        assert_eq!(config.upgrades.max_uses, 10);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = GameConfig::from_toml_str(
            r#"
            grid_width = 8
            starting_points = 100

            [actions]
            max_tries = 7

            [upgrades]
            efficiency_bonus = 2

            [[objectives]]
            consuming_number = 4
            required_score = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.grid_width, 8);
        assert_eq!(config.grid_height, 12);
        assert_eq!(config.starting_points, 100);
        assert_eq!(config.actions.max_tries, 7);
        assert_eq!(config.actions.actions_per_frame, 5);
        assert_eq!(config.upgrades.efficiency_bonus, 2);
        assert_eq!(config.upgrades.speed_costs.len(), 10);
        assert_eq!(config.objective_for(4), Some(9));
        assert_eq!(config.objective_for(6), None);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = GameConfig::from_toml_str("grid_width = \"wide\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let err = GameConfig::from_toml_str("production_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn event_capacity_must_be_positive() {
        let err = GameConfig::from_toml_str("event_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let config = GameConfig::from_toml_str("event_capacity = 16").unwrap();
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn speed_factor_out_of_range() {
        for bad in ["0.0", "1.5", "-0.5"] {
            let doc = format!("[upgrades]\nspeed_factor = {bad}");
            assert!(
                matches!(GameConfig::from_toml_str(&doc), Err(ConfigError::Invalid(_))),
                "speed_factor {bad} accepted"
            );
        }
    }

    #[test]
    fn overlapping_start_layout_is_invalid() {
        let mut config = GameConfig::default();
        config.starting_wells.push(WellSpec {
            x: 1,
            y: 2,
            consuming_number: 4,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn start_layout_out_of_bounds_is_invalid() {
        let mut config = GameConfig::default();
        config.grid_width = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = GameConfig::from_path("/nonexistent/numberworks.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn build_costs_by_kind() {
        let costs = BuildCosts::default();
        assert_eq!(costs.cost(BuildKind::Sum), 10);
        assert_eq!(costs.cost(BuildKind::Divide), 20);
        assert_eq!(costs.cost(BuildKind::Merger), 5);
    }
}
