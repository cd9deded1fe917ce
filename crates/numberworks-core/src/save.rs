//! JSON save files.
//!
//! A save records the grid by class name and *base* values, belts by the
//! grid cells of their endpoints, the upgrade counters and the score. Port
//! bindings, upgrade effects and tokens in transit are not stored: loading
//! rebuilds the grid and belts, rewires, and re-derives the effects from the
//! counters. A save taken after N efficiency upgrades therefore loads with
//! exactly N applied.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, GameConfig};
use crate::conveyor::{Conveyor, Conveyors};
use crate::engine::Engine;
use crate::fixed::Millis;
use crate::grid::{Grid, PlaceError};
use crate::id::{GridPos, PixelPos, Value};
use crate::structure::{Operation, Structure, StructureKind};
use crate::upgrade::{UpgradeCounters, UpgradeKind};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown structure class: {0}")]
    UnknownClass(String),
    #[error("{class} at {pos:?} is missing `{field}`")]
    MissingField {
        class: String,
        pos: GridPos,
        field: &'static str,
    },
    #[error("grid is {rows} rows of {columns:?} cells, expected {height} rows of {width}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        rows: usize,
        columns: Vec<usize>,
    },
    #[error("conveyor {index} runs {start:?} -> {end:?}, outside the {width}x{height} grid")]
    ConveyorOutOfBounds {
        index: usize,
        start: [i32; 2],
        end: [i32; 2],
        width: u32,
        height: u32,
    },
    #[error("{kind:?} upgrade used {uses} times, the cap is {max_uses}")]
    UpgradeOverCap {
        kind: UpgradeKind,
        uses: u32,
        max_uses: u32,
    },
    #[error("placement failed: {0}")]
    Placement(#[from] PlaceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// One occupied cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<Value>,
    #[serde(
        rename = "consumingNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub consuming_number: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

/// One belt, by endpoint cells `[x, y]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConveyorRecord {
    pub start: [i32; 2],
    pub end: [i32; 2],
    pub travel_time: Millis,
}

/// The whole save file. `grid` is indexed `grid[y][x]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDocument {
    pub width: u32,
    pub height: u32,
    pub grid: Vec<Vec<Option<CellRecord>>>,
    #[serde(default)]
    pub conveyors: Vec<ConveyorRecord>,
    #[serde(default)]
    pub upgrades: UpgradeCounters,
    #[serde(default)]
    pub score: i64,
}

// ---------------------------------------------------------------------------
// Structure <-> record
// ---------------------------------------------------------------------------

fn record_of(structure: &Structure) -> CellRecord {
    let mut record = CellRecord {
        class: structure.class_name().to_owned(),
        number: None,
        consuming_number: None,
        locked: None,
    };
    match &structure.kind {
        StructureKind::Mine(mine) => record.number = Some(mine.base_value),
        StructureKind::Well(well) => {
            record.consuming_number = Some(well.base_consuming);
            record.locked = Some(well.locked);
        }
        StructureKind::Operator(_) | StructureKind::Splitter(_) | StructureKind::Merger(_) => {}
    }
    record
}

fn structure_of(
    record: &CellRecord,
    pos: GridPos,
    config: &GameConfig,
    score: i64,
) -> Result<Structure, PersistError> {
    let missing = |field| PersistError::MissingField {
        class: record.class.clone(),
        pos,
        field,
    };
    let structure = match record.class.to_ascii_lowercase().as_str() {
        "mine" => Structure::mine(record.number.ok_or_else(|| missing("number"))?),
        "well" => {
            let number = record
                .consuming_number
                .ok_or_else(|| missing("consumingNumber"))?;
            let locked = record.locked.unwrap_or_else(|| {
                config
                    .objective_for(number)
                    .is_some_and(|required| score < required)
            });
            if locked {
                Structure::locked_well(number)
            } else {
                Structure::well(number)
            }
        }
        "summodule" => Structure::operator(Operation::Sum),
        "multiplymodule" => Structure::operator(Operation::Multiply),
        "dividemodule" => Structure::operator(Operation::Divide),
        "splitter" => Structure::splitter(),
        "merger" => Structure::merger(),
        _ => return Err(PersistError::UnknownClass(record.class.clone())),
    };
    Ok(structure)
}

// ---------------------------------------------------------------------------
// Engine persistence
// ---------------------------------------------------------------------------

impl Engine {
    /// Cell an endpoint belongs to: the structure drawn at that pixel if
    /// there is one, otherwise the cell containing it.
    fn endpoint_cell(&self, p: PixelPos) -> GridPos {
        let cs = self.config.cell_size;
        self.grid
            .iter()
            .find(|(_, s)| s.pixel_pos(cs) == p)
            .map(|(pos, _)| pos)
            .unwrap_or_else(|| p.to_grid(cs))
    }

    pub fn to_save(&self) -> SaveDocument {
        let (width, height) = (self.grid.width(), self.grid.height());
        let grid = (0..height as i32)
            .map(|y| {
                (0..width as i32)
                    .map(|x| self.grid.structure_at(GridPos::new(x, y)).map(record_of))
                    .collect()
            })
            .collect();
        let conveyors = self
            .belts
            .iter()
            .map(|(_, belt)| {
                let (s, e) = (self.endpoint_cell(belt.start), self.endpoint_cell(belt.end));
                ConveyorRecord {
                    start: [s.x, s.y],
                    end: [e.x, e.y],
                    travel_time: belt.travel_time,
                }
            })
            .collect();
        SaveDocument {
            width,
            height,
            grid,
            conveyors,
            upgrades: self.counters,
            score: self.points,
        }
    }

    /// Rebuild an engine from a save. The grid takes the save's dimensions;
    /// everything else comes from `config`.
    pub fn from_save(doc: SaveDocument, config: GameConfig) -> Result<Self, PersistError> {
        config.validate()?;
        let rows_ok = doc.grid.len() == doc.height as usize
            && doc.grid.iter().all(|row| row.len() == doc.width as usize);
        if doc.width == 0 || doc.height == 0 || !rows_ok {
            return Err(PersistError::DimensionMismatch {
                width: doc.width,
                height: doc.height,
                rows: doc.grid.len(),
                columns: doc.grid.iter().map(Vec::len).collect(),
            });
        }

        let mut grid = Grid::new(doc.width, doc.height);
        for (y, row) in doc.grid.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                let Some(record) = cell else { continue };
                let pos = GridPos::new(x as i32, y as i32);
                let structure = structure_of(record, pos, &config, doc.score)?;
                grid.place_structure(pos, structure)?;
            }
        }

        if let Some((kind, uses)) = config.upgrades.over_cap(&doc.upgrades) {
            return Err(PersistError::UpgradeOverCap {
                kind,
                uses,
                max_uses: config.upgrades.max_uses,
            });
        }

        let cs = config.cell_size;
        let mut belts = Conveyors::new();
        for (index, record) in doc.conveyors.iter().enumerate() {
            let inside = |[x, y]: [i32; 2]| grid.in_bounds(GridPos::new(x, y));
            if !(inside(record.start) && inside(record.end)) {
                return Err(PersistError::ConveyorOutOfBounds {
                    index,
                    start: record.start,
                    end: record.end,
                    width: doc.width,
                    height: doc.height,
                });
            }
            let start = GridPos::new(record.start[0], record.start[1]).center(cs);
            let end = GridPos::new(record.end[0], record.end[1]).center(cs);
            belts.insert(Conveyor::new(start, end, record.travel_time));
        }

        let engine = Self::from_parts(config, grid, belts, doc.score, doc.upgrades);
        tracing::info!(
            target: "numberworks::save",
            structures = engine.grid.occupied_count(),
            conveyors = engine.belts.len(),
            score = engine.points,
            "save.loaded"
        );
        Ok(engine)
    }

    pub fn save_to_string(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(&self.to_save())?)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let json = self.save_to_string()?;
        std::fs::write(path, json).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(
            target: "numberworks::save",
            path = %path.display(),
            "save.written"
        );
        Ok(())
    }

    pub fn load_from_str(json: &str, config: GameConfig) -> Result<Self, PersistError> {
        let doc: SaveDocument = serde_json::from_str(json)?;
        Self::from_save(doc, config)
    }

    pub fn load_from_path(
        path: impl AsRef<Path>,
        config: GameConfig,
    ) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&json, config)
    }

    /// Load a save, falling back to the default map if it is missing or
    /// malformed. Only an invalid `config` is an error.
    pub fn load_or_default(
        path: impl AsRef<Path>,
        config: GameConfig,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match Self::load_from_path(path, config.clone()) {
            Ok(engine) => Ok(engine),
            Err(PersistError::Config(err)) => Err(err),
            Err(err) => {
                tracing::warn!(
                    target: "numberworks::save",
                    path = %path.display(),
                    error = %err,
                    "save.load_failed"
                );
                Self::with_default_map(config)
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("numberworks-{}-{name}.json", std::process::id()))
    }

    // Test 1: field names and grid orientation
    #[test]
    fn document_shape() {
        let (engine, _) = mine_to_well(7, 5, 2000);
        let json = serde_json::to_value(engine.to_save()).unwrap();
        assert_eq!(json["width"], 5);
        assert_eq!(json["height"], 1);
        assert_eq!(json["grid"][0][0]["class"], "Mine");
        assert_eq!(json["grid"][0][0]["number"], 7);
        assert_eq!(json["grid"][0][4]["class"], "Well");
        assert_eq!(json["grid"][0][4]["consumingNumber"], 5);
        assert!(json["grid"][0][1].is_null());
        assert_eq!(json["conveyors"][0]["start"], serde_json::json!([0, 0]));
        assert_eq!(json["conveyors"][0]["end"], serde_json::json!([4, 0]));
        assert_eq!(json["conveyors"][0]["travel_time"], 2000);
        assert_eq!(json["upgrades"]["eff_uses_used"], 0);
        assert_eq!(json["score"], 0);
    }

    // Test 2: base values are saved, not effective ones
    #[test]
    fn saves_base_values() {
        let (mut engine, _) = mine_to_well(2, 2, 1000);
        engine.points = 100;
        engine.try_apply_upgrade(UpgradeKind::Efficiency).unwrap();
        let doc = engine.to_save();
        assert_eq!(doc.grid[0][0].as_ref().unwrap().number, Some(2));
        assert_eq!(doc.grid[0][4].as_ref().unwrap().consuming_number, Some(2));
        assert_eq!(doc.upgrades.eff_uses_used, 1);
    }

    // Test 3: reloading re-derives effects exactly once
    #[test]
    fn reload_does_not_double_apply() {
        let (mut engine, _) = mine_to_well(2, 2, 1000);
        engine.points = 1000;
        for _ in 0..3 {
            engine.try_apply_upgrade(UpgradeKind::Efficiency).unwrap();
        }
        let expected = engine.mine_output(GridPos::new(0, 0));
        let mut json = engine.save_to_string().unwrap();
        for _ in 0..3 {
            let reloaded = Engine::load_from_str(&json, engine.config().clone()).unwrap();
            assert_eq!(reloaded.mine_output(GridPos::new(0, 0)), expected);
            json = reloaded.save_to_string().unwrap();
        }
        assert_eq!(expected, Some(5));
    }

    // Test 4: class names are matched case-insensitively
    #[test]
    fn class_names_case_insensitive() {
        let json = r#"{
            "width": 2, "height": 1,
            "grid": [[{"class": "summodule"}, {"class": "MERGER"}]],
            "conveyors": [], "upgrades": {}, "score": 0
        }"#;
        let engine = Engine::load_from_str(json, small_config(2, 1)).unwrap();
        assert_eq!(
            engine.grid().structure_at(GridPos::new(0, 0)).unwrap().class_name(),
            "SumModule"
        );
        assert_eq!(
            engine.grid().structure_at(GridPos::new(1, 0)).unwrap().class_name(),
            "Merger"
        );
    }

    #[test]
    fn unknown_class() {
        let json = r#"{"width":1,"height":1,"grid":[[{"class":"Teleporter"}]]}"#;
        let err = Engine::load_from_str(json, small_config(1, 1)).unwrap_err();
        assert!(matches!(err, PersistError::UnknownClass(c) if c == "Teleporter"));
    }

    #[test]
    fn missing_mine_number() {
        let json = r#"{"width":1,"height":1,"grid":[[{"class":"Mine"}]]}"#;
        let err = Engine::load_from_str(json, small_config(1, 1)).unwrap_err();
        assert!(matches!(err, PersistError::MissingField { field: "number", .. }));
    }

    #[test]
    fn ragged_grid() {
        let json = r#"{"width":2,"height":2,"grid":[[null,null],[null]]}"#;
        let err = Engine::load_from_str(json, small_config(2, 2)).unwrap_err();
        assert!(matches!(err, PersistError::DimensionMismatch { .. }));
    }

    // Test 5: missing and malformed files fall back to the default map
    #[test]
    fn load_or_default_falls_back() {
        let config = crate::config::GameConfig::default();
        let expected = config.starting_mines.len() + config.starting_wells.len();

        let missing = temp_path("missing");
        let engine = Engine::load_or_default(&missing, config.clone()).unwrap();
        assert_eq!(engine.grid().occupied_count(), expected);

        let malformed = temp_path("malformed");
        std::fs::write(&malformed, "{ not json").unwrap();
        let engine = Engine::load_or_default(&malformed, config).unwrap();
        assert_eq!(engine.grid().occupied_count(), expected);
        std::fs::remove_file(&malformed).ok();
    }

    // Test 6: path round trip keeps belt order and wiring
    #[test]
    fn path_round_trip() {
        let (engine, _) = mine_to_well(3, 3, 1500);
        let path = temp_path("roundtrip");
        engine.save_to_path(&path).unwrap();
        let loaded = Engine::load_from_path(&path, engine.config().clone()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.state_hash(), engine.state_hash());
        assert_eq!(loaded.to_save(), engine.to_save());
    }

    // Test 7: a save without `locked` derives it from the objectives
    #[test]
    fn lock_state_derived_when_absent() {
        let mut config = small_config(2, 1);
        config.objectives = vec![crate::config::Objective {
            consuming_number: 9,
            required_score: 100,
        }];
        let doc = |score| {
            format!(
                r#"{{"width":2,"height":1,"score":{score},
                    "grid":[[{{"class":"Well","consumingNumber":9}},null]]}}"#
            )
        };
        let locked = Engine::load_from_str(&doc(10), config.clone()).unwrap();
        let open = Engine::load_from_str(&doc(100), config).unwrap();
        let is_locked = |e: &Engine| {
            let well = e.grid().structure_at(GridPos::new(0, 0)).unwrap();
            matches!(&well.kind, StructureKind::Well(w) if w.locked)
        };
        assert!(is_locked(&locked));
        assert!(!is_locked(&open));
    }

    // Test 8: a conveyor endpoint far outside the grid is rejected, and the
    // default map is used instead
    #[test]
    fn conveyor_outside_grid_falls_back() {
        let json = r#"{"width":2,"height":1,"grid":[[null,null]],
            "conveyors":[{"start":[40000000,0],"end":[1,0],"travel_time":1000}]}"#;
        let err = Engine::load_from_str(json, small_config(2, 1)).unwrap_err();
        assert!(matches!(err, PersistError::ConveyorOutOfBounds { index: 0, .. }));

        let config = crate::config::GameConfig::default();
        let expected = config.starting_mines.len() + config.starting_wells.len();
        let path = temp_path("far-conveyor");
        std::fs::write(&path, json).unwrap();
        let engine = Engine::load_or_default(&path, config).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(engine.grid().occupied_count(), expected);
        assert!(engine.belts().is_empty());
    }

    // Test 9: upgrade counters above the cap are rejected
    #[test]
    fn upgrade_counters_over_cap_rejected() {
        let doc = |uses: u64| {
            format!(
                r#"{{"width":1,"height":1,"grid":[[{{"class":"Mine","number":2}}]],
                    "upgrades":{{"eff_uses_used":{uses}}}}}"#
            )
        };
        let at_cap = Engine::load_from_str(&doc(10), small_config(1, 1)).unwrap();
        assert_eq!(at_cap.mine_output(GridPos::new(0, 0)), Some(12));

        let err = Engine::load_from_str(&doc(50), small_config(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            PersistError::UpgradeOverCap {
                kind: UpgradeKind::Efficiency,
                uses: 50,
                max_uses: 10,
            }
        ));

        let huge = doc(u64::from(u32::MAX));
        let err = Engine::load_from_str(&huge, small_config(1, 1)).unwrap_err();
        assert!(matches!(err, PersistError::UpgradeOverCap { .. }));
    }

    // Test 10: placement faults are save errors, so the loader falls back
    #[test]
    fn placement_fault_is_a_save_error() {
        let err = PersistError::from(PlaceError::Occupied(GridPos::new(0, 0)));
        assert!(matches!(err, PersistError::Placement(_)));
        assert!(!matches!(err, PersistError::Config(_)));
    }
}
