//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::GameConfig;
use crate::engine::Engine;
use crate::fixed::Millis;
use crate::id::{ConveyorId, GridPos, Value};
use crate::structure::{Operation, Structure};

// ===========================================================================
// Engine constructors
// ===========================================================================

/// Default economy on a `width` x `height` grid with no starting layout and
/// no objectives.
pub fn small_config(width: u32, height: u32) -> GameConfig {
    GameConfig {
        grid_width: width,
        grid_height: height,
        starting_mines: Vec::new(),
        starting_wells: Vec::new(),
        objectives: Vec::new(),
        ..GameConfig::default()
    }
}

pub fn empty_engine(width: u32, height: u32) -> Engine {
    Engine::new(small_config(width, height)).expect("small config is valid")
}

/// A 5x1 map: mine at (0,0), well at (4,0), one belt between them.
pub fn mine_to_well(mine: Value, well: Value, travel_time: Millis) -> (Engine, ConveyorId) {
    let mut engine = empty_engine(5, 1);
    engine
        .place_structure(GridPos::new(0, 0), Structure::mine(mine))
        .expect("cell is empty");
    engine
        .place_structure(GridPos::new(4, 0), Structure::well(well))
        .expect("cell is empty");
    let belt = engine.add_conveyor(GridPos::new(0, 0), GridPos::new(4, 0), travel_time);
    (engine, belt)
}

/// `rows` independent sum lines stacked three rows apart. Each line is two
/// mines feeding a sum module feeding a well that accepts the sum.
pub fn sum_lines(rows: u32) -> Engine {
    let mut engine = empty_engine(6, rows * 3);
    for r in 0..rows as i32 {
        let top = r * 3;
        let (a, b) = (GridPos::new(0, top), GridPos::new(0, top + 2));
        let sum = GridPos::new(2, top + 1);
        let well = GridPos::new(5, top + 1);
        engine.place_structure(a, Structure::mine(2)).expect("cell is empty");
        engine.place_structure(b, Structure::mine(3)).expect("cell is empty");
        engine
            .place_structure(sum, Structure::operator(Operation::Sum))
            .expect("cell is empty");
        engine.place_structure(well, Structure::well(5)).expect("cell is empty");
        engine.add_conveyor(a, sum, 1000);
        engine.add_conveyor(b, sum, 1000);
        engine.add_conveyor(sum, well, 1000);
    }
    engine
}
