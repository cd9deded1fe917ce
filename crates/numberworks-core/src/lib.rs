//! Numberworks Core -- the simulation engine for a grid-based number
//! factory.
//!
//! Mines emit numbers onto timed conveyor belts, operator modules combine
//! them, splitters and mergers route them, and wells consume the ones that
//! match their required number for points. Points buy upgrades that speed up
//! belts, raise every mine's output, or add new mines.
//!
//! # Frame Pipeline
//!
//! Each call to [`engine::Engine::step`] advances the simulation by one
//! frame of `dt` milliseconds:
//!
//! 1. **Transport** -- Advance every belt in insertion order.
//! 2. **Production** -- Every mine emits once the production interval elapses.
//! 3. **Modules** -- Operators, splitters and mergers evaluate in row-major order.
//! 4. **Actions** -- Drain the upgrade queue; at most one purchase succeeds.
//! 5. **Consumption** -- Wells take ready tokens and award points.
//! 6. **Bookkeeping** -- Unlock wells whose objective is met.
//!
//! # Wiring
//!
//! Belts are stored by endpoint only. After every structural edit and after
//! a load, [`wiring::rewire`] rebuilds every port binding from the belt
//! endpoints:
//!
//! ```rust,ignore
//! let mut engine = Engine::new(GameConfig::default())?;
//! engine.place_structure(GridPos::new(0, 0), Structure::mine(7))?;
//! engine.place_structure(GridPos::new(4, 0), Structure::well(7))?;
//! engine.add_conveyor(GridPos::new(0, 0), GridPos::new(4, 0), 2000);
//! engine.step(2000);
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Simulation context and frame pipeline.
//! - [`grid::Grid`] -- Cells owning at most one [`structure::Structure`] each.
//! - [`conveyor::Conveyors`] -- Arena of timed FIFO belts.
//! - [`structure::StructureKind`] -- Mine, Well, operator, Splitter, Merger.
//! - [`upgrade::UpgradeTable`] -- Upgrade costs and effects.
//! - [`command::Command`] -- Build and destroy requests from the input layer.
//! - [`save::SaveDocument`] -- JSON save format.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic timing.

pub mod action_queue;
pub mod command;
pub mod config;
pub mod conveyor;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod save;
pub mod sim;
pub mod structure;
pub mod upgrade;
pub mod wiring;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
