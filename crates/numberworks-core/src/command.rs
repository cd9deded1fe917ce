//! Player commands from the input layer.
//!
//! The input layer translates clicks into grid positions and submits a
//! [`Command`]. Every command is checked in full before anything is
//! mutated, so a rejected command leaves the grid, the belts and the point
//! total exactly as they were.

use crate::engine::Engine;
use crate::grid::PlaceError;
use crate::id::{ConveyorId, GridPos};
use crate::structure::{Operation, Structure};
use crate::upgrade::UpgradeKind;

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// Structures the player can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildKind {
    Sum,
    Multiply,
    Divide,
    Splitter,
    Merger,
}

impl BuildKind {
    pub fn structure(self) -> Structure {
        match self {
            BuildKind::Sum => Structure::operator(Operation::Sum),
            BuildKind::Multiply => Structure::operator(Operation::Multiply),
            BuildKind::Divide => Structure::operator(Operation::Divide),
            BuildKind::Splitter => Structure::splitter(),
            BuildKind::Merger => Structure::merger(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Build a module on an empty cell.
    Build { kind: BuildKind, pos: GridPos },
    /// Destroy a module along with every belt touching its cell.
    Destroy { pos: GridPos },
    /// Lay a belt between two cell centers.
    PlaceConveyor { start: GridPos, end: GridPos },
    RemoveConveyor { id: ConveyorId },
    /// Queue an upgrade purchase.
    Upgrade(UpgradeKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Built(GridPos),
    Destroyed { pos: GridPos, belts_removed: usize },
    ConveyorPlaced(ConveyorId),
    ConveyorRemoved(ConveyorId),
    UpgradeQueued(UpgradeKind),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Placement(#[from] PlaceError),
    #[error("need {needed} points, have {available}")]
    InsufficientPoints { needed: i64, available: i64 },
    #[error("structure at {0:?} cannot be destroyed")]
    Protected(GridPos),
    #[error("nothing to destroy at {0:?}")]
    EmptyCell(GridPos),
    #[error("invalid conveyor from {start:?} to {end:?}")]
    InvalidConveyor { start: GridPos, end: GridPos },
    #[error("unknown conveyor {0:?}")]
    UnknownConveyor(ConveyorId),
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

impl Engine {
    /// Execute a player command immediately.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutcome, CommandError> {
        let result = match command {
            Command::Build { kind, pos } => self.build(kind, pos),
            Command::Destroy { pos } => self.destroy(pos),
            Command::PlaceConveyor { start, end } => self.place_conveyor(start, end),
            Command::RemoveConveyor { id } => self
                .remove_conveyor(id)
                .map(|_| CommandOutcome::ConveyorRemoved(id))
                .ok_or(CommandError::UnknownConveyor(id)),
            Command::Upgrade(kind) => {
                self.enqueue_upgrade(kind);
                Ok(CommandOutcome::UpgradeQueued(kind))
            }
        };
        if let Err(error) = &result {
            tracing::debug!(
                target: "numberworks::command",
                error = %error,
                "command.rejected"
            );
        }
        result
    }

    fn charge(&self, cost: i64) -> Result<(), CommandError> {
        if self.points < cost {
            return Err(CommandError::InsufficientPoints {
                needed: cost,
                available: self.points,
            });
        }
        Ok(())
    }

    fn build(&mut self, kind: BuildKind, pos: GridPos) -> Result<CommandOutcome, CommandError> {
        if !self.grid.in_bounds(pos) {
            return Err(PlaceError::OutOfBounds(pos).into());
        }
        if !self.grid.is_empty_at(pos) {
            return Err(PlaceError::Occupied(pos).into());
        }
        let cost = self.config.build_costs.cost(kind);
        self.charge(cost)?;
        self.place_structure(pos, kind.structure())?;
        self.points -= cost;
        Ok(CommandOutcome::Built(pos))
    }

    fn destroy(&mut self, pos: GridPos) -> Result<CommandOutcome, CommandError> {
        let structure = self
            .grid
            .structure_at(pos)
            .ok_or(CommandError::EmptyCell(pos))?;
        if structure.is_protected() {
            return Err(CommandError::Protected(pos));
        }
        let cs = self.config.cell_size;
        let touching: Vec<ConveyorId> = self
            .belts
            .iter()
            .filter(|(_, b)| b.start.to_grid(cs) == pos || b.end.to_grid(cs) == pos)
            .map(|(id, _)| id)
            .collect();
        for &id in &touching {
            self.belts.remove(id);
        }
        self.grid.remove_structure(pos);
        self.rewire();
        Ok(CommandOutcome::Destroyed {
            pos,
            belts_removed: touching.len(),
        })
    }

    fn place_conveyor(
        &mut self,
        start: GridPos,
        end: GridPos,
    ) -> Result<CommandOutcome, CommandError> {
        if start == end || !self.grid.in_bounds(start) || !self.grid.in_bounds(end) {
            return Err(CommandError::InvalidConveyor { start, end });
        }
        let distance = start.manhattan_distance(&end);
        let cost = self
            .config
            .build_costs
            .conveyor_per_cell
            .saturating_mul(i64::from(distance));
        self.charge(cost)?;
        let travel = distance.saturating_mul(self.config.conveyor_ms_per_cell);
        let id = self.add_conveyor(start, end, travel);
        self.points -= cost;
        Ok(CommandOutcome::ConveyorPlaced(id))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
