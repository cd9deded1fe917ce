//! Fixed-size grid of cells, each holding at most one structure.
//!
//! The grid exclusively owns placed structures. Placing moves a structure
//! in and stamps its grid position; removing hands it back to the caller.
//! Iteration is always row-major, which fixes the order structures are
//! evaluated in within a frame.

use crate::conveyor::Conveyors;
use crate::event::{Event, EventLog};
use crate::id::GridPos;
use crate::structure::{Structure, StructureError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a structure could not be placed. Nothing is mutated on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlaceError {
    #[error("cell {0:?} is outside the grid")]
    OutOfBounds(GridPos),
    #[error("cell {0:?} is occupied")]
    Occupied(GridPos),
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// One grid cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    structure: Option<Structure>,
}

impl Cell {
    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_none()
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| pos.y as usize * self.width as usize + pos.x as usize)
    }

    fn pos_of(&self, index: usize) -> GridPos {
        let w = self.width as usize;
        GridPos::new((index % w) as i32, (index / w) as i32)
    }

    /// The cell at `pos`, or `None` outside the grid.
    pub fn cell(&self, pos: GridPos) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    pub fn structure_at(&self, pos: GridPos) -> Option<&Structure> {
        self.cell(pos).and_then(Cell::structure)
    }

    pub fn structure_at_mut(&mut self, pos: GridPos) -> Option<&mut Structure> {
        let i = self.index(pos)?;
        self.cells[i].structure.as_mut()
    }

    pub fn is_empty_at(&self, pos: GridPos) -> bool {
        self.cell(pos).is_some_and(Cell::is_empty)
    }

    /// Place a structure, taking ownership and recording its position.
    pub fn place_structure(
        &mut self,
        pos: GridPos,
        mut structure: Structure,
    ) -> Result<(), PlaceError> {
        let i = self.index(pos).ok_or(PlaceError::OutOfBounds(pos))?;
        let cell = &mut self.cells[i];
        if cell.structure.is_some() {
            return Err(PlaceError::Occupied(pos));
        }
        structure.grid_pos = pos;
        cell.structure = Some(structure);
        Ok(())
    }

    /// Remove and return the structure at `pos`, leaving the cell empty.
    pub fn remove_structure(&mut self, pos: GridPos) -> Option<Structure> {
        let i = self.index(pos)?;
        self.cells[i].structure.take()
    }

    /// Occupied cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (GridPos, &Structure)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.structure().map(|s| (self.pos_of(i), s)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Structure> {
        self.cells.iter_mut().filter_map(|c| c.structure.as_mut())
    }

    /// Number of placed structures.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// First empty cell in row-major order.
    pub fn first_empty(&self) -> Option<GridPos> {
        self.cells
            .iter()
            .position(Cell::is_empty)
            .map(|i| self.pos_of(i))
    }

    /// Run `f` on every structure in row-major order behind a per-structure
    /// fault boundary. A structure that fails is logged, reported as a
    /// [`Event::StructureFaulted`] and skipped; the rest still run. Returns
    /// the positions and outputs of structures that produced something.
    pub fn run_each<T>(
        &mut self,
        events: &mut EventLog,
        mut f: impl FnMut(&mut Structure) -> Result<Option<T>, StructureError>,
    ) -> Vec<(GridPos, T)> {
        let mut outputs = Vec::new();
        for structure in self.iter_mut() {
            let pos = structure.grid_pos;
            match f(structure) {
                Ok(Some(out)) => outputs.push((pos, out)),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        target: "numberworks::grid",
                        x = pos.x,
                        y = pos.y,
                        class = structure.class_name(),
                        error = %error,
                        "structure.faulted"
                    );
                    events.emit(Event::StructureFaulted { pos, error });
                }
            }
        }
        outputs
    }

    /// Evaluate every module (operators, splitters, mergers) for one frame.
    pub fn update(&mut self, belts: &mut Conveyors, events: &mut EventLog) {
        let mut module_events = EventLog::new();
        self.run_each(events, |s| s.process(belts, &mut module_events).map(|()| None::<()>));
        for record in module_events.drain() {
            events.emit(record.event);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conveyor::Conveyor;
    use crate::event::EventKind;
    use crate::id::PixelPos;
    use crate::structure::{Operation, PortSlot};

    #[test]
    fn place_and_get() {
        let mut grid = Grid::new(4, 3);
        grid.place_structure(GridPos::new(2, 1), Structure::mine(5)).unwrap();
        let s = grid.structure_at(GridPos::new(2, 1)).unwrap();
        assert_eq!(s.grid_pos(), GridPos::new(2, 1));
        assert_eq!(s.class_name(), "Mine");
        assert_eq!(grid.occupied_count(), 1);
    }

    #[test]
    fn place_occupied_fails_without_mutation() {
        let mut grid = Grid::new(4, 3);
        let pos = GridPos::new(0, 0);
        grid.place_structure(pos, Structure::mine(5)).unwrap();
        assert_eq!(
            grid.place_structure(pos, Structure::well(5)),
            Err(PlaceError::Occupied(pos))
        );
        assert_eq!(grid.structure_at(pos).unwrap().class_name(), "Mine");
    }

    #[test]
    fn out_of_bounds() {
        let mut grid = Grid::new(4, 3);
        for pos in [
            GridPos::new(-1, 0),
            GridPos::new(0, -1),
            GridPos::new(4, 0),
            GridPos::new(0, 3),
        ] {
            assert!(grid.cell(pos).is_none());
            assert_eq!(
                grid.place_structure(pos, Structure::splitter()),
                Err(PlaceError::OutOfBounds(pos))
            );
        }
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn remove_returns_ownership() {
        let mut grid = Grid::new(2, 2);
        let pos = GridPos::new(1, 1);
        grid.place_structure(pos, Structure::merger()).unwrap();
        let s = grid.remove_structure(pos).unwrap();
        assert_eq!(s.class_name(), "Merger");
        assert!(grid.is_empty_at(pos));
        assert!(grid.remove_structure(pos).is_none());
    }

    #[test]
    fn iteration_is_row_major() {
        let mut grid = Grid::new(3, 3);
        grid.place_structure(GridPos::new(2, 0), Structure::mine(1)).unwrap();
        grid.place_structure(GridPos::new(0, 1), Structure::mine(2)).unwrap();
        grid.place_structure(GridPos::new(1, 0), Structure::mine(3)).unwrap();
        let order: Vec<_> = grid.iter().map(|(p, _)| p).collect();
        assert_eq!(
            order,
            vec![GridPos::new(1, 0), GridPos::new(2, 0), GridPos::new(0, 1)]
        );
    }

    #[test]
    fn first_empty_scans_row_major() {
        let mut grid = Grid::new(2, 2);
        assert_eq!(grid.first_empty(), Some(GridPos::new(0, 0)));
        grid.place_structure(GridPos::new(0, 0), Structure::mine(1)).unwrap();
        assert_eq!(grid.first_empty(), Some(GridPos::new(1, 0)));
        grid.place_structure(GridPos::new(1, 0), Structure::mine(1)).unwrap();
        grid.place_structure(GridPos::new(0, 1), Structure::mine(1)).unwrap();
        grid.place_structure(GridPos::new(1, 1), Structure::mine(1)).unwrap();
        assert_eq!(grid.first_empty(), None);
    }

    #[test]
    fn faulty_structure_does_not_halt_update() {
        let mut grid = Grid::new(3, 1);
        let mut belts = Conveyors::new();
        let mut events = EventLog::new();
        let belt = |belts: &mut Conveyors| {
            belts.insert(Conveyor::new(PixelPos::new(0, 0), PixelPos::new(1, 0), 0))
        };

        // Splitter at (0,0) has a dangling output.
        let (gone, in_a) = (belt(&mut belts), belt(&mut belts));
        let mut broken = Structure::splitter();
        broken.connect(PortSlot::Input1, in_a);
        broken.connect(PortSlot::Output1, gone);
        belts.remove(gone);
        grid.place_structure(GridPos::new(0, 0), broken).unwrap();

        // A healthy sum module at (1,0).
        let (a, b, out) = (belt(&mut belts), belt(&mut belts), belt(&mut belts));
        let mut sum = Structure::operator(Operation::Sum);
        sum.connect_input1(a);
        sum.connect_input2(b);
        sum.connect_output1(out);
        grid.place_structure(GridPos::new(1, 0), sum).unwrap();

        belts.push(a, 2);
        belts.push(b, 3);
        belts.advance_all(0, crate::fixed::Fixed64::ONE);
        grid.update(&mut belts, &mut events);

        assert_eq!(events.count(EventKind::StructureFaulted), 1);
        assert_eq!(belts.get(out).unwrap().len(), 1);
        assert!(grid.structure_at(GridPos::new(0, 0)).is_some(), "faulty structure is kept");
    }
}
