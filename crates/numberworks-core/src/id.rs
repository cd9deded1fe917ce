use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a conveyor belt in the belt arena.
    pub struct ConveyorId;
}

/// The numeric payload carried by tokens. Mines emit these, operator modules
/// combine them and wells consume them.
pub type Value = i64;

/// A cell coordinate on the grid. Negative coordinates are representable so
/// that callers can pass raw input through; the grid rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &GridPos) -> u32 {
        self.x
            .abs_diff(other.x)
            .saturating_add(self.y.abs_diff(other.y))
    }

    /// Pixel position of this cell's center for the given cell size.
    /// Saturates at the `i32` range.
    pub fn center(&self, cell_size: u32) -> PixelPos {
        let cs = i32::try_from(cell_size).unwrap_or(i32::MAX);
        let axis = |v: i32| v.saturating_mul(cs).saturating_add(cs / 2);
        PixelPos::new(axis(self.x), axis(self.y))
    }
}

/// A pixel position in world space. Conveyor endpoints are stored this way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: i32,
    pub y: i32,
}

impl PixelPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The cell containing this pixel, by floor division.
    pub fn to_grid(&self, cell_size: u32) -> GridPos {
        let cs = cell_size as i32;
        GridPos::new(self.x.div_euclid(cs), self.y.div_euclid(cs))
    }
}
