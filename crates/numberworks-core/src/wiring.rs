//! Reconnection: derive every structure's port bindings from the belts.
//!
//! Belts are persisted by endpoint position only, so after a load (and
//! after any structural edit) the bindings between structures and belts
//! are rebuilt from scratch:
//!
//! 1. Every port on every structure and every belt-to-belt link is cleared.
//! 2. For each belt, in insertion order, the structure in its start cell
//!    takes it as an output and the structure in its end cell takes it as
//!    an input.
//! 3. Two-slot sides pick a slot by the far endpoint's Y: strictly above
//!    the structure's center binds slot 1, anything else binds slot 2. If
//!    the preferred slot is taken the other free slot is used; a belt that
//!    finds no free slot stays unbound on that side.
//! 4. A belt ending on an empty cell is linked to the first belt (in
//!    insertion order) starting in that cell.
//!
//! The pass only reads belt endpoints and writes bindings, so running it
//! twice yields the same wiring.

use crate::conveyor::Conveyors;
use crate::grid::Grid;
use crate::id::{ConveyorId, GridPos, PixelPos};
use crate::structure::{PortSlot, Structure, StructureKind};

/// Summary of a reconnection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WiringReport {
    /// First mine in row-major order.
    pub first_mine: Option<GridPos>,
    /// Well fed by the most recently inserted belt that ends on a well.
    pub final_well: Option<GridPos>,
    /// Ports bound to a belt.
    pub bound_ports: usize,
    /// Belt-to-belt links created.
    pub chained: usize,
    /// Belt ends that touched a structure but found no free slot.
    pub unbound_ends: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Input,
    Output,
}

/// Rebuild all port bindings and belt links.
pub fn rewire(grid: &mut Grid, belts: &mut Conveyors, cell_size: u32) -> WiringReport {
    let mut report = WiringReport::default();

    for structure in grid.iter_mut() {
        structure.clear_ports();
    }
    let ids: Vec<ConveyorId> = belts.ids().to_vec();
    for &id in &ids {
        if let Some(belt) = belts.get_mut(id) {
            belt.output_conveyor = None;
        }
    }

    let endpoints: Vec<(ConveyorId, PixelPos, PixelPos)> =
        belts.iter().map(|(id, b)| (id, b.start, b.end)).collect();

    for &(id, start, end) in &endpoints {
        let start_cell = start.to_grid(cell_size);
        let end_cell = end.to_grid(cell_size);

        if let Some(producer) = grid.structure_at_mut(start_cell) {
            bind(producer, Side::Output, id, end, cell_size, &mut report);
        }
        if let Some(consumer) = grid.structure_at_mut(end_cell) {
            if matches!(consumer.kind, StructureKind::Well(_)) {
                report.final_well = Some(end_cell);
            }
            bind(consumer, Side::Input, id, start, cell_size, &mut report);
        } else if grid.is_empty_at(end_cell) {
            let next = endpoints
                .iter()
                .find(|&&(other, s, _)| other != id && s.to_grid(cell_size) == end_cell)
                .map(|&(other, _, _)| other);
            if let Some(next) = next
                && let Some(belt) = belts.get_mut(id)
            {
                belt.output_conveyor = Some(next);
                report.chained += 1;
            }
        }
    }

    report.first_mine = grid
        .iter()
        .find(|(_, s)| matches!(s.kind, StructureKind::Mine(_)))
        .map(|(pos, _)| pos);

    tracing::debug!(
        target: "numberworks::wiring",
        belts = endpoints.len(),
        bound = report.bound_ports,
        chained = report.chained,
        unbound = report.unbound_ends,
        "wiring.rebuilt"
    );
    report
}

fn bind(
    structure: &mut Structure,
    side: Side,
    belt: ConveyorId,
    far: PixelPos,
    cell_size: u32,
    report: &mut WiringReport,
) {
    let layout = structure.port_layout();
    let available = match side {
        Side::Input => layout.inputs,
        Side::Output => layout.outputs,
    };
    if available == 0 {
        return;
    }
    match choose_slot(structure, side, far, cell_size) {
        Some(slot) => {
            structure.connect(slot, belt);
            report.bound_ports += 1;
        }
        None => {
            let pos = structure.grid_pos();
            tracing::debug!(
                target: "numberworks::wiring",
                x = pos.x,
                y = pos.y,
                class = structure.class_name(),
                side = ?side,
                "wiring.no_free_slot"
            );
            report.unbound_ends += 1;
        }
    }
}

/// Slot a belt whose far end is at `far` should bind to on `side`.
fn choose_slot(
    structure: &Structure,
    side: Side,
    far: PixelPos,
    cell_size: u32,
) -> Option<PortSlot> {
    let (one, two) = match side {
        Side::Input => (PortSlot::Input1, PortSlot::Input2),
        Side::Output => (PortSlot::Output1, PortSlot::Output2),
    };
    let own_y = structure.pixel_pos(cell_size).y;
    let order = if far.y < own_y { [one, two] } else { [two, one] };
    order.into_iter().find(|&slot| structure.slot_free(slot))
}

// ===========================================================================
// Tests
// ===========================================================================
