//! Structures that occupy grid cells: mines, wells, operator modules,
//! splitters and mergers.
//!
//! Every structure shares the same shape: a grid position, a set of
//! [`Ports`] bound to conveyors, and a [`StructureKind`] carrying the
//! variant's own state. Dispatch is a closed enum match, the same way
//! processors are dispatched in the engine, so there is no dynamic type
//! inspection anywhere in the wiring or scheduling code.
//!
//! # Processing protocol
//!
//! - **Mine**: pushes its effective value on every production tick, if its
//!   output is bound.
//! - **Well**: pops a ready token every frame; scores it when it matches the
//!   effective consuming number, discards it otherwise.
//! - **Operator module**: fires only when both inputs are ready at once.
//! - **Splitter**: alternates output 1, output 2, output 1, ...
//! - **Merger**: moves a ready token from input 1, then from input 2.

use serde::{Deserialize, Serialize};

use crate::conveyor::Conveyors;
use crate::event::{Event, EventLog};
use crate::id::{ConveyorId, GridPos, PixelPos, Value};
use crate::upgrade::{UpgradeEffect, efficiency_bonus};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A fault raised while a structure runs its per-frame logic. The scheduler
/// skips the structure for the frame and logs the fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    #[error("{slot:?} is bound to a conveyor that no longer exists")]
    DanglingPort { slot: PortSlot },
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// A named connection slot on a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortSlot {
    Input1,
    Input2,
    Output1,
    Output2,
}

/// Conveyor bindings for each slot. Unused slots stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ports {
    pub input1: Option<ConveyorId>,
    pub input2: Option<ConveyorId>,
    pub output1: Option<ConveyorId>,
    pub output2: Option<ConveyorId>,
}

impl Ports {
    pub fn get(&self, slot: PortSlot) -> Option<ConveyorId> {
        match slot {
            PortSlot::Input1 => self.input1,
            PortSlot::Input2 => self.input2,
            PortSlot::Output1 => self.output1,
            PortSlot::Output2 => self.output2,
        }
    }

    fn slot_mut(&mut self, slot: PortSlot) -> &mut Option<ConveyorId> {
        match slot {
            PortSlot::Input1 => &mut self.input1,
            PortSlot::Input2 => &mut self.input2,
            PortSlot::Output1 => &mut self.output1,
            PortSlot::Output2 => &mut self.output2,
        }
    }

    fn bound(&self) -> impl Iterator<Item = (PortSlot, ConveyorId)> + '_ {
        [
            PortSlot::Input1,
            PortSlot::Input2,
            PortSlot::Output1,
            PortSlot::Output2,
        ]
        .into_iter()
        .filter_map(|slot| self.get(slot).map(|id| (slot, id)))
    }
}

/// How many input and output slots a variant exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLayout {
    pub inputs: u8,
    pub outputs: u8,
}

impl PortLayout {
    pub fn has(&self, slot: PortSlot) -> bool {
        match slot {
            PortSlot::Input1 => self.inputs >= 1,
            PortSlot::Input2 => self.inputs >= 2,
            PortSlot::Output1 => self.outputs >= 1,
            PortSlot::Output2 => self.outputs >= 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The binary operation performed by an operator module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Sum,
    Multiply,
    /// Floor division: quotient on output 1, remainder on output 2.
    Divide,
}

/// Why an operator consumed its inputs without producing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    DivideByZero,
    Overflow,
}

/// Result of applying an [`Operation`] to two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    Single(Value),
    QuotientRemainder { quotient: Value, remainder: Value },
    Dropped(DropReason),
}

impl Operation {
    pub fn apply(self, lhs: Value, rhs: Value) -> OperationOutcome {
        match self {
            Operation::Sum => lhs
                .checked_add(rhs)
                .map_or(OperationOutcome::Dropped(DropReason::Overflow), OperationOutcome::Single),
            Operation::Multiply => lhs
                .checked_mul(rhs)
                .map_or(OperationOutcome::Dropped(DropReason::Overflow), OperationOutcome::Single),
            Operation::Divide => floor_div_rem(lhs, rhs),
        }
    }
}

/// Floor division with a remainder that takes the divisor's sign, so that
/// `lhs == rhs * quotient + remainder` always holds.
fn floor_div_rem(lhs: Value, rhs: Value) -> OperationOutcome {
    if rhs == 0 {
        return OperationOutcome::Dropped(DropReason::DivideByZero);
    }
    let (Some(mut quotient), Some(mut remainder)) = (lhs.checked_div(rhs), lhs.checked_rem(rhs))
    else {
        return OperationOutcome::Dropped(DropReason::Overflow);
    };
    if remainder != 0 && ((remainder < 0) != (rhs < 0)) {
        quotient -= 1;
        remainder += rhs;
    }
    OperationOutcome::QuotientRemainder {
        quotient,
        remainder,
    }
}

/// Trial-division primality test.
pub fn is_prime(n: Value) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut d: Value = 3;
    while d <= n / d {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Emits a number on every production tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mine {
    /// Value before efficiency upgrades. This is what gets persisted.
    pub base_value: Value,
}

impl Mine {
    pub fn effective_value(&self, effects: &[UpgradeEffect]) -> Value {
        self.base_value.saturating_add(efficiency_bonus(effects))
    }
}

/// Consumes matching numbers for points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Well {
    /// Required number before efficiency upgrades. Indexes the objectives
    /// table and is what gets persisted.
    pub base_consuming: Value,
    /// A locked well leaves arriving tokens waiting on its belt.
    pub locked: bool,
}

impl Well {
    pub fn effective_consuming(&self, effects: &[UpgradeEffect]) -> Value {
        self.base_consuming.saturating_add(efficiency_bonus(effects))
    }

    /// Points for consuming `value`: the value itself, doubled for primes.
    pub fn award(value: Value) -> i64 {
        if is_prime(value) {
            value.saturating_mul(2)
        } else {
            value
        }
    }
}

/// Two-input arithmetic module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorModule {
    pub operation: Operation,
}

/// Alternates its input between two outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Splitter {
    /// When set, the next token goes to output 2.
    pub toggle: bool,
}

/// Drains two inputs into one output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Merger;

/// Variant-specific state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureKind {
    Mine(Mine),
    Well(Well),
    Operator(OperatorModule),
    Splitter(Splitter),
    Merger(Merger),
}

// ---------------------------------------------------------------------------
// Frame outcomes
// ---------------------------------------------------------------------------

/// What a well did with the token at the end of its belt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellOutcome {
    Scored { value: Value, award: i64 },
    Discarded { value: Value, required: Value },
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// A placed (or about to be placed) structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub(crate) grid_pos: GridPos,
    pub(crate) ports: Ports,
    pub kind: StructureKind,
}

impl Structure {
    pub fn new(kind: StructureKind) -> Self {
        Self {
            grid_pos: GridPos::new(0, 0),
            ports: Ports::default(),
            kind,
        }
    }

    pub fn mine(base_value: Value) -> Self {
        Self::new(StructureKind::Mine(Mine { base_value }))
    }

    pub fn well(base_consuming: Value) -> Self {
        Self::new(StructureKind::Well(Well {
            base_consuming,
            locked: false,
        }))
    }

    pub fn locked_well(base_consuming: Value) -> Self {
        Self::new(StructureKind::Well(Well {
            base_consuming,
            locked: true,
        }))
    }

    pub fn operator(operation: Operation) -> Self {
        Self::new(StructureKind::Operator(OperatorModule { operation }))
    }

    pub fn splitter() -> Self {
        Self::new(StructureKind::Splitter(Splitter::default()))
    }

    pub fn merger() -> Self {
        Self::new(StructureKind::Merger(Merger))
    }

    pub fn grid_pos(&self) -> GridPos {
        self.grid_pos
    }

    /// Center of the structure's cell in pixels.
    pub fn pixel_pos(&self, cell_size: u32) -> PixelPos {
        self.grid_pos.center(cell_size)
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    /// Mines and wells cannot be destroyed by the player.
    pub fn is_protected(&self) -> bool {
        matches!(self.kind, StructureKind::Mine(_) | StructureKind::Well(_))
    }

    /// Name used for this variant in save files.
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            StructureKind::Mine(_) => "Mine",
            StructureKind::Well(_) => "Well",
            StructureKind::Operator(op) => match op.operation {
                Operation::Sum => "SumModule",
                Operation::Multiply => "MultiplyModule",
                Operation::Divide => "DivideModule",
            },
            StructureKind::Splitter(_) => "Splitter",
            StructureKind::Merger(_) => "Merger",
        }
    }

    pub fn port_layout(&self) -> PortLayout {
        let (inputs, outputs) = match &self.kind {
            StructureKind::Mine(_) => (0, 1),
            StructureKind::Well(_) => (1, 0),
            StructureKind::Operator(op) => match op.operation {
                Operation::Divide => (2, 2),
                Operation::Sum | Operation::Multiply => (2, 1),
            },
            StructureKind::Splitter(_) => (1, 2),
            StructureKind::Merger(_) => (2, 1),
        };
        PortLayout { inputs, outputs }
    }

    // -- Port wiring --

    /// Bind `conveyor` to `slot`. Returns false, leaving the structure
    /// untouched, if this variant has no such slot.
    pub fn connect(&mut self, slot: PortSlot, conveyor: ConveyorId) -> bool {
        if !self.port_layout().has(slot) {
            return false;
        }
        *self.ports.slot_mut(slot) = Some(conveyor);
        true
    }

    pub fn connect_input1(&mut self, conveyor: ConveyorId) -> bool {
        self.connect(PortSlot::Input1, conveyor)
    }

    pub fn connect_input2(&mut self, conveyor: ConveyorId) -> bool {
        self.connect(PortSlot::Input2, conveyor)
    }

    pub fn connect_output1(&mut self, conveyor: ConveyorId) -> bool {
        self.connect(PortSlot::Output1, conveyor)
    }

    pub fn connect_output2(&mut self, conveyor: ConveyorId) -> bool {
        self.connect(PortSlot::Output2, conveyor)
    }

    /// Whether `slot` exists on this variant and is still free.
    pub fn slot_free(&self, slot: PortSlot) -> bool {
        self.port_layout().has(slot) && self.ports.get(slot).is_none()
    }

    pub fn clear_ports(&mut self) {
        self.ports = Ports::default();
    }

    fn check_ports(&self, belts: &Conveyors) -> Result<(), StructureError> {
        for (slot, id) in self.ports.bound() {
            if !belts.contains(id) {
                return Err(StructureError::DanglingPort { slot });
            }
        }
        Ok(())
    }

    // -- Per-frame behaviour --

    /// Production tick. Returns the value pushed, or `None` if this is not a
    /// mine or its output is unbound.
    pub fn produce(
        &self,
        belts: &mut Conveyors,
        effects: &[UpgradeEffect],
    ) -> Result<Option<Value>, StructureError> {
        let StructureKind::Mine(mine) = &self.kind else {
            return Ok(None);
        };
        let Some(out) = self.ports.output1 else {
            return Ok(None);
        };
        self.check_ports(belts)?;
        let value = mine.effective_value(effects);
        belts.push(out, value);
        Ok(Some(value))
    }

    /// Module evaluation for operators, splitters and mergers. Other
    /// variants do nothing here.
    pub fn process(
        &mut self,
        belts: &mut Conveyors,
        events: &mut EventLog,
    ) -> Result<(), StructureError> {
        if !matches!(
            self.kind,
            StructureKind::Operator(_) | StructureKind::Splitter(_) | StructureKind::Merger(_)
        ) {
            return Ok(());
        }
        self.check_ports(belts)?;
        let pos = self.grid_pos;
        let ports = self.ports;
        match &mut self.kind {
            StructureKind::Operator(op) => process_operator(op, pos, &ports, belts, events),
            StructureKind::Splitter(sp) => process_splitter(sp, pos, &ports, belts, events),
            StructureKind::Merger(_) => process_merger(&ports, belts),
            StructureKind::Mine(_) | StructureKind::Well(_) => {}
        }
        Ok(())
    }

    /// Consumption check. Returns what happened to the arriving token, or
    /// `None` if this is not an unlocked well with a ready input.
    pub fn consume(
        &self,
        belts: &mut Conveyors,
        effects: &[UpgradeEffect],
    ) -> Result<Option<WellOutcome>, StructureError> {
        let StructureKind::Well(well) = &self.kind else {
            return Ok(None);
        };
        if well.locked {
            return Ok(None);
        }
        let Some(input) = self.ports.input1 else {
            return Ok(None);
        };
        self.check_ports(belts)?;
        let Some(value) = belts.pop(input) else {
            return Ok(None);
        };
        let required = well.effective_consuming(effects);
        if value == required {
            Ok(Some(WellOutcome::Scored {
                value,
                award: Well::award(value),
            }))
        } else {
            Ok(Some(WellOutcome::Discarded { value, required }))
        }
    }
}

// ---------------------------------------------------------------------------
// Variant processing
// ---------------------------------------------------------------------------

fn process_operator(
    op: &OperatorModule,
    pos: GridPos,
    ports: &Ports,
    belts: &mut Conveyors,
    events: &mut EventLog,
) {
    let (Some(in1), Some(in2), Some(out)) = (ports.input1, ports.input2, ports.output1) else {
        return;
    };
    if !(belts.is_ready(in1) && belts.is_ready(in2)) {
        return;
    }
    let (Some(lhs), Some(rhs)) = (belts.pop(in1), belts.pop(in2)) else {
        return;
    };
    match op.operation.apply(lhs, rhs) {
        OperationOutcome::Single(value) => {
            belts.push(out, value);
        }
        OperationOutcome::QuotientRemainder {
            quotient,
            remainder,
        } => {
            belts.push(out, quotient);
            if let Some(out2) = ports.output2 {
                belts.push(out2, remainder);
            }
        }
        OperationOutcome::Dropped(reason) => events.emit(Event::OperationDropped {
            pos,
            operation: op.operation,
            lhs,
            rhs,
            reason,
        }),
    }
}

fn process_splitter(
    sp: &mut Splitter,
    pos: GridPos,
    ports: &Ports,
    belts: &mut Conveyors,
    events: &mut EventLog,
) {
    let Some(input) = ports.input1 else {
        return;
    };
    let Some(value) = belts.pop(input) else {
        return;
    };
    let target = if sp.toggle {
        ports.output2
    } else {
        ports.output1
    };
    match target {
        Some(out) => {
            belts.push(out, value);
        }
        None => events.emit(Event::SplitterDropped { pos, value }),
    }
    sp.toggle = !sp.toggle;
}

fn process_merger(ports: &Ports, belts: &mut Conveyors) {
    let Some(out) = ports.output1 else {
        return;
    };
    for input in [ports.input1, ports.input2].into_iter().flatten() {
        if let Some(value) = belts.pop(input) {
            belts.push(out, value);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
