//! The simulation engine: owns the grid, the belts and the economy, and runs
//! the per-frame pipeline.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A [`Grid`] of structures (mines, wells, modules)
//! - The [`Conveyors`] arena, in insertion order
//! - The point total, upgrade counters and the effects derived from them
//! - A [`ProductionClock`] for the global production tick
//! - The [`ActionQueue`] of pending upgrade purchases
//! - An [`EventLog`] drained by the caller after each frame
//!
//! There is no global state; the run loop holds the engine and passes it
//! wherever it is needed.
//!
//! # Frame pipeline
//!
//! Each `step(dt)` runs:
//! 1. **Transport** -- advance every belt, then hand tokens across belt links
//! 2. **Production** -- if the production interval has elapsed, every mine emits
//! 3. **Modules** -- operators, splitters and mergers evaluate in row-major order
//! 4. **Actions** -- drain the upgrade queue, stopping at the first success
//! 5. **Consumption** -- wells take ready tokens and score matches
//! 6. **Bookkeeping** -- unlock wells whose objective is met, bump the frame

use std::mem;

use crate::action_queue::{ActionQueue, Resolution};
use crate::config::{ConfigError, GameConfig};
use crate::conveyor::{Conveyor, Conveyors};
use crate::event::{Event, EventLog, EventRecord};
use crate::fixed::{Fixed64, Millis};
use crate::grid::{Grid, PlaceError};
use crate::id::{ConveyorId, GridPos, Value};
use crate::sim::{ProductionClock, StateHash};
use crate::structure::{Structure, StructureKind, WellOutcome};
use crate::upgrade::{UpgradeCounters, UpgradeEffect, UpgradeError, UpgradeKind, speed_factor};
use crate::wiring::{WiringReport, rewire};

// ---------------------------------------------------------------------------
// Frame summary
// ---------------------------------------------------------------------------

/// What one call to [`Engine::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Whether the production tick fired.
    pub produced: bool,
    /// Points scored by wells this frame.
    pub points_awarded: i64,
    /// Upgrade applied this frame, if any.
    pub upgrade: Option<UpgradeKind>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Engine {
    pub(crate) config: GameConfig,
    pub(crate) grid: Grid,
    pub(crate) belts: Conveyors,
    pub(crate) points: i64,
    pub(crate) counters: UpgradeCounters,
    /// Re-derived from `counters` whenever they change.
    pub(crate) effects: Vec<UpgradeEffect>,
    pub(crate) clock: ProductionClock,
    pub(crate) frame: u64,
    pub(crate) events: EventLog,
    pub(crate) actions: ActionQueue,
    pub(crate) wiring: WiringReport,
}

impl Engine {
    /// An engine with an empty grid of the configured size.
    pub fn new(config: GameConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(
            config.clone(),
            Grid::new(config.grid_width, config.grid_height),
            Conveyors::new(),
            config.starting_points,
            UpgradeCounters::default(),
        ))
    }

    /// An engine with the configured starting mines and wells.
    pub fn with_default_map(config: GameConfig) -> Result<Self, ConfigError> {
        let mut engine = Self::new(config)?;
        let mines: Vec<_> = engine
            .config
            .starting_mines
            .iter()
            .map(|m| (GridPos::new(m.x, m.y), Structure::mine(m.number)))
            .collect();
        let wells: Vec<_> = engine
            .config
            .starting_wells
            .iter()
            .map(|w| (GridPos::new(w.x, w.y), engine.new_well(w.consuming_number)))
            .collect();
        for (pos, structure) in mines.into_iter().chain(wells) {
            engine
                .grid
                .place_structure(pos, structure)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        engine.rewire();
        tracing::info!(
            target: "numberworks::engine",
            structures = engine.grid.occupied_count(),
            "engine.default_map"
        );
        Ok(engine)
    }

    /// Assemble an engine from restored state. Effects are re-derived from
    /// the counters and the wiring is rebuilt.
    pub(crate) fn from_parts(
        config: GameConfig,
        grid: Grid,
        belts: Conveyors,
        points: i64,
        counters: UpgradeCounters,
    ) -> Self {
        let effects = config.upgrades.effects(&counters);
        let mut engine = Self {
            actions: ActionQueue::new(config.actions.max_tries),
            events: EventLog::with_capacity(config.event_capacity),
            config,
            grid,
            belts,
            points,
            counters,
            effects,
            clock: ProductionClock::new(),
            frame: 0,
            wiring: WiringReport::default(),
        };
        engine.rewire();
        engine
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn belts(&self) -> &Conveyors {
        &self.belts
    }

    pub fn points(&self) -> i64 {
        self.points
    }

    pub fn counters(&self) -> &UpgradeCounters {
        &self.counters
    }

    pub fn effects(&self) -> &[UpgradeEffect] {
        &self.effects
    }

    /// Frames stepped since construction or load.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn actions(&self) -> &ActionQueue {
        &self.actions
    }

    /// Result of the most recent reconnection pass.
    pub fn wiring(&self) -> &WiringReport {
        &self.wiring
    }

    /// Milliseconds since the last production tick.
    pub fn production_accumulator(&self) -> u64 {
        self.clock.accumulator
    }

    /// Product of all active speed factors.
    pub fn speed_factor(&self) -> Fixed64 {
        speed_factor(&self.effects)
    }

    /// Effective value of the mine at `pos`.
    pub fn mine_output(&self, pos: GridPos) -> Option<Value> {
        match &self.grid.structure_at(pos)?.kind {
            StructureKind::Mine(mine) => Some(mine.effective_value(&self.effects)),
            _ => None,
        }
    }

    /// Effective consuming number of the well at `pos`.
    pub fn well_requirement(&self, pos: GridPos) -> Option<Value> {
        match &self.grid.structure_at(pos)?.kind {
            StructureKind::Well(well) => Some(well.effective_consuming(&self.effects)),
            _ => None,
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Remove and return every buffered event.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.events.drain()
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// A well for `consuming_number`, locked if its objective is not yet met.
    pub fn new_well(&self, consuming_number: Value) -> Structure {
        match self.config.objective_for(consuming_number) {
            Some(required) if self.points < required => Structure::locked_well(consuming_number),
            _ => Structure::well(consuming_number),
        }
    }

    /// Place a structure and rewire. No cost is charged.
    pub fn place_structure(
        &mut self,
        pos: GridPos,
        structure: Structure,
    ) -> Result<(), PlaceError> {
        self.grid.place_structure(pos, structure)?;
        self.rewire();
        Ok(())
    }

    /// Remove a structure and rewire. Belts touching the cell are kept.
    pub fn remove_structure(&mut self, pos: GridPos) -> Option<Structure> {
        let removed = self.grid.remove_structure(pos)?;
        self.rewire();
        Some(removed)
    }

    /// Insert a belt between two cell centers and rewire. No cost is charged.
    pub fn add_conveyor(
        &mut self,
        start: GridPos,
        end: GridPos,
        travel_time: Millis,
    ) -> ConveyorId {
        let cs = self.config.cell_size;
        let id = self
            .belts
            .insert(Conveyor::new(start.center(cs), end.center(cs), travel_time));
        self.rewire();
        id
    }

    pub fn remove_conveyor(&mut self, id: ConveyorId) -> Option<Conveyor> {
        let removed = self.belts.remove(id)?;
        self.rewire();
        Some(removed)
    }

    /// Rebuild every port binding from belt endpoints.
    pub fn rewire(&mut self) {
        self.wiring = rewire(&mut self.grid, &mut self.belts, self.config.cell_size);
    }

    // -----------------------------------------------------------------------
    // Upgrades
    // -----------------------------------------------------------------------

    /// Queue an upgrade purchase for the next frame's action phase.
    pub fn enqueue_upgrade(&mut self, kind: UpgradeKind) {
        self.actions.push(kind);
    }

    /// Try to buy one use of `kind` right now. On failure nothing changes.
    pub fn try_apply_upgrade(&mut self, kind: UpgradeKind) -> Result<(), UpgradeError> {
        let table = &self.config.upgrades;
        let cost = table
            .next_cost(kind, &self.counters)
            .ok_or(UpgradeError::Capped(kind))?;
        if self.points < cost {
            return Err(UpgradeError::InsufficientPoints {
                needed: cost,
                available: self.points,
            });
        }

        match kind {
            UpgradeKind::Speed => {
                let has_target = !self.belts.is_empty() || self.has_mine();
                if !has_target {
                    return Err(UpgradeError::NoEligibleTarget);
                }
            }
            UpgradeKind::Efficiency => {
                let has_target = self.grid.iter().any(|(_, s)| {
                    matches!(s.kind, StructureKind::Mine(_) | StructureKind::Well(_))
                });
                if !has_target {
                    return Err(UpgradeError::NoEligibleTarget);
                }
            }
            UpgradeKind::Mine => {
                let value = table
                    .next_mine_value(&self.counters)
                    .ok_or(UpgradeError::Capped(kind))?;
                let pos = self.grid.first_empty().ok_or(UpgradeError::NoEmptyCell)?;
                self.grid
                    .place_structure(pos, Structure::mine(value))
                    .map_err(|_| UpgradeError::NoEmptyCell)?;
                self.rewire();
            }
        }

        self.points -= cost;
        self.counters.increment(kind);
        self.effects = self.config.upgrades.effects(&self.counters);
        let uses_used = self.counters.uses(kind);
        tracing::info!(
            target: "numberworks::upgrade",
            kind = ?kind,
            uses_used,
            cost,
            points = self.points,
            "upgrade.applied"
        );
        self.events.emit(Event::UpgradeApplied {
            kind,
            uses_used,
            cost,
        });
        Ok(())
    }

    fn has_mine(&self) -> bool {
        self.grid
            .iter()
            .any(|(_, s)| matches!(s.kind, StructureKind::Mine(_)))
    }

    // -----------------------------------------------------------------------
    // Frame pipeline
    // -----------------------------------------------------------------------

    /// Run one frame of `dt` milliseconds.
    pub fn step(&mut self, dt: Millis) -> FrameSummary {
        self.events.begin_frame(self.frame);
        let mut summary = FrameSummary::default();
        let factor = speed_factor(&self.effects);

        // Phase 1: Transport.
        self.belts.advance_all(dt, factor);

        // Phase 2: Production.
        if self
            .clock
            .tick(dt, self.config.production_interval_ms, factor)
        {
            summary.produced = true;
            self.phase_produce();
        }

        // Phase 3: Modules.
        self.grid.update(&mut self.belts, &mut self.events);

        // Phase 4: Actions.
        summary.upgrade = self.phase_actions();

        // Phase 5: Consumption.
        summary.points_awarded = self.phase_consume();

        // Phase 6: Bookkeeping.
        self.unlock_objectives();
        self.frame += 1;
        summary
    }

    /// Run `frames` frames of `dt` each, returning the total points scored.
    pub fn run(&mut self, frames: u64, dt: Millis) -> i64 {
        (0..frames).map(|_| self.step(dt).points_awarded).sum()
    }

    fn phase_produce(&mut self) {
        let effects = &self.effects;
        let belts = &mut self.belts;
        let produced = self
            .grid
            .run_each(&mut self.events, |s| s.produce(belts, effects));
        for (pos, value) in produced {
            self.events.emit(Event::TokenProduced { pos, value });
        }
    }

    fn phase_actions(&mut self) -> Option<UpgradeKind> {
        if self.actions.is_empty() {
            return None;
        }
        let limit = self.config.actions.actions_per_frame;
        let mut queue = mem::take(&mut self.actions);
        let resolutions = queue.drain(limit, |kind| self.try_apply_upgrade(kind));
        self.actions = queue;

        let mut applied = None;
        for resolution in resolutions {
            match resolution {
                Resolution::Applied(action) => applied = Some(action.kind),
                Resolution::Retried { action, reason } => {
                    tracing::debug!(
                        target: "numberworks::upgrade",
                        kind = ?action.kind,
                        tries = action.tries,
                        reason = %reason,
                        "action.retry"
                    );
                    self.events.emit(Event::ActionRetried {
                        kind: action.kind,
                        tries: action.tries,
                        reason,
                    });
                }
                Resolution::Dropped { action, reason } => {
                    tracing::debug!(
                        target: "numberworks::upgrade",
                        kind = ?action.kind,
                        tries = action.tries,
                        reason = %reason,
                        "action.dropped"
                    );
                    self.events.emit(Event::ActionDropped {
                        kind: action.kind,
                        tries: action.tries,
                    });
                }
            }
        }
        applied
    }

    fn phase_consume(&mut self) -> i64 {
        let effects = &self.effects;
        let belts = &mut self.belts;
        let outcomes = self
            .grid
            .run_each(&mut self.events, |s| s.consume(belts, effects));
        let mut awarded = 0;
        for (pos, outcome) in outcomes {
            match outcome {
                WellOutcome::Scored { value, award } => {
                    self.points = self.points.saturating_add(award);
                    awarded += award;
                    self.events.emit(Event::WellScored { pos, value, award });
                }
                WellOutcome::Discarded { value, required } => {
                    self.events.emit(Event::TokenDiscarded {
                        pos,
                        value,
                        required,
                    });
                }
            }
        }
        awarded
    }

    fn unlock_objectives(&mut self) {
        let points = self.points;
        for structure in self.grid.iter_mut() {
            let pos = structure.grid_pos();
            let StructureKind::Well(well) = &mut structure.kind else {
                continue;
            };
            if !well.locked {
                continue;
            }
            let met = self
                .config
                .objective_for(well.base_consuming)
                .is_none_or(|required| points >= required);
            if met {
                well.locked = false;
                tracing::info!(
                    target: "numberworks::engine",
                    x = pos.x,
                    y = pos.y,
                    consuming_number = well.base_consuming,
                    "well.unlocked"
                );
                self.events.emit(Event::WellUnlocked {
                    pos,
                    consuming_number: well.base_consuming,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Hash of everything that determines future frames: structures and
    /// their bindings, belts and their tokens, points, counters and the
    /// production accumulator. The frame counter is excluded.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        let order = self.belts.ids();
        let belt_index =
            |id: Option<ConveyorId>| id.and_then(|id| order.iter().position(|&b| b == id));

        h.write_u32(self.grid.width());
        h.write_u32(self.grid.height());
        for (pos, s) in self.grid.iter() {
            h.write_i32(pos.x);
            h.write_i32(pos.y);
            h.write_str(s.class_name());
            match &s.kind {
                StructureKind::Mine(m) => h.write_i64(m.base_value),
                StructureKind::Well(w) => {
                    h.write_i64(w.base_consuming);
                    h.write_bool(w.locked);
                }
                StructureKind::Splitter(sp) => h.write_bool(sp.toggle),
                StructureKind::Operator(_) | StructureKind::Merger(_) => {}
            }
            let p = s.ports();
            for id in [p.input1, p.input2, p.output1, p.output2] {
                h.write_opt_index(belt_index(id));
            }
        }

        h.write_u64(self.belts.len() as u64);
        for (_, belt) in self.belts.iter() {
            h.write_i32(belt.start.x);
            h.write_i32(belt.start.y);
            h.write_i32(belt.end.x);
            h.write_i32(belt.end.y);
            h.write_u32(belt.travel_time);
            h.write_opt_index(belt_index(belt.output_conveyor()));
            h.write_u64(belt.len() as u64);
            for token in belt.tokens() {
                h.write_i64(token.value);
                h.write_fixed64(token.elapsed);
                h.write_bool(token.arrived);
            }
        }

        h.write_i64(self.points);
        h.write_u32(self.counters.speed_uses_used);
        h.write_u32(self.counters.eff_uses_used);
        h.write_u32(self.counters.mine_uses_used);
        h.write_u64(self.clock.accumulator);
        h.finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::structure::Operation;
    use crate::test_utils::*;

    // Test 1: mine -> well scores doubled prime and leaves the belt empty
    #[test]
    fn prime_match_scores_double() {
        let (mut engine, belt) = mine_to_well(7, 7, 2000);
        engine.config.production_interval_ms = 10_000;
        engine.step(10_000); // production fires, token enters belt
        assert_eq!(engine.points(), 0);
        engine.step(2000); // token arrives and is consumed
        assert_eq!(engine.points(), 14);
        assert!(engine.belts().get(belt).unwrap().is_empty());
        assert_eq!(engine.events().count(EventKind::WellScored), 1);
    }

    // Test 2: mismatch discards without scoring
    #[test]
    fn mismatch_discards() {
        let (mut engine, belt) = mine_to_well(7, 5, 2000);
        engine.config.production_interval_ms = 10_000;
        engine.step(10_000);
        engine.step(2000);
        assert_eq!(engine.points(), 0);
        assert!(engine.belts().get(belt).unwrap().is_empty());
        assert_eq!(engine.events().count(EventKind::TokenDiscarded), 1);
    }

    // Test 3: production waits for the interval
    #[test]
    fn production_respects_interval() {
        let (mut engine, belt) = mine_to_well(4, 4, 10_000);
        assert!(!engine.step(1999).produced);
        assert!(engine.belts().get(belt).unwrap().is_empty());
        assert!(engine.step(1).produced);
        assert_eq!(engine.belts().get(belt).unwrap().len(), 1);
    }

    // Test 4: a mine with no belt produces nothing and nothing breaks
    #[test]
    fn unconnected_mine_is_skipped() {
        let mut engine = empty_engine(4, 4);
        engine
            .place_structure(GridPos::new(0, 0), Structure::mine(3))
            .unwrap();
        let summary = engine.step(2000);
        assert!(summary.produced);
        assert_eq!(engine.events().count(EventKind::TokenProduced), 0);
        assert_eq!(engine.belts().token_count(), 0);
    }

    // Test 5: an operator chain produces the combined value
    #[test]
    fn sum_module_feeds_well() {
        let mut engine = empty_engine(6, 5);
        engine.place_structure(GridPos::new(0, 0), Structure::mine(2)).unwrap();
        engine.place_structure(GridPos::new(0, 4), Structure::mine(3)).unwrap();
        engine
            .place_structure(GridPos::new(2, 2), Structure::operator(Operation::Sum))
            .unwrap();
        engine.place_structure(GridPos::new(5, 2), Structure::well(5)).unwrap();
        engine.add_conveyor(GridPos::new(0, 0), GridPos::new(2, 2), 1000);
        engine.add_conveyor(GridPos::new(0, 4), GridPos::new(2, 2), 1000);
        engine.add_conveyor(GridPos::new(2, 2), GridPos::new(5, 2), 1000);

        engine.step(2000); // produce
        engine.step(1000); // inputs arrive, sum fires
        engine.step(1000); // sum arrives at well
        assert_eq!(engine.points(), 10);
    }

    // Test 6: speed upgrade shortens the production interval
    #[test]
    fn speed_upgrade_applies_to_interval() {
        let (mut engine, _) = mine_to_well(2, 2, 1000);
        engine.points = 100;
        engine.try_apply_upgrade(UpgradeKind::Speed).unwrap();
        assert_eq!(engine.points(), 80);
        assert_eq!(engine.counters().speed_uses_used, 1);
        // 2000 * 0.9 = 1800
        assert!(!engine.step(1799).produced);
        assert!(engine.step(1).produced);
    }

    // Test 7: efficiency raises mine output and well requirement together
    #[test]
    fn efficiency_shifts_both_ends() {
        let (mut engine, _) = mine_to_well(2, 2, 1000);
        engine.points = 100;
        engine.try_apply_upgrade(UpgradeKind::Efficiency).unwrap();
        assert_eq!(engine.mine_output(GridPos::new(0, 0)), Some(3));
        assert_eq!(engine.well_requirement(GridPos::new(4, 0)), Some(3));
        engine.step(2000);
        engine.step(1000);
        assert_eq!(engine.points(), 70 + 6);
    }

    // Test 8: mine purchase fills the first empty cell
    #[test]
    fn mine_upgrade_places_mine() {
        let mut engine = empty_engine(3, 1);
        engine.place_structure(GridPos::new(0, 0), Structure::mine(1)).unwrap();
        engine.points = 100;
        engine.try_apply_upgrade(UpgradeKind::Mine).unwrap();
        assert_eq!(engine.mine_output(GridPos::new(1, 0)), Some(2));
        assert_eq!(engine.points(), 50);
    }

    // Test 9: failures leave state untouched
    #[test]
    fn failed_upgrade_changes_nothing() {
        let mut engine = empty_engine(1, 1);
        engine.place_structure(GridPos::new(0, 0), Structure::mine(1)).unwrap();
        let before = engine.state_hash();
        assert_eq!(
            engine.try_apply_upgrade(UpgradeKind::Speed),
            Err(UpgradeError::InsufficientPoints {
                needed: 20,
                available: 0
            })
        );
        engine.points = 1000;
        assert_eq!(
            engine.try_apply_upgrade(UpgradeKind::Mine),
            Err(UpgradeError::NoEmptyCell)
        );
        engine.points = 0;
        assert_eq!(engine.state_hash(), before);
    }

    // Test 10: nothing to upgrade
    #[test]
    fn efficiency_needs_target() {
        let mut engine = empty_engine(2, 2);
        engine.points = 100;
        assert_eq!(
            engine.try_apply_upgrade(UpgradeKind::Efficiency),
            Err(UpgradeError::NoEligibleTarget)
        );
    }

    // Test 11: queued action with no points is dropped after max_tries frames
    #[test]
    fn queued_action_dropped() {
        let (mut engine, _) = mine_to_well(2, 3, 1000);
        let max_tries = engine.actions().max_tries();
        engine.enqueue_upgrade(UpgradeKind::Speed);
        for _ in 0..max_tries {
            engine.step(16);
        }
        assert!(engine.actions().is_empty());
        assert_eq!(engine.events().count(EventKind::ActionDropped), 1);
        assert_eq!(engine.counters().speed_uses_used, 0);
        assert_eq!(engine.points(), 0);
    }

    // Test 12: only one upgrade per frame
    #[test]
    fn one_upgrade_per_frame() {
        let (mut engine, _) = mine_to_well(2, 2, 1000);
        engine.points = 1000;
        engine.enqueue_upgrade(UpgradeKind::Speed);
        engine.enqueue_upgrade(UpgradeKind::Efficiency);
        assert_eq!(engine.step(16).upgrade, Some(UpgradeKind::Speed));
        assert_eq!(engine.actions().len(), 1);
        assert_eq!(engine.step(16).upgrade, Some(UpgradeKind::Efficiency));
    }

    // Test 13: locked well holds the token until the objective is met
    #[test]
    fn locked_well_waits_then_unlocks() {
        let mut config = small_config(5, 1);
        config.objectives = vec![crate::config::Objective {
            consuming_number: 4,
            required_score: 10,
        }];
        let mut engine = Engine::new(config).unwrap();
        engine.place_structure(GridPos::new(0, 0), Structure::mine(4)).unwrap();
        let well = engine.new_well(4);
        engine.place_structure(GridPos::new(4, 0), well).unwrap();
        let belt = engine.add_conveyor(GridPos::new(0, 0), GridPos::new(4, 0), 1000);

        engine.step(2000);
        engine.step(1000);
        assert_eq!(engine.belts().get(belt).unwrap().len(), 1, "token waits");
        assert_eq!(engine.points(), 0);

        engine.points = 10;
        engine.step(16); // unlocks at end of frame
        assert_eq!(engine.events().count(EventKind::WellUnlocked), 1);
        engine.step(16);
        assert_eq!(engine.points(), 14);
    }

    // Test 14: default map places the configured layout
    #[test]
    fn default_map_layout() {
        let config = GameConfig::default();
        let expected = config.starting_mines.len() + config.starting_wells.len();
        let engine = Engine::with_default_map(config).unwrap();
        assert_eq!(engine.grid().occupied_count(), expected);
        assert_eq!(engine.wiring().first_mine, Some(GridPos::new(1, 2)));
        let locked = engine
            .grid()
            .iter()
            .filter(|(_, s)| matches!(&s.kind, StructureKind::Well(w) if w.locked))
            .count();
        assert_eq!(locked, 2);
    }

    // Test 15: identical engines stay in lockstep
    #[test]
    fn deterministic_hash() {
        let (mut a, _) = mine_to_well(3, 3, 700);
        let (mut b, _) = mine_to_well(3, 3, 700);
        for _ in 0..50 {
            a.step(100);
            b.step(100);
            assert_eq!(a.state_hash(), b.state_hash());
        }
        assert!(a.points() > 0);
    }

    // Test 16: undrained events stay within the configured capacity
    #[test]
    fn event_buffer_is_bounded() {
        let mut config = small_config(5, 1);
        config.event_capacity = 64;
        let mut engine = Engine::new(config).unwrap();
        engine.place_structure(GridPos::new(0, 0), Structure::mine(3)).unwrap();
        engine.place_structure(GridPos::new(4, 0), Structure::well(3)).unwrap();
        engine.add_conveyor(GridPos::new(0, 0), GridPos::new(4, 0), 1000);

        engine.run(2000, 250);
        assert_eq!(engine.events().len(), 64);
        assert!(engine.events().evicted() > 0);
        assert!(engine.events().total_emitted(EventKind::WellScored) > 64);

        let mut lines = sum_lines(5);
        lines.run(4000, 250);
        let held = lines.events().len();
        lines.run(4000, 250);
        assert_eq!(lines.events().len(), held);
        assert!(held <= crate::event::DEFAULT_EVENT_CAPACITY);
    }
}
