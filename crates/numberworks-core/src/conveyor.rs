//! Timed FIFO conveyor belts carrying numeric tokens between structures.
//!
//! A conveyor joins two pixel endpoints. Tokens enter at the start with zero
//! elapsed time, all tokens advance together each frame, and a token becomes
//! *ready* once its elapsed time reaches the belt's effective travel time.
//! Only the head token can leave the belt, and only when it is ready.
//!
//! Belts live in a [`Conveyors`] arena keyed by [`ConveyorId`]. The arena
//! remembers insertion order: belts always advance in that order, and a
//! belt wired directly into another belt (no structure at the junction)
//! hands its ready head token across once every belt has advanced.

use std::collections::VecDeque;

use slotmap::SlotMap;

use crate::fixed::{Fixed64, Millis, scale_millis};
use crate::id::{ConveyorId, PixelPos, Value};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A single value in transit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: Value,
    /// Milliseconds travelled, clamped to the belt's effective travel time.
    pub elapsed: Fixed64,
    /// Set once `elapsed` has reached the effective travel time.
    pub arrived: bool,
}

impl Token {
    fn new(value: Value) -> Self {
        Self {
            value,
            elapsed: Fixed64::ZERO,
            arrived: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Conveyor
// ---------------------------------------------------------------------------

/// One belt segment between two pixel endpoints.
#[derive(Debug, Clone)]
pub struct Conveyor {
    pub start: PixelPos,
    pub end: PixelPos,
    /// Base travel time in milliseconds, before speed upgrades.
    pub travel_time: Millis,
    /// Travel time after the most recent speed factor was applied.
    effective_travel: Fixed64,
    tokens: VecDeque<Token>,
    /// Downstream belt fed directly when no structure sits at the junction.
    pub(crate) output_conveyor: Option<ConveyorId>,
}

impl Conveyor {
    pub fn new(start: PixelPos, end: PixelPos, travel_time: Millis) -> Self {
        Self {
            start,
            end,
            travel_time,
            effective_travel: Fixed64::saturating_from_num(travel_time),
            tokens: VecDeque::new(),
            output_conveyor: None,
        }
    }

    /// Append a token at the start of the belt.
    pub fn push(&mut self, value: Value) {
        self.tokens.push_back(Token::new(value));
    }

    /// Advance every token by `dt` at base speed.
    pub fn update(&mut self, dt: Millis) {
        self.advance(dt, Fixed64::ONE);
    }

    /// Advance every token by `dt`, with the travel time scaled by
    /// `speed_factor` (values below one make the belt faster).
    pub fn advance(&mut self, dt: Millis, speed_factor: Fixed64) {
        self.effective_travel = scale_millis(self.travel_time, speed_factor);
        let step = Fixed64::saturating_from_num(dt);
        for token in &mut self.tokens {
            token.elapsed = token.elapsed.saturating_add(step).min(self.effective_travel);
            if token.elapsed >= self.effective_travel {
                token.arrived = true;
            }
        }
    }

    /// Remove and return the head value if it has arrived. Never partial.
    pub fn pop(&mut self) -> Option<Value> {
        if self.is_ready() {
            self.tokens.pop_front().map(|t| t.value)
        } else {
            None
        }
    }

    /// The head token, without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether the head token has reached the end of the belt.
    pub fn is_ready(&self) -> bool {
        self.tokens.front().is_some_and(|t| t.arrived)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    /// Fractional progress of a token in `[0, 1]`.
    pub fn progress(&self, token: &Token) -> Fixed64 {
        if token.arrived || self.effective_travel <= Fixed64::ZERO {
            return Fixed64::ONE;
        }
        (token.elapsed / self.effective_travel).min(Fixed64::ONE)
    }

    /// The belt fed directly by this one, if any.
    pub fn output_conveyor(&self) -> Option<ConveyorId> {
        self.output_conveyor
    }
}

// ---------------------------------------------------------------------------
// Conveyors arena
// ---------------------------------------------------------------------------

/// All live belts, in insertion order.
#[derive(Debug, Default)]
pub struct Conveyors {
    belts: SlotMap<ConveyorId, Conveyor>,
    order: Vec<ConveyorId>,
}

impl Conveyors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conveyor: Conveyor) -> ConveyorId {
        let id = self.belts.insert(conveyor);
        self.order.push(id);
        id
    }

    /// Remove a belt. Any belt chained into it loses that link.
    pub fn remove(&mut self, id: ConveyorId) -> Option<Conveyor> {
        let removed = self.belts.remove(id)?;
        self.order.retain(|&other| other != id);
        for (_, belt) in &mut self.belts {
            if belt.output_conveyor == Some(id) {
                belt.output_conveyor = None;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: ConveyorId) -> Option<&Conveyor> {
        self.belts.get(id)
    }

    pub fn get_mut(&mut self, id: ConveyorId) -> Option<&mut Conveyor> {
        self.belts.get_mut(id)
    }

    pub fn contains(&self, id: ConveyorId) -> bool {
        self.belts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Belt IDs in insertion order.
    pub fn ids(&self) -> &[ConveyorId] {
        &self.order
    }

    /// Belts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ConveyorId, &Conveyor)> {
        self.order.iter().filter_map(|&id| self.belts.get(id).map(|c| (id, c)))
    }

    /// Push onto a belt. Returns false if the belt does not exist.
    pub fn push(&mut self, id: ConveyorId, value: Value) -> bool {
        match self.belts.get_mut(id) {
            Some(belt) => {
                belt.push(value);
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self, id: ConveyorId) -> Option<Value> {
        self.belts.get_mut(id)?.pop()
    }

    pub fn is_ready(&self, id: ConveyorId) -> bool {
        self.belts.get(id).is_some_and(Conveyor::is_ready)
    }

    /// Advance every belt in insertion order, then hand ready head tokens
    /// across direct belt-to-belt links.
    ///
    /// Handoffs land after the whole pass, so a token never crosses more
    /// than one link per frame regardless of belt order.
    pub fn advance_all(&mut self, dt: Millis, speed_factor: Fixed64) {
        let mut handoffs = Vec::new();
        for &id in &self.order {
            let Some(belt) = self.belts.get_mut(id) else {
                continue;
            };
            belt.advance(dt, speed_factor);
            if let Some(next) = belt.output_conveyor
                && let Some(value) = belt.pop()
            {
                handoffs.push((next, value));
            }
        }
        for (next, value) in handoffs {
            self.push(next, value);
        }
    }

    /// Total tokens in transit across all belts.
    pub fn token_count(&self) -> usize {
        self.belts.values().map(Conveyor::len).sum()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64;

    fn belt(travel_time: Millis) -> Conveyor {
        Conveyor::new(PixelPos::new(32, 32), PixelPos::new(96, 32), travel_time)
    }

    // -----------------------------------------------------------------------
    // Test 1: pop before arrival yields nothing
    // -----------------------------------------------------------------------
    #[test]
    fn pop_before_arrival_is_none() {
        let mut c = belt(2000);
        c.push(7);
        assert_eq!(c.pop(), None);
        c.update(1999);
        assert!(!c.is_ready());
        assert_eq!(c.pop(), None);
        assert_eq!(c.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Test 2: token becomes poppable exactly at travel time
    // -----------------------------------------------------------------------
    #[test]
    fn token_ready_at_travel_time() {
        let mut c = belt(2000);
        c.push(7);
        c.update(1000);
        c.update(1000);
        assert!(c.is_ready());
        assert_eq!(c.pop(), Some(7));
        assert!(c.is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 3: FIFO order preserved
    // -----------------------------------------------------------------------
    #[test]
    fn fifo_order() {
        let mut c = belt(3000);
        for v in [3, 1, 4, 1, 5] {
            c.push(v);
        }
        // Thirds of the travel time sum exactly to it.
        for _ in 0..3 {
            c.update(1000);
        }
        let popped: Vec<Value> = std::iter::from_fn(|| c.pop()).collect();
        assert_eq!(popped, vec![3, 1, 4, 1, 5]);
    }

    // -----------------------------------------------------------------------
    // Test 4: a later token does not make the head ready
    // -----------------------------------------------------------------------
    #[test]
    fn only_head_can_pop() {
        let mut c = belt(1000);
        c.push(1);
        c.update(500);
        c.push(2);
        c.update(500);
        assert_eq!(c.pop(), Some(1));
        assert_eq!(c.pop(), None, "second token is only half way");
        c.update(500);
        assert_eq!(c.pop(), Some(2));
    }

    // -----------------------------------------------------------------------
    // Test 5: progress is clamped to one
    // -----------------------------------------------------------------------
    #[test]
    fn progress_clamped() {
        let mut c = belt(1000);
        c.push(9);
        c.update(250);
        let head = c.peek().cloned().unwrap();
        assert_eq!(c.progress(&head), f64_to_fixed64(0.25));
        c.update(5000);
        let head = c.peek().cloned().unwrap();
        assert_eq!(c.progress(&head), Fixed64::ONE);
        assert_eq!(head.elapsed, Fixed64::from_num(1000));
    }

    // -----------------------------------------------------------------------
    // Test 6: speed factor shortens travel
    // -----------------------------------------------------------------------
    #[test]
    fn speed_factor_shortens_travel() {
        let mut c = belt(2000);
        c.push(4);
        c.advance(1000, f64_to_fixed64(0.5));
        assert!(c.is_ready());
    }

    // -----------------------------------------------------------------------
    // Test 7: zero travel time arrives on the first update
    // -----------------------------------------------------------------------
    #[test]
    fn zero_travel_time() {
        let mut c = belt(0);
        c.push(1);
        assert!(!c.is_ready());
        c.update(0);
        assert!(c.is_ready());
    }

    // -----------------------------------------------------------------------
    // Test 8: chained belts hand tokens across
    // -----------------------------------------------------------------------
    #[test]
    fn chained_belts_hand_off() {
        let mut arena = Conveyors::new();
        let a = arena.insert(belt(1000));
        let b = arena.insert(belt(1000));
        arena.get_mut(a).unwrap().output_conveyor = Some(b);

        arena.push(a, 42);
        arena.advance_all(1000, Fixed64::ONE);
        assert!(arena.get(a).unwrap().is_empty());
        assert_eq!(arena.get(b).unwrap().len(), 1);
        // The handed-over token starts its trip on b from zero.
        assert!(!arena.is_ready(b));

        arena.advance_all(1000, Fixed64::ONE);
        assert_eq!(arena.pop(b), Some(42));
    }

    // -----------------------------------------------------------------------
    // Test 9: removing a belt clears links into it
    // -----------------------------------------------------------------------
    #[test]
    fn remove_clears_links() {
        let mut arena = Conveyors::new();
        let a = arena.insert(belt(1000));
        let b = arena.insert(belt(1000));
        arena.get_mut(a).unwrap().output_conveyor = Some(b);
        assert!(arena.remove(b).is_some());
        assert_eq!(arena.get(a).unwrap().output_conveyor(), None);
        assert_eq!(arena.ids(), &[a]);
        assert!(!arena.push(b, 1));
    }

    // -----------------------------------------------------------------------
    // Test 10: iteration follows insertion order
    // -----------------------------------------------------------------------
    #[test]
    fn iteration_in_insertion_order() {
        let mut arena = Conveyors::new();
        let ids: Vec<_> = (0..4).map(|i| arena.insert(belt(100 * (i + 1)))).collect();
        arena.remove(ids[1]);
        let d = arena.insert(belt(999));
        let seen: Vec<_> = arena.iter().map(|(id, _)| id).collect();
        assert_eq!(seen, vec![ids[0], ids[2], ids[3], d]);
    }
}
