//! FIFO of pending upgrade purchases with bounded retry.
//!
//! Purchases are queued by the UI and attempted during the frame's action
//! phase. A failed attempt goes to the back of the queue with its try count
//! bumped; once the count reaches `max_tries` the action is dropped. The
//! first success ends the phase for that frame.

use std::collections::VecDeque;

use crate::upgrade::{UpgradeError, UpgradeKind};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A queued upgrade purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub kind: UpgradeKind,
    /// Failed attempts so far.
    pub tries: u32,
}

impl Action {
    pub fn new(kind: UpgradeKind) -> Self {
        Self { kind, tries: 0 }
    }
}

/// What happened to one action during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Applied(Action),
    Retried { action: Action, reason: UpgradeError },
    Dropped { action: Action, reason: UpgradeError },
}

// ---------------------------------------------------------------------------
// ActionQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActionQueue {
    pending: VecDeque<Action>,
    max_tries: u32,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ActionQueue {
    pub fn new(max_tries: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            max_tries: max_tries.max(1),
        }
    }

    pub fn push(&mut self, kind: UpgradeKind) {
        self.pending.push_back(Action::new(kind));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.pending.iter()
    }

    /// Attempt up to `limit` actions, never more than were queued when the
    /// drain began, stopping after the first success.
    pub fn drain(
        &mut self,
        limit: u32,
        mut attempt: impl FnMut(UpgradeKind) -> Result<(), UpgradeError>,
    ) -> Vec<Resolution> {
        let budget = (limit as usize).min(self.pending.len());
        let mut resolutions = Vec::with_capacity(budget);
        for _ in 0..budget {
            let Some(mut action) = self.pending.pop_front() else {
                break;
            };
            match attempt(action.kind) {
                Ok(()) => {
                    resolutions.push(Resolution::Applied(action));
                    break;
                }
                Err(reason) => {
                    action.tries += 1;
                    if action.tries >= self.max_tries {
                        resolutions.push(Resolution::Dropped { action, reason });
                    } else {
                        self.pending.push_back(action);
                        resolutions.push(Resolution::Retried { action, reason });
                    }
                }
            }
        }
        resolutions
    }
}

// ===========================================================================
// Tests
// ===========================================================================
