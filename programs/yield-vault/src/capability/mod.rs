//! Collaborators the core consumes but does not define.
//!
//! The asset primitive and the AMM are reached only through these traits;
//! `crate::sim` ships in-memory implementations for simulation and tests.

pub mod amm;
pub mod asset;
pub mod clock;

pub use amm::*;
pub use asset::*;
pub use clock::*;

use crate::events::{Event, EventLog};

/// Everything a single operation may touch besides the component's own
/// state: the time it executes at, the token ledger and the audit trail.
pub struct Context<'a, L> {
    pub now: u64,
    pub tokens: &'a mut L,
    pub events: &'a mut EventLog,
}

impl<'a, L> Context<'a, L> {
    pub fn new(now: u64, tokens: &'a mut L, events: &'a mut EventLog) -> Self {
        Self { now, tokens, events }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.emit(event);
    }
}
