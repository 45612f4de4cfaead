//! TW-009: Synthesis session: the shared mutable state of one run.
//!
//! Holds the port allocation history, the singleton registry and the run
//! state. A session is created with its `App` and handed back by
//! `App::into_session` once synthesis is done; whether the allocation
//! history survives into the next app is the caller's `HistoryMode` choice.

use super::allocator::{PortAllocator, WELL_KNOWN_PORTS};
use super::error::{SynthError, SynthResult};
use super::scope::NodeId;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::rc::Rc;

/// What happens to the allocation history when a session is reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// Start the next run with an empty history
    #[default]
    Reset,
    /// Keep handed-out ports so the next run never reuses them
    Persist,
}

/// Where a session is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Declaring,
    Synthesizing,
    Synthesized,
}

enum SingletonSlot {
    Building,
    Ready(Rc<dyn Any>),
}

/// Shared state of one synthesis run.
pub struct Session {
    allocator: PortAllocator,
    singletons: FxHashMap<(NodeId, String), SingletonSlot>,
    unique: FxHashSet<(NodeId, &'static str)>,
    state: RunState,
    runs: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("allocated", &self.allocator.history().len())
            .field("singletons", &self.singletons.len())
            .field("state", &self.state)
            .field("runs", &self.runs)
            .finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            allocator: PortAllocator::with_reserved(&WELL_KNOWN_PORTS),
            singletons: FxHashMap::default(),
            unique: FxHashSet::default(),
            state: RunState::Declaring,
            runs: 0,
        }
    }

    pub fn allocator(&self) -> &PortAllocator {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut PortAllocator {
        &mut self.allocator
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Completed synthesis runs.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    /// Prepare a finished session for a new app. Singleton and uniqueness
    /// records always go, since they refer to the previous tree.
    pub fn recycle(mut self, mode: HistoryMode) -> Self {
        self.singletons.clear();
        self.unique.clear();
        if mode == HistoryMode::Reset {
            self.allocator.reset();
        }
        self.state = RunState::Declaring;
        self
    }

    pub(crate) fn ensure_declaring(&self, what: &str) -> SynthResult<()> {
        match self.state {
            RunState::Declaring => Ok(()),
            _ => Err(SynthError::Sealed(what.to_string())),
        }
    }

    pub(crate) fn begin_synthesis(&mut self) -> SynthResult<()> {
        if self.state != RunState::Declaring {
            return Err(SynthError::AlreadySynthesized);
        }
        self.state = RunState::Synthesizing;
        Ok(())
    }

    pub(crate) fn finish_synthesis(&mut self) {
        self.state = RunState::Synthesized;
        self.runs += 1;
    }

    /// Look up a singleton before anything is built. `Ok(None)` means the
    /// caller now owns the slot and must call `finish_singleton` or
    /// `abort_singleton`.
    pub(crate) fn begin_singleton(
        &mut self,
        stack: NodeId,
        stack_name: &str,
        id: &str,
    ) -> SynthResult<Option<Rc<dyn Any>>> {
        let key = (stack, id.to_string());
        match self.singletons.get(&key) {
            Some(SingletonSlot::Ready(existing)) => Ok(Some(Rc::clone(existing))),
            Some(SingletonSlot::Building) => Err(SynthError::SingletonReentrancy {
                stack: stack_name.to_string(),
                id: id.to_string(),
            }),
            None => {
                self.singletons.insert(key, SingletonSlot::Building);
                Ok(None)
            }
        }
    }

    pub(crate) fn finish_singleton(&mut self, stack: NodeId, id: &str, instance: Rc<dyn Any>) {
        self.singletons
            .insert((stack, id.to_string()), SingletonSlot::Ready(instance));
    }

    pub(crate) fn abort_singleton(&mut self, stack: NodeId, id: &str) {
        self.singletons.remove(&(stack, id.to_string()));
    }

    /// Claim the only instance of `kind` in `stack`. False if already taken.
    pub(crate) fn claim_unique(&mut self, stack: NodeId, kind: &'static str) -> bool {
        self.unique.insert((stack, kind))
    }

    pub(crate) fn release_unique(&mut self, stack: NodeId, kind: &'static str) {
        self.unique.remove(&(stack, kind));
    }
}
