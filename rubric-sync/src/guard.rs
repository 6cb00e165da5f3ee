//! Recursion guard threaded through every handler call.
//!
//! The host reports how deep in a trigger chain an invocation sits. Writes
//! the engine makes raise new events one level deeper; those are skipped
//! once the depth passes the configured ceiling. Within one invocation the
//! guard also remembers which cached fields were already rebuilt so a
//! composed entry point never writes the same record twice.

use rubric_core::RecordKey;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursionGuard {
    depth: u32,
    max_depth: u32,
    claimed: BTreeSet<RecordKey>,
}

impl RecursionGuard {
    /// Guard for an invocation at host depth `depth` (1 = user mutation).
    pub fn at_depth(depth: u32, max_depth: u32) -> Self {
        Self {
            depth,
            max_depth,
            claimed: BTreeSet::new(),
        }
    }

    /// Guard for a top-level invocation.
    pub fn top_level(max_depth: u32) -> Self {
        Self::at_depth(1, max_depth)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Whether handlers may run at this depth.
    pub fn admits(&self) -> bool {
        self.depth <= self.max_depth
    }

    /// Guard for the events raised by writes made under this one. The claim
    /// set is carried down the chain.
    pub fn descend(&self) -> Self {
        Self {
            depth: self.depth.saturating_add(1),
            max_depth: self.max_depth,
            claimed: self.claimed.clone(),
        }
    }

    /// Claim `key` for processing. Returns false if it was already claimed.
    pub fn claim(&mut self, key: RecordKey) -> bool {
        self.claimed.insert(key)
    }

    pub fn is_claimed(&self, key: &RecordKey) -> bool {
        self.claimed.contains(key)
    }
}
