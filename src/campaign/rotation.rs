use std::collections::HashSet;

use super::types::Campaign;

/// Per-surface rotation state: the candidate list, the rotation cursor, and
/// the set of campaign ids already impression-reported for this mount.
///
/// Pure state: the mounted slot drives it from its interval and dispatches
/// the reports. Keeping it free of I/O lets the cardinality rules be tested
/// directly:
///
/// - an id enters the impressed set at most once per candidate-list identity;
/// - replacing the candidate list resets both the cursor and the set;
/// - the cursor is always `index % len`, and never moves for empty or
///   singleton lists.
#[derive(Debug, Default)]
pub struct AdRotation {
    candidates: Vec<Campaign>,
    index: usize,
    impressed: HashSet<i64>,
}

impl AdRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the candidate list. The cursor returns to the front and the
    /// impressed set resets: a refetched list is a new exposure context even
    /// when it contains the same campaigns.
    pub fn set_candidates(&mut self, candidates: Vec<Campaign>) {
        self.candidates = candidates;
        self.index = 0;
        self.impressed.clear();
    }

    /// The campaign currently showing, if any.
    pub fn current(&self) -> Option<&Campaign> {
        self.candidates.get(self.index)
    }

    /// Step the cursor. Lists of one (or none) do not rotate.
    pub fn advance(&mut self) {
        if self.candidates.len() > 1 {
            self.index = (self.index + 1) % self.candidates.len();
        }
    }

    /// The current campaign's id the first time it is observed for this
    /// candidate list, then `None` on every later call until the list
    /// changes. This is the exactly-once gate for impression reporting.
    pub fn take_unreported(&mut self) -> Option<i64> {
        let id = self.current()?.id;
        self.impressed.insert(id).then_some(id)
    }

    /// Whether the interval should be running: rotation only makes sense
    /// with at least two candidates.
    pub fn rotation_enabled(&self) -> bool {
        self.candidates.len() > 1
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[cfg(test)]
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}
