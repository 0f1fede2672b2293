//! Sets of (state, location) pairs touched by propagation.

use std::collections::BTreeSet;

use super::state::StateId;
use crate::circuit::Location;

/// Points touched during a step, or the points of an oscillation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationPoints {
    data: BTreeSet<(StateId, Location)>,
}

impl PropagationPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, state: StateId, loc: Location) {
        self.data.insert((state, loc));
    }

    pub fn contains(&self, state: StateId, loc: Location) -> bool {
        self.data.contains(&(state, loc))
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateId, Location)> + '_ {
        self.data.iter().copied()
    }

    /// Touched locations inside one state.
    pub fn locations_in(&self, state: StateId) -> impl Iterator<Item = Location> + '_ {
        self.data
            .iter()
            .filter(move |(s, _)| *s == state)
            .map(|(_, loc)| *loc)
    }
}
