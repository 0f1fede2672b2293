//! Core types for circuit representation.

use std::cmp::Ordering;
use std::fmt;

/// A grid position inside a circuit.
///
/// Locations order by x first, then y. Wires and splitters rely on that
/// ordering when they normalize endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    /// Create a location at the given coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another location.
    pub fn manhattan_distance_to(&self, other: Location) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Ordering used for pin labeling: top-down, ties broken left-right.
    pub fn cmp_vertical(&self, other: &Location) -> Ordering {
        self.y.cmp(&other.y).then(self.x.cmp(&other.x))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Location {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// A unique identifier for a non-wire component.
///
/// Ids come from the allocator in [`crate::project::SimContext`] and grow
/// monotonically, so ordering by id is ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Number of bits carried at a point. Zero means "not yet known".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BitWidth(u8);

impl BitWidth {
    /// Width that has not been determined.
    pub const UNKNOWN: BitWidth = BitWidth(0);
    /// Single-bit width.
    pub const ONE: BitWidth = BitWidth(1);
    /// Widest value representable by [`super::Value`].
    pub const MAX_BITS: u8 = 64;

    /// Create a width, clamped to [`Self::MAX_BITS`].
    pub fn new(bits: u8) -> Self {
        Self(bits.min(Self::MAX_BITS))
    }

    /// Number of bits (zero when unknown).
    pub fn bits(&self) -> usize {
        self.0 as usize
    }

    /// Whether the width has been determined.
    pub fn is_known(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for BitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "?")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_ordering() {
        let mut locs = vec![Location::new(10, 0), Location::new(0, 5), Location::new(0, 1)];
        locs.sort();
        assert_eq!(locs, vec![Location::new(0, 1), Location::new(0, 5), Location::new(10, 0)]);

        locs.sort_by(|a, b| a.cmp_vertical(b));
        assert_eq!(locs, vec![Location::new(10, 0), Location::new(0, 1), Location::new(0, 5)]);
    }

    #[test]
    fn test_bit_width() {
        assert!(!BitWidth::UNKNOWN.is_known());
        assert_eq!(BitWidth::new(200).bits(), 64);
        assert_eq!(BitWidth::new(8).to_string(), "8");
        assert_eq!(BitWidth::UNKNOWN.to_string(), "?");
    }
}
