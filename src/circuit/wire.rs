//! Axis-aligned wire segments.

use std::fmt;

use super::types::Location;
use crate::error::{GatesimError, Result};

/// A horizontal or vertical wire between two grid points.
///
/// Endpoints are normalized so that `end0() <= end1()`; two wires covering
/// the same segment are therefore equal regardless of how they were drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wire {
    e0: Location,
    e1: Location,
}

impl Wire {
    /// Create a wire, rejecting diagonal segments.
    pub fn new(a: Location, b: Location) -> Result<Self> {
        if a.x != b.x && a.y != b.y {
            return Err(GatesimError::topology(format!(
                "wire {} - {} is not horizontal or vertical",
                a, b
            )));
        }
        Ok(Self::span(a, b))
    }

    /// Create a wire between two points already known to be collinear.
    pub(crate) fn span(a: Location, b: Location) -> Self {
        if a <= b {
            Self { e0: a, e1: b }
        } else {
            Self { e0: b, e1: a }
        }
    }

    pub fn end0(&self) -> Location {
        self.e0
    }

    pub fn end1(&self) -> Location {
        self.e1
    }

    /// Both endpoints.
    pub fn ends(&self) -> [Location; 2] {
        [self.e0, self.e1]
    }

    pub fn is_vertical(&self) -> bool {
        self.e0.x == self.e1.x
    }

    pub fn length(&self) -> i32 {
        self.e0.manhattan_distance_to(self.e1)
    }

    /// Whether the point lies on the segment, endpoints included.
    pub fn contains(&self, q: Location) -> bool {
        if self.is_vertical() {
            q.x == self.e0.x && self.e0.y <= q.y && q.y <= self.e1.y
        } else {
            q.y == self.e0.y && self.e0.x <= q.x && q.x <= self.e1.x
        }
    }

    /// Whether the two segments are collinear and share more than a point
    /// (or at least a point when `include_ends` is set).
    pub fn overlaps(&self, other: &Wire, include_ends: bool) -> bool {
        let (q0, q1) = (other.e0, other.e1);
        if self.is_vertical() {
            let x0 = q0.x;
            if x0 != q1.x || x0 != self.e0.x {
                return false;
            }
            if include_ends {
                self.e1.y >= q0.y && self.e0.y <= q1.y
            } else {
                self.e1.y > q0.y && self.e0.y < q1.y
            }
        } else {
            let y0 = q0.y;
            if y0 != q1.y || y0 != self.e0.y {
                return false;
            }
            if include_ends {
                self.e1.x >= q0.x && self.e0.x <= q1.x
            } else {
                self.e1.x > q0.x && self.e0.x < q1.x
            }
        }
    }

    /// Whether both wires run in the same direction.
    pub fn is_parallel(&self, other: &Wire) -> bool {
        self.is_vertical() == other.is_vertical()
    }

    /// Every unit grid point on the wire, from `end0` to `end1`.
    pub fn points(&self) -> impl Iterator<Item = Location> {
        let (e0, e1) = (self.e0, self.e1);
        let vertical = self.is_vertical();
        let len = self.length();
        (0..=len).map(move |d| {
            if vertical {
                Location::new(e0.x, e0.y + d)
            } else {
                Location::new(e0.x + d, e1.y)
            }
        })
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire{}-{}", self.e0, self.e1)
    }
}
