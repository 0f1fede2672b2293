//! Bundles, thread back-links and the per-generation bundle map.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::thread::ThreadId;
use crate::circuit::{BitWidth, Location, Value};

/// Dense index of a bundle inside one [`BundleMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(pub usize);

/// Component ends (or bundle points) that disagree on width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidthIncompatibility {
    points: Vec<(Location, BitWidth)>,
}

impl WidthIncompatibility {
    pub fn add(&mut self, loc: Location, width: BitWidth) {
        if !self.points.contains(&(loc, width)) {
            self.points.push((loc, width));
        }
    }

    pub fn points(&self) -> &[(Location, BitWidth)] {
        &self.points
    }

    /// Distinct widths involved in the conflict.
    pub fn widths(&self) -> BTreeSet<BitWidth> {
        self.points.iter().map(|(_, w)| *w).collect()
    }
}

impl fmt::Display for WidthIncompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "incompatible widths")?;
        for (i, (loc, width)) in self.points.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{}{} bits at {}", sep, width, loc)?;
        }
        Ok(())
    }
}

/// A maximal set of locations forming one electrical node.
#[derive(Debug, Clone)]
pub struct WireBundle {
    pub points: BTreeSet<Location>,
    pub width: BitWidth,
    /// Location whose component first fixed the width.
    pub width_determinant: Option<Location>,
    /// One thread per bit, once the width is known.
    pub threads: Option<Vec<ThreadId>>,
    /// Combined pull value; [`Value::UNKNOWN`] when nothing pulls.
    pub pull: Value,
    pub incompatibility: Option<WidthIncompatibility>,
}

impl WireBundle {
    pub(crate) fn new() -> Self {
        Self {
            points: BTreeSet::new(),
            width: BitWidth::UNKNOWN,
            width_determinant: None,
            threads: None,
            pull: Value::UNKNOWN,
            incompatibility: None,
        }
    }

    /// False when components attached to the bundle disagree on width.
    pub fn is_valid(&self) -> bool {
        self.incompatibility.is_none()
    }

    pub fn is_bus(&self) -> bool {
        self.width.bits() > 1
    }

    pub fn thread(&self, bit: usize) -> Option<ThreadId> {
        self.threads.as_ref().and_then(|t| t.get(bit).copied())
    }
}

/// One (bundle, bit) pair that a thread passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadBundle {
    pub bundle: BundleId,
    pub bit: usize,
}

/// Snapshot of a circuit's wiring for one structural generation.
#[derive(Debug, Clone)]
pub struct BundleMap {
    pub(crate) point_bundles: BTreeMap<Location, BundleId>,
    pub(crate) bundles: Vec<WireBundle>,
    pub(crate) thread_bundles: Vec<Vec<ThreadBundle>>,
    pub(crate) valid: bool,
    pub(crate) incompatibility: Vec<WidthIncompatibility>,
    pub(crate) generation: u64,
}

impl BundleMap {
    /// Map that connects nothing; propagation treats every point as unwired.
    pub fn invalid(generation: u64) -> Self {
        Self {
            point_bundles: BTreeMap::new(),
            bundles: Vec::new(),
            thread_bundles: Vec::new(),
            valid: false,
            incompatibility: Vec::new(),
            generation,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bundle_id_at(&self, loc: Location) -> Option<BundleId> {
        self.point_bundles.get(&loc).copied()
    }

    pub fn bundle_at(&self, loc: Location) -> Option<&WireBundle> {
        self.bundle_id_at(loc).map(|id| &self.bundles[id.0])
    }

    pub fn bundle(&self, id: BundleId) -> &WireBundle {
        &self.bundles[id.0]
    }

    pub fn bundles(&self) -> impl Iterator<Item = (BundleId, &WireBundle)> {
        self.bundles.iter().enumerate().map(|(i, b)| (BundleId(i), b))
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }

    /// Every (bundle, bit) sharing `thread`.
    pub fn thread_bundles(&self, thread: ThreadId) -> &[ThreadBundle] {
        self.thread_bundles
            .get(thread.0)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn thread_count(&self) -> usize {
        self.thread_bundles.len()
    }

    pub fn points(&self) -> impl Iterator<Item = Location> + '_ {
        self.point_bundles.keys().copied()
    }

    pub fn width_incompatibility(&self) -> &[WidthIncompatibility] {
        &self.incompatibility
    }
}
