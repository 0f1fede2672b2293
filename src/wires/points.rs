//! Location index of component ends.

use std::collections::BTreeMap;

use super::bundle::WidthIncompatibility;
use crate::circuit::{BitWidth, Location};
use crate::components::{Component, ComponentKey, EndData};

#[derive(Debug, Clone, Default)]
struct LocationData {
    ends: Vec<(ComponentKey, EndData)>,
}

impl LocationData {
    fn width(&self) -> BitWidth {
        self.ends
            .iter()
            .map(|(_, end)| end.width)
            .find(BitWidth::is_known)
            .unwrap_or(BitWidth::UNKNOWN)
    }
}

/// Every location touched by a component end, with the ends found there.
#[derive(Debug, Clone, Default)]
pub struct CircuitPoints {
    map: BTreeMap<Location, LocationData>,
}

impl CircuitPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, comp: &Component) {
        let key = comp.key();
        for end in comp.ends() {
            self.add_end(key, end);
        }
    }

    pub fn add_end(&mut self, key: ComponentKey, end: EndData) {
        self.map.entry(end.loc).or_default().ends.push((key, end));
    }

    /// Drop every end the component owns at its locations. Ends are matched
    /// by owner only, since a subcircuit's port widths follow its child.
    pub fn remove(&mut self, comp: &Component) {
        let key = comp.key();
        for end in comp.ends() {
            if let Some(data) = self.map.get_mut(&end.loc) {
                data.ends.retain(|(k, _)| *k != key);
                if data.ends.is_empty() {
                    self.map.remove(&end.loc);
                }
            }
        }
    }

    pub fn remove_end(&mut self, key: ComponentKey, end: EndData) {
        if let Some(data) = self.map.get_mut(&end.loc) {
            if let Some(pos) = data.ends.iter().position(|(k, e)| *k == key && *e == end) {
                data.ends.remove(pos);
            }
            if data.ends.is_empty() {
                self.map.remove(&end.loc);
            }
        }
    }

    /// Width declared at a location: the first known end width.
    pub fn width(&self, loc: Location) -> BitWidth {
        self.map
            .get(&loc)
            .map(LocationData::width)
            .unwrap_or(BitWidth::UNKNOWN)
    }

    /// Distinct components with an end at `loc`.
    pub fn components_at(&self, loc: Location) -> Vec<ComponentKey> {
        let mut keys: Vec<ComponentKey> = Vec::new();
        if let Some(data) = self.map.get(&loc) {
            for (key, _) in &data.ends {
                if !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        keys
    }

    pub fn component_count(&self, loc: Location) -> usize {
        self.components_at(loc).len()
    }

    /// Ends at a location, with their owners.
    pub fn ends_at(&self, loc: Location) -> &[(ComponentKey, EndData)] {
        self.map.get(&loc).map(|d| d.ends.as_slice()).unwrap_or(&[])
    }

    /// Every location with at least one component end.
    pub fn split_locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.map.keys().copied()
    }

    pub fn contains(&self, loc: Location) -> bool {
        self.map.contains_key(&loc)
    }

    /// Locations where component ends disagree on width.
    pub fn width_incompatibility(&self) -> Vec<WidthIncompatibility> {
        let mut ret = Vec::new();
        for (&loc, data) in &self.map {
            let declared = data.width();
            if !declared.is_known() {
                continue;
            }
            let mut conflict: Option<WidthIncompatibility> = None;
            for (_, end) in &data.ends {
                if end.width.is_known() && end.width != declared {
                    conflict
                        .get_or_insert_with(|| {
                            let mut w = WidthIncompatibility::default();
                            w.add(loc, declared);
                            w
                        })
                        .add(loc, end.width);
                }
            }
            ret.extend(conflict);
        }
        ret
    }
}
