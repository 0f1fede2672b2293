//! Bidirectional record of structural substitutions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::error;

use crate::components::Component;
use crate::error::{GatesimError, Result};

/// Maps removed components to what replaced them, and back.
///
/// `map` holds every removal (possibly with no replacement); `inverse` holds
/// every addition (possibly replacing nothing).
#[derive(Debug, Clone, Default)]
pub struct ReplacementMap {
    frozen: bool,
    map: BTreeMap<Component, BTreeSet<Component>>,
    inverse: BTreeMap<Component, BTreeSet<Component>>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `old` was replaced by `new`.
    pub fn single(old: Component, new: Component) -> Self {
        let mut ret = Self::new();
        ret.map.insert(old.clone(), BTreeSet::from([new.clone()]));
        ret.inverse.insert(new, BTreeSet::from([old]));
        ret
    }

    fn check_frozen(&self) -> Result<()> {
        if self.frozen {
            Err(GatesimError::ReplacementFrozen)
        } else {
            Ok(())
        }
    }

    /// Record a pure addition.
    pub fn add(&mut self, comp: Component) -> Result<()> {
        self.check_frozen()?;
        self.inverse.insert(comp, BTreeSet::new());
        Ok(())
    }

    /// Record a pure removal.
    pub fn remove(&mut self, comp: Component) -> Result<()> {
        self.check_frozen()?;
        self.map.insert(comp, BTreeSet::new());
        Ok(())
    }

    /// Record that `old` was replaced by every component in `news`.
    pub fn put(&mut self, old: Component, news: impl IntoIterator<Item = Component>) -> Result<()> {
        self.check_frozen()?;
        let targets = self.map.entry(old.clone()).or_default();
        let news: Vec<Component> = news.into_iter().collect();
        targets.extend(news.iter().cloned());
        for new in news {
            self.inverse.entry(new).or_default().insert(old.clone());
        }
        Ok(())
    }

    pub fn replace(&mut self, old: Component, new: Component) -> Result<()> {
        self.put(old, [new])
    }

    /// Compose with a map produced by a later pass, so that removals here
    /// lead directly to the final components.
    pub fn append(&mut self, next: &ReplacementMap) {
        for (b, cs) in &next.map {
            // What was replaced to produce b; if b pre-existed, it replaces itself.
            let sources = self
                .inverse
                .remove(b)
                .unwrap_or_else(|| BTreeSet::from([b.clone()]));

            for a in &sources {
                let dst = self.map.entry(a.clone()).or_default();
                dst.remove(b);
                dst.extend(cs.iter().cloned());
            }
            for c in cs {
                self.inverse
                    .entry(c.clone())
                    .or_default()
                    .extend(sources.iter().cloned());
            }
        }

        for (c, bs) in &next.inverse {
            if !self.inverse.contains_key(c) {
                if !bs.is_empty() {
                    error!(component = %c, "internal error: component replaced but not represented");
                }
                self.inverse.insert(c.clone(), BTreeSet::new());
            }
        }
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn additions(&self) -> impl Iterator<Item = &Component> {
        self.inverse.keys()
    }

    pub fn removals(&self) -> impl Iterator<Item = &Component> {
        self.map.keys()
    }

    pub fn replacements_for(&self, old: &Component) -> Option<&BTreeSet<Component>> {
        self.map.get(old)
    }

    pub fn replaced_by(&self, new: &Component) -> Option<&BTreeSet<Component>> {
        self.inverse.get(new)
    }

    /// Map with removals and additions swapped.
    pub fn inverse_map(&self) -> ReplacementMap {
        ReplacementMap {
            frozen: false,
            map: self.inverse.clone(),
            inverse: self.map.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty() && self.inverse.is_empty()
    }

    pub fn reset(&mut self) {
        self.map.clear();
        self.inverse.clear();
    }
}

impl fmt::Display for ReplacementMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.map.is_empty() {
            writeln!(f, "  removals: none")?;
        } else {
            writeln!(f, "  removals:")?;
            for (a, bs) in &self.map {
                writeln!(f, "    {}", a)?;
                for b in bs {
                    writeln!(f, "     `--> {}", b)?;
                }
            }
        }
        if self.inverse.is_empty() {
            writeln!(f, "  additions: none")?;
        } else {
            writeln!(f, "  additions:")?;
            for (b, as_) in &self.inverse {
                writeln!(f, "    {}", b)?;
                for a in as_ {
                    writeln!(f, "     ^-- {}", a)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Location, Wire};
    use proptest::prelude::*;

    fn wire(x0: i32, x1: i32) -> Component {
        Component::Wire(Wire::new(Location::new(x0, 0), Location::new(x1, 0)).unwrap())
    }

    fn targets(map: &ReplacementMap, c: &Component) -> Vec<Component> {
        map.replacements_for(c)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_append_composes_passes() {
        // pass 1: a -> {b}
        let (a, b, c, d) = (wire(0, 10), wire(0, 20), wire(0, 5), wire(5, 20));
        let mut total = ReplacementMap::single(a.clone(), b.clone());

        // pass 2: b -> {c, d}
        let mut next = ReplacementMap::new();
        next.put(b.clone(), [c.clone(), d.clone()]).unwrap();
        total.append(&next);

        assert_eq!(targets(&total, &a), vec![c.clone(), d.clone()]);
        assert!(total.replaced_by(&b).is_none());
        assert_eq!(
            total.replaced_by(&c).unwrap().iter().cloned().collect::<Vec<_>>(),
            vec![a.clone()]
        );
        let additions: Vec<_> = total.additions().cloned().collect();
        assert_eq!(additions, vec![c, d]);
    }

    #[test]
    fn test_append_pre_existing_component_replaces_itself() {
        let (a, b) = (wire(0, 10), wire(0, 30));
        let mut total = ReplacementMap::new();
        total.append(&ReplacementMap::single(a.clone(), b.clone()));
        assert_eq!(targets(&total, &a), vec![b.clone()]);
        assert!(total.replaced_by(&b).unwrap().contains(&a));
    }

    #[test]
    fn test_frozen_map_rejects_changes() {
        let mut map = ReplacementMap::new();
        map.add(wire(0, 10)).unwrap();
        map.freeze();
        assert!(matches!(map.remove(wire(0, 10)), Err(GatesimError::ReplacementFrozen)));
        assert!(matches!(map.replace(wire(0, 10), wire(0, 20)), Err(GatesimError::ReplacementFrozen)));
        assert_eq!(map.additions().count(), 1);
    }

    #[test]
    fn test_display_and_inverse() {
        let map = ReplacementMap::single(wire(0, 10), wire(0, 20));
        let text = map.to_string();
        assert!(text.contains("removals:\n    wire(0,0)-(10,0)\n     `--> wire(0,0)-(20,0)"));
        assert!(text.contains("^-- wire(0,0)-(10,0)"));
        let inv = map.inverse_map();
        assert_eq!(inv.removals().next(), Some(&wire(0, 20)));
        assert_eq!(ReplacementMap::new().to_string(), "  removals: none\n  additions: none\n");
    }

    proptest! {
        #[test]
        fn test_append_chain_reaches_last_component(len in 1usize..8) {
            // w0 -> w1 -> ... -> w_len, one pass each
            let chain: Vec<Component> = (0..=len).map(|i| wire(0, 10 * (i as i32 + 1))).collect();
            let mut total = ReplacementMap::new();
            for pair in chain.windows(2) {
                total.append(&ReplacementMap::single(pair[0].clone(), pair[1].clone()));
            }
            prop_assert_eq!(targets(&total, &chain[0]), vec![chain[len].clone()]);
            prop_assert_eq!(total.additions().count(), 1);
        }
    }
}
