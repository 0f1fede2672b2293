//! Union-find arena used for bundles and wire threads.
//!
//! Nodes are dense indices allocated per bundle-map generation. Parents live
//! in a flat vector; unions are by size and `find` compresses the whole path
//! so that every node visited afterwards points straight at its root.

use std::fmt;

/// Identity of one bit's electrical node, possibly spanning several bundles
/// joined through splitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a singleton set and return its node.
    pub fn make_set(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.size.push(1);
        id
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of `x`'s set.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets holding `a` and `b`; returns the surviving root.
    pub fn unite(&mut self, a: usize, b: usize) -> usize {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        big
    }

    /// Whether `x` is its own representative.
    pub fn is_root(&self, x: usize) -> bool {
        self.parent[x] == x
    }

    /// Direct parent of `x`, without compression.
    pub fn parent(&self, x: usize) -> usize {
        self.parent[x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unite_and_find() {
        let mut sets = DisjointSets::new();
        let nodes: Vec<usize> = (0..6).map(|_| sets.make_set()).collect();
        sets.unite(nodes[0], nodes[1]);
        sets.unite(nodes[2], nodes[3]);
        sets.unite(nodes[1], nodes[3]);
        assert_eq!(sets.find(nodes[0]), sets.find(nodes[2]));
        assert_ne!(sets.find(nodes[0]), sets.find(nodes[4]));
        assert_eq!(sets.unite(nodes[0], nodes[3]), sets.find(nodes[1]));
    }

    proptest! {
        #[test]
        fn test_find_idempotent_and_compressed(
            n in 1usize..64,
            pairs in proptest::collection::vec((0usize..64, 0usize..64), 0..128),
        ) {
            let mut sets = DisjointSets::new();
            for _ in 0..n {
                sets.make_set();
            }
            for (a, b) in pairs {
                sets.unite(a % n, b % n);
            }
            for x in 0..n {
                let root = sets.find(x);
                prop_assert_eq!(sets.find(root), root);
                prop_assert!(sets.is_root(root));
                prop_assert_eq!(sets.parent(x), root);
            }
        }
    }
}
