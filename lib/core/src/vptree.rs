//! Vantage-point tree over an arbitrary distance function.
//!
//! Each node picks a random vantage point, splits the remaining points at
//! the median distance to it (`<=` goes left, `>` goes right) and recurses.
//!
//! Search is a single greedy descent, not a backtracking k-NN search: the
//! result is the subtree of the deepest node on the query's path whose size
//! is still at least `k`. That subtree is expected to hold points near the
//! query but is not guaranteed to contain the true k nearest neighbors, and
//! it usually holds more than `k` points. Callers that need exactly `k`
//! results re-rank and truncate the candidates themselves.
//!
//! Nodes live in a flat arena addressed by index. Equal distances make the
//! tree as deep as it is large, so building, traversal, persistence and drop
//! never recurse per level.

use crate::{Error, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Distance between two points of the same kind
pub trait PointDistance<P: ?Sized> {
    fn distance(&self, a: &P, b: &P) -> Result<f64>;
}

impl<P: ?Sized, F> PointDistance<P> for F
where
    F: Fn(&P, &P) -> Result<f64>,
{
    #[inline]
    fn distance(&self, a: &P, b: &P) -> Result<f64> {
        self(a, b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node<P> {
    vantage_point: P,
    median: Option<f64>,
    left: Option<usize>,
    right: Option<usize>,
    size: usize,
}

/// Borrowed view of one node and its subtree
pub struct VpNode<'t, P> {
    nodes: &'t [Node<P>],
    index: usize,
}

impl<P> Clone for VpNode<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for VpNode<'_, P> {}

impl<'t, P> VpNode<'t, P> {
    #[inline]
    fn node(&self) -> &'t Node<P> {
        &self.nodes[self.index]
    }

    #[inline]
    fn at(&self, index: Option<usize>) -> Option<VpNode<'t, P>> {
        index.map(|index| VpNode {
            nodes: self.nodes,
            index,
        })
    }

    #[inline]
    pub fn vantage_point(&self) -> &'t P {
        &self.node().vantage_point
    }

    /// Split threshold; `None` for a single-point node
    #[inline]
    pub fn median(&self) -> Option<f64> {
        self.node().median
    }

    #[inline]
    pub fn left(&self) -> Option<VpNode<'t, P>> {
        self.at(self.node().left)
    }

    #[inline]
    pub fn right(&self) -> Option<VpNode<'t, P>> {
        self.at(self.node().right)
    }

    /// Number of points in this subtree, vantage point included
    #[inline]
    pub fn size(&self) -> usize {
        self.node().size
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        let node = self.node();
        node.left.is_none() && node.right.is_none()
    }

    /// Every point of the subtree: left subtree, right subtree, then the
    /// vantage point.
    pub fn dfs(&self) -> Vec<&'t P> {
        // Walk node, right, left and reverse it.
        let mut out = Vec::with_capacity(self.size());
        let mut stack = vec![self.index];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            out.push(&node.vantage_point);
            stack.extend(node.left);
            stack.extend(node.right);
        }
        out.reverse();
        out
    }
}

/// Where a pending subtree hangs once built
#[derive(Clone, Copy)]
enum Slot {
    Root,
    Left(usize),
    Right(usize),
}

fn build_nodes<P, D, R>(points: Vec<P>, distance: &D, rng: &mut R) -> Result<Vec<Node<P>>>
where
    D: PointDistance<P> + ?Sized,
    R: Rng + ?Sized,
{
    let mut nodes: Vec<Node<P>> = Vec::with_capacity(points.len());
    let mut pending = vec![(points, Slot::Root)];

    while let Some((mut points, slot)) = pending.pop() {
        let size = points.len();
        let index = nodes.len();
        let node = match size {
            0 => continue,
            1 => match points.pop() {
                Some(vantage_point) => Node {
                    vantage_point,
                    median: None,
                    left: None,
                    right: None,
                    size,
                },
                None => continue,
            },
            n => {
                let vantage_point = points.swap_remove(rng.random_range(0..n));

                let dists = points
                    .iter()
                    .map(|p| {
                        let d = distance.distance(p, &vantage_point)?;
                        if d.is_finite() && d >= 0.0 {
                            Ok(d)
                        } else {
                            Err(Error::MalformedInput(format!("invalid distance {}", d)))
                        }
                    })
                    .collect::<Result<Vec<f64>>>()?;
                let median = median(&dists);

                let mut inner = Vec::with_capacity(points.len());
                let mut outer = Vec::new();
                for (p, d) in points.into_iter().zip(dists) {
                    if d <= median {
                        inner.push(p);
                    } else {
                        outer.push(p);
                    }
                }

                // Left subtree is built before the right one.
                pending.push((outer, Slot::Right(index)));
                pending.push((inner, Slot::Left(index)));
                Node {
                    vantage_point,
                    median: Some(median),
                    left: None,
                    right: None,
                    size,
                }
            }
        };

        match slot {
            Slot::Root => {}
            Slot::Left(parent) => nodes[parent].left = Some(index),
            Slot::Right(parent) => nodes[parent].right = Some(index),
        }
        nodes.push(node);
    }

    Ok(nodes)
}

/// Statistical median; mean of the two middle values for even counts
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Rejects arenas whose links could loop, share a child or overrun.
///
/// Children always sit after their parent, and each node is the child of at
/// most one parent.
fn check_arena<P>(nodes: &[Node<P>]) -> Result<()> {
    let mut linked = vec![false; nodes.len()];
    for (index, node) in nodes.iter().enumerate() {
        let mut size = 1;
        for child in [node.left, node.right].into_iter().flatten() {
            if child <= index || child >= nodes.len() || linked[child] {
                return Err(Error::MalformedInput(format!("vp-tree node {} has a bad child link", index)));
            }
            linked[child] = true;
            size += nodes[child].size;
        }
        if node.size != size || node.median.is_none() != (size == 1) {
            return Err(Error::MalformedInput(format!("vp-tree node {} is inconsistent", index)));
        }
    }
    if linked.iter().skip(1).any(|l| !l) {
        return Err(Error::MalformedInput("vp-tree has unreachable nodes".to_string()));
    }
    Ok(())
}

#[derive(Serialize)]
struct TreeRef<'a, P> {
    nodes: &'a [Node<P>],
}

#[derive(Deserialize)]
struct TreeOwned<P> {
    nodes: Vec<Node<P>>,
}

/// Root of a vantage-point tree.
///
/// Only the structure is serialized. The distance function is supplied to
/// every call that needs it, so a loaded tree works with whatever distance
/// the caller reconstructs.
#[derive(Debug, Clone)]
pub struct VpTree<P> {
    /// Root at index 0 when non-empty
    nodes: Vec<Node<P>>,
    is_root: bool,
}

impl<P> Default for VpTree<P> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            is_root: true,
        }
    }
}

impl<P> VpTree<P> {
    /// Build over `points`, drawing vantage points from `rng`
    pub fn build<D, R>(points: Vec<P>, distance: &D, rng: &mut R) -> Result<Self>
    where
        D: PointDistance<P> + ?Sized,
        R: Rng + ?Sized,
    {
        let nodes = build_nodes(points, distance, rng)?;
        Ok(Self { nodes, is_root: true })
    }

    /// Descend towards `query` and return the stopping node.
    ///
    /// Starting at the root, while the current node holds more than `k`
    /// points: move into the child on the query's side of the median, unless
    /// that child holds fewer than `k` points (a missing child holds zero),
    /// in which case stop. Leaves stop the descent. `None` only for an empty
    /// tree.
    pub fn search<F>(&self, k: usize, mut dist_to_query: F) -> Result<Option<VpNode<'_, P>>>
    where
        F: FnMut(&P) -> Result<f64>,
    {
        let mut node = match self.root() {
            Some(node) => node,
            None => return Ok(None),
        };

        while node.size() > k {
            let median = match node.median() {
                Some(median) => median,
                None => break,
            };
            let dist = dist_to_query(node.vantage_point())?;
            let next = if dist <= median { node.left() } else { node.right() };
            match next {
                Some(child) if child.size() >= k => node = child,
                _ => break,
            }
        }

        Ok(Some(node))
    }

    /// Incremental insertion is not supported; rebuild the tree instead
    pub fn insert(&mut self, _point: P) -> Result<()> {
        Err(Error::UnsupportedOperation("vp-tree insertion"))
    }

    /// Detached copy of a subtree. It is not a root and cannot be persisted.
    pub fn subtree(&self, node: VpNode<'_, P>) -> VpTree<P>
    where
        P: Clone,
    {
        let mut nodes: Vec<Node<P>> = Vec::with_capacity(node.size());
        let mut pending = vec![(node.index, Slot::Root)];
        while let Some((index, slot)) = pending.pop() {
            let source = &node.nodes[index];
            let copy = nodes.len();
            match slot {
                Slot::Root => {}
                Slot::Left(parent) => nodes[parent].left = Some(copy),
                Slot::Right(parent) => nodes[parent].right = Some(copy),
            }
            if let Some(right) = source.right {
                pending.push((right, Slot::Right(copy)));
            }
            if let Some(left) = source.left {
                pending.push((left, Slot::Left(copy)));
            }
            nodes.push(Node {
                left: None,
                right: None,
                ..source.clone()
            });
        }
        VpTree { nodes, is_root: false }
    }

    #[inline]
    pub fn root(&self) -> Option<VpNode<'_, P>> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(VpNode {
                nodes: &self.nodes,
                index: 0,
            })
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn dfs(&self) -> Vec<&P> {
        self.root().map(|r| r.dfs()).unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>>
    where
        P: Serialize,
    {
        if !self.is_root {
            return Err(Error::NotRoot);
        }
        Ok(bincode::serialize(&TreeRef { nodes: &self.nodes })?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self>
    where
        P: DeserializeOwned,
    {
        let TreeOwned { nodes } = bincode::deserialize(bytes)?;
        check_arena(&nodes)?;
        Ok(Self { nodes, is_root: true })
    }
}

/// Single-path descent search; see [`VpTree::search`]
pub fn nearest_neighbors<'t, P, D>(
    tree: &'t VpTree<P>,
    query: &P,
    k: usize,
    distance: &D,
) -> Result<Option<VpNode<'t, P>>>
where
    D: PointDistance<P> + ?Sized,
{
    tree.search(k, |vp| distance.distance(vp, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::Cell;
    use std::collections::HashSet;

    fn abs_diff(a: &i64, b: &i64) -> Result<f64> {
        Ok((a - b).abs() as f64)
    }

    fn check_node(node: VpNode<'_, i64>) -> usize {
        let left = node.left().map_or(0, check_node);
        let right = node.right().map_or(0, check_node);
        assert_eq!(node.size(), 1 + left + right);

        match node.median() {
            None => assert!(node.is_leaf()),
            Some(median) => {
                let vp = node.vantage_point();
                for p in node.left().map(|n| n.dfs()).unwrap_or_default() {
                    assert!(abs_diff(vp, p).unwrap() <= median);
                }
                for p in node.right().map(|n| n.dfs()).unwrap_or_default() {
                    assert!(abs_diff(vp, p).unwrap() > median);
                }
            }
        }
        node.size()
    }

    #[test]
    fn test_structure_invariants() {
        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            for n in [0usize, 1, 2, 3, 7, 16, 41] {
                let points: Vec<i64> = (0..n as i64).map(|i| (i * 37 + seed as i64 * 11) % 101).collect();
                let tree = VpTree::build(points.clone(), &abs_diff, &mut rng).unwrap();

                assert_eq!(tree.len(), n);
                if let Some(root) = tree.root() {
                    assert_eq!(check_node(root), n);
                }

                let visited = tree.dfs();
                assert_eq!(visited.len(), n);
                let unique: HashSet<i64> = visited.into_iter().copied().collect();
                let expected: HashSet<i64> = points.into_iter().collect();
                assert_eq!(unique, expected);
            }
        }
    }

    #[test]
    fn test_large_k_returns_root() {
        let mut rng = StdRng::seed_from_u64(1);
        let tree = VpTree::build((0..10).collect(), &abs_diff, &mut rng).unwrap();
        let calls = Cell::new(0);

        for k in [10, 11, 100] {
            let node = tree
                .search(k, |_| {
                    calls.set(calls.get() + 1);
                    Ok(0.0)
                })
                .unwrap()
                .unwrap();
            assert_eq!(node.size(), 10);
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_five_samples_k2() {
        for seed in 0..16u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let tree = VpTree::build((0..5).collect(), &abs_diff, &mut rng).unwrap();
            assert_eq!(tree.len(), 5);

            for q in 0..5 {
                let node = nearest_neighbors(&tree, &q, 2, &abs_diff).unwrap().unwrap();
                assert!((2..=5).contains(&node.size()), "size {}", node.size());
            }
        }
    }

    #[test]
    fn test_equal_distances_degrade_to_chain() {
        let constant = |_: &i64, _: &i64| -> Result<f64> { Ok(1.0) };
        let mut rng = StdRng::seed_from_u64(3);
        let tree = VpTree::build((0..50).collect(), &constant, &mut rng).unwrap();

        let mut node = tree.root();
        let mut depth = 0;
        while let Some(n) = node {
            assert!(n.right().is_none());
            depth += 1;
            node = n.left();
        }
        assert_eq!(depth, 50);
        assert_eq!(tree.dfs().len(), 50);

        let found = nearest_neighbors(&tree, &0, 3, &constant).unwrap().unwrap();
        assert_eq!(found.size(), 3);
    }

    #[test]
    fn test_empty_and_single() {
        let mut rng = StdRng::seed_from_u64(0);
        let empty: VpTree<i64> = VpTree::build(Vec::new(), &abs_diff, &mut rng).unwrap();
        assert!(empty.is_empty());
        assert!(nearest_neighbors(&empty, &1, 1, &abs_diff).unwrap().is_none());

        let single = VpTree::build(vec![42], &abs_diff, &mut rng).unwrap();
        let root = single.root().unwrap();
        assert_eq!(root.size(), 1);
        assert!(root.median().is_none());
        assert!(root.is_leaf());
        let found = nearest_neighbors(&single, &0, 0, &abs_diff).unwrap().unwrap();
        assert_eq!(*found.vantage_point(), 42);
    }

    #[test]
    fn test_insert_unsupported() {
        let mut tree: VpTree<i64> = VpTree::default();
        assert!(matches!(tree.insert(1), Err(Error::UnsupportedOperation(_))));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_only_root_persists() {
        let mut rng = StdRng::seed_from_u64(5);
        let tree = VpTree::build((0..8).collect(), &abs_diff, &mut rng).unwrap();
        let node = tree.root().unwrap().left().unwrap();
        let detached = tree.subtree(node);

        assert!(!detached.is_root());
        assert!(matches!(detached.to_bytes(), Err(Error::NotRoot)));
        assert!(tree.to_bytes().is_ok());
    }

    #[test]
    fn test_bytes_roundtrip_preserves_search() {
        let mut rng = StdRng::seed_from_u64(9);
        let points: Vec<i64> = (0..64).map(|i| i * i % 97).collect();
        let tree = VpTree::build(points, &abs_diff, &mut rng).unwrap();
        let restored: VpTree<i64> = VpTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();

        assert!(restored.is_root());
        for q in [0, 13, 50, 96] {
            for k in [1, 4, 10] {
                let a = nearest_neighbors(&tree, &q, k, &abs_diff).unwrap().unwrap();
                let b = nearest_neighbors(&restored, &q, k, &abs_diff).unwrap().unwrap();
                assert_eq!(a.dfs(), b.dfs());
            }
        }
    }

    #[test]
    fn test_invalid_distance_is_rejected() {
        let broken = |_: &i64, _: &i64| -> Result<f64> { Ok(f64::NAN) };
        let mut rng = StdRng::seed_from_u64(0);
        assert!(VpTree::build(vec![1, 2, 3], &broken, &mut rng).is_err());
    }

    #[test]
    fn test_thousands_of_duplicates() {
        let n = 4000;
        let same = |_: &i64, _: &i64| -> Result<f64> { Ok(0.0) };
        let mut rng = StdRng::seed_from_u64(3);
        let tree = VpTree::build((0..n).collect(), &same, &mut rng).unwrap();

        assert_eq!(tree.len(), n as usize);
        assert_eq!(tree.root().unwrap().median(), Some(0.0));
        assert_eq!(tree.dfs().len(), n as usize);

        let found = nearest_neighbors(&tree, &0, 10, &same).unwrap().unwrap();
        assert_eq!(found.size(), 10);

        let restored: VpTree<i64> = VpTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.dfs(), tree.dfs());

        let deep = tree.root().unwrap().left().unwrap();
        assert_eq!(tree.subtree(deep).dfs(), deep.dfs());
        drop(tree);
        drop(restored);
    }

    #[test]
    fn test_subtree_copy_matches_node() {
        let mut rng = StdRng::seed_from_u64(11);
        let tree = VpTree::build((0..30).collect(), &abs_diff, &mut rng).unwrap();
        let node = tree.root().unwrap().right().unwrap();
        let copy = tree.subtree(node);

        assert_eq!(copy.len(), node.size());
        assert_eq!(copy.dfs(), node.dfs());
        assert_eq!(copy.root().unwrap().median(), node.median());
    }

    #[test]
    fn test_corrupt_links_rejected() {
        let leaf = |v: i64| Node {
            vantage_point: v,
            median: None,
            left: None,
            right: None,
            size: 1,
        };
        let looped = vec![
            Node {
                vantage_point: 0,
                median: Some(1.0),
                left: Some(0),
                right: None,
                size: 2,
            },
            leaf(1),
        ];
        let bytes = bincode::serialize(&TreeRef { nodes: &looped }).unwrap();
        assert!(matches!(VpTree::<i64>::from_bytes(&bytes), Err(Error::MalformedInput(_))));

        let orphan = vec![leaf(0), leaf(1)];
        let bytes = bincode::serialize(&TreeRef { nodes: &orphan }).unwrap();
        assert!(matches!(VpTree::<i64>::from_bytes(&bytes), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
