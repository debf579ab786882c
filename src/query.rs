//! Range and nearest-neighbor queries.
//!
//! Both queries drive the same stackless traversal the node iterator uses,
//! but prune it: the range query skips subtrees whose bounds miss the query
//! box, the nearest query skips subtrees that cannot beat the current worst
//! candidate distance. Queries never mutate the tree, so any number can run
//! concurrently on shared references.

use crate::box_tree::{BoxTree, ElementKey, KeyVector, Node, NodeRef};
use crate::key::{NodeExtra, SpatialElement, SpatialKey, SpatialVector};
use crate::Aabb;

// ============================================================================
// Range query
// ============================================================================

/// Lazy iterator over the elements overlapping a query box.
///
/// Yields `(element_index, &element)` pairs in traversal order. Subtrees are
/// entered only if their node bounds overlap the query box; each yielded
/// element's own key has been tested against the box. Dropping the iterator
/// early is the intended way to abandon a query.
pub struct RangeQuery<'a, E: SpatialElement> {
    tree: &'a BoxTree<E>,
    range: Aabb<KeyVector<E>>,
    node: Option<u32>,
    start: u32,
    descending: bool,
    element: u32,
    element_end: u32,
}

impl<'a, E: SpatialElement> RangeQuery<'a, E> {
    fn new(tree: &'a BoxTree<E>, start: Option<u32>, range: Aabb<KeyVector<E>>) -> Self {
        let (element, element_end) = match start {
            Some(index) => {
                let node = &tree.nodes[index as usize];
                (node.element_range().start as u32, node.element_range().end as u32)
            }
            None => (0, 0),
        };
        Self {
            tree,
            range,
            node: start,
            start: start.unwrap_or(0),
            descending: true,
            element,
            element_end,
        }
    }
}

impl<'a, E: SpatialElement> Iterator for RangeQuery<'a, E> {
    type Item = (usize, &'a E);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Scan the current node's own elements; the node bounds are only
            // a superset, every key is tested individually.
            while self.element < self.element_end {
                let index = self.element as usize;
                self.element += 1;
                let element = &self.tree.elements[index];
                if element.spatial_key().overlaps(&self.range) {
                    return Some((index, element));
                }
            }

            let mut index = self.node?;
            loop {
                if self.descending {
                    if let Some(child) = self.tree.first_child_overlapping(index, &self.range) {
                        index = child;
                        break;
                    }
                }
                if index == self.start {
                    // Sub-tree queries stop where they started.
                    self.node = None;
                    return None;
                }
                if let Some(sibling) = self.tree.next_sibling_overlapping(index, &self.range) {
                    index = sibling;
                    self.descending = true;
                    break;
                }
                match self.tree.nodes[index as usize].parent {
                    Some(parent) => {
                        index = parent;
                        self.descending = false;
                    }
                    None => {
                        self.node = None;
                        return None;
                    }
                }
            }

            self.node = Some(index);
            let node = &self.tree.nodes[index as usize];
            self.element = node.element_range().start as u32;
            self.element_end = node.element_range().end as u32;
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

impl<E: SpatialElement> BoxTree<E> {
    /// Iterates lazily over all elements overlapping `range`.
    ///
    /// ```
    /// use glam::Vec2;
    /// use rhizome_resin_boxtree::{Aabb2, BoxTree};
    ///
    /// let tree = BoxTree::build(vec![Vec2::new(1.0, 1.0), Vec2::new(8.0, 8.0)]);
    /// let range = Aabb2::new(Vec2::ZERO, Vec2::splat(4.0));
    /// assert_eq!(tree.range_query(&range).count(), 1);
    /// ```
    pub fn range_query(&self, range: &Aabb<KeyVector<E>>) -> RangeQuery<'_, E> {
        RangeQuery::new(self, self.root_index(), *range)
    }

    /// Like [`BoxTree::range_query`], but restricted to the subtree under
    /// `start`.
    pub fn range_query_from<'a>(
        &'a self,
        start: NodeRef<'a, E>,
        range: &Aabb<KeyVector<E>>,
    ) -> RangeQuery<'a, E> {
        debug_assert!(std::ptr::eq(self, start.tree));
        RangeQuery::new(self, Some(start.index), *range)
    }

    /// Finds the elements nearest to `target`.
    ///
    /// Returns `(element_index, squared_distance)` pairs ascending by
    /// distance. A positive `nearest_count` caps the result at the k nearest
    /// elements; a positive `max_distance` restricts it to that radius; at
    /// least one of the two must be positive, anything else is a programming
    /// error and panics. Point elements are measured center-to-center, box
    /// elements by their closest point (zero inside the box).
    ///
    /// Equidistant elements keep the order in which the traversal found
    /// them, which depends on the node layout and may change across
    /// rebuilds.
    pub fn query_nearest(
        &self,
        target: KeyVector<E>,
        nearest_count: usize,
        max_distance: f32,
    ) -> Vec<(usize, f32)> {
        assert!(
            nearest_count > 0 || max_distance > 0.0,
            "query_nearest needs a count or a distance bound"
        );

        let mut result: Vec<(usize, f32)> = Vec::new();
        if nearest_count > 0 {
            result.reserve(nearest_count);
        }

        let mut worst_distance2 = if max_distance > 0.0 {
            max_distance * max_distance
        } else {
            f32::INFINITY
        };

        let Some(root) = self.root_index() else {
            return result;
        };
        let mut index = root;
        let mut descending = true;

        loop {
            let node = &self.nodes[index as usize];
            for element_index in node.element_range() {
                let distance2 = self.elements[element_index]
                    .spatial_key()
                    .distance_squared_to(target);
                if distance2 <= worst_distance2 {
                    if nearest_count > 0 && result.len() == nearest_count {
                        result.pop();
                    }
                    let at = result.partition_point(|&(_, d)| d < distance2);
                    result.insert(at, (element_index, distance2));
                    if nearest_count > 0 && result.len() == nearest_count {
                        worst_distance2 = result.last().unwrap().1;
                    }
                }
            }

            loop {
                if descending {
                    if let Some(child) = self.first_child_near(index, target, worst_distance2) {
                        index = child;
                        break;
                    }
                }
                if let Some(sibling) = self.next_sibling_near(index, target, worst_distance2) {
                    index = sibling;
                    descending = true;
                    break;
                }
                match self.nodes[index as usize].parent {
                    Some(parent) => {
                        index = parent;
                        descending = false;
                    }
                    None => return result,
                }
            }
        }
    }

    /// Finds the `k` nearest elements to `target`.
    ///
    /// Returns up to `k` `(element_index, squared_distance)` pairs, closest
    /// first.
    pub fn k_nearest(&self, target: KeyVector<E>, k: usize) -> Vec<(usize, f32)> {
        if k == 0 {
            return Vec::new();
        }
        self.query_nearest(target, k, 0.0)
    }

    /// Finds all elements within `radius` of `target`, closest first.
    pub fn query_radius(&self, target: KeyVector<E>, radius: f32) -> Vec<(usize, f32)> {
        self.query_nearest(target, 0, radius)
    }

    // ------------------------------------------------------------------
    // Pruned traversal steps
    // ------------------------------------------------------------------

    fn node_overlaps(&self, index: u32, range: &Aabb<KeyVector<E>>) -> bool {
        range.intersects(&self.nodes[index as usize].bounds)
    }

    fn first_child_overlapping(&self, index: u32, range: &Aabb<KeyVector<E>>) -> Option<u32> {
        let node = &self.nodes[index as usize];
        for child in [node.low_child, node.extra.middle_child(), node.high_child]
            .into_iter()
            .flatten()
        {
            if self.node_overlaps(child, range) {
                return Some(child);
            }
        }
        None
    }

    fn next_sibling_overlapping(&self, index: u32, range: &Aabb<KeyVector<E>>) -> Option<u32> {
        let node = &self.nodes[index as usize];
        let parent = &self.nodes[node.parent? as usize];
        if Some(index) == parent.low_child {
            if let Some(middle) = parent.extra.middle_child() {
                if self.node_overlaps(middle, range) {
                    return Some(middle);
                }
            }
        }
        if Some(index) != parent.high_child {
            if let Some(high) = parent.high_child {
                if self.node_overlaps(high, range) {
                    return Some(high);
                }
            }
        }
        None
    }

    /// The child on the target's side of the split plane, or the far child
    /// if the near one is absent and the plane is closer than the current
    /// worst distance.
    fn near_side_child(
        &self,
        node: &Node<ElementKey<E>>,
        target: KeyVector<E>,
        worst_distance2: f32,
    ) -> Option<u32> {
        let axis = node.split_axis? as usize;
        let location = target.axis(axis);
        if location < node.split_position {
            if node.low_child.is_some() {
                return node.low_child;
            }
            let plane_distance = node.split_position - location;
            node.high_child
                .filter(|_| plane_distance * plane_distance < worst_distance2)
        } else {
            if node.high_child.is_some() {
                return node.high_child;
            }
            let plane_distance = location - node.split_position;
            node.low_child
                .filter(|_| plane_distance * plane_distance < worst_distance2)
        }
    }

    fn first_child_near(
        &self,
        index: u32,
        target: KeyVector<E>,
        worst_distance2: f32,
    ) -> Option<u32> {
        let node = &self.nodes[index as usize];
        node.split_axis?;
        // A middle child straddles the plane and can never be pruned by it.
        if let Some(middle) = node.extra.middle_child() {
            return Some(middle);
        }
        self.near_side_child(node, target, worst_distance2)
    }

    fn next_sibling_near(
        &self,
        index: u32,
        target: KeyVector<E>,
        worst_distance2: f32,
    ) -> Option<u32> {
        let node = &self.nodes[index as usize];
        let parent = &self.nodes[node.parent? as usize];
        if Some(index) == parent.extra.middle_child() {
            return self.near_side_child(parent, target, worst_distance2);
        }

        let axis = parent.split_axis? as usize;
        let location = target.axis(axis);
        if Some(index) == parent.low_child {
            if location >= parent.split_position {
                return None;
            }
            let plane_distance = parent.split_position - location;
            parent
                .high_child
                .filter(|_| plane_distance * plane_distance < worst_distance2)
        } else {
            debug_assert!(Some(index) == parent.high_child);
            if location < parent.split_position {
                return None;
            }
            let plane_distance = location - parent.split_position;
            parent
                .low_child
                .filter(|_| plane_distance * plane_distance < worst_distance2)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
