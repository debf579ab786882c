//! The static tree: node table, bulk builder and traversal plumbing.

use std::ops::Range;

use crate::key::{NodeExtra, SpatialElement, SpatialKey, SpatialVector};
use crate::Aabb;

pub(crate) type ElementKey<E> = <E as SpatialElement>::Key;
pub(crate) type KeyVector<E> = <<E as SpatialElement>::Key as SpatialKey>::Vector;

// ============================================================================
// Nodes
// ============================================================================

/// One node of a [`BoxTree`], addressed by its position in the node array.
///
/// A node with an element range and no children is a leaf; a node with an
/// empty range and children is purely internal. Box trees additionally allow
/// hybrid nodes that keep straddling elements embedded next to their
/// children, and may own a middle child holding straddlers that did not fit.
#[derive(Debug, Clone)]
pub struct Node<K: SpatialKey> {
    pub(crate) parent: Option<u32>,
    pub(crate) low_child: Option<u32>,
    pub(crate) high_child: Option<u32>,
    pub(crate) elements_begin: u32,
    pub(crate) elements_end: u32,
    pub(crate) bounds: Aabb<K::Vector>,
    pub(crate) split_position: f32,
    pub(crate) split_axis: Option<u8>,
    pub(crate) extra: K::NodeExtra,
}

impl<K: SpatialKey> Node<K> {
    pub(crate) fn new(
        parent: Option<u32>,
        elements_begin: u32,
        elements_end: u32,
        bounds: Aabb<K::Vector>,
        extra: K::NodeExtra,
    ) -> Self {
        Self {
            parent,
            low_child: None,
            high_child: None,
            elements_begin,
            elements_end,
            bounds,
            split_position: 0.0,
            split_axis: None,
            extra,
        }
    }

    /// Index of the parent node, if any.
    pub fn parent(&self) -> Option<usize> {
        self.parent.map(|index| index as usize)
    }

    /// Index of the low-side child, if any.
    pub fn low_child(&self) -> Option<usize> {
        self.low_child.map(|index| index as usize)
    }

    /// Index of the middle child (box trees only), if any.
    pub fn middle_child(&self) -> Option<usize> {
        self.extra.middle_child().map(|index| index as usize)
    }

    /// Index of the high-side child, if any.
    pub fn high_child(&self) -> Option<usize> {
        self.high_child.map(|index| index as usize)
    }

    /// Tight bounding box of every element in this node's subtree.
    pub fn bounds(&self) -> Aabb<K::Vector> {
        self.bounds
    }

    /// Range of this node's own elements in the tree's element store.
    pub fn element_range(&self) -> Range<usize> {
        self.elements_begin as usize..self.elements_end as usize
    }

    /// Number of elements held directly by this node.
    pub fn element_count(&self) -> usize {
        (self.elements_end - self.elements_begin) as usize
    }

    /// Whether this node holds any elements directly.
    pub fn has_elements(&self) -> bool {
        self.elements_end > self.elements_begin
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.low_child.is_none() && self.high_child.is_none() && self.extra.middle_child().is_none()
    }

    /// The split axis, or `None` for leaves.
    pub fn split_axis(&self) -> Option<usize> {
        self.split_axis.map(|axis| axis as usize)
    }

    /// The split plane position on [`Node::split_axis`]; meaningless for
    /// leaves.
    pub fn split_position(&self) -> f32 {
        self.split_position
    }

    /// Whether `axis` is excluded from split-axis selection in this subtree.
    pub fn is_axis_locked(&self, axis: usize) -> bool {
        self.extra.is_axis_locked(axis)
    }
}

// ============================================================================
// The tree
// ============================================================================

/// A static spatial index over point or box keys.
///
/// The tree is bulk-built once from an owned element vector: the builder
/// permutes the elements in place and records nodes in one flat array, each
/// node referring to its parent, children and element range by index. After
/// the build nothing is ever mutated, so any number of queries may run
/// concurrently on shared references.
///
/// Nodes split on the widest axis of their bounding box, at its midpoint.
/// Point elements partition into a low and a high side; box elements can
/// also straddle the split plane, in which case they stay with the node (if
/// few) or move into a dedicated middle child whose subtree never splits on
/// that axis again.
///
/// # Example
///
/// ```
/// use glam::Vec2;
/// use rhizome_resin_boxtree::BoxTree;
///
/// let tree = BoxTree::build(vec![
///     (Vec2::new(10.0, 10.0), "A"),
///     (Vec2::new(20.0, 20.0), "B"),
///     (Vec2::new(50.0, 50.0), "C"),
/// ]);
///
/// let nearest = tree.k_nearest(Vec2::new(12.0, 12.0), 1);
/// assert_eq!(tree.elements()[nearest[0].0].1, "A");
/// ```
#[derive(Debug, Clone)]
pub struct BoxTree<E: SpatialElement> {
    pub(crate) elements: Vec<E>,
    pub(crate) nodes: Vec<Node<ElementKey<E>>>,
    max_elements_per_node: usize,
}

impl<E: SpatialElement> BoxTree<E> {
    /// Per-node element capacity used by [`BoxTree::build`].
    pub const DEFAULT_MAX_ELEMENTS_PER_NODE: usize = 64;

    /// Builds a tree from an owned element vector with the default per-node
    /// capacity.
    pub fn build(elements: Vec<E>) -> Self {
        Self::build_with_node_capacity(elements, Self::DEFAULT_MAX_ELEMENTS_PER_NODE)
    }

    /// Builds a tree, splitting any node holding more than
    /// `max_elements_per_node` elements (0 selects the default).
    pub fn build_with_node_capacity(elements: Vec<E>, max_elements_per_node: usize) -> Self {
        let mut tree = Self {
            elements: Vec::new(),
            nodes: Vec::new(),
            max_elements_per_node: if max_elements_per_node > 0 {
                max_elements_per_node
            } else {
                Self::DEFAULT_MAX_ELEMENTS_PER_NODE
            },
        };
        tree.rebuild(elements);
        tree
    }

    /// Discards the current tree and builds a new one from `elements`.
    ///
    /// Queries against the new tree are equivalent to a fresh
    /// [`BoxTree::build`]; the node layout may differ from any previous
    /// build of the same data.
    pub fn rebuild(&mut self, elements: Vec<E>) {
        self.elements = elements;
        self.nodes.clear();
        if self.elements.is_empty() {
            return;
        }

        self.nodes
            .reserve((self.elements.len() / self.max_elements_per_node / 2).max(4));

        let mut bounds = Aabb::empty();
        for element in &self.elements {
            bounds = bounds.union(&element.spatial_key().bounds());
        }
        self.nodes.push(Node::new(
            None,
            0,
            self.elements.len() as u32,
            bounds,
            Default::default(),
        ));

        let mut pending = vec![0u32];
        while let Some(index) = pending.pop() {
            self.split_node(index);
            let node = &self.nodes[index as usize];
            if let Some(child) = node.low_child {
                pending.push(child);
            }
            if let Some(child) = node.extra.middle_child() {
                pending.push(child);
            }
            if let Some(child) = node.high_child {
                pending.push(child);
            }
        }
    }

    /// Number of indexed elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the tree indexes no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The indexed elements, in tree order (permuted at build time).
    pub fn elements(&self) -> &[E] {
        &self.elements
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The per-node element capacity the tree was built with.
    pub fn max_elements_per_node(&self) -> usize {
        self.max_elements_per_node
    }

    /// The root node, absent for an empty tree.
    pub fn root(&self) -> Option<NodeRef<'_, E>> {
        self.root_index().map(|index| NodeRef { tree: self, index })
    }

    /// Iterates over all nodes in depth-first pre-order.
    pub fn nodes(&self) -> Nodes<'_, E> {
        let root = self.root_index();
        Nodes {
            tree: self,
            node: root,
            start: root.unwrap_or(0),
            descending: true,
        }
    }

    pub(crate) fn root_index(&self) -> Option<u32> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    fn split_node(&mut self, index: u32) {
        let node = &self.nodes[index as usize];
        let count = node.element_count();
        if count <= self.max_elements_per_node {
            return;
        }

        // Split on the widest unlocked axis. With every axis locked or the
        // box degenerate on all unlocked axes, the node stays a leaf.
        let mut split_axis = None;
        let mut max_extent = 0.0f32;
        for axis in 0..KeyVector::<E>::DIM {
            let extent = node.bounds.extent(axis);
            if extent > max_extent && !node.extra.is_axis_locked(axis) {
                max_extent = extent;
                split_axis = Some(axis);
            }
        }
        let Some(axis) = split_axis else { return };
        let split_position = node.bounds.min.axis(axis) + max_extent * 0.5;

        let begin = node.elements_begin as usize;
        let end = node.elements_end as usize;
        let bounds = node.bounds;
        let inherited = node.extra.inherit();

        let range = &mut self.elements[begin..end];
        let (low_count, high_count) = if ElementKey::<E>::IS_BOX {
            partition_boxes(range, axis, split_position)
        } else {
            let low_count = partition_points(range, axis, split_position);
            (low_count, count - low_count)
        };

        // A box split that leaves more than a quarter of the elements on the
        // plane is not worth the extra nodes.
        if ElementKey::<E>::IS_BOX && 4 * (low_count + high_count) < 3 * count {
            return;
        }

        {
            let node = &mut self.nodes[index as usize];
            node.split_axis = Some(axis as u8);
            node.split_position = split_position;
        }

        if low_count > 0 {
            let mut child_bounds = bounds;
            self.tighten_max_bound(&mut child_bounds, begin, low_count, axis);
            let child = self.push_node(Node::new(
                Some(index),
                begin as u32,
                (begin + low_count) as u32,
                child_bounds,
                inherited,
            ));
            self.nodes[index as usize].low_child = Some(child);
        }

        if high_count > 0 {
            let mut child_bounds = bounds;
            self.tighten_min_bound(&mut child_bounds, end - high_count, high_count, axis);
            let child = self.push_node(Node::new(
                Some(index),
                (end - high_count) as u32,
                end as u32,
                child_bounds,
                inherited,
            ));
            self.nodes[index as usize].high_child = Some(child);
        }

        if ElementKey::<E>::IS_BOX {
            let middle_count = count - low_count - high_count;
            if middle_count > 0 && middle_count <= self.max_elements_per_node {
                // Straddlers stay embedded: the node keeps a range alongside
                // its children.
                let node = &mut self.nodes[index as usize];
                node.elements_begin += low_count as u32;
                node.elements_end -= high_count as u32;
                return;
            }
            if middle_count > 0 {
                let middle_begin = begin + low_count;
                let mut child_bounds = bounds;
                self.tighten_min_bound(&mut child_bounds, middle_begin, middle_count, axis);
                self.tighten_max_bound(&mut child_bounds, middle_begin, middle_count, axis);
                // Re-splitting on this axis cannot separate elements that
                // straddle it.
                let mut extra = inherited;
                extra.lock_axis(axis);
                let child = self.push_node(Node::new(
                    Some(index),
                    middle_begin as u32,
                    (end - high_count) as u32,
                    child_bounds,
                    extra,
                ));
                self.nodes[index as usize].extra.set_middle_child(child);
            }
        }

        let node = &mut self.nodes[index as usize];
        node.elements_end = node.elements_begin;
    }

    fn push_node(&mut self, node: Node<ElementKey<E>>) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(node);
        index
    }

    /// Pulls the min bound on `axis` up to the lowest bound actually present
    /// in the element range.
    fn tighten_min_bound(
        &self,
        bounds: &mut Aabb<KeyVector<E>>,
        start: usize,
        count: usize,
        axis: usize,
    ) {
        let mut limit = bounds.max.axis(axis);
        for element in &self.elements[start..start + count] {
            limit = limit.min(element.spatial_key().low_bound(axis));
        }
        bounds.min.set_axis(axis, limit);
    }

    /// Pulls the max bound on `axis` down to the highest bound actually
    /// present in the element range.
    fn tighten_max_bound(
        &self,
        bounds: &mut Aabb<KeyVector<E>>,
        start: usize,
        count: usize,
        axis: usize,
    ) {
        let mut limit = bounds.min.axis(axis);
        for element in &self.elements[start..start + count] {
            limit = limit.max(element.spatial_key().high_bound(axis));
        }
        bounds.max.set_axis(axis, limit);
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    pub(crate) fn first_child(&self, index: u32) -> Option<u32> {
        let node = &self.nodes[index as usize];
        node.low_child
            .or_else(|| node.extra.middle_child())
            .or(node.high_child)
    }

    pub(crate) fn next_sibling(&self, index: u32) -> Option<u32> {
        let node = &self.nodes[index as usize];
        let parent = &self.nodes[node.parent? as usize];
        if Some(index) == parent.low_child {
            return parent.extra.middle_child().or(parent.high_child);
        }
        if Some(index) == parent.extra.middle_child() {
            return parent.high_child;
        }
        None
    }
}

// ============================================================================
// Partitioning
// ============================================================================

/// Unstable two-pointer partition: moves elements below `split_position` on
/// `axis` to the front and returns their count.
pub(crate) fn partition_points<E: SpatialElement>(
    elements: &mut [E],
    axis: usize,
    split_position: f32,
) -> usize {
    let mut low = 0;
    let mut high = elements.len();
    loop {
        while low < high && elements[low].spatial_key().low_bound(axis) < split_position {
            low += 1;
        }
        while low < high && elements[high - 1].spatial_key().low_bound(axis) >= split_position {
            high -= 1;
        }
        if low >= high {
            return low;
        }
        elements.swap(low, high - 1);
        low += 1;
        high -= 1;
    }
}

/// Three-way in-place partition for box keys: low | straddling | high.
///
/// Four cursors scan inward from both ends. `low_end`/`high_end` mark the
/// inner edges of the confirmed low/high zones; straddling elements collect
/// between them. Returns `(low_count, high_count)`; the straddler count is
/// the remainder.
pub(crate) fn partition_boxes<E: SpatialElement>(
    elements: &mut [E],
    axis: usize,
    split_position: f32,
) -> (usize, usize) {
    let len = elements.len() as isize;
    let mut current_low: isize = 0;
    let mut low_end: isize = 0;
    let mut current_high: isize = len - 1;
    let mut high_end: isize = len - 1;

    loop {
        // Scan right until an entirely-high element blocks; pack entirely-low
        // elements behind low_end on the way.
        while current_low <= current_high {
            let key = elements[current_low as usize].spatial_key();
            if key.low_bound(axis) >= split_position {
                break;
            }
            if key.high_bound(axis) < split_position {
                if low_end < current_low {
                    elements.swap(low_end as usize, current_low as usize);
                }
                low_end += 1;
            }
            current_low += 1;
        }

        // Mirror scan from the right; here current_low is blocked on an
        // entirely-high element or the cursors already met.
        while current_low < current_high {
            let key = elements[current_high as usize].spatial_key();
            if key.high_bound(axis) < split_position {
                break;
            }
            if key.low_bound(axis) >= split_position {
                if current_high < high_end {
                    elements.swap(current_high as usize, high_end as usize);
                }
                high_end -= 1;
            }
            current_high -= 1;
        }

        if current_low < current_high {
            // elements[current_low] is entirely high, elements[current_high]
            // entirely low; route both to their zone edges, shifting one
            // straddler each way when the zones are not adjacent.
            if low_end < current_low {
                if current_high < high_end {
                    elements.swap(low_end as usize, current_high as usize);
                    elements.swap(current_low as usize, high_end as usize);
                } else {
                    elements.swap(low_end as usize, current_low as usize);
                    elements.swap(low_end as usize, high_end as usize);
                }
            } else if current_high < high_end {
                elements.swap(current_high as usize, high_end as usize);
                elements.swap(low_end as usize, high_end as usize);
            } else {
                elements.swap(current_low as usize, current_high as usize);
            }
            low_end += 1;
            current_low += 1;
            high_end -= 1;
            current_high -= 1;
        } else {
            if current_low == current_high {
                // Single leftover, necessarily entirely high: rotate it onto
                // the high zone's edge, past any straddlers sitting there.
                if current_high < high_end {
                    elements.swap(current_low as usize, high_end as usize);
                }
                high_end -= 1;
            }
            break;
        }
    }

    (low_end as usize, (len - 1 - high_end) as usize)
}

// ============================================================================
// Node iteration
// ============================================================================

/// A borrowed view of one node, for diagnostics and sub-tree queries.
pub struct NodeRef<'a, E: SpatialElement> {
    pub(crate) tree: &'a BoxTree<E>,
    pub(crate) index: u32,
}

impl<E: SpatialElement> Clone for NodeRef<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: SpatialElement> Copy for NodeRef<'_, E> {}

impl<'a, E: SpatialElement> NodeRef<'a, E> {
    /// Position of the node in the tree's node array.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// The underlying node record.
    pub fn node(&self) -> &'a Node<ElementKey<E>> {
        &self.tree.nodes[self.index as usize]
    }

    /// Tight bounding box of the node's subtree.
    pub fn bounds(&self) -> Aabb<KeyVector<E>> {
        self.node().bounds
    }

    /// The elements held directly by this node.
    pub fn elements(&self) -> &'a [E] {
        &self.tree.elements[self.node().element_range()]
    }

    /// Range of the node's own elements in [`BoxTree::elements`].
    pub fn element_range(&self) -> Range<usize> {
        self.node().element_range()
    }

    /// Number of elements held directly by this node.
    pub fn element_count(&self) -> usize {
        self.node().element_count()
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.node().is_leaf()
    }

    /// The parent node, if any.
    pub fn parent(&self) -> Option<Self> {
        self.child_ref(self.node().parent)
    }

    /// The low-side child, if any.
    pub fn low_child(&self) -> Option<Self> {
        self.child_ref(self.node().low_child)
    }

    /// The middle child (box trees only), if any.
    pub fn middle_child(&self) -> Option<Self> {
        self.child_ref(self.node().extra.middle_child())
    }

    /// The high-side child, if any.
    pub fn high_child(&self) -> Option<Self> {
        self.child_ref(self.node().high_child)
    }

    /// The split axis, or `None` for leaves.
    pub fn split_axis(&self) -> Option<usize> {
        self.node().split_axis()
    }

    /// The split plane position; meaningless for leaves.
    pub fn split_position(&self) -> f32 {
        self.node().split_position
    }

    fn child_ref(&self, index: Option<u32>) -> Option<Self> {
        index.map(|index| NodeRef {
            tree: self.tree,
            index,
        })
    }
}

/// Depth-first pre-order iterator over a tree's nodes.
///
/// Traversal carries no stack: each step follows the first-child /
/// next-sibling / parent indices stored in the nodes, in fixed
/// low - middle - high child order.
pub struct Nodes<'a, E: SpatialElement> {
    tree: &'a BoxTree<E>,
    node: Option<u32>,
    start: u32,
    descending: bool,
}

impl<'a, E: SpatialElement> Iterator for Nodes<'a, E> {
    type Item = NodeRef<'a, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.node?;
        self.advance(current);
        Some(NodeRef {
            tree: self.tree,
            index: current,
        })
    }
}

impl<E: SpatialElement> Nodes<'_, E> {
    fn advance(&mut self, mut index: u32) {
        loop {
            if self.descending {
                if let Some(child) = self.tree.first_child(index) {
                    self.node = Some(child);
                    return;
                }
            }
            if index == self.start {
                // Never walk out of the subtree the iteration started in.
                self.node = None;
                return;
            }
            if let Some(sibling) = self.tree.next_sibling(index) {
                self.node = Some(sibling);
                self.descending = true;
                return;
            }
            match self.tree.nodes[index as usize].parent {
                Some(parent) => {
                    index = parent;
                    self.descending = false;
                }
                None => {
                    self.node = None;
                    return;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
