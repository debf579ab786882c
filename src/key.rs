//! Spatial key model: the capabilities [`BoxTree`](crate::BoxTree) consumes
//! from its element type.
//!
//! A tree is generic over an element ([`SpatialElement`]) that exposes a key
//! ([`SpatialKey`]), which is either a point (`Vec2`, `Vec3`) or a box
//! ([`Aabb`]). The key kind is resolved at compile time: the box-only node
//! fields (middle child, locked axes) are selected through
//! [`SpatialKey::NodeExtra`], so point trees never pay for them.

use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};

use glam::{Vec2, Vec3};

use crate::Aabb;

// ============================================================================
// Vectors
// ============================================================================

/// Axis-indexed access over a fixed-dimension `glam` vector.
pub trait SpatialVector:
    Copy + PartialEq + Debug + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self>
{
    /// Number of axes.
    const DIM: usize;

    /// A vector with `value` on every axis.
    fn splat(value: f32) -> Self;

    /// The coordinate on one axis.
    fn axis(self, axis: usize) -> f32;

    /// Overwrites the coordinate on one axis.
    fn set_axis(&mut self, axis: usize, value: f32);

    /// Component-wise minimum.
    fn min(self, other: Self) -> Self;

    /// Component-wise maximum.
    fn max(self, other: Self) -> Self;

    /// Squared euclidean distance to another vector.
    fn distance_squared(self, other: Self) -> f32;
}

impl SpatialVector for Vec2 {
    const DIM: usize = 2;

    fn splat(value: f32) -> Self {
        Vec2::splat(value)
    }

    fn axis(self, axis: usize) -> f32 {
        self[axis]
    }

    fn set_axis(&mut self, axis: usize, value: f32) {
        self[axis] = value;
    }

    fn min(self, other: Self) -> Self {
        self.min(other)
    }

    fn max(self, other: Self) -> Self {
        self.max(other)
    }

    fn distance_squared(self, other: Self) -> f32 {
        self.distance_squared(other)
    }
}

impl SpatialVector for Vec3 {
    const DIM: usize = 3;

    fn splat(value: f32) -> Self {
        Vec3::splat(value)
    }

    fn axis(self, axis: usize) -> f32 {
        self[axis]
    }

    fn set_axis(&mut self, axis: usize, value: f32) {
        self[axis] = value;
    }

    fn min(self, other: Self) -> Self {
        self.min(other)
    }

    fn max(self, other: Self) -> Self {
        self.max(other)
    }

    fn distance_squared(self, other: Self) -> f32 {
        self.distance_squared(other)
    }
}

// ============================================================================
// Node extras (key-kind-dependent payload)
// ============================================================================

/// Per-node payload that only exists for one key kind.
///
/// Box trees store a middle-child index and a locked-axes bitmask in every
/// node; point trees store nothing. [`SpatialKey::NodeExtra`] picks the
/// variant at compile time.
pub trait NodeExtra: Copy + Default + Debug {
    /// Index of the middle child, if any.
    fn middle_child(&self) -> Option<u32>;

    /// Records the middle child index.
    fn set_middle_child(&mut self, index: u32);

    /// Returns `true` if `axis` must not be chosen as a split axis again
    /// anywhere in this node's subtree.
    fn is_axis_locked(&self, axis: usize) -> bool;

    /// Locks `axis` for this node's subtree.
    fn lock_axis(&mut self, axis: usize);

    /// The payload a child node starts from: same locked axes, no middle
    /// child of its own.
    fn inherit(&self) -> Self;
}

/// Zero-sized [`NodeExtra`] for point keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointNodeExtra;

impl NodeExtra for PointNodeExtra {
    fn middle_child(&self) -> Option<u32> {
        None
    }

    fn set_middle_child(&mut self, _index: u32) {
        unreachable!("point trees have no middle children");
    }

    fn is_axis_locked(&self, _axis: usize) -> bool {
        false
    }

    fn lock_axis(&mut self, _axis: usize) {
        unreachable!("point trees do not lock axes");
    }

    fn inherit(&self) -> Self {
        Self
    }
}

/// [`NodeExtra`] for box keys: middle-child index plus locked-axes bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxNodeExtra {
    middle_child: Option<u32>,
    locked_axes: u8,
}

impl NodeExtra for BoxNodeExtra {
    fn middle_child(&self) -> Option<u32> {
        self.middle_child
    }

    fn set_middle_child(&mut self, index: u32) {
        self.middle_child = Some(index);
    }

    fn is_axis_locked(&self, axis: usize) -> bool {
        self.locked_axes & (1 << axis) != 0
    }

    fn lock_axis(&mut self, axis: usize) {
        self.locked_axes |= 1 << axis;
    }

    fn inherit(&self) -> Self {
        Self {
            middle_child: None,
            locked_axes: self.locked_axes,
        }
    }
}

// ============================================================================
// Spatial keys
// ============================================================================

/// A geometric key the tree can index: a point or an [`Aabb`].
///
/// For points, the low and high bounds on every axis coincide with the
/// coordinate; for boxes they are the corners. The distinction the builder
/// cares about is whether a key can straddle a split plane, which only boxes
/// can ([`SpatialKey::IS_BOX`]).
pub trait SpatialKey: Copy + Debug {
    /// The vector type of the key's coordinates.
    type Vector: SpatialVector;

    /// Key-kind-dependent node payload (see [`NodeExtra`]).
    type NodeExtra: NodeExtra;

    /// `true` for box keys, `false` for point keys.
    const IS_BOX: bool;

    /// Lower bound of the key on one axis.
    fn low_bound(&self, axis: usize) -> f32;

    /// Upper bound of the key on one axis.
    fn high_bound(&self, axis: usize) -> f32;

    /// The tight bounding box of the key.
    fn bounds(&self) -> Aabb<Self::Vector>;

    /// Whether the key overlaps an axis-aligned box (touching counts).
    fn overlaps(&self, range: &Aabb<Self::Vector>) -> bool;

    /// Squared distance from a target location to the key.
    fn distance_squared_to(&self, target: Self::Vector) -> f32;
}

impl SpatialKey for Vec2 {
    type Vector = Vec2;
    type NodeExtra = PointNodeExtra;

    const IS_BOX: bool = false;

    fn low_bound(&self, axis: usize) -> f32 {
        self[axis]
    }

    fn high_bound(&self, axis: usize) -> f32 {
        self[axis]
    }

    fn bounds(&self) -> Aabb<Vec2> {
        Aabb::new(*self, *self)
    }

    fn overlaps(&self, range: &Aabb<Vec2>) -> bool {
        range.contains_point(*self)
    }

    fn distance_squared_to(&self, target: Vec2) -> f32 {
        self.distance_squared(target)
    }
}

impl SpatialKey for Vec3 {
    type Vector = Vec3;
    type NodeExtra = PointNodeExtra;

    const IS_BOX: bool = false;

    fn low_bound(&self, axis: usize) -> f32 {
        self[axis]
    }

    fn high_bound(&self, axis: usize) -> f32 {
        self[axis]
    }

    fn bounds(&self) -> Aabb<Vec3> {
        Aabb::new(*self, *self)
    }

    fn overlaps(&self, range: &Aabb<Vec3>) -> bool {
        range.contains_point(*self)
    }

    fn distance_squared_to(&self, target: Vec3) -> f32 {
        self.distance_squared(target)
    }
}

impl<V: SpatialVector> SpatialKey for Aabb<V> {
    type Vector = V;
    type NodeExtra = BoxNodeExtra;

    const IS_BOX: bool = true;

    fn low_bound(&self, axis: usize) -> f32 {
        self.min.axis(axis)
    }

    fn high_bound(&self, axis: usize) -> f32 {
        self.max.axis(axis)
    }

    fn bounds(&self) -> Aabb<V> {
        *self
    }

    fn overlaps(&self, range: &Aabb<V>) -> bool {
        self.intersects(range)
    }

    fn distance_squared_to(&self, target: V) -> f32 {
        self.distance_squared_to_point(target)
    }
}

// ============================================================================
// Elements
// ============================================================================

/// An element the tree can store: anything that derives a [`SpatialKey`].
///
/// Bare keys are their own elements; `(key, payload)` pairs attach arbitrary
/// data.
///
/// # Example
///
/// ```
/// use glam::Vec2;
/// use rhizome_resin_boxtree::BoxTree;
///
/// let tree = BoxTree::build(vec![
///     (Vec2::new(10.0, 10.0), "station A"),
///     (Vec2::new(50.0, 50.0), "station B"),
/// ]);
/// let (index, _distance2) = tree.k_nearest(Vec2::new(12.0, 9.0), 1)[0];
/// assert_eq!(tree.elements()[index].1, "station A");
/// ```
pub trait SpatialElement {
    /// The key type derived from the element.
    type Key: SpatialKey;

    /// Extracts the element's spatial key.
    fn spatial_key(&self) -> Self::Key;
}

impl SpatialElement for Vec2 {
    type Key = Vec2;

    fn spatial_key(&self) -> Vec2 {
        *self
    }
}

impl SpatialElement for Vec3 {
    type Key = Vec3;

    fn spatial_key(&self) -> Vec3 {
        *self
    }
}

impl<V: SpatialVector> SpatialElement for Aabb<V> {
    type Key = Aabb<V>;

    fn spatial_key(&self) -> Aabb<V> {
        *self
    }
}

impl<K: SpatialKey, T> SpatialElement for (K, T) {
    type Key = K;

    fn spatial_key(&self) -> K {
        self.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Aabb2;

    #[test]
    fn test_point_key_bounds() {
        let p = Vec2::new(3.0, -1.0);
        assert_eq!(p.low_bound(0), 3.0);
        assert_eq!(p.high_bound(0), 3.0);
        assert_eq!(p.low_bound(1), -1.0);
        assert_eq!(p.bounds(), Aabb::new(p, p));
        assert!(!<Vec2 as SpatialKey>::IS_BOX);
    }

    #[test]
    fn test_box_key_bounds() {
        let b = Aabb2::new(Vec2::new(1.0, 2.0), Vec2::new(4.0, 6.0));
        assert_eq!(b.low_bound(0), 1.0);
        assert_eq!(b.high_bound(0), 4.0);
        assert_eq!(b.low_bound(1), 2.0);
        assert_eq!(b.high_bound(1), 6.0);
        assert!(<Aabb2 as SpatialKey>::IS_BOX);
    }

    #[test]
    fn test_key_overlap() {
        let range = Aabb2::new(Vec2::ZERO, Vec2::splat(10.0));
        assert!(Vec2::new(10.0, 0.0).overlaps(&range));
        assert!(!Vec2::new(10.1, 0.0).overlaps(&range));

        let straddling = Aabb2::new(Vec2::new(9.0, 9.0), Vec2::new(12.0, 12.0));
        assert!(straddling.overlaps(&range));
        let outside = Aabb2::new(Vec2::splat(10.5), Vec2::splat(12.0));
        assert!(!outside.overlaps(&range));
    }

    #[test]
    fn test_key_distance() {
        let target = Vec2::new(5.0, 5.0);
        assert_eq!(Vec2::new(8.0, 9.0).distance_squared_to(target), 25.0);

        let b = Aabb2::new(Vec2::ZERO, Vec2::splat(4.0));
        assert_eq!(b.distance_squared_to(target), 2.0);
        assert_eq!(b.distance_squared_to(Vec2::new(2.0, 2.0)), 0.0);
    }

    #[test]
    fn test_pair_element_key_extraction() {
        let element = (Vec3::new(1.0, 2.0, 3.0), "payload");
        assert_eq!(element.spatial_key(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_box_node_extra() {
        let mut extra = BoxNodeExtra::default();
        assert_eq!(extra.middle_child(), None);
        assert!(!extra.is_axis_locked(0));

        extra.lock_axis(1);
        extra.set_middle_child(7);
        assert!(extra.is_axis_locked(1));
        assert!(!extra.is_axis_locked(0));
        assert_eq!(extra.middle_child(), Some(7));

        // Children inherit the lock set but not the middle child
        let inherited = extra.inherit();
        assert!(inherited.is_axis_locked(1));
        assert_eq!(inherited.middle_child(), None);
    }
}
