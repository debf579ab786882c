//! Static spatial index over point or box keys.
//!
//! This crate provides [`BoxTree`], a bulk-built tree for datasets that are
//! loaded once and then queried many times (GIS feature lookup, collision
//! candidate gathering, point-cloud probing):
//!
//! - [`BoxTree::build`] consumes the element vector, permutes it in place and
//!   lays the nodes out in one flat, index-addressed array. The tree is
//!   immutable afterwards; [`BoxTree::rebuild`] replaces it wholesale.
//! - [`BoxTree::range_query`] - lazy iterator over elements overlapping an
//!   axis-aligned box, with per-subtree pruning.
//! - [`BoxTree::query_nearest`] / [`BoxTree::k_nearest`] /
//!   [`BoxTree::query_radius`] - branch-and-bound nearest-neighbor search.
//!
//! Keys may be points ([`glam::Vec2`], [`glam::Vec3`]) or boxes ([`Aabb2`],
//! [`Aabb3`]). Box keys get a dedicated three-way split so that elements
//! straddling a split plane never blow up the tree depth.
//!
//! # Example
//!
//! ```
//! use glam::Vec2;
//! use rhizome_resin_boxtree::{Aabb2, BoxTree};
//!
//! // Index boxes (or points) once, query many times.
//! let tree = BoxTree::build(vec![
//!     Aabb2::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)),
//!     Aabb2::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0)),
//!     Aabb2::new(Vec2::new(2.0, 2.0), Vec2::new(3.0, 3.0)),
//! ]);
//!
//! let hits: Vec<usize> = tree
//!     .range_query(&Aabb2::new(Vec2::ZERO, Vec2::new(1.5, 1.5)))
//!     .map(|(index, _)| index)
//!     .collect();
//! assert_eq!(hits.len(), 2);
//!
//! let nearest = tree.k_nearest(Vec2::new(2.9, 2.9), 1);
//! assert_eq!(nearest[0].0, 2);
//! ```

use glam::{Vec2, Vec3};

mod box_tree;
mod key;
mod query;

pub use box_tree::{BoxTree, Node, NodeRef, Nodes};
pub use key::{BoxNodeExtra, NodeExtra, PointNodeExtra, SpatialElement, SpatialKey, SpatialVector};
pub use query::RangeQuery;

// ============================================================================
// AABB Types
// ============================================================================

/// Axis-aligned bounding box over any [`SpatialVector`].
///
/// `Aabb` doubles as the box spatial key and as the per-node bound of the
/// tree. A default-constructed ([`Aabb::empty`]) box is the identity for
/// [`Aabb::union`]: its min corner sits at `+inf` and its max corner at
/// `-inf`, so the first union snaps it onto the other operand.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb<V> {
    /// Minimum corner.
    pub min: V,
    /// Maximum corner.
    pub max: V,
}

/// 2D axis-aligned bounding box.
pub type Aabb2 = Aabb<Vec2>;

/// 3D axis-aligned bounding box.
pub type Aabb3 = Aabb<Vec3>;

impl<V: SpatialVector> Aabb<V> {
    /// Creates a new AABB from min and max corners.
    pub fn new(min: V, max: V) -> Self {
        Self { min, max }
    }

    /// Creates an AABB from center and half-extents.
    pub fn from_center_half_extents(center: V, half_extents: V) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// The empty sentinel box: the identity for [`Aabb::union`].
    pub fn empty() -> Self {
        Self {
            min: V::splat(f32::INFINITY),
            max: V::splat(f32::NEG_INFINITY),
        }
    }

    /// Returns `true` if the box contains no point at all.
    ///
    /// A degenerate box (`min == max`) still contains its corner and is not
    /// empty.
    pub fn is_empty(&self) -> bool {
        (0..V::DIM).any(|axis| self.max.axis(axis) < self.min.axis(axis))
    }

    /// Returns the center of the AABB.
    pub fn center(&self) -> V {
        (self.min + self.max) * 0.5
    }

    /// Returns the size of the AABB.
    pub fn size(&self) -> V {
        self.max - self.min
    }

    /// Returns the extent of the AABB along one axis.
    pub fn extent(&self, axis: usize) -> f32 {
        self.max.axis(axis) - self.min.axis(axis)
    }

    /// Checks if this AABB contains a point (bounds inclusive).
    pub fn contains_point(&self, point: V) -> bool {
        (0..V::DIM).all(|axis| {
            point.axis(axis) >= self.min.axis(axis) && point.axis(axis) <= self.max.axis(axis)
        })
    }

    /// Checks if this AABB intersects another AABB (touching counts).
    pub fn intersects(&self, other: &Self) -> bool {
        (0..V::DIM).all(|axis| {
            self.max.axis(axis) >= other.min.axis(axis)
                && self.min.axis(axis) <= other.max.axis(axis)
        })
    }

    /// Returns the union of two AABBs.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the union of this AABB and a point.
    pub fn union_point(&self, point: V) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Returns the point inside the AABB closest to `point`.
    pub fn closest_point(&self, point: V) -> V {
        point.max(self.min).min(self.max)
    }

    /// Squared distance from `point` to the AABB (zero inside).
    pub fn distance_squared_to_point(&self, point: V) -> f32 {
        self.closest_point(point).distance_squared(point)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_contains_point() {
        let aabb = Aabb2::new(Vec2::ZERO, Vec2::splat(10.0));
        assert!(aabb.contains_point(Vec2::new(5.0, 5.0)));
        assert!(aabb.contains_point(Vec2::ZERO));
        assert!(aabb.contains_point(Vec2::splat(10.0)));
        assert!(!aabb.contains_point(Vec2::new(-1.0, 5.0)));
        assert!(!aabb.contains_point(Vec2::new(11.0, 5.0)));
    }

    #[test]
    fn test_aabb_intersects() {
        let a = Aabb2::new(Vec2::ZERO, Vec2::splat(10.0));
        let b = Aabb2::new(Vec2::splat(5.0), Vec2::splat(15.0));
        let c = Aabb2::new(Vec2::splat(20.0), Vec2::splat(30.0));

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));

        // Touching edges intersect
        let d = Aabb2::new(Vec2::new(10.0, 0.0), Vec2::new(20.0, 10.0));
        assert!(a.intersects(&d));
    }

    #[test]
    fn test_aabb_union() {
        let a = Aabb3::new(Vec3::ZERO, Vec3::splat(1.0));
        let b = Aabb3::new(Vec3::splat(2.0), Vec3::splat(3.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::splat(3.0));
    }

    #[test]
    fn test_aabb_empty_is_union_identity() {
        let empty = Aabb2::empty();
        assert!(empty.is_empty());

        let b = Aabb2::new(Vec2::new(-1.0, 2.0), Vec2::new(4.0, 5.0));
        assert_eq!(empty.union(&b), b);
        assert!(!b.is_empty());

        let grown = empty.union_point(Vec2::new(3.0, 3.0));
        assert_eq!(grown.min, Vec2::splat(3.0));
        assert_eq!(grown.max, Vec2::splat(3.0));
        assert!(!grown.is_empty());
    }

    #[test]
    fn test_aabb_from_center_half_extents() {
        let aabb = Aabb2::from_center_half_extents(Vec2::splat(5.0), Vec2::new(2.0, 3.0));
        assert_eq!(aabb.min, Vec2::new(3.0, 2.0));
        assert_eq!(aabb.max, Vec2::new(7.0, 8.0));
        assert_eq!(aabb.center(), Vec2::splat(5.0));
        assert_eq!(aabb.size(), Vec2::new(4.0, 6.0));
        assert_eq!(aabb.extent(1), 6.0);
    }

    #[test]
    fn test_aabb_closest_point_and_distance() {
        let aabb = Aabb2::new(Vec2::ZERO, Vec2::splat(10.0));

        // Inside: the point itself, distance zero
        let inside = Vec2::new(4.0, 6.0);
        assert_eq!(aabb.closest_point(inside), inside);
        assert_eq!(aabb.distance_squared_to_point(inside), 0.0);

        // Outside on one axis
        assert_eq!(aabb.closest_point(Vec2::new(13.0, 6.0)), Vec2::new(10.0, 6.0));
        assert_eq!(aabb.distance_squared_to_point(Vec2::new(13.0, 6.0)), 9.0);

        // Outside past a corner
        assert_eq!(aabb.closest_point(Vec2::new(-3.0, 14.0)), Vec2::new(0.0, 10.0));
        assert_eq!(aabb.distance_squared_to_point(Vec2::new(-3.0, 14.0)), 25.0);
    }
}
