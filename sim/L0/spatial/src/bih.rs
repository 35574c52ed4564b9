//! Bounding interval hierarchy (BIH).
//!
//! A BIH is a binary tree where every internal node stores a split axis and
//! two planes instead of two boxes:
//!
//! ```text
//!            min          max
//!             |            |
//!   left  ────┤            |
//!   child     |            ├──── right child
//!             |            |
//! ```
//!
//! `min` is the upper extent of the left child along the axis and `max` the
//! lower extent of the right child. The planes may cross when the children
//! overlap.
//!
//! # Build
//!
//! Nodes are split breadth-first. Each split takes the longest axis of the
//! node bounds, pivots at its midpoint and partitions the elements in place
//! by bounds center. A node stays a leaf when it holds two elements or fewer,
//! when it reaches [`BihConfig::max_depth`], when one side would be empty, or
//! when the children overlap by more than [`BihConfig::max_overlap`] of the
//! node extent.
//!
//! # Query
//!
//! [`Bih::nearest_by`] runs a branch and bound: the distance from the query
//! point to a split plane is a lower bound for every element on the far side,
//! so a child is skipped when that bound is not below the best distance found
//! so far.

use std::collections::VecDeque;

use nalgebra::Point3;
use strand_types::Aabb;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A primitive with axis-aligned bounds.
pub trait Bounded {
    /// Bounds of the primitive.
    fn bounds(&self) -> Aabb;
}

/// Build parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BihConfig {
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Largest accepted child overlap, as a fraction of the node extent.
    pub max_overlap: f64,
}

impl Default for BihConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_overlap: 0.7,
        }
    }
}

/// A BIH node.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BihNode {
    /// First element covered by this node.
    pub start: usize,
    /// Number of elements covered by this node.
    pub count: usize,
    /// Index of the left child. The right child follows it. `None` for leaves.
    pub first_child: Option<usize>,
    /// Split axis (0 = x, 1 = y, 2 = z).
    pub axis: usize,
    /// Upper extent of the left child along `axis`.
    pub min: f64,
    /// Lower extent of the right child along `axis`.
    pub max: f64,
}

impl BihNode {
    const fn leaf(start: usize, count: usize) -> Self {
        Self {
            start,
            count,
            first_child: None,
            axis: 0,
            min: 0.0,
            max: 0.0,
        }
    }

    /// Whether the node has no children.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }
}

/// Bounding interval hierarchy over elements of type `T`.
///
/// Elements are reordered during the build; every node covers a contiguous
/// range of [`elements`](Self::elements).
#[derive(Debug, Clone)]
pub struct Bih<T> {
    nodes: Vec<BihNode>,
    elements: Vec<T>,
}

impl<T> Default for Bih<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            elements: Vec::new(),
        }
    }
}

impl<T: Bounded> Bih<T> {
    /// Build a tree with the default parameters.
    #[must_use]
    pub fn build(elements: Vec<T>) -> Self {
        Self::build_with(elements, &BihConfig::default())
    }

    /// Build a tree with explicit parameters.
    #[must_use]
    pub fn build_with(mut elements: Vec<T>, config: &BihConfig) -> Self {
        if elements.is_empty() {
            return Self::default();
        }

        let mut nodes = vec![BihNode::leaf(0, elements.len())];
        let mut queue = VecDeque::from([(0_usize, 0_usize)]);

        while let Some((index, depth)) = queue.pop_front() {
            let node = nodes[index];
            if node.count <= 2 || depth >= config.max_depth {
                continue;
            }

            let range = node.start..node.start + node.count;
            let bounds = elements[range.clone()]
                .iter()
                .fold(Aabb::empty(), |acc, e| acc.union(&e.bounds()));
            let axis = bounds.longest_axis();
            let extent = bounds.size()[axis];
            if extent <= 0.0 {
                continue;
            }
            let pivot = bounds.center()[axis];

            // Two-pointer partition: [start, i) is left, [j, end) is right.
            let mut i = range.start;
            let mut j = range.end;
            let mut left_max = f64::MIN;
            let mut right_min = f64::MAX;
            while i < j {
                let b = elements[i].bounds();
                if b.center()[axis] < pivot {
                    left_max = left_max.max(b.max[axis]);
                    i += 1;
                } else {
                    right_min = right_min.min(b.min[axis]);
                    j -= 1;
                    elements.swap(i, j);
                }
            }

            let left_count = i - range.start;
            let right_count = node.count - left_count;
            if left_count == 0 || right_count == 0 {
                continue;
            }
            if (left_max - right_min) / extent > config.max_overlap {
                continue;
            }

            let first_child = nodes.len();
            nodes[index] = BihNode {
                first_child: Some(first_child),
                axis,
                min: left_max,
                max: right_min,
                ..node
            };
            nodes.push(BihNode::leaf(range.start, left_count));
            nodes.push(BihNode::leaf(i, right_count));
            queue.push_back((first_child, depth + 1));
            queue.push_back((first_child + 1, depth + 1));
        }

        tracing::debug!(
            elements = elements.len(),
            nodes = nodes.len(),
            "built bounding interval hierarchy"
        );

        Self { nodes, elements }
    }
}

impl<T> Bih<T> {
    /// Tree nodes; the root is at index 0.
    #[must_use]
    pub fn nodes(&self) -> &[BihNode] {
        &self.nodes
    }

    /// Elements in tree order.
    #[must_use]
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the tree holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Find the element minimizing `|distance|`.
    ///
    /// `distance` returns a signed distance from `point` to an element plus an
    /// arbitrary payload. The magnitude must never be smaller than the
    /// Euclidean distance from `point` to the element's bounds. Returns `None`
    /// for an empty tree.
    pub fn nearest_by<R, F>(&self, point: &Point3<f64>, mut distance: F) -> Option<(f64, R)>
    where
        F: FnMut(&T) -> (f64, R),
    {
        let mut best = None;
        if !self.nodes.is_empty() {
            self.visit(0, point, &mut distance, &mut best);
        }
        best
    }

    /// Signed distance to the nearest element, or `f64::MAX` for an empty tree.
    pub fn signed_distance_by<F>(&self, point: &Point3<f64>, mut distance: F) -> f64
    where
        F: FnMut(&T) -> f64,
    {
        self.nearest_by(point, |e| (distance(e), ()))
            .map_or(f64::MAX, |(d, ())| d)
    }

    fn visit<R, F>(
        &self,
        index: usize,
        point: &Point3<f64>,
        distance: &mut F,
        best: &mut Option<(f64, R)>,
    ) where
        F: FnMut(&T) -> (f64, R),
    {
        let node = &self.nodes[index];
        let Some(left) = node.first_child else {
            for element in &self.elements[node.start..node.start + node.count] {
                let (d, payload) = distance(element);
                if best.as_ref().is_none_or(|(b, _)| d.abs() < b.abs()) {
                    *best = Some((d, payload));
                }
            }
            return;
        };

        let p = point[node.axis];
        let left_bound = (p - node.min).max(0.0);
        let right_bound = (node.max - p).max(0.0);
        let order = if left_bound <= right_bound {
            [(left, left_bound), (left + 1, right_bound)]
        } else {
            [(left + 1, right_bound), (left, left_bound)]
        };

        for (child, bound) in order {
            if best.as_ref().is_none_or(|(b, _)| bound < b.abs()) {
                self.visit(child, point, distance, best);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Debug, Clone, Copy)]
    struct Ball {
        center: Point3<f64>,
        radius: f64,
    }

    impl Bounded for Ball {
        fn bounds(&self) -> Aabb {
            Aabb::from_sphere(self.center, self.radius)
        }
    }

    fn ball_distance(ball: &Ball, p: &Point3<f64>) -> f64 {
        (p - ball.center).norm() - ball.radius
    }

    fn random_balls(count: usize, seed: u64) -> Vec<Ball> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| Ball {
                center: Point3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                ),
                radius: rng.gen_range(0.05..0.3),
            })
            .collect()
    }

    #[test]
    fn test_empty_tree() {
        let bih: Bih<Ball> = Bih::build(Vec::new());
        assert!(bih.is_empty());
        assert_eq!(
            bih.signed_distance_by(&Point3::origin(), |b| ball_distance(b, &Point3::origin())),
            f64::MAX
        );
    }

    #[test]
    fn test_leaves_cover_every_element_once() {
        let bih = Bih::build(random_balls(200, 7));
        let mut covered = vec![0_u32; bih.len()];
        for node in bih.nodes().iter().filter(|n| n.is_leaf()) {
            for c in &mut covered[node.start..node.start + node.count] {
                *c += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
        assert!(bih.nodes().len() > 1);
    }

    #[test]
    fn test_split_planes_bound_children() {
        let bih = Bih::build(random_balls(300, 11));
        for node in bih.nodes() {
            let Some(left) = node.first_child else {
                continue;
            };
            let l = bih.nodes()[left];
            let r = bih.nodes()[left + 1];
            for e in &bih.elements()[l.start..l.start + l.count] {
                assert!(e.bounds().max[node.axis] <= node.min);
            }
            for e in &bih.elements()[r.start..r.start + r.count] {
                assert!(e.bounds().min[node.axis] >= node.max);
            }
        }
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let balls = random_balls(150, 3);
        let bih = Bih::build(balls.clone());
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..200 {
            let p = Point3::new(
                rng.gen_range(-7.0..7.0),
                rng.gen_range(-7.0..7.0),
                rng.gen_range(-7.0..7.0),
            );
            let expected = balls
                .iter()
                .map(|b| ball_distance(b, &p))
                .min_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(f64::MAX);
            let got = bih.signed_distance_by(&p, |b| ball_distance(b, &p));
            assert_relative_eq!(got, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_coincident_elements_stay_in_leaf() {
        let balls = vec![
            Ball {
                center: Point3::new(1.0, 1.0, 1.0),
                radius: 0.1,
            };
            16
        ];
        let bih = Bih::build(balls);
        assert_eq!(bih.nodes().len(), 1);
        let d = bih.signed_distance_by(&Point3::origin(), |b| ball_distance(b, &Point3::origin()));
        assert_relative_eq!(d, Vector3::new(1.0, 1.0, 1.0).norm() - 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_max_depth_zero_is_single_leaf() {
        let config = BihConfig {
            max_depth: 0,
            ..Default::default()
        };
        let bih = Bih::build_with(random_balls(50, 1), &config);
        assert_eq!(bih.nodes().len(), 1);
        assert_eq!(bih.nodes()[0].count, 50);
    }
}
