// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, GeoCoord};

/// A node of a way, as stored in a [KDTree].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WayNode {
    pub coord: GeoCoord,
    /// Index of the way in the owning database's way list.
    pub way: u32,
    /// Index of the node inside the way.
    pub index: u32,
}

/// KDTree implements the [k-d tree data structure](https://en.wikipedia.org/wiki/K-d_tree)
/// over [WayNodes](WayNode), used to anchor route positions at the closest
/// node of a routable way.
///
/// This implementation assumes euclidean geometry, even though the distance function
/// used is [earth_distance]. This results in undefined behavior when points
/// are close to the ante meridian (180°/-180° longitude) or poles (90°/-90° latitude),
/// or when the data spans multiple continents.
#[derive(Debug, Clone)]
pub struct KDTree {
    pivot: WayNode,
    left: Option<Box<KDTree>>,
    right: Option<Box<KDTree>>,
}

impl KDTree {
    /// Finds the closest [WayNode] to the given position, accepted by `filter`,
    /// and not further than `max_distance` kilometers.
    pub fn find_nearest<F>(&self, c: GeoCoord, max_distance: f64, filter: F) -> Option<(WayNode, f64)>
    where
        F: Fn(&WayNode) -> bool,
    {
        let mut best = None;
        let mut best_dist = max_distance;
        self.find_nearest_impl(c, false, &filter, &mut best, &mut best_dist);
        best.map(|n| (n, best_dist))
    }

    fn find_nearest_impl<F>(
        &self,
        c: GeoCoord,
        lon_divides: bool,
        filter: &F,
        best: &mut Option<WayNode>,
        best_dist: &mut f64,
    ) where
        F: Fn(&WayNode) -> bool,
    {
        let pivot_dist = earth_distance(c, self.pivot.coord);
        if pivot_dist <= *best_dist && filter(&self.pivot) {
            *best = Some(self.pivot);
            *best_dist = pivot_dist;
        }

        // Select which branch to recurse into first
        let first_left = if lon_divides {
            c.lon < self.pivot.coord.lon
        } else {
            c.lat < self.pivot.coord.lat
        };
        let (first, second) = if first_left {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(ref branch) = first {
            branch.find_nearest_impl(c, !lon_divides, filter, best, best_dist);
        }

        // (Optionally) recurse into the second branch
        if let Some(ref branch) = second {
            // A closer node is possible in the second branch if and only if
            // the splitting axis is closer than the current best candidate.
            let axis = if lon_divides {
                GeoCoord::new(c.lat, self.pivot.coord.lon)
            } else {
                GeoCoord::new(self.pivot.coord.lat, c.lon)
            };

            if earth_distance(c, axis) <= *best_dist {
                branch.find_nearest_impl(c, !lon_divides, filter, best, best_dist);
            }
        }
    }

    /// Builds a k-d tree from an iterable of [WayNodes](WayNode).
    pub fn from_iter<I: IntoIterator<Item = WayNode>>(nodes: I) -> Option<Self> {
        let mut nodes = nodes.into_iter().collect::<Vec<_>>();
        Self::build(nodes.as_mut_slice())
    }

    /// Builds a k-d tree from a mutable slice of [WayNodes](WayNode). Nodes will be reordered
    /// in the slice to facilitate building the tree.
    pub fn build(nodes: &mut [WayNode]) -> Option<Self> {
        Self::build_impl(nodes, false)
    }

    fn build_impl(nodes: &mut [WayNode], lon_divides: bool) -> Option<Self> {
        match nodes.len() {
            0 => None,
            1 => Some(Self {
                pivot: nodes[0],
                left: None,
                right: None,
            }),
            _ => {
                if lon_divides {
                    nodes.sort_by(|a, b| a.coord.lon.total_cmp(&b.coord.lon));
                } else {
                    nodes.sort_by(|a, b| a.coord.lat.total_cmp(&b.coord.lat));
                }
                let median = nodes.len() / 2;
                let pivot = nodes[median];
                let (left, right_and_pivot) = nodes.split_at_mut(median);
                let right = &mut right_and_pivot[1..];
                Some(Self {
                    pivot,
                    left: Self::build_impl(left, !lon_divides).map(Box::new),
                    right: Self::build_impl(right, !lon_divides).map(Box::new),
                })
            }
        }
    }
}
