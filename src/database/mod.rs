// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Read access to the ways and areas of one map database.
//!
//! The router only needs geometry, names and access rules of the objects
//! referenced by route nodes, plus a nearest-node lookup used to anchor
//! route positions. Those needs are captured by the [ObjectDatabase] trait.

mod builder;
mod memory;

pub use builder::DatabaseBuilder;
pub use memory::MemoryDatabase;

use std::path::PathBuf;
use std::sync::Arc;

use crate::graph::{DecodeError, FileOffset, NodeId, ObjectFileRef, RefType};
use crate::{GeoBox, GeoCoord, TypeConfig, TypeId, Vehicle};

/// Error which can occur when loading objects from a database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("{}: io: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: not an object file", path.display())]
    BadMagic { path: PathBuf },

    #[error("{}: unsupported object file version {version}", path.display())]
    UnsupportedVersion { path: PathBuf, version: u16 },

    #[error("{}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("unknown object: {0}")]
    UnknownObject(ObjectFileRef),
}

/// Directional access of an object. Both fields are combinations of
/// [Vehicle::usable_bit] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    pub forward: u8,
    pub backward: u8,
}

impl Access {
    /// Access in both directions for the given vehicles.
    pub const fn both(vehicles: u8) -> Self {
        Self {
            forward: vehicles,
            backward: vehicles,
        }
    }

    /// Access only in the direction of the object's nodes.
    pub const fn oneway(vehicles: u8) -> Self {
        Self {
            forward: vehicles,
            backward: 0,
        }
    }

    pub fn can_use_forward(&self, vehicle: Vehicle) -> bool {
        self.forward & vehicle.usable_bit() != 0
    }

    pub fn can_use_backward(&self, vehicle: Vehicle) -> bool {
        self.backward & vehicle.usable_bit() != 0
    }
}

/// A linear object: a road, path or roundabout.
///
/// A way whose first and last node coincide is a ring.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Way {
    pub offset: FileOffset,
    pub type_id: TypeId,
    pub name: String,
    pub ref_name: String,
    pub nodes: Vec<GeoCoord>,
    pub access: Access,
    /// Vehicles (as [Vehicle::usable_bit] values) which may only use the way
    /// to reach a destination on it, e.g. because of private access.
    pub restricted: u8,
    /// Signposted speed limit in km/h, zero if unknown.
    pub max_speed: u8,
    pub grade: u8,
    pub roundabout: bool,
    pub bridge: bool,
}

/// A routable area, e.g. a pedestrian square. Its outer ring is stored closed,
/// with the first node repeated at the end.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Area {
    pub offset: FileOffset,
    pub type_id: TypeId,
    pub name: String,
    pub ref_name: String,
    pub ring: Vec<GeoCoord>,
    pub access: Access,
}

impl Way {
    pub fn object_ref(&self) -> ObjectFileRef {
        ObjectFileRef::way(self.offset.0)
    }

    pub fn is_ring(&self) -> bool {
        is_closed(&self.nodes)
    }

    /// Checks if the ring of nodes is oriented clockwise.
    /// Always false for ways which are not rings.
    pub fn is_clockwise(&self) -> bool {
        self.is_ring() && signed_area(&self.nodes) < 0.0
    }
}

impl Area {
    pub fn object_ref(&self) -> ObjectFileRef {
        ObjectFileRef::area(self.offset.0)
    }
}

fn is_closed(nodes: &[GeoCoord]) -> bool {
    nodes.len() >= 3
        && nodes.first().map(|c| c.node_id()) == nodes.last().map(|c| c.node_id())
}

/// Shoelace formula over (lon, lat), positive for counter-clockwise rings.
fn signed_area(nodes: &[GeoCoord]) -> f64 {
    nodes
        .windows(2)
        .map(|w| w[0].lon * w[1].lat - w[1].lon * w[0].lat)
        .sum::<f64>()
        * 0.5
}

/// Either a [Way] or an [Area], as referenced by a route node.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutableObject {
    Way(Arc<Way>),
    Area(Arc<Area>),
}

impl RoutableObject {
    pub fn object_ref(&self) -> ObjectFileRef {
        match self {
            Self::Way(w) => w.object_ref(),
            Self::Area(a) => a.object_ref(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            Self::Way(w) => w.type_id,
            Self::Area(a) => a.type_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Way(w) => &w.name,
            Self::Area(a) => &a.name,
        }
    }

    pub fn ref_name(&self) -> &str {
        match self {
            Self::Way(w) => &w.ref_name,
            Self::Area(a) => &a.ref_name,
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Self::Way(w) => w.access,
            Self::Area(a) => a.access,
        }
    }

    /// Maximum speed of the object, zero if unknown.
    pub fn max_speed(&self) -> u8 {
        match self {
            Self::Way(w) => w.max_speed,
            Self::Area(_) => 0,
        }
    }

    pub fn is_roundabout(&self) -> bool {
        matches!(self, Self::Way(w) if w.roundabout)
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self, Self::Way(w) if w.bridge)
    }

    pub fn is_area(&self) -> bool {
        matches!(self, Self::Area(_))
    }

    /// Node coordinates; closed for areas and ring ways.
    pub fn nodes(&self) -> &[GeoCoord] {
        match self {
            Self::Way(w) => &w.nodes,
            Self::Area(a) => &a.ring,
        }
    }

    pub fn is_ring(&self) -> bool {
        match self {
            Self::Way(w) => w.is_ring(),
            Self::Area(a) => is_closed(&a.ring),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    pub fn coord(&self, index: usize) -> Option<GeoCoord> {
        self.nodes().get(index).copied()
    }

    pub fn node_id(&self, index: usize) -> Option<NodeId> {
        self.coord(index).map(|c| c.node_id())
    }

    /// Index of the first node with the given id.
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.nodes().iter().position(|c| c.node_id() == id)
    }

    /// Checks if the node with the given id is the first or last node of a way.
    /// Areas have no ends.
    pub fn is_start_or_end(&self, id: NodeId) -> bool {
        match self {
            Self::Way(w) => {
                w.nodes.first().map(|c| c.node_id()) == Some(id)
                    || w.nodes.last().map(|c| c.node_id()) == Some(id)
            }
            Self::Area(_) => false,
        }
    }

    /// Walks the object from `from` until reaching a node with id `to`,
    /// returning the visited node indices (including both ends).
    ///
    /// Rings may be walked across their closing node. If both directions
    /// are allowed and reach the target, the shorter walk (in kilometers) is returned.
    pub fn walk(&self, from: usize, to: NodeId, forward: bool, backward: bool) -> Option<Vec<usize>> {
        self.walk_closest(from, to, forward, backward, 0.0)
    }

    /// Like [RoutableObject::walk], but if both directions reach the target,
    /// returns the walk with a length closest to `length` kilometers.
    pub fn walk_closest(
        &self,
        from: usize,
        to: NodeId,
        forward: bool,
        backward: bool,
        length: f64,
    ) -> Option<Vec<usize>> {
        let forward_walk = forward.then(|| self.walk_dir(from, to, true)).flatten();
        let backward_walk = backward.then(|| self.walk_dir(from, to, false)).flatten();
        match (forward_walk, backward_walk) {
            (Some(f), Some(b)) => {
                let off = |w: &[usize]| (self.walk_length(w) - length).abs();
                Some(if off(&b) < off(&f) { b } else { f })
            }
            (f, b) => f.or(b),
        }
    }

    fn walk_dir(&self, from: usize, to: NodeId, forward: bool) -> Option<Vec<usize>> {
        let nodes = self.nodes();
        let n = nodes.len();
        if from >= n {
            return None;
        }

        // Rings have their first node repeated at the end
        let mut at = if self.is_ring() && from == n - 1 { 0 } else { from };
        let mut visited = vec![at];

        for _ in 0..n {
            at = self.next_index(at, forward)?;
            visited.push(at);
            if nodes[at].node_id() == to {
                return Some(visited);
            }
        }
        None
    }

    /// Index of the node following `at` in the given direction.
    /// Rings wrap around and never return the index of their closing node.
    pub fn next_index(&self, at: usize, forward: bool) -> Option<usize> {
        let n = self.node_count();
        if self.is_ring() {
            let unique = n - 1;
            Some(if forward { (at + 1) % unique } else { (at + unique - 1) % unique })
        } else if forward {
            (at + 1 < n).then_some(at + 1)
        } else {
            at.checked_sub(1)
        }
    }

    /// Length of a walk returned by [RoutableObject::walk], in kilometers.
    pub fn walk_length(&self, indices: &[usize]) -> f64 {
        indices
            .windows(2)
            .filter_map(|w| Some(crate::earth_distance(self.coord(w[0])?, self.coord(w[1])?)))
            .sum()
    }
}

/// Result of a nearest way node lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WayNodeMatch {
    pub way: ObjectFileRef,
    pub node_index: usize,
    pub coord: GeoCoord,
    /// Distance from the query position, in kilometers.
    pub distance: f64,
}

/// Read-only access to the objects of one map database.
pub trait ObjectDatabase: std::fmt::Debug + Send + Sync {
    /// Extent of all objects in the database.
    fn bounding_box(&self) -> GeoBox;

    fn types(&self) -> &TypeConfig;

    fn way_by_offset(&self, offset: FileOffset) -> Result<Arc<Way>, DatabaseError>;

    fn area_by_offset(&self, offset: FileOffset) -> Result<Arc<Area>, DatabaseError>;

    /// Finds the way node closest to `coord`, not further than `radius` kilometers,
    /// on a way accepted by `filter`.
    fn closest_way_node(
        &self,
        coord: GeoCoord,
        radius: f64,
        filter: &dyn Fn(&Way) -> bool,
    ) -> Result<Option<WayNodeMatch>, DatabaseError>;

    /// Loads the way or area behind an object reference.
    fn object(&self, object: ObjectFileRef) -> Result<RoutableObject, DatabaseError> {
        match object.kind {
            RefType::Way => self.way_by_offset(object.offset).map(RoutableObject::Way),
            RefType::Area => self.area_by_offset(object.offset).map(RoutableObject::Area),
        }
    }
}
