// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Values flowing between route search and route description:
//! positions, raw search paths and resolved [RouteData].

pub mod description;

pub use description::{
    CrossingWaysDescription, Description, DescriptionKind, DirectionDescription, Move,
    NameDescription, Node, RouteDescription,
};

use crate::graph::{NodeId, ObjectFileRef};
use crate::GeoCoord;

/// Identifies one database opened by a [MultiDbRouter](crate::MultiDbRouter).
/// It is the index of the database in the order the databases were given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DatabaseId(pub u32);

impl DatabaseId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A route node qualified by the database it comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DbNodeId {
    pub database: DatabaseId,
    pub node: NodeId,
}

impl DbNodeId {
    pub const fn new(database: DatabaseId, node: NodeId) -> Self {
        Self { database, node }
    }
}

impl std::fmt::Display for DbNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.database, self.node)
    }
}

/// An object reference qualified by the database it comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DbObjectRef {
    pub database: DatabaseId,
    pub object: ObjectFileRef,
}

/// A routable anchor: a node of a way or area in one database.
///
/// The node does not need to be a route node; the search will walk
/// along the object to reach the closest ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutePosition {
    pub database: DatabaseId,
    pub object: ObjectFileRef,
    pub node_index: usize,
}

/// Result of [MultiDbRouter::closest_routable_node](crate::MultiDbRouter::closest_routable_node).
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestRoutableNode {
    pub position: RoutePosition,
    pub coord: GeoCoord,
    /// Distance from the query point, in kilometers.
    pub distance: f64,
    /// Name of the matched object, possibly empty.
    pub name: String,
}

/// One step of a raw search path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPathEntry {
    pub node: DbNodeId,
    /// Object used to arrive at this node. `None` for the first entry
    /// and for entries reached by switching to a twin in another database.
    pub via: Option<ObjectFileRef>,
    /// Index of the path taken out of this node to the next entry.
    /// `None` for the last entry and when the next entry is a twin.
    pub path_index: Option<usize>,
}

/// One way node on a resolved route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub database: DatabaseId,
    pub node_id: NodeId,
    /// Index of this node in `path_object`.
    pub current_node_index: usize,
    /// All objects meeting at this node, filled by junction resolution.
    pub objects: Vec<ObjectFileRef>,
    /// Object followed to the next entry, `None` for the last entry.
    pub path_object: Option<ObjectFileRef>,
    /// Index of the next entry's node in `path_object`.
    pub target_node_index: usize,
}

/// A route expanded to every way node it passes through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteData {
    pub entries: Vec<RouteEntry>,
}

impl RouteData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: RouteEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }
}

/// Continuous route geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteWay {
    pub nodes: Vec<GeoCoord>,
    pub ids: Vec<NodeId>,
}
