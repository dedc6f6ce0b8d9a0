// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! In-memory model of the routing graph: [RouteNodes](RouteNode) with their outgoing
//! [Paths](Path), the objects (ways and areas) passing through them and turn restrictions.

pub mod codec;
mod memory;

pub use codec::DecodeError;
pub use memory::RouteGraph;

use crate::{GeoCoord, TypeId, Vehicle};

/// Number of stored distance units per kilometer (distances are kept with centimeter precision).
pub const DISTANCE_UNITS_PER_KM: f64 = 100_000.0;

/// Identifier of a [RouteNode], derived from its coordinate via [GeoCoord::node_id].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Recovers the (quantized) coordinate this id was derived from.
    pub fn coord(self) -> GeoCoord {
        GeoCoord::from_fixed((self.0 >> 32) as u32, self.0 as u32)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an object inside its data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileOffset(pub u64);

impl std::fmt::Display for FileOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of object referenced by an [ObjectFileRef].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefType {
    Way,
    Area,
}

/// Reference to a way or an area inside one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectFileRef {
    pub kind: RefType,
    pub offset: FileOffset,
}

impl ObjectFileRef {
    pub const fn way(offset: u64) -> Self {
        Self {
            kind: RefType::Way,
            offset: FileOffset(offset),
        }
    }

    pub const fn area(offset: u64) -> Self {
        Self {
            kind: RefType::Area,
            offset: FileOffset(offset),
        }
    }

    pub fn is_way(&self) -> bool {
        self.kind == RefType::Way
    }
}

impl std::fmt::Display for ObjectFileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            RefType::Way => write!(f, "way {}", self.offset),
            RefType::Area => write!(f, "area {}", self.offset),
        }
    }
}

/// Deduplicated routing attributes shared by many objects.
///
/// Ordering (and thus deduplication and lookup) is by type, then max speed, then grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectVariantData {
    pub type_id: TypeId,
    /// Maximum allowed speed in km/h, zero if unknown.
    pub max_speed: u8,
    /// Surface quality, 1 (solid) to 5 (soft).
    pub grade: u8,
}

/// Sorted, immutable table of [ObjectVariantData] of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantTable(Vec<ObjectVariantData>);

impl VariantTable {
    /// Builds a table from arbitrary entries, sorting and deduplicating them.
    pub fn from_unsorted(mut entries: Vec<ObjectVariantData>) -> Self {
        entries.sort();
        entries.dedup();
        Self(entries)
    }

    pub fn get(&self, index: usize) -> Option<&ObjectVariantData> {
        self.0.get(index)
    }

    /// Finds the index of the given variant using binary search.
    pub fn position(&self, v: &ObjectVariantData) -> Option<usize> {
        self.0.binary_search(v).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[ObjectVariantData] {
        &self.0
    }
}

/// An object passing through a [RouteNode].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectData {
    pub object: ObjectFileRef,
    /// Index into the database's [VariantTable].
    pub variant_index: u16,
}

/// Outgoing connection from a [RouteNode] to a neighboring one, along one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Path {
    pub target: NodeId,
    /// Index into [RouteNode::objects] of the object this path follows.
    pub object_index: usize,
    /// Length in kilometers, with centimeter precision.
    pub distance: f64,
    /// Combination of [Vehicle::usable_bit] and [Vehicle::restricted_bit] values.
    pub flags: u8,
}

impl Path {
    /// Creates a new path, rounding `distance` (in kilometers) to the stored precision.
    pub fn new(target: NodeId, object_index: usize, distance: f64, flags: u8) -> Self {
        Self {
            target,
            object_index,
            distance: quantize_distance(distance),
            flags,
        }
    }

    pub fn is_usable(&self, vehicle: Vehicle) -> bool {
        self.flags & vehicle.usable_bit() != 0
    }

    pub fn is_restricted(&self, vehicle: Vehicle) -> bool {
        self.flags & vehicle.restricted_bit() != 0
    }
}

/// Rounds a distance in kilometers to the precision used in files.
pub fn quantize_distance(km: f64) -> f64 {
    (km * DISTANCE_UNITS_PER_KM).round() / DISTANCE_UNITS_PER_KM
}

/// Turn restriction: arriving via `source`, the object followed by
/// `paths[target_index]` must not be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exclude {
    pub source: ObjectFileRef,
    pub target_index: usize,
}

/// Vertex of the routing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteNode {
    pub id: NodeId,
    /// Disambiguates distinct nodes sharing a position.
    pub serial: u8,
    pub coord: GeoCoord,
    pub objects: Vec<ObjectData>,
    pub paths: Vec<Path>,
    pub excludes: Vec<Exclude>,
}

impl RouteNode {
    /// Creates a node without any connections. The coordinate is quantized,
    /// so that `id` always matches `coord`.
    pub fn new(serial: u8, coord: GeoCoord) -> Self {
        let coord = coord.quantized();
        Self {
            id: coord.node_id(),
            serial,
            coord,
            objects: Vec::new(),
            paths: Vec::new(),
            excludes: Vec::new(),
        }
    }

    /// Returns the index of `object` in [RouteNode::objects], adding it if necessary.
    pub fn add_object(&mut self, object: ObjectFileRef, variant_index: u16) -> usize {
        if let Some(idx) = self.objects.iter().position(|o| o.object == object) {
            return idx;
        }
        self.objects.push(ObjectData {
            object,
            variant_index,
        });
        self.objects.len() - 1
    }

    /// Returns the object followed by the path with the given index.
    pub fn path_object(&self, path_index: usize) -> Option<ObjectFileRef> {
        let path = self.paths.get(path_index)?;
        self.objects.get(path.object_index).map(|o| o.object)
    }

    /// Returns the variant index of the object followed by the path with the given index.
    pub fn path_variant(&self, path_index: usize) -> Option<usize> {
        let path = self.paths.get(path_index)?;
        self.objects
            .get(path.object_index)
            .map(|o| o.variant_index as usize)
    }

    /// Checks if any turn restriction forbids using `paths[path_index]`
    /// after arriving at this node via `from`.
    pub fn is_excluded(&self, from: ObjectFileRef, path_index: usize) -> bool {
        let Some(target_object) = self.path_object(path_index) else {
            return false;
        };

        self.excludes.iter().any(|exclude| {
            exclude.source == from
                && (exclude.target_index == path_index
                    || self.path_object(exclude.target_index) == Some(target_object))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_two_ways() -> RouteNode {
        let mut n = RouteNode::new(0, GeoCoord::new(10.0, 10.0));
        let a = n.add_object(ObjectFileRef::way(100), 0);
        let b = n.add_object(ObjectFileRef::way(200), 1);
        n.paths.push(Path::new(GeoCoord::new(10.0, 10.01).node_id(), a, 1.0, 0b100));
        n.paths.push(Path::new(GeoCoord::new(10.01, 10.0).node_id(), b, 1.0, 0b100));
        n.paths.push(Path::new(GeoCoord::new(9.99, 10.0).node_id(), b, 1.0, 0b100));
        n
    }

    #[test]
    fn add_object_deduplicates() {
        let mut n = node_with_two_ways();
        assert_eq!(n.add_object(ObjectFileRef::way(200), 7), 1);
        assert_eq!(n.objects.len(), 2);
        assert_eq!(n.objects[1].variant_index, 1);
    }

    #[test]
    fn exclude_matches_target_object() {
        let mut n = node_with_two_ways();
        n.excludes.push(Exclude {
            source: ObjectFileRef::way(100),
            target_index: 1,
        });

        assert!(n.is_excluded(ObjectFileRef::way(100), 1));
        // Same object as the excluded path, in the other direction
        assert!(n.is_excluded(ObjectFileRef::way(100), 2));
        assert!(!n.is_excluded(ObjectFileRef::way(100), 0));
        assert!(!n.is_excluded(ObjectFileRef::way(200), 1));
    }

    #[test]
    fn variant_ordering() {
        let v = |t, s, g| ObjectVariantData {
            type_id: TypeId(t),
            max_speed: s,
            grade: g,
        };
        let table = VariantTable::from_unsorted(vec![v(2, 0, 1), v(1, 50, 1), v(1, 30, 2), v(1, 30, 1), v(2, 0, 1)]);
        assert_eq!(table.as_slice(), &[v(1, 30, 1), v(1, 30, 2), v(1, 50, 1), v(2, 0, 1)]);
        assert_eq!(table.position(&v(1, 50, 1)), Some(2));
        assert_eq!(table.position(&v(3, 0, 1)), None);
    }

    #[test]
    fn path_flags() {
        let p = Path::new(NodeId(1), 0, 0.123456789, Vehicle::Car.usable_bit() | Vehicle::Foot.restricted_bit());
        assert!(p.is_usable(Vehicle::Car));
        assert!(!p.is_usable(Vehicle::Foot));
        assert!(p.is_restricted(Vehicle::Foot));
        assert_eq!(p.distance, 0.12346);
    }
}
