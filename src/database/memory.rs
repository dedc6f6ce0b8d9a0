// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Object database held completely in memory, loaded from an `objects.dat` file.
//!
//! File layout (all integers little endian):
//!
//! ```text
//! header:  magic u32, version u16, reserved u16, types_offset u64
//! records: (tag: u8, type: varint, name: string, ref: string, flags: u8,
//!           access_forward: u8, access_backward: u8, restricted: u8,
//!           max_speed: u8, grade: u8, node_count: varint, coords...)*
//! types:   count: varint, (name: string, routable: u8) * count
//! ```
//!
//! The [FileOffset] of an object is the position of its record in the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Access, Area, DatabaseError, ObjectDatabase, Way, WayNodeMatch};
use crate::graph::codec::{ByteReader, ByteWriter};
use crate::graph::{DecodeError, FileOffset};
use crate::kd::{KDTree, WayNode};
use crate::{GeoBox, GeoCoord, TypeConfig, TypeId};

pub(super) const MAGIC: u32 = 0x4f42_4a53;
pub(super) const VERSION: u16 = 1;
pub(super) const HEADER_SIZE: usize = 16;

const TAG_WAY: u8 = 0;
const TAG_AREA: u8 = 1;

const FLAG_ROUNDABOUT: u8 = 1 << 0;
const FLAG_BRIDGE: u8 = 1 << 1;

/// Object database with all ways and areas decoded into memory,
/// and a [KDTree] over way nodes for nearest node lookups.
#[derive(Debug)]
pub struct MemoryDatabase {
    path: Option<PathBuf>,
    types: TypeConfig,
    /// Sorted by offset
    ways: Vec<Arc<Way>>,
    /// Sorted by offset
    areas: Vec<Arc<Area>>,
    bounding_box: GeoBox,
    index: Option<KDTree>,
}

impl MemoryDatabase {
    /// Creates a database from already decoded objects.
    pub fn from_objects(types: TypeConfig, mut ways: Vec<Way>, mut areas: Vec<Area>) -> Self {
        ways.sort_by_key(|w| w.offset);
        areas.sort_by_key(|a| a.offset);

        let mut bounding_box = GeoBox::invalid();
        ways.iter()
            .flat_map(|w| w.nodes.iter())
            .chain(areas.iter().flat_map(|a| a.ring.iter()))
            .for_each(|&c| bounding_box.include(c));

        let index = KDTree::from_iter(ways.iter().enumerate().flat_map(|(way_idx, way)| {
            // The closing node of a ring duplicates the first one
            let unique = if way.is_ring() { way.nodes.len() - 1 } else { way.nodes.len() };
            way.nodes[..unique]
                .iter()
                .enumerate()
                .map(move |(node_idx, &coord)| WayNode {
                    coord,
                    way: way_idx as u32,
                    index: node_idx as u32,
                })
        }));

        Self {
            path: None,
            types,
            ways: ways.into_iter().map(Arc::new).collect(),
            areas: areas.into_iter().map(Arc::new).collect(),
            bounding_box,
            index,
        }
    }

    /// Loads all objects from an `objects.dat` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let result = fs::read(path)
            .map_err(|source| DatabaseError::Io {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|data| Self::decode(path, &data));

        match result {
            Ok(mut db) => {
                log::info!(
                    "opened {}: {} ways, {} areas, {} types",
                    path.display(),
                    db.ways.len(),
                    db.areas.len(),
                    db.types.len(),
                );
                db.path = Some(path.to_path_buf());
                Ok(db)
            }
            Err(e) => {
                log::error!("failed to open object database: {e}");
                Err(e)
            }
        }
    }

    fn decode(path: &Path, data: &[u8]) -> Result<Self, DatabaseError> {
        let decode_err = |source: DecodeError| DatabaseError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut header = ByteReader::new(data, 0);
        let magic = header.read_u32().map_err(decode_err)?;
        if magic != MAGIC {
            return Err(DatabaseError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let version = header.read_u16().map_err(decode_err)?;
        if version != VERSION {
            return Err(DatabaseError::UnsupportedVersion {
                path: path.to_path_buf(),
                version,
            });
        }
        header.read_u16().map_err(decode_err)?;
        let types_offset = header.read_u64().map_err(decode_err)?;
        if types_offset < HEADER_SIZE as u64 || types_offset > data.len() as u64 {
            return Err(decode_err(DecodeError::OutOfRange {
                what: "types offset",
                value: types_offset,
                offset: 8,
            }));
        }
        let types_offset = types_offset as usize;

        let types = read_types(&mut ByteReader::new(&data[types_offset..], types_offset as u64))
            .map_err(decode_err)?;

        let mut ways = Vec::new();
        let mut areas = Vec::new();
        let mut r = ByteReader::new(&data[HEADER_SIZE..types_offset], HEADER_SIZE as u64);
        while !r.is_empty() {
            match read_record(&mut r, &types).map_err(decode_err)? {
                Record::Way(w) => ways.push(w),
                Record::Area(a) => areas.push(a),
            }
        }

        Ok(Self::from_objects(types, ways, areas))
    }

    /// Path of the file this database was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }
}

impl ObjectDatabase for MemoryDatabase {
    fn bounding_box(&self) -> GeoBox {
        self.bounding_box
    }

    fn types(&self) -> &TypeConfig {
        &self.types
    }

    fn way_by_offset(&self, offset: FileOffset) -> Result<Arc<Way>, DatabaseError> {
        self.ways
            .binary_search_by_key(&offset, |w| w.offset)
            .map(|idx| self.ways[idx].clone())
            .map_err(|_| DatabaseError::UnknownObject(crate::graph::ObjectFileRef::way(offset.0)))
    }

    fn area_by_offset(&self, offset: FileOffset) -> Result<Arc<Area>, DatabaseError> {
        self.areas
            .binary_search_by_key(&offset, |a| a.offset)
            .map(|idx| self.areas[idx].clone())
            .map_err(|_| DatabaseError::UnknownObject(crate::graph::ObjectFileRef::area(offset.0)))
    }

    fn closest_way_node(
        &self,
        coord: GeoCoord,
        radius: f64,
        filter: &dyn Fn(&Way) -> bool,
    ) -> Result<Option<WayNodeMatch>, DatabaseError> {
        let Some(index) = &self.index else {
            return Ok(None);
        };

        let found = index.find_nearest(coord, radius, |n| {
            self.ways.get(n.way as usize).is_some_and(|w| filter(w))
        });

        Ok(found.and_then(|(n, distance)| {
            let way = self.ways.get(n.way as usize)?;
            Some(WayNodeMatch {
                way: way.object_ref(),
                node_index: n.index as usize,
                coord: n.coord,
                distance,
            })
        }))
    }
}

enum Record {
    Way(Way),
    Area(Area),
}

pub(super) fn write_way(w: &mut ByteWriter, way: &Way) {
    let mut flags = 0;
    if way.roundabout {
        flags |= FLAG_ROUNDABOUT;
    }
    if way.bridge {
        flags |= FLAG_BRIDGE;
    }

    w.write_u8(TAG_WAY);
    write_common(w, way.type_id, &way.name, &way.ref_name, flags, way.access, way.restricted);
    w.write_u8(way.max_speed);
    w.write_u8(way.grade);
    write_coords(w, &way.nodes);
}

pub(super) fn write_area(w: &mut ByteWriter, area: &Area) {
    w.write_u8(TAG_AREA);
    write_common(w, area.type_id, &area.name, &area.ref_name, 0, area.access, 0);
    w.write_u8(0);
    w.write_u8(0);
    write_coords(w, &area.ring);
}

fn write_common(
    w: &mut ByteWriter,
    type_id: TypeId,
    name: &str,
    ref_name: &str,
    flags: u8,
    access: Access,
    restricted: u8,
) {
    w.write_varint(type_id.0 as u64);
    w.write_string(name);
    w.write_string(ref_name);
    w.write_u8(flags);
    w.write_u8(access.forward);
    w.write_u8(access.backward);
    w.write_u8(restricted);
}

fn write_coords(w: &mut ByteWriter, coords: &[GeoCoord]) {
    w.write_varint(coords.len() as u64);
    for &c in coords {
        w.write_coord(c);
    }
}

pub(super) fn write_types(w: &mut ByteWriter, types: &TypeConfig) {
    w.write_varint(types.len() as u64);
    for t in types.iter() {
        w.write_string(&t.name);
        w.write_u8(t.routable);
    }
}

fn read_types(r: &mut ByteReader<'_>) -> Result<TypeConfig, DecodeError> {
    let count = r.read_bounded("type count", u16::MAX as u64)?;
    let mut types = TypeConfig::new();
    for _ in 0..count {
        let name = r.read_string()?;
        let routable = r.read_u8()?;
        types.register(&name, routable);
    }
    Ok(types)
}

fn read_record(r: &mut ByteReader<'_>, types: &TypeConfig) -> Result<Record, DecodeError> {
    let offset = FileOffset(r.offset());
    let tag = r.read_u8()?;
    let type_id = TypeId(r.read_index("type", types.len())? as u16);
    let name = r.read_string()?;
    let ref_name = r.read_string()?;
    let flags = r.read_u8()?;
    let access = Access {
        forward: r.read_u8()?,
        backward: r.read_u8()?,
    };
    let restricted = r.read_u8()?;
    let max_speed = r.read_u8()?;
    let grade = r.read_u8()?;

    let count = r.read_bounded("node count", u32::MAX as u64)? as usize;
    let mut nodes = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        nodes.push(r.read_coord()?);
    }

    match tag {
        TAG_WAY => Ok(Record::Way(Way {
            offset,
            type_id,
            name,
            ref_name,
            nodes,
            access,
            restricted,
            max_speed,
            grade,
            roundabout: flags & FLAG_ROUNDABOUT != 0,
            bridge: flags & FLAG_BRIDGE != 0,
        })),
        TAG_AREA => Ok(Record::Area(Area {
            offset,
            type_id,
            name,
            ref_name,
            ring: nodes,
            access,
        })),
        _ => Err(DecodeError::OutOfRange {
            what: "object tag",
            value: tag as u64,
            offset: offset.0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseBuilder;
    use crate::graph::ObjectFileRef;
    use crate::Vehicle;

    fn sample_builder() -> (DatabaseBuilder, ObjectFileRef, ObjectFileRef) {
        let mut types = TypeConfig::new();
        let road = types.register("highway_residential", Vehicle::Car.usable_bit());
        let square = types.register("highway_pedestrian", Vehicle::Foot.usable_bit());

        let mut b = DatabaseBuilder::new(types);
        let way = b.add_way(Way {
            type_id: road,
            name: "Długa".into(),
            ref_name: "DW 7".into(),
            nodes: vec![GeoCoord::new(52.0, 21.0), GeoCoord::new(52.0, 21.01), GeoCoord::new(52.01, 21.01)],
            access: Access::oneway(Vehicle::Car.usable_bit()),
            max_speed: 50,
            grade: 1,
            bridge: true,
            ..Way::default()
        });
        let area = b.add_area(Area {
            type_id: square,
            name: "Rynek".into(),
            ring: vec![GeoCoord::new(52.1, 21.1), GeoCoord::new(52.1, 21.11), GeoCoord::new(52.11, 21.11)],
            access: Access::both(Vehicle::Foot.usable_bit()),
            ..Area::default()
        });
        (b, way, area)
    }

    #[test]
    fn saved_file_can_be_opened() {
        let (b, way_ref, area_ref) = sample_builder();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.dat");
        b.save(&path).unwrap();

        let db = MemoryDatabase::open(&path).unwrap();
        assert_eq!(db.way_count(), 1);
        assert_eq!(db.area_count(), 1);
        assert_eq!(db.types().len(), 2);

        let way = db.way_by_offset(way_ref.offset).unwrap();
        assert_eq!(way.offset.0, HEADER_SIZE as u64);
        assert_eq!(way.name, "Długa");
        assert_eq!(way.ref_name, "DW 7");
        assert_eq!(way.max_speed, 50);
        assert!(way.bridge);
        assert!(!way.roundabout);
        assert!(way.access.can_use_forward(Vehicle::Car));
        assert!(!way.access.can_use_backward(Vehicle::Car));

        let area = db.area_by_offset(area_ref.offset).unwrap();
        assert_eq!(area.name, "Rynek");
        // Rings are closed by the builder
        assert_eq!(area.ring.len(), 4);
        assert_eq!(area.ring.first(), area.ring.last());

        assert!(matches!(
            db.way_by_offset(FileOffset(1)),
            Err(DatabaseError::UnknownObject(_))
        ));
        assert!(db.bounding_box().contains(GeoCoord::new(52.05, 21.05)));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.dat");
        fs::write(&path, [0u8; 32]).unwrap();
        assert!(matches!(
            MemoryDatabase::open(&path),
            Err(DatabaseError::BadMagic { .. })
        ));
    }

    #[test]
    fn closest_way_node_honors_filter_and_radius() {
        let (b, way_ref, _) = sample_builder();
        let db = b.build();

        let m = db
            .closest_way_node(GeoCoord::new(52.0001, 21.0099), 1.0, &|_| true)
            .unwrap()
            .unwrap();
        assert_eq!(m.way, way_ref);
        assert_eq!(m.node_index, 1);
        assert!(m.distance < 0.05);

        assert!(db
            .closest_way_node(GeoCoord::new(52.0001, 21.0099), 1.0, &|w| w.max_speed > 50)
            .unwrap()
            .is_none());
        assert!(db
            .closest_way_node(GeoCoord::new(53.0, 21.0), 1.0, &|_| true)
            .unwrap()
            .is_none());
    }
}
