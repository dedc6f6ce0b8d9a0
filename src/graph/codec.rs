// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Binary encoding of [RouteNodes](RouteNode) and [ObjectVariantData].
//!
//! Node record layout:
//!
//! ```text
//! serial:        u8
//! coord:         u32 lat, u32 lon (fixed point, see GeoCoord::to_fixed)
//! object_count:  varint
//! path_count:    varint
//! exclude_count: varint
//! objects:       (tagged_delta: varint, variant_index: varint) * object_count
//! paths:         (target_delta: zigzag varint, object_index: varint,
//!                 distance_cm: varint, flags: u8) * path_count
//! excludes:      (source: tagged varint, target_index: varint) * exclude_count
//! ```
//!
//! Object offsets are stored as a zigzag delta to the previous object's offset,
//! shifted left by one bit. The low bit is set for areas and clear for ways.
//! Path targets are stored as a zigzag delta to the node's own id.

use super::{
    Exclude, FileOffset, NodeId, ObjectData, ObjectFileRef, ObjectVariantData, Path, RefType,
    RouteNode, DISTANCE_UNITS_PER_KM,
};
use crate::{GeoCoord, TypeId};

/// Error which can occur when decoding binary data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(u64),

    #[error("varint at offset {0} does not fit in 64 bits")]
    VarintOverflow(u64),

    #[error("{what} {value} out of range at offset {offset}")]
    OutOfRange {
        what: &'static str,
        value: u64,
        offset: u64,
    },

    #[error("{what} index {index} out of bounds (len {len}) at offset {offset}")]
    IndexOutOfBounds {
        what: &'static str,
        index: u64,
        len: usize,
        offset: u64,
    },

    #[error("object offset delta leaves the file at offset {0}")]
    OffsetOutOfBounds(u64),
}

/// Cursor over a byte slice taken from a file. Error offsets are reported relative
/// to the start of the file, not the slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over `data`, which starts at byte `base` of the underlying file.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute offset of the next byte to be read.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.data.len() - self.pos < n {
            return Err(DecodeError::UnexpectedEof(self.offset()));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads an unsigned LEB128 varint.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset();
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte > 1 {
                return Err(DecodeError::VarintOverflow(start));
            }
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift > 63 {
                return Err(DecodeError::VarintOverflow(start));
            }
        }
    }

    /// Reads a zigzag-encoded signed varint.
    pub fn read_signed(&mut self) -> Result<i64, DecodeError> {
        Ok(unzigzag(self.read_varint()?))
    }

    /// Reads a varint and checks it is strictly below `len`.
    pub fn read_index(&mut self, what: &'static str, len: usize) -> Result<usize, DecodeError> {
        let offset = self.offset();
        let index = self.read_varint()?;
        if index >= len as u64 {
            return Err(DecodeError::IndexOutOfBounds {
                what,
                index,
                len,
                offset,
            });
        }
        Ok(index as usize)
    }

    /// Reads a varint and checks it does not exceed `max`.
    pub fn read_bounded(&mut self, what: &'static str, max: u64) -> Result<u64, DecodeError> {
        let offset = self.offset();
        let value = self.read_varint()?;
        if value > max {
            return Err(DecodeError::OutOfRange {
                what,
                value,
                offset,
            });
        }
        Ok(value)
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let offset = self.offset();
        let len = self.read_bounded("string length", u32::MAX as u64)? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::OutOfRange {
            what: "utf-8 string",
            value: len as u64,
            offset,
        })
    }

    pub fn read_coord(&mut self) -> Result<GeoCoord, DecodeError> {
        let lat = self.read_u32()?;
        let lon = self.read_u32()?;
        Ok(GeoCoord::from_fixed(lat, lon))
    }
}

/// Growable buffer for encoding.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter(Vec<u8>);

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn write_u8(&mut self, v: u8) {
        self.0.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_varint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.0.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.0.push(v as u8);
    }

    pub fn write_signed(&mut self, v: i64) {
        self.write_varint(zigzag(v));
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_varint(s.len() as u64);
        self.0.extend_from_slice(s.as_bytes());
    }

    pub fn write_coord(&mut self, c: GeoCoord) {
        let (lat, lon) = c.to_fixed();
        self.write_u32(lat);
        self.write_u32(lon);
    }
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Encodes an object reference as `offset << 1 | is_area`.
pub fn encode_object_ref(w: &mut ByteWriter, object: ObjectFileRef) {
    w.write_varint((object.offset.0 << 1) | ref_type_bit(object.kind));
}

pub fn decode_object_ref(r: &mut ByteReader<'_>) -> Result<ObjectFileRef, DecodeError> {
    let value = r.read_varint()?;
    Ok(ObjectFileRef {
        kind: ref_type_from_bit(value),
        offset: FileOffset(value >> 1),
    })
}

fn ref_type_bit(kind: RefType) -> u64 {
    match kind {
        RefType::Way => 0,
        RefType::Area => 1,
    }
}

fn ref_type_from_bit(value: u64) -> RefType {
    if value & 1 == 0 {
        RefType::Way
    } else {
        RefType::Area
    }
}

impl RouteNode {
    /// Appends the binary representation of the node to `w`.
    pub fn write(&self, w: &mut ByteWriter) {
        w.write_u8(self.serial);
        w.write_coord(self.coord);
        w.write_varint(self.objects.len() as u64);
        w.write_varint(self.paths.len() as u64);
        w.write_varint(self.excludes.len() as u64);

        let mut last_offset: i64 = 0;
        for object in &self.objects {
            let offset = object.object.offset.0 as i64;
            let delta = zigzag(offset - last_offset);
            w.write_varint((delta << 1) | ref_type_bit(object.object.kind));
            w.write_varint(object.variant_index as u64);
            last_offset = offset;
        }

        for path in &self.paths {
            w.write_signed(path.target.0 as i64 - self.id.0 as i64);
            w.write_varint(path.object_index as u64);
            w.write_varint((path.distance * DISTANCE_UNITS_PER_KM).round() as u64);
            w.write_u8(path.flags);
        }

        for exclude in &self.excludes {
            encode_object_ref(w, exclude.source);
            w.write_varint(exclude.target_index as u64);
        }
    }

    /// Decodes a node previously encoded with [RouteNode::write].
    /// `variant_count` is the size of the database's variant table.
    pub fn read(r: &mut ByteReader<'_>, variant_count: usize) -> Result<Self, DecodeError> {
        let serial = r.read_u8()?;
        let coord = r.read_coord()?;
        let id = coord.node_id();

        let object_count = r.read_bounded("object count", u16::MAX as u64)? as usize;
        let path_count = r.read_bounded("path count", u16::MAX as u64)? as usize;
        let exclude_count = r.read_bounded("exclude count", u16::MAX as u64)? as usize;

        let mut objects = Vec::with_capacity(object_count);
        let mut last_offset: i64 = 0;
        for _ in 0..object_count {
            let at = r.offset();
            let tagged = r.read_varint()?;
            let offset = last_offset
                .checked_add(unzigzag(tagged >> 1))
                .filter(|&o| o >= 0)
                .ok_or(DecodeError::OffsetOutOfBounds(at))?;
            let variant_index = r.read_index("variant", variant_count)? as u16;
            objects.push(ObjectData {
                object: ObjectFileRef {
                    kind: ref_type_from_bit(tagged),
                    offset: FileOffset(offset as u64),
                },
                variant_index,
            });
            last_offset = offset;
        }

        let mut paths = Vec::with_capacity(path_count);
        for _ in 0..path_count {
            let at = r.offset();
            let target = (id.0 as i64)
                .checked_add(r.read_signed()?)
                .filter(|&t| t >= 0)
                .ok_or(DecodeError::OutOfRange {
                    what: "path target",
                    value: id.0,
                    offset: at,
                })?;
            let object_index = r.read_index("path object", object_count)?;
            let distance = r.read_varint()? as f64 / DISTANCE_UNITS_PER_KM;
            let flags = r.read_u8()?;
            paths.push(Path {
                target: NodeId(target as u64),
                object_index,
                distance,
                flags,
            });
        }

        let mut excludes = Vec::with_capacity(exclude_count);
        for _ in 0..exclude_count {
            let source = decode_object_ref(r)?;
            let target_index = r.read_index("exclude target", path_count)?;
            excludes.push(Exclude {
                source,
                target_index,
            });
        }

        Ok(Self {
            id,
            serial,
            coord,
            objects,
            paths,
            excludes,
        })
    }
}

impl ObjectVariantData {
    pub fn write(&self, w: &mut ByteWriter) {
        w.write_varint(self.type_id.0 as u64);
        w.write_u8(self.max_speed);
        w.write_u8(self.grade);
    }

    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let type_id = TypeId(r.read_bounded("type id", u16::MAX as u64)? as u16);
        let max_speed = r.read_u8()?;
        let grade = r.read_u8()?;
        Ok(Self {
            type_id,
            max_speed,
            grade,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vehicle;

    fn round_trip(node: &RouteNode, variant_count: usize) -> RouteNode {
        let mut w = ByteWriter::new();
        node.write(&mut w);
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes, 0);
        let decoded = RouteNode::read(&mut r, variant_count).unwrap();
        assert!(r.is_empty(), "trailing bytes after node record");

        // Write -> Read -> Write must be stable as well
        let mut w2 = ByteWriter::new();
        decoded.write(&mut w2);
        assert_eq!(w2.as_slice(), bytes.as_slice());

        decoded
    }

    fn sample_node(objects: usize, paths: usize, excludes: usize) -> RouteNode {
        let mut n = RouteNode::new(3, GeoCoord::new(50.0614, 19.9366));
        // Deliberately unsorted offsets, mixing ways and areas
        let offsets = [5000u64, 12, 900_000, 44, 7];
        for i in 0..objects {
            let off = offsets[i % offsets.len()] + (i / offsets.len()) as u64 * 1_000_000;
            let obj = if i % 2 == 0 {
                ObjectFileRef::way(off)
            } else {
                ObjectFileRef::area(off)
            };
            n.add_object(obj, (i % 3) as u16);
        }
        for i in 0..paths {
            let target = GeoCoord::new(50.0614 + (i as f64 - 2.0) * 0.001, 19.9366 - 0.002).node_id();
            n.paths.push(Path::new(
                target,
                i % objects.max(1),
                0.01 * (i + 1) as f64 + 0.0000049,
                Vehicle::Car.usable_bit() | if i % 2 == 1 { Vehicle::Foot.restricted_bit() } else { 0 },
            ));
        }
        for i in 0..excludes {
            n.excludes.push(Exclude {
                source: n.objects[i % objects.max(1)].object,
                target_index: (i + 1) % paths.max(1),
            });
        }
        n
    }

    #[test]
    fn node_round_trip() {
        for (objects, paths, excludes) in [(0, 0, 0), (1, 0, 0), (1, 1, 0), (3, 4, 2), (5, 7, 3), (12, 12, 12)] {
            let node = sample_node(objects, paths, excludes);
            let decoded = round_trip(&node, 3);
            assert_eq!(decoded.objects, node.objects, "objects differ for {objects}/{paths}/{excludes}");
            assert_eq!(decoded.paths, node.paths, "paths differ for {objects}/{paths}/{excludes}");
            assert_eq!(decoded.excludes, node.excludes);
            assert_eq!(decoded, node);
        }
    }

    #[test]
    fn varints() {
        let values = [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX];
        let mut w = ByteWriter::new();
        values.iter().for_each(|&v| w.write_varint(v));
        w.write_signed(-1);
        w.write_signed(i64::MIN);
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes, 0);
        for v in values {
            assert_eq!(r.read_varint().unwrap(), v);
        }
        assert_eq!(r.read_signed().unwrap(), -1);
        assert_eq!(r.read_signed().unwrap(), i64::MIN);
    }

    #[test]
    fn varint_overflow_is_rejected() {
        let bytes = [0xffu8; 11];
        let mut r = ByteReader::new(&bytes, 40);
        assert_eq!(r.read_varint(), Err(DecodeError::VarintOverflow(40)));
    }

    #[test]
    fn truncated_node_is_rejected() {
        let node = sample_node(3, 4, 2);
        let mut w = ByteWriter::new();
        node.write(&mut w);
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes[..bytes.len() - 1], 100);
        assert!(matches!(
            RouteNode::read(&mut r, 3),
            Err(DecodeError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn bad_indices_are_rejected() {
        let node = sample_node(3, 4, 2);
        let mut w = ByteWriter::new();
        node.write(&mut w);
        let bytes = w.into_inner();

        // Variant table smaller than the referenced indices
        let mut r = ByteReader::new(&bytes, 0);
        assert!(matches!(
            RouteNode::read(&mut r, 1),
            Err(DecodeError::IndexOutOfBounds { what: "variant", .. })
        ));
    }
}
