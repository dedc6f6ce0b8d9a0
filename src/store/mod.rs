// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Tiled, lazily decoded storage of [RouteNodes](RouteNode).
//!
//! File layout (little-endian):
//!
//! ```text
//! header (20 bytes):
//!   magic:         u32 = 0x52544e44  // "RTND"
//!   version:       u16 = 1
//!   tile_magnitude u8
//!   reserved:      u8
//!   node_count:    u32
//!   index_offset:  u64
//! variants:
//!   count:         u32
//!   entries:       ObjectVariantData * count
//! node records, grouped contiguously per tile
//! index (at index_offset):
//!   entry_count:   u32
//!   entries:       (tile_x: u32, tile_y: u32, file_offset: u64, node_count: u32) * entry_count
//! ```

mod cache;
mod page;
mod writer;

pub use cache::LruCache;
pub use writer::write_store;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::codec::ByteReader;
use crate::graph::{DecodeError, NodeId, ObjectVariantData, RouteNode, VariantTable};
use crate::{GeoBox, GeoCoord};
use page::TilePage;

pub(crate) const MAGIC: u32 = 0x5254_4e44;
pub(crate) const VERSION: u16 = 1;
pub(crate) const HEADER_SIZE: usize = 20;
pub(crate) const MAX_MAGNITUDE: u8 = 24;
const INDEX_ENTRY_SIZE: u64 = 20;

/// Variant indices of route node objects are stored as `u16`.
const MAX_VARIANTS: u32 = u16::MAX as u32 + 1;

/// Default number of tile pages kept in memory by a [RouteNodeStore].
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Error which can occur when opening or reading a [RouteNodeStore].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{}: io: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: not a route node file (magic {found:#010x})", path.display())]
    BadMagic { path: PathBuf, found: u32 },

    #[error("{}: unsupported version {version} (expected {VERSION})", path.display())]
    UnsupportedVersion { path: PathBuf, version: u16 },

    #[error("{}: invalid tile magnitude {magnitude} (max {MAX_MAGNITUDE})", path.display())]
    InvalidMagnitude { path: PathBuf, magnitude: u8 },

    #[error("{}: corrupt index: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("{}: corrupt data: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

/// Grid cell bucketing route nodes on disk.
///
/// A magnitude of `m` splits the world into `2^m × 2^m` equally sized cells
/// (in degrees).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn for_coord(c: GeoCoord, magnitude: u8) -> Self {
        let cells = 1u64 << magnitude;
        let max = (cells - 1) as f64;
        let x = ((c.lon + 180.0) / 360.0 * cells as f64).floor().clamp(0.0, max);
        let y = ((c.lat + 90.0) / 180.0 * cells as f64).floor().clamp(0.0, max);
        Self {
            x: x as u32,
            y: y as u32,
        }
    }

    /// Geographic extent of the tile.
    pub fn bounding_box(&self, magnitude: u8) -> GeoBox {
        let cells = (1u64 << magnitude) as f64;
        let width = 360.0 / cells;
        let height = 180.0 / cells;
        GeoBox {
            min: GeoCoord::new(self.y as f64 * height - 90.0, self.x as f64 * width - 180.0),
            max: GeoCoord::new(
                (self.y + 1) as f64 * height - 90.0,
                (self.x + 1) as f64 * width - 180.0,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TileEntry {
    offset: u64,
    len: u64,
    count: u32,
}

/// Route node file opened for lookups by [NodeId].
///
/// Only the header, the variant table and the tile index are read on open.
/// Node records are loaded tile by tile into an [LruCache] of pages, and each
/// page decodes its records lazily. The cache index and every page have their
/// own locks, so different pages may be loaded and decoded in parallel.
#[derive(Debug)]
pub struct RouteNodeStore {
    path: PathBuf,
    file: Mutex<File>,
    magnitude: u8,
    node_count: u32,
    variants: VariantTable,
    index: HashMap<TileKey, TileEntry>,
    bounding_box: GeoBox,
    cache: Mutex<LruCache<TileKey, Arc<TilePage>>>,
    page_loads: AtomicUsize,
}

impl RouteNodeStore {
    /// Opens a store file, validating its header and index.
    /// `cache_size` is the maximum number of tile pages kept in memory.
    pub fn open<P: AsRef<Path>>(path: P, cache_size: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let result = Self::open_impl(&path, cache_size);
        if let Err(e) = &result {
            log::error!("failed to open route node store: {e}");
        }
        result
    }

    fn open_impl(path: &Path, cache_size: usize) -> Result<Self, StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let corrupt = |source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        };
        let corrupt_index = |reason: String| StoreError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();

        // Header
        let header = read_range(&mut file, 0, HEADER_SIZE as u64).map_err(io_err)?;
        let mut r = ByteReader::new(&header, 0);
        let magic = r.read_u32().map_err(corrupt)?;
        if magic != MAGIC {
            return Err(StoreError::BadMagic {
                path: path.to_path_buf(),
                found: magic,
            });
        }
        let version = r.read_u16().map_err(corrupt)?;
        if version != VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: path.to_path_buf(),
                version,
            });
        }
        let magnitude = r.read_u8().map_err(corrupt)?;
        if magnitude > MAX_MAGNITUDE {
            return Err(StoreError::InvalidMagnitude {
                path: path.to_path_buf(),
                magnitude,
            });
        }
        r.read_u8().map_err(corrupt)?;
        let node_count = r.read_u32().map_err(corrupt)?;
        let index_offset = r.read_u64().map_err(corrupt)?;

        if index_offset < HEADER_SIZE as u64 || index_offset > file_len {
            return Err(corrupt_index(format!(
                "index offset {index_offset} outside of file (len {file_len})"
            )));
        }

        // Variant table
        let data = read_range(&mut file, HEADER_SIZE as u64, index_offset - HEADER_SIZE as u64)
            .map_err(io_err)?;
        let mut r = ByteReader::new(&data, HEADER_SIZE as u64);
        let variant_count = r.read_u32().map_err(corrupt)?;
        if variant_count > MAX_VARIANTS {
            return Err(corrupt_index(format!(
                "{variant_count} variants exceed the maximum of {MAX_VARIANTS}"
            )));
        }
        let mut variants = Vec::with_capacity(variant_count as usize);
        for _ in 0..variant_count {
            variants.push(ObjectVariantData::read(&mut r).map_err(corrupt)?);
        }
        if !variants.windows(2).all(|w| w[0] < w[1]) {
            return Err(corrupt_index("variant table is not sorted and unique".to_string()));
        }
        let variants = VariantTable::from_unsorted(variants);
        let data_start = r.offset();

        // Tile index
        let index_bytes =
            read_range(&mut file, index_offset, file_len - index_offset).map_err(io_err)?;
        let mut r = ByteReader::new(&index_bytes, index_offset);
        let entry_count = r.read_u32().map_err(corrupt)?;
        if entry_count as u64 * INDEX_ENTRY_SIZE > file_len - index_offset {
            return Err(corrupt_index(format!("{entry_count} entries do not fit in file")));
        }

        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let key = TileKey {
                x: r.read_u32().map_err(corrupt)?,
                y: r.read_u32().map_err(corrupt)?,
            };
            let offset = r.read_u64().map_err(corrupt)?;
            let count = r.read_u32().map_err(corrupt)?;
            entries.push((key, offset, count));
        }

        entries.sort_by_key(|&(_, offset, _)| offset);

        let mut index = HashMap::with_capacity(entries.len());
        let mut bounding_box = GeoBox::invalid();
        let mut total: u64 = 0;
        for (i, &(key, offset, count)) in entries.iter().enumerate() {
            let end = entries
                .get(i + 1)
                .map(|&(_, next, _)| next)
                .unwrap_or(index_offset);
            if offset < data_start || offset > end {
                return Err(corrupt_index(format!(
                    "tile {},{} at offset {offset} outside of node data",
                    key.x, key.y
                )));
            }

            let bbox = key.bounding_box(magnitude);
            bounding_box.include(bbox.min);
            bounding_box.include(bbox.max);
            total += count as u64;

            let entry = TileEntry {
                offset,
                len: end - offset,
                count,
            };
            if index.insert(key, entry).is_some() {
                return Err(corrupt_index(format!("duplicate tile {},{}", key.x, key.y)));
            }
        }

        if total != node_count as u64 {
            return Err(corrupt_index(format!(
                "index covers {total} nodes, header declares {node_count}"
            )));
        }

        log::info!(
            "opened {}: {} nodes in {} tiles, magnitude {}",
            path.display(),
            node_count,
            index.len(),
            magnitude
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            magnitude,
            node_count,
            variants,
            index,
            bounding_box,
            cache: Mutex::new(LruCache::new(cache_size)),
            page_loads: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn magnitude(&self) -> u8 {
        self.magnitude
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn variants(&self) -> &VariantTable {
        &self.variants
    }

    /// Union of the extents of all tiles present in the store.
    pub fn bounding_box(&self) -> GeoBox {
        self.bounding_box
    }

    /// Checks if the store has any nodes in the given tile, without reading node data.
    pub fn is_tile_covered(&self, tile: TileKey) -> bool {
        self.index.contains_key(&tile)
    }

    /// Checks if the tile covering `coord` has any nodes, without reading node data.
    pub fn is_covered(&self, coord: GeoCoord) -> bool {
        self.is_tile_covered(TileKey::for_coord(coord, self.magnitude))
    }

    /// Number of tile pages read from the file so far.
    pub fn page_loads(&self) -> usize {
        self.page_loads.load(Ordering::Relaxed)
    }

    /// Retrieves the [RouteNode] with the given id.
    ///
    /// Returns `Ok(None)` if the store has no such node. Any read or decode
    /// error is returned as a [StoreError], as it implies file corruption.
    pub fn get(&self, id: NodeId) -> Result<Option<Arc<RouteNode>>, StoreError> {
        let key = TileKey::for_coord(id.coord(), self.magnitude);
        let Some(&entry) = self.index.get(&key) else {
            return Ok(None);
        };

        let page = self.page(key, entry)?;
        page.find(id, self.variants.len())
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Checks whether a node with the given id exists in the store.
    pub fn contains(&self, id: NodeId) -> Result<bool, StoreError> {
        Ok(self.get(id)?.is_some())
    }

    fn page(&self, key: TileKey, entry: TileEntry) -> Result<Arc<TilePage>, StoreError> {
        if let Some(page) = self.cache.lock().get(&key) {
            return Ok(page.clone());
        }

        let data = read_range(&mut self.file.lock(), entry.offset, entry.len).map_err(|source| {
            StoreError::Io {
                path: self.path.clone(),
                source,
            }
        })?;
        self.page_loads.fetch_add(1, Ordering::Relaxed);
        let loaded = Arc::new(TilePage::new(key, entry.offset, data, entry.count));

        let mut cache = self.cache.lock();
        // Another reader might have loaded the same page in the meantime
        if let Some(page) = cache.get(&key) {
            return Ok(page.clone());
        }
        if let Some((evicted, _)) = cache.insert(key, loaded.clone()) {
            log::debug!(
                "{}: evicted tile {},{} for {},{}",
                self.path.display(),
                evicted.x,
                evicted.y,
                loaded.key.x,
                loaded.key.y
            );
        }
        Ok(loaded)
    }
}

fn read_range(file: &mut File, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Exclude, ObjectFileRef, RouteGraph};
    use crate::{TypeId, Vehicle};

    fn sample_graph() -> (RouteGraph, Vec<GeoCoord>) {
        let mut g = RouteGraph::new();
        let v = g.add_variant(ObjectVariantData {
            type_id: TypeId(2),
            max_speed: 50,
            grade: 1,
        });
        let w = g.add_variant(ObjectVariantData {
            type_id: TypeId(1),
            max_speed: 0,
            grade: 1,
        });
        // Two clusters, far enough apart to land in different tiles
        let coords = vec![
            GeoCoord::new(10.0, 10.0),
            GeoCoord::new(10.0, 10.01),
            GeoCoord::new(10.01, 10.01),
            GeoCoord::new(40.0, 40.0),
            GeoCoord::new(40.0, 40.01),
        ];
        let car = Vehicle::Car.usable_bit();
        g.add_path(coords[0], coords[1], ObjectFileRef::way(10), v, None, car);
        g.add_path(coords[1], coords[0], ObjectFileRef::way(10), v, None, car);
        g.add_path(coords[1], coords[2], ObjectFileRef::way(20), w, None, car);
        g.add_path(coords[2], coords[1], ObjectFileRef::way(20), w, None, car);
        g.add_path(coords[3], coords[4], ObjectFileRef::area(30), w, None, car);
        g.add_path(coords[4], coords[3], ObjectFileRef::area(30), w, None, car);

        let mut n = g.get_node(coords[1].node_id()).unwrap().clone();
        n.excludes.push(Exclude {
            source: ObjectFileRef::way(10),
            target_index: 1,
        });
        g.set_node(n);

        (g, coords)
    }

    fn write_sample(dir: &Path, magnitude: u8) -> (PathBuf, RouteGraph, Vec<GeoCoord>) {
        let (g, coords) = sample_graph();
        let path = dir.join("router.dat");
        write_store(&path, g.clone(), magnitude).unwrap();
        (path, g, coords)
    }

    #[test]
    fn get_returns_written_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let (path, g, coords) = write_sample(dir.path(), 8);
        let store = RouteNodeStore::open(&path, 10).unwrap();

        assert_eq!(store.node_count(), 5);
        assert_eq!(store.variants().len(), 2);

        let (sorted, table) = g.into_sorted();
        for expected in &sorted {
            let node = store.get(expected.id).unwrap().expect("node must exist");
            assert_eq!(node.as_ref(), expected);
        }
        assert_eq!(store.variants(), &table);

        // Unknown node in a covered tile and in an uncovered tile
        assert!(store.get(GeoCoord::new(10.005, 10.005).node_id()).unwrap().is_none());
        assert!(store.get(GeoCoord::new(-30.0, 100.0).node_id()).unwrap().is_none());
        assert!(store.contains(coords[2].node_id()).unwrap());
    }

    #[test]
    fn coverage_does_not_load_pages() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, coords) = write_sample(dir.path(), 8);
        let store = RouteNodeStore::open(&path, 10).unwrap();

        assert!(store.is_covered(coords[0]));
        assert!(store.is_covered(coords[4]));
        assert!(!store.is_covered(GeoCoord::new(-30.0, 100.0)));
        assert!(store.is_tile_covered(TileKey::for_coord(coords[3], 8)));
        assert_eq!(store.page_loads(), 0);
        assert!(store.bounding_box().contains(coords[0]));
        assert!(store.bounding_box().contains(coords[4]));
    }

    #[test]
    fn page_decodes_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, coords) = write_sample(dir.path(), 8);
        let store = RouteNodeStore::open(&path, 10).unwrap();

        let key = TileKey::for_coord(coords[0], 8);
        let first = store.get(coords[0].node_id()).unwrap().unwrap();
        let page = store.cache.lock().get(&key).unwrap().clone();
        // Nodes are written in id order, the first one of the tile needs a single record
        let decoded_before = page.decoded();
        assert_eq!(decoded_before, 1);

        // Repeated lookups are served from the page memo
        let again = store.get(coords[0].node_id()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(page.decoded(), decoded_before);
        assert_eq!(store.page_loads(), 1);
    }

    #[test]
    fn cache_eviction_returns_identical_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, coords) = write_sample(dir.path(), 8);
        let store = RouteNodeStore::open(&path, 1).unwrap();

        let a_id = coords[1].node_id();
        let b_id = coords[3].node_id();
        assert_ne!(
            TileKey::for_coord(coords[1], 8),
            TileKey::for_coord(coords[3], 8)
        );

        let a_first = store.get(a_id).unwrap().unwrap();
        let b_first = store.get(b_id).unwrap().unwrap();
        for _ in 0..3 {
            let a = store.get(a_id).unwrap().unwrap();
            let b = store.get(b_id).unwrap().unwrap();
            assert_eq!(a.as_ref(), a_first.as_ref());
            assert_eq!(b.as_ref(), b_first.as_ref());
        }

        // Every alternating query had to reload the page
        assert_eq!(store.page_loads(), 8);
    }

    #[test]
    fn concurrent_readers_share_the_cache() {
        // Six tiles along a parallel, three nodes in each
        let mut g = RouteGraph::new();
        let v = g.add_variant(ObjectVariantData {
            type_id: TypeId(1),
            max_speed: 0,
            grade: 1,
        });
        let car = Vehicle::Car.usable_bit();
        for tile in 0..6u64 {
            let lon = 10.0 + tile as f64 * 5.0;
            let coords = [GeoCoord::new(1.0, lon), GeoCoord::new(1.0, lon + 0.01), GeoCoord::new(1.01, lon)];
            for w in coords.windows(2) {
                g.add_path(w[0], w[1], ObjectFileRef::way(tile * 100), v, None, car);
                g.add_path(w[1], w[0], ObjectFileRef::way(tile * 100), v, None, car);
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.dat");
        write_store(&path, g.clone(), 8).unwrap();
        let (expected, _) = g.into_sorted();

        let store = RouteNodeStore::open(&path, 2).unwrap();
        assert_eq!(store.index.len(), 6);
        let (readers, rounds) = (4, 20);

        std::thread::scope(|s| {
            for reader in 0..readers {
                let (store, expected) = (&store, &expected);
                s.spawn(move || {
                    for round in 0..rounds {
                        // Readers start at different nodes, so they hit both distinct and shared tiles
                        for k in 0..expected.len() {
                            let node = &expected[(k + reader * 5 + round) % expected.len()];
                            let got = store.get(node.id).unwrap().expect("node must exist");
                            assert_eq!(got.as_ref(), node);
                        }
                    }
                });
            }
        });

        let loads = store.page_loads();
        assert!(loads >= 6, "only {loads} page loads");
        assert!(loads <= readers * rounds * expected.len(), "{loads} page loads");

        // The cache is still consistent after the concurrent use
        let before = store.page_loads();
        let first = store.get(expected[0].id).unwrap().unwrap();
        assert!(store.page_loads() - before <= 1);
        let after = store.page_loads();
        let again = store.get(expected[0].id).unwrap().unwrap();
        assert_eq!(store.page_loads(), after);
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn open_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, _) = write_sample(dir.path(), 8);
        let bytes = std::fs::read(&path).unwrap();

        let bad_magic = dir.path().join("bad_magic.dat");
        let mut b = bytes.clone();
        b[0] ^= 0xff;
        std::fs::write(&bad_magic, b).unwrap();
        assert!(matches!(
            RouteNodeStore::open(&bad_magic, 1),
            Err(StoreError::BadMagic { .. })
        ));

        let truncated = dir.path().join("truncated.dat");
        std::fs::write(&truncated, &bytes[..bytes.len() - 3]).unwrap();
        assert!(RouteNodeStore::open(&truncated, 1).is_err());

        let too_many_variants = dir.path().join("too_many_variants.dat");
        let mut b = bytes.clone();
        b[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&(MAX_VARIANTS + 1).to_le_bytes());
        std::fs::write(&too_many_variants, b).unwrap();
        assert!(matches!(
            RouteNodeStore::open(&too_many_variants, 1),
            Err(StoreError::CorruptIndex { .. })
        ));

        let missing = dir.path().join("missing.dat");
        assert!(matches!(
            RouteNodeStore::open(&missing, 1),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn corrupt_node_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, coords) = write_sample(dir.path(), 8);
        let store = RouteNodeStore::open(&path, 10).unwrap();
        let key = TileKey::for_coord(coords[3], 8);
        let entry = *store.index.get(&key).unwrap();
        drop(store);

        // Overwrite the object count of the first record in the tile with an overlong varint
        let mut bytes = std::fs::read(&path).unwrap();
        let object_count_at = entry.offset as usize + 9;
        for b in bytes[object_count_at..object_count_at + 3].iter_mut() {
            *b = 0xff;
        }
        std::fs::write(&path, bytes).unwrap();

        let store = RouteNodeStore::open(&path, 10).unwrap();
        assert!(matches!(
            store.get(coords[3].node_id()),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
