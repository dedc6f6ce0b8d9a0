// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{StoreError, TileKey, HEADER_SIZE, MAGIC, MAX_MAGNITUDE, VERSION};
use crate::graph::codec::ByteWriter;
use crate::graph::{RouteGraph, RouteNode};

/// Writes all nodes of `graph` into a tiled store file at `path`.
///
/// Nodes are grouped by the tile (of the given magnitude) covering their
/// coordinate, tiles are written in key order and the index is appended at the end.
pub fn write_store<P: AsRef<Path>>(
    path: P,
    graph: RouteGraph,
    magnitude: u8,
) -> Result<(), StoreError> {
    let path = path.as_ref();
    if magnitude > MAX_MAGNITUDE {
        return Err(StoreError::InvalidMagnitude {
            path: path.to_path_buf(),
            magnitude,
        });
    }

    let (nodes, variants) = graph.into_sorted();
    let node_count = nodes.len();

    let mut tiles: BTreeMap<TileKey, Vec<RouteNode>> = BTreeMap::new();
    for node in nodes {
        tiles
            .entry(TileKey::for_coord(node.coord, magnitude))
            .or_default()
            .push(node);
    }

    let mut body = ByteWriter::new();
    let data_start = HEADER_SIZE as u64;

    body.write_u32(variants.len() as u32);
    for v in variants.as_slice() {
        v.write(&mut body);
    }

    let mut index = Vec::with_capacity(tiles.len());
    for (key, nodes) in &tiles {
        let offset = data_start + body.len() as u64;
        for node in nodes {
            node.write(&mut body);
        }
        index.push((*key, offset, nodes.len() as u32));
    }

    let index_offset = data_start + body.len() as u64;
    body.write_u32(index.len() as u32);
    for (key, offset, count) in index {
        body.write_u32(key.x);
        body.write_u32(key.y);
        body.write_u64(offset);
        body.write_u32(count);
    }

    let mut file = ByteWriter::new();
    file.write_u32(MAGIC);
    file.write_u16(VERSION);
    file.write_u8(magnitude);
    file.write_u8(0);
    file.write_u32(node_count as u32);
    file.write_u64(index_offset);
    debug_assert_eq!(file.len(), HEADER_SIZE);

    let mut bytes = file.into_inner();
    bytes.extend_from_slice(body.as_slice());

    fs::write(path, bytes).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!(
        "wrote {}: {} nodes in {} tiles, magnitude {}",
        path.display(),
        node_count,
        tiles.len(),
        magnitude
    );
    Ok(())
}
