// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::TileKey;
use crate::graph::codec::ByteReader;
use crate::graph::{DecodeError, NodeId, RouteNode};

/// Raw bytes of all node records of one tile, decoded lazily.
///
/// Records are decoded in file order, one at a time, only as far as needed
/// to find a requested node. Every decoded node is memoized, so repeated
/// lookups never touch the raw bytes again.
#[derive(Debug)]
pub(super) struct TilePage {
    pub(super) key: TileKey,
    base: u64,
    data: Vec<u8>,
    count: u32,
    state: Mutex<PageState>,
}

#[derive(Debug, Default)]
struct PageState {
    nodes: HashMap<NodeId, Arc<RouteNode>>,
    cursor: usize,
    decoded: u32,
}

impl TilePage {
    /// Wraps `data`, read from file offset `base`, which holds `count` node records.
    pub(super) fn new(key: TileKey, base: u64, data: Vec<u8>, count: u32) -> Self {
        Self {
            key,
            base,
            data,
            count,
            state: Mutex::new(PageState {
                nodes: HashMap::with_capacity(count as usize),
                ..PageState::default()
            }),
        }
    }

    /// Finds the node with the given id, decoding further records if necessary.
    pub(super) fn find(
        &self,
        id: NodeId,
        variant_count: usize,
    ) -> Result<Option<Arc<RouteNode>>, DecodeError> {
        let mut state = self.state.lock();

        if let Some(node) = state.nodes.get(&id) {
            return Ok(Some(node.clone()));
        }

        while state.decoded < self.count {
            let cursor = state.cursor;
            let mut r = ByteReader::new(&self.data[cursor..], self.base + cursor as u64);
            let node = Arc::new(RouteNode::read(&mut r, variant_count)?);

            state.cursor += r.position();
            state.decoded += 1;
            state.nodes.insert(node.id, node.clone());

            if node.id == id {
                return Ok(Some(node));
            }
        }

        Ok(None)
    }

    /// Number of records decoded so far.
    #[cfg(test)]
    pub(super) fn decoded(&self) -> u32 {
        self.state.lock().decoded
    }
}
