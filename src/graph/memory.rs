// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::btree_map::{BTreeMap, Entry};

use super::{NodeId, ObjectFileRef, ObjectVariantData, Path, RouteNode, VariantTable};
use crate::{earth_distance, GeoCoord};

/// Represents a routing network held completely in memory, as a set of
/// [RouteNodes](RouteNode) and the variants referenced by their objects.
///
/// This is the form in which graphs are assembled before being written
/// into a [tiled store](crate::store::write_store).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RouteGraph {
    nodes: BTreeMap<NodeId, RouteNode>,
    variants: Vec<ObjectVariantData>,
}

impl RouteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns an iterator over all [RouteNodes](RouteNode) in the graph, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &RouteNode> {
        self.nodes.values()
    }

    /// Retrieves a [RouteNode] with the provided id.
    pub fn get_node(&self, id: NodeId) -> Option<&RouteNode> {
        self.nodes.get(&id)
    }

    /// Returns the node at `coord`, creating an unconnected one if it does not exist yet.
    pub fn node_at(&mut self, coord: GeoCoord) -> &mut RouteNode {
        let node = RouteNode::new(0, coord);
        self.nodes.entry(node.id).or_insert(node)
    }

    /// Creates or replaces a [RouteNode] with `node.id`.
    pub fn set_node(&mut self, node: RouteNode) {
        match self.nodes.entry(node.id) {
            Entry::Vacant(e) => {
                e.insert(node);
            }
            Entry::Occupied(mut e) => {
                *e.get_mut() = node;
            }
        }
    }

    /// Returns the variant index for `v`, adding it to the graph if needed.
    pub fn add_variant(&mut self, v: ObjectVariantData) -> u16 {
        if let Some(idx) = self.variants.iter().position(|&x| x == v) {
            return idx as u16;
        }
        self.variants.push(v);
        (self.variants.len() - 1) as u16
    }

    pub fn variants(&self) -> &[ObjectVariantData] {
        &self.variants
    }

    /// Adds a path from the node at `from` to the node at `to` along `object`.
    /// Both nodes are created when missing. If `distance` is not given,
    /// the great-circle distance between the nodes is used.
    pub fn add_path(
        &mut self,
        from: GeoCoord,
        to: GeoCoord,
        object: ObjectFileRef,
        variant_index: u16,
        distance: Option<f64>,
        flags: u8,
    ) -> usize {
        let to_id = self.node_at(to).id;
        let from_node = self.node_at(from);
        let distance = distance.unwrap_or_else(|| earth_distance(from_node.coord, to_id.coord()));
        let object_index = from_node.add_object(object, variant_index);

        if let Some(idx) = from_node
            .paths
            .iter()
            .position(|p| p.target == to_id && p.object_index == object_index)
        {
            from_node.paths[idx] = Path::new(to_id, object_index, distance, flags);
            idx
        } else {
            from_node
                .paths
                .push(Path::new(to_id, object_index, distance, flags));
            from_node.paths.len() - 1
        }
    }

    /// Sorts and deduplicates the variant table, remapping variant indices of all nodes
    /// so that the table can be binary searched.
    pub fn into_sorted(mut self) -> (Vec<RouteNode>, VariantTable) {
        let table = VariantTable::from_unsorted(self.variants.clone());
        let remap: Vec<u16> = self
            .variants
            .iter()
            .map(|v| table.position(v).unwrap_or_default() as u16)
            .collect();

        for node in self.nodes.values_mut() {
            for object in node.objects.iter_mut() {
                if let Some(&new_index) = remap.get(object.variant_index as usize) {
                    object.variant_index = new_index;
                }
            }
        }

        (self.nodes.into_values().collect(), table)
    }
}
