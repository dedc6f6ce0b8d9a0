// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::memory::{self, HEADER_SIZE, MAGIC, VERSION};
use super::{Area, DatabaseError, MemoryDatabase, Way};
use crate::graph::codec::ByteWriter;
use crate::graph::{Exclude, FileOffset, NodeId, ObjectFileRef, ObjectVariantData, RouteGraph};
use crate::{earth_distance, GeoCoord, TypeConfig, Vehicle};

/// Forbids turning from one object onto another at a given node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnRestriction {
    pub from: ObjectFileRef,
    pub via: GeoCoord,
    pub to: ObjectFileRef,
}

/// Assembles the objects of one database, assigns their file offsets
/// and derives the matching [RouteGraph].
///
/// A node becomes a route node if it starts or ends a way,
/// or if it is shared by more than one routable object.
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    types: TypeConfig,
    data: ByteWriter,
    ways: Vec<Way>,
    areas: Vec<Area>,
    restrictions: Vec<TurnRestriction>,
}

/// Routable object prepared for graph building: reference, variant and
/// the list of nodes, without the closing node of rings.
struct GraphObject<'a> {
    object: ObjectFileRef,
    variant: ObjectVariantData,
    nodes: &'a [GeoCoord],
    ring: bool,
    forward: u8,
    backward: u8,
    restricted: u8,
}

impl DatabaseBuilder {
    pub fn new(types: TypeConfig) -> Self {
        Self {
            types,
            data: ByteWriter::new(),
            ways: Vec::new(),
            areas: Vec::new(),
            restrictions: Vec::new(),
        }
    }

    pub fn types(&self) -> &TypeConfig {
        &self.types
    }

    fn next_offset(&self) -> FileOffset {
        FileOffset((HEADER_SIZE + self.data.len()) as u64)
    }

    /// Adds a way, returning a reference to it. Coordinates are
    /// rounded to the stored precision.
    pub fn add_way(&mut self, mut way: Way) -> ObjectFileRef {
        way.offset = self.next_offset();
        way.nodes.iter_mut().for_each(|c| *c = c.quantized());
        memory::write_way(&mut self.data, &way);
        let object = way.object_ref();
        self.ways.push(way);
        object
    }

    /// Adds an area, closing its ring if necessary.
    pub fn add_area(&mut self, mut area: Area) -> ObjectFileRef {
        area.offset = self.next_offset();
        area.ring.iter_mut().for_each(|c| *c = c.quantized());
        if let (Some(&first), Some(&last)) = (area.ring.first(), area.ring.last()) {
            if first.node_id() != last.node_id() {
                area.ring.push(first);
            }
        }
        memory::write_area(&mut self.data, &area);
        let object = area.object_ref();
        self.areas.push(area);
        object
    }

    pub fn add_turn_restriction(&mut self, from: ObjectFileRef, via: GeoCoord, to: ObjectFileRef) {
        self.restrictions.push(TurnRestriction { from, via, to });
    }

    fn graph_objects(&self) -> Vec<GraphObject<'_>> {
        let mut objects = Vec::with_capacity(self.ways.len() + self.areas.len());

        for way in &self.ways {
            let routable = self.types.get(way.type_id).map(|t| t.routable).unwrap_or_default();
            if routable == 0 || way.nodes.len() < 2 {
                continue;
            }
            let ring = way.is_ring();
            objects.push(GraphObject {
                object: way.object_ref(),
                variant: ObjectVariantData {
                    type_id: way.type_id,
                    max_speed: way.max_speed,
                    grade: way.grade,
                },
                nodes: if ring { &way.nodes[..way.nodes.len() - 1] } else { &way.nodes },
                ring,
                forward: routable & way.access.forward,
                backward: routable & way.access.backward,
                restricted: way.restricted,
            });
        }

        for area in &self.areas {
            let routable = self.types.get(area.type_id).map(|t| t.routable).unwrap_or_default();
            if routable == 0 || area.ring.len() < 4 {
                continue;
            }
            objects.push(GraphObject {
                object: area.object_ref(),
                variant: ObjectVariantData {
                    type_id: area.type_id,
                    max_speed: 0,
                    grade: 1,
                },
                nodes: &area.ring[..area.ring.len() - 1],
                ring: true,
                forward: routable & area.access.forward,
                backward: routable & area.access.backward,
                restricted: 0,
            });
        }

        objects
    }

    /// Derives the routing graph of all routable objects added so far.
    pub fn route_graph(&self) -> RouteGraph {
        let objects = self.graph_objects();

        let mut usage: HashMap<NodeId, usize> = HashMap::new();
        for o in &objects {
            let mut ids: Vec<NodeId> = o.nodes.iter().map(|c| c.node_id()).collect();
            ids.sort();
            ids.dedup();
            for id in ids {
                *usage.entry(id).or_default() += 1;
            }
        }

        let mut graph = RouteGraph::new();
        for o in &objects {
            let variant = graph.add_variant(o.variant);
            let last = o.nodes.len() - 1;
            let route_indices: Vec<usize> = (0..o.nodes.len())
                .filter(|&i| {
                    (!o.ring && (i == 0 || i == last))
                        || usage.get(&o.nodes[i].node_id()).copied().unwrap_or_default() > 1
                })
                .collect();

            for &i in &route_indices {
                graph.node_at(o.nodes[i]).add_object(o.object, variant);
            }

            // Collect the paths first, so that if two paths connect the same
            // pair of nodes along a ring, the shorter one is added last and wins.
            let mut paths = Vec::new();
            let pairs: Vec<(usize, usize)> = if o.ring {
                if route_indices.len() < 2 {
                    Vec::new()
                } else {
                    route_indices
                        .iter()
                        .zip(route_indices.iter().cycle().skip(1))
                        .map(|(&a, &b)| (a, b))
                        .collect()
                }
            } else {
                route_indices.windows(2).map(|w| (w[0], w[1])).collect()
            };

            for (a, b) in pairs {
                let distance = segment_length(o.nodes, a, b, o.ring);
                let restricted = restricted_bits(o.restricted);
                if o.forward != 0 {
                    paths.push((o.nodes[a], o.nodes[b], distance, o.forward | restricted));
                }
                if o.backward != 0 {
                    paths.push((o.nodes[b], o.nodes[a], distance, o.backward | restricted));
                }
            }

            paths.sort_by(|x, y| y.2.total_cmp(&x.2));
            for (from, to, distance, flags) in paths {
                graph.add_path(from, to, o.object, variant, Some(distance), flags);
            }
        }

        for r in &self.restrictions {
            let Some(node) = graph.get_node(r.via.node_id()) else {
                log::warn!("turn restriction via {} does not lie on a route node", r.via);
                continue;
            };
            let Some(target_index) = node.paths.iter().position(|p| {
                node.objects.get(p.object_index).map(|o| o.object) == Some(r.to)
            }) else {
                log::warn!("turn restriction via {}: no path along {}", r.via, r.to);
                continue;
            };

            let mut node = node.clone();
            node.excludes.push(Exclude {
                source: r.from,
                target_index,
            });
            graph.set_node(node);
        }

        graph
    }

    /// Writes the objects into an `objects.dat` file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DatabaseError> {
        let path = path.as_ref();
        let types_offset = self.next_offset().0;

        let mut w = ByteWriter::new();
        w.write_u32(MAGIC);
        w.write_u16(VERSION);
        w.write_u16(0);
        w.write_u64(types_offset);
        debug_assert_eq!(w.len(), HEADER_SIZE);

        let mut bytes = w.into_inner();
        bytes.extend_from_slice(self.data.as_slice());

        let mut types = ByteWriter::new();
        memory::write_types(&mut types, &self.types);
        bytes.extend_from_slice(types.as_slice());

        fs::write(path, bytes).map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!(
            "wrote {}: {} ways, {} areas",
            path.display(),
            self.ways.len(),
            self.areas.len()
        );
        Ok(())
    }

    /// Turns the builder into a queryable in-memory database.
    pub fn build(self) -> MemoryDatabase {
        MemoryDatabase::from_objects(self.types, self.ways, self.areas)
    }
}

fn restricted_bits(vehicles: u8) -> u8 {
    Vehicle::ALL
        .iter()
        .filter(|v| vehicles & v.usable_bit() != 0)
        .fold(0, |acc, v| acc | v.restricted_bit())
}

/// Length of the object between node indices `a` and `b`, walking forward
/// and wrapping around for rings.
fn segment_length(nodes: &[GeoCoord], a: usize, b: usize, ring: bool) -> f64 {
    let n = nodes.len();
    let steps = if b > a {
        b - a
    } else if ring {
        n - a + b
    } else {
        0
    };

    (0..steps)
        .map(|k| earth_distance(nodes[(a + k) % n], nodes[(a + k + 1) % n]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Access;

    fn types() -> TypeConfig {
        let mut t = TypeConfig::new();
        t.register("highway_residential", Vehicle::Car.usable_bit() | Vehicle::Foot.usable_bit());
        t.register("building", 0);
        t
    }

    fn c(lat: f64, lon: f64) -> GeoCoord {
        GeoCoord::new(lat, lon)
    }

    #[test]
    fn route_nodes_are_ends_and_junctions() {
        let types = types();
        let road = types.by_name("highway_residential").unwrap().id;
        let building = types.by_name("building").unwrap().id;
        let mut b = DatabaseBuilder::new(types);
        let all = Access::both(Vehicle::Car.usable_bit() | Vehicle::Foot.usable_bit());

        let ew = b.add_way(Way {
            type_id: road,
            nodes: vec![c(0.0, 0.0), c(0.0, 0.001), c(0.0, 0.002), c(0.0, 0.003)],
            access: all,
            ..Way::default()
        });
        let ns = b.add_way(Way {
            type_id: road,
            nodes: vec![c(-0.001, 0.002), c(0.0, 0.002), c(0.001, 0.002)],
            access: Access::oneway(Vehicle::Car.usable_bit()),
            restricted: Vehicle::Car.usable_bit(),
            ..Way::default()
        });
        // Not routable, ignored
        b.add_way(Way {
            type_id: building,
            nodes: vec![c(0.0, 0.001), c(0.001, 0.001)],
            ..Way::default()
        });

        let g = b.route_graph();
        // 2 ends of ew, 2 ends of ns, 1 junction
        assert_eq!(g.len(), 5);
        assert!(g.get_node(c(0.0, 0.001).node_id()).is_none());

        let junction = g.get_node(c(0.0, 0.002).node_id()).unwrap();
        assert_eq!(junction.objects.len(), 2);
        // West and east along ew, north along ns
        assert_eq!(junction.paths.len(), 3);
        let north = junction
            .paths
            .iter()
            .find(|p| p.target == c(0.001, 0.002).node_id())
            .unwrap();
        assert_eq!(junction.objects[north.object_index].object, ns);
        assert!(north.is_usable(Vehicle::Car));
        assert!(north.is_restricted(Vehicle::Car));
        assert!(!north.is_usable(Vehicle::Foot));

        let west = junction.paths.iter().find(|p| p.target == c(0.0, 0.0).node_id()).unwrap();
        assert_eq!(junction.objects[west.object_index].object, ew);
        assert!((west.distance - 0.2224).abs() < 0.001);
    }

    #[test]
    fn turn_restrictions_become_excludes() {
        let types = types();
        let road = types.by_name("highway_residential").unwrap().id;
        let mut b = DatabaseBuilder::new(types);
        let all = Access::both(Vehicle::Car.usable_bit());

        let a = b.add_way(Way {
            type_id: road,
            nodes: vec![c(0.0, 0.0), c(0.0, 0.001)],
            access: all,
            ..Way::default()
        });
        let d = b.add_way(Way {
            type_id: road,
            nodes: vec![c(0.0, 0.001), c(0.001, 0.001)],
            access: all,
            ..Way::default()
        });
        b.add_turn_restriction(a, c(0.0, 0.001), d);
        b.add_turn_restriction(a, c(5.0, 5.0), d);

        let g = b.route_graph();
        let via = g.get_node(c(0.0, 0.001).node_id()).unwrap();
        assert_eq!(via.excludes.len(), 1);
        let to_d = via.paths.iter().position(|p| p.target == c(0.001, 0.001).node_id()).unwrap();
        assert!(via.is_excluded(a, to_d));
        assert!(!via.is_excluded(d, to_d));
    }

    #[test]
    fn ring_paths_wrap_around() {
        let types = types();
        let road = types.by_name("highway_residential").unwrap().id;
        let mut b = DatabaseBuilder::new(types);

        let square = vec![c(0.0, 0.0), c(0.0, 0.001), c(0.001, 0.001), c(0.001, 0.0), c(0.0, 0.0)];
        b.add_way(Way {
            type_id: road,
            nodes: square,
            access: Access::oneway(Vehicle::Car.usable_bit()),
            roundabout: true,
            ..Way::default()
        });
        // Two spurs joining the ring at opposite corners
        for (from, to) in [(c(-0.001, 0.0), c(0.0, 0.0)), (c(0.002, 0.001), c(0.001, 0.001))] {
            b.add_way(Way {
                type_id: road,
                nodes: vec![from, to],
                access: Access::both(Vehicle::Car.usable_bit()),
                ..Way::default()
            });
        }

        let g = b.route_graph();
        let entry = g.get_node(c(0.0, 0.0).node_id()).unwrap();
        let exit = g.get_node(c(0.001, 0.001).node_id()).unwrap();
        let around = |n: &crate::graph::RouteNode, to: GeoCoord| {
            n.paths.iter().find(|p| p.target == to.node_id()).map(|p| p.distance)
        };

        let there = around(entry, c(0.001, 0.001)).unwrap();
        let back = around(exit, c(0.0, 0.0)).unwrap();
        assert!((there - 0.2224).abs() < 0.001);
        assert!((back - 0.2224).abs() < 0.001);
    }
}
