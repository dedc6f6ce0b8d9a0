// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::MultiDbRouter;
use crate::database::RoutableObject;
use crate::graph::{NodeId, ObjectFileRef};
use crate::route::{DatabaseId, DbNodeId, RawPathEntry, RouteData, RouteEntry, RoutePosition};
use crate::search::{RoutingError, SearchStart, SearchTarget};
use crate::GeoCoord;

/// A [RoutePosition] with its object loaded.
#[derive(Debug, Clone)]
pub(super) struct Anchor {
    pub position: RoutePosition,
    pub object: RoutableObject,
    pub coord: GeoCoord,
    pub node_id: NodeId,
}

/// Node indices walked along one object, with the costs of the walk.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Walk {
    pub indices: Vec<usize>,
    pub costs: f64,
}

impl MultiDbRouter {
    pub(super) fn anchor(&self, position: RoutePosition) -> Result<Anchor, RoutingError> {
        let h = self.handle(position.database)?;
        let object = h.objects.object(position.object)?;
        let Some(coord) = object.coord(position.node_index) else {
            return Err(RoutingError::InvalidPosition(format!(
                "{} has no node {}",
                position.object, position.node_index
            )));
        };
        if !h.profile.can_use_object(&object) {
            return Err(RoutingError::InvalidPosition(format!(
                "{} is not routable for {}",
                position.object,
                h.profile.vehicle()
            )));
        }

        Ok(Anchor {
            position,
            object,
            coord,
            node_id: coord.node_id(),
        })
    }

    /// Walks from `from` along `object` until reaching a route node of `database`.
    fn walk_to_route_node(
        &self,
        database: DatabaseId,
        object: &RoutableObject,
        from: usize,
        forward: bool,
    ) -> Result<Option<Vec<usize>>, RoutingError> {
        let store = &self.handle(database)?.store;
        let mut at = from;
        let mut visited = vec![at];

        for _ in 0..object.node_count() {
            let Some(next) = object.next_index(at, forward) else {
                return Ok(None);
            };
            at = next;
            visited.push(at);
            let Some(id) = object.node_id(at) else {
                return Ok(None);
            };
            if store.contains(id)? {
                return Ok(Some(visited));
            }
        }
        Ok(None)
    }

    /// Route nodes the search may start from: the anchor itself if it is a route
    /// node, otherwise the closest route nodes along its object.
    pub(super) fn search_starts(&self, a: &Anchor) -> Result<Vec<SearchStart>, RoutingError> {
        let database = a.position.database;
        let h = self.handle(database)?;
        if h.store.contains(a.node_id)? {
            return Ok(vec![SearchStart {
                node: DbNodeId::new(database, a.node_id),
                via: None,
                costs: 0.0,
            }]);
        }

        let mut starts = Vec::new();
        for forward in [true, false] {
            let allowed = if forward {
                h.profile.can_use_forward(&a.object)
            } else {
                h.profile.can_use_backward(&a.object)
            };
            if !allowed {
                continue;
            }
            let Some(indices) = self.walk_to_route_node(database, &a.object, a.position.node_index, forward)? else {
                continue;
            };
            if let Some(node) = indices.last().and_then(|&i| a.object.node_id(i)) {
                starts.push(SearchStart {
                    node: DbNodeId::new(database, node),
                    via: Some(a.position.object),
                    costs: h.profile.object_costs(&a.object, a.object.walk_length(&indices)),
                });
            }
        }
        Ok(starts)
    }

    /// Route nodes the search may end at, with the costs of continuing to the anchor.
    pub(super) fn search_targets(&self, a: &Anchor) -> Result<Vec<SearchTarget>, RoutingError> {
        let database = a.position.database;
        let h = self.handle(database)?;
        if h.store.contains(a.node_id)? {
            return Ok(vec![SearchTarget {
                node: DbNodeId::new(database, a.node_id),
                extra_costs: 0.0,
            }]);
        }

        let mut targets = Vec::new();
        for forward in [true, false] {
            let allowed = if forward {
                h.profile.can_use_forward(&a.object)
            } else {
                h.profile.can_use_backward(&a.object)
            };
            if !allowed {
                continue;
            }
            // Arriving forward means coming from a route node behind the target
            let Some(indices) = self.walk_to_route_node(database, &a.object, a.position.node_index, !forward)? else {
                continue;
            };
            if let Some(node) = indices.last().and_then(|&i| a.object.node_id(i)) {
                targets.push(SearchTarget {
                    node: DbNodeId::new(database, node),
                    extra_costs: h.profile.object_costs(&a.object, a.object.walk_length(&indices)),
                });
            }
        }
        Ok(targets)
    }

    /// Walk from start to target without leaving their common object, if there is one.
    pub(super) fn direct_walk(&self, start: &Anchor, target: &Anchor) -> Result<Option<Walk>, RoutingError> {
        if start.position.database != target.position.database || start.position.object != target.position.object {
            return Ok(None);
        }
        if start.node_id == target.node_id {
            return Ok(Some(Walk {
                indices: vec![start.position.node_index],
                costs: 0.0,
            }));
        }

        let profile = self.handle(start.position.database)?.profile.as_ref();
        let walk = start.object.walk(
            start.position.node_index,
            target.node_id,
            profile.can_use_forward(&start.object),
            profile.can_use_backward(&start.object),
        );
        Ok(walk.map(|indices| Walk {
            costs: profile.object_costs(&start.object, start.object.walk_length(&indices)),
            indices,
        }))
    }

    /// Expands a raw search path into entries for every way node passed,
    /// from the start position to the target position.
    pub(super) fn route_data(
        &self,
        start: &Anchor,
        target: &Anchor,
        path: &[RawPathEntry],
    ) -> Result<RouteData, RoutingError> {
        let mut data = RouteData::new();

        match (path.first(), path.last()) {
            (Some(first), Some(last)) => {
                if first.node.node != start.node_id {
                    let indices = self.walk_anchor(start, start.position.node_index, first.node.node)?;
                    push_walk(&mut data, start.position.database, start.position.object, &start.object, &indices);
                }

                for pair in path.windows(2) {
                    let (current, next) = (pair[0], pair[1]);
                    // Switching to a twin in another database
                    if current.node.node == next.node.node {
                        continue;
                    }
                    let Some(via) = next.via else {
                        return Err(RoutingError::UnresolvablePath(format!("no object leads to {}", next.node)));
                    };
                    let database = current.node.database;
                    let h = self.handle(database)?;
                    let object = h.objects.object(via)?;
                    let length = self.path_length(&current, via)?.unwrap_or(0.0);
                    let indices = object
                        .node_index(current.node.node)
                        .and_then(|from| {
                            object.walk_closest(
                                from,
                                next.node.node,
                                h.profile.can_use_forward(&object),
                                h.profile.can_use_backward(&object),
                                length,
                            )
                        })
                        .ok_or_else(|| {
                            RoutingError::UnresolvablePath(format!(
                                "{via} does not lead from {} to {}",
                                current.node, next.node
                            ))
                        })?;
                    push_walk(&mut data, database, via, &object, &indices);
                }

                if last.node.node != target.node_id {
                    let from = target.object.node_index(last.node.node).ok_or_else(|| {
                        RoutingError::UnresolvablePath(format!(
                            "{} does not pass through {}",
                            target.position.object, last.node
                        ))
                    })?;
                    let indices = self.walk_anchor(target, from, target.node_id)?;
                    push_walk(&mut data, target.position.database, target.position.object, &target.object, &indices);
                }
            }
            _ => {
                let walk = self
                    .direct_walk(start, target)?
                    .ok_or_else(|| RoutingError::UnresolvablePath("no direct connection".to_string()))?;
                push_walk(&mut data, start.position.database, start.position.object, &start.object, &walk.indices);
            }
        }

        data.push(RouteEntry {
            database: target.position.database,
            node_id: target.node_id,
            current_node_index: target.position.node_index,
            objects: Vec::new(),
            path_object: None,
            target_node_index: target.position.node_index,
        });
        Ok(data)
    }

    /// Length of the path the search took out of `entry`, if it follows `via`.
    fn path_length(&self, entry: &RawPathEntry, via: ObjectFileRef) -> Result<Option<f64>, RoutingError> {
        let Some(index) = entry.path_index else {
            return Ok(None);
        };
        let Some(node) = self.handle(entry.node.database)?.store.get(entry.node.node)? else {
            return Ok(None);
        };
        Ok(node
            .paths
            .get(index)
            .filter(|_| node.path_object(index) == Some(via))
            .map(|p| p.distance))
    }

    fn walk_anchor(&self, a: &Anchor, from: usize, to: NodeId) -> Result<Vec<usize>, RoutingError> {
        let profile = self.handle(a.position.database)?.profile.as_ref();
        a.object
            .walk(from, to, profile.can_use_forward(&a.object), profile.can_use_backward(&a.object))
            .ok_or_else(|| {
                RoutingError::UnresolvablePath(format!("{} does not lead to {to}", a.position.object))
            })
    }

    /// Fills [RouteEntry::objects] with every object meeting at the entry's node,
    /// as seen by the entry's database. Nodes which are not route nodes only
    /// get the objects leading in and out of them.
    pub fn resolve_route_data_junctions(&self, data: &mut RouteData) -> Result<(), RoutingError> {
        let mut previous: Option<ObjectFileRef> = None;
        for entry in data.entries.iter_mut() {
            let node = self.handle(entry.database)?.store.get(entry.node_id)?;
            entry.objects = match node {
                Some(node) => node.objects.iter().map(|o| o.object).collect(),
                None => {
                    let mut objects: Vec<ObjectFileRef> = previous.into_iter().chain(entry.path_object).collect();
                    objects.dedup();
                    objects
                }
            };
            previous = entry.path_object;
        }
        Ok(())
    }
}

/// Adds an entry for every walked node, except the last one.
fn push_walk(
    data: &mut RouteData,
    database: DatabaseId,
    object_ref: ObjectFileRef,
    object: &RoutableObject,
    indices: &[usize],
) {
    for w in indices.windows(2) {
        let Some(node_id) = object.node_id(w[0]) else {
            continue;
        };
        data.push(RouteEntry {
            database,
            node_id,
            current_node_index: w[0],
            objects: Vec::new(),
            path_object: Some(object_ref),
            target_node_index: w[1],
        });
    }
}
