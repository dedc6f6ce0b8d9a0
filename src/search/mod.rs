// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Cost-driven best-first route search over an abstract [RoutingBackend].
//!
//! The search works on [DbNodeIds](DbNodeId), so the same code routes over a
//! single database and over many databases joined by twin nodes.

mod error;
mod queue;

pub use error::{RoutingError, DEFAULT_NODE_LIMIT};

use std::collections::hash_map::{Entry, HashMap};
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::graph::{NodeId, ObjectFileRef, RouteNode, VariantTable};
use crate::profile::CostModel;
use crate::route::{DatabaseId, DbNodeId, RawPathEntry};
use crate::{earth_distance, Breaker, GeoCoord};
use queue::{QueueItem, State};

/// Provides route nodes, variant tables and cost models to the search.
pub trait RoutingBackend {
    /// Loads a route node. `Ok(None)` means the database has no such node.
    fn route_node(&self, id: DbNodeId) -> Result<Option<Arc<RouteNode>>, RoutingError>;

    fn variants(&self, database: DatabaseId) -> Result<&VariantTable, RoutingError>;

    fn profile(&self, database: DatabaseId) -> Result<&dyn CostModel, RoutingError>;

    /// Returns nodes of other databases representing the same junction as `id`.
    fn node_twins(&self, id: DbNodeId) -> Result<Vec<DbNodeId>, RoutingError>;
}

/// Node the search may start from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchStart {
    pub node: DbNodeId,
    /// Object used to reach the node, taken into account by turn restrictions.
    pub via: Option<ObjectFileRef>,
    /// Costs already spent to reach the node.
    pub costs: f64,
}

/// Node the search may end at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchTarget {
    pub node: DbNodeId,
    /// Costs still needed to get from the node to the actual target position.
    pub extra_costs: f64,
}

/// Input of [find_route].
pub struct SearchRequest<'a> {
    pub starts: Vec<SearchStart>,
    pub targets: Vec<SearchTarget>,
    pub start_coord: GeoCoord,
    pub target_coord: GeoCoord,
    /// Costs of reaching the target without touching any route node,
    /// if start and target lie on the same object.
    pub direct_costs: Option<f64>,
    /// Nodes whose costs plus estimate exceed this value are not considered.
    pub cost_limit: f64,
    pub node_limit: usize,
    pub breaker: Option<&'a Breaker>,
    /// Called with the air distance between start and target and the
    /// maximum distance covered so far, both in kilometers.
    pub progress: Option<&'a dyn Fn(f64, f64)>,
}

impl<'a> SearchRequest<'a> {
    pub fn new(start_coord: GeoCoord, target_coord: GeoCoord) -> Self {
        Self {
            starts: Vec::new(),
            targets: Vec::new(),
            start_coord,
            target_coord,
            direct_costs: None,
            cost_limit: f64::INFINITY,
            node_limit: DEFAULT_NODE_LIMIT,
            breaker: None,
            progress: None,
        }
    }
}

/// Counters describing the effort of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchStats {
    pub expanded: usize,
    /// Queue entries skipped because of a better known cost or the cost limit.
    pub ignored: usize,
    pub max_open: usize,
    pub air_distance: f64,
    pub cost_limit: f64,
}

/// Result of a successful [find_route].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Route nodes from a start to a target. Empty if the direct
    /// connection (see [SearchRequest::direct_costs]) is best.
    pub path: Vec<RawPathEntry>,
    /// Total costs, including start costs and target extra costs.
    pub costs: f64,
    pub stats: SearchStats,
}

/// Predecessor of a state, with the index of the path leading out of it.
/// The index is `None` for hops between twin nodes.
type CameFrom = HashMap<State, (State, Option<usize>)>;

/// Uses the [A* algorithm](https://en.wikipedia.org/wiki/A*_search_algorithm)
/// to find the cheapest route between any of the starts and any of the targets.
///
/// Paths are checked in order: immediate turnarounds, vehicle restriction flags,
/// turn restrictions, and finally the cost model. The heuristic is the
/// [estimate](CostModel::estimate_costs) of the air distance to `target_coord`,
/// which must be admissible for the result to be optimal.
pub fn find_route<B: RoutingBackend + ?Sized>(
    backend: &B,
    request: SearchRequest<'_>,
) -> Result<SearchOutcome, RoutingError> {
    let target_coord = request.target_coord;
    let mut stats = SearchStats {
        air_distance: earth_distance(request.start_coord, target_coord),
        cost_limit: request.cost_limit,
        ..SearchStats::default()
    };

    let estimate = |id: DbNodeId| -> Result<f64, RoutingError> {
        Ok(backend
            .profile(id.database)?
            .estimate_costs(earth_distance(id.node.coord(), target_coord)))
    };

    let mut targets: HashMap<DbNodeId, f64> = HashMap::new();
    for t in &request.targets {
        let extra = targets.entry(t.node).or_insert(f64::INFINITY);
        *extra = extra.min(t.extra_costs);
    }

    let mut queue: BinaryHeap<QueueItem> = BinaryHeap::new();
    let mut came_from: CameFrom = HashMap::new();
    let mut known_costs: HashMap<State, f64> = HashMap::new();

    for s in &request.starts {
        let at = State {
            node: s.node,
            via: s.via,
        };
        match known_costs.entry(at) {
            Entry::Occupied(e) if *e.get() <= s.costs => continue,
            Entry::Occupied(mut e) => {
                e.insert(s.costs);
            }
            Entry::Vacant(e) => {
                e.insert(s.costs);
            }
        }
        queue.push(QueueItem {
            at,
            cost: s.costs,
            score: s.costs + estimate(s.node)?,
        });
    }

    let mut best_costs = request.direct_costs.unwrap_or(f64::INFINITY);
    let mut best: Option<State> = None;
    let mut covered: f64 = 0.0;

    while let Some(item) = queue.pop() {
        if request.breaker.is_some_and(Breaker::is_cancelled) {
            return Err(RoutingError::Cancelled);
        }

        // Nothing left in the queue can beat the best candidate
        if item.score >= best_costs {
            break;
        }

        // Multiple items may be kept in the queue for the same state
        if item.cost > known_costs.get(&item.at).copied().unwrap_or(f64::INFINITY) {
            stats.ignored += 1;
            continue;
        }

        stats.expanded += 1;
        if stats.expanded > request.node_limit {
            log::warn!("route search exceeded the limit of {} nodes", request.node_limit);
            return Err(RoutingError::LimitExceeded(request.node_limit));
        }

        if let Some(&extra) = targets.get(&item.at.node) {
            if item.cost + extra < best_costs {
                best_costs = item.cost + extra;
                best = Some(item.at);
            }
        }

        if let Some(progress) = request.progress {
            let remaining = earth_distance(item.at.node.node.coord(), target_coord);
            covered = covered.max(stats.air_distance - remaining);
            progress(stats.air_distance, covered);
        }

        let Some(node) = backend.route_node(item.at.node)? else {
            continue;
        };

        let database = item.at.node.database;
        let variants = backend.variants(database)?;
        let profile = backend.profile(database)?;
        let vehicle = profile.vehicle();
        let came_from_node = previous_node(&came_from, item.at);

        for (i, path) in node.paths.iter().enumerate() {
            // Forbid turnarounds (A-B-A)
            if Some(path.target) == came_from_node {
                continue;
            }
            if path.is_restricted(vehicle) {
                continue;
            }
            if item.at.via.is_some_and(|via| node.is_excluded(via, i)) {
                continue;
            }
            if !profile.can_use(&node, variants, i) {
                continue;
            }

            let next_node = DbNodeId::new(database, path.target);
            let next = State {
                node: next_node,
                via: node.path_object(i),
            };
            let cost = item.cost + profile.costs(&node, variants, i);
            let score = cost + estimate(next_node)?;
            if !push(&mut queue, &mut known_costs, next, cost, score, request.cost_limit) {
                stats.ignored += 1;
                continue;
            }
            came_from.insert(next, (item.at, Some(i)));
        }

        // Twins of a twin are already known
        let reached_by_twin = came_from.get(&item.at).is_some_and(|&(_, index)| index.is_none());
        let twins = if reached_by_twin {
            Vec::new()
        } else {
            backend.node_twins(item.at.node)?
        };
        for twin in twins {
            let next = State {
                node: twin,
                via: None,
            };
            let score = item.cost + estimate(twin)?;
            if push(&mut queue, &mut known_costs, next, item.cost, score, request.cost_limit) {
                came_from.insert(next, (item.at, None));
            }
        }

        stats.max_open = stats.max_open.max(queue.len());
    }

    log::debug!(
        "route search: air distance {:.3} km, cost limit {:.4}, {} nodes expanded, {} ignored, max open {}",
        stats.air_distance,
        stats.cost_limit,
        stats.expanded,
        stats.ignored,
        stats.max_open,
    );

    match best {
        Some(last) => Ok(SearchOutcome {
            path: reconstruct_path(&came_from, last),
            costs: best_costs,
            stats,
        }),
        None if best_costs.is_finite() => Ok(SearchOutcome {
            path: Vec::new(),
            costs: best_costs,
            stats,
        }),
        None => {
            log::warn!(
                "no route found between {} and {}",
                request.start_coord,
                request.target_coord
            );
            Err(RoutingError::NotFound)
        }
    }
}

/// Records `cost` as the best known costs of `at` and queues it,
/// unless a cheaper (or equal) way is already known or `score` is over the limit.
fn push(
    queue: &mut BinaryHeap<QueueItem>,
    known_costs: &mut HashMap<State, f64>,
    at: State,
    cost: f64,
    score: f64,
    cost_limit: f64,
) -> bool {
    if known_costs.get(&at).is_some_and(|&known| known <= cost) || score > cost_limit {
        return false;
    }
    known_costs.insert(at, cost);
    queue.push(QueueItem { at, cost, score });
    true
}

/// Finds the physical node visited before `at`, skipping hops between twins.
fn previous_node(came_from: &CameFrom, at: State) -> Option<NodeId> {
    let mut current = at;
    while let Some(&(prev, _)) = came_from.get(&current) {
        if prev.node.node != at.node.node {
            return Some(prev.node.node);
        }
        current = prev;
    }
    None
}

fn reconstruct_path(came_from: &CameFrom, last: State) -> Vec<RawPathEntry> {
    let mut path = Vec::new();
    let mut current = last;
    let mut path_index = None;

    loop {
        path.push(RawPathEntry {
            node: current.node,
            via: current.via,
            path_index,
        });
        match came_from.get(&current) {
            Some(&(prev, index)) => {
                path_index = index;
                current = prev;
            }
            None => break,
        }
    }

    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseBuilder;
    use crate::testing::{self, TestBackend};
    use crate::Vehicle;

    macro_rules! assert_almost_eq {
        ($a:expr, $b:expr) => {
            assert!(($a - $b).abs() < 1e-3, "{} != {}", $a, $b)
        };
    }

    fn request(backend: &TestBackend, from: GeoCoord, to: GeoCoord) -> SearchRequest<'static> {
        let db = DatabaseId(0);
        let mut r = SearchRequest::new(from, to);
        r.starts.push(SearchStart {
            node: DbNodeId::new(db, from.node_id()),
            via: None,
            costs: 0.0,
        });
        r.targets.push(SearchTarget {
            node: DbNodeId::new(db, to.node_id()),
            extra_costs: 0.0,
        });
        r.cost_limit = backend
            .profile(db)
            .map(|p| p.cost_limit(earth_distance(from, to)))
            .unwrap_or(f64::INFINITY);
        r
    }

    fn node_ids(path: &[RawPathEntry]) -> Vec<NodeId> {
        path.iter().map(|e| e.node.node).collect()
    }

    #[test]
    fn trivial_route() {
        let net = testing::line_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let [a, b, c] = net.coords;

        let outcome = find_route(&backend, request(&backend, a, c)).unwrap();
        assert_eq!(node_ids(&outcome.path), vec![a.node_id(), b.node_id(), c.node_id()]);
        assert_almost_eq!(outcome.costs, 2.0 / 50.0);
        assert_eq!(outcome.path[0].via, None);
        assert_eq!(outcome.path[0].path_index, Some(0));
        assert_eq!(outcome.path[2].path_index, None);
    }

    #[test]
    fn optimal_route_is_found() {
        let net = testing::detour_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);

        let outcome = find_route(&backend, request(&backend, net.a, net.c)).unwrap();
        assert_eq!(node_ids(&outcome.path), vec![net.a.node_id(), net.b.node_id(), net.c.node_id()]);
        assert_eq!(outcome.path[2].via, Some(net.bc));
        assert_almost_eq!(outcome.costs, 2.0 / 50.0);
    }

    #[test]
    fn turn_restriction_forces_detour() {
        let mut net = testing::detour_network();
        net.builder.add_turn_restriction(net.ab, net.b, net.bc);
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);

        let outcome = find_route(&backend, request(&backend, net.a, net.c)).unwrap();
        assert_eq!(node_ids(&outcome.path), vec![net.a.node_id(), net.b.node_id(), net.c.node_id()]);
        assert_eq!(outcome.path[1].via, Some(net.ab));
        assert_eq!(outcome.path[2].via, Some(net.detour));
        assert!(outcome.costs > 2.0 / 50.0);
    }

    #[test]
    fn estimate_is_admissible() {
        let net = testing::detour_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let profile = net.profile();

        for from in [net.a, net.b] {
            let outcome = find_route(&backend, request(&backend, from, net.c)).unwrap();
            let estimate = profile.estimate_costs(earth_distance(from, net.c));
            assert!(estimate <= outcome.costs + 1e-12, "{estimate} > {}", outcome.costs);
        }
    }

    #[test]
    fn oneway_is_respected() {
        let net = testing::line_network();
        let [a, b, _] = net.coords;
        let mut builder = DatabaseBuilder::new(testing::types());
        builder.add_way(testing::oneway_way(builder.types(), a, b));
        let backend = TestBackend::new(vec![(builder.route_graph(), net.profile())]);

        assert_eq!(find_route(&backend, request(&backend, a, b)).unwrap().path.len(), 2);
        assert!(matches!(find_route(&backend, request(&backend, b, a)), Err(RoutingError::NotFound)));
    }

    #[test]
    fn cancellation_is_not_a_missing_route() {
        let net = testing::line_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let [a, _, c] = net.coords;
        let breaker = Breaker::new();
        breaker.cancel();

        let mut r = request(&backend, a, c);
        r.breaker = Some(&breaker);
        assert!(matches!(find_route(&backend, r), Err(RoutingError::Cancelled)));
    }

    #[test]
    fn cancellation_during_search() {
        let net = testing::line_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let [a, _, c] = net.coords;
        let breaker = Breaker::new();
        let expanded = std::cell::Cell::new(0);
        let cancel_after_first = |_: f64, _: f64| {
            expanded.set(expanded.get() + 1);
            if expanded.get() == 1 {
                breaker.cancel();
            }
        };

        let mut r = request(&backend, a, c);
        r.breaker = Some(&breaker);
        r.progress = Some(&cancel_after_first);
        assert!(matches!(find_route(&backend, r), Err(RoutingError::Cancelled)));
        assert_eq!(expanded.get(), 1);
    }

    #[test]
    fn unreachable_target_and_node_limit() {
        let net = testing::line_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let [a, _, c] = net.coords;

        let mut r = request(&backend, a, c);
        r.targets[0].node.node = GeoCoord::new(5.0, 5.0).node_id();
        assert!(matches!(find_route(&backend, r), Err(RoutingError::NotFound)));

        let mut r = request(&backend, a, c);
        r.node_limit = 1;
        assert!(matches!(find_route(&backend, r), Err(RoutingError::LimitExceeded(1))));
    }

    #[test]
    fn cost_limit_prunes_search() {
        let net = testing::line_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let [a, _, c] = net.coords;

        let mut r = request(&backend, a, c);
        r.cost_limit = 1.0 / 50.0;
        assert!(matches!(find_route(&backend, r), Err(RoutingError::NotFound)));
    }

    #[test]
    fn direct_connection_wins_when_cheaper() {
        let net = testing::line_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let [a, _, c] = net.coords;

        let mut r = request(&backend, a, c);
        r.direct_costs = Some(0.001);
        let outcome = find_route(&backend, r).unwrap();
        assert!(outcome.path.is_empty());
        assert_almost_eq!(outcome.costs, 0.001);
    }

    #[test]
    fn progress_is_reported() {
        let net = testing::line_network();
        let backend = TestBackend::new(vec![(net.builder.route_graph(), net.profile())]);
        let [a, _, c] = net.coords;
        let max_covered = std::cell::Cell::new(0.0f64);
        let report = |overall: f64, covered: f64| {
            assert!(covered <= overall + 1e-9);
            max_covered.set(max_covered.get().max(covered));
        };

        let mut r = request(&backend, a, c);
        r.progress = Some(&report);
        find_route(&backend, r).unwrap();
        assert_almost_eq!(max_covered.get(), 2.0);
    }

    #[test]
    fn route_crosses_twin_nodes() {
        let (west, east) = testing::split_line_networks();
        let backend = TestBackend::new(vec![
            (west.builder.route_graph(), west.profile()),
            (east.builder.route_graph(), east.profile()),
        ]);

        let mut r = SearchRequest::new(west.a, east.c);
        r.starts.push(SearchStart {
            node: DbNodeId::new(DatabaseId(0), west.a.node_id()),
            via: None,
            costs: 0.0,
        });
        r.targets.push(SearchTarget {
            node: DbNodeId::new(DatabaseId(1), east.c.node_id()),
            extra_costs: 0.0,
        });
        let outcome = find_route(&backend, r).unwrap();

        let steps: Vec<(DatabaseId, NodeId)> = outcome.path.iter().map(|e| (e.node.database, e.node.node)).collect();
        assert_eq!(
            steps,
            vec![
                (DatabaseId(0), west.a.node_id()),
                (DatabaseId(0), west.b.node_id()),
                (DatabaseId(1), east.b.node_id()),
                (DatabaseId(1), east.c.node_id()),
            ]
        );
        assert_eq!(outcome.path[1].path_index, None);
        assert_almost_eq!(outcome.costs, 2.0 / 50.0);
        assert_eq!(backend.profile(DatabaseId(1)).unwrap().vehicle(), Vehicle::Car);
    }
}
