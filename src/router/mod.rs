// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Routing across several independently built databases.
//!
//! Every database consists of a [RouteNodeStore] (`router.dat`) and an
//! [ObjectDatabase] (`objects.dat`). Databases are joined at twin nodes:
//! route nodes with the same [NodeId](crate::graph::NodeId) in more than one database.

mod resolve;

use std::path::PathBuf;
use std::sync::Arc;

use crate::database::{DatabaseError, MemoryDatabase, ObjectDatabase, Way};
use crate::graph::VariantTable;
use crate::postprocess::{self, DatabaseContext, Pass, PostprocessError};
use crate::profile::{CostModel, ProfileError};
use crate::route::{
    ClosestRoutableNode, DatabaseId, DbNodeId, RawPathEntry, RouteData, RouteDescription,
    RoutePosition, RouteWay,
};
use crate::search::{self, RoutingBackend, RoutingError, SearchRequest, DEFAULT_NODE_LIMIT};
use crate::store::{RouteNodeStore, StoreError, DEFAULT_CACHE_SIZE};
use crate::{earth_distance, Breaker, GeoBox, GeoCoord};

/// Name of the route graph file inside a database directory.
pub const ROUTER_FILE: &str = "router.dat";

/// Name of the object file inside a database directory.
pub const OBJECTS_FILE: &str = "objects.dat";

/// Parameters of a [MultiDbRouter], fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterParameter {
    /// Number of tile pages cached by each route node store.
    pub cache_size: usize,
    /// Node limit used when [RoutingParameter::node_limit] is not set.
    pub node_limit: usize,
}

impl Default for RouterParameter {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            node_limit: DEFAULT_NODE_LIMIT,
        }
    }
}

/// Parameters of a single [MultiDbRouter::calculate_route] call.
#[derive(Clone, Copy, Default)]
pub struct RoutingParameter<'a> {
    pub breaker: Option<&'a Breaker>,
    pub node_limit: Option<usize>,
    /// See [SearchRequest::progress].
    pub progress: Option<&'a dyn Fn(f64, f64)>,
}

/// Where a database is read from.
#[derive(Debug, Clone)]
pub enum DatabaseSource {
    /// Directory with [ROUTER_FILE] and [OBJECTS_FILE].
    Directory(PathBuf),
    /// Already loaded objects, together with the path of their route graph file.
    Loaded {
        objects: Arc<dyn ObjectDatabase>,
        router_file: PathBuf,
    },
}

/// Failure to open one of the databases of a [MultiDbRouter].
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("database {database}: {source}")]
    Store {
        database: DatabaseId,
        #[source]
        source: StoreError,
    },

    #[error("database {database}: {source}")]
    Objects {
        database: DatabaseId,
        #[source]
        source: DatabaseError,
    },

    #[error("database {database}: {source}")]
    Profile {
        database: DatabaseId,
        #[source]
        source: ProfileError,
    },

    #[error("no databases to open")]
    NoDatabases,
}

/// Result of [MultiDbRouter::calculate_route].
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingResult {
    pub raw_path: Vec<RawPathEntry>,
    pub route_data: RouteData,
    pub costs: f64,
}

#[derive(Debug)]
struct DatabaseHandle {
    objects: Arc<dyn ObjectDatabase>,
    store: RouteNodeStore,
    profile: Box<dyn CostModel>,
}

/// Presents several databases as one routable graph.
///
/// The router is unusable until [opened](MultiDbRouter::open) successfully;
/// all calculations on a closed router fail with [RoutingError::NotOpen].
#[derive(Debug)]
pub struct MultiDbRouter {
    parameter: RouterParameter,
    sources: Vec<DatabaseSource>,
    handles: Vec<DatabaseHandle>,
}

impl MultiDbRouter {
    /// Creates a closed router over the given databases. Their order
    /// determines the [DatabaseIds](DatabaseId).
    pub fn new(parameter: RouterParameter, sources: Vec<DatabaseSource>) -> Self {
        Self {
            parameter,
            sources,
            handles: Vec::new(),
        }
    }

    /// Opens all databases, building a cost model for each one with `profile_builder`.
    ///
    /// Any failure leaves the router closed.
    pub fn open<F>(&mut self, mut profile_builder: F) -> Result<(), OpenError>
    where
        F: FnMut(DatabaseId, &dyn ObjectDatabase) -> Result<Box<dyn CostModel>, ProfileError>,
    {
        self.close();
        if self.sources.is_empty() {
            return Err(OpenError::NoDatabases);
        }

        let mut handles = Vec::with_capacity(self.sources.len());
        for (i, source) in self.sources.iter().enumerate() {
            let database = DatabaseId(i as u32);
            let handle = open_database(database, source, self.parameter.cache_size, &mut profile_builder)
                .inspect_err(|e| log::error!("failed to open router: {e}"))?;
            handles.push(handle);
        }

        self.handles = handles;
        Ok(())
    }

    pub fn close(&mut self) {
        self.handles.clear();
    }

    pub fn is_open(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn database_count(&self) -> usize {
        self.handles.len()
    }

    pub fn objects(&self, database: DatabaseId) -> Result<&Arc<dyn ObjectDatabase>, RoutingError> {
        Ok(&self.handle(database)?.objects)
    }

    pub fn store(&self, database: DatabaseId) -> Result<&RouteNodeStore, RoutingError> {
        Ok(&self.handle(database)?.store)
    }

    fn handle(&self, database: DatabaseId) -> Result<&DatabaseHandle, RoutingError> {
        if !self.is_open() {
            return Err(RoutingError::NotOpen);
        }
        self.handles
            .get(database.index())
            .ok_or(RoutingError::UnknownDatabase(database))
    }

    /// Finds the node of a routable way closest to `coord`, not further
    /// than `radius` kilometers, across all databases.
    pub fn closest_routable_node(
        &self,
        coord: GeoCoord,
        radius: f64,
    ) -> Result<Option<ClosestRoutableNode>, RoutingError> {
        if !self.is_open() {
            return Err(RoutingError::NotOpen);
        }

        let area = GeoBox::around(coord, radius);
        let mut best: Option<ClosestRoutableNode> = None;

        for (i, h) in self.handles.iter().enumerate() {
            if !h.objects.bounding_box().intersects(&area) {
                continue;
            }

            let profile = h.profile.as_ref();
            let vehicle = profile.vehicle();
            let filter = |w: &Way| {
                profile.can_use_type(w.type_id)
                    && (w.access.can_use_forward(vehicle) || w.access.can_use_backward(vehicle))
            };
            let Some(found) = h.objects.closest_way_node(coord, radius, &filter)? else {
                continue;
            };
            if best.as_ref().is_some_and(|b| b.distance <= found.distance) {
                continue;
            }

            let way = h.objects.way_by_offset(found.way.offset)?;
            best = Some(ClosestRoutableNode {
                position: RoutePosition {
                    database: DatabaseId(i as u32),
                    object: found.way,
                    node_index: found.node_index,
                },
                coord: found.coord,
                distance: found.distance,
                name: way.name.clone(),
            });
        }

        Ok(best)
    }

    /// Returns the nodes of other databases sharing the id of `id`.
    pub fn node_twins(&self, id: DbNodeId) -> Result<Vec<DbNodeId>, RoutingError> {
        let coord = id.node.coord();
        let mut twins = Vec::new();
        for (i, h) in self.handles.iter().enumerate() {
            if i == id.database.index() || !h.objects.bounding_box().contains(coord) {
                continue;
            }
            if h.store.contains(id.node)? {
                twins.push(DbNodeId::new(DatabaseId(i as u32), id.node));
            }
        }
        Ok(twins)
    }

    /// Calculates the cheapest route between two positions.
    pub fn calculate_route(
        &self,
        start: RoutePosition,
        target: RoutePosition,
        parameter: &RoutingParameter<'_>,
    ) -> Result<RoutingResult, RoutingError> {
        let start_anchor = self.anchor(start)?;
        let target_anchor = self.anchor(target)?;
        let profile = self.handle(start.database)?.profile.as_ref();

        let mut request = SearchRequest::new(start_anchor.coord, target_anchor.coord);
        request.starts = self.search_starts(&start_anchor)?;
        request.targets = self.search_targets(&target_anchor)?;
        request.direct_costs = self.direct_walk(&start_anchor, &target_anchor)?.map(|w| w.costs);
        request.cost_limit = profile.cost_limit(earth_distance(start_anchor.coord, target_anchor.coord));
        request.node_limit = parameter.node_limit.unwrap_or(self.parameter.node_limit);
        request.breaker = parameter.breaker;
        request.progress = parameter.progress;

        let outcome = search::find_route(self, request)?;
        let route_data = self.route_data(&start_anchor, &target_anchor, &outcome.path)?;

        Ok(RoutingResult {
            raw_path: outcome.path,
            route_data,
            costs: outcome.costs,
        })
    }

    /// Resolves junctions and turns route data into a [RouteDescription]
    /// ready for [post-processing](MultiDbRouter::postprocess_route_description).
    pub fn transform_route_data_to_description(
        &self,
        data: &RouteData,
    ) -> Result<RouteDescription, RoutingError> {
        let mut data = data.clone();
        self.resolve_route_data_junctions(&mut data)?;
        Ok(RouteDescription::from(&data))
    }

    /// Returns the route as one continuous polyline.
    pub fn transform_route_data_to_way(&self, data: &RouteData) -> RouteWay {
        let mut way = RouteWay::default();
        for entry in data.iter() {
            way.nodes.push(entry.node_id.coord());
            way.ids.push(entry.node_id);
        }
        way
    }

    /// Returns the positions of all route nodes.
    pub fn transform_route_data_to_points(&self, data: &RouteData) -> Vec<GeoCoord> {
        data.iter().map(|e| e.node_id.coord()).collect()
    }

    /// Runs the post-processing passes over `description`, in order.
    pub fn postprocess_route_description(
        &self,
        description: &mut RouteDescription,
        passes: &[Pass],
        breaker: Option<&Breaker>,
    ) -> Result<(), PostprocessError> {
        if !self.is_open() {
            return Err(PostprocessError::NotOpen);
        }
        let databases = self
            .handles
            .iter()
            .map(|h| DatabaseContext {
                objects: h.objects.as_ref(),
                profile: h.profile.as_ref(),
            })
            .collect();
        postprocess::run(databases, description, passes, breaker)
    }
}

fn open_database<F>(
    database: DatabaseId,
    source: &DatabaseSource,
    cache_size: usize,
    profile_builder: &mut F,
) -> Result<DatabaseHandle, OpenError>
where
    F: FnMut(DatabaseId, &dyn ObjectDatabase) -> Result<Box<dyn CostModel>, ProfileError>,
{
    let (objects, router_file): (Arc<dyn ObjectDatabase>, PathBuf) = match source {
        DatabaseSource::Directory(dir) => {
            let objects = MemoryDatabase::open(dir.join(OBJECTS_FILE))
                .map_err(|source| OpenError::Objects { database, source })?;
            (Arc::new(objects), dir.join(ROUTER_FILE))
        }
        DatabaseSource::Loaded {
            objects,
            router_file,
        } => (objects.clone(), router_file.clone()),
    };

    let store = RouteNodeStore::open(&router_file, cache_size)
        .map_err(|source| OpenError::Store { database, source })?;
    let profile = profile_builder(database, objects.as_ref())
        .map_err(|source| OpenError::Profile { database, source })?;

    Ok(DatabaseHandle {
        objects,
        store,
        profile,
    })
}

impl RoutingBackend for MultiDbRouter {
    fn route_node(&self, id: DbNodeId) -> Result<Option<Arc<crate::graph::RouteNode>>, RoutingError> {
        Ok(self.handle(id.database)?.store.get(id.node)?)
    }

    fn variants(&self, database: DatabaseId) -> Result<&VariantTable, RoutingError> {
        Ok(self.handle(database)?.store.variants())
    }

    fn profile(&self, database: DatabaseId) -> Result<&dyn CostModel, RoutingError> {
        Ok(self.handle(database)?.profile.as_ref())
    }

    fn node_twins(&self, id: DbNodeId) -> Result<Vec<DbNodeId>, RoutingError> {
        MultiDbRouter::node_twins(self, id)
    }
}
