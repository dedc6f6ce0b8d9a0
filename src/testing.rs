// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Synthetic road networks shared by tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::database::{Access, DatabaseBuilder, Way};
use crate::graph::{NodeId, ObjectFileRef, RouteGraph, RouteNode, VariantTable};
use crate::profile::{CostModel, CostStrategy, RoutingProfile};
use crate::route::{DatabaseId, DbNodeId};
use crate::router::{DatabaseSource, MultiDbRouter, RouterParameter, RoutingParameter, RoutingResult};
use crate::search::{RoutingBackend, RoutingError};
use crate::store::write_store;
use crate::{GeoCoord, TypeConfig, Vehicle};

/// Number of degrees of longitude (at the equator) spanning one kilometer.
pub fn km() -> f64 {
    (1.0 / 6371.0088f64).to_degrees()
}

/// Position `x` km east and `y` km north of (0, 0).
pub fn at(x: f64, y: f64) -> GeoCoord {
    GeoCoord::new(y * km(), x * km()).quantized()
}

pub fn types() -> TypeConfig {
    let car = Vehicle::Car.usable_bit();
    let mut t = TypeConfig::new();
    t.register("highway_residential", car | Vehicle::Foot.usable_bit() | Vehicle::Bicycle.usable_bit());
    t.register("highway_primary", car);
    t.register("highway_motorway", car);
    t.register("highway_motorway_link", car);
    t.register("building", 0);
    t
}

/// Car profile driving 50 km/h on every road, except 100 km/h on motorways.
pub fn profile(types: &TypeConfig) -> RoutingProfile {
    let mut p = RoutingProfile::new(Vehicle::Car, CostStrategy::Fastest);
    for (name, speed) in [
        ("highway_residential", 50.0),
        ("highway_primary", 50.0),
        ("highway_motorway", 100.0),
        ("highway_motorway_link", 50.0),
    ] {
        if let Some(t) = types.by_name(name) {
            p.add_type(t.id, speed);
        }
    }
    p
}

pub fn way(types: &TypeConfig, type_name: &str, name: &str, nodes: &[GeoCoord]) -> Way {
    Way {
        type_id: types.by_name(type_name).map(|t| t.id).unwrap_or_default(),
        name: name.to_string(),
        nodes: nodes.to_vec(),
        access: Access::both(Vehicle::Car.usable_bit() | Vehicle::Foot.usable_bit() | Vehicle::Bicycle.usable_bit()),
        grade: 1,
        ..Way::default()
    }
}

pub fn oneway_way(types: &TypeConfig, from: GeoCoord, to: GeoCoord) -> Way {
    let mut w = way(types, "highway_residential", "One Way", &[from, to]);
    w.access = Access::oneway(Vehicle::Car.usable_bit());
    w
}

/// A-B-C on a straight line, 1 km apart, built of two ways: A-B and B-C.
#[derive(Debug, Clone)]
pub struct LineNetwork {
    pub builder: DatabaseBuilder,
    pub coords: [GeoCoord; 3],
    pub ab: ObjectFileRef,
    pub bc: ObjectFileRef,
}

impl LineNetwork {
    pub fn profile(&self) -> RoutingProfile {
        profile(self.builder.types())
    }
}

pub fn line_network() -> LineNetwork {
    let mut builder = DatabaseBuilder::new(types());
    let coords = [at(0.0, 0.0), at(1.0, 0.0), at(2.0, 0.0)];
    let ab = builder.add_way(way(builder.types(), "highway_residential", "Main Street", &coords[0..2]));
    let bc = builder.add_way(way(builder.types(), "highway_residential", "Main Street", &coords[1..3]));
    LineNetwork { builder, coords, ab, bc }
}

/// [line_network] plus a longer alternative way B-D-C.
#[derive(Debug, Clone)]
pub struct DetourNetwork {
    pub builder: DatabaseBuilder,
    pub a: GeoCoord,
    pub b: GeoCoord,
    pub c: GeoCoord,
    pub d: GeoCoord,
    pub ab: ObjectFileRef,
    pub bc: ObjectFileRef,
    pub detour: ObjectFileRef,
}

impl DetourNetwork {
    pub fn profile(&self) -> RoutingProfile {
        profile(self.builder.types())
    }
}

pub fn detour_network() -> DetourNetwork {
    let LineNetwork {
        mut builder,
        coords: [a, b, c],
        ab,
        bc,
    } = line_network();
    let d = at(1.5, 0.5);
    let detour = builder.add_way(way(builder.types(), "highway_residential", "Detour", &[b, d, c]));
    DetourNetwork {
        builder,
        a,
        b,
        c,
        d,
        ab,
        bc,
        detour,
    }
}

/// One half of a line A-B-C split into two databases sharing node B.
#[derive(Debug, Clone)]
pub struct SplitNetwork {
    pub builder: DatabaseBuilder,
    pub a: GeoCoord,
    pub b: GeoCoord,
    pub c: GeoCoord,
    pub way: ObjectFileRef,
}

impl SplitNetwork {
    pub fn profile(&self) -> RoutingProfile {
        profile(self.builder.types())
    }
}

/// Returns the western (A-B) and eastern (B-C) database of a 2 km line.
pub fn split_line_networks() -> (SplitNetwork, SplitNetwork) {
    let (a, b, c) = (at(0.0, 0.0), at(1.0, 0.0), at(2.0, 0.0));
    let half = |from: GeoCoord, to: GeoCoord, name: &str| {
        let mut builder = DatabaseBuilder::new(types());
        let object = builder.add_way(way(builder.types(), "highway_residential", name, &[from, to]));
        SplitNetwork {
            builder,
            a,
            b,
            c,
            way: object,
        }
    };
    (half(a, b, "West Road"), half(b, c, "East Road"))
}

/// Three-way junction J: "Alpha" from W to J, "Beta" continuing
/// straight from J through E to F and "Gamma" branching north from J through N to M.
#[derive(Debug, Clone)]
pub struct CrossingNetwork {
    pub builder: DatabaseBuilder,
    pub w: GeoCoord,
    pub j: GeoCoord,
    pub e: GeoCoord,
    pub f: GeoCoord,
    pub n: GeoCoord,
    pub m: GeoCoord,
    pub alpha: ObjectFileRef,
    pub beta: ObjectFileRef,
    pub gamma: ObjectFileRef,
}

impl CrossingNetwork {
    pub fn profile(&self) -> RoutingProfile {
        profile(self.builder.types())
    }
}

pub fn crossing_network() -> CrossingNetwork {
    let mut builder = DatabaseBuilder::new(types());
    let (w, j, e, f, n) = (at(0.0, 0.0), at(1.0, 0.0), at(2.0, 0.0), at(3.0, 0.0), at(1.0, 1.0));
    let m = at(1.0, 2.0);
    let alpha = builder.add_way(way(builder.types(), "highway_residential", "Alpha", &[w, j]));
    let beta = builder.add_way(way(builder.types(), "highway_residential", "Beta", &[j, e, f]));
    let gamma = builder.add_way(way(builder.types(), "highway_residential", "Gamma", &[j, n, m]));
    CrossingNetwork {
        builder,
        w,
        j,
        e,
        f,
        n,
        m,
        alpha,
        beta,
        gamma,
    }
}

/// Counter-clockwise one-way roundabout W-S-E-N around (1.5, 0), entered
/// from "In Road" at W and left by "Out Road" at E or "North Road" at N.
#[derive(Debug, Clone)]
pub struct RoundaboutNetwork {
    pub builder: DatabaseBuilder,
    pub start: GeoCoord,
    pub east: GeoCoord,
    pub north: GeoCoord,
    pub ring: ObjectFileRef,
}

pub fn roundabout_network() -> RoundaboutNetwork {
    let mut builder = DatabaseBuilder::new(types());
    let (rw, rs, re, rn) = (at(1.0, 0.0), at(1.5, -0.5), at(2.0, 0.0), at(1.5, 0.5));
    let (start, east, north) = (at(0.0, 0.0), at(3.0, 0.0), at(1.5, 1.5));

    builder.add_way(way(builder.types(), "highway_residential", "In Road", &[start, rw]));
    let mut ring = way(builder.types(), "highway_primary", "", &[rw, rs, re, rn, rw]);
    ring.roundabout = true;
    ring.access = Access::oneway(Vehicle::Car.usable_bit());
    let ring = builder.add_way(ring);
    builder.add_way(way(builder.types(), "highway_residential", "Out Road", &[re, east]));
    builder.add_way(way(builder.types(), "highway_residential", "North Road", &[rn, north]));

    RoundaboutNetwork {
        builder,
        start,
        east,
        north,
        ring,
    }
}

/// "Local Road" (0-1 km) joined by an unnamed "A1" link (1-2 km) to the
/// "A1" motorway (2-4 km), which ends at "Exit Road" (4-5 km).
#[derive(Debug, Clone)]
pub struct MotorwayNetwork {
    pub builder: DatabaseBuilder,
    pub nodes: [GeoCoord; 6],
}

pub fn motorway_network() -> MotorwayNetwork {
    let mut builder = DatabaseBuilder::new(types());
    let nodes = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0].map(|x| at(x, 0.0));
    let a1 = |mut w: Way| {
        w.ref_name = "A1".to_string();
        w
    };

    builder.add_way(way(builder.types(), "highway_residential", "Local Road", &nodes[0..2]));
    builder.add_way(a1(way(builder.types(), "highway_motorway_link", "", &nodes[1..3])));
    builder.add_way(a1(way(builder.types(), "highway_motorway", "", &nodes[2..5])));
    builder.add_way(way(builder.types(), "highway_residential", "Exit Road", &nodes[4..6]));

    MotorwayNetwork { builder, nodes }
}

/// Writes `router.dat` and `objects.dat` of the builder into `dir`.
pub fn write_database(dir: &Path, builder: &DatabaseBuilder) {
    write_store(dir.join("router.dat"), builder.route_graph(), 12).unwrap();
    builder.save(dir.join("objects.dat")).unwrap();
}

/// Writes every builder into its own subdirectory of `dir` and opens
/// a router over them, using [profile] for every database.
pub fn open_router(dir: &Path, builders: &[&DatabaseBuilder]) -> MultiDbRouter {
    let sources = builders
        .iter()
        .enumerate()
        .map(|(i, builder)| {
            let path = dir.join(format!("db{i}"));
            std::fs::create_dir_all(&path).unwrap();
            write_database(&path, builder);
            DatabaseSource::Directory(path)
        })
        .collect();

    let mut router = MultiDbRouter::new(RouterParameter::default(), sources);
    router
        .open(|_, objects| {
            let p: Box<dyn CostModel> = Box::new(profile(objects.types()));
            Ok(p)
        })
        .unwrap();
    router
}

/// Routes between the routable nodes closest to `from` and `to`.
pub fn route(router: &MultiDbRouter, from: GeoCoord, to: GeoCoord) -> RoutingResult {
    let start = router.closest_routable_node(from, 0.1).unwrap().unwrap();
    let target = router.closest_routable_node(to, 0.1).unwrap().unwrap();
    router
        .calculate_route(start.position, target.position, &RoutingParameter::default())
        .unwrap()
}

/// [RoutingBackend] over in-memory route graphs, one per database.
#[derive(Debug)]
pub struct TestBackend {
    databases: Vec<TestDatabase>,
}

#[derive(Debug)]
struct TestDatabase {
    nodes: HashMap<NodeId, Arc<RouteNode>>,
    variants: VariantTable,
    profile: RoutingProfile,
}

impl TestBackend {
    pub fn new(graphs: Vec<(RouteGraph, RoutingProfile)>) -> Self {
        let databases = graphs
            .into_iter()
            .map(|(graph, profile)| {
                let (nodes, variants) = graph.into_sorted();
                TestDatabase {
                    nodes: nodes.into_iter().map(|n| (n.id, Arc::new(n))).collect(),
                    variants,
                    profile,
                }
            })
            .collect();
        Self { databases }
    }

    fn database(&self, id: DatabaseId) -> Result<&TestDatabase, RoutingError> {
        self.databases
            .get(id.index())
            .ok_or(RoutingError::UnknownDatabase(id))
    }
}

impl RoutingBackend for TestBackend {
    fn route_node(&self, id: DbNodeId) -> Result<Option<Arc<RouteNode>>, RoutingError> {
        Ok(self.database(id.database)?.nodes.get(&id.node).cloned())
    }

    fn variants(&self, database: DatabaseId) -> Result<&VariantTable, RoutingError> {
        Ok(&self.database(database)?.variants)
    }

    fn profile(&self, database: DatabaseId) -> Result<&dyn CostModel, RoutingError> {
        Ok(&self.database(database)?.profile)
    }

    fn node_twins(&self, id: DbNodeId) -> Result<Vec<DbNodeId>, RoutingError> {
        Ok(self
            .databases
            .iter()
            .enumerate()
            .filter(|&(i, db)| i != id.database.index() && db.nodes.contains_key(&id.node))
            .map(|(i, _)| DbNodeId::new(DatabaseId(i as u32), id.node))
            .collect())
    }
}
