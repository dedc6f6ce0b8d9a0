// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Offline routing over pre-built road databases.
//!
//! A database is a pair of files: a tiled route graph (`router.dat`, read through
//! a [RouteNodeStore](store::RouteNodeStore) with an LRU page cache) and the ways
//! and areas the graph was derived from (`objects.dat`). A [MultiDbRouter] joins
//! any number of databases at nodes they share, runs an A* search with a
//! vehicle-specific [cost model](profile::CostModel), and turns the result
//! into an annotated [RouteDescription](route::RouteDescription) ready for
//! turn-by-turn presentation.
//!
//! # Example
//!
//! ```no_run
//! use scoutroute::{postprocess::Pass, profile::RoutingProfile, router, GeoCoord, MultiDbRouter};
//!
//! let mut r = MultiDbRouter::new(
//!     router::RouterParameter::default(),
//!     vec![router::DatabaseSource::Directory("path/to/monaco".into())],
//! );
//! r.open(|_, objects| {
//!     let p = RoutingProfile::for_car(objects.types(), scoutroute::profile::CAR_SPEEDS, 130.0)?;
//!     Ok(Box::new(p) as Box<dyn scoutroute::profile::CostModel>)
//! })
//! .expect("failed to open the database");
//!
//! let start = r.closest_routable_node(GeoCoord::new(43.7384, 7.4246), 1.0).unwrap().unwrap();
//! let target = r.closest_routable_node(GeoCoord::new(43.7478, 7.4323), 1.0).unwrap().unwrap();
//! let result = r
//!     .calculate_route(start.position, target.position, &router::RoutingParameter::default())
//!     .expect("failed to find route");
//!
//! let mut description = r.transform_route_data_to_description(&result.route_data).unwrap();
//! r.postprocess_route_description(&mut description, &Pass::default_list("start", "target"), None)
//!     .unwrap();
//! for node in description.iter() {
//!     for d in &node.descriptions {
//!         println!("{:.3} km: {d}", node.distance);
//!     }
//! }
//! ```

mod breaker;
mod coord;
pub mod database;
mod distance;
pub mod graph;
mod kd;
pub mod postprocess;
pub mod profile;
pub mod route;
pub mod router;
pub mod search;
pub mod store;
mod types;

#[cfg(test)]
mod testing;

pub use breaker::Breaker;
pub use coord::{GeoBox, GeoCoord, COORD_SCALE};
pub use distance::{bearing_final, bearing_initial, earth_distance, normalize_relative_angle};
pub use kd::{KDTree, WayNode};
pub use router::MultiDbRouter;
pub use types::{TypeConfig, TypeId, TypeInfo, Vehicle};
