// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use scoutroute::database::ObjectDatabase;
use scoutroute::postprocess::Pass;
use scoutroute::profile::{CostModel, RoutingProfile, BICYCLE_SPEED, CAR_SPEEDS, FOOT_SPEED};
use scoutroute::route::{RouteDescription, RoutePosition};
use scoutroute::router::{DatabaseSource, RouterParameter, RoutingParameter};
use scoutroute::{GeoCoord, MultiDbRouter, Vehicle};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no routable way within {radius} km of {coord}")]
    NoRoutableNode { coord: GeoCoord, radius: f64 },
}

#[derive(Parser)]
struct Cli {
    /// Database directory with router.dat and objects.dat; may be repeated
    #[arg(long = "db", required = true)]
    databases: Vec<PathBuf>,

    /// Latitude of the start point
    start_lat: f64,

    /// Longitude of the start point
    start_lon: f64,

    /// Latitude of the end point
    end_lat: f64,

    /// Longitude of the end point
    end_lon: f64,

    /// Vehicle to route for: car, bicycle or foot
    #[arg(long, default_value = "car")]
    vehicle: Vehicle,

    /// Maximum distance (km) between a point and the closest routable way
    #[arg(long, default_value_t = 1.0)]
    radius: f64,

    /// Number of route graph pages cached per database
    #[arg(long, default_value_t = scoutroute::store::DEFAULT_CACHE_SIZE)]
    cache_size: usize,

    /// Print the annotated route description instead of GeoJSON
    #[arg(long)]
    describe: bool,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    let parameter = RouterParameter {
        cache_size: cli.cache_size,
        ..RouterParameter::default()
    };
    let sources = cli.databases.iter().cloned().map(DatabaseSource::Directory).collect();
    let mut router = MultiDbRouter::new(parameter, sources);

    let vehicle = cli.vehicle;
    router.open(|_, objects: &dyn ObjectDatabase| {
        let types = objects.types();
        let profile: Box<dyn CostModel> = match vehicle {
            Vehicle::Car => Box::new(RoutingProfile::for_car(types, CAR_SPEEDS, 130.0)?),
            Vehicle::Bicycle => Box::new(RoutingProfile::for_bicycle(types, BICYCLE_SPEED)),
            Vehicle::Foot => Box::new(RoutingProfile::for_foot(types, FOOT_SPEED)),
        };
        Ok(profile)
    })?;

    let start = closest(&router, GeoCoord::new(cli.start_lat, cli.start_lon), cli.radius)?;
    let target = closest(&router, GeoCoord::new(cli.end_lat, cli.end_lon), cli.radius)?;

    let result = router.calculate_route(start, target, &RoutingParameter::default())?;
    log::info!("route found, costs {:.4}", result.costs);

    if cli.describe {
        let mut description = router.transform_route_data_to_description(&result.route_data)?;
        router.postprocess_route_description(&mut description, &Pass::default_list("start", "target"), None)?;
        print_description(&description);
    } else {
        print_geojson(&router.transform_route_data_to_points(&result.route_data));
    }

    Ok(())
}

fn closest(router: &MultiDbRouter, coord: GeoCoord, radius: f64) -> Result<RoutePosition, Box<dyn Error>> {
    match router.closest_routable_node(coord, radius)? {
        Some(found) => {
            log::info!("{coord} snapped to {:?} at {:.3} km", found.name, found.distance);
            Ok(found.position)
        }
        None => Err(CliError::NoRoutableNode { coord, radius }.into()),
    }
}

fn print_description(description: &RouteDescription) {
    for node in description.iter() {
        for d in &node.descriptions {
            println!("{:8.3} km {:6.1} min  {d}", node.distance, node.time * 60.0);
        }
    }
}

fn print_geojson(points: &[GeoCoord]) {
    println!("{{");
    println!("  \"type\": \"FeatureCollection\",");
    println!("  \"features\": [");
    println!("    {{");
    println!("      \"type\": \"Feature\",");
    println!("      \"properties\": {{}},");

    println!("      \"geometry\": {{");
    println!("        \"type\": \"LineString\",");
    println!("        \"coordinates\": [");

    let mut points = points.iter().peekable();
    while let Some(p) = points.next() {
        let suffix = if points.peek().is_some() { "," } else { "" };
        println!("          [{}, {}]{}", p.lon, p.lat, suffix);
    }

    println!("        ]");
    println!("      }}");
    println!("    }}");
    println!("  ]");
    println!("}}");
}
