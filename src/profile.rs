// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::database::RoutableObject;
use crate::graph::{RouteNode, VariantTable};
use crate::{TypeConfig, TypeId, Vehicle};

/// Default distance (in km) added to the straight-line distance when computing
/// [CostModel::cost_limit].
pub const DEFAULT_COST_LIMIT_DISTANCE: f64 = 10.0;

/// Default multiplier of the straight-line costs when computing [CostModel::cost_limit].
pub const DEFAULT_COST_LIMIT_FACTOR: f64 = 5.0;

/// Example speeds (km/h) of car-routable road types, used with [RoutingProfile::for_car].
pub const CAR_SPEEDS: &[(&str, f64)] = &[
    ("highway_motorway", 110.0),
    ("highway_motorway_trunk", 100.0),
    ("highway_motorway_primary", 70.0),
    ("highway_motorway_link", 60.0),
    ("highway_motorway_junction", 60.0),
    ("highway_trunk", 100.0),
    ("highway_trunk_link", 60.0),
    ("highway_primary", 70.0),
    ("highway_primary_link", 60.0),
    ("highway_secondary", 60.0),
    ("highway_secondary_link", 50.0),
    ("highway_tertiary", 55.0),
    ("highway_tertiary_link", 55.0),
    ("highway_unclassified", 50.0),
    ("highway_road", 50.0),
    ("highway_residential", 40.0),
    ("highway_roundabout", 40.0),
    ("highway_living_street", 10.0),
    ("highway_service", 30.0),
];

/// Default speed of bicycles, in km/h.
pub const BICYCLE_SPEED: f64 = 20.0;

/// Default walking speed, in km/h.
pub const FOOT_SPEED: f64 = 5.0;

/// Error which can occur when parametrizing a [RoutingProfile].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("no speed defined for routable type {0:?}")]
    MissingSpeed(String),
}

/// Maps graph edges and objects to traversal costs for one vehicle.
///
/// Costs are abstract, non-negative numbers. [CostModel::estimate_costs] must never
/// exceed the costs of any route covering the given straight-line distance,
/// otherwise route search loses optimality.
pub trait CostModel: std::fmt::Debug + Send + Sync {
    fn vehicle(&self) -> Vehicle;

    /// Checks if `node.paths[path_index]` may be used by the vehicle.
    fn can_use(&self, node: &RouteNode, variants: &VariantTable, path_index: usize) -> bool;

    /// Costs of traversing `node.paths[path_index]`.
    fn costs(&self, node: &RouteNode, variants: &VariantTable, path_index: usize) -> f64;

    /// Checks if the vehicle may use objects of the given type.
    fn can_use_type(&self, type_id: TypeId) -> bool;

    /// Checks if the vehicle may use the object at all, ignoring direction.
    fn can_use_object(&self, object: &RoutableObject) -> bool {
        self.can_use_type(object.type_id())
    }

    /// Checks if the object may be traversed in the order of its nodes.
    fn can_use_forward(&self, object: &RoutableObject) -> bool {
        self.can_use_object(object) && object.access().can_use_forward(self.vehicle())
    }

    /// Checks if the object may be traversed against the order of its nodes.
    fn can_use_backward(&self, object: &RoutableObject) -> bool {
        self.can_use_object(object) && object.access().can_use_backward(self.vehicle())
    }

    /// Costs of traversing `distance` km along the object.
    fn object_costs(&self, object: &RoutableObject, distance: f64) -> f64;

    /// Time (in hours) needed to travel `distance` km along the object.
    fn time(&self, object: &RoutableObject, distance: f64) -> f64;

    /// Lower bound of the costs of covering a straight-line `distance` (km).
    fn estimate_costs(&self, distance: f64) -> f64;

    fn cost_limit_distance(&self) -> f64 {
        DEFAULT_COST_LIMIT_DISTANCE
    }

    fn cost_limit_factor(&self) -> f64 {
        DEFAULT_COST_LIMIT_FACTOR
    }

    /// Maximum costs a route between points `distance` km apart may have,
    /// before the search gives up.
    fn cost_limit(&self, distance: f64) -> f64 {
        self.estimate_costs(self.cost_limit_distance())
            + self.estimate_costs(distance) * self.cost_limit_factor()
    }
}

/// How [RoutingProfile] computes costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostStrategy {
    /// Costs are travel times in hours.
    #[default]
    Fastest,
    /// Costs are distances in kilometers.
    Shortest,
}

/// [CostModel] backed by a table of speeds per object type.
///
/// Types with no (or zero) speed are not routable. The speed of an edge is the signposted
/// max speed of its object if known, otherwise the speed of its type; and is always capped
/// by the vehicle's max speed and by the highest speed in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingProfile {
    vehicle: Vehicle,
    strategy: CostStrategy,
    speeds: Vec<f64>,
    max_speed: f64,
    vehicle_max_speed: f64,
    cost_limit_distance: f64,
    cost_limit_factor: f64,
}

impl RoutingProfile {
    pub fn new(vehicle: Vehicle, strategy: CostStrategy) -> Self {
        Self {
            vehicle,
            strategy,
            speeds: Vec::new(),
            max_speed: 0.0,
            vehicle_max_speed: f64::MAX,
            cost_limit_distance: DEFAULT_COST_LIMIT_DISTANCE,
            cost_limit_factor: DEFAULT_COST_LIMIT_FACTOR,
        }
    }

    /// Creates a fastest-path car profile. Every car-routable type of `types` must
    /// have a speed in `speed_table`.
    pub fn for_car(
        types: &TypeConfig,
        speed_table: &[(&str, f64)],
        max_speed: f64,
    ) -> Result<Self, ProfileError> {
        let mut p = Self::new(Vehicle::Car, CostStrategy::Fastest);
        p.set_vehicle_max_speed(max_speed);

        for t in types.iter().filter(|t| t.can_route(Vehicle::Car)) {
            let Some(&(_, speed)) = speed_table.iter().find(|(name, _)| *name == t.name) else {
                log::error!("no speed for type {:?} defined", t.name);
                return Err(ProfileError::MissingSpeed(t.name.clone()));
            };
            p.add_type(t.id, speed);
        }

        Ok(p)
    }

    /// Creates a fastest-path bicycle profile, with the same speed for all bicycle-routable types.
    pub fn for_bicycle(types: &TypeConfig, speed: f64) -> Self {
        Self::uniform(Vehicle::Bicycle, types, speed)
    }

    /// Creates a fastest-path foot profile, with the same speed for all walkable types.
    pub fn for_foot(types: &TypeConfig, speed: f64) -> Self {
        Self::uniform(Vehicle::Foot, types, speed)
    }

    fn uniform(vehicle: Vehicle, types: &TypeConfig, speed: f64) -> Self {
        let mut p = Self::new(vehicle, CostStrategy::Fastest);
        p.set_vehicle_max_speed(speed);
        for t in types.iter().filter(|t| t.can_route(vehicle)) {
            p.add_type(t.id, speed);
        }
        p
    }

    /// Makes objects of the given type routable with the given speed (km/h).
    pub fn add_type(&mut self, type_id: TypeId, speed: f64) {
        if type_id.index() >= self.speeds.len() {
            self.speeds.resize(type_id.index() + 1, 0.0);
        }
        self.speeds[type_id.index()] = speed;
        self.max_speed = self.speeds.iter().copied().fold(0.0, f64::max);
    }

    pub fn set_strategy(&mut self, strategy: CostStrategy) {
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> CostStrategy {
        self.strategy
    }

    pub fn set_vehicle_max_speed(&mut self, speed: f64) {
        self.vehicle_max_speed = speed;
    }

    pub fn set_cost_limit_distance(&mut self, distance: f64) {
        self.cost_limit_distance = distance;
    }

    pub fn set_cost_limit_factor(&mut self, factor: f64) {
        self.cost_limit_factor = factor;
    }

    fn type_speed(&self, type_id: TypeId) -> f64 {
        self.speeds.get(type_id.index()).copied().unwrap_or_default()
    }

    fn speed(&self, type_id: TypeId, max_speed: u8) -> f64 {
        let speed = if max_speed > 0 {
            max_speed as f64
        } else {
            self.type_speed(type_id)
        };
        speed.min(self.vehicle_max_speed).min(self.max_speed)
    }

    fn costs_for(&self, type_id: TypeId, max_speed: u8, distance: f64) -> f64 {
        match self.strategy {
            CostStrategy::Shortest => distance,
            CostStrategy::Fastest => {
                let speed = self.speed(type_id, max_speed);
                if speed > 0.0 {
                    distance / speed
                } else {
                    f64::INFINITY
                }
            }
        }
    }
}

impl CostModel for RoutingProfile {
    fn vehicle(&self) -> Vehicle {
        self.vehicle
    }

    fn can_use(&self, node: &RouteNode, variants: &VariantTable, path_index: usize) -> bool {
        let Some(path) = node.paths.get(path_index) else {
            return false;
        };
        path.is_usable(self.vehicle)
            && node
                .path_variant(path_index)
                .and_then(|idx| variants.get(idx))
                .is_some_and(|v| self.type_speed(v.type_id) > 0.0)
    }

    fn costs(&self, node: &RouteNode, variants: &VariantTable, path_index: usize) -> f64 {
        let Some(path) = node.paths.get(path_index) else {
            return f64::INFINITY;
        };
        match node.path_variant(path_index).and_then(|idx| variants.get(idx)) {
            Some(v) => self.costs_for(v.type_id, v.max_speed, path.distance),
            None => f64::INFINITY,
        }
    }

    fn can_use_type(&self, type_id: TypeId) -> bool {
        self.type_speed(type_id) > 0.0
    }

    fn object_costs(&self, object: &RoutableObject, distance: f64) -> f64 {
        self.costs_for(object.type_id(), object.max_speed(), distance)
    }

    fn time(&self, object: &RoutableObject, distance: f64) -> f64 {
        let speed = self.speed(object.type_id(), object.max_speed());
        if speed > 0.0 {
            distance / speed
        } else {
            0.0
        }
    }

    fn estimate_costs(&self, distance: f64) -> f64 {
        match self.strategy {
            CostStrategy::Shortest => distance,
            CostStrategy::Fastest => {
                let speed = self.max_speed.min(self.vehicle_max_speed);
                if speed > 0.0 {
                    distance / speed
                } else {
                    0.0
                }
            }
        }
    }

    fn cost_limit_distance(&self) -> f64 {
        self.cost_limit_distance
    }

    fn cost_limit_factor(&self) -> f64 {
        self.cost_limit_factor
    }
}
