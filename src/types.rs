// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

/// Vehicle class used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vehicle {
    Foot,
    Bicycle,
    Car,
}

impl Vehicle {
    pub const ALL: [Vehicle; 3] = [Vehicle::Foot, Vehicle::Bicycle, Vehicle::Car];

    /// Bit of [Path::flags](crate::graph::Path::flags) set when the path may be used by this vehicle.
    pub const fn usable_bit(self) -> u8 {
        match self {
            Vehicle::Foot => 1 << 0,
            Vehicle::Bicycle => 1 << 1,
            Vehicle::Car => 1 << 2,
        }
    }

    /// Bit of [Path::flags](crate::graph::Path::flags) set when the path is
    /// restricted (e.g. private access) for this vehicle.
    pub const fn restricted_bit(self) -> u8 {
        match self {
            Vehicle::Foot => 1 << 3,
            Vehicle::Bicycle => 1 << 4,
            Vehicle::Car => 1 << 5,
        }
    }
}

impl std::str::FromStr for Vehicle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "foot" => Ok(Vehicle::Foot),
            "bicycle" => Ok(Vehicle::Bicycle),
            "car" => Ok(Vehicle::Car),
            _ => Err(format!("unknown vehicle: {s:?} (expected foot, bicycle or car)")),
        }
    }
}

impl std::fmt::Display for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foot => write!(f, "foot"),
            Self::Bicycle => write!(f, "bicycle"),
            Self::Car => write!(f, "car"),
        }
    }
}

/// Index of a road/area type inside a [TypeConfig].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TypeId(pub u16);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Describes one object type, e.g. "highway_primary".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: String,
    /// Bitmask of [Vehicle::usable_bit] values - which vehicles may route over objects of this type.
    pub routable: u8,
}

impl TypeInfo {
    pub fn can_route(&self, vehicle: Vehicle) -> bool {
        self.routable & vehicle.usable_bit() != 0
    }
}

/// Set of object types known to one database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeConfig {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeId>,
}

impl TypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new type and returns its id. Registering a name twice
    /// returns the already assigned id.
    pub fn register(&mut self, name: &str, routable: u8) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }

        let id = TypeId(self.types.len() as u16);
        self.types.push(TypeInfo {
            id,
            name: name.to_string(),
            routable,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeInfo> {
        self.by_name.get(name).and_then(|&id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut types = TypeConfig::new();
        let a = types.register("highway_primary", Vehicle::Car.usable_bit());
        let b = types.register("highway_footway", Vehicle::Foot.usable_bit());
        assert_eq!(types.register("highway_primary", 0), a);
        assert_ne!(a, b);
        assert_eq!(types.len(), 2);
        assert!(types.by_name("highway_primary").unwrap().can_route(Vehicle::Car));
        assert!(!types.by_name("highway_footway").unwrap().can_route(Vehicle::Car));
    }

    #[test]
    fn vehicle_bits_are_disjoint() {
        let mut seen = 0u8;
        for v in Vehicle::ALL {
            assert_eq!(seen & v.usable_bit(), 0);
            seen |= v.usable_bit();
            assert_eq!(seen & v.restricted_bit(), 0);
            seen |= v.restricted_bit();
        }
    }
}
