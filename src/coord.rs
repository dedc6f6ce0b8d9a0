// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::graph::NodeId;

/// Fixed-point scale used when coordinates are stored or turned into [NodeIds](NodeId).
pub const COORD_SCALE: f64 = 10_000_000.0;

/// Approximate length of one degree of latitude, in kilometers.
const KM_PER_DEGREE: f64 = 111.32;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoord {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns the fixed-point representation of the position, as stored in database files.
    /// Latitude and longitude are shifted into the positive range before scaling.
    pub fn to_fixed(self) -> (u32, u32) {
        let lat = ((self.lat + 90.0) * COORD_SCALE).round();
        let lon = ((self.lon + 180.0) * COORD_SCALE).round();
        (
            lat.clamp(0.0, u32::MAX as f64) as u32,
            lon.clamp(0.0, u32::MAX as f64) as u32,
        )
    }

    /// Inverse of [GeoCoord::to_fixed].
    pub fn from_fixed(lat: u32, lon: u32) -> Self {
        Self {
            lat: lat as f64 / COORD_SCALE - 90.0,
            lon: lon as f64 / COORD_SCALE - 180.0,
        }
    }

    /// Returns the position rounded to the stored precision.
    pub fn quantized(self) -> Self {
        let (lat, lon) = self.to_fixed();
        Self::from_fixed(lat, lon)
    }

    /// Derives the stable id of a route node placed at this position.
    ///
    /// Two positions which are equal after [quantization](GeoCoord::quantized)
    /// always produce the same id, which is what allows recognizing
    /// the same junction in independently built databases.
    pub fn node_id(self) -> NodeId {
        let (lat, lon) = self.to_fixed();
        NodeId(((lat as u64) << 32) | lon as u64)
    }
}

impl std::fmt::Display for GeoCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.7} {:.7}", self.lat, self.lon)
    }
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoBox {
    pub min: GeoCoord,
    pub max: GeoCoord,
}

impl GeoBox {
    /// Returns an empty box, which grows to fit the first included point.
    pub const fn invalid() -> Self {
        Self {
            min: GeoCoord::new(f64::INFINITY, f64::INFINITY),
            max: GeoCoord::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.lat <= self.max.lat && self.min.lon <= self.max.lon
    }

    /// Returns a box covering all points within `radius` kilometers from `center`.
    pub fn around(center: GeoCoord, radius: f64) -> Self {
        let dlat = radius / KM_PER_DEGREE;
        let cos = center.lat.to_radians().cos().max(1e-6);
        let dlon = (radius / (KM_PER_DEGREE * cos)).min(180.0);
        Self {
            min: GeoCoord::new(center.lat - dlat, center.lon - dlon),
            max: GeoCoord::new(center.lat + dlat, center.lon + dlon),
        }
    }

    pub fn include(&mut self, c: GeoCoord) {
        self.min.lat = self.min.lat.min(c.lat);
        self.min.lon = self.min.lon.min(c.lon);
        self.max.lat = self.max.lat.max(c.lat);
        self.max.lon = self.max.lon.max(c.lon);
    }

    pub fn contains(&self, c: GeoCoord) -> bool {
        c.lat >= self.min.lat && c.lat <= self.max.lat && c.lon >= self.min.lon && c.lon <= self.max.lon
    }

    pub fn intersects(&self, other: &GeoBox) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.min.lat <= other.max.lat
            && other.min.lat <= self.max.lat
            && self.min.lon <= other.max.lon
            && other.min.lon <= self.max.lon
    }
}
