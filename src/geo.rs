use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS: f64 = 6371000.0; // unit: meter

// WGS84 ellipsoid.
pub const WGS84_SEMI_MAJOR_AXIS: f64 = 6378137.0;
pub const WGS84_FLATTENING: f64 = 1.0 / 298.257223563;

/// Great-circle distance in meters between two (lat, lng) pairs, haversine
/// on the mean-radius sphere. Symmetric, and zero for identical inputs.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS * c
}

/// Earth-Centered-Earth-Fixed Cartesian coordinates, in meters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EcefPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EcefPoint {
    pub fn sub(&self, other: &EcefPoint) -> EcefPoint {
        EcefPoint {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    pub fn cross(&self, other: &EcefPoint) -> EcefPoint {
        EcefPoint {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// WGS84 geodetic to ECEF. Altitude is meters above the ellipsoid. Used
/// wherever a perpendicular/geometric distance must stay undistorted
/// across latitudes.
pub fn to_ecef(lat: f64, lng: f64, altitude: f64) -> EcefPoint {
    let lat_rad = lat.to_radians();
    let lng_rad = lng.to_radians();
    let e2 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
    let n = WGS84_SEMI_MAJOR_AXIS / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();
    EcefPoint {
        x: (n + altitude) * lat_rad.cos() * lng_rad.cos(),
        y: (n + altitude) * lat_rad.cos() * lng_rad.sin(),
        z: (n * (1.0 - e2) + altitude) * lat_rad.sin(),
    }
}

/// Perpendicular distance in meters from `p` to the chord `a`..`b`, all in
/// the ECEF frame. Falls back to the point distance when the chord is
/// degenerate.
pub fn point_to_chord_distance(p: &EcefPoint, a: &EcefPoint, b: &EcefPoint) -> f64 {
    let ab = b.sub(a);
    let chord_len = ab.norm();
    if chord_len == 0.0 {
        return p.sub(a).norm();
    }
    p.sub(a).cross(&ab).norm() / chord_len
}

/// Axis-aligned geographic bounds. The invalid box is the identity for
/// `merge` and what `from_points` yields for empty input.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub valid: bool,
}

impl BoundingBox {
    pub fn invalid() -> Self {
        BoundingBox {
            north: -90.0,
            south: 90.0,
            east: -180.0,
            west: 180.0,
            valid: false,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut bounds = BoundingBox::invalid();
        for (lat, lng) in points {
            bounds.extend(lat, lng);
        }
        bounds
    }

    pub fn extend(&mut self, lat: f64, lng: f64) {
        if self.valid {
            self.north = self.north.max(lat);
            self.south = self.south.min(lat);
            self.east = self.east.max(lng);
            self.west = self.west.min(lng);
        } else {
            self.north = lat;
            self.south = lat;
            self.east = lng;
            self.west = lng;
            self.valid = true;
        }
    }

    pub fn merge(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
        match (a.valid, b.valid) {
            (false, _) => *b,
            (_, false) => *a,
            (true, true) => BoundingBox {
                north: a.north.max(b.north),
                south: a.south.min(b.south),
                east: a.east.max(b.east),
                west: a.west.min(b.west),
                valid: true,
            },
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.valid
            && lat >= self.south
            && lat <= self.north
            && lng >= self.west
            && lng <= self.east
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox::invalid()
    }
}
