// Local participant state source

use crate::telegram::EntityState;

/// Radius of the built-in demo orbit, in meters.
const ORBIT_RADIUS_M: f64 = 100.0;

/// Time for one full orbit, in seconds.
const ORBIT_PERIOD_S: f64 = 20.0;

/// Bank angle held through the turn, in degrees.
const ORBIT_BANK_DEG: f64 = 15.0;

/// Meters per degree of latitude.
const M_PER_DEG_LAT: f64 = 111_320.0;

/// Where the local participant's state comes from each render tick.
/// A real deployment feeds this from the host simulation; the built-in
/// source below flies a canned pattern.
pub trait OwnStateSource: Send + Sync {
    /// Current state stamped with `now_ms`. Elevation in meters.
    fn current_state(&mut self, now_ms: i64) -> EntityState;
}

/// Flies a level clockwise circle around a fixed center. Stands in for a
/// real position feed in demo and soak runs.
pub struct OrbitSource {
    center_lat: f64,
    center_lon: f64,
    elevation_m: f64,
}

impl OrbitSource {
    pub fn new(center_lat: f64, center_lon: f64, elevation_m: f64) -> Self {
        OrbitSource {
            center_lat,
            center_lon,
            elevation_m,
        }
    }
}

impl OwnStateSource for OrbitSource {
    fn current_state(&mut self, now_ms: i64) -> EntityState {
        let phase = (now_ms as f64 / 1000.0) * std::f64::consts::TAU / ORBIT_PERIOD_S;

        let lat_per_m = 1.0 / M_PER_DEG_LAT;
        // Longitude degrees shrink with the cosine of latitude; clamp so
        // a polar center cannot divide by zero.
        let lon_per_m = lat_per_m / self.center_lat.to_radians().cos().max(0.01);

        let lat = self.center_lat + phase.cos() * ORBIT_RADIUS_M * lat_per_m;
        let lon = self.center_lon + phase.sin() * ORBIT_RADIUS_M * lon_per_m;

        // Velocity points along the tangent; compass heading is the angle
        // of (east, north) measured from north.
        let east = phase.cos();
        let north = -phase.sin();
        let heading = east.atan2(north).to_degrees().rem_euclid(360.0);

        EntityState {
            timestamp: now_ms,
            lat,
            lon,
            el: self.elevation_m,
            pitch: 0.0,
            roll: ORBIT_BANK_DEG,
            heading,
        }
    }
}
