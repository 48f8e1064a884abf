//! Geofenced random walk.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::config::BoundingBox;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Equirectangular distance, accurate enough at walking scale.
    pub fn distance_m(&self, other: &Position) -> f64 {
        let mean_lat = ((self.latitude + other.latitude) / 2.0).to_radians();
        let dy = (other.latitude - self.latitude) * METERS_PER_DEGREE_LAT;
        let dx = (other.longitude - self.longitude) * METERS_PER_DEGREE_LAT * mean_lat.cos();
        (dx * dx + dy * dy).sqrt()
    }
}

/// Walks a cane around inside a bounding box.
#[derive(Debug, Clone)]
pub struct GeofencedWalk {
    bounds: BoundingBox,
    step_meters: f64,
}

impl GeofencedWalk {
    /// Step lengths are drawn from a normal distribution centred on
    /// `step_meters` with a 30% spread.
    pub fn new(bounds: BoundingBox, step_meters: f64) -> Self {
        let step_meters = if step_meters.is_finite() { step_meters.max(0.0) } else { 0.0 };
        Self { bounds, step_meters }
    }

    /// Uniformly random start point inside the box.
    pub fn random_start<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let b = &self.bounds;
        Position::new(
            sample_between(rng, b.min_lat, b.max_lat),
            sample_between(rng, b.min_lon, b.max_lon),
        )
    }

    /// One step in a random heading. The result is always inside the box.
    pub fn step<R: Rng + ?Sized>(&self, rng: &mut R, from: Position) -> Position {
        let noise: f64 = StandardNormal.sample(rng);
        let distance = (self.step_meters * (1.0 + 0.3 * noise)).abs();
        let heading = rng.gen_range(0.0..std::f64::consts::TAU);

        let d_lat = distance * heading.cos() / METERS_PER_DEGREE_LAT;
        let meters_per_degree_lon = METERS_PER_DEGREE_LAT * from.latitude.to_radians().cos().max(1e-6);
        let d_lon = distance * heading.sin() / meters_per_degree_lon;

        Position::new(
            reflect(from.latitude + d_lat, self.bounds.min_lat, self.bounds.max_lat),
            reflect(from.longitude + d_lon, self.bounds.min_lon, self.bounds.max_lon),
        )
    }
}

fn sample_between<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

/// Mirrors `value` back into `[min, max]`.
pub fn reflect(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span <= 0.0 {
        return min;
    }
    // fold onto a 2*span period, then mirror the upper half
    let offset = (value - min).rem_euclid(2.0 * span);
    let folded = if offset > span { 2.0 * span - offset } else { offset };
    (min + folded).clamp(min, max)
}
