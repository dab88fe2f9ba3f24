pub const GRAVITY: f64 = 9.80665; // m/s^2
pub const PLANET_RADIUS: f64 = 6_371_000.0; // m, spherical planet
pub const PLANET_ROTATION_RATE: f64 = 7.292115e-5; // rad/s

pub const SEA_LEVEL_DENSITY: f64 = 1.225; // kg/m^3
pub const DENSITY_SCALE_HEIGHT: f64 = 8500.0; // m
