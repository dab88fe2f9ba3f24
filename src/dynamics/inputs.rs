use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Gravity model used when computing translational accelerations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GravityModel {
    /// Inverse-square attraction computed from the inertial position and a
    /// gravitational parameter [m^3/s^2]
    InverseSquare { gm: f64 },

    /// Use the precomputed planet-frame gravity vector carried in the inputs
    /// (e.g. an ellipsoidal gravity field evaluated by the caller)
    Precomputed,
}

impl Default for GravityModel {
    fn default() -> Self {
        GravityModel::Precomputed
    }
}

/// Per-step snapshot of everything the acceleration engine reads.
///
/// Assembled once per macro-step by the caller from the force, mass and
/// ground-reaction providers. The engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelInputs {
    /// Vehicle mass [kg]
    pub mass: f64,
    /// Inertia tensor in body frame [kg m^2]
    pub inertia: Matrix3<f64>,
    /// Inverse inertia tensor
    pub inertia_inv: Matrix3<f64>,

    /// Net body-frame force, gravity excluded [N]
    pub force: Vector3<f64>,
    /// Net body-frame moment [N m]
    pub moment: Vector3<f64>,
    /// Ground-reaction share of `force`, kept for reporting [N]
    pub ground_force: Vector3<f64>,
    /// Ground-reaction share of `moment`, kept for reporting [N m]
    pub ground_moment: Vector3<f64>,

    /// Gravity acceleration in the planet-fixed frame [m/s^2]
    pub grav_accel: Vector3<f64>,

    /// Attitude quaternion (inertial to body)
    pub attitude: UnitQuaternion<f64>,
    /// Inertial-to-body transform
    pub ti2b: Matrix3<f64>,
    /// Body-to-inertial transform
    pub tb2i: Matrix3<f64>,
    /// Planet-fixed-to-body transform
    pub tec2b: Matrix3<f64>,
    /// Planet-fixed-to-inertial transform
    pub tec2i: Matrix3<f64>,

    /// Body rates relative to the planet-fixed frame [rad/s]
    pub pqr: Vector3<f64>,
    /// Body rates relative to the inertial frame, expressed in body axes [rad/s]
    pub pqri: Vector3<f64>,
    /// Body-frame velocity relative to the planet [m/s]
    pub uvw: Vector3<f64>,
    /// Position in the inertial frame [m]
    pub inertial_position: Vector3<f64>,
    /// Planet angular velocity, expressed in the inertial frame [rad/s]
    pub omega_planet: Vector3<f64>,

    /// Terrain linear velocity in the planet-fixed frame [m/s]
    pub terrain_velocity: Vector3<f64>,
    /// Terrain angular velocity in the planet-fixed frame [rad/s]
    pub terrain_angular_velocity: Vector3<f64>,

    /// Timestep for this step [s]; zero resolves contacts without the
    /// velocity-error correction
    pub dt: f64,
}

impl Default for AccelInputs {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Matrix3::identity(),
            inertia_inv: Matrix3::identity(),
            force: Vector3::zeros(),
            moment: Vector3::zeros(),
            ground_force: Vector3::zeros(),
            ground_moment: Vector3::zeros(),
            grav_accel: Vector3::zeros(),
            attitude: UnitQuaternion::identity(),
            ti2b: Matrix3::identity(),
            tb2i: Matrix3::identity(),
            tec2b: Matrix3::identity(),
            tec2i: Matrix3::identity(),
            pqr: Vector3::zeros(),
            pqri: Vector3::zeros(),
            uvw: Vector3::zeros(),
            inertial_position: Vector3::zeros(),
            omega_planet: Vector3::zeros(),
            terrain_velocity: Vector3::zeros(),
            terrain_angular_velocity: Vector3::zeros(),
            dt: 0.0,
        }
    }
}

impl AccelInputs {
    /// Snapshot with the given mass properties; everything else at rest.
    pub fn new(mass: f64, inertia: Matrix3<f64>) -> Self {
        let inertia_inv = inertia.try_inverse().unwrap_or(Matrix3::identity());
        Self {
            mass,
            inertia,
            inertia_inv,
            ..Default::default()
        }
    }
}
