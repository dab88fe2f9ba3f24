use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid-body state advanced once per integration step by the propagator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigidBodyState {
    /// Position in the planet-fixed (ECEF) frame [m]
    pub position: Vector3<f64>,

    /// Attitude quaternion (rotation from inertial to body frame)
    pub attitude: UnitQuaternion<f64>,

    /// Velocity relative to the planet, expressed in body frame [m/s]
    pub velocity: Vector3<f64>,

    /// Angular velocity relative to the planet, expressed in body frame [rad/s]
    pub angular_velocity: Vector3<f64>,
}

impl Default for RigidBodyState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            attitude: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

impl RigidBodyState {
    pub fn new(
        position: Vector3<f64>,
        attitude: UnitQuaternion<f64>,
        velocity: Vector3<f64>,
        angular_velocity: Vector3<f64>,
    ) -> Self {
        Self {
            position,
            attitude,
            velocity,
            angular_velocity,
        }
    }

    /// Create a state at a specific position, at rest
    pub fn at_position(position: Vector3<f64>) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}
