use nalgebra::UnitQuaternion;

use super::engine::AccelerationEngine;
use crate::state::RigidBodyState;

/// Explicit Euler integrator for a rigid-body state.
///
/// The attitude quaternion is advanced with the raw derivative from the
/// engine and renormalized afterwards, so the stored attitude is unit length
/// after every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Propagator;

impl Propagator {
    pub fn advance(&self, state: &mut RigidBodyState, engine: &AccelerationEngine, dt: f64) {
        let tec2b = engine.inputs().tec2b;
        state.position += tec2b.transpose() * state.velocity * dt;
        state.velocity += engine.uvw_dot() * dt;
        state.angular_velocity += engine.pqr_dot() * dt;

        let q = state.attitude.into_inner() + engine.quat_dot() * dt;
        state.attitude = UnitQuaternion::new_normalize(q);
    }
}
