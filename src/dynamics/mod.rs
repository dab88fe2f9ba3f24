mod contact;
mod engine;
mod inputs;
mod propagator;

pub use contact::{ContactConstraint, ContactSolver};
pub use engine::AccelerationEngine;
pub use inputs::{AccelInputs, GravityModel};
pub use propagator::Propagator;
