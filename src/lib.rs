mod dynamics;
mod model;
mod state;
mod trim;
pub mod utils;

pub use dynamics::{
    AccelInputs, AccelerationEngine, ContactConstraint, ContactSolver, GravityModel, Propagator,
};
pub use model::{
    AirData, AngleOutcome, FlightControl, FlightControls, FlightModel, ForceMoment, ForceModel,
    GroundModel, InitialConditions, MassProperties, NoGround, Simulation,
};
pub use state::RigidBodyState;
pub use trim::{
    AxisReport, AxisStats, AxisTrimmer, ControlRange, ControlVariable, NelderMead, SimplexConfig,
    SimplexStatus, SimplexTrim, SimplexTrimConfig, StateVariable, TrimChannel, TrimConstraints,
    TrimCost, TrimMode, TrimObjective, TrimReport, TrimSolution, TrimStats,
};
pub use utils::errors::SimError;
pub use utils::rng::{RngManager, WithRng};
