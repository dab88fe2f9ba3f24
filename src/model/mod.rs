mod ic;
mod simulation;
mod traits;

pub use ic::{AngleOutcome, InitialConditions};
pub use simulation::Simulation;
pub use traits::{
    AirData, FlightControl, FlightControls, FlightModel, ForceMoment, ForceModel, GroundModel,
    MassProperties, NoGround,
};
