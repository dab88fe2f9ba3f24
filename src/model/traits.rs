use std::ops::{Add, AddAssign};

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::dynamics::ContactConstraint;
use crate::model::ic::InitialConditions;
use crate::state::RigidBodyState;
use crate::utils::constants::GRAVITY;
use crate::utils::errors::SimError;

/// Instantaneous air data handed to the force models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AirData {
    pub true_airspeed: f64,
    pub alpha: f64,
    pub beta: f64,
    pub dynamic_pressure: f64,
    pub density: f64,
    pub relative_velocity: Vector3<f64>,
}

impl Default for AirData {
    fn default() -> Self {
        Self {
            true_airspeed: 0.0,
            alpha: 0.0,
            beta: 0.0,
            dynamic_pressure: 0.0,
            density: crate::utils::constants::SEA_LEVEL_DENSITY,
            relative_velocity: Vector3::zeros(),
        }
    }
}

/// Pilot-side control positions. Surfaces and trim tabs are normalized to
/// [-1, 1], throttle to [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FlightControls {
    pub throttle: f64,
    pub elevator: f64,
    pub aileron: f64,
    pub rudder: f64,
    pub pitch_trim: f64,
    pub roll_trim: f64,
    pub yaw_trim: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightControl {
    Throttle,
    Elevator,
    Aileron,
    Rudder,
    PitchTrim,
    RollTrim,
    YawTrim,
}

impl FlightControl {
    pub const ALL: [FlightControl; 7] = [
        FlightControl::Throttle,
        FlightControl::Elevator,
        FlightControl::Aileron,
        FlightControl::Rudder,
        FlightControl::PitchTrim,
        FlightControl::RollTrim,
        FlightControl::YawTrim,
    ];
}

impl FlightControls {
    pub fn get(&self, control: FlightControl) -> f64 {
        match control {
            FlightControl::Throttle => self.throttle,
            FlightControl::Elevator => self.elevator,
            FlightControl::Aileron => self.aileron,
            FlightControl::Rudder => self.rudder,
            FlightControl::PitchTrim => self.pitch_trim,
            FlightControl::RollTrim => self.roll_trim,
            FlightControl::YawTrim => self.yaw_trim,
        }
    }

    pub fn set(&mut self, control: FlightControl, value: f64) {
        match control {
            FlightControl::Throttle => self.throttle = value,
            FlightControl::Elevator => self.elevator = value,
            FlightControl::Aileron => self.aileron = value,
            FlightControl::Rudder => self.rudder = value,
            FlightControl::PitchTrim => self.pitch_trim = value,
            FlightControl::RollTrim => self.roll_trim = value,
            FlightControl::YawTrim => self.yaw_trim = value,
        }
    }
}

/// A force and a moment in body axes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ForceMoment {
    pub force: Vector3<f64>,
    pub moment: Vector3<f64>,
}

impl ForceMoment {
    pub fn new(force: Vector3<f64>, moment: Vector3<f64>) -> Self {
        Self { force, moment }
    }
}

impl Add for ForceMoment {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            force: self.force + rhs.force,
            moment: self.moment + rhs.moment,
        }
    }
}

impl AddAssign for ForceMoment {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.moment += rhs.moment;
    }
}

/// Mass and inertia of the vehicle, with the inverse cached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub inertia: Matrix3<f64>,
    pub inertia_inv: Matrix3<f64>,
}

impl MassProperties {
    pub fn new(mass: f64, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            inertia,
            inertia_inv: inertia.try_inverse().unwrap_or_else(Matrix3::identity),
        }
    }
}

/// Applied forces and moments, gravity excluded.
pub trait ForceModel {
    fn forces(
        &mut self,
        state: &RigidBodyState,
        air: &AirData,
        controls: &FlightControls,
    ) -> ForceMoment;

    /// Drive internal states (engine spool and the like) to their steady
    /// values for the current controls.
    fn stabilize(&mut self, air: &AirData, controls: &FlightControls) {
        let _ = (air, controls);
    }

    /// Usable angle-of-attack range [rad], when the model knows one.
    fn alpha_limits(&self) -> Option<(f64, f64)> {
        None
    }
}

/// Ground reactions: the spring/damper share returned directly, plus the
/// friction constraint list the contact solver works on.
pub trait GroundModel {
    fn reactions(
        &mut self,
        state: &RigidBodyState,
        altitude_agl: f64,
        constraints: &mut Vec<ContactConstraint>,
    ) -> ForceMoment;
}

/// Ground model for vehicles that never touch down.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGround;

impl GroundModel for NoGround {
    fn reactions(
        &mut self,
        _state: &RigidBodyState,
        _altitude_agl: f64,
        constraints: &mut Vec<ContactConstraint>,
    ) -> ForceMoment {
        constraints.clear();
        ForceMoment::default()
    }
}

/// Evaluation seam the trim algorithms drive.
///
/// A trim pass repeatedly rebuilds the model from an initial-condition
/// record, evaluates one step and reads accelerations back, so `reinitialize`
/// followed by `run` must be cheap and free of hidden carry-over.
pub trait FlightModel {
    /// Rebuild the dynamic state from the record. Does not evaluate
    /// anything; call `run` for that.
    fn reinitialize(&mut self, ic: &InitialConditions) -> Result<(), SimError>;

    /// Evaluate one step. While integration is suspended this refreshes
    /// every derivative without moving the state.
    fn run(&mut self) -> Result<(), SimError>;

    /// Re-derive the accelerations from the last evaluated inputs so the
    /// first integration step starts clean.
    fn initialize_derivatives(&mut self) -> Result<(), SimError> {
        Ok(())
    }

    fn suspend_integration(&mut self) {}

    fn resume_integration(&mut self) {}

    /// Bring propulsion to steady state for the current throttle.
    fn settle_propulsion(&mut self) -> Result<(), SimError> {
        Ok(())
    }

    fn set_control(&mut self, control: FlightControl, value: f64);

    fn control(&self, control: FlightControl) -> f64;

    /// Planet-relative velocity derivative in body axes [m/s^2].
    fn uvw_dot(&self) -> Vector3<f64>;

    /// Planet-relative rate derivative in body axes [rad/s^2].
    fn pqr_dot(&self) -> Vector3<f64>;

    /// Body-frame velocity [m/s].
    fn uvw(&self) -> Vector3<f64>;

    fn true_airspeed(&self) -> f64;

    fn alpha_dot(&self) -> f64;

    fn beta_dot(&self) -> f64;

    fn normal_load_factor(&self) -> f64;

    /// Heading angle [rad].
    fn heading(&self) -> f64;

    /// Ground-track direction [rad].
    fn ground_track(&self) -> f64;

    /// Local gravity magnitude [m/s^2].
    fn gravity(&self) -> f64 {
        GRAVITY
    }

    /// Usable angle-of-attack range [rad], when the force model knows one.
    fn alpha_limits(&self) -> Option<(f64, f64)> {
        None
    }
}
