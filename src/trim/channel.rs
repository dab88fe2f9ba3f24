use std::f64::consts::PI;

use tracing::debug;

use crate::model::{FlightControl, FlightModel, InitialConditions};
use crate::utils::errors::SimError;

/// One-step wrap into [-pi, pi]; headings never arrive further out.
fn wrap_pi(angle: f64) -> f64 {
    if angle < -PI {
        angle + 2.0 * PI
    } else if angle > PI {
        angle - 2.0 * PI
    } else {
        angle
    }
}

/// State derivative a trim axis drives toward its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVariable {
    /// Forward acceleration [m/s^2].
    Udot,
    /// Side acceleration [m/s^2].
    Vdot,
    /// Vertical acceleration [m/s^2].
    Wdot,
    /// Pitch acceleration [rad/s^2].
    Qdot,
    /// Roll acceleration [rad/s^2].
    Pdot,
    /// Yaw acceleration [rad/s^2].
    Rdot,
    /// Heading minus ground track [rad].
    Hmgt,
    /// Normal load factor [g].
    Nlf,
}

impl StateVariable {
    pub fn name(&self) -> &'static str {
        match self {
            StateVariable::Udot => "udot",
            StateVariable::Vdot => "vdot",
            StateVariable::Wdot => "wdot",
            StateVariable::Qdot => "qdot",
            StateVariable::Pdot => "pdot",
            StateVariable::Rdot => "rdot",
            StateVariable::Hmgt => "hmgt",
            StateVariable::Nlf => "nlf",
        }
    }

    /// Residual band inside which the axis counts as trimmed.
    pub fn tolerance(&self) -> f64 {
        match self {
            StateVariable::Udot | StateVariable::Vdot | StateVariable::Wdot => 1e-3,
            StateVariable::Qdot | StateVariable::Pdot | StateVariable::Rdot => 1e-4,
            StateVariable::Hmgt => 1e-2,
            StateVariable::Nlf => 1e-5,
        }
    }

    /// Steady-state value the axis aims for. Zero everywhere except the
    /// load factor, which trims to one g until a pull-up retargets it.
    pub fn default_target(&self) -> f64 {
        match self {
            StateVariable::Nlf => 1.0,
            _ => 0.0,
        }
    }

    /// Read the current value off the live model.
    pub fn read<M: FlightModel + ?Sized>(&self, model: &M) -> f64 {
        match self {
            StateVariable::Udot => model.uvw_dot().x,
            StateVariable::Vdot => model.uvw_dot().y,
            StateVariable::Wdot => model.uvw_dot().z,
            StateVariable::Qdot => model.pqr_dot().y,
            StateVariable::Pdot => model.pqr_dot().x,
            StateVariable::Rdot => model.pqr_dot().z,
            StateVariable::Hmgt => wrap_pi(model.heading() - model.ground_track()),
            StateVariable::Nlf => model.normal_load_factor(),
        }
    }
}

/// Knob a trim axis is allowed to move. Surface commands go to the flight
/// controls; everything else is written into the initial-condition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlVariable {
    Throttle,
    Beta,
    Alpha,
    PitchTrim,
    Elevator,
    RollTrim,
    Aileron,
    YawTrim,
    Rudder,
    AltAgl,
    Theta,
    Phi,
    Gamma,
    Heading,
}

impl ControlVariable {
    pub fn name(&self) -> &'static str {
        match self {
            ControlVariable::Throttle => "Throttle",
            ControlVariable::Beta => "Sideslip",
            ControlVariable::Alpha => "Angle of Attack",
            ControlVariable::PitchTrim => "Pitch Trim",
            ControlVariable::Elevator => "Elevator",
            ControlVariable::RollTrim => "Roll Trim",
            ControlVariable::Aileron => "Ailerons",
            ControlVariable::YawTrim => "Yaw Trim",
            ControlVariable::Rudder => "Rudder",
            ControlVariable::AltAgl => "Altitude AGL",
            ControlVariable::Theta => "Theta",
            ControlVariable::Phi => "Phi",
            ControlVariable::Gamma => "Gamma",
            ControlVariable::Heading => "Heading",
        }
    }

    /// Angles print in degrees in the axis report.
    fn display_factor(&self) -> f64 {
        match self {
            ControlVariable::Beta
            | ControlVariable::Alpha
            | ControlVariable::Theta
            | ControlVariable::Phi
            | ControlVariable::Gamma
            | ControlVariable::Heading => 180.0 / PI,
            _ => 1.0,
        }
    }

    /// Bracket-width epsilon for the root finder. The aerodynamic-angle
    /// and surface controls need a tighter stop than the tolerance alone.
    pub fn solver_eps(&self, tolerance: f64) -> f64 {
        match self {
            ControlVariable::Alpha
            | ControlVariable::PitchTrim
            | ControlVariable::Elevator
            | ControlVariable::RollTrim
            | ControlVariable::Aileron
            | ControlVariable::YawTrim
            | ControlVariable::Rudder
            | ControlVariable::AltAgl
            | ControlVariable::Gamma => tolerance / 100.0,
            _ => tolerance,
        }
    }

    /// Search range. Attitude controls are windows around the current
    /// record; the others are absolute.
    pub fn bounds<M: FlightModel + ?Sized>(&self, model: &M, ic: &InitialConditions) -> (f64, f64) {
        match self {
            ControlVariable::Throttle => (0.0, 1.0),
            ControlVariable::Beta => ((-30f64).to_radians(), 30f64.to_radians()),
            ControlVariable::Alpha => model
                .alpha_limits()
                .filter(|(lo, hi)| hi > lo)
                .unwrap_or(((-5f64).to_radians(), 20f64.to_radians())),
            ControlVariable::PitchTrim
            | ControlVariable::Elevator
            | ControlVariable::RollTrim
            | ControlVariable::Aileron
            | ControlVariable::YawTrim
            | ControlVariable::Rudder => (-1.0, 1.0),
            ControlVariable::AltAgl => (0.0, 10.0),
            ControlVariable::Theta => (
                ic.theta() - 5f64.to_radians(),
                ic.theta() + 5f64.to_radians(),
            ),
            ControlVariable::Phi => (
                ic.phi() - 30f64.to_radians(),
                ic.phi() + 30f64.to_radians(),
            ),
            ControlVariable::Gamma => ((-80f64).to_radians(), 80f64.to_radians()),
            ControlVariable::Heading => (
                ic.psi() - 30f64.to_radians(),
                ic.psi() + 30f64.to_radians(),
            ),
        }
    }

    /// Write the control. A throttle write pushes through reinitialization
    /// and propulsion settling so spool state tracks the command; an
    /// unreachable angle-of-attack probe leaves the record unchanged.
    pub fn apply<M: FlightModel + ?Sized>(
        &self,
        model: &mut M,
        ic: &mut InitialConditions,
        value: f64,
    ) -> Result<(), SimError> {
        match self {
            ControlVariable::Throttle => {
                model.set_control(FlightControl::Throttle, value);
                model.reinitialize(ic)?;
                model.settle_propulsion()?;
            }
            ControlVariable::Beta => ic.set_beta(value),
            ControlVariable::Alpha => {
                if !ic.set_alpha(value).is_applied() {
                    debug!(alpha = value, "unreachable angle of attack, probe skipped");
                }
            }
            ControlVariable::PitchTrim => model.set_control(FlightControl::PitchTrim, value),
            ControlVariable::Elevator => model.set_control(FlightControl::Elevator, value),
            ControlVariable::RollTrim => model.set_control(FlightControl::RollTrim, value),
            ControlVariable::Aileron => model.set_control(FlightControl::Aileron, value),
            ControlVariable::YawTrim => model.set_control(FlightControl::YawTrim, value),
            ControlVariable::Rudder => model.set_control(FlightControl::Rudder, value),
            ControlVariable::AltAgl => ic.set_altitude_agl(value),
            ControlVariable::Theta => ic.set_theta(value),
            ControlVariable::Phi => ic.set_phi(value),
            ControlVariable::Gamma => ic.set_gamma(value),
            ControlVariable::Heading => ic.set_psi(value),
        }
        Ok(())
    }
}

/// One trim axis: a state derivative driven to its target by one control.
///
/// `settle` is the measurement primitive every root-finding layer builds
/// on: write the control, then rebuild and re-evaluate the model until the
/// read-back state stops moving.
#[derive(Debug, Clone)]
pub struct TrimChannel {
    state: StateVariable,
    control: ControlVariable,
    target: f64,
    tolerance: f64,
    solver_eps: f64,
    control_min: f64,
    control_max: f64,
    control_value: f64,
    /// Residual from the most recent read: state minus target.
    state_value: f64,
    settle_limit: usize,
    its_to_stable_value: usize,
    total_stability_iterations: usize,
    run_count: usize,
}

impl TrimChannel {
    pub fn new<M: FlightModel + ?Sized>(
        state: StateVariable,
        control: ControlVariable,
        model: &M,
        ic: &InitialConditions,
    ) -> Self {
        let (control_min, control_max) = control.bounds(model, ic);
        let control_value = match control {
            ControlVariable::AltAgl => ic.altitude_agl(),
            _ => 0.5 * (control_min + control_max),
        };
        let tolerance = state.tolerance();
        Self {
            state,
            control,
            target: state.default_target(),
            tolerance,
            solver_eps: control.solver_eps(tolerance),
            control_min,
            control_max,
            control_value,
            state_value: 0.0,
            settle_limit: 100,
            its_to_stable_value: 0,
            total_stability_iterations: 0,
            run_count: 0,
        }
    }

    /// Apply the stored control value and re-evaluate the model until the
    /// state reading is stable: at least two evaluations, stopping once
    /// consecutive readings differ by less than the tolerance or the
    /// settle cap is hit. Either outcome is accepted.
    pub fn settle<M: FlightModel + ?Sized>(
        &mut self,
        model: &mut M,
        ic: &mut InitialConditions,
    ) -> Result<(), SimError> {
        self.control.apply(model, ic, self.control_value)?;
        let mut i = 0;
        loop {
            i += 1;
            let last = self.state_value;
            model.reinitialize(ic)?;
            model.run()?;
            self.state_value = self.state.read(model) - self.target;
            if i > 1
                && ((last - self.state_value).abs() < self.tolerance || i >= self.settle_limit)
            {
                break;
            }
        }
        self.its_to_stable_value = i;
        self.total_stability_iterations += i;
        self.run_count += 1;
        Ok(())
    }

    /// Re-read the live state and test the residual against the tolerance.
    /// Nothing is evaluated, so back-to-back calls agree.
    pub fn in_tolerance<M: FlightModel + ?Sized>(&mut self, model: &M) -> bool {
        self.state_value = self.state.read(model) - self.target;
        self.state_value.abs() <= self.tolerance
    }

    /// Residual from the most recent read or settle.
    pub fn residual(&self) -> f64 {
        self.state_value
    }

    pub fn state(&self) -> StateVariable {
        self.state
    }

    pub fn control(&self) -> ControlVariable {
        self.control
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn solver_eps(&self) -> f64 {
        self.solver_eps
    }

    pub fn control_value(&self) -> f64 {
        self.control_value
    }

    /// Store a new control value. It is written out on the next settle.
    pub fn set_control_value(&mut self, value: f64) {
        self.control_value = value;
    }

    pub fn control_min(&self) -> f64 {
        self.control_min
    }

    pub fn control_max(&self) -> f64 {
        self.control_max
    }

    /// Control value in report units (degrees for the angle controls).
    pub fn control_display_value(&self) -> f64 {
        self.control_value * self.control.display_factor()
    }

    /// Evaluations spent inside the most recent settle.
    pub fn its_to_stable_value(&self) -> usize {
        self.its_to_stable_value
    }

    /// Number of settle calls since construction.
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    pub fn average_stability_iterations(&self) -> f64 {
        if self.run_count > 0 {
            self.total_stability_iterations as f64 / self.run_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::*;
    use crate::model::FlightControls;

    /// First-order response: every run moves the accelerations 60% of the
    /// way to the value commanded by throttle and angle of attack.
    struct LaggedModel {
        controls: FlightControls,
        alpha: f64,
        alpha_range: Option<(f64, f64)>,
        udot: f64,
        wdot: f64,
        runs: usize,
        propulsion_settles: usize,
    }

    impl LaggedModel {
        fn new() -> Self {
            Self {
                controls: FlightControls::default(),
                alpha: 0.0,
                alpha_range: None,
                udot: 0.0,
                wdot: 0.0,
                runs: 0,
                propulsion_settles: 0,
            }
        }
    }

    impl FlightModel for LaggedModel {
        fn reinitialize(&mut self, ic: &InitialConditions) -> Result<(), SimError> {
            self.alpha = ic.alpha();
            Ok(())
        }

        fn run(&mut self) -> Result<(), SimError> {
            self.runs += 1;
            let udot_target = 8.0 * (self.controls.throttle - 0.25);
            let wdot_target = -20.0 * (self.alpha - 0.1);
            self.udot += 0.6 * (udot_target - self.udot);
            self.wdot += 0.6 * (wdot_target - self.wdot);
            Ok(())
        }

        fn settle_propulsion(&mut self) -> Result<(), SimError> {
            self.propulsion_settles += 1;
            Ok(())
        }

        fn set_control(&mut self, control: FlightControl, value: f64) {
            self.controls.set(control, value);
        }

        fn control(&self, control: FlightControl) -> f64 {
            self.controls.get(control)
        }

        fn uvw_dot(&self) -> Vector3<f64> {
            Vector3::new(self.udot, 0.0, self.wdot)
        }

        fn pqr_dot(&self) -> Vector3<f64> {
            Vector3::zeros()
        }

        fn uvw(&self) -> Vector3<f64> {
            Vector3::new(60.0, 0.0, 0.0)
        }

        fn true_airspeed(&self) -> f64 {
            60.0
        }

        fn alpha_dot(&self) -> f64 {
            0.0
        }

        fn beta_dot(&self) -> f64 {
            0.0
        }

        fn normal_load_factor(&self) -> f64 {
            1.0
        }

        fn heading(&self) -> f64 {
            0.1
        }

        fn ground_track(&self) -> f64 {
            0.3
        }

        fn alpha_limits(&self) -> Option<(f64, f64)> {
            self.alpha_range
        }
    }

    fn level_ic() -> InitialConditions {
        let mut ic = InitialConditions::new();
        ic.set_true_airspeed(60.0);
        ic
    }

    #[test]
    fn test_settle_reaches_steady_state() {
        let mut model = LaggedModel::new();
        let mut ic = level_ic();
        let mut channel =
            TrimChannel::new(StateVariable::Udot, ControlVariable::Throttle, &model, &ic);

        assert_relative_eq!(channel.control_value(), 0.5);
        channel.settle(&mut model, &mut ic).unwrap();

        // Steady udot for mid throttle is 8*(0.5-0.25) = 2.0.
        assert_relative_eq!(channel.residual(), 2.0, epsilon = 2e-3);
        assert!(
            channel.its_to_stable_value() > 1 && channel.its_to_stable_value() < 100,
            "lagged response should need a few runs, took {}",
            channel.its_to_stable_value()
        );
        assert_eq!(channel.run_count(), 1);
        assert!(
            model.propulsion_settles >= 1,
            "throttle writes must settle propulsion"
        );
    }

    #[test]
    fn test_control_round_trip_through_settle() {
        let mut model = LaggedModel::new();
        let mut ic = level_ic();
        let mut channel =
            TrimChannel::new(StateVariable::Udot, ControlVariable::Throttle, &model, &ic);

        channel.set_control_value(0.7);
        channel.settle(&mut model, &mut ic).unwrap();

        assert_eq!(channel.control_value(), 0.7);
        assert_eq!(model.control(FlightControl::Throttle), 0.7);
    }

    #[test]
    fn test_in_tolerance_is_idempotent() {
        let mut model = LaggedModel::new();
        let mut ic = level_ic();
        let mut channel =
            TrimChannel::new(StateVariable::Wdot, ControlVariable::Alpha, &model, &ic);

        channel.set_control_value(0.1);
        channel.settle(&mut model, &mut ic).unwrap();

        let first = channel.in_tolerance(&model);
        let first_residual = channel.residual();
        let second = channel.in_tolerance(&model);

        assert_eq!(first, second);
        assert_eq!(first_residual, channel.residual());
        assert!(first, "wdot is zero at the commanded alpha of 0.1 rad");
    }

    #[test]
    fn test_alpha_bounds_fall_back_when_model_has_none() {
        let mut model = LaggedModel::new();
        let ic = level_ic();

        let channel = TrimChannel::new(StateVariable::Wdot, ControlVariable::Alpha, &model, &ic);
        assert_relative_eq!(channel.control_min(), (-5f64).to_radians());
        assert_relative_eq!(channel.control_max(), 20f64.to_radians());

        model.alpha_range = Some((-0.2, 0.5));
        let channel = TrimChannel::new(StateVariable::Wdot, ControlVariable::Alpha, &model, &ic);
        assert_relative_eq!(channel.control_min(), -0.2);
        assert_relative_eq!(channel.control_max(), 0.5);
    }

    #[test]
    fn test_hmgt_wraps_single_turn() {
        assert_relative_eq!(wrap_pi(1.0), 1.0);
        assert_relative_eq!(wrap_pi(6.0), 6.0 - 2.0 * PI);
        assert_relative_eq!(wrap_pi(-6.0), -6.0 + 2.0 * PI);
    }
}
