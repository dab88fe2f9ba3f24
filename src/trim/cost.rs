use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{FlightControl, FlightModel, InitialConditions};
use crate::utils::errors::SimError;

/// Flight condition the simplex trim holds fixed.
///
/// At most one of the rate constraints should be nonzero; roll wins over
/// yaw, yaw over pitch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConstraints {
    /// True airspeed [m/s].
    pub velocity: f64,
    /// Altitude above ground [m].
    pub altitude: f64,
    /// Flight path angle [rad].
    pub gamma: f64,
    /// Roll rate [rad/s] for a rolling trim.
    pub roll_rate: f64,
    /// Pitch rate [rad/s] for a looping trim.
    pub pitch_rate: f64,
    /// Turn rate [rad/s] for a coordinated turn.
    pub yaw_rate: f64,
    /// Interpret `roll_rate` about the stability axis, adding r = p tan(alpha).
    pub stab_axis_roll: bool,
}

impl Default for TrimConstraints {
    fn default() -> Self {
        Self {
            velocity: 50.0,
            altitude: 1000.0,
            gamma: 0.0,
            roll_rate: 0.0,
            pitch_rate: 0.0,
            yaw_rate: 0.0,
            stab_axis_roll: true,
        }
    }
}

/// Steady-flight cost for the simplex trim.
///
/// `constrain` rebuilds the whole flight condition from a design vector
/// under the constraint record; `eval` settles the model there and scores
/// the accelerations that remain.
pub struct TrimCost {
    constraints: TrimConstraints,
}

impl TrimCost {
    /// Design vector layout: throttle, elevator, alpha, aileron, rudder, beta.
    pub const DESIGN_DIM: usize = 6;

    pub fn new(constraints: TrimConstraints) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &TrimConstraints {
        &self.constraints
    }

    /// Rebuild the flight condition from a design vector.
    ///
    /// Velocity components, bank, pitch and body rates all follow from the
    /// constraints: bank from the turn coordination relation, pitch from
    /// the rate of climb relation (Stevens and Lewis pg. 190), rates from
    /// whichever single rate constraint is active.
    pub fn constrain<M: FlightModel + ?Sized>(
        &self,
        model: &mut M,
        ic: &mut InitialConditions,
        design: &[f64],
    ) -> Result<(), SimError> {
        if design.len() != Self::DESIGN_DIM {
            return Err(SimError::InvalidConfig(format!(
                "design vector has {} elements, expected {}",
                design.len(),
                Self::DESIGN_DIM
            )));
        }
        let throttle = design[0];
        let elevator = design[1];
        let alpha = design[2];
        let aileron = design[3];
        let rudder = design[4];
        let beta = design[5];

        let con = &self.constraints;
        let vt = con.velocity;
        let u = vt * alpha.cos() * beta.cos();
        let v = vt * beta.sin();
        let w = vt * alpha.sin() * beta.cos();

        let psi_dot = con.yaw_rate;
        let gc = psi_dot * vt / model.gravity();

        let a = 1.0 - gc * alpha.tan() * beta.sin();
        let b = con.gamma.sin() / beta.cos();
        let c = 1.0 + gc * gc * beta.cos() * beta.cos();
        let phi = ((gc * beta.cos()
            * ((a - b * b)
                + b * alpha.tan()
                    * (c * (1.0 - b * b) + gc * gc * beta.sin() * beta.sin()).sqrt()))
            / (alpha.cos() * (a * a - b * b * (1.0 + c * alpha.tan() * alpha.tan()))))
            .atan();

        let a2 = alpha.cos() * beta.cos();
        let b2 = phi.sin() * beta.sin() + phi.cos() * alpha.sin() * beta.cos();
        let sgamma = con.gamma.sin();
        let theta = ((a2 * b2 + sgamma * (a2 * a2 - sgamma * sgamma + b2 * b2).sqrt())
            / (a2 * a2 - sgamma * sgamma))
            .atan();

        let rates = if con.roll_rate != 0.0 {
            let r = if con.stab_axis_roll {
                con.roll_rate * alpha.tan()
            } else {
                con.roll_rate
            };
            Vector3::new(con.roll_rate, 0.0, r)
        } else if con.yaw_rate != 0.0 {
            Vector3::new(
                -psi_dot * theta.sin(),
                psi_dot * phi.sin() * theta.cos(),
                psi_dot * phi.cos() * theta.cos(),
            )
        } else if con.pitch_rate != 0.0 {
            Vector3::new(0.0, con.pitch_rate, 0.0)
        } else {
            Vector3::zeros()
        };

        debug!(phi, theta, "constrained attitude");

        let psi = ic.psi();
        let latitude = ic.latitude();
        let longitude = ic.longitude();
        ic.reset(
            Vector3::new(u, v, w),
            rates,
            alpha,
            beta,
            phi,
            theta,
            psi,
            latitude,
            longitude,
            con.altitude,
            con.gamma,
        );

        model.set_control(FlightControl::Throttle, throttle);
        model.set_control(FlightControl::Elevator, elevator);
        model.set_control(FlightControl::Aileron, aileron);
        model.set_control(FlightControl::Rudder, rudder);
        Ok(())
    }

    /// Settle the model at the condition `design` describes and return the
    /// steady-state cost. The caller owns the integration suspend guard.
    pub fn eval<M: FlightModel + ?Sized>(
        &self,
        model: &mut M,
        ic: &mut InitialConditions,
        design: &[f64],
    ) -> Result<f64, SimError> {
        self.constrain(model, ic, design)?;

        let mut last_cost = f64::INFINITY;
        let mut runs = 0usize;
        let cost = loop {
            runs += 1;
            model.reinitialize(ic)?;
            model.settle_propulsion()?;
            model.run()?;
            let cost = self.compute_cost(model);
            if (cost - last_cost).abs() < f64::EPSILON || runs > 1000 {
                break cost;
            }
            last_cost = cost;
        };
        if runs > 1000 {
            warn!(cost, "cost failed to settle within 1000 runs");
        }
        Ok(cost)
    }

    /// dvt^2 + 100 (alphadot^2 + betadot^2) + 10 |pqrdot|^2, where dvt is
    /// the acceleration along the velocity vector.
    pub fn compute_cost<M: FlightModel + ?Sized>(&self, model: &M) -> f64 {
        let uvw = model.uvw();
        let uvw_dot = model.uvw_dot();
        let dvt = uvw.dot(&uvw_dot) / model.true_airspeed();
        let alpha_dot = model.alpha_dot();
        let beta_dot = model.beta_dot();
        dvt * dvt
            + 100.0 * (alpha_dot * alpha_dot + beta_dot * beta_dot)
            + 10.0 * model.pqr_dot().norm_squared()
    }
}
