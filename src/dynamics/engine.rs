use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::contact::{ContactConstraint, ContactSolver};
use super::inputs::{AccelInputs, GravityModel};

/// Body and inertial accelerations for one rigid body.
///
/// Pure function of its inputs: `update` snapshots the force/moment sums and
/// frame data for the step, derives the translational, rotational and
/// attitude derivatives, then resolves ground contacts. Nothing here owns the
/// vehicle state or integrates anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelerationEngine {
    gravity_model: GravityModel,
    gravity_gradient: bool,
    hold_down: bool,
    solver: ContactSolver,

    inputs: AccelInputs,

    uvw_dot: Vector3<f64>,
    uvw_idot: Vector3<f64>,
    pqr_dot: Vector3<f64>,
    pqr_idot: Vector3<f64>,
    body_accel: Vector3<f64>,
    quat_dot: Quaternion<f64>,
    friction_forces: Vector3<f64>,
    friction_moments: Vector3<f64>,
}

impl Default for AccelerationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AccelerationEngine {
    pub fn new() -> Self {
        Self {
            gravity_model: GravityModel::default(),
            gravity_gradient: false,
            hold_down: false,
            solver: ContactSolver::default(),
            inputs: AccelInputs::default(),
            uvw_dot: Vector3::zeros(),
            uvw_idot: Vector3::zeros(),
            pqr_dot: Vector3::zeros(),
            pqr_idot: Vector3::zeros(),
            body_accel: Vector3::zeros(),
            quat_dot: Quaternion::new(0.0, 0.0, 0.0, 0.0),
            friction_forces: Vector3::zeros(),
            friction_moments: Vector3::zeros(),
        }
    }

    pub fn set_gravity_model(&mut self, model: GravityModel) {
        self.gravity_model = model;
    }

    pub fn set_gravity_gradient(&mut self, enabled: bool) {
        self.gravity_gradient = enabled;
    }

    pub fn set_contact_solver(&mut self, solver: ContactSolver) {
        self.solver = solver;
    }

    /// Holding the vehicle down also rewrites the already published
    /// derivatives so a consumer between steps never sees stale free-flight
    /// values.
    pub fn set_hold_down(&mut self, hold_down: bool) {
        self.hold_down = hold_down;
        if hold_down {
            let omega = self.inputs.omega_planet;
            self.uvw_idot = omega.cross(&omega.cross(&self.inputs.inertial_position));
            self.uvw_dot = Vector3::zeros();
            self.pqr_idot = self.inputs.pqri.cross(&(self.inputs.ti2b * omega));
            self.pqr_dot = Vector3::zeros();
        }
    }

    pub fn hold_down(&self) -> bool {
        self.hold_down
    }

    /// Derive all accelerations for the step, then resolve ground contacts
    /// (skipped while held down).
    pub fn update(&mut self, inputs: &AccelInputs, contacts: &mut [ContactConstraint]) {
        self.inputs = inputs.clone();
        self.calculate_pqr_dot();
        self.calculate_uvw_dot();
        self.calculate_quat_dot();
        if self.hold_down {
            self.friction_forces = Vector3::zeros();
            self.friction_moments = Vector3::zeros();
        } else {
            self.resolve_contacts(contacts, self.inputs.dt);
        }
    }

    /// Seed the derivatives before the first integration step. Contacts are
    /// resolved in instantaneous mode (no velocity error term) because there
    /// is no previous step whose drift needs correcting.
    pub fn initialize_derivatives(
        &mut self,
        inputs: &AccelInputs,
        contacts: &mut [ContactConstraint],
    ) {
        self.inputs = inputs.clone();
        self.calculate_pqr_dot();
        self.calculate_uvw_dot();
        self.calculate_quat_dot();
        self.resolve_contacts(contacts, 0.0);
    }

    /// Gravity acceleration in body and inertial axes.
    fn gravity(&self) -> (Vector3<f64>, Vector3<f64>) {
        let inputs = &self.inputs;
        match self.gravity_model {
            GravityModel::InverseSquare { gm } => {
                let r = inputs.inertial_position;
                let r2 = r.norm_squared();
                let grav_inertial = -(gm / (r2 * r2.sqrt())) * r;
                (inputs.ti2b * grav_inertial, grav_inertial)
            }
            GravityModel::Precomputed => (
                inputs.tec2b * inputs.grav_accel,
                inputs.tec2i * inputs.grav_accel,
            ),
        }
    }

    fn gravity_magnitude(&self) -> f64 {
        match self.gravity_model {
            GravityModel::InverseSquare { gm } => {
                gm / self.inputs.inertial_position.norm_squared()
            }
            GravityModel::Precomputed => self.inputs.grav_accel.norm(),
        }
    }

    fn calculate_pqr_dot(&mut self) {
        let inputs = &self.inputs;
        let mut moment = inputs.moment;

        if self.gravity_gradient {
            let r = inputs.ti2b * inputs.inertial_position;
            let radius = r.norm();
            let r_hat = r / radius;
            moment +=
                (3.0 * self.gravity_magnitude() / radius) * r_hat.cross(&(inputs.inertia * r_hat));
        }

        let omega_body = inputs.ti2b * inputs.omega_planet;
        if self.hold_down {
            // Rates are frozen in the rotating frame, so the inertial rate
            // derivative reduces to the transport term.
            self.pqr_dot = Vector3::zeros();
            self.pqr_idot = inputs.pqri.cross(&omega_body);
        } else {
            self.pqr_idot = inputs.inertia_inv
                * (moment - inputs.pqri.cross(&(inputs.inertia * inputs.pqri)));
            self.pqr_dot = self.pqr_idot - inputs.pqri.cross(&omega_body);
        }
    }

    fn calculate_uvw_dot(&mut self) {
        let inputs = &self.inputs;
        let centripetal = inputs
            .omega_planet
            .cross(&inputs.omega_planet.cross(&inputs.inertial_position));

        if self.hold_down {
            self.body_accel = Vector3::zeros();
            self.uvw_dot = Vector3::zeros();
            self.uvw_idot = centripetal;
            return;
        }

        self.body_accel = inputs.force / inputs.mass;
        let omega_body = inputs.ti2b * inputs.omega_planet;
        let (grav_body, grav_inertial) = self.gravity();

        self.uvw_dot = self.body_accel
            - (inputs.pqr + 2.0 * omega_body).cross(&inputs.uvw)
            - inputs.ti2b * centripetal
            + grav_body;
        self.uvw_idot = inputs.tb2i * self.body_accel + grav_inertial;
    }

    /// Attitude quaternion derivative, q_dot = q (x) (0, pqri) / 2. Left
    /// unnormalized; the integrator renormalizes after stepping.
    fn calculate_quat_dot(&mut self) {
        self.quat_dot =
            self.inputs.attitude.into_inner() * Quaternion::from_imag(self.inputs.pqri) * 0.5;
    }

    fn resolve_contacts(&mut self, contacts: &mut [ContactConstraint], dt: f64) {
        let mut inputs = self.inputs.clone();
        inputs.dt = dt;
        let (forces, moments) = self
            .solver
            .solve(&inputs, self.uvw_dot, self.pqr_dot, contacts);
        self.friction_forces = forces;
        self.friction_moments = moments;

        let accel = forces / self.inputs.mass;
        let omega_dot = self.inputs.inertia_inv * moments;
        self.body_accel += accel;
        self.uvw_dot += accel;
        self.uvw_idot += self.inputs.tb2i * accel;
        self.pqr_dot += omega_dot;
        self.pqr_idot += omega_dot;
    }

    /// Last input snapshot the derivatives were computed from.
    pub fn inputs(&self) -> &AccelInputs {
        &self.inputs
    }

    /// Planet-relative velocity derivative in body axes [m/s^2].
    pub fn uvw_dot(&self) -> Vector3<f64> {
        self.uvw_dot
    }

    /// Inertial velocity derivative in inertial axes [m/s^2].
    pub fn uvw_idot(&self) -> Vector3<f64> {
        self.uvw_idot
    }

    /// Planet-relative rate derivative in body axes [rad/s^2].
    pub fn pqr_dot(&self) -> Vector3<f64> {
        self.pqr_dot
    }

    /// Inertial rate derivative in body axes [rad/s^2].
    pub fn pqr_idot(&self) -> Vector3<f64> {
        self.pqr_idot
    }

    /// Applied-force acceleration (no gravity, no rotating-frame terms),
    /// contact forces included [m/s^2].
    pub fn body_accel(&self) -> Vector3<f64> {
        self.body_accel
    }

    /// Attitude quaternion derivative, not unit length.
    pub fn quat_dot(&self) -> Quaternion<f64> {
        self.quat_dot
    }

    /// Contact force sum in body axes [N].
    pub fn friction_forces(&self) -> Vector3<f64> {
        self.friction_forces
    }

    /// Contact moment sum in body axes [N m].
    pub fn friction_moments(&self) -> Vector3<f64> {
        self.friction_moments
    }

    /// Applied force plus contact forces [N].
    pub fn forces(&self) -> Vector3<f64> {
        self.inputs.force + self.friction_forces
    }

    /// Applied moment plus contact moments [N m].
    pub fn moments(&self) -> Vector3<f64> {
        self.inputs.moment + self.friction_moments
    }

    /// Ground-reaction force share plus contact forces [N].
    pub fn ground_forces(&self) -> Vector3<f64> {
        self.inputs.ground_force + self.friction_forces
    }

    /// Ground-reaction moment share plus contact moments [N m].
    pub fn ground_moments(&self) -> Vector3<f64> {
        self.inputs.ground_moment + self.friction_moments
    }

    /// Weight vector in body axes [N].
    pub fn weight(&self) -> Vector3<f64> {
        self.inputs.mass * self.gravity().0
    }
}
