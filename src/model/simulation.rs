use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use crate::dynamics::{AccelInputs, AccelerationEngine, ContactConstraint, Propagator};
use crate::model::ic::InitialConditions;
use crate::model::traits::{
    AirData, FlightControl, FlightControls, FlightModel, ForceModel, GroundModel, MassProperties,
    NoGround,
};
use crate::state::RigidBodyState;
use crate::utils::constants::{
    DENSITY_SCALE_HEIGHT, GRAVITY, PLANET_RADIUS, SEA_LEVEL_DENSITY,
};
use crate::utils::errors::SimError;

/// One vehicle over a spherical planet: force and ground models plugged into
/// the acceleration engine and integrator.
///
/// The inertial frame is frozen to the planet-fixed frame at initialization,
/// which is exact for a non-rotating planet and a short-horizon
/// approximation otherwise. Trim evaluation reinitializes constantly, so the
/// frames never get a chance to drift apart.
#[derive(Debug)]
pub struct Simulation<F: ForceModel, G: GroundModel = NoGround> {
    force_model: F,
    ground_model: G,
    mass: MassProperties,
    engine: AccelerationEngine,
    propagator: Propagator,
    state: RigidBodyState,
    controls: FlightControls,
    contacts: Vec<ContactConstraint>,
    air: AirData,
    alpha_dot: f64,
    beta_dot: f64,
    nlf: f64,
    dt: f64,
    time: f64,
    suspended: bool,
    terrain_elevation: f64,
    planet_rotation: f64,
}

impl<F: ForceModel> Simulation<F, NoGround> {
    pub fn new(mass: MassProperties, force_model: F) -> Self {
        Self {
            force_model,
            ground_model: NoGround,
            mass,
            engine: AccelerationEngine::new(),
            propagator: Propagator,
            state: RigidBodyState::at_position(Vector3::new(PLANET_RADIUS, 0.0, 0.0)),
            controls: FlightControls::default(),
            contacts: Vec::new(),
            air: AirData::default(),
            alpha_dot: 0.0,
            beta_dot: 0.0,
            nlf: 0.0,
            dt: 1.0 / 120.0,
            time: 0.0,
            suspended: false,
            terrain_elevation: 0.0,
            planet_rotation: 0.0,
        }
    }
}

impl<F: ForceModel, G: GroundModel> Simulation<F, G> {
    pub fn with_ground_model<G2: GroundModel>(self, ground_model: G2) -> Simulation<F, G2> {
        Simulation {
            force_model: self.force_model,
            ground_model,
            mass: self.mass,
            engine: self.engine,
            propagator: self.propagator,
            state: self.state,
            controls: self.controls,
            contacts: self.contacts,
            air: self.air,
            alpha_dot: self.alpha_dot,
            beta_dot: self.beta_dot,
            nlf: self.nlf,
            dt: self.dt,
            time: self.time,
            suspended: self.suspended,
            terrain_elevation: self.terrain_elevation,
            planet_rotation: self.planet_rotation,
        }
    }

    pub fn with_timestep(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn set_planet_rotation(&mut self, omega: f64) {
        self.planet_rotation = omega;
    }

    pub fn set_terrain_elevation(&mut self, elevation: f64) {
        self.terrain_elevation = elevation;
    }

    pub fn state(&self) -> &RigidBodyState {
        &self.state
    }

    pub fn engine(&self) -> &AccelerationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AccelerationEngine {
        &mut self.engine
    }

    pub fn force_model(&self) -> &F {
        &self.force_model
    }

    pub fn air_data(&self) -> &AirData {
        &self.air
    }

    pub fn controls(&self) -> &FlightControls {
        &self.controls
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn altitude(&self) -> f64 {
        self.state.position.norm() - PLANET_RADIUS
    }

    pub fn altitude_agl(&self) -> f64 {
        self.altitude() - self.terrain_elevation
    }

    fn latitude_longitude(&self) -> (f64, f64) {
        let r = self.state.position.norm();
        let latitude = (self.state.position.z / r).clamp(-1.0, 1.0).asin();
        let longitude = self.state.position.y.atan2(self.state.position.x);
        (latitude, longitude)
    }

    /// Planet-fixed to north-east-down rotation.
    fn tec2ned(latitude: f64, longitude: f64) -> Matrix3<f64> {
        let (slat, clat) = latitude.sin_cos();
        let (slon, clon) = longitude.sin_cos();
        Matrix3::new(
            -slat * clon,
            -slat * slon,
            clat,
            -slon,
            clon,
            0.0,
            -clat * clon,
            -clat * slon,
            -slat,
        )
    }

    /// NED-to-body rotation at the current position and attitude.
    fn local_to_body(&self) -> Matrix3<f64> {
        let (latitude, longitude) = self.latitude_longitude();
        let tec2b = self.state.attitude.to_rotation_matrix().into_inner();
        tec2b * Self::tec2ned(latitude, longitude).transpose()
    }

    fn omega_planet(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, self.planet_rotation)
    }
}

impl<F: ForceModel, G: GroundModel> FlightModel for Simulation<F, G> {
    fn reinitialize(&mut self, ic: &InitialConditions) -> Result<(), SimError> {
        let (slat, clat) = ic.latitude().sin_cos();
        let (slon, clon) = ic.longitude().sin_cos();
        let radius = PLANET_RADIUS + ic.altitude();
        self.state.position = radius * Vector3::new(clat * clon, clat * slon, slat);

        let tec2b =
            ic.local_to_body() * Self::tec2ned(ic.latitude(), ic.longitude());
        self.state.attitude =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(tec2b));

        self.state.velocity = ic.uvw();
        self.state.angular_velocity = ic.rates();
        self.terrain_elevation = ic.terrain_elevation();
        self.time = 0.0;
        Ok(())
    }

    fn run(&mut self) -> Result<(), SimError> {
        let dt = if self.suspended { 0.0 } else { self.dt };

        let altitude = self.altitude();
        let uvw = self.state.velocity;
        let vt = uvw.norm();
        let density = SEA_LEVEL_DENSITY * (-altitude / DENSITY_SCALE_HEIGHT).exp();
        self.air = AirData {
            true_airspeed: vt,
            alpha: uvw.z.atan2(uvw.x),
            beta: uvw.y.atan2((uvw.x * uvw.x + uvw.z * uvw.z).sqrt()),
            dynamic_pressure: 0.5 * density * vt * vt,
            density,
            relative_velocity: uvw,
        };

        let applied = self
            .force_model
            .forces(&self.state, &self.air, &self.controls);
        let agl = altitude - self.terrain_elevation;
        let ground = self
            .ground_model
            .reactions(&self.state, agl, &mut self.contacts);

        let ti2b = self.state.attitude.to_rotation_matrix().into_inner();
        let grav_dir = -self.state.position / self.state.position.norm();
        let omega_planet = self.omega_planet();

        let inputs = AccelInputs {
            mass: self.mass.mass,
            inertia: self.mass.inertia,
            inertia_inv: self.mass.inertia_inv,
            force: applied.force + ground.force,
            moment: applied.moment + ground.moment,
            ground_force: ground.force,
            ground_moment: ground.moment,
            grav_accel: GRAVITY * grav_dir,
            attitude: self.state.attitude,
            ti2b,
            tb2i: ti2b.transpose(),
            tec2b: ti2b,
            tec2i: Matrix3::identity(),
            pqr: self.state.angular_velocity,
            pqri: self.state.angular_velocity + ti2b * omega_planet,
            uvw,
            inertial_position: self.state.position,
            omega_planet,
            terrain_velocity: Vector3::zeros(),
            terrain_angular_velocity: Vector3::zeros(),
            dt,
        };
        self.engine.update(&inputs, &mut self.contacts);

        let uvw_dot = self.engine.uvw_dot();
        let vuw2 = uvw.x * uvw.x + uvw.z * uvw.z;
        self.alpha_dot = if vuw2 > 0.0 {
            (uvw.x * uvw_dot.z - uvw.z * uvw_dot.x) / vuw2
        } else {
            0.0
        };
        self.beta_dot = if vt > 0.0 && vuw2 > 0.0 {
            let vt_dot = uvw.dot(&uvw_dot) / vt;
            (uvw_dot.y * vt - uvw.y * vt_dot) / (vt * vuw2.sqrt())
        } else {
            0.0
        };

        let weight = self.mass.mass * GRAVITY;
        let lift = applied.force.x * self.air.alpha.sin() - applied.force.z * self.air.alpha.cos();
        self.nlf = if weight > 0.0 { lift / weight } else { 0.0 };

        if dt > 0.0 {
            self.propagator.advance(&mut self.state, &self.engine, dt);
            self.time += dt;
        }
        Ok(())
    }

    fn initialize_derivatives(&mut self) -> Result<(), SimError> {
        let inputs = self.engine.inputs().clone();
        self.engine.initialize_derivatives(&inputs, &mut self.contacts);
        Ok(())
    }

    fn suspend_integration(&mut self) {
        self.suspended = true;
    }

    fn resume_integration(&mut self) {
        self.suspended = false;
    }

    fn settle_propulsion(&mut self) -> Result<(), SimError> {
        self.force_model.stabilize(&self.air, &self.controls);
        Ok(())
    }

    fn set_control(&mut self, control: FlightControl, value: f64) {
        self.controls.set(control, value);
    }

    fn control(&self, control: FlightControl) -> f64 {
        self.controls.get(control)
    }

    fn uvw_dot(&self) -> Vector3<f64> {
        self.engine.uvw_dot()
    }

    fn pqr_dot(&self) -> Vector3<f64> {
        self.engine.pqr_dot()
    }

    fn uvw(&self) -> Vector3<f64> {
        self.state.velocity
    }

    fn true_airspeed(&self) -> f64 {
        self.state.velocity.norm()
    }

    fn alpha_dot(&self) -> f64 {
        self.alpha_dot
    }

    fn beta_dot(&self) -> f64 {
        self.beta_dot
    }

    fn normal_load_factor(&self) -> f64 {
        self.nlf
    }

    fn heading(&self) -> f64 {
        let tl2b = self.local_to_body();
        tl2b[(0, 1)].atan2(tl2b[(0, 0)])
    }

    fn ground_track(&self) -> f64 {
        let (latitude, longitude) = self.latitude_longitude();
        let tec2b = self.state.attitude.to_rotation_matrix().into_inner();
        let v_ned = Self::tec2ned(latitude, longitude) * (tec2b.transpose() * self.state.velocity);
        v_ned.y.atan2(v_ned.x)
    }

    fn alpha_limits(&self) -> Option<(f64, f64)> {
        self.force_model.alpha_limits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Ballistic;

    impl ForceModel for Ballistic {
        fn forces(
            &mut self,
            _state: &RigidBodyState,
            _air: &AirData,
            _controls: &FlightControls,
        ) -> crate::model::traits::ForceMoment {
            crate::model::traits::ForceMoment::default()
        }
    }

    struct Thruster {
        max_thrust: f64,
    }

    impl ForceModel for Thruster {
        fn forces(
            &mut self,
            _state: &RigidBodyState,
            _air: &AirData,
            controls: &FlightControls,
        ) -> crate::model::traits::ForceMoment {
            crate::model::traits::ForceMoment::new(
                Vector3::new(controls.throttle * self.max_thrust, 0.0, 0.0),
                Vector3::zeros(),
            )
        }
    }

    struct Lifter {
        weight: f64,
    }

    impl ForceModel for Lifter {
        fn forces(
            &mut self,
            _state: &RigidBodyState,
            _air: &AirData,
            _controls: &FlightControls,
        ) -> crate::model::traits::ForceMoment {
            crate::model::traits::ForceMoment::new(
                Vector3::new(0.0, 0.0, -self.weight),
                Vector3::zeros(),
            )
        }
    }

    fn test_mass() -> MassProperties {
        MassProperties::new(10.0, Matrix3::from_diagonal_element(20.0))
    }

    #[test]
    fn test_free_fall_accelerates_at_g() {
        let mut sim = Simulation::new(test_mass(), Ballistic).with_timestep(0.01);
        let mut ic = InitialConditions::new();
        ic.set_altitude(1000.0);
        sim.reinitialize(&ic).unwrap();

        for _ in 0..100 {
            sim.run().unwrap();
        }

        // one second of free fall straight down
        assert_relative_eq!(sim.uvw().z, GRAVITY, epsilon = 1e-9);
        assert!(sim.altitude() < 1000.0);
        assert_relative_eq!(sim.time(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_suspended_run_refreshes_derivatives_without_moving() {
        let mut sim = Simulation::new(test_mass(), Ballistic);
        let mut ic = InitialConditions::new();
        ic.set_altitude(500.0);
        sim.reinitialize(&ic).unwrap();

        sim.suspend_integration();
        sim.run().unwrap();

        assert_relative_eq!(sim.uvw_dot().z, GRAVITY, epsilon = 1e-9);
        assert_eq!(sim.uvw(), Vector3::zeros());
        assert_relative_eq!(sim.time(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_throttle_reaches_the_forces() {
        let mut sim = Simulation::new(test_mass(), Thruster { max_thrust: 1000.0 });
        let mut ic = InitialConditions::new();
        ic.set_altitude(500.0);
        sim.reinitialize(&ic).unwrap();

        sim.set_control(FlightControl::Throttle, 0.5);
        sim.suspend_integration();
        sim.run().unwrap();

        assert_relative_eq!(sim.uvw_dot().x, 50.0, epsilon = 1e-9);
        assert_relative_eq!(sim.control(FlightControl::Throttle), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_heading_and_ground_track_eastbound() {
        let mut sim = Simulation::new(test_mass(), Ballistic);
        let mut ic = InitialConditions::new();
        ic.set_altitude(800.0);
        ic.set_psi(90_f64.to_radians());
        ic.set_true_airspeed(30.0);
        sim.reinitialize(&ic).unwrap();
        sim.suspend_integration();
        sim.run().unwrap();

        assert_relative_eq!(sim.heading(), 90_f64.to_radians(), epsilon = 1e-9);
        assert_relative_eq!(sim.ground_track(), 90_f64.to_radians(), epsilon = 1e-9);
        assert_relative_eq!(sim.true_airspeed(), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_level_lift_gives_unit_load_factor() {
        let mass = test_mass();
        let mut sim = Simulation::new(
            mass,
            Lifter {
                weight: mass.mass * GRAVITY,
            },
        );
        let mut ic = InitialConditions::new();
        ic.set_altitude(1200.0);
        ic.set_true_airspeed(50.0);
        sim.reinitialize(&ic).unwrap();
        sim.suspend_integration();
        sim.run().unwrap();

        assert_relative_eq!(sim.normal_load_factor(), 1.0, epsilon = 1e-9);
        // lift cancels gravity, so the vertical channel is balanced
        assert_relative_eq!(sim.uvw_dot().z, 0.0, epsilon = 1e-9);
    }
}
