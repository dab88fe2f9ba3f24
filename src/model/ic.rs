use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Result of asking for an aerodynamic angle the current velocity vector
/// cannot support.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub enum AngleOutcome {
    Applied,
    /// The record was left untouched; `requested` is the angle in radians.
    Unreachable { requested: f64 },
}

impl AngleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, AngleOutcome::Applied)
    }
}

/// Initial-condition record a flight model can be rebuilt from.
///
/// The primary velocity state is the north-east-down vector; body velocity
/// and the aerodynamic angles are derived from it and the Euler orientation.
/// Every setter keeps the record internally consistent, so alpha/beta always
/// agree with the stored velocity and attitude.
///
/// Angles are radians, speeds m/s, altitudes m above sea level.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InitialConditions {
    velocity_ned: Vector3<f64>,
    rates: Vector3<f64>,
    alpha: f64,
    beta: f64,
    phi: f64,
    theta: f64,
    psi: f64,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    terrain_elevation: f64,
}

/// North-east-down to body rotation for a 3-2-1 Euler sequence.
fn local_to_body_matrix(phi: f64, theta: f64, psi: f64) -> Matrix3<f64> {
    let (sphi, cphi) = phi.sin_cos();
    let (stht, ctht) = theta.sin_cos();
    let (spsi, cpsi) = psi.sin_cos();

    Matrix3::new(
        ctht * cpsi,
        ctht * spsi,
        -stht,
        sphi * stht * cpsi - cphi * spsi,
        sphi * stht * spsi + cphi * cpsi,
        sphi * ctht,
        cphi * stht * cpsi + sphi * spsi,
        cphi * stht * spsi - sphi * cpsi,
        cphi * ctht,
    )
}

impl InitialConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_to_body(&self) -> Matrix3<f64> {
        local_to_body_matrix(self.phi, self.theta, self.psi)
    }

    /// Body-frame velocity derived from the stored NED vector.
    pub fn uvw(&self) -> Vector3<f64> {
        self.local_to_body() * self.velocity_ned
    }

    pub fn u(&self) -> f64 {
        self.uvw().x
    }

    pub fn velocity_ned(&self) -> Vector3<f64> {
        self.velocity_ned
    }

    pub fn true_airspeed(&self) -> f64 {
        self.velocity_ned.norm()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn psi(&self) -> f64 {
        self.psi
    }

    /// Flight path angle implied by the NED velocity.
    pub fn gamma(&self) -> f64 {
        let vt = self.true_airspeed();
        if vt > 0.0 {
            (-self.velocity_ned.z / vt).clamp(-1.0, 1.0).asin()
        } else {
            0.0
        }
    }

    /// Ground-track direction; falls back to the heading when there is no
    /// horizontal velocity to take it from.
    pub fn ground_track(&self) -> f64 {
        let vn = self.velocity_ned.x;
        let ve = self.velocity_ned.y;
        if vn.abs() < 1e-12 && ve.abs() < 1e-12 {
            self.psi
        } else {
            ve.atan2(vn)
        }
    }

    pub fn rates(&self) -> Vector3<f64> {
        self.rates
    }

    pub fn p(&self) -> f64 {
        self.rates.x
    }

    pub fn q(&self) -> f64 {
        self.rates.y
    }

    pub fn r(&self) -> f64 {
        self.rates.z
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn altitude_agl(&self) -> f64 {
        self.altitude - self.terrain_elevation
    }

    pub fn terrain_elevation(&self) -> f64 {
        self.terrain_elevation
    }

    pub fn set_rates(&mut self, rates: Vector3<f64>) {
        self.rates = rates;
    }

    pub fn set_p(&mut self, p: f64) {
        self.rates.x = p;
    }

    pub fn set_q(&mut self, q: f64) {
        self.rates.y = q;
    }

    pub fn set_r(&mut self, r: f64) {
        self.rates.z = r;
    }

    pub fn set_latitude(&mut self, latitude: f64) {
        self.latitude = latitude;
    }

    pub fn set_longitude(&mut self, longitude: f64) {
        self.longitude = longitude;
    }

    pub fn set_altitude(&mut self, altitude: f64) {
        self.altitude = altitude;
    }

    pub fn set_altitude_agl(&mut self, agl: f64) {
        self.altitude = self.terrain_elevation + agl;
    }

    pub fn set_terrain_elevation(&mut self, elevation: f64) {
        self.terrain_elevation = elevation;
    }

    /// Euler angle setters hold the NED velocity fixed and recompute the
    /// aerodynamic angles from the new attitude.
    pub fn set_phi(&mut self, phi: f64) {
        self.phi = phi;
        self.recalc_aero_angles();
    }

    pub fn set_theta(&mut self, theta: f64) {
        self.theta = theta;
        self.recalc_aero_angles();
    }

    pub fn set_psi(&mut self, psi: f64) {
        self.psi = psi;
        self.recalc_aero_angles();
    }

    /// Scale the velocity to a new true airspeed; a record at rest is given
    /// velocity along the body x axis.
    pub fn set_true_airspeed(&mut self, vt: f64) {
        let current = self.true_airspeed();
        if current > 0.0 {
            self.velocity_ned *= vt / current;
        } else {
            self.velocity_ned = self.local_to_body().transpose() * Vector3::new(vt, 0.0, 0.0);
        }
        self.recalc_aero_angles();
    }

    /// Rebuild the velocity so it climbs at `hdot` while keeping the true
    /// airspeed and ground-track direction. Rejected (with the record left
    /// alone) when the requested rate exceeds the airspeed.
    pub fn set_climb_rate(&mut self, hdot: f64) {
        let vt = self.true_airspeed();
        if hdot.abs() > vt {
            warn!(
                climb_rate = hdot,
                true_airspeed = vt,
                "climb rate cannot exceed the true airspeed"
            );
            return;
        }
        if vt <= 0.0 {
            return;
        }

        let track = self.ground_track();
        let horizontal = (vt * vt - hdot * hdot).sqrt();
        self.velocity_ned = Vector3::new(
            horizontal * track.cos(),
            horizontal * track.sin(),
            -hdot,
        );
        self.recalc_aero_angles();
    }

    pub fn set_gamma(&mut self, gamma: f64) {
        let vt = self.true_airspeed();
        self.set_climb_rate(vt * gamma.sin());
    }

    /// Hold airspeed, alpha and attitude; rotate the velocity so the sideslip
    /// becomes `beta`.
    pub fn set_beta(&mut self, beta: f64) {
        let vt = self.true_airspeed();
        let (sa, ca) = self.alpha.sin_cos();
        let (sb, cb) = beta.sin_cos();
        let uvw = vt * Vector3::new(ca * cb, sb, sa * cb);
        self.velocity_ned = self.local_to_body().transpose() * uvw;
        self.beta = beta;
    }

    /// Re-pitch the vehicle so the airflow meets the body at `alpha` while
    /// the NED velocity vector stays exactly where it is.
    ///
    /// Solves for the pitch angle that realizes the requested incidence at
    /// the current bank and heading, then derives the sideslip that results.
    /// Geometrically impossible requests (the velocity sphere never meets
    /// the constrained plane) leave the record untouched and report
    /// [`AngleOutcome::Unreachable`].
    pub fn set_alpha(&mut self, alpha: f64) -> AngleOutcome {
        let v_ned = self.velocity_ned;
        let (salpha, calpha) = alpha.sin_cos();
        let (spsi, cpsi) = self.psi.sin_cos();
        let (sphi, cphi) = self.phi.sin_cos();

        let t_psi = Matrix3::new(cpsi, spsi, 0.0, -spsi, cpsi, 0.0, 0.0, 0.0, 1.0);
        let t_phi = Matrix3::new(1.0, 0.0, 0.0, 0.0, cphi, sphi, 0.0, -sphi, cphi);
        let t_alpha = Matrix3::new(calpha, 0.0, salpha, 0.0, 1.0, 0.0, -salpha, 0.0, calpha);

        let v0 = t_psi * v_ned;
        let n = (t_alpha * t_phi).transpose() * Vector3::z();
        let y = Vector3::y();
        let mut u = y - y.dot(&n) * n;
        let mut p = y.cross(&n);

        if p.dot(&v0) < 0.0 {
            p = -p;
        }
        p.normalize_mut();

        u *= v0.dot(&y) / u.dot(&y);

        if v0.norm_squared() < u.norm_squared() {
            warn!(
                alpha_deg = alpha.to_degrees(),
                "angle of attack unreachable at the current speed, bank and heading"
            );
            return AngleOutcome::Unreachable { requested: alpha };
        }

        let v1 = u + (v0.norm_squared() - u.norm_squared()).sqrt() * p;

        let v0xz = Vector3::new(v0.x, 0.0, v0.z).normalize();
        let v1xz = Vector3::new(v1.x, 0.0, v1.z).normalize();
        self.theta = v1xz.cross(&v0xz).y.asin();

        let v2 = t_alpha * self.local_to_body() * v_ned;
        self.alpha = alpha;
        self.beta = v2.y.atan2(v2.x);
        AngleOutcome::Applied
    }

    /// Overwrite the whole record in one call. `uvw` is body-frame velocity;
    /// the stored NED vector is rebuilt from it and the new attitude, then
    /// the flight path angle is applied on top.
    #[allow(clippy::too_many_arguments)]
    pub fn reset(
        &mut self,
        uvw: Vector3<f64>,
        rates: Vector3<f64>,
        alpha: f64,
        beta: f64,
        phi: f64,
        theta: f64,
        psi: f64,
        latitude: f64,
        longitude: f64,
        altitude_agl: f64,
        gamma: f64,
    ) {
        self.rates = rates;
        self.alpha = alpha;
        self.beta = beta;
        self.phi = phi;
        self.theta = theta;
        self.psi = psi;
        self.latitude = latitude;
        self.longitude = longitude;
        self.altitude = self.terrain_elevation + altitude_agl;
        self.velocity_ned = local_to_body_matrix(phi, theta, psi).transpose() * uvw;
        self.set_gamma(gamma);
    }

    fn recalc_aero_angles(&mut self) {
        let uvw = self.uvw();
        self.alpha = uvw.z.atan2(uvw.x);
        self.beta = uvw.y.atan2((uvw.x * uvw.x + uvw.z * uvw.z).sqrt());
    }
}
