use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::inputs::AccelInputs;

/// One ground-contact constraint direction.
///
/// The ground-reaction provider rebuilds the list (or just refreshes the
/// Jacobians, keeping `value` as a warm start) every step; the solver only
/// reads the Jacobians and bounds and writes `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactConstraint {
    /// Direction the multiplier pushes along, in body axes
    pub force_jacobian: Vector3<f64>,
    /// Moment produced per unit multiplier, in body axes (r x U for a point
    /// contact at lever arm r)
    pub moment_jacobian: Vector3<f64>,
    /// Lower multiplier bound [N]
    pub min: f64,
    /// Upper multiplier bound [N]
    pub max: f64,
    /// Solved multiplier, warm-started from the previous step [N]
    pub value: f64,
}

impl ContactConstraint {
    /// Constraint acting along `direction` at lever arm `arm` from the CG.
    pub fn at_point(direction: Vector3<f64>, arm: Vector3<f64>, min: f64, max: f64) -> Self {
        Self {
            force_jacobian: direction,
            moment_jacobian: arm.cross(&direction),
            min,
            max,
            value: 0.0,
        }
    }
}

/// Projected Gauss-Seidel solver for the contact multipliers.
///
/// Finds multiplier values that cancel relative acceleration along every
/// constraint direction (and, when `dt > 0`, the existing relative velocity
/// over one step) while keeping each multiplier inside its box. Runs inside
/// the acceleration engine once per step when contacts are active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactSolver {
    /// Sweep budget; the solver stops silently with whatever multipliers it
    /// has when the budget runs out
    pub max_sweeps: usize,
    /// Convergence bound on the per-sweep sum of multiplier changes.
    /// Deliberately absolute, not scaled to vehicle mass or force magnitude;
    /// very light or very heavy vehicles may want to scale it.
    pub convergence: f64,
}

impl Default for ContactSolver {
    fn default() -> Self {
        Self {
            max_sweeps: 50,
            convergence: 1e-5,
        }
    }
}

impl ContactSolver {
    /// Solve the multipliers against the unconstrained accelerations and
    /// return the total constraint force and moment in body axes.
    ///
    /// N = 0 returns zeros and touches nothing.
    pub fn solve(
        &self,
        inputs: &AccelInputs,
        uvw_dot: Vector3<f64>,
        pqr_dot: Vector3<f64>,
        constraints: &mut [ContactConstraint],
    ) -> (Vector3<f64>, Vector3<f64>) {
        let n = constraints.len();
        if n == 0 {
            return (Vector3::zeros(), Vector3::zeros());
        }

        // A = Jac M^-1 Jac^T with M^-1 = blockdiag(1/m I, J^-1); the matrix is
        // symmetric, so only the upper triangle is computed and the rest
        // mirrored.
        let mut a = vec![0.0; n * n];
        let mut rhs = vec![0.0; n];

        for i in 0..n {
            let v1 = constraints[i].force_jacobian / inputs.mass;
            let v2 = inputs.inertia_inv * constraints[i].moment_jacobian;

            for j in 0..i {
                a[i * n + j] = a[j * n + i];
            }
            for j in i..n {
                a[i * n + j] = constraints[j].force_jacobian.dot(&v1)
                    + constraints[j].moment_jacobian.dot(&v2);
            }
        }

        // Project the unconstrained accelerations; a nonzero timestep also
        // folds in the term that nulls the current velocity relative to the
        // terrain over this step.
        let mut vdot = uvw_dot;
        let mut wdot = pqr_dot;
        if inputs.dt > 0.0 {
            vdot += (inputs.uvw - inputs.tec2b * inputs.terrain_velocity) / inputs.dt;
            wdot += (inputs.pqr - inputs.tec2b * inputs.terrain_angular_velocity) / inputs.dt;
        }

        // Pre-divide every row and its RHS entry by the diagonal so the sweep
        // below needs no division.
        for i in 0..n {
            let d = a[i * n + i];
            rhs[i] = -(constraints[i].force_jacobian.dot(&vdot)
                + constraints[i].moment_jacobian.dot(&wdot))
                / d;
            for j in 0..n {
                a[i * n + j] /= d;
            }
        }

        for _ in 0..self.max_sweeps {
            let mut norm = 0.0;

            for i in 0..n {
                let lambda0 = constraints[i].value;
                let mut dlambda = rhs[i];
                for j in 0..n {
                    dlambda -= a[i * n + j] * constraints[j].value;
                }

                constraints[i].value =
                    (lambda0 + dlambda).clamp(constraints[i].min, constraints[i].max);
                norm += (constraints[i].value - lambda0).abs();
            }

            if norm < self.convergence {
                break;
            }
        }

        let mut forces = Vector3::zeros();
        let mut moments = Vector3::zeros();
        for c in constraints.iter() {
            forces += c.value * c.force_jacobian;
            moments += c.value * c.moment_jacobian;
        }
        (forces, moments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn falling_inputs(mass: f64) -> AccelInputs {
        AccelInputs::new(mass, Matrix3::from_diagonal_element(100.0))
    }

    #[test]
    fn test_empty_list_is_noop() {
        let solver = ContactSolver::default();
        let inputs = falling_inputs(10.0);
        let (f, m) = solver.solve(
            &inputs,
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
            &mut [],
        );
        assert_eq!(f, Vector3::zeros());
        assert_eq!(m, Vector3::zeros());
    }

    #[test]
    fn test_single_normal_cancels_acceleration() {
        let solver = ContactSolver::default();
        let inputs = falling_inputs(10.0);
        // z is down; the normal pushes up against a 1 g fall
        let mut contacts = vec![ContactConstraint::at_point(
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::zeros(),
            0.0,
            f64::MAX,
        )];

        let (f, _) = solver.solve(
            &inputs,
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
            &mut contacts,
        );

        assert_relative_eq!(contacts[0].value, 98.1, epsilon = 1e-9);
        assert_relative_eq!(f.z, -98.1, epsilon = 1e-9);
    }

    #[test]
    fn test_multiplier_clamped_at_upper_bound() {
        let solver = ContactSolver::default();
        let inputs = falling_inputs(10.0);
        let mut contacts = vec![ContactConstraint::at_point(
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::zeros(),
            0.0,
            50.0,
        )];

        solver.solve(
            &inputs,
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
            &mut contacts,
        );

        assert_eq!(
            contacts[0].value, 50.0,
            "multiplier should saturate at its upper bound"
        );
    }

    #[test]
    fn test_complementarity_over_gear_triangle() {
        let solver = ContactSolver::default();
        let inputs = falling_inputs(1200.0);
        let up = Vector3::new(0.0, 0.0, -1.0);
        // nose and two main gear legs, CG slightly aft of the nose leg
        let mut contacts = vec![
            ContactConstraint::at_point(up, Vector3::new(2.0, 0.0, 1.0), 0.0, f64::MAX),
            ContactConstraint::at_point(up, Vector3::new(-1.0, 1.5, 1.0), 0.0, f64::MAX),
            ContactConstraint::at_point(up, Vector3::new(-1.0, -1.5, 1.0), 0.0, f64::MAX),
        ];

        let uvw_dot = Vector3::new(0.0, 0.0, 9.81);
        let pqr_dot = Vector3::new(0.0, 0.3, 0.0);
        let (f, m) = solver.solve(&inputs, uvw_dot, pqr_dot, &mut contacts);

        let post_vdot = uvw_dot + f / inputs.mass;
        let post_wdot = pqr_dot + inputs.inertia_inv * m;

        for (i, c) in contacts.iter().enumerate() {
            let residual =
                c.force_jacobian.dot(&post_vdot) + c.moment_jacobian.dot(&post_wdot);
            let interior = c.value > c.min && c.value < c.max;
            assert!(
                !interior || residual.abs() < 1e-4,
                "contact {} violates complementarity: lambda {} residual {}",
                i,
                c.value,
                residual
            );
            assert!(
                c.value >= c.min && c.value <= c.max,
                "contact {} multiplier {} escaped its bounds",
                i,
                c.value
            );
        }
    }

    #[test]
    fn test_velocity_error_term_only_with_timestep() {
        let solver = ContactSolver::default();
        let mut inputs = falling_inputs(10.0);
        inputs.uvw = Vector3::new(0.0, 0.0, 2.0); // sinking at 2 m/s

        let constraint = ContactConstraint::at_point(
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::zeros(),
            0.0,
            f64::MAX,
        );

        let mut instantaneous = vec![constraint.clone()];
        inputs.dt = 0.0;
        solver.solve(
            &inputs,
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
            &mut instantaneous,
        );

        let mut corrected = vec![constraint];
        inputs.dt = 0.01;
        solver.solve(
            &inputs,
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
            &mut corrected,
        );

        assert_relative_eq!(instantaneous[0].value, 98.1, epsilon = 1e-9);
        // the corrected solve also has to kill 2 m/s over 10 ms
        assert_relative_eq!(corrected[0].value, 98.1 + 10.0 * 2.0 / 0.01, epsilon = 1e-9);
    }
}
