use std::fmt;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::model::{FlightControl, FlightModel, InitialConditions};
use crate::trim::channel::{ControlVariable, StateVariable, TrimChannel};
use crate::utils::errors::SimError;

/// Built-in channel sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMode {
    /// Longitudinal axes only: wdot/alpha, udot/throttle, qdot/pitch trim.
    Longitudinal,
    /// Longitudinal plus vdot/phi, pdot/aileron and rdot/rudder.
    Full,
    /// On-gear attitude: wdot/gear height, qdot/theta, pdot/phi.
    Ground,
    /// Steady pull-up at a target load factor.
    Pullup,
    /// Coordinated turn at the current bank angle.
    Turn,
    /// Starts empty; the caller adds channels.
    Custom,
}

/// Outcome of one axis after a trim attempt.
#[derive(Debug, Clone)]
pub struct AxisReport {
    pub control_name: &'static str,
    /// Control value in display units (degrees for angle controls).
    pub control_value: f64,
    pub state_name: &'static str,
    /// The state itself, residual plus target.
    pub state_value: f64,
    pub tolerance: f64,
    pub passed: bool,
}

/// Per-axis breakdown of the most recent trim attempt.
#[derive(Debug, Clone)]
pub struct TrimReport {
    pub success: bool,
    /// Outer iterations spent.
    pub iterations: usize,
    pub axes: Vec<AxisReport>,
}

impl fmt::Display for TrimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Trim Results:")?;
        for axis in &self.axes {
            writeln!(
                f,
                "{:>20}: {:6.2} {:>5}: {:9.2e} Tolerance: {:.0e}  {}",
                axis.control_name,
                axis.control_value,
                axis.state_name,
                axis.state_value,
                axis.tolerance,
                if axis.passed { "Passed" } else { "Failed" },
            )?;
        }
        Ok(())
    }
}

/// Search statistics for one axis.
#[derive(Debug, Clone)]
pub struct AxisStats {
    pub state_name: &'static str,
    /// Root-finder sub-iterations accumulated over the whole attempt.
    pub sub_iterations: f64,
    /// Sub-iterations per outer iteration.
    pub average: f64,
    /// Outer iterations that ended with this axis in tolerance.
    pub successful: f64,
    /// Mean model evaluations per settle.
    pub stability_average: f64,
}

/// Iteration counters for the most recent trim attempt.
#[derive(Debug, Clone)]
pub struct TrimStats {
    pub total_iterations: usize,
    /// Settle calls summed over every axis.
    pub run_count: usize,
    pub axes: Vec<AxisStats>,
}

impl fmt::Display for TrimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Trim Statistics:")?;
        writeln!(f, "    Total Iterations: {}", self.total_iterations)?;
        if self.total_iterations > 0 {
            writeln!(f, "    Sub-iterations:")?;
            for axis in &self.axes {
                writeln!(
                    f,
                    "   {:>5}: {:3.0} average: {:5.2}  successful: {:3.0}  stability: {:5.2}",
                    axis.state_name,
                    axis.sub_iterations,
                    axis.average,
                    axis.successful,
                    axis.stability_average,
                )?;
            }
            writeln!(f, "    Run Count: {}", self.run_count)?;
        }
        Ok(())
    }
}

/// Multi-axis trim: drives every channel's residual to its target at once.
///
/// Each outer iteration runs a bracketed false-position search per axis;
/// axes whose solution drifts because another axis moved get their bracket
/// rebuilt rather than a fresh limit probe. The whole search runs with
/// integration suspended and talks to the model exclusively through the
/// channels.
pub struct AxisTrimmer {
    mode: TrimMode,
    channels: Vec<TrimChannel>,
    /// Per axis: a usable bracket was found at some point.
    solution: Vec<bool>,
    sub_iterations: Vec<f64>,
    successful: Vec<f64>,
    // Bracket shared by check_limits, find_interval and solve.
    xlo: f64,
    xhi: f64,
    alo: f64,
    ahi: f64,
    /// -1: root between the minimum and the current control, +1: between
    /// the current control and the maximum, 0: no bracket.
    solution_domain: i8,
    n_sub: usize,
    total_its: usize,
    failed: bool,
    max_iterations: usize,
    max_sub_iterations: usize,
    gamma_fallback: bool,
    target_nlf: f64,
    psi_dot: f64,
}

impl AxisTrimmer {
    pub fn new<M: FlightModel + ?Sized>(
        mode: TrimMode,
        model: &M,
        ic: &InitialConditions,
    ) -> Self {
        let pairs: &[(StateVariable, ControlVariable)] = match mode {
            TrimMode::Longitudinal => &[
                (StateVariable::Wdot, ControlVariable::Alpha),
                (StateVariable::Udot, ControlVariable::Throttle),
                (StateVariable::Qdot, ControlVariable::PitchTrim),
            ],
            TrimMode::Full => &[
                (StateVariable::Wdot, ControlVariable::Alpha),
                (StateVariable::Udot, ControlVariable::Throttle),
                (StateVariable::Qdot, ControlVariable::PitchTrim),
                (StateVariable::Vdot, ControlVariable::Phi),
                (StateVariable::Pdot, ControlVariable::Aileron),
                (StateVariable::Rdot, ControlVariable::Rudder),
            ],
            TrimMode::Ground => &[
                (StateVariable::Wdot, ControlVariable::AltAgl),
                (StateVariable::Qdot, ControlVariable::Theta),
                (StateVariable::Pdot, ControlVariable::Phi),
            ],
            TrimMode::Pullup => &[
                (StateVariable::Nlf, ControlVariable::Alpha),
                (StateVariable::Udot, ControlVariable::Throttle),
                (StateVariable::Qdot, ControlVariable::PitchTrim),
                (StateVariable::Hmgt, ControlVariable::Beta),
                (StateVariable::Vdot, ControlVariable::Phi),
                (StateVariable::Pdot, ControlVariable::Aileron),
                (StateVariable::Rdot, ControlVariable::Rudder),
            ],
            TrimMode::Turn => &[
                (StateVariable::Wdot, ControlVariable::Alpha),
                (StateVariable::Udot, ControlVariable::Throttle),
                (StateVariable::Qdot, ControlVariable::PitchTrim),
                (StateVariable::Vdot, ControlVariable::Beta),
                (StateVariable::Pdot, ControlVariable::Aileron),
                (StateVariable::Rdot, ControlVariable::Rudder),
            ],
            TrimMode::Custom => &[],
        };
        let channels = pairs
            .iter()
            .map(|&(state, control)| TrimChannel::new(state, control, model, ic))
            .collect();
        Self {
            mode,
            channels,
            solution: Vec::new(),
            sub_iterations: Vec::new(),
            successful: Vec::new(),
            xlo: 0.0,
            xhi: 0.0,
            alo: 0.0,
            ahi: 0.0,
            solution_domain: 0,
            n_sub: 0,
            total_its: 0,
            failed: false,
            max_iterations: 60,
            max_sub_iterations: 100,
            gamma_fallback: false,
            target_nlf: 1.0,
            psi_dot: 0.0,
        }
    }

    pub fn mode(&self) -> TrimMode {
        self.mode
    }

    pub fn channels(&self) -> &[TrimChannel] {
        &self.channels
    }

    /// Allow replacing the udot/throttle axis with udot/gamma when the
    /// throttle saturates with everything else trimmed.
    pub fn set_gamma_fallback(&mut self, enabled: bool) {
        self.gamma_fallback = enabled;
    }

    /// Load factor a pull-up trims to. A turn overwrites this with
    /// 1/cos(bank).
    pub fn set_target_nlf(&mut self, nlf: f64) {
        self.target_nlf = nlf;
    }

    pub fn target_nlf(&self) -> f64 {
        self.target_nlf
    }

    /// Add a channel. Each state derivative may appear only once.
    pub fn add_channel(&mut self, channel: TrimChannel) -> Result<(), SimError> {
        if self.channels.iter().any(|c| c.state() == channel.state()) {
            return Err(SimError::InvalidConfig(format!(
                "duplicate trim state {}",
                channel.state().name()
            )));
        }
        self.channels.push(channel);
        Ok(())
    }

    /// Swap the control that moves `state`. Returns false when no channel
    /// holds that state.
    pub fn edit_channel<M: FlightModel + ?Sized>(
        &mut self,
        state: StateVariable,
        control: ControlVariable,
        model: &M,
        ic: &InitialConditions,
    ) -> bool {
        for channel in &mut self.channels {
            if channel.state() == state {
                *channel = TrimChannel::new(state, control, model, ic);
                return true;
            }
        }
        false
    }

    pub fn remove_channel(&mut self, state: StateVariable) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c.state() != state);
        self.channels.len() != before
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Drive every channel's residual into tolerance.
    ///
    /// Integration stays suspended for the whole search and the
    /// accelerations are re-derived before it resumes. An untrimmable
    /// condition is not an error: it comes back as a report with
    /// `success == false` after the saved controls and record have been
    /// restored. `Err` is reserved for model evaluation failures.
    pub fn do_trim<M: FlightModel + ?Sized>(
        &mut self,
        model: &mut M,
        ic: &mut InitialConditions,
    ) -> Result<TrimReport, SimError> {
        let saved_controls: Vec<(FlightControl, f64)> = FlightControl::ALL
            .iter()
            .map(|&c| (c, model.control(c)))
            .collect();
        let saved_ic = ic.clone();

        model.suspend_integration();
        let outcome = self.run_trim(model, ic, &saved_controls, &saved_ic);
        let finish = model.initialize_derivatives();
        model.resume_integration();
        outcome?;
        finish?;

        let report = self.report();
        if report.success {
            info!(iterations = self.total_its, "trim converged");
        } else {
            warn!(iterations = self.total_its, "trim failed");
        }
        Ok(report)
    }

    /// Per-axis breakdown of the most recent attempt.
    pub fn report(&self) -> TrimReport {
        TrimReport {
            success: !self.failed,
            iterations: self.total_its,
            axes: self
                .channels
                .iter()
                .map(|c| AxisReport {
                    control_name: c.control().name(),
                    control_value: c.control_display_value(),
                    state_name: c.state().name(),
                    state_value: c.residual() + c.target(),
                    tolerance: c.tolerance(),
                    passed: c.residual().abs() <= c.tolerance(),
                })
                .collect(),
        }
    }

    /// Iteration counters for the most recent attempt.
    pub fn stats(&self) -> TrimStats {
        let mut run_count = 0;
        let axes = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, c)| {
                run_count += c.run_count();
                let sub = self.sub_iterations.get(i).copied().unwrap_or(0.0);
                AxisStats {
                    state_name: c.state().name(),
                    sub_iterations: sub,
                    average: if self.total_its > 0 {
                        sub / self.total_its as f64
                    } else {
                        0.0
                    },
                    successful: self.successful.get(i).copied().unwrap_or(0.0),
                    stability_average: c.average_stability_iterations(),
                }
            })
            .collect();
        TrimStats {
            total_iterations: self.total_its,
            run_count,
            axes,
        }
    }

    fn run_trim<M: FlightModel + ?Sized>(
        &mut self,
        model: &mut M,
        ic: &mut InitialConditions,
        saved_controls: &[(FlightControl, f64)],
        saved_ic: &InitialConditions,
    ) -> Result<(), SimError> {
        let n_axes = self.channels.len();
        self.solution = vec![false; n_axes];
        self.sub_iterations = vec![0.0; n_axes];
        self.successful = vec![0.0; n_axes];
        self.total_its = 0;
        self.psi_dot = 0.0;

        ic.set_rates(Vector3::zeros());

        // Center every control and settle once from there.
        for i in 0..n_axes {
            let midpoint =
                0.5 * (self.channels[i].control_min() + self.channels[i].control_max());
            self.channels[i].set_control_value(midpoint);
            self.channels[i].settle(model, ic)?;
        }

        match self.mode {
            TrimMode::Pullup => {
                self.setup_pullup(model, ic);
                let target = self.target_nlf;
                if let Some(channel) = self
                    .channels
                    .iter_mut()
                    .find(|c| c.state() == StateVariable::Nlf)
                {
                    channel.set_target(target);
                }
            }
            TrimMode::Turn => self.setup_turn(model, ic),
            _ => {}
        }

        let mut n = 0usize;
        let mut trim_failed = false;
        let converged;
        loop {
            let mut axis_count = 0usize;
            for i in 0..n_axes {
                self.update_rates(model, ic);
                self.n_sub = 0;
                if !self.solution[i] {
                    if self.check_limits(i, model, ic)? {
                        self.solution[i] = true;
                        self.solve(i, model, ic)?;
                    }
                } else if self.find_interval(i, model, ic)? {
                    self.solve(i, model, ic)?;
                } else {
                    self.solution[i] = false;
                }
                self.sub_iterations[i] += self.n_sub as f64;
            }

            for i in 0..n_axes {
                if self.channels[i].in_tolerance(model) {
                    axis_count += 1;
                    self.successful[i] += 1.0;
                }
            }

            if n_axes > 1 && axis_count == n_axes - 1 {
                // Everything but one axis made it. If the holdout still has
                // a usable bracket, give it another outer iteration;
                // otherwise fall back to gamma for the throttle axis or
                // give up.
                for i in 0..n_axes {
                    if self.channels[i].in_tolerance(model) {
                        continue;
                    }
                    if self.check_limits(i, model, ic)? {
                        continue;
                    }
                    if self.gamma_fallback
                        && self.channels[i].state() == StateVariable::Udot
                        && self.channels[i].control() == ControlVariable::Throttle
                    {
                        warn!("cannot trim udot with throttle, trying flight path angle");
                        let park = if self.channels[i].residual() > 0.0 {
                            self.channels[i].control_min()
                        } else {
                            self.channels[i].control_max()
                        };
                        self.channels[i].set_control_value(park);
                        self.channels[i].settle(model, ic)?;
                        self.channels[i] = TrimChannel::new(
                            StateVariable::Udot,
                            ControlVariable::Gamma,
                            model,
                            ic,
                        );
                    } else {
                        warn!(
                            axis = self.channels[i].state().name(),
                            "axis does not appear to be trimmable"
                        );
                        trim_failed = true;
                    }
                }
            }

            n += 1;
            if n > self.max_iterations {
                trim_failed = true;
            }
            if axis_count >= n_axes {
                converged = true;
                break;
            }
            if trim_failed {
                converged = false;
                break;
            }
        }
        self.total_its = n;
        self.failed = !converged;

        if !converged {
            *ic = saved_ic.clone();
            for &(control, value) in saved_controls {
                model.set_control(control, value);
            }
            model.reinitialize(ic)?;
            model.run()?;
        }
        Ok(())
    }

    /// Refresh the coupled rate targets. A turn recomputes the turn rate
    /// from the current bank and pitch; a pull-up away from one g
    /// recomputes the pitch rate from the target load factor.
    fn update_rates<M: FlightModel + ?Sized>(&mut self, model: &M, ic: &mut InitialConditions) {
        match self.mode {
            TrimMode::Turn => {
                let phi = ic.phi();
                if phi.abs() > 0.001 && phi.abs() < 1.56 {
                    let theta = ic.theta();
                    self.psi_dot = model.gravity() * phi.tan() / ic.u();
                    ic.set_rates(Vector3::new(
                        -self.psi_dot * theta.sin(),
                        self.psi_dot * theta.cos() * phi.sin(),
                        self.psi_dot * theta.cos() * phi.cos(),
                    ));
                } else {
                    ic.set_rates(Vector3::zeros());
                }
            }
            TrimMode::Pullup if (self.target_nlf - 1.0).abs() > 0.01 => {
                let q = model.gravity() * (self.target_nlf - ic.gamma().cos())
                    / ic.true_airspeed();
                ic.set_q(q);
            }
            _ => {}
        }
    }

    fn setup_pullup<M: FlightModel + ?Sized>(&self, model: &M, ic: &mut InitialConditions) {
        let q = model.gravity() * (self.target_nlf - ic.gamma().cos()) / ic.true_airspeed();
        info!(
            pitch_rate = q,
            target_nlf = self.target_nlf,
            "pull-up rates seeded"
        );
        ic.set_q(q);
    }

    fn setup_turn<M: FlightModel + ?Sized>(&mut self, model: &M, ic: &InitialConditions) {
        let phi = ic.phi();
        if phi.abs() > 0.001 && phi.abs() < 1.56 {
            self.target_nlf = 1.0 / phi.cos();
            self.psi_dot = model.gravity() * phi.tan() / ic.u();
            info!(
                target_nlf = self.target_nlf,
                turn_rate = self.psi_dot,
                "turn rates seeded"
            );
        }
    }

    /// Probe both control extremes. True when a sign change brackets a root
    /// between the current control and one extreme; the control is restored
    /// either way.
    fn check_limits<M: FlightModel + ?Sized>(
        &mut self,
        i: usize,
        model: &mut M,
        ic: &mut InitialConditions,
    ) -> Result<bool, SimError> {
        let current_control = self.channels[i].control_value();
        let current_accel = self.channels[i].residual();
        let min = self.channels[i].control_min();
        let max = self.channels[i].control_max();

        self.channels[i].set_control_value(min);
        self.channels[i].settle(model, ic)?;
        self.alo = self.channels[i].residual();

        self.channels[i].set_control_value(max);
        self.channels[i].settle(model, ic)?;
        self.ahi = self.channels[i].residual();

        debug!(
            axis = self.channels[i].state().name(),
            alo = self.alo,
            ahi = self.ahi,
            "control limit probe"
        );

        let mut solution_exists = false;
        self.solution_domain = 0;
        self.xlo = current_control;
        self.xhi = current_control;
        if (self.alo - self.ahi).abs() > self.channels[i].tolerance() {
            if self.alo * current_accel <= 0.0 {
                solution_exists = true;
                self.solution_domain = -1;
                self.xlo = min;
                self.ahi = current_accel;
            } else if current_accel * self.ahi < 0.0 {
                solution_exists = true;
                self.solution_domain = 1;
                self.xhi = max;
                self.alo = current_accel;
            }
        }

        self.channels[i].set_control_value(current_control);
        self.channels[i].settle(model, ic)?;
        Ok(solution_exists)
    }

    /// Grow a window around the current control, doubling every attempt,
    /// until the residual changes sign across it; on success the side the
    /// root is not on is pulled back to the previous window. Gives up once
    /// the window fills the whole range without a sign change or the
    /// sub-iteration budget runs out.
    fn find_interval<M: FlightModel + ?Sized>(
        &mut self,
        i: usize,
        model: &mut M,
        ic: &mut InitialConditions,
    ) -> Result<bool, SimError> {
        let current_control = self.channels[i].control_value();
        let current_accel = self.channels[i].residual();
        let min = self.channels[i].control_min();
        let max = self.channels[i].control_max();
        let tolerance = self.channels[i].tolerance();

        let mut found = false;
        let mut step = 0.025 * max.abs();
        self.xlo = current_control;
        self.xhi = current_control;
        self.alo = current_accel;
        self.ahi = current_accel;
        let mut last_xlo = self.xlo;
        let mut last_xhi = self.xhi;
        let mut last_alo = self.alo;
        let mut last_ahi = self.ahi;

        loop {
            self.n_sub += 1;
            step *= 2.0;
            self.xlo -= step;
            if self.xlo < min {
                self.xlo = min;
            }
            self.xhi += step;
            if self.xhi > max {
                self.xhi = max;
            }

            self.channels[i].set_control_value(self.xlo);
            self.channels[i].settle(model, ic)?;
            self.alo = self.channels[i].residual();

            self.channels[i].set_control_value(self.xhi);
            self.channels[i].settle(model, ic)?;
            self.ahi = self.channels[i].residual();

            // A spread inside the tolerance says nothing about a root yet;
            // keep widening.
            if (self.ahi - self.alo).abs() > tolerance {
                if self.alo * self.ahi <= 0.0 {
                    found = true;
                    if self.alo * current_accel <= 0.0 {
                        self.xhi = last_xlo;
                        self.ahi = last_alo;
                    } else {
                        self.xlo = last_xhi;
                        self.alo = last_ahi;
                    }
                }
                last_xlo = self.xlo;
                last_xhi = self.xhi;
                last_alo = self.alo;
                last_ahi = self.ahi;
            }

            debug!(
                n_sub = self.n_sub,
                xlo = self.xlo,
                xhi = self.xhi,
                "bracket search window"
            );

            if found || self.n_sub > self.max_sub_iterations {
                break;
            }
            // Saturated both bounds with no sign change; widening further
            // cannot change the probes.
            if self.xlo == min && self.xhi == max {
                break;
            }
        }
        Ok(found)
    }

    /// Modified false position over the current bracket. The endpoint that
    /// survives an iteration has its residual relaxed by 0.9 so the
    /// interpolation cannot stall against one side (Illinois rule).
    fn solve<M: FlightModel + ?Sized>(
        &mut self,
        i: usize,
        model: &mut M,
        ic: &mut InitialConditions,
    ) -> Result<bool, SimError> {
        const RELAX: f64 = 0.9;
        let eps = self.channels[i].solver_eps();

        if self.solution_domain == 0 {
            return Ok(false);
        }

        let mut x1 = self.xlo;
        let mut f1 = self.alo;
        let mut x3 = self.xhi;
        let mut f3 = self.ahi;
        let d0 = (x3 - x1).abs();
        if d0 == 0.0 {
            return Ok(false);
        }
        let mut d: f64 = 1.0;

        while !self.channels[i].in_tolerance(model)
            && d.abs() > eps
            && self.n_sub < self.max_sub_iterations
        {
            self.n_sub += 1;
            d = (x3 - x1) / d0;
            let x2 = x1 - d * d0 * f1 / (f3 - f1);

            self.channels[i].set_control_value(x2);
            self.channels[i].settle(model, ic)?;
            let f2 = self.channels[i].residual();

            debug!(
                n_sub = self.n_sub,
                x1, x2, x3, f1, f2, f3, "false position step"
            );

            if f1 * f2 <= 0.0 {
                x3 = x2;
                f3 = f2;
                f1 *= RELAX;
            } else if f2 * f3 <= 0.0 {
                x1 = x2;
                f1 = f2;
                f3 *= RELAX;
            }
        }
        Ok(self.n_sub < self.max_sub_iterations)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::*;
    use crate::model::FlightControls;
    use crate::utils::constants::GRAVITY;

    /// Instant linear test dynamics driven off the record and the controls:
    ///   udot = u_bias + u_throttle*throttle + u_alpha*alpha - u_gamma*sin(gamma)
    ///   wdot = w_alpha*(alpha - alpha_root) + w_throttle*throttle
    ///   qdot = q_trim*pitch_trim + q_alpha*alpha
    ///   nlf  = 1 + n_alpha*alpha
    struct LinearModel {
        controls: FlightControls,
        alpha: f64,
        gamma: f64,
        u_bias: f64,
        u_throttle: f64,
        u_alpha: f64,
        u_gamma: f64,
        w_alpha: f64,
        alpha_root: f64,
        w_throttle: f64,
        q_trim: f64,
        q_alpha: f64,
        n_alpha: f64,
        udot: f64,
        wdot: f64,
        qdot: f64,
        nlf: f64,
    }

    impl LinearModel {
        fn new() -> Self {
            Self {
                controls: FlightControls::default(),
                alpha: 0.0,
                gamma: 0.0,
                u_bias: 0.0,
                u_throttle: 0.0,
                u_alpha: 0.0,
                u_gamma: 0.0,
                w_alpha: 0.0,
                alpha_root: 0.0,
                w_throttle: 0.0,
                q_trim: 0.0,
                q_alpha: 0.0,
                n_alpha: 0.0,
                udot: 0.0,
                wdot: 0.0,
                qdot: 0.0,
                nlf: 1.0,
            }
        }
    }

    impl FlightModel for LinearModel {
        fn reinitialize(&mut self, ic: &InitialConditions) -> Result<(), SimError> {
            self.alpha = ic.alpha();
            self.gamma = ic.gamma();
            Ok(())
        }

        fn run(&mut self) -> Result<(), SimError> {
            self.udot = self.u_bias
                + self.u_throttle * self.controls.throttle
                + self.u_alpha * self.alpha
                - self.u_gamma * self.gamma.sin();
            self.wdot = self.w_alpha * (self.alpha - self.alpha_root)
                + self.w_throttle * self.controls.throttle;
            self.qdot = self.q_trim * self.controls.pitch_trim + self.q_alpha * self.alpha;
            self.nlf = 1.0 + self.n_alpha * self.alpha;
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
            Vector3::new(0.0, self.qdot, 0.0)
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
            self.nlf
        }

        fn heading(&self) -> f64 {
            0.0
        }

        fn ground_track(&self) -> f64 {
            0.0
        }
    }

    fn level_ic() -> InitialConditions {
        let mut ic = InitialConditions::new();
        ic.set_true_airspeed(60.0);
        ic
    }

    #[test]
    fn test_longitudinal_trim_converges_with_coupling() {
        let mut model = LinearModel::new();
        model.u_bias = -2.0;
        model.u_throttle = 8.0;
        model.u_alpha = 0.5;
        model.w_alpha = -20.0;
        model.alpha_root = 0.1;
        model.w_throttle = 0.3;
        model.q_trim = 2.0;
        model.q_alpha = -0.1;
        let mut ic = level_ic();

        let mut trimmer = AxisTrimmer::new(TrimMode::Longitudinal, &model, &ic);
        let report = trimmer.do_trim(&mut model, &mut ic).unwrap();

        assert!(report.success, "trim should converge:\n{report}");
        assert_eq!(report.axes.len(), 3);
        assert!(report.axes.iter().all(|a| a.passed));

        // Fixed point of the coupled linear system.
        assert_relative_eq!(ic.alpha(), 0.1037, epsilon = 5e-3);
        assert_relative_eq!(model.control(FlightControl::Throttle), 0.2435, epsilon = 5e-3);
        assert_relative_eq!(
            model.control(FlightControl::PitchTrim),
            0.0052,
            epsilon = 1e-3
        );

        let stats = trimmer.stats();
        assert_eq!(stats.total_iterations, report.iterations);
        assert!(stats.run_count > 0);
        assert_eq!(stats.axes.len(), 3);
    }

    #[test]
    fn test_mode_tables() {
        let model = LinearModel::new();
        let ic = level_ic();

        let pairs = |mode| {
            AxisTrimmer::new(mode, &model, &ic)
                .channels()
                .iter()
                .map(|c| (c.state(), c.control()))
                .collect::<Vec<_>>()
        };

        assert_eq!(
            pairs(TrimMode::Longitudinal),
            vec![
                (StateVariable::Wdot, ControlVariable::Alpha),
                (StateVariable::Udot, ControlVariable::Throttle),
                (StateVariable::Qdot, ControlVariable::PitchTrim),
            ]
        );
        assert_eq!(pairs(TrimMode::Full).len(), 6);
        assert_eq!(
            pairs(TrimMode::Ground),
            vec![
                (StateVariable::Wdot, ControlVariable::AltAgl),
                (StateVariable::Qdot, ControlVariable::Theta),
                (StateVariable::Pdot, ControlVariable::Phi),
            ]
        );
        assert_eq!(pairs(TrimMode::Pullup).len(), 7);
        assert_eq!(
            pairs(TrimMode::Pullup)[0],
            (StateVariable::Nlf, ControlVariable::Alpha)
        );
        assert_eq!(pairs(TrimMode::Turn).len(), 6);
        assert_eq!(
            pairs(TrimMode::Turn)[3],
            (StateVariable::Vdot, ControlVariable::Beta)
        );
        assert!(pairs(TrimMode::Custom).is_empty());
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let model = LinearModel::new();
        let ic = level_ic();

        let mut trimmer = AxisTrimmer::new(TrimMode::Custom, &model, &ic);
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Udot,
                ControlVariable::Throttle,
                &model,
                &ic,
            ))
            .unwrap();
        let err = trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Udot,
                ControlVariable::Gamma,
                &model,
                &ic,
            ))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[test]
    fn test_insensitive_axis_fails_and_restores() {
        let mut model = LinearModel::new();
        // Throttle has no effect and udot never reaches zero.
        model.u_bias = 0.7;
        model.w_alpha = -20.0;
        model.alpha_root = 0.1;
        let mut ic = level_ic();

        model.set_control(FlightControl::Throttle, 0.33);
        let saved_alpha = ic.alpha();

        let mut trimmer = AxisTrimmer::new(TrimMode::Custom, &model, &ic);
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Wdot,
                ControlVariable::Alpha,
                &model,
                &ic,
            ))
            .unwrap();
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Udot,
                ControlVariable::Throttle,
                &model,
                &ic,
            ))
            .unwrap();

        let report = trimmer.do_trim(&mut model, &mut ic).unwrap();

        assert!(!report.success);
        assert_eq!(report.iterations, 1);
        let udot_axis = report.axes.iter().find(|a| a.state_name == "udot").unwrap();
        assert!(!udot_axis.passed);

        // Controls and record go back to their pre-trim values.
        assert_eq!(model.control(FlightControl::Throttle), 0.33);
        assert_relative_eq!(ic.alpha(), saved_alpha);
    }

    #[test]
    fn test_gamma_fallback_replaces_throttle_axis() {
        let mut model = LinearModel::new();
        // udot stays positive over the whole throttle range but crosses
        // zero within the gamma range.
        model.u_bias = 0.5;
        model.u_throttle = 0.4;
        model.u_gamma = 3.0;
        model.w_alpha = -5.0;
        model.alpha_root = 0.1;
        let mut ic = level_ic();

        let mut trimmer = AxisTrimmer::new(TrimMode::Custom, &model, &ic);
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Wdot,
                ControlVariable::Alpha,
                &model,
                &ic,
            ))
            .unwrap();
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Udot,
                ControlVariable::Throttle,
                &model,
                &ic,
            ))
            .unwrap();
        trimmer.set_gamma_fallback(true);

        let report = trimmer.do_trim(&mut model, &mut ic).unwrap();

        assert!(report.success, "gamma fallback should rescue the trim:\n{report}");
        let udot_channel = trimmer
            .channels()
            .iter()
            .find(|c| c.state() == StateVariable::Udot)
            .unwrap();
        assert_eq!(udot_channel.control(), ControlVariable::Gamma);

        // Throttle was parked at its minimum before the swap; the residual
        // root sits at sin(gamma) = 0.5/3.
        assert_eq!(model.control(FlightControl::Throttle), 0.0);
        assert_relative_eq!(ic.gamma(), (0.5f64 / 3.0).asin(), epsilon = 1e-2);
    }

    #[test]
    fn test_coupled_drift_rebuilds_bracket() {
        let mut model = LinearModel::new();
        model.u_bias = -2.0;
        model.u_throttle = 8.0;
        model.w_alpha = -20.0;
        model.alpha_root = 0.1;
        model.w_throttle = 2.0;
        let mut ic = level_ic();

        let mut trimmer = AxisTrimmer::new(TrimMode::Custom, &model, &ic);
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Wdot,
                ControlVariable::Alpha,
                &model,
                &ic,
            ))
            .unwrap();
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Udot,
                ControlVariable::Throttle,
                &model,
                &ic,
            ))
            .unwrap();

        let report = trimmer.do_trim(&mut model, &mut ic).unwrap();

        assert!(report.success, "{report}");
        // The throttle solution drags wdot off its first root, so the wdot
        // axis must re-bracket at least once.
        assert!(report.iterations >= 2);
        assert_relative_eq!(model.control(FlightControl::Throttle), 0.25, epsilon = 1e-3);
        assert_relative_eq!(ic.alpha(), 0.125, epsilon = 1e-3);
    }

    #[test]
    fn test_find_interval_brackets_sign_change() {
        let mut model = LinearModel::new();
        // udot = -2 + 8 * throttle, root at 0.25.
        model.u_bias = -2.0;
        model.u_throttle = 8.0;
        let mut ic = level_ic();

        let mut trimmer = AxisTrimmer::new(TrimMode::Custom, &model, &ic);
        trimmer
            .add_channel(TrimChannel::new(
                StateVariable::Udot,
                ControlVariable::Throttle,
                &model,
                &ic,
            ))
            .unwrap();
        trimmer.channels[0].settle(&mut model, &mut ic).unwrap();

        let found = trimmer.find_interval(0, &mut model, &mut ic).unwrap();

        assert!(found);
        assert!(
            trimmer.alo * trimmer.ahi <= 0.0,
            "bracket residuals [{}, {}] must straddle zero",
            trimmer.alo,
            trimmer.ahi
        );
        assert!(trimmer.xlo <= 0.25 && 0.25 <= trimmer.xhi);
        assert!(trimmer.xlo >= 0.0 && trimmer.xhi <= 1.0);
    }

    #[test]
    fn test_turn_mode_seeds_rates_and_load_factor() {
        let mut model = LinearModel::new();
        let mut ic = level_ic();
        ic.set_phi(0.5);
        ic.set_theta(0.05);

        let mut trimmer = AxisTrimmer::new(TrimMode::Turn, &model, &ic);
        let report = trimmer.do_trim(&mut model, &mut ic).unwrap();

        assert!(report.success);
        assert_relative_eq!(trimmer.target_nlf(), 1.0 / 0.5f64.cos(), epsilon = 1e-12);

        let psi_dot = GRAVITY * ic.phi().tan() / ic.u();
        let theta = ic.theta();
        let phi = ic.phi();
        assert_relative_eq!(ic.p(), -psi_dot * theta.sin(), epsilon = 1e-9);
        assert_relative_eq!(ic.q(), psi_dot * theta.cos() * phi.sin(), epsilon = 1e-9);
        assert_relative_eq!(ic.r(), psi_dot * theta.cos() * phi.cos(), epsilon = 1e-9);
    }

    #[test]
    fn test_turn_mode_wings_level_zeroes_rates() {
        let mut model = LinearModel::new();
        let mut ic = level_ic();

        let mut trimmer = AxisTrimmer::new(TrimMode::Turn, &model, &ic);
        let report = trimmer.do_trim(&mut model, &mut ic).unwrap();

        assert!(report.success);
        assert_relative_eq!(trimmer.target_nlf(), 1.0);
        assert_eq!(ic.rates(), Vector3::zeros());
    }

    #[test]
    fn test_pullup_mode_trims_to_target_load_factor() {
        let mut model = LinearModel::new();
        model.n_alpha = 4.0;
        let mut ic = level_ic();

        let mut trimmer = AxisTrimmer::new(TrimMode::Pullup, &model, &ic);
        trimmer.set_target_nlf(2.0);
        let report = trimmer.do_trim(&mut model, &mut ic).unwrap();

        assert!(report.success, "{report}");
        let nlf_axis = report.axes.iter().find(|a| a.state_name == "nlf").unwrap();
        assert!(nlf_axis.passed);
        assert_relative_eq!(nlf_axis.state_value, 2.0, epsilon = 1e-4);
        assert_relative_eq!(ic.alpha(), 0.25, epsilon = 1e-4);

        // Pitch rate seeded from the load factor target.
        assert_relative_eq!(
            ic.q(),
            GRAVITY * (2.0 - ic.gamma().cos()) / ic.true_airspeed(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_report_display_formats_lines() {
        let report = TrimReport {
            success: false,
            iterations: 3,
            axes: vec![AxisReport {
                control_name: "Throttle",
                control_value: 0.5,
                state_name: "udot",
                state_value: 0.002,
                tolerance: 1e-3,
                passed: false,
            }],
        };
        let text = format!("{report}");
        assert!(text.contains("Throttle"));
        assert!(text.contains("udot"));
        assert!(text.contains("Failed"));
    }
}
