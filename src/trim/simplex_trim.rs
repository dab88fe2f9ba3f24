use std::fmt;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{FlightModel, InitialConditions};
use crate::trim::cost::{TrimConstraints, TrimCost};
use crate::trim::simplex::{NelderMead, SimplexConfig, SimplexStatus, TrimObjective};
use crate::utils::errors::SimError;
use crate::utils::rng::WithRng;

/// Search range for one design element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlRange {
    pub guess: f64,
    pub step: f64,
    pub min: f64,
    pub max: f64,
}

/// Settings for a full simplex trim: per-control search ranges, the
/// simplex parameters and the flight condition to hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexTrimConfig {
    pub throttle: ControlRange,
    pub elevator: ControlRange,
    pub alpha: ControlRange,
    pub aileron: ControlRange,
    pub rudder: ControlRange,
    pub beta: ControlRange,
    pub rtol: f64,
    pub abstol: f64,
    pub speed: f64,
    pub randomization: f64,
    pub iter_max: usize,
    pub constraints: TrimConstraints,
}

impl Default for SimplexTrimConfig {
    fn default() -> Self {
        let simplex = SimplexConfig::default();
        Self {
            throttle: ControlRange {
                guess: 0.5,
                step: 0.2,
                min: 0.0,
                max: 1.0,
            },
            elevator: ControlRange {
                guess: 0.0,
                step: 0.1,
                min: -1.0,
                max: 1.0,
            },
            alpha: ControlRange {
                guess: 0.05,
                step: 0.05,
                min: (-5.0f64).to_radians(),
                max: 20.0f64.to_radians(),
            },
            aileron: ControlRange {
                guess: 0.0,
                step: 0.1,
                min: -1.0,
                max: 1.0,
            },
            rudder: ControlRange {
                guess: 0.0,
                step: 0.1,
                min: -1.0,
                max: 1.0,
            },
            beta: ControlRange {
                guess: 0.0,
                step: 0.05,
                min: (-30.0f64).to_radians(),
                max: 30.0f64.to_radians(),
            },
            rtol: simplex.rtol,
            abstol: simplex.abstol,
            speed: simplex.speed,
            randomization: simplex.randomization,
            iter_max: simplex.iter_max,
            constraints: TrimConstraints::default(),
        }
    }
}

impl SimplexTrimConfig {
    /// Load from a YAML file. Missing fields fall back to the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    fn ranges(&self) -> [ControlRange; 6] {
        [
            self.throttle,
            self.elevator,
            self.alpha,
            self.aileron,
            self.rudder,
            self.beta,
        ]
    }

    fn simplex_config(&self) -> SimplexConfig {
        SimplexConfig {
            rtol: self.rtol,
            abstol: self.abstol,
            speed: self.speed,
            randomization: self.randomization,
            iter_max: self.iter_max,
        }
    }
}

/// A converged simplex trim. Angles are radians.
#[derive(Debug, Clone)]
pub struct TrimSolution {
    pub throttle: f64,
    pub elevator: f64,
    pub alpha: f64,
    pub aileron: f64,
    pub rudder: f64,
    pub beta: f64,
    pub cost: f64,
    pub iterations: usize,
    pub elapsed: Duration,
}

impl fmt::Display for TrimSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Simplex Trim Solution:")?;
        writeln!(f, "    throttle:   {:8.4}", self.throttle)?;
        writeln!(f, "    elevator:   {:8.4}", self.elevator)?;
        writeln!(f, "    alpha:      {:8.4} deg", self.alpha.to_degrees())?;
        writeln!(f, "    aileron:    {:8.4}", self.aileron)?;
        writeln!(f, "    rudder:     {:8.4}", self.rudder)?;
        writeln!(f, "    beta:       {:8.4} deg", self.beta.to_degrees())?;
        writeln!(f, "    cost:       {:10.3e}", self.cost)?;
        writeln!(f, "    iterations: {}", self.iterations)?;
        write!(f, "    elapsed:    {:.1?}", self.elapsed)
    }
}

/// Bridges the flight-model cost into the simplex objective.
struct CostObjective<'a, M: FlightModel + ?Sized> {
    cost: &'a TrimCost,
    model: &'a mut M,
    ic: &'a mut InitialConditions,
}

impl<M: FlightModel + ?Sized> TrimObjective for CostObjective<'_, M> {
    fn eval(&mut self, design: &[f64]) -> Result<f64, SimError> {
        self.cost.eval(self.model, self.ic, design)
    }
}

/// Drives the randomized simplex over the six-element design vector
/// (throttle, elevator, alpha, aileron, rudder, beta) and leaves the model
/// settled at the winning condition.
pub struct SimplexTrim {
    config: SimplexTrimConfig,
}

impl SimplexTrim {
    pub fn new(config: SimplexTrimConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimplexTrimConfig {
        &self.config
    }

    /// Run the search to convergence. Integration stays suspended for the
    /// duration and is resumed on every exit path; on failure the model is
    /// left at the last probed condition.
    pub fn trim<M: FlightModel + ?Sized>(
        &self,
        model: &mut M,
        ic: &mut InitialConditions,
    ) -> Result<TrimSolution, SimError> {
        self.trim_with(model, ic, None)
    }

    /// As `trim`, with an injected random stream for reproducible runs.
    pub fn trim_seeded<M: FlightModel + ?Sized>(
        &self,
        model: &mut M,
        ic: &mut InitialConditions,
        rng: ChaCha8Rng,
    ) -> Result<TrimSolution, SimError> {
        self.trim_with(model, ic, Some(rng))
    }

    fn trim_with<M: FlightModel + ?Sized>(
        &self,
        model: &mut M,
        ic: &mut InitialConditions,
        rng: Option<ChaCha8Rng>,
    ) -> Result<TrimSolution, SimError> {
        let started = Instant::now();
        let ranges = self.config.ranges();
        let guess: Vec<f64> = ranges.iter().map(|r| r.guess).collect();
        let step: Vec<f64> = ranges.iter().map(|r| r.step).collect();
        let lower: Vec<f64> = ranges.iter().map(|r| r.min).collect();
        let upper: Vec<f64> = ranges.iter().map(|r| r.max).collect();

        let mut nm =
            NelderMead::new(self.config.simplex_config(), &guess, &step, &lower, &upper)?;
        if let Some(rng) = rng {
            nm = nm.with_rng(rng);
        }
        let cost = TrimCost::new(self.config.constraints.clone());

        model.suspend_integration();
        let outcome = Self::search(&cost, &mut nm, model, ic);
        let finish = model.initialize_derivatives();
        model.resume_integration();
        outcome?;
        finish?;

        let best = nm.best_vertex();
        let solution = TrimSolution {
            throttle: best[0],
            elevator: best[1],
            alpha: best[2],
            aileron: best[3],
            rudder: best[4],
            beta: best[5],
            cost: nm.min_cost(),
            iterations: nm.iterations(),
            elapsed: started.elapsed(),
        };
        info!(
            cost = solution.cost,
            iterations = solution.iterations,
            "simplex trim converged"
        );
        Ok(solution)
    }

    fn search<M: FlightModel + ?Sized>(
        cost: &TrimCost,
        nm: &mut NelderMead,
        model: &mut M,
        ic: &mut InitialConditions,
    ) -> Result<(), SimError> {
        let mut objective = CostObjective { cost, model, ic };
        while nm.iterate(&mut objective)? == SimplexStatus::Running {}
        // Settle the model at the winning vertex before handing it back.
        let best = nm.best_vertex().to_vec();
        objective.eval(&best)?;
        Ok(())
    }
}
