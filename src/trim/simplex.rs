use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::errors::SimError;
use crate::utils::rng::WithRng;

/// Anything the simplex can minimize.
pub trait TrimObjective {
    fn eval(&mut self, design: &[f64]) -> Result<f64, SimError>;
}

impl<F> TrimObjective for F
where
    F: FnMut(&[f64]) -> f64,
{
    fn eval(&mut self, design: &[f64]) -> Result<f64, SimError> {
        Ok(self(design))
    }
}

/// Simplex search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexConfig {
    /// Relative cost spread below which the simplex is rebuilt around its
    /// best vertex.
    pub rtol: f64,
    /// Cost below which the search has converged.
    pub abstol: f64,
    /// Expansion factor; the 1-D contraction uses its reciprocal.
    pub speed: f64,
    /// Relative jitter applied to every geometric operation.
    pub randomization: f64,
    pub iter_max: usize,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-4,
            abstol: 1e-3,
            speed: 2.0,
            randomization: 0.1,
            iter_max: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplexStatus {
    Running,
    Converged,
}

/// Bounded Nelder-Mead with randomized stretch factors.
///
/// Whenever the relative cost spread over the simplex drops under `rtol`
/// the simplex is rebuilt at `step` scale around its best vertex, which
/// shakes the search out of premature collapse; if a rebuild finds the
/// best cost unchanged from the previous rebuild the search is declared
/// stuck. Every vertex the search ever proposes is clamped into
/// [lower, upper].
#[derive(Debug)]
pub struct NelderMead {
    config: SimplexConfig,
    guess: Vec<f64>,
    step: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    simplex: Vec<Vec<f64>>,
    costs: Vec<f64>,
    elem_sum: Vec<f64>,
    i_max: usize,
    i_next_max: usize,
    i_min: usize,
    rtol_i: f64,
    min_cost_prev_resize: f64,
    iter: usize,
    rng: ChaCha8Rng,
}

impl NelderMead {
    pub fn new(
        config: SimplexConfig,
        guess: &[f64],
        step: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<Self, SimError> {
        let n_dim = guess.len();
        if n_dim == 0 {
            return Err(SimError::InvalidConfig("empty design vector".into()));
        }
        if step.len() != n_dim || lower.len() != n_dim || upper.len() != n_dim {
            return Err(SimError::InvalidConfig(format!(
                "design vector has {n_dim} elements but step/lower/upper have {}/{}/{}",
                step.len(),
                lower.len(),
                upper.len()
            )));
        }
        for d in 0..n_dim {
            if lower[d] > upper[d] {
                return Err(SimError::InvalidConfig(format!(
                    "lower bound {} above upper bound {} in element {d}",
                    lower[d], upper[d]
                )));
            }
        }
        Ok(Self {
            config,
            guess: guess.to_vec(),
            step: step.to_vec(),
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            simplex: vec![vec![0.0; n_dim]; n_dim + 1],
            costs: vec![0.0; n_dim + 1],
            elem_sum: vec![0.0; n_dim],
            i_max: 0,
            i_next_max: 0,
            i_min: 0,
            rtol_i: 0.0,
            min_cost_prev_resize: 0.0,
            iter: 0,
            rng: ChaCha8Rng::from_entropy(),
        })
    }

    /// Best vertex found so far. Meaningful after the first `iterate`.
    pub fn best_vertex(&self) -> &[f64] {
        &self.simplex[self.i_min]
    }

    pub fn min_cost(&self) -> f64 {
        self.costs[self.i_min]
    }

    pub fn iterations(&self) -> usize {
        self.iter
    }

    /// One simplex step: rank the vertices, then reflect, expand or
    /// contract away from the worst one.
    pub fn iterate(
        &mut self,
        objective: &mut impl TrimObjective,
    ) -> Result<SimplexStatus, SimError> {
        let n_dim = self.guess.len();
        let n_vert = n_dim + 1;

        if self.iter == 0 {
            self.construct_simplex();
        } else if self.rtol_i < self.config.rtol {
            let min_cost = self.costs[self.i_min];
            if (min_cost - self.min_cost_prev_resize).abs() < f32::EPSILON as f64 {
                return Err(SimError::SimplexStuck { cost: min_cost });
            }
            self.guess.clone_from_slice(&self.simplex[self.i_min]);
            self.min_cost_prev_resize = min_cost;
            debug!(cost = min_cost, "simplex rebuilt around best vertex");
            self.construct_simplex();
        }

        for vertex in 0..n_vert {
            self.costs[vertex] = objective.eval(&self.simplex[vertex])?;
        }

        // Rank the vertices: worst, second worst, best.
        let mut i_min = 0;
        let mut i_max = 0;
        for v in 1..n_vert {
            if self.costs[v] < self.costs[i_min] {
                i_min = v;
            }
            if self.costs[v] > self.costs[i_max] {
                i_max = v;
            }
        }
        let mut i_next_max = if i_max == 0 { 1 } else { 0 };
        for v in 0..n_vert {
            if v != i_max && self.costs[v] > self.costs[i_next_max] {
                i_next_max = v;
            }
        }
        self.i_min = i_min;
        self.i_max = i_max;
        self.i_next_max = i_next_max;

        self.rtol_i = 2.0 * (self.costs[i_max] - self.costs[i_min]).abs()
            / (self.costs[i_max].abs() + self.costs[i_min].abs() + f64::EPSILON);

        if self.iter > self.config.iter_max {
            return Err(SimError::SimplexExhausted {
                iterations: self.iter,
                cost: self.costs[i_min],
            });
        }
        if self.costs[i_min] < self.config.abstol {
            info!(
                cost = self.costs[i_min],
                iterations = self.iter,
                "simplex converged"
            );
            return Ok(SimplexStatus::Converged);
        }

        for d in 0..n_dim {
            self.elem_sum[d] = self.simplex.iter().map(|v| v[d]).sum();
        }

        let cost_try = self.try_stretch(objective, -1.0)?;
        if cost_try <= self.costs[self.i_min] {
            self.try_stretch(objective, self.config.speed)?;
        } else if cost_try > self.costs[self.i_next_max] {
            let contracted = self.try_stretch(objective, 1.0 / self.config.speed)?;
            if contracted > self.costs[self.i_max] {
                // Pull every vertex halfway in toward the best one.
                let best = self.simplex[self.i_min].clone();
                for vertex in 0..n_vert {
                    for d in 0..n_dim {
                        let pulled =
                            self.randomizer() * 0.5 * (self.simplex[vertex][d] + best[d]);
                        self.simplex[vertex][d] = pulled.clamp(self.lower[d], self.upper[d]);
                    }
                }
            }
        }

        self.iter += 1;
        Ok(SimplexStatus::Running)
    }

    /// Move the worst vertex through the opposite face by `factor`,
    /// keeping it when it improves on the worst cost.
    fn try_stretch(
        &mut self,
        objective: &mut impl TrimObjective,
        factor: f64,
    ) -> Result<f64, SimError> {
        let n_dim = self.guess.len();
        let factor_rand = factor * self.randomizer();
        let a = (1.0 - factor_rand) / n_dim as f64;
        let b = a - factor_rand;

        let mut trial = vec![0.0; n_dim];
        for d in 0..n_dim {
            trial[d] = (self.elem_sum[d] * a - self.simplex[self.i_max][d] * b)
                .clamp(self.lower[d], self.upper[d]);
        }
        let cost_try = objective.eval(&trial)?;

        if cost_try < self.costs[self.i_max] {
            for d in 0..n_dim {
                self.elem_sum[d] += trial[d] - self.simplex[self.i_max][d];
            }
            self.simplex[self.i_max].clone_from_slice(&trial);
            self.costs[self.i_max] = cost_try;
        }
        Ok(cost_try)
    }

    fn construct_simplex(&mut self) {
        for vertex in self.simplex.iter_mut() {
            vertex.clone_from_slice(&self.guess);
        }
        for d in 0..self.guess.len() {
            let jitter = self.step[d] * self.randomizer();
            self.simplex[d + 1][d] =
                (self.guess[d] + jitter).clamp(self.lower[d], self.upper[d]);
        }
    }

    fn randomizer(&mut self) -> f64 {
        1.0 + self.config.randomization * self.rng.gen_range(-1.0..=1.0)
    }
}

impl WithRng for NelderMead {
    fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.rng = rng;
        self
    }
}
