mod channel;
mod cost;
mod simplex;
mod simplex_trim;
mod trimmer;

pub use channel::{ControlVariable, StateVariable, TrimChannel};
pub use cost::{TrimConstraints, TrimCost};
pub use simplex::{NelderMead, SimplexConfig, SimplexStatus, TrimObjective};
pub use simplex_trim::{ControlRange, SimplexTrim, SimplexTrimConfig, TrimSolution};
pub use trimmer::{AxisReport, AxisStats, AxisTrimmer, TrimMode, TrimReport, TrimStats};
