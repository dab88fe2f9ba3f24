pub mod constants;
pub mod errors;
pub mod rng;

pub use constants::*;
pub use errors::*;
pub use rng::*;
