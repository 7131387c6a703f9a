pub mod driver;
pub mod model;
pub mod quiet;
pub mod timing;

pub use driver::{iteration_count, WalkForward, WalkForwardConfig, WalkForwardOutput};
pub use model::{Forecaster, LinearTrendModel, Regressor};
