pub mod client;
pub mod extract;
pub mod selection;
pub mod streams;

pub use client::StravaClient;
pub use extract::{extract_all, ExtractReport, RateLimiter, StreamSource};
pub use selection::{choose_training_run, train_test_split};
