pub mod config;
pub mod db;
pub mod error;
pub mod forecast;
pub mod oauth;
pub mod pipeline;
pub mod prompt;
pub mod recorder;
pub mod spotify;
pub mod strava;
pub mod types;
