//! Republishes Netatmo weather-station readings into InfluxDB.
//!
//! One run loads the configuration, opens a Netatmo session (persisting a
//! refreshed token back into the config file), fetches the station snapshot,
//! maps every module's readings into tagged points and writes them.

pub mod batching;
pub mod config;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod mapper;
pub mod model;
pub mod netatmo;
pub mod pipeline;

pub use errors::{Error, Result};
