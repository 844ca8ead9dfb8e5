//! HTTP API for the RFP desk.

pub mod routes;

pub use routes::{ApiState, api_routes};
