pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod routes;
pub mod state;
pub mod stream;
pub mod telemetry;
