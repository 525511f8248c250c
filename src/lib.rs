pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hubs;
pub mod irrops;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod schedule;
pub mod server;
pub mod singleflight;
