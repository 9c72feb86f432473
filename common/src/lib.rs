// Common library for the rebook self-rescheduling job engine

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod lock;
pub mod models;
pub mod probe;
pub mod seed;
pub mod store;
pub mod telemetry;
