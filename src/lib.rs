pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod services;
pub mod state;
