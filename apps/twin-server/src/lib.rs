pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod mode;
pub mod routes;
pub mod services;
pub mod simulator;
pub mod state;
pub mod telemetry;
pub mod users;

#[cfg(test)]
pub mod test_support;
