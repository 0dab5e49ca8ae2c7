pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod validation;
