// Library exports for Parley
// This allows integration tests and external code to use Parley modules

pub mod config;
pub mod db;
pub mod discussions;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod users;
