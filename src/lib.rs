// Library exports for Imager
// This allows integration tests and external code to use Imager modules

pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod gallery;
pub mod media;
pub mod routes;
pub mod state;
