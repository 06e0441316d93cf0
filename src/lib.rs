//! Gym equipment asset register
//!
//! Tracks gym equipment assets and analyses equipment photos with a remote
//! vision model. Photo analysis runs as asynchronous jobs: callers submit an
//! image, receive a job id immediately, and poll for the result while
//! background workers drive the remote call.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod worker;
