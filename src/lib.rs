//! GabayLakad: caregiver monitoring backend for smart-cane telemetry.
//!
//! The `gabaylakad` binary serves the REST API and the live location relay;
//! `gabaylakad-sim` drives virtual canes against it.

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod geocode;
pub mod ingest;
pub mod relay;
pub mod repo;
pub mod simulator;
pub mod state;
pub mod telemetry;
