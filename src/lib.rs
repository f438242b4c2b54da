//! # Ship It Admin Library
//!
//! Client-side core of the Ship It release-administration tool: backend
//! API wrappers, VCS lookups, phase status reconciliation, release planning
//! and merge-automation polling. The `shipit-admin` binary is a thin
//! command-line layer over these modules.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod fanout;
pub mod inflight;
pub mod models;
pub mod planning;
pub mod poller;
pub mod status;
pub mod taskcluster;
pub mod telemetry;
pub mod vcs;

pub use error::{Result, ShipitError};
