//! `icar-yield` library crate.
//!
//! The binary (`icar`) is a thin wrapper around this library so that:
//!
//! - estimation and comparison are testable without spawning processes
//! - the HTTP service and the offline CLI share one pipeline

pub mod app;
pub mod cli;
pub mod compare;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod estimate;
pub mod io;
pub mod report;
pub mod server;
pub mod store;
