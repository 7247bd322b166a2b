//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - subset and estimate exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
