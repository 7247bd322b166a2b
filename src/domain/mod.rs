//! Domain types used throughout the service.
//!
//! This module defines:
//!
//! - estimator inputs/outputs (`DailyRecord`, `LactationSeries`, `YieldEstimate`)
//! - comparison outputs (`MetricsResult`, `ParityGroup`)
//! - persisted entities (`User`, `Generate`, `Submission`)

pub mod records;
pub mod types;

pub use records::*;
pub use types::*;
