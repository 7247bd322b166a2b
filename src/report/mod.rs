//! Plain-text reports for the CLI and the `/compare?download=true` attachment.

pub mod format;

pub use format::*;
