//! Error handling module
//!
//! Crate-wide error taxonomy: domain errors translated from HTTP responses,
//! credential lifecycle errors, configuration errors and raw transport errors.

mod error;

pub use error::{ProductboardError, Result};
