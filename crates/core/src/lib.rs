//! Core numeric building blocks for privacy loss accounting.
//!
//! This crate provides the accounting-agnostic pieces: error types shared
//! by every fallible operation, and the numeric helpers (compensated
//! summation, log-domain arithmetic, grid rounding, monotone bisection)
//! that the distribution crate is built on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod numeric;

pub use error::{AccountingError, Result};
pub use numeric::{
    bisect_nonincreasing, ceil_to_grid, floor_to_grid, log_add_exp, log_sum_exp, KahanSum,
};
