//! Discretized privacy loss distribution accounting.
//!
//! A privacy loss distribution (PLD) represents the log-likelihood-ratio
//! distribution of a randomized mechanism on two neighboring inputs,
//! projected onto a fixed grid with one-sided rounding. From it the
//! epsilon-hockey-stick divergence can be evaluated exactly on the grid,
//! giving the delta of (epsilon, delta)-differential privacy; PLDs of
//! independent mechanisms compose by convolution.
//!
//! Constructors cover the Laplace, Gaussian, discrete Laplace, discrete
//! Gaussian, and randomized response mechanisms, raw probability mass
//! function pairs, and the worst-case distribution of an
//! (epsilon, delta)-DP guarantee.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod discrete;
pub mod mechanism;
pub mod pld;
pub mod pmf;
pub mod serialization;

pub use discrete::{DiscreteGaussianPrivacyLoss, DiscreteLaplacePrivacyLoss};
pub use mechanism::{
    AdditiveNoisePrivacyLoss, EstimateType, GaussianPrivacyLoss, LaplacePrivacyLoss,
    PrivacyLossTail,
};
pub use pld::{
    PrivacyLossDistribution, DEFAULT_DISCRETIZATION_INTERVAL, DEFAULT_LOG_MASS_TRUNCATION_BOUND,
    DEFAULT_TAIL_MASS_TRUNCATION,
};
pub use pmf::GridPmf;
pub use serialization::SerializedPld;

/// Common imports for working with privacy loss distributions.
pub mod prelude {
    pub use crate::{
        AdditiveNoisePrivacyLoss, DiscreteGaussianPrivacyLoss, DiscreteLaplacePrivacyLoss,
        EstimateType, GaussianPrivacyLoss, GridPmf, LaplacePrivacyLoss, PrivacyLossDistribution,
        SerializedPld, DEFAULT_DISCRETIZATION_INTERVAL, DEFAULT_LOG_MASS_TRUNCATION_BOUND,
        DEFAULT_TAIL_MASS_TRUNCATION,
    };
    pub use pld_accounting_core::{AccountingError, Result};
}
