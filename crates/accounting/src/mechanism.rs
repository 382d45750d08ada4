//! Privacy loss models for continuous additive noise mechanisms.
//!
//! A mechanism is described through its privacy loss curve over outcomes
//! and the CDF of its upper distribution; projecting that description onto
//! the discretized grid is the distribution constructor's job.

use pld_accounting_core::{AccountingError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Rounding direction used when projecting losses onto the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimateType {
    /// Round so that computed divergences upper-bound the true values.
    Pessimistic,
    /// Round so that computed divergences lower-bound the true values.
    Optimistic,
}

impl EstimateType {
    /// Whether this is the pessimistic direction.
    pub fn is_pessimistic(self) -> bool {
        matches!(self, EstimateType::Pessimistic)
    }
}

/// Truncation points of a noise distribution together with the privacy
/// loss assigned to the mass outside them.
#[derive(Clone, Debug)]
pub struct PrivacyLossTail {
    /// Outcomes below this point are covered by `tail_mass`.
    pub lower_x_truncation: f64,
    /// Outcomes above this point are covered by `tail_mass`.
    pub upper_x_truncation: f64,
    /// `(privacy_loss, mass)` pairs for the truncated regions. The loss
    /// may be `f64::INFINITY` for mass the lower distribution never sees.
    pub tail_mass: Vec<(f64, f64)>,
}

/// Privacy loss of an additive noise mechanism.
///
/// `privacy_loss` must be monotone non-increasing in the outcome `x`, with
/// `inverse_privacy_loss` its generalized inverse, and `mu_upper_cdf` the
/// CDF of the upper distribution over outcomes.
pub trait AdditiveNoisePrivacyLoss {
    /// Privacy loss at outcome `x`.
    fn privacy_loss(&self, x: f64) -> f64;

    /// Outcome at which the privacy loss has dropped to `loss`;
    /// `-INFINITY` / `INFINITY` when `loss` lies above or below the
    /// attainable range.
    fn inverse_privacy_loss(&self, loss: f64) -> f64;

    /// CDF of the upper distribution at `x`.
    fn mu_upper_cdf(&self, x: f64) -> f64;

    /// Truncation points and tail masses for the requested rounding.
    fn privacy_loss_tail(&self, estimate_type: EstimateType) -> PrivacyLossTail;
}

/// Privacy loss of the Laplace mechanism with scale `b` and sensitivity
/// `d`: `(|x - d| - |x|) / b`, ranging over `[-d/b, d/b]`.
#[derive(Clone, Debug)]
pub struct LaplacePrivacyLoss {
    parameter: f64,
    sensitivity: f64,
}

impl LaplacePrivacyLoss {
    /// Create the model, validating the parameters.
    pub fn new(parameter: f64, sensitivity: f64) -> Result<Self> {
        if !parameter.is_finite() || parameter <= 0.0 {
            return Err(AccountingError::invalid(
                "Laplace parameter must be positive and finite",
            ));
        }
        if !sensitivity.is_finite() || sensitivity <= 0.0 {
            return Err(AccountingError::invalid(
                "sensitivity must be positive and finite",
            ));
        }
        Ok(Self {
            parameter,
            sensitivity,
        })
    }

    fn noise_cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            0.5 * (x / self.parameter).exp()
        } else {
            1.0 - 0.5 * (-x / self.parameter).exp()
        }
    }
}

impl AdditiveNoisePrivacyLoss for LaplacePrivacyLoss {
    fn privacy_loss(&self, x: f64) -> f64 {
        ((x - self.sensitivity).abs() - x.abs()) / self.parameter
    }

    fn inverse_privacy_loss(&self, loss: f64) -> f64 {
        let bound = self.sensitivity / self.parameter;
        if loss > bound {
            return f64::NEG_INFINITY;
        }
        if loss <= -bound {
            return f64::INFINITY;
        }
        0.5 * (self.sensitivity - loss * self.parameter)
    }

    fn mu_upper_cdf(&self, x: f64) -> f64 {
        self.noise_cdf(x)
    }

    fn privacy_loss_tail(&self, _estimate_type: EstimateType) -> PrivacyLossTail {
        // The regions outside [0, d] carry exact constant losses, so the
        // same tail map serves both rounding directions.
        let bound = self.sensitivity / self.parameter;
        PrivacyLossTail {
            lower_x_truncation: 0.0,
            upper_x_truncation: self.sensitivity,
            tail_mass: vec![
                (bound, self.noise_cdf(0.0)),
                (-bound, 1.0 - self.noise_cdf(self.sensitivity)),
            ],
        }
    }
}

/// Privacy loss of the Gaussian mechanism with standard deviation `s` and
/// sensitivity `d`: `(d^2 / 2 - d * x) / s^2`.
#[derive(Clone, Debug)]
pub struct GaussianPrivacyLoss {
    standard_deviation: f64,
    sensitivity: f64,
    log_mass_truncation_bound: f64,
    normal: Normal,
}

impl GaussianPrivacyLoss {
    /// Create the model, validating the parameters.
    ///
    /// `log_mass_truncation_bound` is the natural log of the noise mass
    /// that may be folded into the tails; it must be finite and
    /// non-positive.
    pub fn new(
        standard_deviation: f64,
        sensitivity: f64,
        log_mass_truncation_bound: f64,
    ) -> Result<Self> {
        if !standard_deviation.is_finite() || standard_deviation <= 0.0 {
            return Err(AccountingError::invalid(
                "standard deviation must be positive and finite",
            ));
        }
        if !sensitivity.is_finite() || sensitivity <= 0.0 {
            return Err(AccountingError::invalid(
                "sensitivity must be positive and finite",
            ));
        }
        if !log_mass_truncation_bound.is_finite() || log_mass_truncation_bound > 0.0 {
            return Err(AccountingError::invalid(
                "log mass truncation bound must be finite and non-positive",
            ));
        }
        let normal = Normal::new(0.0, standard_deviation)
            .map_err(|_| AccountingError::invalid("standard deviation rejected"))?;
        Ok(Self {
            standard_deviation,
            sensitivity,
            log_mass_truncation_bound,
            normal,
        })
    }
}

impl AdditiveNoisePrivacyLoss for GaussianPrivacyLoss {
    fn privacy_loss(&self, x: f64) -> f64 {
        let s = self.sensitivity;
        s * (0.5 * s - x) / (self.standard_deviation * self.standard_deviation)
    }

    fn inverse_privacy_loss(&self, loss: f64) -> f64 {
        let s = self.sensitivity;
        0.5 * s - loss * self.standard_deviation * self.standard_deviation / s
    }

    fn mu_upper_cdf(&self, x: f64) -> f64 {
        self.normal.cdf(x)
    }

    fn privacy_loss_tail(&self, estimate_type: EstimateType) -> PrivacyLossTail {
        let tail_mass = 0.5 * self.log_mass_truncation_bound.exp();
        let lower_x = self.normal.inverse_cdf(tail_mass);
        let upper_x = -lower_x;

        // Below lower_x the loss is unbounded; above upper_x it is bounded
        // by the loss at upper_x.
        let tail_mass_map = if estimate_type.is_pessimistic() {
            vec![
                (f64::INFINITY, self.mu_upper_cdf(lower_x)),
                (
                    self.privacy_loss(upper_x),
                    1.0 - self.mu_upper_cdf(upper_x),
                ),
            ]
        } else {
            vec![(self.privacy_loss(lower_x), self.mu_upper_cdf(lower_x))]
        };

        PrivacyLossTail {
            lower_x_truncation: lower_x,
            upper_x_truncation: upper_x,
            tail_mass: tail_mass_map,
        }
    }
}
