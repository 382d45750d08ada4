//! Privacy loss models for integer-valued additive noise mechanisms.
//!
//! Discrete mechanisms take finitely many privacy loss values, so instead
//! of a CDF projection they enumerate exact `(loss, mass)` pairs that the
//! distribution constructor rounds onto the grid.

use pld_accounting_core::{log_sum_exp, AccountingError, Result};

/// Noise mass allowed outside the default truncation bound of the
/// discrete Gaussian.
const DEFAULT_OUTSIDE_MASS: f64 = 1e-30;

/// Privacy loss of the discrete Laplace mechanism with parameter `p`:
/// integer noise with PMF proportional to `exp(-p * |k|)`.
#[derive(Clone, Debug)]
pub struct DiscreteLaplacePrivacyLoss {
    parameter: f64,
    sensitivity: i64,
}

impl DiscreteLaplacePrivacyLoss {
    /// Create the model, validating the parameters.
    pub fn new(parameter: f64, sensitivity: i64) -> Result<Self> {
        if !parameter.is_finite() || parameter <= 0.0 {
            return Err(AccountingError::invalid(
                "discrete Laplace parameter must be positive and finite",
            ));
        }
        if sensitivity < 1 {
            return Err(AccountingError::invalid(
                "sensitivity must be a positive integer",
            ));
        }
        Ok(Self {
            parameter,
            sensitivity,
        })
    }

    /// Exact `(privacy_loss, mass)` pairs of the loss distribution.
    ///
    /// The loss `p * (|x - d| - |x|)` is constant `p * d` for outcomes
    /// `x <= 0`, linear in between, and constant `-p * d` for `x >= d`.
    pub fn loss_mass_pairs(&self) -> Vec<(f64, f64)> {
        let p = self.parameter;
        let d = self.sensitivity;
        let decay = (-p).exp();
        let normalizer = (1.0 - decay) / (1.0 + decay);

        let mut pairs = Vec::with_capacity(d as usize + 1);
        pairs.push((p * d as f64, 1.0 / (1.0 + decay)));
        for x in 1..d {
            let loss = p * (d - 2 * x) as f64;
            pairs.push((loss, normalizer * (-p * x as f64).exp()));
        }
        pairs.push((-p * d as f64, (-p * d as f64).exp() / (1.0 + decay)));
        pairs
    }
}

/// Privacy loss of the discrete Gaussian mechanism truncated to
/// `[-t, t]`: integer noise with PMF proportional to
/// `exp(-k^2 / (2 * sigma^2))` restricted to the bound.
#[derive(Clone, Debug)]
pub struct DiscreteGaussianPrivacyLoss {
    sigma: f64,
    sensitivity: i64,
    truncation_bound: i64,
}

impl DiscreteGaussianPrivacyLoss {
    /// Create the model, validating the parameters.
    ///
    /// When `truncation_bound` is unset, the smallest bound whose
    /// Gaussian-tail estimate of the outside mass is at most `1e-30` is
    /// used.
    pub fn new(sigma: f64, sensitivity: i64, truncation_bound: Option<i64>) -> Result<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(AccountingError::invalid(
                "sigma must be positive and finite",
            ));
        }
        if sensitivity < 1 {
            return Err(AccountingError::invalid(
                "sensitivity must be a positive integer",
            ));
        }
        let truncation_bound = match truncation_bound {
            Some(bound) if bound < 1 => {
                return Err(AccountingError::invalid(
                    "truncation bound must be a positive integer",
                ));
            }
            Some(bound) => bound,
            None => default_truncation_bound(sigma),
        };
        if sensitivity > truncation_bound.saturating_mul(2) {
            return Err(AccountingError::invalid(
                "sensitivity above twice the truncation bound leaves the distributions disjoint",
            ));
        }
        Ok(Self {
            sigma,
            sensitivity,
            truncation_bound,
        })
    }

    /// The truncation bound in use.
    pub fn truncation_bound(&self) -> i64 {
        self.truncation_bound
    }

    /// Exact `(privacy_loss, mass)` pairs of the loss distribution.
    ///
    /// Outcomes below `d - t` are impossible under the shifted lower
    /// distribution and carry infinite loss. Masses are normalized in log
    /// domain.
    pub fn loss_mass_pairs(&self) -> Vec<(f64, f64)> {
        let t = self.truncation_bound;
        let d = self.sensitivity;
        let variance = self.sigma * self.sigma;

        let log_weights: Vec<f64> = (-t..=t)
            .map(|k| -(k as f64) * (k as f64) / (2.0 * variance))
            .collect();
        let log_normalizer = log_sum_exp(&log_weights);

        (-t..=t)
            .zip(log_weights)
            .map(|(k, log_weight)| {
                let mass = (log_weight - log_normalizer).exp();
                let loss = if k < d - t {
                    f64::INFINITY
                } else {
                    d as f64 * (d - 2 * k) as f64 / (2.0 * variance)
                };
                (loss, mass)
            })
            .collect()
    }
}

fn default_truncation_bound(sigma: f64) -> i64 {
    let z = (2.0 * (2.0 / DEFAULT_OUTSIDE_MASS).ln()).sqrt();
    (sigma * z).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_laplace_masses_sum_to_one() {
        let mechanism = DiscreteLaplacePrivacyLoss::new(0.5, 3).expect("valid");
        let pairs = mechanism.loss_mass_pairs();
        let total: f64 = pairs.iter().map(|&(_, mass)| mass).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn discrete_laplace_loss_range_is_symmetric() {
        let mechanism = DiscreteLaplacePrivacyLoss::new(0.3, 2).expect("valid");
        let pairs = mechanism.loss_mass_pairs();
        assert!((pairs.first().expect("non-empty").0 - 0.6).abs() < 1e-12);
        assert!((pairs.last().expect("non-empty").0 + 0.6).abs() < 1e-12);
    }

    #[test]
    fn discrete_laplace_sensitivity_one_is_two_point() {
        let p = 1.0f64;
        let mechanism = DiscreteLaplacePrivacyLoss::new(p, 1).expect("valid");
        let pairs = mechanism.loss_mass_pairs();
        assert_eq!(pairs.len(), 2);
        let decay = (-p).exp();
        assert!((pairs[0].1 - 1.0 / (1.0 + decay)).abs() < 1e-12);
        assert!((pairs[1].1 - decay / (1.0 + decay)).abs() < 1e-12);
    }

    #[test]
    fn discrete_gaussian_masses_sum_to_one() {
        let mechanism = DiscreteGaussianPrivacyLoss::new(2.0, 1, Some(10)).expect("valid");
        let pairs = mechanism.loss_mass_pairs();
        let total: f64 = pairs.iter().map(|&(_, mass)| mass).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(pairs.len(), 21);
    }

    #[test]
    fn discrete_gaussian_flags_unreachable_outcomes() {
        let mechanism = DiscreteGaussianPrivacyLoss::new(1.0, 2, Some(3)).expect("valid");
        let pairs = mechanism.loss_mass_pairs();
        let infinite: Vec<_> = pairs.iter().filter(|(loss, _)| loss.is_infinite()).collect();
        // Outcomes -3 and -2 are below d - t = -1.
        assert_eq!(infinite.len(), 2);
        assert!(infinite.iter().all(|(_, mass)| *mass > 0.0));
    }

    #[test]
    fn discrete_gaussian_default_bound_scales_with_sigma() {
        let narrow = DiscreteGaussianPrivacyLoss::new(1.0, 1, None).expect("valid");
        let wide = DiscreteGaussianPrivacyLoss::new(10.0, 1, None).expect("valid");
        assert!(narrow.truncation_bound() >= 1);
        assert!(wide.truncation_bound() > narrow.truncation_bound());
        // sqrt(2 ln(2e30)) is just under 12 standard deviations.
        assert!((narrow.truncation_bound() as f64) < 13.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(DiscreteLaplacePrivacyLoss::new(0.0, 1).is_err());
        assert!(DiscreteLaplacePrivacyLoss::new(1.0, 0).is_err());
        assert!(DiscreteGaussianPrivacyLoss::new(0.0, 1, None).is_err());
        assert!(DiscreteGaussianPrivacyLoss::new(1.0, 1, Some(0)).is_err());
        // Disjoint supports: sensitivity 8 with bound 3.
        assert!(DiscreteGaussianPrivacyLoss::new(1.0, 8, Some(3)).is_err());
    }
}
