//! Discretized privacy loss distributions.
//!
//! A privacy loss distribution (PLD) is the distribution of the
//! log-likelihood ratio `ln(mu_upper(o) / mu_lower(o))` of a mechanism's
//! output on two neighboring inputs, sampled under `mu_upper` and projected
//! onto a fixed grid with one-sided rounding. It supports hockey-stick
//! divergence queries, which give the delta of (epsilon, delta)-DP, and
//! composes under convolution.

use std::collections::HashMap;

use pld_accounting_core::{
    bisect_nonincreasing, ceil_to_grid, floor_to_grid, log_add_exp, AccountingError, KahanSum,
    Result,
};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::discrete::{DiscreteGaussianPrivacyLoss, DiscreteLaplacePrivacyLoss};
use crate::mechanism::{
    AdditiveNoisePrivacyLoss, EstimateType, GaussianPrivacyLoss, LaplacePrivacyLoss,
};
use crate::pmf::GridPmf;

/// Default spacing of the privacy-loss grid.
pub const DEFAULT_DISCRETIZATION_INTERVAL: f64 = 1e-4;
/// Default log-mass bound below which constructor tails are truncated.
pub const DEFAULT_LOG_MASS_TRUNCATION_BOUND: f64 = -50.0;
/// Default per-composition budget for truncated upper-tail mass.
pub const DEFAULT_TAIL_MASS_TRUNCATION: f64 = 1e-15;

/// Bisection tolerance of the epsilon-for-delta query.
const EPSILON_QUERY_TOLERANCE: f64 = 1.0 / ((1u64 << 40) as f64);
/// Largest dense support a composition may produce.
const MAX_COMPOSED_SUPPORT: u128 = 1 << 27;

/// A discretized privacy loss distribution.
///
/// The finite part of the loss distribution lives in a [`GridPmf`]; mass
/// on outcomes the lower distribution cannot produce, plus any
/// pessimistically truncated upper tail, is tracked in `infinity_mass`.
#[derive(Clone, Debug)]
pub struct PrivacyLossDistribution {
    pub(crate) discretization_interval: f64,
    pub(crate) infinity_mass: f64,
    pub(crate) pmf: GridPmf,
    pub(crate) estimate_type: EstimateType,
}

fn validate_interval(discretization_interval: f64) -> Result<()> {
    if !discretization_interval.is_finite() || discretization_interval <= 0.0 {
        return Err(AccountingError::invalid(
            "discretization interval must be positive and finite",
        ));
    }
    Ok(())
}

fn round_to_grid(loss: f64, interval: f64, estimate_type: EstimateType) -> i64 {
    if estimate_type.is_pessimistic() {
        ceil_to_grid(loss, interval)
    } else {
        floor_to_grid(loss, interval)
    }
}

impl PrivacyLossDistribution {
    /// PLD of a mechanism whose output is independent of its input: all
    /// mass at privacy loss zero. Neutral under composition.
    pub fn create_identity(discretization_interval: f64) -> Result<Self> {
        validate_interval(discretization_interval)?;
        let mut pmf = GridPmf::new();
        pmf.add_mass(0, 1.0);
        Ok(Self {
            discretization_interval,
            infinity_mass: 0.0,
            pmf,
            estimate_type: EstimateType::Pessimistic,
        })
    }

    /// Build a PLD from explicit lower and upper probability mass
    /// functions over a shared outcome space.
    ///
    /// Outcomes carried only by the upper distribution have infinite loss.
    /// Outcomes whose upper log-mass falls below `mass_truncation_bound`
    /// are folded into the infinite-loss bucket under pessimistic rounding
    /// and discarded under optimistic rounding.
    pub fn create_from_pmfs(
        pmf_lower: &HashMap<i64, f64>,
        pmf_upper: &HashMap<i64, f64>,
        estimate_type: EstimateType,
        discretization_interval: f64,
        mass_truncation_bound: f64,
    ) -> Result<Self> {
        validate_interval(discretization_interval)?;
        if mass_truncation_bound > 0.0 || mass_truncation_bound.is_nan() {
            return Err(AccountingError::invalid(
                "mass truncation bound must be non-positive",
            ));
        }

        let mut infinity_mass = KahanSum::new();
        let mut pmf = GridPmf::new();
        for (&outcome, &upper_mass) in pmf_upper {
            if upper_mass <= 0.0 {
                continue;
            }
            let lower_mass = pmf_lower.get(&outcome).copied().unwrap_or(0.0);
            if lower_mass <= 0.0 {
                infinity_mass.add(upper_mass);
                continue;
            }
            if upper_mass.ln() < mass_truncation_bound {
                if estimate_type.is_pessimistic() {
                    infinity_mass.add(upper_mass);
                }
                continue;
            }
            let loss = upper_mass.ln() - lower_mass.ln();
            pmf.add_mass(
                round_to_grid(loss, discretization_interval, estimate_type),
                upper_mass,
            );
        }
        pmf.prune_negligible();

        Ok(Self {
            discretization_interval,
            infinity_mass: infinity_mass.total().clamp(0.0, 1.0),
            pmf,
            estimate_type,
        })
    }

    /// Project an additive noise mechanism onto the grid.
    ///
    /// Each grid cell receives the upper-distribution mass of the outcomes
    /// whose privacy loss rounds into it; the mechanism's tail map covers
    /// the outcomes outside the truncation points.
    pub fn create_for_additive_noise(
        mechanism: &impl AdditiveNoisePrivacyLoss,
        estimate_type: EstimateType,
        discretization_interval: f64,
    ) -> Result<Self> {
        validate_interval(discretization_interval)?;
        let interval = discretization_interval;
        let tail = mechanism.privacy_loss_tail(estimate_type);

        let mut infinity_mass = KahanSum::new();
        let mut pmf = GridPmf::new();
        for &(loss, mass) in &tail.tail_mass {
            if mass <= 0.0 {
                continue;
            }
            if loss == f64::INFINITY {
                infinity_mass.add(mass);
            } else {
                pmf.add_mass(round_to_grid(loss, interval, estimate_type), mass);
            }
        }

        let lowest_loss = mechanism.privacy_loss(tail.upper_x_truncation);
        let highest_loss = mechanism.privacy_loss(tail.lower_x_truncation);
        let (first_index, last_index) = if estimate_type.is_pessimistic() {
            (
                ceil_to_grid(lowest_loss, interval),
                ceil_to_grid(highest_loss, interval),
            )
        } else {
            (
                floor_to_grid(lowest_loss, interval),
                floor_to_grid(highest_loss, interval),
            )
        };

        for index in first_index..=last_index {
            // Pessimistic cells cover ((i-1)h, ih], optimistic [ih, (i+1)h).
            let (cell_lower, cell_upper) = if estimate_type.is_pessimistic() {
                ((index - 1) as f64 * interval, index as f64 * interval)
            } else {
                (index as f64 * interval, (index + 1) as f64 * interval)
            };
            let x_low = mechanism
                .inverse_privacy_loss(cell_upper)
                .clamp(tail.lower_x_truncation, tail.upper_x_truncation);
            let x_high = mechanism
                .inverse_privacy_loss(cell_lower)
                .clamp(tail.lower_x_truncation, tail.upper_x_truncation);
            if x_high > x_low {
                let mass = mechanism.mu_upper_cdf(x_high) - mechanism.mu_upper_cdf(x_low);
                pmf.add_mass(index, mass);
            }
        }
        pmf.prune_negligible();

        Ok(Self {
            discretization_interval,
            infinity_mass: infinity_mass.total().clamp(0.0, 1.0),
            pmf,
            estimate_type,
        })
    }

    /// PLD of the Laplace mechanism.
    pub fn create_for_laplace_mechanism(
        parameter: f64,
        sensitivity: f64,
        estimate_type: EstimateType,
        discretization_interval: f64,
    ) -> Result<Self> {
        let mechanism = LaplacePrivacyLoss::new(parameter, sensitivity)?;
        Self::create_for_additive_noise(&mechanism, estimate_type, discretization_interval)
    }

    /// PLD of the Gaussian mechanism.
    pub fn create_for_gaussian_mechanism(
        standard_deviation: f64,
        sensitivity: f64,
        estimate_type: EstimateType,
        discretization_interval: f64,
        mass_truncation_bound: f64,
    ) -> Result<Self> {
        let mechanism =
            GaussianPrivacyLoss::new(standard_deviation, sensitivity, mass_truncation_bound)?;
        Self::create_for_additive_noise(&mechanism, estimate_type, discretization_interval)
    }

    /// PLD of the discrete Laplace mechanism.
    pub fn create_for_discrete_laplace_mechanism(
        parameter: f64,
        sensitivity: i64,
        estimate_type: EstimateType,
        discretization_interval: f64,
    ) -> Result<Self> {
        let mechanism = DiscreteLaplacePrivacyLoss::new(parameter, sensitivity)?;
        Self::create_from_loss_mass_pairs(
            mechanism.loss_mass_pairs(),
            estimate_type,
            discretization_interval,
        )
    }

    /// PLD of the truncated discrete Gaussian mechanism.
    pub fn create_for_discrete_gaussian_mechanism(
        sigma: f64,
        sensitivity: i64,
        estimate_type: EstimateType,
        discretization_interval: f64,
        truncation_bound: Option<i64>,
    ) -> Result<Self> {
        let mechanism = DiscreteGaussianPrivacyLoss::new(sigma, sensitivity, truncation_bound)?;
        Self::create_from_loss_mass_pairs(
            mechanism.loss_mass_pairs(),
            estimate_type,
            discretization_interval,
        )
    }

    /// PLD of randomized response over `num_buckets` buckets: with
    /// probability `1 - noise_parameter` the input bucket is reported
    /// faithfully, otherwise a uniformly random bucket is drawn.
    pub fn create_for_randomized_response(
        noise_parameter: f64,
        num_buckets: u32,
        estimate_type: EstimateType,
        discretization_interval: f64,
    ) -> Result<Self> {
        validate_interval(discretization_interval)?;
        if !noise_parameter.is_finite() || !(0.0..=1.0).contains(&noise_parameter) {
            return Err(AccountingError::invalid(
                "noise parameter must lie in [0, 1]",
            ));
        }
        if num_buckets < 2 {
            return Err(AccountingError::invalid(
                "randomized response needs at least two buckets",
            ));
        }

        let buckets = num_buckets as f64;
        let noise_share = noise_parameter / buckets;
        let hit_mass = 1.0 - noise_parameter + noise_share;

        let mut pmf = GridPmf::new();
        let mut infinity_mass = 0.0;
        if noise_share > 0.0 {
            let loss = hit_mass.ln() - noise_share.ln();
            pmf.add_mass(
                round_to_grid(loss, discretization_interval, estimate_type),
                hit_mass,
            );
            pmf.add_mass(
                round_to_grid(-loss, discretization_interval, estimate_type),
                noise_share,
            );
            pmf.add_mass(0, (buckets - 2.0) * noise_share);
        } else {
            // Deterministic response: the output pins down the input.
            infinity_mass = 1.0;
        }
        pmf.prune_negligible();

        Ok(Self {
            discretization_interval,
            infinity_mass,
            pmf,
            estimate_type,
        })
    }

    /// Worst-case pessimistic PLD of an (epsilon, delta)-differentially
    /// private mechanism: loss `+INFINITY` with probability `delta` and
    /// `+-epsilon` with the conditional odds the guarantee permits.
    pub fn create_for_privacy_parameters(
        epsilon: f64,
        delta: f64,
        discretization_interval: f64,
    ) -> Result<Self> {
        validate_interval(discretization_interval)?;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(AccountingError::invalid(
                "epsilon must be non-negative and finite",
            ));
        }
        if !delta.is_finite() || !(0.0..=1.0).contains(&delta) {
            return Err(AccountingError::invalid("delta must lie in [0, 1]"));
        }

        let remaining = 1.0 - delta;
        // (1 - delta) / (1 + e^{-eps}) and its mirror, via log1p.
        let mass_upper = remaining * (-log_add_exp(0.0, -epsilon)).exp();
        let mass_lower = remaining * (-log_add_exp(0.0, epsilon)).exp();

        let mut pmf = GridPmf::new();
        pmf.add_mass(ceil_to_grid(epsilon, discretization_interval), mass_upper);
        pmf.add_mass(ceil_to_grid(-epsilon, discretization_interval), mass_lower);
        pmf.prune_negligible();

        Ok(Self {
            discretization_interval,
            infinity_mass: delta,
            pmf,
            estimate_type: EstimateType::Pessimistic,
        })
    }

    fn create_from_loss_mass_pairs(
        pairs: Vec<(f64, f64)>,
        estimate_type: EstimateType,
        discretization_interval: f64,
    ) -> Result<Self> {
        validate_interval(discretization_interval)?;
        let mut infinity_mass = KahanSum::new();
        let mut pmf = GridPmf::new();
        for (loss, mass) in pairs {
            if mass <= 0.0 {
                continue;
            }
            if loss == f64::INFINITY {
                infinity_mass.add(mass);
            } else {
                pmf.add_mass(
                    round_to_grid(loss, discretization_interval, estimate_type),
                    mass,
                );
            }
        }
        pmf.prune_negligible();

        Ok(Self {
            discretization_interval,
            infinity_mass: infinity_mass.total().clamp(0.0, 1.0),
            pmf,
            estimate_type,
        })
    }

    /// Grid spacing along the privacy-loss axis.
    pub fn discretization_interval(&self) -> f64 {
        self.discretization_interval
    }

    /// Upper-distribution mass with infinite privacy loss.
    pub fn infinity_mass(&self) -> f64 {
        self.infinity_mass
    }

    /// Rounding direction this distribution was built with.
    pub fn estimate_type(&self) -> EstimateType {
        self.estimate_type
    }

    /// The discretized mass function of the finite losses.
    pub fn pmf(&self) -> &GridPmf {
        &self.pmf
    }

    /// Hockey-stick divergence `delta(epsilon)` of the discretized
    /// distribution.
    ///
    /// The sum runs from the largest loss downward with compensated
    /// accumulation; the infinite-loss mass contributes in full at every
    /// epsilon, so `delta(INFINITY)` is exactly [`Self::infinity_mass`].
    pub fn get_delta_for_epsilon(&self, epsilon: f64) -> f64 {
        let mut delta = KahanSum::new();
        delta.add(self.infinity_mass);
        for (index, mass) in self.pmf.iter().rev() {
            let loss = index as f64 * self.discretization_interval;
            if loss <= epsilon {
                break;
            }
            // mass * (1 - e^{eps - loss}), with the lower mass implied by
            // the stored index.
            delta.add(-(epsilon - loss).exp_m1() * mass);
        }
        delta.total().clamp(0.0, 1.0)
    }

    /// Smallest epsilon >= 0 whose divergence is at most `delta`, or
    /// `INFINITY` when even the infinite-loss mass exceeds `delta`.
    pub fn get_epsilon_for_delta(&self, delta: f64) -> f64 {
        if delta < self.infinity_mass {
            return f64::INFINITY;
        }
        if self.get_delta_for_epsilon(0.0) <= delta {
            return 0.0;
        }
        let upper = match self.pmf.max_index() {
            Some(index) => (index as f64 * self.discretization_interval).max(0.0),
            None => return 0.0,
        };
        bisect_nonincreasing(
            |epsilon| self.get_delta_for_epsilon(epsilon),
            delta,
            0.0,
            upper,
            EPSILON_QUERY_TOLERANCE,
        )
    }

    /// Check that `other` can be composed with this distribution: the
    /// discretization intervals and estimate types must match.
    pub fn validate_composition(&self, other: &Self) -> Result<()> {
        if self.discretization_interval != other.discretization_interval {
            return Err(AccountingError::incompatible(
                "discretization intervals differ",
            ));
        }
        if self.estimate_type != other.estimate_type {
            return Err(AccountingError::incompatible("estimate types differ"));
        }
        Ok(())
    }

    /// Replace this distribution with its composition with `other`.
    ///
    /// The finite parts convolve; the infinite-loss masses combine as
    /// `1 - (1 - a)(1 - b)`. Under pessimistic rounding, up to
    /// `tail_mass_truncation` of tail mass per call is consolidated: the
    /// upper tail into the infinite-loss bucket, the lower tail upward
    /// onto the smallest kept cell. On error the distribution is left
    /// unchanged.
    pub fn compose(&mut self, other: &Self, tail_mass_truncation: f64) -> Result<()> {
        let (pmf, infinity_mass) = self.composed_parts(other, tail_mass_truncation)?;
        self.pmf = pmf;
        self.infinity_mass = infinity_mass;
        Ok(())
    }

    /// Compose this distribution with itself `num_times` times.
    ///
    /// Runs square-and-multiply so the work stays logarithmic in
    /// `num_times`, splitting the truncation budget evenly across the
    /// intermediate compositions. Pessimistic only.
    pub fn self_compose(&mut self, num_times: u32, tail_mass_truncation: f64) -> Result<()> {
        if num_times == 0 {
            return Err(AccountingError::invalid(
                "number of compositions must be positive",
            ));
        }
        if !self.estimate_type.is_pessimistic() {
            return Err(AccountingError::unsupported(
                "repeated self-composition requires pessimistic rounding",
            ));
        }
        if !(0.0..1.0).contains(&tail_mass_truncation) {
            return Err(AccountingError::invalid(
                "tail mass truncation must lie in [0, 1)",
            ));
        }
        if num_times == 1 {
            return Ok(());
        }

        let rounds = u32::BITS - (num_times - 1).leading_zeros();
        let step_truncation = tail_mass_truncation / (2.0 * rounds as f64);

        let mut result = Self::create_identity(self.discretization_interval)?;
        let mut base = self.clone();
        let mut remaining = num_times;
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = result.composed(&base, step_truncation)?;
            }
            remaining >>= 1;
            if remaining > 0 {
                base = base.composed(&base, step_truncation)?;
            }
        }

        self.pmf = result.pmf;
        self.infinity_mass = result.infinity_mass;
        Ok(())
    }

    /// `delta(epsilon)` of the composition with `other`, without
    /// materializing the composed distribution.
    ///
    /// Sweeps both supports once in ascending order, extending suffix
    /// accumulators of the other side's upper and implied lower masses;
    /// matches compose-then-query up to numerical tolerance.
    pub fn get_delta_for_epsilon_for_composed_pld(
        &self,
        other: &Self,
        epsilon: f64,
    ) -> Result<f64> {
        self.validate_composition(other)?;
        let interval = self.discretization_interval;
        let combined_infinity =
            self.infinity_mass + other.infinity_mass - self.infinity_mass * other.infinity_mass;

        let own: Vec<(i64, f64)> = self.pmf.iter().collect();
        let others: Vec<(i64, f64)> = other.pmf.iter().collect();
        if own.is_empty() || others.is_empty() {
            return Ok(combined_infinity.clamp(0.0, 1.0));
        }

        let mut delta = KahanSum::new();
        delta.add(combined_infinity);

        let mut upper_mass = 0.0;
        let mut lower_mass = 0.0;
        let mut cut = others.len();
        for &(own_index, own_mass) in &own {
            let own_loss = own_index as f64 * interval;
            while cut > 0 {
                let (other_index, other_mass) = others[cut - 1];
                let pair_loss = own_index.saturating_add(other_index) as f64 * interval;
                if pair_loss <= epsilon {
                    break;
                }
                upper_mass += other_mass;
                lower_mass += other_mass * (-(other_index as f64) * interval).exp();
                cut -= 1;
            }
            if upper_mass > 0.0 {
                delta.add(own_mass * (upper_mass - (epsilon - own_loss).exp() * lower_mass));
            }
        }
        Ok(delta.total().clamp(0.0, 1.0))
    }

    fn composed(&self, other: &Self, tail_mass_truncation: f64) -> Result<Self> {
        let (pmf, infinity_mass) = self.composed_parts(other, tail_mass_truncation)?;
        Ok(Self {
            discretization_interval: self.discretization_interval,
            infinity_mass,
            pmf,
            estimate_type: self.estimate_type,
        })
    }

    fn composed_parts(&self, other: &Self, tail_mass_truncation: f64) -> Result<(GridPmf, f64)> {
        self.validate_composition(other)?;
        if !(0.0..1.0).contains(&tail_mass_truncation) {
            return Err(AccountingError::invalid(
                "tail mass truncation must lie in [0, 1)",
            ));
        }
        if tail_mass_truncation > 0.0 && !self.estimate_type.is_pessimistic() {
            return Err(AccountingError::unsupported(
                "tail truncation requires pessimistic rounding",
            ));
        }

        let combined_infinity =
            self.infinity_mass + other.infinity_mass - self.infinity_mass * other.infinity_mass;

        let (own_min, own_max) = match (self.pmf.min_index(), self.pmf.max_index()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Ok((GridPmf::new(), combined_infinity.clamp(0.0, 1.0))),
        };
        let (other_min, other_max) = match (other.pmf.min_index(), other.pmf.max_index()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Ok((GridPmf::new(), combined_infinity.clamp(0.0, 1.0))),
        };

        let out_min = own_min.checked_add(other_min).ok_or_else(|| {
            AccountingError::overflow("composed support index overflows the grid")
        })?;
        own_max.checked_add(other_max).ok_or_else(|| {
            AccountingError::overflow("composed support index overflows the grid")
        })?;
        let out_len = (own_max as i128 - own_min as i128) as u128
            + (other_max as i128 - other_min as i128) as u128
            + 1;
        if out_len > MAX_COMPOSED_SUPPORT {
            return Err(AccountingError::overflow(
                "composed support exceeds the dense size limit",
            ));
        }

        let own_probs = self.pmf.to_dense().map(|(_, probs)| probs).unwrap_or_default();
        let other_probs = other
            .pmf
            .to_dense()
            .map(|(_, probs)| probs)
            .unwrap_or_default();

        let mut probs = fft_convolve(&own_probs, &other_probs);
        let mut lower = out_min;
        let mut truncated_to_infinity = 0.0;
        if tail_mass_truncation > 0.0 {
            truncated_to_infinity = truncate_tails(&mut probs, &mut lower, tail_mass_truncation);
        }

        let mut pmf = GridPmf::from_dense(lower, &probs);
        pmf.prune_negligible();
        let infinity_mass = (combined_infinity + truncated_to_infinity).clamp(0.0, 1.0);
        Ok((pmf, infinity_mass))
    }
}

/// Full linear convolution. Trivial sizes run directly (exact for the
/// identity case); everything else goes through zero-padded FFT.
fn fft_convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    let out_len = a.len() + b.len() - 1;
    if a.len().min(b.len()) == 1 || out_len <= 32 {
        let mut out = vec![0.0; out_len];
        for (i, &x) in a.iter().enumerate() {
            for (j, &y) in b.iter().enumerate() {
                out[i + j] += x * y;
            }
        }
        return out;
    }

    let size = out_len.next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(size);
    let ifft = planner.plan_fft_inverse(size);

    let mut fa = vec![Complex::new(0.0, 0.0); size];
    let mut fb = vec![Complex::new(0.0, 0.0); size];
    for (slot, &value) in fa.iter_mut().zip(a) {
        slot.re = value;
    }
    for (slot, &value) in fb.iter_mut().zip(b) {
        slot.re = value;
    }
    fft.process(&mut fa);
    fft.process(&mut fb);
    for (fa_i, fb_i) in fa.iter_mut().zip(fb.iter()) {
        *fa_i *= *fb_i;
    }
    ifft.process(&mut fa);

    // Roundoff leaves signed noise around zero; it cancels in the tail
    // cumulative sums and non-positive cells never enter the sparse PMF.
    let scale = 1.0 / size as f64;
    fa.iter().take(out_len).map(|c| c.re * scale).collect()
}

/// Consolidate whole tail cells within half the budget per side. The
/// lower-tail prefix is folded upward onto the first kept cell, the
/// upper-tail suffix is returned for the infinite-loss bucket.
fn truncate_tails(probs: &mut Vec<f64>, lower: &mut i64, tail_mass_truncation: f64) -> f64 {
    let half_budget = 0.5 * tail_mass_truncation;

    let mut dropped_low = 0.0;
    let mut start = 0;
    while start < probs.len() && dropped_low + probs[start] <= half_budget {
        dropped_low += probs[start];
        start += 1;
    }

    let mut dropped_high = 0.0;
    let mut end = probs.len();
    while end > start && dropped_high + probs[end - 1] <= half_budget {
        dropped_high += probs[end - 1];
        end -= 1;
    }

    if start >= end {
        // The whole support fit in the budget; send it all upward.
        probs.clear();
        *lower = 0;
        return dropped_low + dropped_high;
    }

    let mut kept = probs[start..end].to_vec();
    kept[0] += dropped_low;
    *probs = kept;
    *lower += start as i64;
    dropped_high
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gaussian_pld(interval: f64) -> PrivacyLossDistribution {
        PrivacyLossDistribution::create_for_gaussian_mechanism(
            1.0,
            1.0,
            EstimateType::Pessimistic,
            interval,
            DEFAULT_LOG_MASS_TRUNCATION_BOUND,
        )
        .expect("gaussian pld")
    }

    #[test]
    fn identity_has_no_privacy_loss() {
        let pld = PrivacyLossDistribution::create_identity(1e-4).expect("identity");
        assert_eq!(pld.infinity_mass(), 0.0);
        assert_eq!(pld.get_delta_for_epsilon(0.0), 0.0);
        assert_eq!(pld.get_delta_for_epsilon(1.0), 0.0);
        assert_eq!(pld.get_epsilon_for_delta(0.0), 0.0);
    }

    #[test]
    fn randomized_response_concentrates_on_two_losses() {
        let interval = 1e-4;
        let pld = PrivacyLossDistribution::create_for_randomized_response(
            0.2,
            2,
            EstimateType::Pessimistic,
            interval,
        )
        .expect("randomized response");

        let loss = (0.9f64 / 0.1).ln();
        let upper_index = ceil_to_grid(loss, interval);
        let lower_index = ceil_to_grid(-loss, interval);
        assert!((pld.pmf().mass_at(upper_index) - 0.9).abs() < 1e-12);
        assert!((pld.pmf().mass_at(lower_index) - 0.1).abs() < 1e-12);
        assert_eq!(pld.pmf().len(), 2);
        assert_eq!(pld.infinity_mass(), 0.0);
    }

    #[test]
    fn randomized_response_intermediate_buckets_carry_zero_loss() {
        let pld = PrivacyLossDistribution::create_for_randomized_response(
            0.5,
            5,
            EstimateType::Pessimistic,
            1e-4,
        )
        .expect("randomized response");
        // Three of the five buckets are hit only through noise.
        assert!((pld.pmf().mass_at(0) - 0.3).abs() < 1e-12);
        assert!((pld.pmf().total_mass() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn randomized_response_with_zero_noise_is_degenerate() {
        let pld = PrivacyLossDistribution::create_for_randomized_response(
            0.0,
            2,
            EstimateType::Pessimistic,
            1e-4,
        )
        .expect("randomized response");
        assert_eq!(pld.infinity_mass(), 1.0);
        assert!(pld.pmf().is_empty());
        assert_eq!(pld.get_delta_for_epsilon(10.0), 1.0);
        assert_eq!(pld.get_epsilon_for_delta(0.5), f64::INFINITY);
    }

    #[test]
    fn privacy_parameters_reproduce_the_guarantee() {
        let (epsilon, delta, interval) = (1.0, 0.01, 1e-4);
        let pld =
            PrivacyLossDistribution::create_for_privacy_parameters(epsilon, delta, interval)
                .expect("privacy parameters");
        let delta_at_epsilon = pld.get_delta_for_epsilon(epsilon);
        assert!(delta_at_epsilon >= delta);
        assert!(delta_at_epsilon <= delta + 1e-4);
        assert_eq!(pld.get_delta_for_epsilon(f64::INFINITY), delta);
        assert!((pld.pmf().total_mass() + pld.infinity_mass() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn laplace_delta_brackets_the_analytic_value() {
        let interval = 1e-3;
        let pessimistic = PrivacyLossDistribution::create_for_laplace_mechanism(
            1.0,
            1.0,
            EstimateType::Pessimistic,
            interval,
        )
        .expect("pessimistic");
        let optimistic = PrivacyLossDistribution::create_for_laplace_mechanism(
            1.0,
            1.0,
            EstimateType::Optimistic,
            interval,
        )
        .expect("optimistic");

        for &epsilon in &[0.0f64, 0.3, 0.7] {
            let analytic = 1.0 - ((epsilon - 1.0) / 2.0).exp();
            let upper = pessimistic.get_delta_for_epsilon(epsilon);
            let lower = optimistic.get_delta_for_epsilon(epsilon);
            assert!(upper >= analytic - 1e-12, "eps={epsilon}");
            assert!(lower <= analytic + 1e-12, "eps={epsilon}");
            assert!(upper - lower < 1e-3, "eps={epsilon}");
        }
    }

    #[test]
    fn gaussian_mass_is_conserved() {
        let pld = gaussian_pld(1e-3);
        let total = pld.pmf().total_mass() + pld.infinity_mass();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn delta_at_infinity_equals_infinity_mass() {
        let pld = PrivacyLossDistribution::create_for_discrete_gaussian_mechanism(
            1.0,
            2,
            EstimateType::Pessimistic,
            1e-4,
            Some(3),
        )
        .expect("discrete gaussian");
        assert!(pld.infinity_mass() > 0.0);
        assert_eq!(pld.get_delta_for_epsilon(f64::INFINITY), pld.infinity_mass());
        assert_eq!(
            pld.get_epsilon_for_delta(0.5 * pld.infinity_mass()),
            f64::INFINITY
        );
    }

    #[test]
    fn discrete_laplace_delta_matches_closed_form() {
        // Sensitivity 1: losses are exactly +-p, so delta(0) has the
        // closed form mass_at(p) * (1 - e^{-p}).
        let p = 0.8f64;
        let pld = PrivacyLossDistribution::create_for_discrete_laplace_mechanism(
            p,
            1,
            EstimateType::Pessimistic,
            1e-4,
        )
        .expect("discrete laplace");
        let expected = (1.0 / (1.0 + (-p).exp())) * (1.0 - (-p).exp());
        assert!((pld.get_delta_for_epsilon(0.0) - expected).abs() < 1e-4);
        assert_eq!(pld.infinity_mass(), 0.0);
    }

    #[test]
    fn incompatible_compositions_leave_the_distribution_unchanged() {
        let mut coarse = gaussian_pld(1e-3);
        let fine = gaussian_pld(1e-4);
        let before = coarse.get_delta_for_epsilon(0.5);

        let err = coarse.compose(&fine, 0.0).expect_err("must fail");
        assert!(matches!(err, AccountingError::IncompatiblePlds { .. }));
        assert_eq!(coarse.get_delta_for_epsilon(0.5), before);

        let optimistic = PrivacyLossDistribution::create_for_laplace_mechanism(
            1.0,
            1.0,
            EstimateType::Optimistic,
            1e-3,
        )
        .expect("optimistic");
        let err = coarse.compose(&optimistic, 0.0).expect_err("must fail");
        assert!(matches!(err, AccountingError::IncompatiblePlds { .. }));
    }

    #[test]
    fn optimistic_truncation_is_rejected() {
        let make = || {
            PrivacyLossDistribution::create_for_laplace_mechanism(
                1.0,
                1.0,
                EstimateType::Optimistic,
                1e-3,
            )
            .expect("optimistic")
        };
        let mut pld = make();
        let other = make();
        let err = pld.compose(&other, 1e-15).expect_err("must fail");
        assert!(matches!(err, AccountingError::UnsupportedEstimateType { .. }));
        assert!(pld.compose(&other, 0.0).is_ok());

        let mut pld = make();
        let err = pld.self_compose(4, 0.0).expect_err("must fail");
        assert!(matches!(err, AccountingError::UnsupportedEstimateType { .. }));
    }

    #[test]
    fn composition_with_identity_is_neutral() {
        let mut pld = gaussian_pld(1e-3);
        let reference = pld.clone();
        let identity = PrivacyLossDistribution::create_identity(1e-3).expect("identity");
        pld.compose(&identity, 0.0).expect("compose");
        for &epsilon in &[0.0, 0.5, 1.0, 2.0] {
            assert_eq!(
                pld.get_delta_for_epsilon(epsilon),
                reference.get_delta_for_epsilon(epsilon)
            );
        }
    }

    #[test]
    fn self_compose_matches_repeated_composition() {
        let base = PrivacyLossDistribution::create_for_randomized_response(
            0.4,
            4,
            EstimateType::Pessimistic,
            1e-3,
        )
        .expect("randomized response");

        let mut fast = base.clone();
        fast.self_compose(5, 0.0).expect("self compose");

        let mut slow = base.clone();
        for _ in 0..4 {
            slow.compose(&base, 0.0).expect("compose");
        }

        for &epsilon in &[0.0, 1.0, 3.0, 8.0] {
            let difference =
                (fast.get_delta_for_epsilon(epsilon) - slow.get_delta_for_epsilon(epsilon)).abs();
            assert!(difference < 1e-12, "eps={epsilon}: {difference}");
        }
    }

    #[test]
    fn self_compose_once_is_a_no_op() {
        let mut pld = gaussian_pld(1e-3);
        let reference = pld.clone();
        pld.self_compose(1, 1e-15).expect("self compose");
        assert_eq!(
            pld.get_delta_for_epsilon(0.5),
            reference.get_delta_for_epsilon(0.5)
        );
        assert!(pld.self_compose(0, 1e-15).is_err());
    }

    #[test]
    fn fast_composed_delta_matches_materialized_composition() {
        let gaussian = gaussian_pld(1e-2);
        let laplace = PrivacyLossDistribution::create_for_laplace_mechanism(
            1.0,
            1.0,
            EstimateType::Pessimistic,
            1e-2,
        )
        .expect("laplace");

        let mut composed = gaussian.clone();
        composed.compose(&laplace, 0.0).expect("compose");

        for &epsilon in &[0.0, 0.5, 1.0, 3.0] {
            let fast = gaussian
                .get_delta_for_epsilon_for_composed_pld(&laplace, epsilon)
                .expect("fast query");
            let slow = composed.get_delta_for_epsilon(epsilon);
            assert!((fast - slow).abs() < 1e-12, "eps={epsilon}: {fast} vs {slow}");
        }
    }

    #[test]
    fn composition_combines_infinity_masses() {
        let mut first = PrivacyLossDistribution::create_for_privacy_parameters(1.0, 0.1, 1e-3)
            .expect("first");
        let second = PrivacyLossDistribution::create_for_privacy_parameters(0.5, 0.2, 1e-3)
            .expect("second");
        first.compose(&second, 0.0).expect("compose");
        assert!((first.infinity_mass() - (0.1 + 0.2 - 0.1 * 0.2)).abs() < 1e-12);
    }

    #[test]
    fn oversized_composition_overflows() {
        // A two-cell PLD whose support spans ~6e8 grid cells.
        let mut upper = HashMap::new();
        upper.insert(0, 0.5);
        upper.insert(1, 0.5);
        let mut lower = HashMap::new();
        lower.insert(0, 0.5 * (-600.0f64).exp());
        lower.insert(1, 0.5);

        let mut pld = PrivacyLossDistribution::create_from_pmfs(
            &lower,
            &upper,
            EstimateType::Pessimistic,
            1e-6,
            -700.0,
        )
        .expect("pld");
        let other = pld.clone();
        let before = pld.get_delta_for_epsilon(1.0);

        let err = pld.compose(&other, 0.0).expect_err("must overflow");
        assert!(matches!(err, AccountingError::NumericOverflow { .. }));
        assert_eq!(pld.get_delta_for_epsilon(1.0), before);
    }

    #[test]
    fn raw_pmfs_route_unmatched_mass_to_infinity() {
        let mut upper = HashMap::new();
        upper.insert(0, 0.5);
        upper.insert(1, 0.4);
        upper.insert(2, 0.1);
        let mut lower = HashMap::new();
        lower.insert(0, 0.25);
        lower.insert(1, 0.6);
        lower.insert(3, 0.15);

        let pld = PrivacyLossDistribution::create_from_pmfs(
            &lower,
            &upper,
            EstimateType::Pessimistic,
            1e-4,
            -50.0,
        )
        .expect("pld");

        assert!((pld.infinity_mass() - 0.1).abs() < 1e-12);
        let expected_top = ceil_to_grid(2.0f64.ln(), 1e-4);
        assert!((pld.pmf().mass_at(expected_top) - 0.5).abs() < 1e-12);
        assert_eq!(pld.get_delta_for_epsilon(f64::INFINITY), pld.infinity_mass());
    }

    #[test]
    fn mass_truncation_bound_is_one_sided() {
        let mut upper = HashMap::new();
        upper.insert(0, 1.0 - 1e-30);
        upper.insert(1, 1e-30);
        let mut lower = HashMap::new();
        lower.insert(0, 0.5);
        lower.insert(1, 0.5);

        let pessimistic = PrivacyLossDistribution::create_from_pmfs(
            &lower,
            &upper,
            EstimateType::Pessimistic,
            1e-4,
            -50.0,
        )
        .expect("pessimistic");
        let optimistic = PrivacyLossDistribution::create_from_pmfs(
            &lower,
            &upper,
            EstimateType::Optimistic,
            1e-4,
            -50.0,
        )
        .expect("optimistic");

        // ln(1e-30) is far below the bound: kept as infinite loss under
        // pessimistic rounding, dropped under optimistic rounding.
        assert!((pessimistic.infinity_mass() - 1e-30).abs() < 1e-40);
        assert_eq!(optimistic.infinity_mass(), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]

        #[test]
        fn delta_is_nonincreasing_in_epsilon(
            noise in 0.05f64..0.95,
            buckets in 2u32..12,
            eps_a in 0.0f64..4.0,
            eps_b in 0.0f64..4.0,
        ) {
            let pld = PrivacyLossDistribution::create_for_randomized_response(
                noise,
                buckets,
                EstimateType::Pessimistic,
                1e-3,
            ).expect("randomized response");
            let (lo, hi) = (eps_a.min(eps_b), eps_a.max(eps_b));
            prop_assert!(pld.get_delta_for_epsilon(lo) >= pld.get_delta_for_epsilon(hi) - 1e-15);
        }

        #[test]
        fn epsilon_delta_inversion_is_consistent(delta in 1e-8f64..0.5) {
            let pld = PrivacyLossDistribution::create_for_gaussian_mechanism(
                1.0,
                1.0,
                EstimateType::Pessimistic,
                1e-2,
                -50.0,
            ).expect("gaussian");
            let epsilon = pld.get_epsilon_for_delta(delta);
            prop_assert!(epsilon.is_finite());
            prop_assert!(pld.get_delta_for_epsilon(epsilon) <= delta + 1e-12);
            // One grid-tolerance step below, the divergence must exceed delta.
            if epsilon > 1e-6 {
                prop_assert!(pld.get_delta_for_epsilon((epsilon - 1e-6).max(0.0)) >= delta - 1e-9);
            }
        }
    }
}
