//! Numeric helpers shared by the accounting crates.
//!
//! These are the floating-point workhorses behind divergence queries and
//! grid projection: stable log-domain sums, compensated accumulation, and
//! index rounding onto the privacy-loss grid.

/// Numerically stable log(exp(a) + exp(b)).
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// Numerically stable log of a sum of exponentials.
///
/// Returns `NEG_INFINITY` for an empty slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Kahan compensated accumulator.
///
/// Mass sums feeding divergence values run through this; naive summation
/// loses several digits once supports reach millions of cells.
#[derive(Clone, Copy, Debug, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value.
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// The accumulated total.
    pub fn total(&self) -> f64 {
        self.sum
    }
}

/// Smallest grid index `i` with `i * interval >= value`.
pub fn ceil_to_grid(value: f64, interval: f64) -> i64 {
    (value / interval).ceil() as i64
}

/// Largest grid index `i` with `i * interval <= value`.
pub fn floor_to_grid(value: f64, interval: f64) -> i64 {
    (value / interval).floor() as i64
}

/// Bisection over a monotone non-increasing function.
///
/// Returns the smallest abscissa, within `tolerance`, whose value is at
/// most `target`. Requires `f(upper) <= target`; when `f(lower) <= target`
/// the caller should short-circuit to `lower` itself.
pub fn bisect_nonincreasing<F>(f: F, target: f64, mut lower: f64, mut upper: f64, tolerance: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    while upper - lower > tolerance {
        let mid = 0.5 * (lower + upper);
        if mid <= lower || mid >= upper {
            break;
        }
        if f(mid) <= target {
            upper = mid;
        } else {
            lower = mid;
        }
    }
    upper
}
