//! Distribution primitives for the kPS samplers.
//!
//! Every draw takes the engine's RNG explicitly; there is no global or
//! lazily-initialized generator state, so identical seeds give identical
//! streams and independent engines can never contaminate each other.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Binomial, Distribution, Exp, Gamma, Poisson};

use crate::error::KpsError;

/// Uniform draw on [0, 1).
pub fn sample_uniform(rng: &mut StdRng) -> f64 {
    rng.gen::<f64>()
}

/// Exponential waiting time with mean `tau`.
pub fn sample_exponential(rng: &mut StdRng, tau: f64) -> Result<f64, KpsError> {
    if !(tau > 0.0) {
        return Err(KpsError::InvalidDistributionParameters(format!(
            "exponential mean must be positive, got {tau}"
        )));
    }
    let exp = Exp::new(1.0 / tau)
        .map_err(|e| KpsError::InvalidDistributionParameters(e.to_string()))?;
    Ok(exp.sample(rng))
}

/// Gamma waiting time with integer shape `a` and scale `b` (mean a·b).
///
/// A zero shape contributes zero time.
pub fn sample_gamma(rng: &mut StdRng, a: u64, b: f64) -> Result<f64, KpsError> {
    if a == 0 {
        return Ok(0.0);
    }
    if !(b > 0.0) {
        return Err(KpsError::InvalidDistributionParameters(format!(
            "gamma scale must be positive, got {b}"
        )));
    }
    let gamma = Gamma::new(a as f64, b)
        .map_err(|e| KpsError::InvalidDistributionParameters(e.to_string()))?;
    Ok(gamma.sample(rng))
}

/// Number of successes in `h` Bernoulli trials with success probability `p`.
pub fn sample_binomial(rng: &mut StdRng, h: u64, p: f64) -> Result<u64, KpsError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(KpsError::InvalidDistributionParameters(format!(
            "binomial success probability {p} outside [0, 1]"
        )));
    }
    if h == 0 || p == 0.0 {
        return Ok(0);
    }
    if p == 1.0 {
        return Ok(h);
    }
    let binom = Binomial::new(h, p)
        .map_err(|e| KpsError::InvalidDistributionParameters(e.to_string()))?;
    Ok(binom.sample(rng))
}

/// Number of failures before the `r`-th success, success probability `p`.
///
/// Drawn through the Gamma–Poisson mixture: NB(r, p) is Poisson with a
/// Gamma(r, (1−p)/p) distributed mean.
pub fn sample_neg_binomial(rng: &mut StdRng, r: u64, p: f64) -> Result<u64, KpsError> {
    if !(p > 0.0 && p <= 1.0) {
        return Err(KpsError::InvalidDistributionParameters(format!(
            "negative-binomial success probability {p} outside (0, 1]"
        )));
    }
    if r == 0 || p == 1.0 {
        return Ok(0);
    }
    let mean = Gamma::new(r as f64, (1.0 - p) / p)
        .map_err(|e| KpsError::InvalidDistributionParameters(e.to_string()))?
        .sample(rng);
    if mean <= 0.0 {
        return Ok(0);
    }
    let draw = Poisson::new(mean)
        .map_err(|e| KpsError::InvalidDistributionParameters(e.to_string()))?
        .sample(rng);
    Ok(draw as u64)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
