//! Explicit random sources.
//!
//! Nothing in the crate touches a thread-local or global generator: every
//! stochastic routine receives an `Rng` argument, and predictors derive it
//! from their configured seed at the start of `fit`.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Builds the generator for one fit call.
///
/// A fixed seed gives bit-identical training runs; `None` draws the seed from
/// OS entropy.
#[must_use]
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}
