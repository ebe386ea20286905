//! Per-call configuration for the public entry points.
//!
//! There is no process-wide mode flag: callers thread a `Config` through
//! `linear`/`dropout`, each call reads it once, and every node keeps a copy
//! so that the gradient nodes it builds during backward see the same
//! settings.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Training mode. Dropout is the identity when this is `false`.
    pub train: bool,
    /// Allow dispatch to the accelerated host backend when operands are ready.
    pub accelerate: bool,
    /// Seed for the random streams used by stochastic nodes.
    /// `None` seeds them from system entropy.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            train: true,
            accelerate: true,
            seed: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluation-mode configuration.
    pub fn eval() -> Self {
        Self::default().with_train(false)
    }

    pub fn with_train(mut self, train: bool) -> Self {
        self.train = train;
        self
    }

    pub fn with_accelerate(mut self, accelerate: bool) -> Self {
        self.accelerate = accelerate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the random stream a stochastic node draws from.
    pub(crate) fn make_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
