//! Execution context threaded through function resolution.

use crate::config::CompilerConfig;
use alloc::rc::Rc;
use core::cell::RefCell;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Random generator shared by every random function of one context.
pub type SharedRandom = Rc<RefCell<SmallRng>>;

/// Per-caller state handed to the compiler.
///
/// Random functions resolved under one context draw from the same stream,
/// so a query's output is reproducible for a given seed regardless of how
/// many random functions it calls.
#[derive(Clone, Debug)]
pub struct SqlExecutionContext {
    config: CompilerConfig,
    random: SharedRandom,
}

impl SqlExecutionContext {
    /// Creates a context seeded from `config`.
    pub fn new(config: CompilerConfig) -> Self {
        let random = Rc::new(RefCell::new(seeded(&config)));
        Self { config, random }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Returns a handle to the shared random generator.
    pub fn random(&self) -> SharedRandom {
        Rc::clone(&self.random)
    }

    /// Restarts the random stream from the configured seed.
    pub fn reset_random(&self) {
        *self.random.borrow_mut() = seeded(&self.config);
    }
}

impl Default for SqlExecutionContext {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

fn seeded(config: &CompilerConfig) -> SmallRng {
    let (s0, s1) = config.random_seed;
    let mut seed = [0u8; 32];
    seed[..8].copy_from_slice(&s0.to_le_bytes());
    seed[8..16].copy_from_slice(&s1.to_le_bytes());
    seed[16..24].copy_from_slice(&s0.rotate_left(17).to_le_bytes());
    seed[24..].copy_from_slice(&s1.rotate_left(31).to_le_bytes());
    SmallRng::from_seed(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_shared_stream() {
        let ctx = SqlExecutionContext::default();
        let a = ctx.random();
        let b = ctx.random();
        let x: u64 = a.borrow_mut().gen();
        let y: u64 = b.borrow_mut().gen();

        let fresh = SqlExecutionContext::default();
        let r = fresh.random();
        let fx: u64 = r.borrow_mut().gen();
        let fy: u64 = r.borrow_mut().gen();
        assert_eq!((x, y), (fx, fy));
    }

    #[test]
    fn test_reset_random() {
        let ctx = SqlExecutionContext::new(CompilerConfig::new().with_random_seed(3, 4));
        let first: u32 = ctx.random().borrow_mut().gen();
        ctx.reset_random();
        let again: u32 = ctx.random().borrow_mut().gen();
        assert_eq!(first, again);
    }
}
