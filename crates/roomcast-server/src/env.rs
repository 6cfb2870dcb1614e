//! Environment abstraction for deterministic testing.
//!
//! Decouples the router from system resources (time, randomness) so the core
//! can run under seeded RNGs in tests while production uses OS entropy.

/// Abstract environment providing time and randomness to the router.
///
/// # Invariants
///
/// - `now()` never goes backwards within a single execution context.
/// - Given the same seed, a test implementation produces the same byte
///   sequence from `random_bytes()`.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current monotonic time, used to timestamp log actions.
    fn now(&self) -> std::time::Instant;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for connection and room id generation.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment using system time and the OS RNG.
///
/// Identifiers generated from this source are non-reproducible, which is
/// exactly what the uniqueness contract for connection and room ids wants.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}
