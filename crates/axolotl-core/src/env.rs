//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system randomness and time. Production code
//! uses [`SystemEnv`]; simulations supply a seeded implementation so every
//! generated key, and therefore every ciphertext, is reproducible.

use rand_core::{CryptoRng, RngCore};

/// Source of randomness and wall-clock time.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (OS entropy
///   exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Seconds since the Unix epoch, used to timestamp signed pre-keys.
    fn wall_clock_secs(&self) -> u64;

    /// Generates a random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Generates a random fixed-size array.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Adapter exposing an [`Environment`] as an RNG for key generation.
pub struct EnvRng<'a, E: Environment>(pub &'a E);

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        self.0.random_u32()
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_be_bytes(self.0.random_array())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

impl<E: Environment> CryptoRng for EnvRng<'_, E> {}

/// Production environment using the OS RNG and system clock.
///
/// # Panics
///
/// Panics if the OS RNG fails. Without working randomness no key can be
/// generated safely, so there is nothing to fall back to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }
}
