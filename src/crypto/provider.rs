use rand::rngs::{OsRng, StdRng};
use rand::{CryptoRng, RngCore, SeedableRng};
use std::sync::Mutex;

/// Source of randomness for every cryptographic operation in the crate.
///
/// Key generation, OAEP padding, RSA blinding, salts and nonces all draw from
/// the provider handed to [`KeyCustody`](super::KeyCustody) and
/// [`MessageCipher`](super::MessageCipher), so tests can swap in a seeded one.
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with cryptographically secure random bytes
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Borrow this provider as a `rand` RNG
    fn rng(&self) -> ProviderRng<'_>
    where
        Self: Sized,
    {
        ProviderRng(self)
    }
}

impl dyn CryptoProvider {
    /// Borrow a trait object as a `rand` RNG
    pub fn as_rng(&self) -> ProviderRng<'_> {
        ProviderRng(self)
    }

    /// Fresh random array, e.g. salts and nonces
    pub fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut out = [0u8; N];
        self.fill_bytes(&mut out);
        out
    }
}

/// Operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCryptoProvider;

impl CryptoProvider for OsCryptoProvider {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Deterministic provider seeded from a `u64`.
///
/// Never use outside tests and fixtures: every instance with the same seed
/// produces the same keys, salts and nonces.
pub struct SeededCryptoProvider {
    rng: Mutex<StdRng>,
}

impl SeededCryptoProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl CryptoProvider for SeededCryptoProvider {
    fn fill_bytes(&self, dest: &mut [u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.fill_bytes(dest);
    }
}

/// Adapter exposing a [`CryptoProvider`] through `rand_core` traits
pub struct ProviderRng<'a>(&'a dyn CryptoProvider);

impl RngCore for ProviderRng<'_> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for ProviderRng<'_> {}
