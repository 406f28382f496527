//! Cryptographically strong random bytes.
//!
//! Every request is served by the operating system's generator, so no
//! user-space state survives a `fork` or is shared between processes. The
//! generator handle is created on the first nonzero request.

use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

/// Lazily created, thread-safe random byte source
#[derive(Debug)]
pub struct CryptoRandom {
    generator: OnceCell<OsRng>,
}

static GLOBAL: CryptoRandom = CryptoRandom::new();

impl CryptoRandom {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generator: OnceCell::new(),
        }
    }

    /// Process-wide instance
    #[must_use]
    pub fn global() -> &'static CryptoRandom {
        &GLOBAL
    }

    /// Whether the underlying generator has been created yet
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.generator.get().is_some()
    }

    /// Exactly `count` random bytes. Zero returns an empty vector without
    /// touching the generator.
    #[must_use]
    pub fn get_random_bytes(&self, count: u32) -> Vec<u8> {
        if count == 0 {
            return Vec::new();
        }

        let mut generator = *self.generator.get_or_init(|| {
            debug!("Creating operating system random generator");
            OsRng
        });

        let mut bytes = vec![0u8; count as usize];
        generator.fill_bytes(&mut bytes);
        bytes
    }
}

impl Default for CryptoRandom {
    fn default() -> Self {
        Self::new()
    }
}

/// Random bytes from the process-wide generator
#[must_use]
pub fn get_random_bytes(count: u32) -> Vec<u8> {
    CryptoRandom::global().get_random_bytes(count)
}
