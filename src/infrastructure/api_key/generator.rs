//! API Key generation
//!
//! Produces cryptographically secure key strings: a configurable prefix
//! followed by a hex-encoded random payload (default `dh_` + 64 hex chars).

use rand::RngCore;

/// Generator for secure API keys
#[derive(Debug, Clone)]
pub struct ApiKeyGenerator {
    /// Prefix for all generated keys (e.g., "dh_")
    prefix: String,
    /// Number of random bytes in the payload
    key_bytes: usize,
}

impl ApiKeyGenerator {
    /// Create a new generator
    pub fn new(prefix: impl Into<String>, key_bytes: usize) -> Self {
        Self {
            prefix: prefix.into(),
            key_bytes,
        }
    }

    /// Generate a new key string
    pub fn generate(&self) -> String {
        let mut random_bytes = vec![0u8; self.key_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        format!("{}{}", self.prefix, hex::encode(random_bytes))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for ApiKeyGenerator {
    fn default() -> Self {
        Self::new("dh_", 32)
    }
}

/// Constant-time string comparison to prevent timing attacks during key
/// matching.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut result = 0u8;

    for i in 0..a_bytes.len() {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}
