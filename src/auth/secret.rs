use crate::config::AuthConfig;
use crate::error::{AppError, Result};

/// Process-wide shared-secret gate.
///
/// Every terminal presents the same opaque token at connection time; this is
/// deliberately not per-user identity.
pub struct SharedSecret {
    token: Vec<u8>,
}

impl SharedSecret {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            token: config.token.as_bytes().to_vec(),
        }
    }

    /// Verify the token supplied at handshake time.
    ///
    /// A missing token and a mismatched token reject with distinct reasons,
    /// and both reject before the attempt consumes a connection slot.
    pub fn verify(&self, token: Option<&str>) -> Result<()> {
        let token = token.ok_or(AppError::NoToken)?;
        if constant_time_eq(token.as_bytes(), &self.token) {
            Ok(())
        } else {
            Err(AppError::AuthFailed)
        }
    }
}

/// Byte-wise comparison that does not short-circuit on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
