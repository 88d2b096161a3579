use std::fmt;

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use scrypt::Params;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::error;

pub const SALT_LEN: usize = 16;

const SCRYPT_LOG_N: u8 = 14; // N = 16384
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const VERIFIER_LEN: usize = 32;

/// Derives password verifiers: HMAC-SHA256 with the server pepper, then scrypt
/// with the per-user salt.
#[derive(Clone)]
pub struct CredentialHasher {
    pepper: Vec<u8>,
}

impl fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("pepper", &"<redacted>")
            .finish()
    }
}

impl CredentialHasher {
    pub fn new(pepper: impl Into<Vec<u8>>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    pub fn generate_salt(&self) -> anyhow::Result<[u8; SALT_LEN]> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.try_fill_bytes(&mut salt).map_err(|e| {
            error!(error = %e, "os rng failed while generating salt");
            anyhow::anyhow!("salt generation failed: {e}")
        })?;
        Ok(salt)
    }

    pub fn hash(&self, plain: &str, salt: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.pepper)
            .map_err(|e| anyhow::anyhow!("invalid pepper key: {e}"))?;
        mac.update(plain.as_bytes());
        let peppered = mac.finalize().into_bytes();

        let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, VERIFIER_LEN)
            .map_err(|e| anyhow::anyhow!("scrypt params: {e}"))?;
        let mut verifier = vec![0u8; VERIFIER_LEN];
        scrypt::scrypt(&peppered, salt, &params, &mut verifier).map_err(|e| {
            error!(error = %e, "scrypt derivation error");
            anyhow::anyhow!("scrypt: {e}")
        })?;
        Ok(verifier)
    }

    /// Recomputes the verifier and compares without early exit.
    pub fn verify(&self, plain: &str, verifier: &[u8], salt: &[u8]) -> bool {
        match self.hash(plain, salt) {
            Ok(candidate) => candidate.ct_eq(verifier).into(),
            Err(_) => false,
        }
    }
}
