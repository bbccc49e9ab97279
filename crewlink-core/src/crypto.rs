use hmac::{Hmac, Mac};
use rand::{TryRngCore, rngs::OsRng};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Keyed hashing and secret generation for location sharing.
///
/// Security codes, scoped tokens and worker phone numbers are never stored
/// in the clear; only their HMAC-SHA-256 digests are persisted. Each input
/// kind is domain-separated so a code digest can never collide with a
/// phone digest.
#[derive(Debug)]
pub struct ShareCrypto {
    hmac_key: Zeroizing<Vec<u8>>,
}

impl ShareCrypto {
    pub const CODE_LENGTH: usize = 6;
    const TOKEN_BYTES: usize = 32;

    pub fn new(hmac_key: impl AsRef<[u8]>) -> Result<Self, CryptoError> {
        let key = hmac_key.as_ref();
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }

        Ok(Self {
            hmac_key: Zeroizing::new(key.to_vec()),
        })
    }

    /// Digest of an opaque bearer token, hex encoded for storage.
    pub fn hash_token(&self, token: &str) -> String {
        self.digest(b"token", token)
    }

    /// Digest of a security code, scoped to the job it was issued for.
    pub fn hash_code(&self, job_scope: &str, code: &str) -> String {
        let mut material = Zeroizing::new(String::with_capacity(
            job_scope.len() + code.len() + 1,
        ));
        material.push_str(job_scope);
        material.push(':');
        material.push_str(code);
        self.digest(b"code", &material)
    }

    /// Digest of an already-normalized phone number.
    pub fn hash_phone(&self, normalized_phone: &str) -> String {
        self.digest(b"phone", normalized_phone)
    }

    /// Constant-time comparison of two hex digests.
    pub fn digests_match(left: &str, right: &str) -> bool {
        constant_time_eq::constant_time_eq(left.as_bytes(), right.as_bytes())
    }

    /// A uniformly distributed numeric code of [`Self::CODE_LENGTH`] digits.
    pub fn generate_code(&self) -> Result<String, CryptoError> {
        let mut out = String::with_capacity(Self::CODE_LENGTH);
        let mut buf = [0u8; 16];
        while out.len() < Self::CODE_LENGTH {
            fill_random(&mut buf)?;
            // 250 is the largest multiple of 10 below 256; rejecting the rest
            // keeps every digit equally likely.
            for byte in buf.iter().filter(|b| **b < 250) {
                if out.len() == Self::CODE_LENGTH {
                    break;
                }
                out.push(char::from(b'0' + byte % 10));
            }
        }
        Ok(out)
    }

    /// A fresh 256-bit bearer secret, hex encoded.
    pub fn generate_token(&self) -> Result<String, CryptoError> {
        let mut bytes = Zeroizing::new([0u8; Self::TOKEN_BYTES]);
        fill_random(bytes.as_mut())?;
        Ok(hex::encode(bytes.as_ref()))
    }

    fn digest(&self, domain: &[u8], input: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(&self.hmac_key)
            .expect("HMAC-SHA-256 accepts keys of any size");
        mac.update(domain);
        mac.update(b"\0");
        mac.update(input.as_bytes());

        hex::encode(mac.finalize().into_bytes())
    }
}

fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|err| CryptoError::Entropy(err.to_string()))
}
