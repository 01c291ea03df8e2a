//! Password hashing and verification.
//!
//! Hashing uses Argon2id with a random salt. Verification re-hashes the
//! candidate with the stored hash's own salt/params, then compares the two
//! digests as hex strings via [`subtle::ConstantTimeEq`] rather than raw byte
//! slices, since that is the comparison this design is specified to perform.

use argon2::Argon2;
use password_hash::{PasswordHash, PasswordHasher, SaltString};
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::error::SecurityError;

/// Hashes `password` with a freshly generated salt, returning a PHC-format
/// string suitable for storage.
pub fn hash_password(password: &str) -> Result<String, SecurityError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SecurityError::ValidationFailed(e.to_string()))
}

/// Verifies `password` against a stored PHC hash string.
///
/// Re-derives a digest for `password` using the salt and parameters embedded
/// in `stored_hash`, then compares the two digests' hex encodings in constant
/// time.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, SecurityError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| SecurityError::ValidationFailed(e.to_string()))?;

    let stored_digest = parsed.hash.ok_or_else(|| SecurityError::ValidationFailed("stored hash has no digest".into()))?;
    let salt = parsed.salt.ok_or_else(|| SecurityError::ValidationFailed("stored hash has no salt".into()))?;

    let candidate = Argon2::default()
        .hash_password(password.as_bytes(), salt)
        .map_err(|e| SecurityError::ValidationFailed(e.to_string()))?;
    let candidate_digest = candidate
        .hash
        .ok_or_else(|| SecurityError::ValidationFailed("computed hash has no digest".into()))?;

    let stored_hex = to_hex(stored_digest.as_bytes());
    let candidate_hex = to_hex(candidate_digest.as_bytes());

    Ok(stored_hex.as_bytes().ct_eq(candidate_hex.as_bytes()).into())
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies_a_password() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
    }

    #[test]
    fn rejects_a_wrong_password() {
        let hash = hash_password("hunter2").unwrap();
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted_and_unique() {
        let a = hash_password("hunter2").unwrap();
        let b = hash_password("hunter2").unwrap();
        assert_ne!(a, b);
    }
}
