//! Password hashing and session tokens.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use rand_distr::Alphanumeric;
use sha2::{Digest, Sha256};

const SESSION_TOKEN_LEN: usize = 64;

/// Salted password hash in PHC string form.
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| anyhow!("{}", err))?
        .to_string();
    Ok(hash)
}

/// Constant-time verification against a stored PHC hash. A malformed stored
/// hash verifies as false rather than erroring, so a corrupt row can never
/// let a login through.
pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// High-entropy opaque session token, returned to the caller exactly once.
pub fn generate_session_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Only this hash of the raw token is ever persisted.
pub fn hash_session_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("123mypw").unwrap();
        assert!(verify_password("123mypw", &hash));
        assert!(!verify_password("not the pw", &hash));
    }

    #[test]
    fn same_password_gets_fresh_salt() {
        let first = hash_password("repeat").unwrap();
        let second = hash_password("repeat").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("repeat", &first));
        assert!(verify_password("repeat", &second));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("pw", "garbage"));
        assert!(!verify_password("pw", ""));
    }

    #[test]
    fn session_tokens_are_long_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn token_hash_is_stable_hex() {
        let hash = hash_session_token("abc");
        assert_eq!(hash, hash_session_token("abc"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
