//! Identifier, password-hash and token primitives.

use std::fmt;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use base64::Engine as _;
use rand::RngExt as _;
use uuid::Uuid;

use crate::error::{Error, Result};

const SALT_LEN: usize = 16;

/// Token length in bytes when the caller has no specific entropy target (256 bits).
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// A random (version 4) UUID rendered as lowercase `8-4-4-4-12` hex groups.
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Hash `plaintext` combined with the application pepper using Argon2id.
///
/// Every call draws a fresh salt, so hashing the same password twice gives different
/// strings. The output is a PHC string carrying the algorithm, cost and salt.
pub fn hash_password(plaintext: &str, pepper: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| Error::Credential(format!("failed to encode salt: {e}")))?;

    let hash = Argon2::default()
        .hash_password(peppered(plaintext, pepper).as_bytes(), &salt)
        .map_err(|e| Error::Credential(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Check `plaintext` against a hash produced by [`hash_password`].
///
/// A wrong password and a malformed hash both yield `false`.
pub fn verify_password(hashed: &str, plaintext: &str, pepper: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hashed) else {
        return false;
    };
    Argon2::default().verify_password(peppered(plaintext, pepper).as_bytes(), &parsed).is_ok()
}

/// `byte_length` random bytes from the OS-seeded generator, URL-safe base64 encoded.
pub fn generate_token(byte_length: usize) -> Result<String> {
    if byte_length == 0 {
        return Err(Error::InvalidArgument("token length must be at least one byte".into()));
    }
    let mut bytes = vec![0u8; byte_length];
    rand::rng().fill(bytes.as_mut_slice());
    Ok(base64::engine::general_purpose::URL_SAFE.encode(&bytes))
}

fn peppered(plaintext: &str, pepper: &str) -> String {
    format!("{plaintext}{pepper}")
}

/// Password and token primitives bound to the configured pepper
#[derive(Clone)]
pub struct Credentials {
    pepper: String,
    token_bytes: usize,
}

impl Credentials {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self { pepper: pepper.into(), token_bytes: DEFAULT_TOKEN_BYTES }
    }

    pub fn with_token_bytes(mut self, token_bytes: usize) -> Self {
        self.token_bytes = token_bytes;
        self
    }

    pub fn hash_password(&self, plaintext: &str) -> Result<String> {
        hash_password(plaintext, &self.pepper)
    }

    pub fn verify_password(&self, hashed: &str, plaintext: &str) -> bool {
        verify_password(hashed, plaintext, &self.pepper)
    }

    /// A token of the configured length
    pub fn token(&self) -> Result<String> {
        generate_token(self.token_bytes)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("pepper", &super::REDACTED_PASSWORD)
            .field("token_bytes", &self.token_bytes)
            .finish()
    }
}
