//! Hash functions and key derivation shared by the SCRAM mechanisms.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use getrandom::{getrandom, Error as RngError};
use hmac::{digest::InvalidLength, Hmac, Mac};
use pbkdf2::pbkdf2;
use sha1::{Digest, Sha1 as Sha1_hash};
use sha2::Sha256 as Sha256_hash;

use std::fmt;

use crate::secret::Password;

/// Iteration count used when salting a plaintext password on the fly.
pub const DEFAULT_ITERATIONS: u32 = 4096;

/// Length of the salt generated for a plaintext password.
pub const SALT_LENGTH: usize = 16;

/// Generate a nonce for SCRAM authentication.
pub fn generate_nonce() -> Result<String, RngError> {
    let mut data = [0u8; 32];
    getrandom(&mut data)?;
    Ok(Base64.encode(data))
}

/// Generate a salt for a password stored in plaintext.
pub fn generate_salt() -> Result<Vec<u8>, RngError> {
    let mut salt = vec![0u8; SALT_LENGTH];
    getrandom(&mut salt)?;
    Ok(salt)
}

/// Why a stored password can’t be used for a given SCRAM variant.
#[derive(Debug, PartialEq)]
pub enum DeriveError {
    /// The stored digest was computed with another hash function.
    IncompatibleHashingMethod(String, &'static str),
    /// PBKDF2 refused the output length.
    InvalidLength(InvalidLength),
}

impl fmt::Display for DeriveError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeriveError::IncompatibleHashingMethod(one, two) => {
                write!(fmt, "incompatible hashing method, {} is not {}", one, two)
            }
            DeriveError::InvalidLength(err) => write!(fmt, "invalid length: {}", err),
        }
    }
}

impl std::error::Error for DeriveError {}

impl From<InvalidLength> for DeriveError {
    fn from(err: InvalidLength) -> DeriveError {
        DeriveError::InvalidLength(err)
    }
}

/// A trait which defines the needed methods for SCRAM.
pub trait ScramProvider: 'static {
    /// The name of the hash function.
    fn name() -> &'static str;

    /// The name of the SASL mechanism using this hash function.
    fn mechanism() -> &'static str;

    /// A function which hashes the data using the hash function.
    fn hash(data: &[u8]) -> Vec<u8>;

    /// A function which performs an HMAC using the hash function.
    fn hmac(data: &[u8], key: &[u8]) -> Result<Vec<u8>, InvalidLength>;

    /// Checks in constant time that `tag` is the HMAC of `data` under `key`.
    fn verify_hmac(data: &[u8], key: &[u8], tag: &[u8]) -> Result<bool, InvalidLength>;

    /// A function which does PBKDF2 key derivation using the hash function.
    fn derive(password: &Password, salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError>;
}

fn check_method(method: &str, expected: &'static str) -> Result<(), DeriveError> {
    if method == expected {
        Ok(())
    } else {
        Err(DeriveError::IncompatibleHashingMethod(
            method.to_owned(),
            expected,
        ))
    }
}

/// A `ScramProvider` which provides SCRAM-SHA-1.
pub struct Sha1;

impl ScramProvider for Sha1 {
    fn name() -> &'static str {
        "SHA-1"
    }

    fn mechanism() -> &'static str {
        "SCRAM-SHA-1"
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha1_hash::digest(data).to_vec()
    }

    fn hmac(data: &[u8], key: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        type HmacSha1 = Hmac<Sha1_hash>;
        let mut mac = HmacSha1::new_from_slice(key)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify_hmac(data: &[u8], key: &[u8], tag: &[u8]) -> Result<bool, InvalidLength> {
        let mut mac = Hmac::<Sha1_hash>::new_from_slice(key)?;
        mac.update(data);
        Ok(mac.verify_slice(tag).is_ok())
    }

    fn derive(password: &Password, salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError> {
        match password {
            Password::Plain(plain) => {
                let mut result = vec![0; 20];
                pbkdf2::<Hmac<Sha1_hash>>(plain.as_bytes(), salt, iterations, &mut result)?;
                Ok(result)
            }
            Password::Pbkdf2 { method, data, .. } => {
                check_method(method, Self::name())?;
                Ok(data.to_vec())
            }
        }
    }
}

/// A `ScramProvider` which provides SCRAM-SHA-256.
pub struct Sha256;

impl ScramProvider for Sha256 {
    fn name() -> &'static str {
        "SHA-256"
    }

    fn mechanism() -> &'static str {
        "SCRAM-SHA-256"
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha256_hash::digest(data).to_vec()
    }

    fn hmac(data: &[u8], key: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        type HmacSha256 = Hmac<Sha256_hash>;
        let mut mac = HmacSha256::new_from_slice(key)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify_hmac(data: &[u8], key: &[u8], tag: &[u8]) -> Result<bool, InvalidLength> {
        let mut mac = Hmac::<Sha256_hash>::new_from_slice(key)?;
        mac.update(data);
        Ok(mac.verify_slice(tag).is_ok())
    }

    fn derive(password: &Password, salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError> {
        match password {
            Password::Plain(plain) => {
                let mut result = vec![0; 32];
                pbkdf2::<Hmac<Sha256_hash>>(plain.as_bytes(), salt, iterations, &mut result)?;
                Ok(result)
            }
            Password::Pbkdf2 { method, data, .. } => {
                check_method(method, Self::name())?;
                Ok(data.to_vec())
            }
        }
    }
}
