//! Passphrase verification via an encrypted canary.
//!
//! A fixed, known plaintext is encrypted once under the working key and
//! stored by the server. Any client can then confirm its derived key matches
//! the key in use by decrypting the canary and comparing — the key never
//! leaves the client.

use crate::cipher::{decrypt_string, encrypt_string};
use crate::error::CryptoResult;
use crate::key::DerivedKey;

/// The fixed canary plaintext. Changing this invalidates every deployed
/// canary, so it is versioned in the value itself.
pub const CANARY_VALUE: &str = "FIELDLOCK_CANARY_V1";

/// Encrypts the canary constant under the given key.
pub fn create_canary(key: &DerivedKey) -> CryptoResult<String> {
    encrypt_string(key, CANARY_VALUE)
}

/// Checks whether `blob` decrypts to the canary constant under `key`.
///
/// Never fails: a wrong key, malformed base64, truncated data or a
/// non-canary plaintext all yield `false`. Callers use this as a yes/no
/// passphrase check and must not be able to crash on hostile input.
pub fn verify_canary(key: &DerivedKey, blob: &str) -> bool {
    match decrypt_string(key, blob) {
        Ok(plaintext) => plaintext == CANARY_VALUE,
        Err(_) => false,
    }
}
