//! Client-side encryption layer for fieldlock.
//!
//! Everything the server stores passes through this crate first; the server
//! itself never links it. Three concerns:
//!
//! - **Key derivation**: Argon2id from a shared passphrase with a fixed
//!   shared salt, so all clients independently derive the same key.
//! - **Field encryption**: ChaCha20-Poly1305 AEAD with random nonces,
//!   wire-encoded as a base64 `nonce || ciphertext` envelope.
//! - **Canary**: a fixed plaintext encrypted once and stored server-side,
//!   letting any client verify passphrase agreement without ever sending
//!   key material.

mod canary;
mod cipher;
mod error;
mod key;

pub use canary::{create_canary, verify_canary, CANARY_VALUE};
pub use cipher::{
    decrypt, decrypt_string, decrypt_value, encrypt, encrypt_string, encrypt_value,
    EncryptedData, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, DerivedKey, KdfParams, KEY_SIZE, SHARED_SALT};
