//! `CryptoProvider`: the AES-256-GCM primitive treated as an external
//! collaborator by `sdls-core`.
//!
//! The reference engine models this as a stateful handle
//! (`open`/`setkey`/`setiv`/`encrypt`/`decrypt`/`gettag`/`checktag`) that is
//! acquired and released around every frame. Rust ownership makes that
//! explicit: each trait method takes exactly the key/nonce/AAD/data it
//! needs and returns a `Result`, so there is no handle to leak across an
//! error path.

use crate::error::CryptoError;

/// Width of an AES-256 key.
pub const KEY_SIZE: usize = 32;
/// Width of the GCM nonce used throughout the engine.
pub const NONCE_SIZE: usize = 12;
/// Width of the GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// The AEAD primitive the `SecurityEngine` orchestrates; never implemented
/// by `sdls-core` itself.
pub trait CryptoProvider {
    /// Run the provider's self-test. Called once during `Engine::init`; a
    /// failure is fatal and the engine refuses to operate.
    fn self_test(&self) -> Result<(), CryptoError>;

    /// Encrypt `plaintext` under `key`/`iv` with additional authenticated
    /// data `aad`, returning `(ciphertext, tag)`.
    fn encrypt(
        &self,
        key: &[u8; KEY_SIZE],
        iv: &[u8; NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_SIZE]), CryptoError>;

    /// Decrypt `ciphertext` under `key`/`iv`/`aad`, verifying `tag`.
    /// Returns `CryptoError::DecryptFailed` on any tag mismatch - no partial
    /// plaintext is ever returned on failure.
    fn decrypt(
        &self,
        key: &[u8; KEY_SIZE],
        iv: &[u8; NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Authenticate-only: compute a GCM tag over `aad` with no ciphertext
    /// payload. Used by the Verify EP procedure to mint a challenge
    /// response and reserved for the Authenticate-only TC/TM mode.
    fn authenticate(
        &self,
        key: &[u8; KEY_SIZE],
        iv: &[u8; NONCE_SIZE],
        aad: &[u8],
    ) -> Result<[u8; TAG_SIZE], CryptoError> {
        let (_, tag) = self.encrypt(key, iv, aad, &[])?;
        Ok(tag)
    }
}
