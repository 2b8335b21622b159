//! `CryptoProvider` error type.

use thiserror::Error;

/// Errors raised by the AES-256-GCM collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A key value was not exactly 32 bytes (AES-256 key width).
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// A nonce/IV value was not exactly 12 bytes.
    #[error("invalid nonce length: expected 12 bytes, got {0}")]
    InvalidNonceLength(usize),

    /// Encryption failed (the underlying AEAD implementation rejected the
    /// operation, e.g. plaintext too large for a single GCM invocation).
    #[error("encryption failed")]
    EncryptFailed,

    /// Decryption or MAC verification failed.
    #[error("decryption or tag verification failed")]
    DecryptFailed,

    /// The provider's self-test (run during engine `init`) failed.
    #[error("crypto provider self-test failed")]
    SelfTestFailed,
}
