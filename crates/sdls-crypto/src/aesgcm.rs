//! AES-256-GCM implementation of [`CryptoProvider`] via the `aes-gcm` crate.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::error::CryptoError;
use crate::provider::{CryptoProvider, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Production `CryptoProvider`: AES-256 in GCM mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmProvider;

impl AesGcmProvider {
    /// Construct a new provider. Stateless - holds no key material itself.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for AesGcmProvider {
    fn self_test(&self) -> Result<(), CryptoError> {
        let key = [0x11u8; KEY_SIZE];
        let iv = [0x22u8; NONCE_SIZE];
        let aad = b"self-test-aad";
        let plaintext = b"self-test-plaintext";
        let (ciphertext, tag) = self.encrypt(&key, &iv, aad, plaintext)?;
        let decrypted = self.decrypt(&key, &iv, aad, &ciphertext, &tag)?;
        if decrypted == plaintext {
            Ok(())
        } else {
            Err(CryptoError::SelfTestFailed)
        }
    }

    fn encrypt(
        &self,
        key: &[u8; KEY_SIZE],
        iv: &[u8; NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_SIZE]), CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce = Nonce::from_slice(iv);
        let mut out = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptFailed)?;
        let tag_start = out.len() - TAG_SIZE;
        let tag_bytes = out.split_off(tag_start);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&tag_bytes);
        Ok((out, tag))
    }

    fn decrypt(
        &self,
        key: &[u8; KEY_SIZE],
        iv: &[u8; NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce = Nonce::from_slice(iv);
        let mut combined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        combined.extend_from_slice(ciphertext);
        combined.extend_from_slice(tag);
        cipher
            .decrypt(nonce, Payload { msg: &combined, aad })
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes() {
        assert!(AesGcmProvider::new().self_test().is_ok());
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let provider = AesGcmProvider::new();
        let key = [0x42u8; KEY_SIZE];
        let iv = [0x01u8; NONCE_SIZE];
        let aad = b"frame-prefix";
        let plaintext = b"telecommand payload";

        let (ciphertext, tag) = provider.encrypt(&key, &iv, aad, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        let decrypted = provider.decrypt(&key, &iv, aad, &ciphertext, &tag).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampered_tag_fails() {
        let provider = AesGcmProvider::new();
        let key = [0x42u8; KEY_SIZE];
        let iv = [0x01u8; NONCE_SIZE];
        let (ciphertext, mut tag) = provider.encrypt(&key, &iv, b"", b"data").unwrap();
        tag[0] ^= 0xFF;
        assert!(provider.decrypt(&key, &iv, b"", &ciphertext, &tag).is_err());
    }

    #[test]
    fn wrong_aad_fails() {
        let provider = AesGcmProvider::new();
        let key = [0x42u8; KEY_SIZE];
        let iv = [0x01u8; NONCE_SIZE];
        let (ciphertext, tag) = provider.encrypt(&key, &iv, b"correct-aad", b"data").unwrap();
        assert!(provider.decrypt(&key, &iv, b"wrong-aad", &ciphertext, &tag).is_err());
    }

    #[test]
    fn authenticate_only_produces_tag_over_aad() {
        let provider = AesGcmProvider::new();
        let key = [0x07u8; KEY_SIZE];
        let iv = [0x09u8; NONCE_SIZE];
        let tag = provider.authenticate(&key, &iv, b"challenge-bytes").unwrap();
        assert_eq!(tag.len(), TAG_SIZE);
    }
}
