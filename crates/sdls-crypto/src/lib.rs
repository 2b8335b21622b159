//! AES-256-GCM `CryptoProvider` collaborator.
//!
//! This crate is deliberately the one place in the workspace that touches
//! an AEAD primitive directly; `sdls-core` only ever sees the
//! [`CryptoProvider`] trait.

#![forbid(unsafe_code)]

pub mod aesgcm;
pub mod error;
pub mod provider;

pub use aesgcm::AesGcmProvider;
pub use error::CryptoError;
pub use provider::{CryptoProvider, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
