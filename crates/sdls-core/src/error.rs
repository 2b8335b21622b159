//! `EngineError`: the public error taxonomy composing `sdls-proto` and
//! `sdls-crypto` errors at the engine boundary.

use sdls_crypto::CryptoError;
use sdls_proto::ProtoError;
use thiserror::Error;

/// Errors surfaced by every public `Engine` operation. None are retried
/// internally; the caller decides what to do.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed frame bytes (length, wire layout).
    #[error("framing error: {0}")]
    Framing(#[from] ProtoError),

    /// FECF did not match the computed value.
    #[error("FECF mismatch")]
    Fecf,

    /// Referenced SPI or key ID does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// SA or key state machine rejected the requested transition.
    #[error("state error: {0}")]
    State(String),

    /// Policy violation (VCID/SCID mismatch, disallowed mode, SPI reserved).
    #[error("policy error: {0}")]
    Policy(String),

    /// Anti-replay window rejected the received IV.
    #[error("replay error: {0}")]
    Replay(String),

    /// GCM tag verification failed.
    #[error("MAC verification failed")]
    Mac,

    /// OTAR or Verify authentication failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A big-endian counter overflowed its width.
    #[error("counter overflow")]
    Overflow,

    /// No `Operational` SA matches the requested channel binding.
    #[error("no active SA for this channel")]
    NoActiveSa,

    /// The `CryptoProvider` collaborator itself failed or reported that its
    /// self-test did not pass.
    #[error("crypto provider error: {0}")]
    CryptoProvider(#[from] CryptoError),
}
