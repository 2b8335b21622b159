//! Spacecraft link-layer security engine: SA/key lifecycle state machines,
//! anti-replay windowing, and the TC/TM security pipeline for CCSDS SDLS
//! (CCSDS 355.0-B-1). This crate owns policy and orchestration; bit-exact
//! wire formats live in `sdls-proto` and the AEAD primitive lives in
//! `sdls-crypto`.

#![forbid(unsafe_code)]

pub mod anti_replay;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod key;
pub mod sa;
pub mod sdls_interpreter;

pub use config::EngineConfig;
pub use engine::{Engine, TestToggles};
pub use error::EngineError;
pub use event_log::{EventId, EventLog};
pub use key::{Key, KeyRing, KeyState};
pub use sa::{Sadb, SaConfig, SaState, SecurityAssociation};
