//! Workspace root crate for the SDLS engine. This package exists only to
//! anchor the workspace manifest (shared lints, profiles, dev tooling);
//! all functionality lives in the `crates/` members.

#![forbid(unsafe_code)]
