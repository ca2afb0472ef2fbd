//! Core abstractions for awsrotkey: profile and credential types, the remote
//! identity API contract and the local credential store contract.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod identity;
pub mod profile;
pub mod store;
