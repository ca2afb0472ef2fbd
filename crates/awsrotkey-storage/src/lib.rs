//! Local credential store implementations.
//! Patches the shared credentials file in place, writing through a temp file and rename.

pub mod shared_credentials;
