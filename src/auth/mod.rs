//! Admin authentication
//!
//! The admin surface is protected by a single shared password checked
//! against an Argon2id hash from configuration or the registry backend.

pub mod password;

pub use password::{hash_password, verify_password};
