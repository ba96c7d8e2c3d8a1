//! HTTP middleware for the access control engine

pub mod access;
pub mod auth;

pub use access::{enforce_access, AccessGuard};
