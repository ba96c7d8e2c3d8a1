//! Herdgate Core - Access Control Engine
//!
//! This crate provides the tenant access-control engine for the Herdgate
//! livestock platform: organization membership resolution, per-resource
//! ownership verification, role capability rules, licensed module gating,
//! and the audit trail for every module-gate decision.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod guard;
pub mod middleware;
pub mod repository;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
