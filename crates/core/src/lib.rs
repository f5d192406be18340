//! # ezmig-core
//!
//! Shared foundations for ez-migrate: the supported SQL dialects and the
//! `ez-migrate.json` configuration model, including environment-backed
//! connection settings and validation.

pub mod config;
pub mod dialect;

pub use config::*;
pub use dialect::*;
