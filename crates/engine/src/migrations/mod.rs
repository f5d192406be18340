//! Migration System
//!
//! File parsing, execution and batch rollback of migrations.

pub mod definitions;
pub mod executor;
pub mod parser;
pub mod rollback;

pub use definitions::*;
pub use executor::*;
pub use parser::*;
