//! PharmChat Shared Types and Utilities
//!
//! This crate contains the identity types, chat records, store errors and
//! database helpers shared by the PharmChat services.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
