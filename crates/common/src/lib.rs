//! Shared error plumbing used across all skillgate crates.

pub mod error;

pub use error::FromMessage;
