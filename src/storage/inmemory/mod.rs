//! In-memory storage implementations
//!
//! This module provides the in-memory implementation of the storage traits.
//! It is the reference backend used by the server binary and the tests.

mod oauth;

pub use oauth::MemoryOAuthStorage;
