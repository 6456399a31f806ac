//! Registered client identities.
//!
//! The registry issues client credentials and authenticates them on every grant.

pub mod registry;

pub use registry::ClientRegistry;
