//! Domain models for the ask service.

pub mod identity;

pub use identity::{FirebaseClaims, VerifiedIdentity};
