//! HTTP handlers for the ask service.

pub mod ask;
pub mod health;
