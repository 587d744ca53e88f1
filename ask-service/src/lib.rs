//! Authenticated question gateway: verifies Firebase callers and relays their
//! questions to Gemini under a fixed tutoring prompt.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
