/// CoinSpark Tracker Mock Library
///
/// This crate provides both a standalone binary and library components
/// for serving canned asset tracker answers and asset web pages.

pub mod fixture;
pub mod handlers;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use fixture::{Fixture, FixtureError};
pub use server::{create_router, run_server};
pub use types::*;
