//! Mock server implementations for testing.
//!
//! This module provides `MockServer` and a pre-built demo fleet for running
//! the dashboard without any database.

mod scenarios;
mod server;

pub use scenarios::demo_fleet;
pub use server::MockServer;
