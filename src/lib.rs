//! motop - realtime monitoring of running operations across a MongoDB fleet.
//!
//! The library samples every configured server once per tick, turns the
//! cumulative counters into per-tick rates, and ranks servers and in-flight
//! operations into two tables. The `motop` binary drives it from an
//! interactive console where operations can be explained or killed.

pub mod collector;
pub mod config;
pub mod console;
pub mod fleet;
pub mod fmt;
pub mod models;
pub mod operations;
pub mod rates;
pub mod table;
