//! Server access and per-tick sampling.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                       Sampler                         │
//! │   worker pool, one job per server per tick, deadline  │
//! └──────────────────────────┬────────────────────────────┘
//!                            │
//!                   ┌────────▼────────┐
//!                   │  ServerAdapter  │ (trait)
//!                   └────────┬────────┘
//!              ┌─────────────┴─────────────┐
//!       ┌──────▼────────────┐       ┌──────▼──────┐
//!       │ MongoShellAdapter │       │ MockServer  │
//!       │ (mongosh --eval)  │       │ (tests/demo)│
//!       └───────────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use motop::collector::{MockServer, Sampler};
//! use motop::fleet::Server;
//!
//! let servers = vec![Server::new("db1", "10.0.0.1", Arc::new(MockServer::new()))];
//! let mut sampler = Sampler::new(2, Duration::from_secs(1));
//! let samples = sampler.sample(&servers);
//! assert!(samples[0].status.is_ok());
//! ```

pub mod mock;
pub mod sampler;
pub mod shell;
pub mod traits;

pub use mock::MockServer;
pub use sampler::{ReplicationSample, Sampler, ServerSample};
pub use shell::MongoShellAdapter;
pub use traits::{
    AdapterError, ExplainReport, InProgressOp, OpKind, OperationListing, ReplicaMember,
    ReplicationSource, ServerAdapter, ServerStatus,
};
