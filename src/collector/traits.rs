//! Abstraction over a monitored server.
//!
//! The `ServerAdapter` trait lets the dashboard talk to a real server through
//! the `mongosh` shell or to an in-memory mock for testing and demos. Every
//! record crossing this boundary is already validated and typed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Errors returned by a server adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The server could not be reached.
    Unreachable(String),
    /// The call did not finish within the per-call deadline.
    Timeout,
    /// The server answered, but without the expected fields.
    MalformedSnapshot(String),
    /// The server rejected the command.
    Command(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Unreachable(msg) => write!(f, "unreachable: {}", msg),
            AdapterError::Timeout => write!(f, "timed out"),
            AdapterError::MalformedSnapshot(msg) => write!(f, "malformed response: {}", msg),
            AdapterError::Command(msg) => write!(f, "command failed: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Point-in-time server status.
///
/// `opcounters` and `flush_count` are cumulative since server start; the
/// rest are gauges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerStatus {
    pub connections_current: u64,
    pub connections_available: u64,
    /// Resident memory, MB.
    pub resident_memory: u64,
    /// Mapped memory, MB (zero on storage engines that do not map files).
    pub mapped_memory: u64,
    pub active_clients: u64,
    pub queued_clients: u64,
    pub flush_count: u64,
    /// Operation counters by kind (`query`, `insert`, `update`, ...).
    pub opcounters: BTreeMap<String, u64>,
}

impl ServerStatus {
    /// Sum of all operation counters.
    pub fn total_operations(&self) -> u64 {
        self.opcounters.values().sum()
    }

    /// Current plus available connections.
    pub fn connections_total(&self) -> u64 {
        self.connections_current + self.connections_available
    }
}

/// Operation kind as reported by `currentOp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Query,
    Other(String),
}

impl OpKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "query" => OpKind::Query,
            other => OpKind::Other(other.to_string()),
        }
    }
}

/// One in-flight operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InProgressOp {
    pub opid: i64,
    pub kind: OpKind,
    /// `database.collection`; may be empty for server-wide operations.
    pub namespace: Option<String>,
    /// Query document, kept opaque.
    pub query: Option<Value>,
    pub secs_running: Option<u64>,
}

impl InProgressOp {
    pub fn new(opid: i64, kind: &str) -> Self {
        Self {
            opid,
            kind: OpKind::parse(kind),
            namespace: None,
            query: None,
            secs_running: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_secs_running(mut self, secs: u64) -> Self {
        self.secs_running = Some(secs);
        self
    }
}

/// Operations returned by one `currentOp` call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationListing {
    pub operations: Vec<InProgressOp>,
    /// Entries without a numeric opid (`shard:opid` on a router). They
    /// cannot be killed or selected, so they are counted and dropped.
    pub skipped: usize,
}

impl OperationListing {
    pub fn new(operations: Vec<InProgressOp>) -> Self {
        Self {
            operations,
            skipped: 0,
        }
    }

    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self
    }
}

/// One data-bearing member of a replica set, as seen by the queried server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaMember {
    /// Replica set name.
    pub set: String,
    /// Member address, `host:port`.
    pub name: String,
    /// `PRIMARY`, `SECONDARY`, `RECOVERING`, ...
    pub state: String,
    /// Time of the last operation applied by the member.
    pub optime: Option<DateTime<Utc>>,
    /// Clock of the queried server when the status was taken.
    pub date: Option<DateTime<Utc>>,
}

impl ReplicaMember {
    pub fn new(set: impl Into<String>, name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            set: set.into(),
            name: name.into(),
            state: state.into(),
            optime: None,
            date: None,
        }
    }

    pub fn with_optime(mut self, optime: DateTime<Utc>) -> Self {
        self.optime = Some(optime);
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn is_primary(&self) -> bool {
        self.state == "PRIMARY"
    }
}

/// Master the server replicates from (legacy master/slave replication).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationSource {
    pub host: String,
    /// Last master operation applied locally.
    pub synced_to: Option<DateTime<Utc>>,
}

/// Query plan summary returned by `explain`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExplainReport {
    pub cursor: String,
    /// Index bounds, one entry per bounded field.
    pub index_bounds: Vec<String>,
    pub index_only: bool,
    pub multi_key: bool,
    pub millis: u64,
    /// Documents returned.
    pub n: u64,
    pub chunk_skips: u64,
    pub yields: u64,
    pub scanned: u64,
    pub scanned_objects: u64,
    pub scan_and_order: Option<bool>,
    /// The explained query as canonical (sorted-key, indented) JSON.
    pub query: String,
}

impl fmt::Display for ExplainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cursor: {}", self.cursor)?;
        writeln!(f, "Indexes: {}", self.index_bounds.join(" "))?;
        writeln!(f, "IndexOnly: {}", self.index_only)?;
        writeln!(f, "MultiKey: {}", self.multi_key)?;
        writeln!(f, "Milliseconds: {}", self.millis)?;
        writeln!(f, "Documents: {}", self.n)?;
        writeln!(f, "ChunkSkips: {}", self.chunk_skips)?;
        writeln!(f, "Yields: {}", self.yields)?;
        writeln!(f, "Scanned: {}", self.scanned)?;
        writeln!(f, "ScannedObjects: {}", self.scanned_objects)?;
        if let Some(scan_and_order) = self.scan_and_order {
            writeln!(f, "ScanAndOrder: {}", scan_and_order)?;
        }
        write!(f, "Query: {}", self.query)
    }
}

/// Access to one monitored server.
///
/// Implementations are shared with the sampler's worker threads, so they must
/// be `Send + Sync`; each call is independent and may block up to the
/// adapter's own timeout.
pub trait ServerAdapter: Send + Sync {
    /// Reads the current status snapshot.
    fn status(&self) -> Result<ServerStatus, AdapterError>;

    /// Lists operations currently running on the server.
    fn list_in_progress(&self) -> Result<OperationListing, AdapterError>;

    /// Data-bearing replica set members (arbiters excluded). Empty when the
    /// server is not part of a replica set.
    fn replica_set_members(&self) -> Result<Vec<ReplicaMember>, AdapterError>;

    /// Replication source of a legacy slave, if any.
    fn replication_info(&self) -> Result<Option<ReplicationSource>, AdapterError>;

    /// Explains `query` against `namespace` (`database.collection`).
    fn explain(&self, namespace: &str, query: &Value) -> Result<ExplainReport, AdapterError>;

    /// Asks the server to kill operation `opid`. Best effort.
    fn kill(&self, opid: i64) -> Result<(), AdapterError>;
}
