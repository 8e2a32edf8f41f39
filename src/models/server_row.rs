//! ServerRow struct and its Rankable impl.

use crate::collector::{AdapterError, ServerStatus};
use crate::fmt::{RateValue, format_pair};
use crate::rates::StatusDeltas;
use crate::table::{Rankable, SortKey};

/// Servers table headers.
pub const SERVER_HEADERS: [&str; 7] = [
    "Server",
    "QPS",
    "Clients",
    "Queue",
    "Flushes",
    "Connections",
    "Memory",
];

/// Metrics of one server for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerMetrics {
    /// Operations per second since the previous tick.
    pub qps: u64,
    pub clients: u64,
    pub queue: u64,
    /// Flushes since the previous tick.
    pub flushes: u64,
    pub connections_current: u64,
    pub connections_total: u64,
    pub resident_memory: u64,
    pub mapped_memory: u64,
}

/// Server summary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRow {
    pub name: String,
    /// `None` when the server could not be sampled this tick.
    pub metrics: Option<ServerMetrics>,
}

impl ServerRow {
    /// Builds a row from a fresh status and the deltas it produced.
    pub fn available(name: impl Into<String>, status: &ServerStatus, deltas: StatusDeltas) -> Self {
        Self {
            name: name.into(),
            metrics: Some(ServerMetrics {
                qps: deltas.operations_per_second(),
                clients: status.active_clients,
                queue: status.queued_clients,
                flushes: deltas.flushes,
                connections_current: status.connections_current,
                connections_total: status.connections_total(),
                resident_memory: status.resident_memory,
                mapped_memory: status.mapped_memory,
            }),
        }
    }

    /// Degraded row for a server that could not be sampled.
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.metrics.is_some()
    }
}

impl Rankable for ServerRow {
    fn cells(&self) -> Vec<String> {
        let Some(m) = &self.metrics else {
            let mut cells = vec![self.name.clone(), "unavailable".to_string()];
            cells.resize(SERVER_HEADERS.len(), "-".to_string());
            return cells;
        };
        vec![
            self.name.clone(),
            RateValue::new(m.qps).to_string(),
            RateValue::new(m.clients).to_string(),
            RateValue::new(m.queue).to_string(),
            RateValue::new(m.flushes).to_string(),
            format_pair(m.connections_current, m.connections_total),
            format_pair(m.resident_memory, m.mapped_memory),
        ]
    }

    fn sort_key(&self) -> SortKey {
        SortKey::String(self.name.clone())
    }
}

/// Notice shown under the tables for a degraded server.
pub fn describe_unavailable(name: &str, error: &AdapterError) -> String {
    format!("{}: {}", name, error)
}

/// Notice shown under the tables when a server reported operations that
/// cannot be addressed by opid.
pub fn describe_skipped(name: &str, skipped: usize) -> String {
    let noun = if skipped == 1 { "operation" } else { "operations" };
    format!(
        "{}: {} {} without a numeric opid not shown",
        name, skipped, noun
    )
}
