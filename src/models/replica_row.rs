//! Replica set member rows.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::collector::{ReplicaMember, ReplicationSource};
use crate::table::{Rankable, SortKey};

/// Replication table headers.
pub const REPLICA_HEADERS: [&str; 5] = ["Server", "Set", "Member", "State", "Lag"];

/// State shown for the master of a legacy slave.
const SOURCE_STATE: &str = "SOURCE";

/// One replica set member, or the master of a legacy slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaRow {
    /// Server that reported the member.
    pub server: String,
    pub set: String,
    pub member: String,
    pub state: String,
    /// Seconds behind the primary (or behind the master for a source).
    pub lag: Option<u64>,
}

impl ReplicaRow {
    /// Rows for the members `server` sees.
    ///
    /// Lag is measured against the primary's optime. Without a primary it
    /// falls back to the reporting server's clock.
    pub fn from_members(server: &str, members: &[ReplicaMember]) -> Vec<Self> {
        let primary = members
            .iter()
            .find(|m| m.is_primary())
            .and_then(|m| m.optime);
        members
            .iter()
            .map(|m| Self {
                server: server.to_string(),
                set: m.set.clone(),
                member: m.name.clone(),
                state: m.state.clone(),
                lag: lag_secs(primary.or(m.date), m.optime),
            })
            .collect()
    }

    /// Row for the master a legacy slave replicates from, lag taken at `now`.
    pub fn from_source(server: &str, source: &ReplicationSource, now: DateTime<Utc>) -> Self {
        Self {
            server: server.to_string(),
            set: "-".to_string(),
            member: source.host.clone(),
            state: SOURCE_STATE.to_string(),
            lag: lag_secs(Some(now), source.synced_to),
        }
    }
}

fn lag_secs(reference: Option<DateTime<Utc>>, optime: Option<DateTime<Utc>>) -> Option<u64> {
    let behind = reference? - optime?;
    Some(behind.num_seconds().max(0) as u64)
}

/// Keeps the first row of every `(set, member)` pair. Every member of a set
/// reports the whole set, so the same member shows up once per server.
pub fn unique_members(rows: impl IntoIterator<Item = ReplicaRow>) -> Vec<ReplicaRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert((row.set.clone(), row.member.clone())))
        .collect()
}

impl Rankable for ReplicaRow {
    fn cells(&self) -> Vec<String> {
        vec![
            self.server.clone(),
            self.set.clone(),
            self.member.clone(),
            self.state.clone(),
            self.lag.map_or_else(|| "-".to_string(), |lag| lag.to_string()),
        ]
    }

    fn sort_key(&self) -> SortKey {
        SortKey::String(format!("{}\u{0}{}", self.set, self.member))
    }
}
