//! Pre-built mock fleet for `--demo` mode and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde_json::json;

use super::server::MockServer;
use crate::collector::traits::{ExplainReport, InProgressOp, ReplicaMember, ServerStatus};
use crate::fleet::{Fleet, Server};

fn status(current: u64, available: u64, resident: u64, mapped: u64) -> ServerStatus {
    let opcounters: BTreeMap<String, u64> = [
        ("command", 0),
        ("delete", 0),
        ("getmore", 0),
        ("insert", 0),
        ("query", 0),
        ("update", 0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    ServerStatus {
        connections_current: current,
        connections_available: available,
        resident_memory: resident,
        mapped_memory: mapped,
        active_clients: 3,
        queued_clients: 0,
        flush_count: 0,
        opcounters,
    }
}

/// Three busy servers: a primary with long-running queries, a secondary
/// replicating from it, and an idle reporting node.
pub fn demo_fleet() -> Fleet {
    let now = Utc::now();
    let members = vec![
        ReplicaMember::new("rs0", "10.42.2.207:27017", "PRIMARY")
            .with_optime(now)
            .with_date(now),
        ReplicaMember::new("rs0", "10.42.2.121:27017", "SECONDARY")
            .with_optime(now - TimeDelta::seconds(3))
            .with_date(now),
    ];

    let primary = MockServer::new()
        .with_status(status(152, 19_848, 6_144, 81_920))
        .with_opcounter_growth("query", 1_840)
        .with_opcounter_growth("insert", 310)
        .with_opcounter_growth("update", 95)
        .with_flush_growth(1)
        .with_operations(vec![
            InProgressOp::new(9_812_331, "query")
                .with_namespace("shop.orders")
                .with_query(json!({"status": "pending", "created": {"$lt": 1_700_000_000}}))
                .with_secs_running(42),
            InProgressOp::new(9_812_407, "query")
                .with_namespace("shop.customers")
                .with_query(json!({"email": {"$regex": "^a"}}))
                .with_secs_running(7),
            InProgressOp::new(9_812_512, "insert").with_namespace("shop.events"),
        ])
        .with_aging_operations()
        .with_replica_members(members.clone())
        .with_explain(ExplainReport {
            cursor: "BtreeCursor status_1_created_1".to_string(),
            index_bounds: vec!["status".to_string(), "created".to_string()],
            index_only: false,
            multi_key: false,
            millis: 1_204,
            n: 18_220,
            chunk_skips: 0,
            yields: 31,
            scanned: 20_113,
            scanned_objects: 20_113,
            scan_and_order: Some(false),
            query: String::new(),
        });

    let secondary = MockServer::new()
        .with_status(status(48, 19_952, 5_980, 81_920))
        .with_opcounter_growth("getmore", 120)
        .with_opcounter_growth("query", 640)
        .with_flush_growth(1)
        .with_operations(vec![
            InProgressOp::new(77_104, "getmore").with_namespace("local.oplog.rs"),
            InProgressOp::new(77_190, "query")
                .with_namespace("shop.orders")
                .with_query(json!({"customer": 1_024}))
                .with_secs_running(2),
        ])
        .with_aging_operations()
        .with_replica_members(members);

    let reporting = MockServer::new()
        .with_status(status(4, 19_996, 1_210, 40_960))
        .with_opcounter_growth("command", 2);

    Fleet::new(vec![
        Server::new("primary", "10.42.2.207", Arc::new(primary)),
        Server::new("secondary", "10.42.2.121", Arc::new(secondary)),
        Server::new("reporting", "10.42.2.206", Arc::new(reporting)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_fleet() {
        let fleet = demo_fleet();
        assert_eq!(fleet.len(), 3);
        let primary = fleet.get("primary").unwrap();
        let listing = primary.adapter().list_in_progress().unwrap();
        assert_eq!(listing.operations.len(), 3);
        let status = primary.adapter().status().unwrap();
        assert_eq!(status.total_operations(), 1_840 + 310 + 95);

        let members = primary.adapter().replica_set_members().unwrap();
        assert_eq!(members.len(), 2);
        assert!(members[0].is_primary());
        let reporting = fleet.get("reporting").unwrap();
        assert!(reporting.adapter().replica_set_members().unwrap().is_empty());
    }
}
