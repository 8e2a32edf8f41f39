//! Validation of shell output into typed records.
//!
//! The shell prints loosely-typed JSON. Everything is checked here once, so
//! the rest of the dashboard only sees typed records.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::collector::traits::{
    AdapterError, ExplainReport, InProgressOp, OpKind, OperationListing, ReplicaMember,
    ReplicationSource, ServerStatus,
};

/// Parses the last JSON line of `output`.
pub(super) fn parse_output(output: &str) -> Result<Value, AdapterError> {
    let line = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| AdapterError::MalformedSnapshot("empty output".to_string()))?;
    serde_json::from_str(line)
        .map_err(|e| AdapterError::MalformedSnapshot(format!("invalid JSON: {}", e)))
}

/// Walks `path` inside `value`.
fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// Reads a non-negative integer, accepting plain numbers, doubles and
/// `{"$numberLong": "..."}`.
fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return (f >= 0.0).then_some(f as u64);
    }
    value
        .get("$numberLong")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn as_signed(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return Some(f as i64);
    }
    value
        .get("$numberLong")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// Reads a point in time from relaxed Extended JSON: `{"$date": "<iso>"}`,
/// `{"$date": {"$numberLong": "<ms>"}}` or `{"$timestamp": {"t": <secs>}}`.
fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(date) = value.get("$date") {
        if let Some(text) = date.as_str() {
            return DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|d| d.with_timezone(&Utc));
        }
        return as_signed(date).and_then(DateTime::from_timestamp_millis);
    }
    lookup(value, &["$timestamp", "t"])
        .and_then(as_signed)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn required(value: &Value, path: &[&str]) -> Result<u64, AdapterError> {
    lookup(value, path)
        .and_then(as_count)
        .ok_or_else(|| AdapterError::MalformedSnapshot(format!("missing {}", path.join("."))))
}

fn optional(value: &Value, path: &[&str]) -> u64 {
    lookup(value, path).and_then(as_count).unwrap_or(0)
}

/// Builds a [`ServerStatus`] from `serverStatus` output.
///
/// `mem.mapped` and `backgroundFlushing` do not exist on every storage
/// engine and default to zero.
pub(super) fn parse_status(value: &Value) -> Result<ServerStatus, AdapterError> {
    let opcounters = lookup(value, &["opcounters"])
        .and_then(Value::as_object)
        .ok_or_else(|| AdapterError::MalformedSnapshot("missing opcounters".to_string()))?
        .iter()
        .filter_map(|(kind, count)| as_count(count).map(|c| (kind.clone(), c)))
        .collect();

    Ok(ServerStatus {
        connections_current: required(value, &["connections", "current"])?,
        connections_available: required(value, &["connections", "available"])?,
        resident_memory: required(value, &["mem", "resident"])?,
        mapped_memory: optional(value, &["mem", "mapped"]),
        active_clients: required(value, &["globalLock", "activeClients", "total"])?,
        queued_clients: required(value, &["globalLock", "currentQueue", "total"])?,
        flush_count: optional(value, &["backgroundFlushing", "flushes"]),
        opcounters,
    })
}

/// Builds the operation list from `currentOp` output.
///
/// Entries without a numeric `opid` (routers report `shard:opid`) are
/// counted in [`OperationListing::skipped`]. Entries without an `op` kind
/// are dropped.
pub(super) fn parse_current_op(value: &Value) -> Result<OperationListing, AdapterError> {
    let entries = value
        .as_array()
        .ok_or_else(|| AdapterError::MalformedSnapshot("inprog is not a list".to_string()))?;

    let mut ops = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        let Some(opid) = entry.get("opid").and_then(as_signed) else {
            debug!(entry = %entry, "skipping operation without numeric opid");
            skipped += 1;
            continue;
        };
        let Some(kind) = entry.get("op").and_then(Value::as_str) else {
            warn!(entry = %entry, "skipping operation without op");
            continue;
        };

        ops.push(InProgressOp {
            opid,
            kind: OpKind::parse(kind),
            namespace: entry.get("ns").and_then(Value::as_str).map(str::to_string),
            query: entry.get("query").filter(|q| !q.is_null()).cloned(),
            secs_running: entry.get("secs_running").and_then(as_count),
        });
    }
    Ok(OperationListing::new(ops).with_skipped(skipped))
}

/// Builds the member list from `replSetGetStatus` output.
///
/// A rejected command means the server is not in a replica set and yields
/// no members. Arbiters hold no data and are left out.
pub(super) fn parse_replica_members(value: &Value) -> Result<Vec<ReplicaMember>, AdapterError> {
    if parse_ok(value).is_err() {
        debug!(reply = %value, "no replica set status");
        return Ok(Vec::new());
    }
    let set = value
        .get("set")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::MalformedSnapshot("missing set".to_string()))?;
    let date = value.get("date").and_then(as_datetime);
    let members = value
        .get("members")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterError::MalformedSnapshot("missing members".to_string()))?;

    let mut result = Vec::with_capacity(members.len());
    for member in members {
        let name = member.get("name").and_then(Value::as_str);
        let state = member.get("stateStr").and_then(Value::as_str);
        let (Some(name), Some(state)) = (name, state) else {
            warn!(member = %member, "skipping member without name/stateStr");
            continue;
        };
        if state == "ARBITER" {
            continue;
        }
        result.push(ReplicaMember {
            set: set.to_string(),
            name: name.to_string(),
            state: state.to_string(),
            optime: member.get("optimeDate").and_then(as_datetime),
            date,
        });
    }
    Ok(result)
}

/// Builds the replication source from the first `local.sources` document.
pub(super) fn parse_replication_source(
    value: &Value,
) -> Result<Option<ReplicationSource>, AdapterError> {
    let Some(source) = value.get("source").filter(|s| !s.is_null()) else {
        return Ok(None);
    };
    let host = source
        .get("host")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::MalformedSnapshot("missing source host".to_string()))?;
    Ok(Some(ReplicationSource {
        host: host.to_string(),
        synced_to: source.get("syncedTo").and_then(as_datetime),
    }))
}

/// Builds an [`ExplainReport`] from explain output.
///
/// Understands both the legacy flat format (`cursor`, `nscanned`, ...) and
/// the `executionStats` format of newer servers.
pub(super) fn parse_explain(value: &Value, query: &Value) -> Result<ExplainReport, AdapterError> {
    let query = serde_json::to_string_pretty(query).unwrap_or_default();

    if let Some(cursor) = value.get("cursor").and_then(Value::as_str) {
        return Ok(ExplainReport {
            cursor: cursor.to_string(),
            index_bounds: object_keys(value.get("indexBounds")),
            index_only: flag(value, &["indexOnly"]),
            multi_key: flag(value, &["isMultiKey"]),
            millis: optional(value, &["millis"]),
            n: optional(value, &["n"]),
            chunk_skips: optional(value, &["nChunkSkips"]),
            yields: optional(value, &["nYields"]),
            scanned: optional(value, &["nscanned"]),
            scanned_objects: optional(value, &["nscannedObjects"]),
            scan_and_order: value.get("scanAndOrder").and_then(Value::as_bool),
            query,
        });
    }

    let stats = value
        .get("executionStats")
        .ok_or_else(|| AdapterError::MalformedSnapshot("missing executionStats".to_string()))?;
    let plan = lookup(value, &["queryPlanner", "winningPlan"])
        .ok_or_else(|| AdapterError::MalformedSnapshot("missing winningPlan".to_string()))?;
    let stages = plan_stages(plan);
    let ixscan = stages
        .iter()
        .find(|s| s.get("stage").and_then(Value::as_str) == Some("IXSCAN"));

    Ok(ExplainReport {
        cursor: stages
            .iter()
            .filter_map(|s| s.get("stage").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" <- "),
        index_bounds: object_keys(ixscan.and_then(|s| s.get("indexBounds"))),
        index_only: ixscan.is_some() && !stages.iter().any(|s| stage_is(s, "FETCH")),
        multi_key: ixscan.is_some_and(|s| flag(s, &["isMultiKey"])),
        millis: optional(stats, &["executionTimeMillis"]),
        n: optional(stats, &["nReturned"]),
        chunk_skips: stages.iter().filter(|s| stage_is(s, "SHARDING_FILTER")).count() as u64,
        yields: optional(stats, &["executionStages", "saveState"]),
        scanned: optional(stats, &["totalKeysExamined"]),
        scanned_objects: optional(stats, &["totalDocsExamined"]),
        scan_and_order: Some(stages.iter().any(|s| stage_is(s, "SORT"))),
        query,
    })
}

/// Parses a command reply, failing unless it carries `ok: 1`.
pub(super) fn parse_ok(value: &Value) -> Result<(), AdapterError> {
    match value.get("ok").and_then(Value::as_f64) {
        Some(ok) if ok >= 1.0 => Ok(()),
        _ => Err(AdapterError::Command(
            value
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or("command not acknowledged")
                .to_string(),
        )),
    }
}

fn flag(value: &Value, path: &[&str]) -> bool {
    lookup(value, path).and_then(Value::as_bool).unwrap_or(false)
}

fn object_keys(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_object)
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

fn stage_is(stage: &Value, name: &str) -> bool {
    stage.get("stage").and_then(Value::as_str) == Some(name)
}

/// Flattens a winning plan along its `inputStage` chain, root first.
fn plan_stages(plan: &Value) -> Vec<&Value> {
    let mut stages = Vec::new();
    let mut current = Some(plan);
    while let Some(stage) = current {
        stages.push(stage);
        current = stage.get("inputStage");
    }
    stages
}
