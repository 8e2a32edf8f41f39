//! In-memory mock server for testing the dashboard without a database.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::collector::traits::{
    AdapterError, ExplainReport, InProgressOp, OperationListing, ReplicaMember, ReplicationSource,
    ServerAdapter, ServerStatus,
};

#[derive(Debug, Default)]
struct MockState {
    status: Option<ServerStatus>,
    status_error: Option<AdapterError>,
    operations: Vec<InProgressOp>,
    operations_error: Option<AdapterError>,
    /// Reported as entries without a numeric opid.
    unaddressable_operations: usize,
    replica_members: Vec<ReplicaMember>,
    replication_source: Option<ReplicationSource>,
    explain: Option<ExplainReport>,
    delay: Duration,
    /// Added to the named opcounter on every status call.
    opcounter_growth: BTreeMap<String, u64>,
    flush_growth: u64,
    /// Advance `secs_running` of running operations on every listing.
    age_operations: bool,
    killed: Vec<i64>,
    explained: Vec<(String, Value)>,
    status_calls: usize,
}

/// Scripted server.
///
/// Answers with whatever it was configured with, records `kill` and
/// `explain` calls, and can simulate failures, slowness and counter growth.
#[derive(Debug, Default)]
pub struct MockServer {
    state: Mutex<MockState>,
}

impl MockServer {
    /// Creates a server with an empty status and no operations.
    pub fn new() -> Self {
        Self::default().with_status(ServerStatus::default())
    }

    pub fn with_status(self, status: ServerStatus) -> Self {
        self.lock().status = Some(status);
        self
    }

    pub fn with_operations(self, operations: Vec<InProgressOp>) -> Self {
        self.lock().operations = operations;
        self
    }

    /// Adds `count` operations a router would report as `shard:opid`.
    pub fn with_unaddressable_operations(self, count: usize) -> Self {
        self.lock().unaddressable_operations = count;
        self
    }

    pub fn with_replica_members(self, members: Vec<ReplicaMember>) -> Self {
        self.lock().replica_members = members;
        self
    }

    pub fn with_replication_source(self, source: ReplicationSource) -> Self {
        self.lock().replication_source = Some(source);
        self
    }

    pub fn with_explain(self, report: ExplainReport) -> Self {
        self.lock().explain = Some(report);
        self
    }

    /// Makes every call sleep for `delay` first.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = delay;
        self
    }

    pub fn with_opcounter_growth(self, kind: &str, per_call: u64) -> Self {
        self.lock().opcounter_growth.insert(kind.to_string(), per_call);
        self
    }

    pub fn with_flush_growth(self, per_call: u64) -> Self {
        self.lock().flush_growth = per_call;
        self
    }

    pub fn with_aging_operations(self) -> Self {
        self.lock().age_operations = true;
        self
    }

    pub fn failing_status(self, error: AdapterError) -> Self {
        self.lock().status_error = Some(error);
        self
    }

    pub fn failing_operations(self, error: AdapterError) -> Self {
        self.lock().operations_error = Some(error);
        self
    }

    /// Operation ids passed to `kill`, in call order.
    pub fn killed(&self) -> Vec<i64> {
        self.lock().killed.clone()
    }

    /// `(namespace, query)` pairs passed to `explain`, in call order.
    pub fn explained(&self) -> Vec<(String, Value)> {
        self.lock().explained.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pause(&self) {
        let delay = self.lock().delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl ServerAdapter for MockServer {
    fn status(&self) -> Result<ServerStatus, AdapterError> {
        self.pause();
        let mut state = self.lock();
        state.status_calls += 1;
        if let Some(err) = &state.status_error {
            return Err(err.clone());
        }

        let growth = state.opcounter_growth.clone();
        let flush_growth = state.flush_growth;
        let Some(status) = state.status.as_mut() else {
            return Err(AdapterError::MalformedSnapshot("no status".to_string()));
        };
        for (kind, step) in growth {
            *status.opcounters.entry(kind).or_insert(0) += step;
        }
        status.flush_count += flush_growth;
        Ok(status.clone())
    }

    fn list_in_progress(&self) -> Result<OperationListing, AdapterError> {
        self.pause();
        let mut state = self.lock();
        if let Some(err) = &state.operations_error {
            return Err(err.clone());
        }
        if state.age_operations {
            for op in state.operations.iter_mut() {
                if let Some(secs) = op.secs_running.as_mut() {
                    *secs += 1;
                }
            }
        }
        Ok(OperationListing::new(state.operations.clone())
            .with_skipped(state.unaddressable_operations))
    }

    fn replica_set_members(&self) -> Result<Vec<ReplicaMember>, AdapterError> {
        self.pause();
        Ok(self.lock().replica_members.clone())
    }

    fn replication_info(&self) -> Result<Option<ReplicationSource>, AdapterError> {
        self.pause();
        Ok(self.lock().replication_source.clone())
    }

    fn explain(&self, namespace: &str, query: &Value) -> Result<ExplainReport, AdapterError> {
        self.pause();
        let mut state = self.lock();
        state.explained.push((namespace.to_string(), query.clone()));
        let mut report = state.explain.clone().unwrap_or_else(|| ExplainReport {
            cursor: "BasicCursor".to_string(),
            ..ExplainReport::default()
        });
        report.query = serde_json::to_string_pretty(query).unwrap_or_default();
        Ok(report)
    }

    fn kill(&self, opid: i64) -> Result<(), AdapterError> {
        self.pause();
        let mut state = self.lock();
        state.killed.push(opid);
        state.operations.retain(|op| op.opid != opid);
        Ok(())
    }
}
