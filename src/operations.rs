//! Operation registry: listing, filtering and acting on in-flight operations.

use std::fmt;

use tracing::{debug, info, warn};

use crate::collector::{AdapterError, ExplainReport, InProgressOp, OpKind, OperationListing};
use crate::fleet::{Fleet, Server};
use crate::models::OperationRow;
use crate::table::RankedTable;

/// Errors of the explain/kill actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No operation in the last generation matches the selection.
    SelectionNotFound,
    /// Only queries with a namespace can be explained.
    NotExplainable,
    /// The owning server failed the request.
    Adapter(AdapterError),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::SelectionNotFound => write!(f, "Invalid operation."),
            ActionError::NotExplainable => {
                write!(f, "Only queries with namespace can be explained.")
            }
            ActionError::Adapter(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ActionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActionError::Adapter(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AdapterError> for ActionError {
    fn from(e: AdapterError) -> Self {
        ActionError::Adapter(e)
    }
}

/// Returns `true` for replication traffic: oplog tailing, and the internal
/// operations a slave runs on `local.sources` or with an empty namespace.
///
/// An operation that reports no namespace at all is not replication.
pub fn is_replication(op: &InProgressOp) -> bool {
    let namespace = op.namespace.as_deref();
    if matches!(&op.kind, OpKind::Other(kind) if kind == "getmore")
        && namespace.is_some_and(|ns| ns.starts_with("local.oplog."))
    {
        return true;
    }
    matches!(namespace, Some("") | Some("local.sources"))
}

/// Operations of one server for one tick, classified lazily.
#[derive(Debug)]
pub struct ListedOperations {
    server: String,
    hide_replication: bool,
    inner: std::vec::IntoIter<InProgressOp>,
    skipped: usize,
}

impl ListedOperations {
    fn new(server: &str, listing: OperationListing, hide_replication: bool) -> Self {
        Self {
            server: server.to_string(),
            hide_replication,
            inner: listing.operations.into_iter(),
            skipped: listing.skipped,
        }
    }

    /// Operations the server reported without a numeric opid.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for ListedOperations {
    type Item = OperationRow;

    fn next(&mut self) -> Option<OperationRow> {
        let hide = self.hide_replication;
        let op = self.inner.by_ref().find(|op| !(hide && is_replication(op)))?;
        Some(OperationRow::from_in_progress(&self.server, op))
    }
}

/// Lists the operations currently running on `server`, optionally dropping
/// replication traffic. One remote call.
pub fn list_operations(
    server: &Server,
    hide_replication: bool,
) -> Result<ListedOperations, AdapterError> {
    let listing = server.adapter().list_in_progress()?;
    debug!(
        server = server.name(),
        count = listing.operations.len(),
        skipped = listing.skipped,
        "listed operations"
    );
    Ok(ListedOperations::new(server.name(), listing, hide_replication))
}

/// Finds the operation `opid` of the server named or addressed by `label`
/// in the table's last generation.
pub fn select<'a>(
    table: &'a RankedTable<OperationRow>,
    fleet: &Fleet,
    label: &str,
    opid: &str,
) -> Result<&'a OperationRow, ActionError> {
    let server = fleet.resolve(label).ok_or(ActionError::SelectionNotFound)?;
    table
        .find(&[server.name(), opid])
        .ok_or(ActionError::SelectionNotFound)
}

fn owner<'a>(fleet: &'a Fleet, row: &OperationRow) -> Result<&'a Server, ActionError> {
    fleet
        .get(row.server())
        .ok_or(ActionError::SelectionNotFound)
}

/// Asks the owning server to explain a query operation.
pub fn explain(fleet: &Fleet, row: &OperationRow) -> Result<ExplainReport, ActionError> {
    let (namespace, query) = row.explain_target().ok_or(ActionError::NotExplainable)?;
    let server = owner(fleet, row)?;
    info!(server = server.name(), opid = row.opid(), namespace, "explaining query");
    let report = server.adapter().explain(namespace, query)?;
    Ok(report)
}

/// Asks the owning server to kill the operation.
pub fn kill(fleet: &Fleet, row: &OperationRow) -> Result<(), ActionError> {
    let server = owner(fleet, row)?;
    info!(server = server.name(), opid = row.opid(), "killing operation");
    server.adapter().kill(row.opid()).map_err(|e| {
        warn!(server = server.name(), opid = row.opid(), error = %e, "kill failed");
        ActionError::Adapter(e)
    })
}
