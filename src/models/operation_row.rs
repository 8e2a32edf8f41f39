//! Operation rows: generic operations and queries.

use serde_json::Value;

use crate::collector::{InProgressOp, OpKind};
use crate::fmt::truncate_chars;
use crate::table::{Rankable, SortKey};

use super::QUERY_DISPLAY_WIDTH;

/// Operations table headers.
pub const OPERATION_HEADERS: [&str; 5] = ["Server", "OpId", "Namespace", "Sec", "Query"];

/// Any in-flight operation, identified by its server and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericOperation {
    pub server: String,
    pub opid: i64,
}

/// A running query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOperation {
    pub operation: GenericOperation,
    /// `database.collection`, possibly empty.
    pub namespace: String,
    pub body: Value,
    /// Seconds the query has been running, when the server reports it.
    pub duration: Option<u64>,
}

/// Row of the operations table.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRow {
    Generic(GenericOperation),
    Query(QueryOperation),
}

impl OperationRow {
    /// Classifies an operation reported by `server`.
    pub fn from_in_progress(server: &str, op: InProgressOp) -> Self {
        let operation = GenericOperation {
            server: server.to_string(),
            opid: op.opid,
        };
        match op.kind {
            OpKind::Query => OperationRow::Query(QueryOperation {
                operation,
                namespace: op.namespace.unwrap_or_default(),
                body: op.query.unwrap_or(Value::Null),
                duration: op.secs_running,
            }),
            OpKind::Other(_) => OperationRow::Generic(operation),
        }
    }

    fn operation(&self) -> &GenericOperation {
        match self {
            OperationRow::Generic(op) => op,
            OperationRow::Query(q) => &q.operation,
        }
    }

    pub fn server(&self) -> &str {
        &self.operation().server
    }

    pub fn opid(&self) -> i64 {
        self.operation().opid
    }

    pub fn is_query(&self) -> bool {
        matches!(self, OperationRow::Query(_))
    }

    /// Namespace and query body, if this row can be explained.
    pub fn explain_target(&self) -> Option<(&str, &Value)> {
        match self {
            OperationRow::Query(q) if !q.namespace.is_empty() => {
                Some((q.namespace.as_str(), &q.body))
            }
            _ => None,
        }
    }
}

impl Rankable for OperationRow {
    fn cells(&self) -> Vec<String> {
        let op = self.operation();
        let mut cells = vec![op.server.clone(), op.opid.to_string()];
        match self {
            OperationRow::Generic(_) => {
                cells.resize(OPERATION_HEADERS.len(), String::new());
            }
            OperationRow::Query(q) => {
                cells.push(q.namespace.clone());
                cells.push(
                    q.duration
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
                let body = match &q.body {
                    Value::Null => String::new(),
                    body => body.to_string(),
                };
                cells.push(truncate_chars(&body, QUERY_DISPLAY_WIDTH));
            }
        }
        cells
    }

    /// Queries rank by running time; other operations rank below every
    /// query, newest first.
    fn sort_key(&self) -> SortKey {
        match self {
            OperationRow::Generic(op) => SortKey::Integer(-op.opid),
            OperationRow::Query(q) => SortKey::Integer(q.duration.unwrap_or(0) as i64),
        }
    }
}
