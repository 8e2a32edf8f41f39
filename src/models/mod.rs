//! Table rows: server summaries, in-flight operations and replica set
//! members.

mod operation_row;
mod replica_row;
mod server_row;

pub use operation_row::*;
pub use replica_row::*;
pub use server_row::*;

/// Longest query text shown in the operations table.
pub const QUERY_DISPLAY_WIDTH: usize = 80;

/// Default row limit of the operations table.
pub const DEFAULT_MAX_OPERATIONS: usize = 30;
