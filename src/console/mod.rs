//! Interactive console: the sample/render/act loop and its terminal.
//!
//! Each tick samples the fleet, renders the servers and operations tables,
//! then waits out the interval. Only `e`, `k` and `q` end the wait early;
//! `e` and `k` prompt for a server and an operation id, resolved against the
//! operations shown on screen.

mod app;
mod input;
mod terminal;

pub use app::{Action, ConsoleLoop, ConsoleOptions, LoopState};
pub use input::{KeyAction, key_action};
pub use terminal::{CrosstermTerminal, RawModeGuard, SuspendGuard, Terminal};
