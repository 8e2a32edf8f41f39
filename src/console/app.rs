//! Console loop: sample, render, wait for a key, act.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use tracing::{debug, info, warn};

use super::input::{KeyAction, key_action};
use super::terminal::Terminal;
use crate::collector::{ReplicationSample, Sampler};
use crate::fleet::Fleet;
use crate::models::{
    DEFAULT_MAX_OPERATIONS, OPERATION_HEADERS, OperationRow, REPLICA_HEADERS, ReplicaRow,
    SERVER_HEADERS, ServerRow, describe_skipped, describe_unavailable, unique_members,
};
use crate::operations;
use crate::rates::RateState;
use crate::table::{RankedTable, SortDirection};

const KEY_HINT: &str = "[e]xplain [k]ill [q]uit";

/// Loop settings.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleOptions {
    /// Time between ticks.
    pub interval: Duration,
    pub max_operations: usize,
    pub hide_replication: bool,
    /// Sample replica set members and show them in a third table.
    pub replication: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_operations: DEFAULT_MAX_OPERATIONS,
            hide_replication: false,
            replication: false,
        }
    }
}

/// Operator request on a selected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Explain,
    Kill,
}

/// Console loop state.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Sample every server and redraw.
    Rendering,
    /// Wait for a key: until pressed when `blocking`, else for the rest of
    /// the interval, which only `e`, `k` or `q` cut short.
    AwaitingKey { blocking: bool },
    /// Ask which operation to act on.
    Prompting(Action),
    /// Look the answer up in the last operations generation.
    Resolving {
        action: Action,
        server: String,
        opid: String,
    },
    /// Dispatch the action to the owning server.
    Acting { action: Action, row: OperationRow },
    Quit,
}

/// Interactive dashboard over a fleet.
pub struct ConsoleLoop {
    fleet: Fleet,
    sampler: Sampler,
    rates: RateState,
    servers: RankedTable<ServerRow>,
    operations: RankedTable<OperationRow>,
    replicas: RankedTable<ReplicaRow>,
    notices: Vec<String>,
    options: ConsoleOptions,
    state: LoopState,
}

impl ConsoleLoop {
    pub fn new(fleet: Fleet, sampler: Sampler, options: ConsoleOptions) -> Self {
        Self {
            fleet,
            sampler: sampler
                .with_hide_replication(options.hide_replication)
                .with_replication(options.replication),
            rates: RateState::new(),
            servers: RankedTable::new(&SERVER_HEADERS),
            operations: RankedTable::new(&OPERATION_HEADERS)
                .with_direction(SortDirection::Descending)
                .with_max_rows(options.max_operations),
            replicas: RankedTable::new(&REPLICA_HEADERS),
            notices: Vec::new(),
            options,
            state: LoopState::Rendering,
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn servers_table(&self) -> &RankedTable<ServerRow> {
        &self.servers
    }

    pub fn operations_table(&self) -> &RankedTable<OperationRow> {
        &self.operations
    }

    pub fn replicas_table(&self) -> &RankedTable<ReplicaRow> {
        &self.replicas
    }

    /// Runs until the operator quits or the terminal fails.
    pub fn run(&mut self, terminal: &mut dyn Terminal) -> io::Result<()> {
        info!(
            servers = self.fleet.len(),
            interval_ms = self.options.interval.as_millis() as u64,
            "console started"
        );
        while self.state != LoopState::Quit {
            self.step(terminal)?;
        }
        info!("console stopped");
        Ok(())
    }

    /// Performs one state transition.
    pub fn step(&mut self, terminal: &mut dyn Terminal) -> io::Result<()> {
        let state = std::mem::replace(&mut self.state, LoopState::Quit);
        self.state = match state {
            LoopState::Rendering => {
                self.tick()?;
                self.render(terminal)?;
                LoopState::AwaitingKey { blocking: false }
            }
            LoopState::AwaitingKey { blocking: true } => {
                command_state(key_action(terminal.read_key()?))
            }
            LoopState::AwaitingKey { blocking: false } => self.wait_for_command(terminal)?,
            LoopState::Prompting(action) => match terminal.ask_operation()? {
                Some((server, opid)) => LoopState::Resolving {
                    action,
                    server,
                    opid,
                },
                None => LoopState::Rendering,
            },
            LoopState::Resolving {
                action,
                server,
                opid,
            } => match operations::select(&self.operations, &self.fleet, &server, &opid) {
                Ok(row) => LoopState::Acting {
                    action,
                    row: row.clone(),
                },
                Err(e) => {
                    debug!(server = %server, opid = %opid, "selection not found");
                    report(terminal, &e.to_string())?;
                    LoopState::AwaitingKey { blocking: true }
                }
            },
            LoopState::Acting { action, row } => {
                let message = match action {
                    Action::Explain => match operations::explain(&self.fleet, &row) {
                        Ok(report) => report.to_string(),
                        Err(e) => e.to_string(),
                    },
                    Action::Kill => match operations::kill(&self.fleet, &row) {
                        Ok(()) => format!(
                            "Kill sent for operation {} on {}.",
                            row.opid(),
                            row.server()
                        ),
                        Err(e) => e.to_string(),
                    },
                };
                report(terminal, &message)?;
                LoopState::AwaitingKey { blocking: true }
            }
            LoopState::Quit => LoopState::Quit,
        };
        Ok(())
    }

    /// Waits out the rest of the interval. Unbound keys are ignored.
    fn wait_for_command(&self, terminal: &mut dyn Terminal) -> io::Result<LoopState> {
        let deadline = Instant::now() + self.options.interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(LoopState::Rendering);
            }
            let Some(key) = terminal.wait_key(remaining)? else {
                return Ok(LoopState::Rendering);
            };
            match key_action(key) {
                KeyAction::None => debug!(code = ?key.code, "ignoring unbound key"),
                action => return Ok(command_state(action)),
            }
        }
    }

    /// Samples the fleet and installs a new generation in every table.
    fn tick(&mut self) -> io::Result<()> {
        let samples = self.sampler.sample(self.fleet.servers());
        let sampled_at = Instant::now();
        let mut server_rows = Vec::with_capacity(samples.len());
        let mut operation_rows = Vec::new();
        let mut replica_rows = Vec::new();
        self.notices.clear();

        for (server, sample) in self.fleet.servers().iter().zip(samples) {
            match &sample.status {
                Ok(status) => {
                    let deltas = self.rates.update(server.name(), status, sampled_at);
                    server_rows.push(ServerRow::available(server.name(), status, deltas));
                }
                Err(e) => {
                    warn!(server = server.name(), error = %e, "server unavailable");
                    self.notices.push(describe_unavailable(server.name(), e));
                    server_rows.push(ServerRow::unavailable(server.name()));
                }
            }
            match sample.operations {
                Ok(rows) => operation_rows.extend(rows),
                Err(e) => warn!(server = server.name(), error = %e, "failed to list operations"),
            }
            if sample.skipped > 0 {
                self.notices.push(describe_skipped(server.name(), sample.skipped));
            }
            match sample.replication {
                Some(Ok(replication)) => {
                    replica_rows.extend(replica_rows_of(server.name(), &replication));
                }
                Some(Err(e)) => {
                    warn!(server = server.name(), error = %e, "failed to read replication state");
                }
                None => {}
            }
        }

        self.servers.refresh(server_rows).map_err(io::Error::other)?;
        self.operations
            .refresh(operation_rows)
            .map_err(io::Error::other)?;
        self.replicas
            .refresh(unique_members(replica_rows))
            .map_err(io::Error::other)?;
        Ok(())
    }

    fn render(&mut self, terminal: &mut dyn Terminal) -> io::Result<()> {
        terminal.clear()?;
        let out = terminal.writer();
        write!(
            out,
            "motop {} - {} - {} servers\r\n",
            env!("CARGO_PKG_VERSION"),
            Local::now().format("%H:%M:%S"),
            self.fleet.len()
        )?;
        self.servers.print(out)?;
        write!(out, "\r\n")?;
        self.operations.print(out)?;
        if self.options.replication && !self.replicas.is_empty() {
            write!(out, "\r\n")?;
            self.replicas.print(out)?;
        }
        for notice in &self.notices {
            write!(out, "! {}\r\n", notice)?;
        }
        write!(out, "\r\n{}\r\n", KEY_HINT)?;
        out.flush()
    }
}

/// State entered on a key press.
fn command_state(action: KeyAction) -> LoopState {
    match action {
        KeyAction::Quit => LoopState::Quit,
        KeyAction::Explain => LoopState::Prompting(Action::Explain),
        KeyAction::Kill => LoopState::Prompting(Action::Kill),
        KeyAction::None => LoopState::Rendering,
    }
}

fn replica_rows_of(server: &str, replication: &ReplicationSample) -> Vec<ReplicaRow> {
    let mut rows = ReplicaRow::from_members(server, &replication.members);
    if let Some(source) = &replication.source {
        rows.push(ReplicaRow::from_source(server, source, Utc::now()));
    }
    rows
}

/// Prints a possibly multi-line message below the screen.
fn report(terminal: &mut dyn Terminal, message: &str) -> io::Result<()> {
    let out = terminal.writer();
    for line in message.lines() {
        write!(out, "{}\r\n", line)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{AdapterError, ExplainReport, InProgressOp, MockServer, ReplicaMember};
    use crate::fleet::Server;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays keys and prompt answers; `None` keys are wait timeouts.
    #[derive(Default)]
    struct ScriptedTerminal {
        keys: VecDeque<Option<char>>,
        answers: VecDeque<Option<(String, String)>>,
        output: Vec<u8>,
        clears: usize,
        /// Timeouts passed to `wait_key`.
        waits: Vec<Duration>,
    }

    impl ScriptedTerminal {
        fn new(keys: &[Option<char>]) -> Self {
            Self {
                keys: keys.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn answer(mut self, server: &str, opid: &str) -> Self {
            self.answers
                .push_back(Some((server.to_string(), opid.to_string())));
            self
        }

        fn abort(mut self) -> Self {
            self.answers.push_back(None);
            self
        }

        fn text(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }

        // An exhausted script quits, so a broken test cannot spin forever.
        fn next_key(&mut self) -> Option<KeyEvent> {
            let c = self.keys.pop_front().unwrap_or(Some('q'))?;
            Some(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
        }
    }

    impl Terminal for ScriptedTerminal {
        fn clear(&mut self) -> io::Result<()> {
            self.clears += 1;
            Ok(())
        }

        fn writer(&mut self) -> &mut dyn Write {
            &mut self.output
        }

        fn wait_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>> {
            self.waits.push(timeout);
            Ok(self.next_key())
        }

        fn read_key(&mut self) -> io::Result<KeyEvent> {
            Ok(self
                .next_key()
                .unwrap_or_else(|| KeyEvent::new(KeyCode::Null, KeyModifiers::NONE)))
        }

        fn ask_operation(&mut self) -> io::Result<Option<(String, String)>> {
            Ok(self.answers.pop_front().flatten())
        }
    }

    fn console(servers: Vec<(&str, Arc<MockServer>)>) -> ConsoleLoop {
        console_with(servers, ConsoleOptions::default())
    }

    fn console_with(servers: Vec<(&str, Arc<MockServer>)>, options: ConsoleOptions) -> ConsoleLoop {
        let fleet = Fleet::new(
            servers
                .into_iter()
                .enumerate()
                .map(|(i, (name, mock))| {
                    Server::new(name, format!("10.0.0.{}", i + 1), mock)
                })
                .collect(),
        );
        ConsoleLoop::new(fleet, Sampler::new(2, Duration::from_secs(2)), options)
    }

    fn long_query() -> InProgressOp {
        InProgressOp::new(4242, "query")
            .with_namespace("shop.orders")
            .with_query(json!({"status": "new"}))
            .with_secs_running(120)
    }

    #[test]
    fn test_one_tick_renders_both_tables() {
        let db1 = Arc::new(MockServer::new().with_operations(vec![long_query()]));
        let db2 = Arc::new(MockServer::new());
        let mut console = console(vec![("db1", db1), ("db2", db2)]);
        let mut terminal = ScriptedTerminal::new(&[]);

        console.step(&mut terminal).unwrap();

        assert_eq!(console.state(), &LoopState::AwaitingKey { blocking: false });
        assert_eq!(console.servers_table().len(), 2);
        assert_eq!(console.operations_table().len(), 1);
        assert_eq!(console.operations_table().rows()[0].opid(), 4242);

        let text = terminal.text();
        assert!(text.starts_with("motop "));
        assert!(text.contains("Server  QPS"));
        assert!(text.contains("shop.orders"));
        assert!(text.contains("120"));
        assert!(text.contains(KEY_HINT));
        assert_eq!(terminal.clears, 1);
    }

    #[test]
    fn test_quit() {
        let db1 = Arc::new(MockServer::new());
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[Some('q')]);

        console.run(&mut terminal).unwrap();

        assert_eq!(console.state(), &LoopState::Quit);
        assert_eq!(db1.status_calls(), 1);
    }

    #[test]
    fn test_timeout_starts_next_tick() {
        let db1 = Arc::new(MockServer::new());
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[None, None, Some('q')]);

        console.run(&mut terminal).unwrap();

        assert_eq!(db1.status_calls(), 3);
        assert_eq!(terminal.clears, 3);
    }

    #[test]
    fn test_unbound_key_keeps_waiting() {
        let db1 = Arc::new(MockServer::new());
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[Some('x'), Some('x'), Some('q')]);

        console.run(&mut terminal).unwrap();

        assert_eq!(db1.status_calls(), 1);
        assert_eq!(terminal.clears, 1);
        assert_eq!(terminal.waits.len(), 3);
        assert!(terminal.waits.windows(2).all(|w| w[1] <= w[0]));
        assert!(terminal.waits[0] <= ConsoleOptions::default().interval);
    }

    #[test]
    fn test_timeout_after_unbound_key_starts_next_tick() {
        let db1 = Arc::new(MockServer::new());
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[Some('x'), None, Some('q')]);

        console.run(&mut terminal).unwrap();

        assert_eq!(db1.status_calls(), 2);
    }

    #[test]
    fn test_unavailable_server_is_isolated() {
        let db1 = Arc::new(
            MockServer::new()
                .failing_status(AdapterError::Timeout)
                .failing_operations(AdapterError::Timeout),
        );
        let db2 = Arc::new(MockServer::new().with_operations(vec![long_query()]));
        let mut console = console(vec![("db1", db1), ("db2", db2)]);
        let mut terminal = ScriptedTerminal::new(&[]);

        console.step(&mut terminal).unwrap();

        let servers = console.servers_table().rows();
        assert!(!servers[0].is_available());
        assert!(servers[1].is_available());
        assert_eq!(console.operations_table().len(), 1);
        assert_eq!(console.operations_table().rows()[0].server(), "db2");
        assert!(terminal.text().contains("! db1: timed out"));
    }

    #[test]
    fn test_explain_prints_report() {
        let report = ExplainReport {
            cursor: "BtreeCursor status_1".to_string(),
            ..ExplainReport::default()
        };
        let db1 = Arc::new(
            MockServer::new()
                .with_operations(vec![long_query()])
                .with_explain(report),
        );
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[Some('e'), Some('q')]).answer("db1", "4242");

        console.run(&mut terminal).unwrap();

        assert_eq!(db1.explained().len(), 1);
        let text = terminal.text();
        assert!(text.contains("Cursor: BtreeCursor status_1\r\n"));
        assert!(text.contains("Query: {\r\n"));
        assert_eq!(db1.status_calls(), 1);
    }

    #[test]
    fn test_explain_without_namespace() {
        let db1 =
            Arc::new(MockServer::new().with_operations(vec![InProgressOp::new(5, "query")]));
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[Some('e'), Some('q')]).answer("db1", "5");

        console.run(&mut terminal).unwrap();

        assert!(
            terminal
                .text()
                .contains("Only queries with namespace can be explained.\r\n")
        );
        assert!(db1.explained().is_empty());
    }

    #[test]
    fn test_kill_dispatches_once_without_resampling() {
        let db1 = Arc::new(MockServer::new().with_operations(vec![
            long_query(),
            InProgressOp::new(31, "update").with_namespace("shop.orders"),
        ]));
        let db2 =
            Arc::new(MockServer::new().with_operations(vec![InProgressOp::new(31, "update")]));
        let mut console = console(vec![("db1", Arc::clone(&db1)), ("db2", Arc::clone(&db2))]);
        let mut terminal = ScriptedTerminal::new(&[Some('k'), Some('q')]).answer("db1", "31");

        console.run(&mut terminal).unwrap();

        assert_eq!(db1.killed(), vec![31]);
        assert!(db2.killed().is_empty());
        assert_eq!(db1.status_calls(), 1);
    }

    #[test]
    fn test_kill_by_address() {
        let db1 = Arc::new(MockServer::new().with_operations(vec![long_query()]));
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal =
            ScriptedTerminal::new(&[Some('k'), Some('q')]).answer("10.0.0.1:27017", "4242");

        console.run(&mut terminal).unwrap();

        assert_eq!(db1.killed(), vec![4242]);
    }

    #[test]
    fn test_invalid_operation() {
        let db1 = Arc::new(MockServer::new().with_operations(vec![long_query()]));
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[Some('k'), Some('q')]).answer("db1", "999");

        console.run(&mut terminal).unwrap();

        assert!(terminal.text().contains("Invalid operation.\r\n"));
        assert!(db1.killed().is_empty());
    }

    #[test]
    fn test_aborted_prompt_resamples() {
        let db1 = Arc::new(MockServer::new().with_operations(vec![long_query()]));
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal = ScriptedTerminal::new(&[Some('k'), Some('q')]).abort();

        console.run(&mut terminal).unwrap();

        assert!(db1.killed().is_empty());
        assert_eq!(db1.status_calls(), 2);
        assert!(!terminal.text().contains("Invalid operation."));
    }

    #[test]
    fn test_unknown_key_after_action_resamples() {
        let db1 = Arc::new(MockServer::new());
        let mut console = console(vec![("db1", Arc::clone(&db1))]);
        let mut terminal =
            ScriptedTerminal::new(&[Some('e'), Some('x'), Some('q')]).answer("db1", "1");

        console.run(&mut terminal).unwrap();

        assert!(terminal.text().contains("Invalid operation."));
        assert_eq!(db1.status_calls(), 2);
    }

    #[test]
    fn test_qps_is_measured_over_elapsed_time() {
        let db1 = Arc::new(MockServer::new().with_opcounter_growth("query", 1500));
        let mut console = console(vec![("db1", db1)]);
        let mut terminal = ScriptedTerminal::new(&[None]);
        let qps = |console: &ConsoleLoop| console.servers_table().rows()[0].metrics.map(|m| m.qps);

        console.step(&mut terminal).unwrap();
        assert_eq!(qps(&console), Some(1500));

        // The operator lingers well past the interval before the next tick.
        std::thread::sleep(Duration::from_millis(1_500));
        console.step(&mut terminal).unwrap();
        console.step(&mut terminal).unwrap();

        let qps = qps(&console).unwrap();
        assert!(qps > 0 && qps <= 1000, "qps = {}", qps);
    }

    #[test]
    fn test_router_opids_produce_notice() {
        let router = Arc::new(
            MockServer::new()
                .with_operations(vec![long_query()])
                .with_unaddressable_operations(2),
        );
        let mut console = console(vec![("router", router)]);
        let mut terminal = ScriptedTerminal::new(&[]);

        console.step(&mut terminal).unwrap();

        assert_eq!(console.operations_table().len(), 1);
        assert!(
            terminal
                .text()
                .contains("! router: 2 operations without a numeric opid not shown\r\n")
        );
    }

    #[test]
    fn test_replica_table() {
        let members = vec![
            ReplicaMember::new("rs0", "10.0.0.1:27017", "PRIMARY"),
            ReplicaMember::new("rs0", "10.0.0.2:27017", "SECONDARY"),
        ];
        let db1 = Arc::new(MockServer::new().with_replica_members(members.clone()));
        let db2 = Arc::new(MockServer::new().with_replica_members(members));
        let options = ConsoleOptions {
            replication: true,
            ..ConsoleOptions::default()
        };
        let mut console = console_with(vec![("db1", db1), ("db2", db2)], options);
        let mut terminal = ScriptedTerminal::new(&[]);

        console.step(&mut terminal).unwrap();

        let replicas = console.replicas_table();
        assert_eq!(replicas.len(), 2);
        assert!(replicas.rows().iter().all(|r| r.server == "db1"));
        let text = terminal.text();
        assert!(text.contains("Server  Set"));
        assert!(text.contains("10.0.0.2:27017"));
    }

    #[test]
    fn test_replica_table_hidden_by_default() {
        let members = vec![ReplicaMember::new("rs0", "10.0.0.1:27017", "PRIMARY")];
        let db1 = Arc::new(MockServer::new().with_replica_members(members));
        let mut console = console(vec![("db1", db1)]);
        let mut terminal = ScriptedTerminal::new(&[]);

        console.step(&mut terminal).unwrap();

        assert!(console.replicas_table().is_empty());
        assert!(!terminal.text().contains("Member"));
    }
}
