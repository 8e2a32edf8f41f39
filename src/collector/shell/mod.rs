//! Server adapter backed by the `mongosh` executable.
//!
//! Each call spawns the shell with a short script (see `scripts`), waits for
//! it up to the configured timeout and validates the JSON it prints (see
//! `parse`). A shell that does not finish in time is killed and the call
//! reports [`AdapterError::Timeout`].

mod parse;
mod scripts;

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{
    AdapterError, ExplainReport, OperationListing, ReplicaMember, ReplicationSource, ServerAdapter,
    ServerStatus,
};

/// Shell executable used when none is configured.
pub const DEFAULT_SHELL: &str = "mongosh";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Interval between child exit checks.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Adapter that talks to one server through `mongosh`.
#[derive(Debug, Clone)]
pub struct MongoShellAdapter {
    address: String,
    username: Option<String>,
    password: Option<String>,
    shell: String,
    timeout: Duration,
}

impl MongoShellAdapter {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: None,
            password: None,
            shell: DEFAULT_SHELL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connection target passed to the shell (always the `admin` database).
    fn target(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("mongodb://") || address.starts_with("mongodb+srv://") {
            address.to_string()
        } else {
            format!("{}/admin", address)
        }
    }

    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("--quiet").arg("--norc").arg(self.target());
        if let Some(user) = &self.username {
            cmd.arg("--username").arg(user);
            cmd.arg("--authenticationDatabase").arg("admin");
        }
        if let Some(password) = &self.password {
            cmd.arg("--password").arg(password);
        }
        cmd.arg("--eval")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Runs `script` and returns the JSON value it printed.
    fn run(&self, script: &str) -> Result<Value, AdapterError> {
        let started = Instant::now();
        let mut child = self
            .command(script)
            .spawn()
            .map_err(|e| AdapterError::Unreachable(format!("{}: {}", self.shell, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, started + self.timeout)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        debug!(
            address = %self.address,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "shell call finished"
        );

        if !status.success() {
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("shell exited with an error")
                .trim()
                .to_string();
            return Err(if message.contains("MongoServerError") {
                AdapterError::Command(message)
            } else {
                AdapterError::Unreachable(message)
            });
        }
        parse::parse_output(&stdout)
    }
}

/// Reads a child pipe to the end on a helper thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

/// Waits for `child` to exit, killing it once `deadline` passes.
fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
) -> Result<std::process::ExitStatus, AdapterError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                if let Err(e) = child.kill() {
                    warn!(error = %e, "failed to kill timed out shell");
                }
                let _ = child.wait();
                return Err(AdapterError::Timeout);
            }
            Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
            Err(e) => return Err(AdapterError::Unreachable(e.to_string())),
        }
    }
}

impl ServerAdapter for MongoShellAdapter {
    fn status(&self) -> Result<ServerStatus, AdapterError> {
        let value = self.run(&scripts::build_status_script())?;
        parse::parse_status(&value)
    }

    fn list_in_progress(&self) -> Result<OperationListing, AdapterError> {
        let value = self.run(&scripts::build_current_op_script())?;
        parse::parse_current_op(&value)
    }

    fn replica_set_members(&self) -> Result<Vec<ReplicaMember>, AdapterError> {
        let value = self.run(&scripts::build_replica_status_script())?;
        parse::parse_replica_members(&value)
    }

    fn replication_info(&self) -> Result<Option<ReplicationSource>, AdapterError> {
        let value = self.run(&scripts::build_sources_script())?;
        parse::parse_replication_source(&value)
    }

    fn explain(&self, namespace: &str, query: &Value) -> Result<ExplainReport, AdapterError> {
        let Some((database, collection)) = namespace.split_once('.') else {
            return Err(AdapterError::Command(format!(
                "namespace '{}' has no collection",
                namespace
            )));
        };
        let value = self.run(&scripts::build_explain_script(database, collection, query))?;
        parse::parse_explain(&value, query)
    }

    fn kill(&self, opid: i64) -> Result<(), AdapterError> {
        let value = self.run(&scripts::build_kill_script(opid))?;
        parse::parse_ok(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_appends_admin_database() {
        assert_eq!(
            MongoShellAdapter::new("10.0.0.1").target(),
            "10.0.0.1/admin"
        );
        assert_eq!(
            MongoShellAdapter::new("10.0.0.1:27018/").target(),
            "10.0.0.1:27018/admin"
        );
        assert_eq!(
            MongoShellAdapter::new("mongodb://db.local:27017").target(),
            "mongodb://db.local:27017"
        );
    }

    #[test]
    fn test_command_arguments() {
        let adapter = MongoShellAdapter::new("db1")
            .with_shell("mongo")
            .with_credentials(Some("admin".into()), Some("secret".into()));
        let cmd = adapter.command("print(1)");
        assert_eq!(cmd.get_program(), "mongo");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--quiet",
                "--norc",
                "db1/admin",
                "--username",
                "admin",
                "--authenticationDatabase",
                "admin",
                "--password",
                "secret",
                "--eval",
                "print(1)",
            ]
        );
    }

    #[test]
    fn test_missing_shell_is_unreachable() {
        let adapter = MongoShellAdapter::new("db1").with_shell("/nonexistent/motop-shell-12345");
        assert!(matches!(
            adapter.status(),
            Err(AdapterError::Unreachable(_))
        ));
    }

    #[test]
    fn test_explain_requires_collection() {
        let adapter = MongoShellAdapter::new("db1").with_shell("/nonexistent/motop-shell-12345");
        assert!(matches!(
            adapter.explain("nodot", &Value::Null),
            Err(AdapterError::Command(_))
        ));
    }

    /// Writes an executable shell stand-in running `body`.
    #[cfg(unix)]
    fn fake_shell(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let script = dir.path().join("fake-shell");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_shell_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_shell(&dir, "exec sleep 5");

        let adapter = MongoShellAdapter::new("db1")
            .with_shell(script.to_string_lossy())
            .with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        assert_eq!(adapter.status().unwrap_err(), AdapterError::Timeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_replica_members_through_shell() {
        let dir = tempfile::tempdir().unwrap();
        let reply = concat!(
            r#"{"ok":1,"set":"rs0","members":["#,
            r#"{"name":"a:27017","stateStr":"PRIMARY"},"#,
            r#"{"name":"c:27017","stateStr":"ARBITER"}]}"#
        );
        let script = fake_shell(&dir, &format!("echo '{}'", reply));

        let adapter = MongoShellAdapter::new("db1").with_shell(script.to_string_lossy());
        let members = adapter.replica_set_members().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "a:27017");
    }

    #[cfg(unix)]
    #[test]
    fn test_router_listing_through_shell() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"[{"opid":"shard01:5","op":"query"},{"opid":6,"op":"query"}]"#;
        let script = fake_shell(&dir, &format!("echo '{}'", reply));

        let adapter = MongoShellAdapter::new("db1").with_shell(script.to_string_lossy());
        let listing = adapter.list_in_progress().unwrap();
        assert_eq!(listing.skipped, 1);
        assert_eq!(listing.operations.len(), 1);
    }
}
