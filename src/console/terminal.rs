//! Terminal access for the console loop.

use std::io::{self, BufRead, Stdout, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};
use tracing::debug;

/// Screen and keyboard used by the console loop.
pub trait Terminal {
    /// Clears the screen and homes the cursor.
    fn clear(&mut self) -> io::Result<()>;

    /// Sink for screen output. Lines must end with `\r\n`.
    fn writer(&mut self) -> &mut dyn Write;

    /// Waits up to `timeout` for a key press.
    fn wait_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>>;

    /// Blocks until a key is pressed.
    fn read_key(&mut self) -> io::Result<KeyEvent>;

    /// Prompts for `Server: ` and `OpId: ` in canonical mode.
    ///
    /// Returns `None` when either answer is blank or input ends.
    fn ask_operation(&mut self) -> io::Result<Option<(String, String)>>;
}

/// Keeps the terminal in raw mode while alive.
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Leaves raw mode while alive and re-enters it on drop.
pub struct SuspendGuard(());

impl SuspendGuard {
    pub fn new() -> io::Result<Self> {
        disable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        let _ = enable_raw_mode();
    }
}

/// The process terminal, driven through crossterm.
pub struct CrosstermTerminal {
    out: Stdout,
    _raw: RawModeGuard,
}

impl CrosstermTerminal {
    /// Switches the terminal to raw mode until the value is dropped.
    pub fn new() -> io::Result<Self> {
        let raw = RawModeGuard::new()?;
        Ok(Self {
            out: io::stdout(),
            _raw: raw,
        })
    }

    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.out, "{}", label)?;
        self.out.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(None);
        }
        Ok(Some(answer.to_string()))
    }
}

fn pressed(event: Event) -> Option<KeyEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(key),
        _ => None,
    }
}

impl Terminal for CrosstermTerminal {
    fn clear(&mut self) -> io::Result<()> {
        execute!(self.out, Clear(ClearType::All), MoveTo(0, 0))
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.out
    }

    fn wait_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !event::poll(remaining)? {
                return Ok(None);
            }
            if let Some(key) = pressed(event::read()?) {
                return Ok(Some(key));
            }
        }
    }

    fn read_key(&mut self) -> io::Result<KeyEvent> {
        loop {
            if let Some(key) = pressed(event::read()?) {
                return Ok(key);
            }
        }
    }

    fn ask_operation(&mut self) -> io::Result<Option<(String, String)>> {
        let _suspended = SuspendGuard::new()?;
        writeln!(self.out)?;
        let Some(server) = self.prompt("Server: ")? else {
            debug!("prompt aborted");
            return Ok(None);
        };
        let Some(opid) = self.prompt("OpId: ")? else {
            debug!("prompt aborted");
            return Ok(None);
        };
        Ok(Some((server, opid)))
    }
}
