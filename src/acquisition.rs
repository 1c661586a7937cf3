/// Greaseweazle acquisition coordinator
///
/// Wraps the external `gw` command-line tool to capture fresh images from
/// physical media. At most one read runs per process; a best-effort scan of
/// the OS process table also refuses to start while a sibling `gw` process
/// holds the device. Progress is streamed line by line to a caller-supplied
/// sink.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{ArchiveError, Result};

/// Subcommands that mark a process as holding the acquisition device
pub const GW_SUBCOMMANDS: &[&str] = &[
    "read", "write", "convert", "erase", "info", "rpm", "seek", "clean",
];

const INFO_TIMEOUT: Duration = Duration::from_secs(30);
const RPM_TIMEOUT: Duration = Duration::from_secs(15);

/// Options for an acquisition read
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Image format passed as `--format` (e.g. "ibm.720")
    pub format: Option<String>,
    /// Track range passed as `--tracks` (e.g. "c=0-79:h=0-1")
    pub tracks: Option<String>,
    /// Revolutions captured per track
    pub revs: u32,
    /// Retries per failing track
    pub retries: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            format: None,
            tracks: None,
            revs: 3,
            retries: 3,
        }
    }
}

/// Shared handle used to abort an in-flight read
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Create a handle in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the child receives a terminate signal
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of a completed acquisition read
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    /// The last progress line the tool emitted
    pub last_line: String,
}

/// Serializes access to the external acquisition tool
pub struct GwController {
    command: String,
    active: Arc<AtomicBool>,
}

impl Default for GwController {
    fn default() -> Self {
        Self::new()
    }
}

impl GwController {
    /// Create a controller invoking `gw` from the search path
    pub fn new() -> Self {
        Self::with_command("gw")
    }

    /// Create a controller invoking a specific executable
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether a read is in flight here or a sibling process holds
    /// the device
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::SeqCst) || sibling_acquisition_running()
    }

    /// Query device information as `key: value` pairs
    ///
    /// One-shot invocation of `gw info` with a hard timeout.
    pub fn info(&self) -> Result<Vec<(String, String)>> {
        let text = self.run_one_shot(&["info"], INFO_TIMEOUT)?;
        Ok(text
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
            })
            .collect())
    }

    /// Measure the drive's rotation speed in RPM
    ///
    /// One-shot invocation of `gw rpm`, parsing the `NNN.N RPM` token from
    /// the tool's output.
    pub fn rpm(&self) -> Result<f64> {
        let text = self.run_one_shot(&["rpm"], RPM_TIMEOUT)?;
        for line in text.lines() {
            let words: Vec<&str> = line.split_whitespace().collect();
            for pair in words.windows(2) {
                if pair[1].eq_ignore_ascii_case("rpm") {
                    if let Ok(value) = pair[0].parse::<f64>() {
                        return Ok(value);
                    }
                }
            }
        }
        Err(ArchiveError::ExternalReadFailed {
            stderr: format!("no RPM reading in output: {}", text.trim()),
        })
    }

    /// Capture a disk to `output`, streaming progress lines to the sink
    ///
    /// Fails immediately with [`ArchiveError::DeviceBusy`] when a read is
    /// already in flight, without spawning anything. Lines from standard
    /// output and standard error are delivered in arrival order. There is
    /// no overall timeout; only the cancellation handle ends a hung read.
    pub fn read<F>(
        &self,
        output: &Path,
        options: &ReadOptions,
        mut on_progress: F,
        cancel: &CancellationHandle,
    ) -> Result<ReadOutcome>
    where
        F: FnMut(&str),
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ArchiveError::DeviceBusy);
        }
        let _guard = ActiveGuard(Arc::clone(&self.active));

        if sibling_acquisition_running() {
            return Err(ArchiveError::DeviceBusy);
        }

        let mut command = Command::new(&self.command);
        command.arg("read");
        if let Some(format) = &options.format {
            command.args(["--format", format]);
        }
        if let Some(tracks) = &options.tracks {
            command.args(["--tracks", tracks]);
        }
        command.args(["--revs", &options.revs.to_string()]);
        command.args(["--retries", &options.retries.to_string()]);
        command.arg(output);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("starting acquisition read to {}", output.display());
        let mut child = command.spawn()?;

        let (tx, rx) = mpsc::channel();
        let stdout_thread = child
            .stdout
            .take()
            .map(|stream| spawn_line_reader(stream, tx.clone(), false));
        let stderr_thread = child
            .stderr
            .take()
            .map(|stream| spawn_line_reader(stream, tx.clone(), true));
        drop(tx);

        let mut last_line = String::new();
        let mut stderr_text = String::new();

        // Forward lines until both pipes close, watching the cancel flag.
        // On cancellation the child is terminated and reaped directly; any
        // grandchildren it spawned may still hold the pipes open.
        let status = loop {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(StreamLine { text, from_stderr }) => {
                    if from_stderr {
                        stderr_text.push_str(&text);
                        stderr_text.push('\n');
                    }
                    last_line = text.clone();
                    on_progress(&text);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        debug!("cancellation requested, terminating child");
                        let _ = child.kill();
                        break child.wait()?;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break child.wait()?,
            }
        };

        if cancel.is_cancelled() {
            info!("acquisition read cancelled");
            return Err(ArchiveError::Cancelled);
        }

        // Both pipes are closed on this path; the readers are done
        if let Some(handle) = stdout_thread {
            let _ = handle.join();
        }
        if let Some(handle) = stderr_thread {
            let _ = handle.join();
        }
        if !status.success() {
            warn!("acquisition read failed: {}", status);
            return Err(ArchiveError::ExternalReadFailed {
                stderr: stderr_text.trim().to_string(),
            });
        }

        info!("acquisition read complete: {}", last_line);
        Ok(ReadOutcome { last_line })
    }

    /// Run a short subcommand to completion with a hard timeout
    fn run_one_shot(&self, args: &[&str], timeout: Duration) -> Result<String> {
        if self.is_busy() {
            return Err(ArchiveError::DeviceBusy);
        }

        let mut child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout_thread = child.stdout.take().map(spawn_capture);
        let stderr_thread = child.stderr.take().map(spawn_capture);
        let deadline = Instant::now() + timeout;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!("gw {} timed out after {:?}", args.join(" "), timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(ArchiveError::ExternalReadFailed {
                    stderr: format!("gw {} timed out", args.join(" ")),
                });
            }
            thread::sleep(Duration::from_millis(50));
        };

        let stdout = stdout_thread.map(join_capture).unwrap_or_default();
        let stderr = stderr_thread.map(join_capture).unwrap_or_default();

        if !status.success() {
            return Err(ArchiveError::ExternalReadFailed {
                stderr: stderr.trim().to_string(),
            });
        }

        // The tool writes some reports to stderr even on success
        Ok(format!("{}{}", stdout, stderr))
    }
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct StreamLine {
    text: String,
    from_stderr: bool,
}

/// Read a child stream, splitting on `\r`, `\n`, or `\r\n` and forwarding
/// trimmed non-empty lines
fn spawn_line_reader<R: Read + Send + 'static>(
    mut stream: R,
    tx: Sender<StreamLine>,
    from_stderr: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        let mut pending = Vec::new();
        loop {
            match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    for &byte in &buffer[..n] {
                        if byte == b'\n' || byte == b'\r' {
                            flush_line(&mut pending, &tx, from_stderr);
                        } else {
                            pending.push(byte);
                        }
                    }
                }
            }
        }
        flush_line(&mut pending, &tx, from_stderr);
    })
}

fn flush_line(pending: &mut Vec<u8>, tx: &Sender<StreamLine>, from_stderr: bool) {
    if pending.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(pending).trim().to_string();
    pending.clear();
    if !text.is_empty() {
        let _ = tx.send(StreamLine { text, from_stderr });
    }
}

fn spawn_capture<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        let mut raw = Vec::new();
        if stream.read_to_end(&mut raw).is_ok() {
            text = String::from_utf8_lossy(&raw).into_owned();
        }
        text
    })
}

fn join_capture(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Best-effort check for another acquisition process on this host
fn sibling_acquisition_running() -> bool {
    #[cfg(unix)]
    {
        let output = match Command::new("ps").args(["-axo", "command"]).output() {
            Ok(output) => output,
            Err(_) => return false,
        };
        let text = String::from_utf8_lossy(&output.stdout);
        text.lines().any(is_acquisition_command_line)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Match command lines of the form `gw <subcommand> ...`
fn is_acquisition_command_line(line: &str) -> bool {
    let mut words = line.trim_start().split_whitespace();
    let Some(program) = words.next() else {
        return false;
    };
    if program != "gw" {
        return false;
    }
    words
        .next()
        .map(|sub| GW_SUBCOMMANDS.contains(&sub))
        .unwrap_or(false)
}
