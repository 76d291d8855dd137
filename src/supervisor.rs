//! Process Supervisor (spec §4.1).
//!
//! The one sanctioned way the rest of the installer runs external programs.
//! Every primitive here builds an explicit argv vector — per the design
//! notes, shell-command composition (`Command::new("sh").arg("-c", ...)`)
//! is never used; arguments are passed as vectors and secrets go through
//! stdin or temp files, never string interpolation.
//!
//! Grounded on the teacher's `script_runner.rs` (process-group spawn +
//! captured output) and `process_guard.rs` (global child registry, used
//! here for death-pact cleanup on cancel).

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::process_guard::ChildRegistry;

const DEFAULT_PATH: &str = "/sbin:/bin:/usr/local/sbin:/usr/local/bin:/usr/bin:/usr/sbin";

/// Options accepted by [`exec`].
#[derive(Debug, Clone, Default)]
pub struct ExecOpts {
    /// Inherit the caller's stdin/stdout and allow the child to prompt.
    pub interactive: bool,
    /// Additional/overriding environment variables.
    pub env_overrides: HashMap<String, String>,
    /// Working directory for the child, if not the caller's cwd.
    pub working_dir: Option<String>,
}

fn dry_run() -> bool {
    std::env::var("DIRTY_CMD_RUN").as_deref() == Ok("1")
}

fn log_argv(argv: &[String]) {
    if std::env::var("LOG_EXEC_CMDS").as_deref() == Ok("1") {
        tracing::debug!(argv = ?argv, "exec");
    } else {
        tracing::trace!(argv = ?argv, "exec");
    }
}

fn build_command(argv: &[String], opts: &ExecOpts) -> Command {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.env("PATH", DEFAULT_PATH);
    for (k, v) in &opts.env_overrides {
        cmd.env(k, v);
    }
    if let Some(dir) = &opts.working_dir {
        cmd.current_dir(dir);
    }
    if opts.interactive {
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
    } else {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    }
    cmd
}

/// Blocking synchronous execution. Returns the process exit code, or an
/// error if the program could not be spawned.
pub fn exec(argv: &[String], opts: &ExecOpts) -> std::io::Result<i32> {
    assert!(!argv.is_empty(), "argv must have at least a program name");
    log_argv(argv);

    if dry_run() {
        tracing::info!(argv = ?argv, "DIRTY_CMD_RUN=1: skipping actual execution");
        return Ok(0);
    }

    let mut child = build_command(argv, opts).spawn()?;
    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

/// Shorthand that returns true iff the exit code is 0.
pub fn exec_checked(argv: &[String]) -> bool {
    exec(argv, &ExecOpts::default()).map(|c| c == 0).unwrap_or(false)
}

/// Captures combined stdout, trimming a single trailing newline. Returns
/// `"-1"` as a sentinel if the spawn itself fails.
pub fn exec_capture(argv: &[String]) -> String {
    log_argv(argv);

    if dry_run() {
        tracing::info!(argv = ?argv, "DIRTY_CMD_RUN=1: skipping actual execution");
        return String::new();
    }

    let output = match Command::new(&argv[0])
        .args(&argv[1..])
        .env("PATH", DEFAULT_PATH)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(error = %e, argv = ?argv, "failed to spawn for capture");
            return "-1".to_string();
        }
    };

    let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.ends_with('\n') {
        stdout.pop();
    }
    stdout
}

/// A move-only handle to a running (or finished) child process.
///
/// Owns the child PID and an append-only log buffer behind a mutex, so a
/// UI-refresh thread can poll [`SubProcess::get_log`] at any time while a
/// reader thread appends combined stdout+stderr chunks as they arrive.
pub struct SubProcess {
    pid: u32,
    log: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
    child: Option<Child>,
    reader_handle: Option<JoinHandle<()>>,
}

impl SubProcess {
    /// Returns true while the child has not yet exited.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Copy the log buffer under lock.
    pub fn get_log(&self) -> String {
        self.log.lock().expect("log mutex poisoned").clone()
    }

    /// Append text to the log buffer under lock.
    pub fn append_log(&self, text: &str) {
        let mut guard = self.log.lock().expect("log mutex poisoned");
        guard.push_str(text);
    }

    /// Send SIGTERM to the child.
    pub fn terminate(&mut self) {
        if let Some(child) = &mut self.child {
            let _ = child.kill();
        }
        let registry = ChildRegistry::global();
        if let Ok(mut guard) = registry.lock() {
            guard.unregister(self.pid);
        }
    }

    /// Release internal resources: join the reader thread and wait on the
    /// child if still attached. Safe to call after `terminate()`.
    pub fn destroy(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        if let Some(handle) = self.reader_handle.take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for SubProcess {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Spawns asynchronously, pumping combined stdout+stderr bytes into
/// `handle`'s log buffer on a background thread, and returns only once the
/// child has exited. A UI thread may call `handle.get_log()` from another
/// thread while this blocks.
pub fn exec_follow(argv: &[String], opts: &ExecOpts) -> std::io::Result<(bool, SubProcess)> {
    assert!(!argv.is_empty(), "argv must have at least a program name");
    log_argv(argv);

    let log = Arc::new(Mutex::new(String::new()));
    let running = Arc::new(AtomicBool::new(true));

    if dry_run() {
        tracing::info!(argv = ?argv, "DIRTY_CMD_RUN=1: skipping actual execution");
        running.store(false, Ordering::SeqCst);
        let handle = SubProcess {
            pid: 0,
            log,
            running,
            child: None,
            reader_handle: None,
        };
        return Ok((true, handle));
    }

    let mut cmd = build_command(argv, opts);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let pid = child.id();

    {
        let registry = ChildRegistry::global();
        if let Ok(mut guard) = registry.lock() {
            guard.register(pid);
        }
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let reader_log = Arc::clone(&log);
    let reader_handle = thread::spawn(move || {
        pump_combined(stdout, stderr, reader_log);
    });

    let status = child.wait()?;
    running.store(false, Ordering::SeqCst);
    let _ = reader_handle.join();

    {
        let registry = ChildRegistry::global();
        if let Ok(mut guard) = registry.lock() {
            guard.unregister(pid);
        }
    }

    let handle = SubProcess {
        pid,
        log,
        running,
        child: Some(child),
        reader_handle: None,
    };

    Ok((status.success(), handle))
}

/// Read stdout and stderr pipes to completion, interleaving chunks into the
/// shared log buffer as they arrive. Runs on the background reader thread.
fn pump_combined(
    stdout: Option<impl Read + Send + 'static>,
    stderr: Option<impl Read + Send + 'static>,
    log: Arc<Mutex<String>>,
) {
    let mut threads = Vec::new();

    if let Some(out) = stdout {
        let log = Arc::clone(&log);
        threads.push(thread::spawn(move || drain_into_log(out, log)));
    }
    if let Some(err) = stderr {
        let log = Arc::clone(&log);
        threads.push(thread::spawn(move || drain_into_log(err, log)));
    }
    for t in threads {
        let _ = t.join();
    }
}

fn drain_into_log(reader: impl Read, log: Arc<Mutex<String>>) {
    let mut buf_reader = BufReader::new(reader);
    let mut chunk = [0u8; 4096];
    loop {
        match buf_reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&chunk[..n]);
                let mut guard = log.lock().expect("log mutex poisoned");
                guard.push_str(&text);
            }
            Err(_) => break,
        }
    }
}

/// Wraps a call through the target root via `chroot`, redirecting captured
/// stderr to the given install-log path (spec: "Must redirect captured
/// stderr to an install log file").
pub fn chroot_exec(
    argv: &[String],
    root_mountpoint: &Path,
    install_log: &Path,
    follow: bool,
) -> std::io::Result<bool> {
    let mut full_argv = vec![
        "chroot".to_string(),
        root_mountpoint.display().to_string(),
    ];
    full_argv.extend(argv.iter().cloned());

    log_argv(&full_argv);

    if dry_run() {
        tracing::info!(argv = ?full_argv, "DIRTY_CMD_RUN=1: skipping actual execution");
        return Ok(true);
    }

    if follow {
        let (ok, handle) = exec_follow(&full_argv, &ExecOpts::default())?;
        append_to_install_log(install_log, &handle.get_log())?;
        Ok(ok)
    } else {
        let output = Command::new("chroot")
            .arg(root_mountpoint)
            .args(argv)
            .env("PATH", DEFAULT_PATH)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        append_to_install_log(install_log, &combined)?;
        Ok(output.status.success())
    }
}

fn append_to_install_log(path: &Path, text: &str) -> std::io::Result<()> {
    use std::fs::OpenOptions;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}
