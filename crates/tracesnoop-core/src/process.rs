//! Pseudo-terminal process handling.

use crate::{Result, SnoopError};
use portable_pty::{native_pty_system, Child as PtyChild, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Size of each PTY read.
const READ_BUFFER_SIZE: usize = 4096;

/// Interval between exit checks in [`PtyProcess::wait`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output notifications from the PTY reader thread.
#[derive(Debug)]
pub enum ProcessOutput {
    /// Raw bytes read from the PTY, in order.
    Data(Vec<u8>),
    /// The PTY reached EOF or failed; no more data follows.
    Closed,
}

/// Options for spawning a shell in a pseudo-terminal.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub rows: u16,
    pub cols: u16,
}

impl SpawnOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            rows: 24,
            cols: 80,
        }
    }
}

/// A shell running in a pseudo-terminal.
///
/// Reading happens on a dedicated thread (PTY reads block); the caller gets
/// each chunk through the `on_output` callback passed to [`PtyProcess::spawn`].
pub struct PtyProcess {
    program: String,
    pid: Option<u32>,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    child: Arc<Mutex<Box<dyn PtyChild + Send + Sync>>>,
    shutdown: Arc<AtomicBool>,
    reader: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl PtyProcess {
    /// Spawn `opts.program` in a new PTY and start the reader thread.
    pub fn spawn<F>(opts: &SpawnOptions, mut on_output: F) -> Result<Self>
    where
        F: FnMut(ProcessOutput) + Send + 'static,
    {
        info!(target: "tracesnoop::process", "Spawning {} in a PTY ({}x{})", opts.program, opts.cols, opts.rows);

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: opts.rows,
                cols: opts.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SnoopError::PtyError(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&opts.program);
        cmd.args(&opts.args);
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &opts.cwd {
            cmd.cwd(cwd);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!(target: "tracesnoop::process", "Failed to spawn {}: {}", opts.program, e);
            SnoopError::ProcessSpawnFailed(e.to_string())
        })?;
        // The child holds its own handle; ours would keep the PTY open after exit.
        drop(pair.slave);
        let pid = child.process_id();

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SnoopError::PtyError(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SnoopError::PtyError(e.to_string()))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = shutdown.clone();
        let program = opts.program.clone();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            debug!(target: "tracesnoop::process", "PTY reader thread started");

            loop {
                if shutdown_for_thread.load(Ordering::SeqCst) {
                    break;
                }

                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!(target: "tracesnoop::process", "PTY reader got EOF");
                        break;
                    }
                    Ok(n) => {
                        trace!(target: "tracesnoop::process", "PTY output ({} bytes)", n);
                        on_output(ProcessOutput::Data(buf[..n].to_vec()));
                    }
                    Err(e) => {
                        // EIO on Linux once the child side closes.
                        if !shutdown_for_thread.load(Ordering::SeqCst) {
                            debug!(target: "tracesnoop::process", "PTY read ended: {}", e);
                        }
                        break;
                    }
                }
            }

            on_output(ProcessOutput::Closed);
            debug!(target: "tracesnoop::process", "PTY reader thread exiting for {}", program);
        });

        Ok(Self {
            program: opts.program.clone(),
            pid,
            master: Mutex::new(Some(pair.master)),
            writer: Mutex::new(Some(writer)),
            child: Arc::new(Mutex::new(child)),
            shutdown,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Take the PTY writer so another owner can forward input directly.
    pub fn take_writer(&self) -> Option<Box<dyn Write + Send>> {
        self.writer.lock().ok().and_then(|mut w| w.take())
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        debug!(target: "tracesnoop::process", "Resizing PTY to {}x{}", cols, rows);
        let guard = self
            .master
            .lock()
            .map_err(|_| SnoopError::PtyError("master lock poisoned".to_string()))?;
        let master = guard
            .as_ref()
            .ok_or_else(|| SnoopError::PtyError("PTY closed".to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SnoopError::PtyError(e.to_string()))
    }

    /// Block until the child exits and return its exit code.
    ///
    /// The child lock is only held for each non-blocking check, so
    /// [`PtyProcess::terminate`] can run while a wait is in progress.
    pub fn wait(&self) -> Result<u32> {
        loop {
            let status = self
                .child
                .lock()
                .map_err(|_| SnoopError::PtyError("child lock poisoned".to_string()))?
                .try_wait()?;
            if let Some(status) = status {
                return Ok(status.exit_code());
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Kill the process and close the PTY.
    ///
    /// The reader thread is not joined: it exits on its own once the PTY
    /// closes, and callers stop listening before calling this.
    pub fn terminate(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target: "tracesnoop::process", "Terminating {}", self.program);

        let pid = self.pid;
        let exited = self
            .child
            .lock()
            .ok()
            .and_then(|mut c| c.try_wait().ok().flatten())
            .is_some();

        // A reaped pid may already belong to someone else.
        if !exited {
            if let Ok(mut child) = self.child.lock() {
                if let Err(e) = child.kill() {
                    debug!(target: "tracesnoop::process", "Kill failed: {}", e);
                }
            }

            // Kill the whole process group so jobs started from the shell go too.
            #[cfg(unix)]
            if let Some(pid) = pid {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            #[cfg(not(unix))]
            let _ = pid;
        }

        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        if let Ok(mut master) = self.master.lock() {
            master.take();
        }

        if let Ok(mut child) = self.child.lock() {
            let _ = child.try_wait();
        }

        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                if handle.is_finished() {
                    if handle.join().is_err() {
                        warn!(target: "tracesnoop::process", "PTY reader thread panicked");
                    }
                }
            }
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    #[ignore = "spawns a real shell in a PTY"]
    fn test_terminate_unblocks_pending_wait() {
        let mut opts = SpawnOptions::new("/bin/sh");
        opts.args = vec!["-c".to_string(), "sleep 30".to_string()];
        let process = Arc::new(PtyProcess::spawn(&opts, |_| {}).unwrap());

        let (tx, rx) = mpsc::channel();
        let waiter = process.clone();
        std::thread::spawn(move || {
            let _ = tx.send(waiter.wait());
        });

        // Let the waiter start polling before terminating.
        std::thread::sleep(Duration::from_millis(100));
        process.terminate();

        let waited = rx.recv_timeout(Duration::from_secs(5));
        assert!(waited.is_ok(), "wait did not return after terminate");
    }

    #[test]
    #[ignore = "spawns a real shell in a PTY"]
    fn test_wait_returns_exit_code() {
        let mut opts = SpawnOptions::new("/bin/sh");
        opts.args = vec!["-c".to_string(), "exit 3".to_string()];
        let process = PtyProcess::spawn(&opts, |_| {}).unwrap();
        assert_eq!(process.wait().unwrap(), 3);
    }
}
