use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, error, info, info_span, warn};

use crate::error::{LatticeError, Result};

/// How often the monitor thread checks for process exit or an abort
/// request while the external process runs.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stdout lines containing one of these mark one unit of output done.
const UNIT_MARKERS: [&str; 2] = ["*** Finished!", "Output:"];
/// Stdout lines containing this are per-iteration progress chatter.
const ITERATION_MARKER: &str = "Iteration";

/// Logical GPU device index. Passed to the external process through
/// `CUDA_VISIBLE_DEVICES` so it targets the right device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuSlot(pub u32);

impl fmt::Display for GpuSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPU{}", self.0)
    }
}

/// How the external process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited on its own with this code.
    Exited(i32),
    /// Killed by a signal or exited without a code.
    Crashed,
    /// Terminated because we asked it to.
    Aborted,
}

impl ExitKind {
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitKind::Exited(0))
    }
}

/// Notifications a worker delivers to its owning pool.
///
/// Per slot, every `UnitFinished` for an invocation precedes its
/// single `Finished`; there is no ordering across slots.
#[derive(Clone, Copy, Debug)]
pub enum WorkerEvent {
    Started { slot: GpuSlot },
    UnitFinished { slot: GpuSlot },
    Finished { slot: GpuSlot, exit: ExitKind },
}

/// Verify that the GPU binary exists and is executable, without
/// attempting a launch.
pub fn check_binary(path: &Path) -> Result<()> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Err(LatticeError::MissingBinary(path.to_path_buf())),
    };
    if !meta.is_file() {
        return Err(LatticeError::MissingBinary(path.to_path_buf()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(LatticeError::MissingBinary(path.to_path_buf()));
        }
    }
    Ok(())
}

/// Forcibly stop the child and everything it spawned. The worker runs
/// in its own process group, so signaling the group takes down helpers
/// that would otherwise hold the output pipes open and stall the
/// reader threads. kill, not terminate: SIGTERM-style shutdown is
/// unreliable across target platforms.
#[cfg(unix)]
fn kill_group(child: &mut Child) {
    let pgid = child.id() as i32;
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
    // Backstop in case the child left its group.
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

fn classify_exit(status: ExitStatus, aborted: bool) -> ExitKind {
    if aborted {
        ExitKind::Aborted
    } else {
        match status.code() {
            Some(code) => ExitKind::Exited(code),
            None => ExitKind::Crashed,
        }
    }
}

/// Owns one external-process invocation end to end.
///
/// `spawn` verifies the binary, launches the process with the slot's
/// environment selector, and starts three threads: one reader per
/// output stream and a monitor that polls for exit every
/// [`POLL_INTERVAL`]. Stream readers scan stdout for the unit and
/// iteration markers; everything else is forwarded to the worker's
/// tracing span, whole lines only. The monitor emits exactly one
/// `Finished` event per lifetime, after both readers have drained, so
/// a slot never observes `Finished` ahead of its unit completions.
///
/// Abort is a one-way flag. The monitor honors it at the next poll by
/// killing the whole process group outright and then blocking on
/// `wait`, so neither the process nor anything it spawned outlives the
/// worker.
pub struct CudaWorker;

impl CudaWorker {
    pub fn spawn(
        binary: &Path,
        args: Vec<String>,
        env: Vec<(String, String)>,
        slot: GpuSlot,
        events: Sender<WorkerEvent>,
    ) -> Result<WorkerHandle> {
        check_binary(binary)?;

        debug!(%slot, binary = %binary.display(), "launching worker");
        for (k, v) in &env {
            debug!(%slot, "setting environment variable: {k} = {v}");
        }

        let mut command = Command::new(binary);
        command
            .args(&args)
            .envs(env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so abort can reach spawned helpers too.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn()?;

        let _ = events.send(WorkerEvent::Started { slot });
        info!(%slot, args = %args.join(" "), "worker started");

        // stdout/stderr were requested piped above, so take() cannot fail.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out_events = events.clone();
        let out_reader = thread::spawn(move || {
            let span = info_span!("worker", gpu = slot.0);
            let _enter = span.enter();
            if let Some(stdout) = stdout {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if UNIT_MARKERS.iter().any(|m| line.contains(m)) {
                        let _ = out_events.send(WorkerEvent::UnitFinished { slot });
                    } else if line.contains(ITERATION_MARKER) {
                        info!("{slot}: {}", line.trim_end());
                    } else {
                        info!("{}", line.trim_end());
                    }
                }
            }
        });

        let err_reader = thread::spawn(move || {
            let span = info_span!("worker", gpu = slot.0);
            let _enter = span.enter();
            if let Some(stderr) = stderr {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    warn!("{}", line.trim_end());
                }
            }
        });

        let abort = Arc::new(AtomicBool::new(false));
        let monitor_abort = Arc::clone(&abort);
        let monitor = thread::spawn(move || {
            monitor_process(child, slot, monitor_abort, events, out_reader, err_reader);
        });

        Ok(WorkerHandle {
            slot,
            abort,
            monitor: Some(monitor),
        })
    }
}

fn monitor_process(
    mut child: Child,
    slot: GpuSlot,
    abort: Arc<AtomicBool>,
    events: Sender<WorkerEvent>,
    out_reader: JoinHandle<()>,
    err_reader: JoinHandle<()>,
) {
    let exit = loop {
        if abort.load(Ordering::Relaxed) {
            info!(%slot, "aborting worker");
            kill_group(&mut child);
            match child.wait() {
                Ok(status) => break classify_exit(status, true),
                Err(e) => {
                    error!(%slot, "failed to reap aborted worker: {e}");
                    break ExitKind::Crashed;
                }
            }
        }
        match child.try_wait() {
            Ok(Some(status)) => break classify_exit(status, false),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                error!(%slot, "failed to poll worker: {e}");
                break ExitKind::Crashed;
            }
        }
    };

    // Drain both streams before reporting, so every UnitFinished for
    // this invocation is already delivered.
    let _ = out_reader.join();
    let _ = err_reader.join();

    match exit {
        ExitKind::Exited(code) => info!(%slot, "worker exited normally with exit code: {code}"),
        ExitKind::Crashed => error!(%slot, "worker crashed"),
        ExitKind::Aborted => info!(%slot, "worker aborted"),
    }
    let _ = events.send(WorkerEvent::Finished { slot, exit });
}

/// Handle to a running worker, owned by the pool for the worker's
/// whole lifetime and released only after `Finished` is observed.
pub struct WorkerHandle {
    slot: GpuSlot,
    abort: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn slot(&self) -> GpuSlot {
        self.slot
    }

    /// Request termination. The monitor thread kills the process group
    /// and blocks on the child's exit before emitting `Finished`; the
    /// pool's all-idle rendezvous is the proof that nothing is left
    /// running.
    pub fn abort(&self) {
        debug!(slot = %self.slot, "worker notified to abort");
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Reap the monitor thread. Call after `Finished` was received.
    pub fn join(mut self) {
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.join();
        }
    }
}
