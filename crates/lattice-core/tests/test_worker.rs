use std::path::Path;
use std::time::{Duration, Instant};

use lattice_core::error::LatticeError;
use lattice_core::worker::{check_binary, CudaWorker, ExitKind, GpuSlot, WorkerEvent};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

/// Drain events until `Finished`, returning (unit count, exit kind,
/// whether `Started` arrived first).
fn drain(rx: &crossbeam_channel::Receiver<WorkerEvent>) -> (usize, ExitKind, bool) {
    let mut units = 0;
    let mut started_first = false;
    let mut first = true;
    loop {
        match rx.recv_timeout(EVENT_TIMEOUT).expect("worker event") {
            WorkerEvent::Started { .. } => {
                started_first = first;
                first = false;
            }
            WorkerEvent::UnitFinished { .. } => {
                first = false;
                units += 1;
            }
            WorkerEvent::Finished { exit, .. } => return (units, exit, started_first),
        }
    }
}

// ---------------------------------------------------------------------------
// Launch validation
// ---------------------------------------------------------------------------

#[test]
fn test_spawn_fails_for_missing_binary() {
    let (tx, _rx) = crossbeam_channel::unbounded();
    let result = CudaWorker::spawn(
        Path::new("/no/such/cudaDeconv"),
        sh("true"),
        Vec::new(),
        GpuSlot(0),
        tx,
    );
    assert!(matches!(result, Err(LatticeError::MissingBinary(_))));
}

#[test]
fn test_check_binary_rejects_non_executable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cudaDeconv");
    std::fs::write(&path, "#!/bin/sh\n").unwrap();
    // Written files are not executable by default.
    assert!(matches!(
        check_binary(&path),
        Err(LatticeError::MissingBinary(_))
    ));
}

#[test]
fn test_check_binary_rejects_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        check_binary(dir.path()),
        Err(LatticeError::MissingBinary(_))
    ));
}

#[test]
fn test_check_binary_accepts_shell() {
    assert!(check_binary(Path::new("/bin/sh")).is_ok());
}

// ---------------------------------------------------------------------------
// Output markers and lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_markers_raise_unit_finished_before_finished() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = CudaWorker::spawn(
        Path::new("/bin/sh"),
        sh("echo 'Iteration 5'; echo '*** Finished!'; echo 'Output: /tmp/out.tif'; echo done"),
        Vec::new(),
        GpuSlot(0),
        tx,
    )
    .unwrap();

    let (units, exit, started_first) = drain(&rx);
    handle.join();

    assert!(started_first, "Started must be the first event");
    // "*** Finished!" and "Output:" both count; "Iteration" and plain
    // lines do not.
    assert_eq!(units, 2);
    assert_eq!(exit, ExitKind::Exited(0));
    assert!(exit.is_clean());
}

#[test]
fn test_nonzero_exit_is_reported_and_not_clean() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = CudaWorker::spawn(
        Path::new("/bin/sh"),
        sh("exit 3"),
        Vec::new(),
        GpuSlot(1),
        tx,
    )
    .unwrap();

    let (units, exit, _) = drain(&rx);
    handle.join();

    assert_eq!(units, 0);
    assert_eq!(exit, ExitKind::Exited(3));
    assert!(!exit.is_clean());
}

#[test]
fn test_environment_overrides_reach_the_process() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = CudaWorker::spawn(
        Path::new("/bin/sh"),
        sh("[ \"$CUDA_VISIBLE_DEVICES\" = \"3\" ] && echo '*** Finished!' || true"),
        vec![("CUDA_VISIBLE_DEVICES".to_string(), "3".to_string())],
        GpuSlot(3),
        tx,
    )
    .unwrap();

    let (units, exit, _) = drain(&rx);
    handle.join();

    assert_eq!(units, 1);
    assert_eq!(exit, ExitKind::Exited(0));
}

// ---------------------------------------------------------------------------
// Abort
// ---------------------------------------------------------------------------

#[test]
fn test_abort_kills_long_running_process() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = CudaWorker::spawn(
        Path::new("/bin/sh"),
        sh("sleep 30"),
        Vec::new(),
        GpuSlot(0),
        tx,
    )
    .unwrap();

    // Wait until the process is up, then pull the plug.
    match rx.recv_timeout(EVENT_TIMEOUT).expect("started event") {
        WorkerEvent::Started { .. } => {}
        other => panic!("expected Started, got {other:?}"),
    }

    let begun = Instant::now();
    handle.abort();

    let exit = loop {
        match rx.recv_timeout(EVENT_TIMEOUT).expect("finished event") {
            WorkerEvent::Finished { exit, .. } => break exit,
            _ => {}
        }
    };
    handle.join();

    assert_eq!(exit, ExitKind::Aborted);
    // Forced kill, not a 30 second graceful wait.
    assert!(begun.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_abort_kills_descendant_processes() {
    // The shell parks in `wait` while a background child inherits the
    // output pipes. Killing only the shell would leave that child
    // holding the pipes for its full 30 seconds, stalling the reader
    // threads and with them the Finished event.
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = CudaWorker::spawn(
        Path::new("/bin/sh"),
        sh("sleep 30 & wait"),
        Vec::new(),
        GpuSlot(0),
        tx,
    )
    .unwrap();

    match rx.recv_timeout(EVENT_TIMEOUT).expect("started event") {
        WorkerEvent::Started { .. } => {}
        other => panic!("expected Started, got {other:?}"),
    }

    let begun = Instant::now();
    handle.abort();

    let exit = loop {
        match rx.recv_timeout(EVENT_TIMEOUT).expect("finished event") {
            WorkerEvent::Finished { exit, .. } => break exit,
            _ => {}
        }
    };
    handle.join();

    assert_eq!(exit, ExitKind::Aborted);
    assert!(begun.elapsed() < Duration::from_secs(10));
}
