use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lattice_core::dataset::Dataset;
use lattice_core::error::{LatticeError, Result};
use lattice_core::params::AcqParams;
use lattice_core::partition::WorkUnit;
use lattice_core::pipeline::config::ProcessPlan;
use lattice_core::pipeline::ItemReporter;
use lattice_core::pool::AbortFlag;
use lattice_core::services::{ArgAssembler, Compression, StageOps};

/// Emits exactly one unit-complete marker and exits cleanly.
pub const UNIT_SCRIPT: &str = "echo '*** Finished!'";

/// Emits one unit-complete marker, then blocks until killed.
pub const HANG_SCRIPT: &str = "echo '*** Finished!'; sleep 30";

/// Shared, ordered record of reporter and stage-op calls.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_contains(log: &EventLog, entry: &str) -> bool {
    log.lock().unwrap().iter().any(|e| e == entry)
}

pub fn log_position(log: &EventLog, entry: &str) -> Option<usize> {
    log.lock().unwrap().iter().position(|e| e == entry)
}

/// Argument "assembly" that ignores the unit and runs a fixed shell
/// script, so tests drive real subprocesses with scripted output.
pub struct ShellAssembler {
    binary: PathBuf,
    script: String,
}

impl ShellAssembler {
    pub fn new(script: &str) -> Self {
        Self::with_binary("/bin/sh", script)
    }

    pub fn with_binary(binary: &str, script: &str) -> Self {
        Self {
            binary: PathBuf::from(binary),
            script: script.to_string(),
        }
    }
}

impl ArgAssembler for ShellAssembler {
    fn binary(&self) -> &Path {
        &self.binary
    }

    fn assemble(&self, _unit: &WorkUnit) -> Vec<String> {
        vec!["-c".to_string(), self.script.clone()]
    }
}

/// Reporter that records every callback into the shared log and can
/// request an abort once a given number of units has completed.
pub struct RecordingReporter {
    pub log: EventLog,
    pub total: AtomicUsize,
    abort_after: usize,
    abort: AbortFlag,
}

impl RecordingReporter {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            total: AtomicUsize::new(0),
            abort_after: 0,
            abort: AbortFlag::new(),
        }
    }

    pub fn aborting_after(log: EventLog, units: usize, abort: AbortFlag) -> Self {
        Self {
            log,
            total: AtomicUsize::new(0),
            abort_after: units,
            abort,
        }
    }

    pub fn units_done(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("unit:"))
            .count()
    }
}

impl ItemReporter for RecordingReporter {
    fn status(&self, message: &str) {
        self.log.lock().unwrap().push(format!("status:{message}"));
    }

    fn begin_units(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn unit_done(&self, done: usize, _total: usize) {
        self.log.lock().unwrap().push(format!("unit:{done}"));
        if self.abort_after > 0 && done >= self.abort_after {
            self.abort.request();
        }
    }

    fn eta(&self, remaining: &str) {
        self.log.lock().unwrap().push(format!("eta:{remaining}"));
    }
}

/// Stage operations that record calls and can be told to fail.
pub struct RecordingOps {
    pub log: EventLog,
    pub fail_register: bool,
    pub fail_cleanup: bool,
}

impl RecordingOps {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            fail_register: false,
            fail_cleanup: false,
        }
    }

    fn record(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }
}

impl StageOps for RecordingOps {
    fn correct_flash(&self, dataset: &Dataset, _plan: &ProcessPlan) -> Result<PathBuf> {
        self.record("correct_flash");
        Ok(dataset.join("Corrected"))
    }

    fn median_and_trim(&self, dataset: &Dataset, _plan: &ProcessPlan) -> Result<PathBuf> {
        self.record("median_and_trim");
        Ok(dataset.join("Corrected"))
    }

    fn register(&self, _dataset: &Dataset, _plan: &ProcessPlan) -> Result<()> {
        self.record("register");
        if self.fail_register {
            return Err(LatticeError::PipelineStage {
                stage: "registration".into(),
                message: "calibration mismatch".into(),
            });
        }
        Ok(())
    }

    fn merge_mips(&self, _dataset: &Dataset) -> Result<()> {
        self.record("merge_mips");
        Ok(())
    }

    fn clean_stale_mips(&self, _dataset: &Dataset) -> Result<()> {
        self.record("clean_mips");
        if self.fail_cleanup {
            return Err(LatticeError::PipelineStage {
                stage: "MIP cleanup".into(),
                message: "file in use".into(),
            });
        }
        Ok(())
    }
}

/// Compression seam that records calls; never actually compresses.
pub struct RecordingCompression {
    pub log: EventLog,
    pub compressed: bool,
}

impl RecordingCompression {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            compressed: false,
        }
    }
}

impl Compression for RecordingCompression {
    fn is_compressed(&self, _path: &Path) -> bool {
        self.compressed
    }

    fn decompress(&self, _path: &Path) -> Result<()> {
        self.log.lock().unwrap().push("decompress".to_string());
        Ok(())
    }

    fn compress(&self, _path: &Path) -> Result<()> {
        self.log.lock().unwrap().push("compress".to_string());
        Ok(())
    }
}

pub fn complete_params(nc: usize, nt: usize) -> AcqParams {
    let mut p = AcqParams::new();
    p.dz = Some(0.5);
    p.dx = Some(0.104);
    p.set_angle(Some(31.5));
    p.nc = nc;
    p.nt = nt;
    p
}

pub fn ready_dataset(dir: &Path, nc: usize, nt: usize) -> Dataset {
    let mut d = Dataset::new(dir, complete_params(nc, nt), true);
    d.wavelengths = vec![488; nc];
    d
}
