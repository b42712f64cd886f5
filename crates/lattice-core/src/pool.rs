use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::error::{LatticeError, Result};
use crate::partition::WorkUnit;
use crate::pipeline::types::ItemReporter;
use crate::services::ArgAssembler;
use crate::worker::{CudaWorker, ExitKind, GpuSlot, WorkerEvent, WorkerHandle, POLL_INTERVAL};

/// Cooperative cancellation flag, safe to clone into signal handlers
/// or UI callbacks and request at any time.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a pool run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolOutcome {
    /// Every unit in the queue completed.
    Completed { units_done: usize },
    /// An abort request drained the pool; the queue was discarded.
    Aborted,
}

/// Binds a fixed set of GPU slots to subprocess workers fed from a
/// work-unit queue.
///
/// The pool is the single owner of all scheduling state: slot
/// occupancy, the queue, and every live [`WorkerHandle`]. Workers talk
/// back over one channel; [`GpuPool::run`] is the only consumer, so
/// all mutations are serialized through it. A slot is refilled only
/// once every slot has drained, so per-cycle throughput is bounded by
/// the slowest slot.
pub struct GpuPool<'a> {
    assembler: &'a dyn ArgAssembler,
    slots: BTreeMap<GpuSlot, Option<WorkerHandle>>,
    queue: VecDeque<WorkUnit>,
    total_units: usize,
}

impl<'a> GpuPool<'a> {
    pub fn new(
        gpus: &[u32],
        queue: VecDeque<WorkUnit>,
        assembler: &'a dyn ArgAssembler,
    ) -> Result<Self> {
        if gpus.is_empty() {
            return Err(LatticeError::Configuration(
                "no GPU slots configured".into(),
            ));
        }
        let total_units = queue.len();
        Ok(Self {
            assembler,
            slots: gpus.iter().map(|&g| (GpuSlot(g), None)).collect(),
            queue,
            total_units,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied(&self) -> usize {
        self.slots.values().filter(|h| h.is_some()).count()
    }

    fn all_idle(&self) -> bool {
        self.slots.values().all(Option::is_none)
    }

    /// Start a worker on every idle slot while units remain queued.
    fn start_cycle(&mut self, events: &Sender<WorkerEvent>) -> Result<()> {
        let slots: Vec<GpuSlot> = self.slots.keys().copied().collect();
        for slot in slots {
            if self.slots[&slot].is_some() {
                continue;
            }
            let Some(unit) = self.queue.pop_front() else {
                break;
            };
            let args = self.assembler.assemble(&unit);
            let env = vec![("CUDA_VISIBLE_DEVICES".to_string(), slot.0.to_string())];
            let handle = CudaWorker::spawn(self.assembler.binary(), args, env, slot, events.clone())?;
            self.slots.insert(slot, Some(handle));
        }
        Ok(())
    }

    fn abort_occupied(&mut self) {
        self.queue.clear();
        for handle in self.slots.values().flatten() {
            handle.abort();
        }
    }

    /// Dispatch the whole queue and block until it drains, an abort
    /// request is honored, or a fatal failure surfaces.
    ///
    /// On any fatal path (worker crash, launch failure mid-run) every
    /// in-flight worker is told to abort and the pool waits for all of
    /// them to report `finished` before the error is returned; the
    /// all-idle state is the proof that no external process is still
    /// alive. `label` names the item in status messages.
    pub fn run(
        &mut self,
        abort: &AbortFlag,
        reporter: &dyn ItemReporter,
        label: &str,
    ) -> Result<PoolOutcome> {
        if self.queue.is_empty() {
            return Ok(PoolOutcome::Completed { units_done: 0 });
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let total = self.total_units;
        reporter.begin_units(total);
        reporter.status(&format!("Processing {label}: (0 of {total})"));

        let started = Instant::now();
        let mut done = 0usize;
        let mut aborting = false;
        let mut failure: Option<LatticeError> = None;

        if let Err(e) = self.start_cycle(&tx) {
            if self.all_idle() {
                return Err(e);
            }
            warn!("worker launch failed, draining pool: {e}");
            failure = Some(e);
            aborting = true;
            self.abort_occupied();
        }

        loop {
            if !aborting && abort.is_requested() {
                info!("abort requested, draining {} worker(s)", self.occupied());
                aborting = true;
                self.abort_occupied();
                if self.all_idle() {
                    return Ok(PoolOutcome::Aborted);
                }
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(WorkerEvent::Started { slot }) => {
                    debug!(%slot, "slot busy");
                }
                Ok(WorkerEvent::UnitFinished { .. }) => {
                    done += 1;
                    reporter.unit_done(done.min(total), total);
                    reporter.status(&format!("Processing {label}: ({done} of {total})"));
                    let avg = started.elapsed() / done as u32;
                    let remaining = avg * total.saturating_sub(done) as u32;
                    reporter.eta(&format_hms(remaining));
                }
                Ok(WorkerEvent::Finished { slot, exit }) => {
                    if let Some(handle) = self.slots.get_mut(&slot).and_then(Option::take) {
                        handle.join();
                    }
                    debug!(%slot, ?exit, "slot idle");

                    if !aborting && !exit.is_clean() && exit != ExitKind::Aborted {
                        let code = match exit {
                            ExitKind::Exited(c) => Some(c),
                            _ => None,
                        };
                        failure = Some(LatticeError::SubprocessCrash {
                            slot: slot.0,
                            reason: if code.is_some() {
                                "exited abnormally".into()
                            } else {
                                "crashed".into()
                            },
                            code,
                        });
                        aborting = true;
                        self.abort_occupied();
                    }

                    if self.all_idle() {
                        if let Some(err) = failure.take() {
                            return Err(err);
                        }
                        if aborting {
                            return Ok(PoolOutcome::Aborted);
                        }
                        if !self.queue.is_empty() {
                            if let Err(e) = self.start_cycle(&tx) {
                                if self.all_idle() {
                                    return Err(e);
                                }
                                warn!("worker launch failed, draining pool: {e}");
                                failure = Some(e);
                                aborting = true;
                                self.abort_occupied();
                            }
                            continue;
                        }
                        return Ok(PoolOutcome::Completed { units_done: done });
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // We hold a sender, so this cannot happen.
                    return Err(LatticeError::Configuration(
                        "worker event channel closed".into(),
                    ));
                }
            }
        }
    }
}

/// Render a duration as `H:MM:SS`.
pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
