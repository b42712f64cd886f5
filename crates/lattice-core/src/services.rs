//! Seams to the collaborators this crate schedules but does not
//! implement: argument assembly for the GPU binary, the compression
//! pipeline, and the per-stage image operations. The item pipeline
//! only cares about success or failure of each call.

use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::partition::WorkUnit;
use crate::pipeline::config::ProcessPlan;

/// Turns one work unit into the literal argument list for one GPU
/// binary invocation. The vocabulary is the collaborator's business;
/// the scheduler treats the result as opaque.
pub trait ArgAssembler: Send + Sync {
    /// Resolved path to the GPU executable.
    fn binary(&self) -> &Path;

    fn assemble(&self, unit: &WorkUnit) -> Vec<String>;
}

/// Dataset compression, atomic and blocking from the caller's view.
/// Failures surface as `LatticeError::Compression` (or `PathTraversal`
/// when an archive entry escapes the dataset directory).
pub trait Compression: Send + Sync {
    fn is_compressed(&self, path: &Path) -> bool;

    fn decompress(&self, path: &Path) -> Result<()>;

    fn compress(&self, path: &Path) -> Result<()>;
}

/// Black-box image operations invoked between the scheduling stages.
pub trait StageOps: Send + Sync {
    /// Flash-artifact camera correction. Returns the corrected folder
    /// that processing continues from.
    fn correct_flash(&self, dataset: &Dataset, plan: &ProcessPlan) -> Result<PathBuf>;

    /// Median filter and/or edge trim. Returns the corrected folder
    /// that processing continues from.
    fn median_and_trim(&self, dataset: &Dataset, plan: &ProcessPlan) -> Result<PathBuf>;

    fn register(&self, dataset: &Dataset, plan: &ProcessPlan) -> Result<()>;

    fn merge_mips(&self, dataset: &Dataset) -> Result<()>;

    /// Remove merged-MIP artifacts left over from previous runs.
    fn clean_stale_mips(&self, dataset: &Dataset) -> Result<()>;
}
