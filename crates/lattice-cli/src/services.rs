//! Stand-in collaborator implementations so the binary runs end to
//! end. Real deployments supply their own argument assembly,
//! compression, and image-operation backends.

use std::fs;
use std::path::{Path, PathBuf};

use lattice_core::dataset::Dataset;
use lattice_core::error::{LatticeError, Result};
use lattice_core::partition::WorkUnit;
use lattice_core::pipeline::config::ProcessPlan;
use lattice_core::services::{ArgAssembler, Compression, StageOps};

/// Flag-style argument assembly for the cudaDeconv binary.
pub struct CudaDeconvArgs {
    binary: PathBuf,
    iterations: u32,
    deskew: f64,
    save_deskewed_raw: bool,
}

impl CudaDeconvArgs {
    pub fn new(binary: PathBuf, iterations: u32, deskew: f64, save_deskewed_raw: bool) -> Self {
        Self {
            binary,
            iterations,
            deskew,
            save_deskewed_raw,
        }
    }
}

impl ArgAssembler for CudaDeconvArgs {
    fn binary(&self) -> &Path {
        &self.binary
    }

    fn assemble(&self, unit: &WorkUnit) -> Vec<String> {
        let mut args = vec![
            "--input-dir".to_string(),
            unit.input_dir.display().to_string(),
            "--filename-pattern".to_string(),
            unit.filter.to_string(),
            "--otf-file".to_string(),
            unit.otf.display().to_string(),
            "--background".to_string(),
            unit.background.to_string(),
            "--wavelength".to_string(),
            format!("{:.3}", unit.wavelength),
            "--RL".to_string(),
            self.iterations.to_string(),
        ];
        if self.deskew > 0.0 {
            args.push("--deskew".to_string());
            args.push(self.deskew.to_string());
            if self.save_deskewed_raw {
                args.push("--saveDeskewedRaw".to_string());
            }
        }
        args
    }
}

/// Compression seam with no backend wired up. Detects archives so
/// compressed datasets are reported rather than silently skipped.
pub struct ExternalCompression;

impl Compression for ExternalCompression {
    fn is_compressed(&self, path: &Path) -> bool {
        fs::read_dir(path)
            .map(|entries| {
                entries.flatten().any(|e| {
                    e.file_name()
                        .to_string_lossy()
                        .contains(".tar")
                })
            })
            .unwrap_or(false)
    }

    fn decompress(&self, _path: &Path) -> Result<()> {
        Err(LatticeError::Compression(
            "no decompression backend configured".into(),
        ))
    }

    fn compress(&self, _path: &Path) -> Result<()> {
        Err(LatticeError::Compression(
            "no compression backend configured".into(),
        ))
    }
}

/// Image-operation seam with no backend wired up, except stale-MIP
/// cleanup, which is plain filesystem work.
pub struct NoopStageOps;

const COMBO_MIP_MARKER: &str = "comboMIP_";

fn remove_combo_mips(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            remove_combo_mips(&path)?;
        } else if path
            .file_name()
            .map(|n| n.to_string_lossy().contains(COMBO_MIP_MARKER))
            .unwrap_or(false)
        {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

impl StageOps for NoopStageOps {
    fn correct_flash(&self, _dataset: &Dataset, _plan: &ProcessPlan) -> Result<PathBuf> {
        Err(LatticeError::PipelineStage {
            stage: "flash correction".into(),
            message: "no correction backend configured".into(),
        })
    }

    fn median_and_trim(&self, _dataset: &Dataset, _plan: &ProcessPlan) -> Result<PathBuf> {
        Err(LatticeError::PipelineStage {
            stage: "median/trim".into(),
            message: "no correction backend configured".into(),
        })
    }

    fn register(&self, _dataset: &Dataset, _plan: &ProcessPlan) -> Result<()> {
        Err(LatticeError::PipelineStage {
            stage: "registration".into(),
            message: "no registration backend configured".into(),
        })
    }

    fn merge_mips(&self, _dataset: &Dataset) -> Result<()> {
        Err(LatticeError::PipelineStage {
            stage: "MIP merge".into(),
            message: "no MIP backend configured".into(),
        })
    }

    fn clean_stale_mips(&self, dataset: &Dataset) -> Result<()> {
        remove_combo_mips(&dataset.path)
    }
}
