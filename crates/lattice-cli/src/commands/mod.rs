pub mod info;
pub mod process;

use std::path::Path;

use anyhow::{bail, Result};
use lattice_core::dataset::Dataset;
use lattice_core::params::AcqParams;

/// Shared dataset flags for subcommands that open an acquisition
/// directory. Settings-file parsing lives outside the scheduler, so
/// physical parameters come in on the command line.
#[derive(clap::Args)]
pub struct DatasetArgs {
    /// Acquisition directory
    pub dir: std::path::PathBuf,

    /// Z step size in um
    #[arg(long)]
    pub dz: Option<f64>,

    /// Pixel size in um
    #[arg(long)]
    pub dx: Option<f64>,

    /// Sheet angle in degrees (a positive angle implies sample scan)
    #[arg(long)]
    pub angle: Option<f64>,

    /// Number of channels
    #[arg(long, default_value = "1")]
    pub channels: usize,

    /// Number of timepoints
    #[arg(long, default_value = "1")]
    pub timepoints: usize,

    /// Comma-separated emission wavelengths in nm, one per channel
    #[arg(long)]
    pub wavelengths: Option<String>,
}

impl DatasetArgs {
    pub fn open(&self) -> Result<Dataset> {
        if !self.dir.is_dir() {
            bail!("not a directory: {}", self.dir.display());
        }

        let mut params = AcqParams::new();
        params.dz = self.dz;
        params.dx = self.dx;
        params.set_angle(self.angle);
        params.nc = self.channels;
        params.nt = self.timepoints;

        let mut dataset = Dataset::new(&self.dir, params, has_tiffs(&self.dir)?);
        if let Some(ref w) = self.wavelengths {
            dataset.wavelengths = w
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
        }
        Ok(dataset)
    }
}

fn has_tiffs(dir: &Path) -> Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        {
            return Ok(true);
        }
    }
    Ok(false)
}
