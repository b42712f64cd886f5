use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything one processing run needs beyond the dataset itself.
///
/// Loaded from TOML or assembled by the driving caller. Channel-indexed
/// vectors (`otfs`, `backgrounds`) are parallel to the requested
/// channel range.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessPlan {
    /// GPU device indices to dispatch across.
    pub gpus: Vec<u32>,
    /// Timepoints to process; `None` means all.
    #[serde(default)]
    pub t_range: Option<Vec<usize>>,
    /// Channels to process; `None` means all.
    #[serde(default)]
    pub c_range: Option<Vec<usize>>,
    /// Richardson-Lucy iterations. Zero disables deconvolution.
    #[serde(default)]
    pub n_iters: u32,
    /// Keep a deskewed copy of the raw data.
    #[serde(default)]
    pub save_deskewed_raw: bool,
    /// One OTF per requested channel.
    #[serde(default)]
    pub otfs: Vec<PathBuf>,
    /// Camera background per requested channel. Forced to zero when
    /// flash correction runs, since correction already subtracts it.
    #[serde(default)]
    pub backgrounds: Vec<i32>,
    #[serde(default)]
    pub correct_flash: bool,
    #[serde(default)]
    pub median_filter: bool,
    #[serde(default)]
    pub trim: Option<TrimConfig>,
    pub registration: Option<RegistrationConfig>,
    #[serde(default)]
    pub merge_mips: bool,
    /// Move processed folders out of `Corrected/` when done.
    #[serde(default)]
    pub move_corrected: bool,
    /// Keep the intermediate `Corrected/` folder.
    #[serde(default)]
    pub keep_corrected: bool,
    #[serde(default)]
    pub compress_raw: bool,
    /// Write a JSON processing log next to the dataset on success.
    #[serde(default)]
    pub write_log: bool,
}

impl Default for ProcessPlan {
    fn default() -> Self {
        Self {
            gpus: vec![0],
            t_range: None,
            c_range: None,
            n_iters: 0,
            save_deskewed_raw: false,
            otfs: Vec::new(),
            backgrounds: Vec::new(),
            correct_flash: false,
            median_filter: false,
            trim: None,
            registration: None,
            merge_mips: false,
            move_corrected: false,
            keep_corrected: false,
            compress_raw: false,
            write_log: false,
        }
    }
}

impl ProcessPlan {
    /// Whether the GPU binary needs to run at all: deconvolution was
    /// requested, or a deskewed copy of the raw data was.
    pub fn needs_gpu(&self, deskew: f64) -> bool {
        self.n_iters > 0 || (deskew > 0.0 && self.save_deskewed_raw)
    }

    /// Whether any pre-processing transform was requested.
    pub fn needs_preprocessing(&self) -> bool {
        self.correct_flash || self.median_filter || self.trim.is_some()
    }
}

/// Edge trim in pixels, (low, high) per axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimConfig {
    #[serde(default)]
    pub x: (u32, u32),
    #[serde(default)]
    pub y: (u32, u32),
    #[serde(default)]
    pub z: (u32, u32),
}

impl TrimConfig {
    pub fn is_noop(&self) -> bool {
        self.x == (0, 0) && self.y == (0, 0) && self.z == (0, 0)
    }
}

/// Channel registration settings, opaque to the scheduler and handed
/// to the registration collaborator as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Reference wavelength in nm.
    pub ref_wave: u32,
    pub mode: String,
    pub calib_path: PathBuf,
    #[serde(default)]
    pub discard_unregistered: bool,
}
