use std::fmt;

use serde::{Deserialize, Serialize};

/// Round to four decimal places, matching how the acquisition software
/// reports step sizes.
fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Camera region-of-interest boundary (left, top, bottom, right).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraRoi {
    pub left: u32,
    pub top: u32,
    pub bottom: u32,
    pub right: u32,
}

/// Annular illumination mask, when present in the acquisition settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnularMask {
    pub outer_na: f64,
    pub inner_na: f64,
}

/// Acquisition parameters for one dataset.
///
/// Stored fields come from the settings parser and are refined by the
/// directory scan (both collaborators, outside this crate). Derived
/// quantities (`dz_final`, `deskew`, `voxel`) are computed on read and
/// never stored, so they cannot drift from the fields they are derived
/// from and are read-only by construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AcqParams {
    /// Actual z step size used by the stage, regardless of scan mode.
    pub dz: Option<f64>,
    /// Pixel size.
    pub dx: Option<f64>,
    /// Sheet angle from the settings file, in degrees.
    angle: Option<f64>,
    /// Whether sample-scan (stage scanning) mode was used.
    samplescan: Option<bool>,
    /// False when channels have differing timepoint counts.
    pub decimated: bool,
    pub nc: usize,
    pub nt: usize,
    pub nz: usize,
    pub ny: Option<usize>,
    pub nx: Option<usize>,
    pub mask: Option<AnnularMask>,
    pub roi: Option<CameraRoi>,
}

impl AcqParams {
    pub fn new() -> Self {
        Self {
            nc: 1,
            nt: 1,
            nz: 1,
            ..Self::default()
        }
    }

    /// Set the sheet angle.
    ///
    /// A positive angle latches `samplescan` on. Zero or absent leaves
    /// `samplescan` untouched; the latch is one-way.
    pub fn set_angle(&mut self, angle: Option<f64>) {
        self.angle = angle;
        if let Some(a) = angle {
            if a > 0.0 {
                self.samplescan = Some(true);
            }
        }
    }

    pub fn set_samplescan(&mut self, samplescan: bool) {
        self.samplescan = Some(samplescan);
    }

    pub fn angle(&self) -> Option<f64> {
        self.angle
    }

    pub fn samplescan(&self) -> bool {
        self.samplescan.unwrap_or(false)
    }

    /// Effective z step after deskewing. In sample-scan mode the stage
    /// moves along the coverslip, so the z spacing of the deskewed
    /// volume is `dz * sin(angle)`.
    pub fn dz_final(&self) -> Option<f64> {
        let dz = self.dz?;
        let v = match (self.samplescan(), self.angle) {
            (true, Some(a)) if a != 0.0 => dz * (a * std::f64::consts::PI / 180.0).sin(),
            _ => dz,
        };
        Some(round4(v))
    }

    /// Deskew angle required: the sheet angle in sample-scan mode,
    /// zero otherwise.
    pub fn deskew(&self) -> f64 {
        match (self.samplescan(), self.angle) {
            (true, Some(a)) => a,
            _ => 0.0,
        }
    }

    /// Voxel size as (dz_final, dx, dx).
    pub fn voxel(&self) -> Option<(f64, f64, f64)> {
        let dz = self.dz_final()?;
        let dx = self.dx?;
        Some((dz, dx, dx))
    }

    /// Whether enough physical parameters are present to process.
    pub fn is_complete(&self) -> bool {
        self.dz.is_some() && self.dx.is_some()
    }
}

impl fmt::Display for AcqParams {
    // Stored fields only. Derived quantities are deliberately excluded
    // so printing never recurses through the derivation logic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dz:         {:?}", self.dz)?;
        writeln!(f, "dx:         {:?}", self.dx)?;
        writeln!(f, "angle:      {:?}", self.angle)?;
        writeln!(f, "samplescan: {:?}", self.samplescan)?;
        writeln!(f, "decimated:  {}", self.decimated)?;
        writeln!(f, "shape:      c={} t={} z={} y={:?} x={:?}", self.nc, self.nt, self.nz, self.ny, self.nx)?;
        writeln!(f, "mask:       {:?}", self.mask)?;
        write!(f, "roi:        {:?}", self.roi)
    }
}
