use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::params::AcqParams;

/// One acquisition directory plus everything the collaborators learned
/// about it: parsed settings, directory-scan shape, and whether raw
/// stacks were actually found.
///
/// Construction belongs to the settings parser and filename scanner;
/// this crate only consumes the result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dataset {
    pub path: PathBuf,
    pub params: AcqParams,
    /// True when the filename scanner found raw stacks to process.
    pub has_raw_data: bool,
    /// Emission wavelength per channel in nm, from the filename scanner.
    pub wavelengths: Vec<u32>,
    /// Acquisition timestamp, from the settings file when available.
    pub acquired: Option<SystemTime>,
}

impl Dataset {
    pub fn new(path: impl Into<PathBuf>, params: AcqParams, has_raw_data: bool) -> Self {
        Self {
            path: path.into(),
            params,
            has_raw_data,
            wavelengths: Vec::new(),
            acquired: None,
        }
    }

    /// True when the dataset has raw data and enough parameters to process.
    pub fn is_ready(&self) -> bool {
        self.has_raw_data && self.params.is_complete()
    }

    /// Final path component, used in status messages and the log name.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Age of the dataset in whole days, if the acquisition date is known.
    pub fn age_days(&self) -> Option<u64> {
        let acquired = self.acquired?;
        let elapsed = SystemTime::now().duration_since(acquired).ok()?;
        Some(elapsed.as_secs() / 86_400)
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }
}
