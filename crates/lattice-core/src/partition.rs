use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Selects which files of a dataset one GPU invocation operates on:
/// a single channel, optionally restricted to a timepoint subset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub channel: usize,
    /// `None` selects every timepoint of the channel.
    pub timepoints: Option<Vec<usize>>,
}

impl fmt::Display for FileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.timepoints {
            None => write!(f, "_ch{}_", self.channel),
            Some(ts) => {
                let alts: Vec<String> = ts.iter().map(|t| format!("{t:04}")).collect();
                write!(f, "_ch{}_stack({})", self.channel, alts.join("|"))
            }
        }
    }
}

/// One external-process invocation's argument set. Immutable once
/// built; owned by the queue until dispatched, then by exactly one
/// worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub input_dir: PathBuf,
    pub otf: PathBuf,
    pub background: i32,
    pub wavelength: f64,
    pub filter: FileFilter,
}

/// Per-channel inputs the partitioner needs but does not derive:
/// which OTF, background and wavelength apply to that channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub channel: usize,
    pub otf: PathBuf,
    pub background: i32,
    pub wavelength: f64,
}

/// Split `items` into `n` contiguous chunks whose sizes differ by at
/// most one, earlier chunks taking the extra elements.
pub fn split_balanced(items: &[usize], n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let k = items.len() / n;
    let m = items.len() % n;
    (0..n)
        .map(|i| {
            let start = i * k + i.min(m);
            let end = (i + 1) * k + (i + 1).min(m);
            items[start..end].to_vec()
        })
        .collect()
}

/// Build the channel-major queue of work units for one dataset.
///
/// When the slot count does not exceed the number of requested
/// timepoints, each channel's timepoints are split into `gpu_count`
/// balanced sub-ranges, one unit each. A sub-range covering the whole
/// channel drops the timepoint restriction so the process can stream
/// the channel without a filter. With more slots than timepoints a
/// single whole-channel unit is emitted per channel instead.
///
/// Deterministic: identical inputs produce an identical queue.
pub fn build_queue(
    input_dir: &Path,
    channels: &[ChannelSpec],
    timepoints: &[usize],
    nt_total: usize,
    gpu_count: usize,
) -> VecDeque<WorkUnit> {
    let mut queue = VecDeque::new();

    for spec in channels {
        let unit = |timepoints: Option<Vec<usize>>| WorkUnit {
            input_dir: input_dir.to_path_buf(),
            otf: spec.otf.clone(),
            background: spec.background,
            wavelength: spec.wavelength,
            filter: FileFilter {
                channel: spec.channel,
                timepoints,
            },
        };

        if gpu_count <= timepoints.len() {
            for sub in split_balanced(timepoints, gpu_count) {
                if sub.is_empty() {
                    continue;
                }
                if sub.len() == nt_total {
                    queue.push_back(unit(None));
                } else {
                    queue.push_back(unit(Some(sub)));
                }
            }
        } else {
            // More slots than timepoints: one process streams the whole
            // channel rather than splitting a handful of stacks.
            queue.push_back(unit(None));
        }
    }

    queue
}
