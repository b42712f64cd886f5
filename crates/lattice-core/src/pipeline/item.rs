use std::fs;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::params::AcqParams;
use crate::partition::{build_queue, ChannelSpec};
use crate::pool::{AbortFlag, GpuPool, PoolOutcome};
use crate::services::{ArgAssembler, Compression, StageOps};
use crate::worker;

use super::config::ProcessPlan;
use super::types::{ItemOutcome, ItemReporter, ItemStage};

/// Intermediate folder produced by the pre-processing transforms.
const CORRECTED_DIR: &str = "Corrected";

/// Written next to the dataset on success when `write_log` is set.
const LOG_SUFFIX: &str = "processing_log.json";

#[derive(Serialize)]
struct ProcessingLog<'a> {
    params: &'a AcqParams,
    plan: &'a ProcessPlan,
}

/// Drive one dataset through the full processing sequence:
/// decompression, readiness check, pre-processing, GPU dispatch, and
/// the post-processing stages.
///
/// Returns exactly one terminal outcome (`Finished`, `Skipped`,
/// `Aborted`) or one error, never both and never more than one, so a
/// driving caller can reliably advance to the next item. An abort
/// honored during GPU work drains every subprocess first and skips
/// post-processing entirely.
///
/// `dataset.path` is updated in place when pre-processing redirects
/// work into a corrected folder, and again when that folder's contents
/// are relocated afterwards.
pub fn process_item(
    dataset: &mut Dataset,
    plan: &ProcessPlan,
    assembler: &dyn ArgAssembler,
    compression: &dyn Compression,
    ops: &dyn StageOps,
    reporter: &dyn ItemReporter,
    abort: &AbortFlag,
) -> Result<ItemOutcome> {
    let basename = dataset.basename();

    if compression.is_compressed(&dataset.path) {
        reporter.status(&format!("{}: {basename}", ItemStage::Decompressing));
        compression.decompress(&dataset.path)?;
    }

    if !dataset.is_ready() {
        let reason = if !dataset.has_raw_data {
            warn!("no raw stacks to process in {}", dataset.path.display());
            "no raw data found".to_string()
        } else {
            warn!("incomplete parameters for {}", dataset.path.display());
            "incomplete acquisition parameters".to_string()
        };
        return Ok(ItemOutcome::Skipped(reason));
    }

    info!("processing {basename}");
    debug!("full path: {}", dataset.path.display());
    debug!("parameters:\n{}", dataset.params);

    let deskew = dataset.params.deskew();

    // Resolve the binary before any stage runs, so a missing
    // executable never leaves partial state behind.
    if plan.needs_gpu(deskew) {
        worker::check_binary(assembler.binary())?;
    }

    if plan.correct_flash {
        reporter.status(&format!("Correcting flash artifact on {basename}"));
        dataset.path = ops.correct_flash(dataset, plan)?;
    } else if plan.median_filter || plan.trim.map(|t| !t.is_noop()).unwrap_or(false) {
        reporter.status(&format!("{}: {basename}", ItemStage::PreProcessing));
        dataset.path = ops.median_and_trim(dataset, plan)?;
    }

    if plan.needs_gpu(deskew) {
        reporter.status(&format!("{}: {basename}", ItemStage::GpuProcessing));
        let channels = resolve_channels(dataset, plan);
        let timepoints: Vec<usize> = plan
            .t_range
            .clone()
            .unwrap_or_else(|| (0..dataset.params.nt).collect());

        let queue = build_queue(
            &dataset.path,
            &channels,
            &timepoints,
            dataset.params.nt,
            plan.gpus.len(),
        );

        if queue.is_empty() {
            error!("no channel arguments to process in {basename}");
            return Ok(ItemOutcome::Finished);
        }

        let mut pool = GpuPool::new(&plan.gpus, queue, assembler)?;
        match pool.run(abort, reporter, &basename)? {
            PoolOutcome::Aborted => return Ok(ItemOutcome::Aborted),
            PoolOutcome::Completed { units_done } => {
                debug!("GPU stage complete: {units_done} unit(s)");
            }
        }
    }

    post_process(dataset, plan, compression, ops, reporter)?;
    Ok(ItemOutcome::Finished)
}

fn resolve_channels(dataset: &Dataset, plan: &ProcessPlan) -> Vec<ChannelSpec> {
    let range: Vec<usize> = plan
        .c_range
        .clone()
        .unwrap_or_else(|| (0..dataset.params.nc).collect());

    range
        .iter()
        .enumerate()
        .map(|(i, &channel)| ChannelSpec {
            channel,
            otf: plan.otfs.get(i).cloned().unwrap_or_default(),
            // Flash correction already subtracts the camera background.
            background: if plan.correct_flash {
                0
            } else {
                plan.backgrounds.get(i).copied().unwrap_or(0)
            },
            wavelength: dataset
                .wavelengths
                .get(channel)
                .map(|&nm| f64::from(nm) / 1000.0)
                .unwrap_or(0.0),
        })
        .collect()
}

fn post_process(
    dataset: &mut Dataset,
    plan: &ProcessPlan,
    compression: &dyn Compression,
    ops: &dyn StageOps,
    reporter: &dyn ItemReporter,
) -> Result<()> {
    let basename = dataset.basename();

    if plan.registration.is_some() {
        reporter.status(&format!("{}: {basename}", ItemStage::Registering));
        if let Err(e) = ops.register(dataset, plan) {
            error!("registration failed for {basename}");
            return Err(e);
        }
    }

    if plan.merge_mips {
        reporter.status(&format!("{}: {basename}", ItemStage::MergingMips));
        ops.merge_mips(dataset)?;
    } else if let Err(e) = ops.clean_stale_mips(dataset) {
        // Leftover merged MIPs are cosmetic; never fail the item.
        warn!("could not clean stale MIPs for {basename}: {e}");
    }

    if plan.move_corrected && dataset.path.ends_with(CORRECTED_DIR) {
        reporter.status(&format!("{}: {basename}", ItemStage::Relocating));
        relocate_corrected(&mut dataset.path)?;
    }

    if !plan.keep_corrected {
        let _ = fs::remove_dir_all(dataset.join(CORRECTED_DIR));
    }

    if plan.compress_raw {
        reporter.status(&format!("{}: {basename}", ItemStage::Compressing));
        compression.compress(&dataset.path)?;
    }

    if plan.write_log {
        reporter.status(&format!("{}: {basename}", ItemStage::WritingLog));
        if let Err(e) = write_processing_log(dataset, plan) {
            warn!("could not write processing log for {basename}: {e}");
        }
    }

    Ok(())
}

/// Move everything out of a `Corrected/` folder into its parent, then
/// point the dataset back at the parent.
fn relocate_corrected(path: &mut std::path::PathBuf) -> Result<()> {
    let parent = match path.parent() {
        Some(p) => p.to_path_buf(),
        None => return Ok(()),
    };
    for entry in fs::read_dir(&*path)? {
        let entry = entry?;
        let dest = parent.join(entry.file_name());
        fs::rename(entry.path(), dest)?;
    }
    fs::remove_dir(&*path)?;
    *path = parent;
    Ok(())
}

fn write_processing_log(dataset: &Dataset, plan: &ProcessPlan) -> Result<()> {
    let name = format!("{}_{LOG_SUFFIX}", dataset.basename());
    let log = ProcessingLog {
        params: &dataset.params,
        plan,
    };
    let contents = serde_json::to_string_pretty(&log)?;
    fs::write(dataset.join(&name), contents)?;
    Ok(())
}
