/// Item processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemStage {
    Decompressing,
    PreProcessing,
    GpuProcessing,
    Registering,
    MergingMips,
    Relocating,
    Compressing,
    WritingLog,
}

impl std::fmt::Display for ItemStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decompressing => write!(f, "Decompressing"),
            Self::PreProcessing => write!(f, "Pre-processing"),
            Self::GpuProcessing => write!(f, "Deskew / deconvolution"),
            Self::Registering => write!(f, "Channel registration"),
            Self::MergingMips => write!(f, "Merging MIPs"),
            Self::Relocating => write!(f, "Relocating output"),
            Self::Compressing => write!(f, "Compressing raw data"),
            Self::WritingLog => write!(f, "Writing processing log"),
        }
    }
}

/// Terminal outcome of one item. Exactly one is produced per item
/// (errors travel separately, through `Result`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Finished,
    Skipped(String),
    Aborted,
}

/// Thread-safe progress reporting for item processing.
///
/// Implementors can drive progress bars, status lines, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ItemReporter: Send + Sync {
    /// Free-text status update ("Processing foo: (3 of 8)").
    fn status(&self, _message: &str) {}

    /// GPU dispatch is starting with this many work units.
    fn begin_units(&self, _total: usize) {}

    /// One work unit has completed.
    fn unit_done(&self, _done: usize, _total: usize) {}

    /// Updated estimate of time remaining, as `H:MM:SS`.
    fn eta(&self, _remaining: &str) {}
}

/// No-op reporter for headless callers and tests.
pub struct NoOpReporter;
impl ItemReporter for NoOpReporter {}
