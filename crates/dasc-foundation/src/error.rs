use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Aggregate error surfaced by the assembly engine and its collaborators.
///
/// Each variant corresponds to one row of the error-handling table: origin,
/// and what the engine does about it, is documented on [`EngineError::recovery_strategy`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// C4 post-resample shape check failed. Not fatal to the process: the
    /// current chunk is flushed with what it has, carry is cleared, and a
    /// new chunk opens at the next packet.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Drift between the engine's expected write position and the incoming
    /// packet's timestamp exceeded the 0.5s consistency bound. Fatal: the
    /// operator must inspect before resuming.
    #[error("time inconsistency: expected {expected:.6}, packet implies {actual:.6} (delta {delta:.6}s)")]
    TimeInconsistency {
        expected: f64,
        actual: f64,
        delta: f64,
    },

    /// Resume found a non-terminal checkpoint but the on-disk chunk file it
    /// points to is missing. Fatal: never silently start fresh.
    #[error("checkpoint points at missing chunk file for chunk_time {0}")]
    RestoreMissing(f64),

    #[error("fatal: {0}")]
    Fatal(String),
}

/// How the top-level runner should respond to an [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Skip the offending packet and continue; the next packet will be
    /// classified as a Gap.
    SkipPacket,
    /// Flush the current chunk with what it has, clear carry, and open a
    /// fresh chunk at the next packet.
    FlushAndRestart,
    /// Propagate without touching the checkpoint; the next run reattempts.
    PropagateNoCheckpointUpdate,
    /// Abort the process; an operator must inspect before resuming.
    Abort,
}

impl EngineError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            EngineError::Io(IoError::Corrupt { .. }) => RecoveryStrategy::SkipPacket,
            EngineError::Io(_) => RecoveryStrategy::Abort,
            EngineError::ShapeMismatch(_) => RecoveryStrategy::FlushAndRestart,
            EngineError::TimeInconsistency { .. } => RecoveryStrategy::Abort,
            EngineError::RestoreMissing(_) => RecoveryStrategy::Abort,
            EngineError::Sink(_) => RecoveryStrategy::PropagateNoCheckpointUpdate,
            EngineError::Checkpoint(_) => RecoveryStrategy::PropagateNoCheckpointUpdate,
            EngineError::Config(_) => RecoveryStrategy::Abort,
            EngineError::Fatal(_) => RecoveryStrategy::Abort,
        }
    }
}

#[derive(Error, Debug)]
pub enum IoError {
    #[error("corrupt input {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("missing sidecar metadata for {path}")]
    MissingSidecar { path: PathBuf },

    #[error("unreadable directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    StdIo(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write chunk at {chunk_time}: {reason}")]
    Write { chunk_time: f64, reason: String },

    #[error("failed to read chunk at {chunk_time}: {reason}")]
    Read { chunk_time: f64, reason: String },

    #[error("io error: {0}")]
    StdIo(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("failed to persist checkpoint: {0}")]
    Write(String),

    #[error("failed to read checkpoint: {0}")]
    Read(String),

    #[error("io error: {0}")]
    StdIo(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration parsing error: {0}")]
    Parse(String),

    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("path not accessible: {0}")]
    PathNotAccessible(PathBuf),
}

/// A bound the engine must never exceed without failing loudly, paired with
/// the human-readable name used in error messages and logs.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceBound {
    pub name: &'static str,
    pub seconds: f64,
}

impl ToleranceBound {
    pub const fn new(name: &'static str, seconds: f64) -> Self {
        Self { name, seconds }
    }

    pub fn exceeded(&self, delta: Duration) -> bool {
        delta.as_secs_f64() > self.seconds
    }
}
