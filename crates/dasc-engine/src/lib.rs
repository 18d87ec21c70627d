pub mod classify;
pub mod engine;

pub use classify::{Classification, ClassificationKind, IMPLICIT_DRIFT_TOLERANCE_SECS, TIME_INCONSISTENCY_BOUND_SECS};
pub use engine::{next_midnight_after, AssemblyEngine, EngineConfig, DURATION_EPSILON};
