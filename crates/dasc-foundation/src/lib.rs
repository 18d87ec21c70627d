pub mod clock;
pub mod error;

pub use clock::{real_clock, test_clock, Clock, RealClock, SharedClock, TestClock};
pub use error::{CheckpointError, ConfigError, EngineError, IoError, RecoveryStrategy, SinkError, ToleranceBound};
