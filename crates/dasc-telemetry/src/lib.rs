pub mod pipeline_metrics;

pub use pipeline_metrics::{ClassificationKind, FpsTracker, PipelineMetrics};
