//! A/B experimentation: variant generation, live metric tracking,
//! normal-approximation statistics, and heuristic alerting.

pub mod alerts;
pub mod engine;
pub mod metrics;
pub mod statistics;
pub mod variants;

pub use alerts::{AlertEngine, AlertSeverity, AlertType, PerformanceAlert};
pub use engine::ExperimentEngine;
pub use metrics::{
    spawn_snapshot_task, MetricCounts, MetricKind, MetricTracker, PerformanceMetric,
    TestPerformanceSnapshot, TestSummary, VariantSnapshot,
};
pub use statistics::{StatisticalAnalysis, StatisticalAnalyzer, TestArm};
pub use variants::{
    ChangeField, ChangeRequest, ImpactLevel, Suggestion, TargetMetric, TemplateVariation,
    TestVariant, VariantGenerator, VariationChange,
};
