pub mod config;
pub mod impairment;
pub mod layout;
pub mod metric;
pub mod scenario;
pub mod series;
pub mod strategy;

pub use config::{
    BenchConfig, CommandTemplate, ConfigError, FixedConfig, LinkConfig, ReductionConfig,
    SessionConfig, SweepConfig,
};
pub use impairment::{ImpairmentAxis, ImpairmentSetting, InvalidSetting};
pub use layout::{LogLayout, ReportMode, StreamId};
pub use metric::{Metric, Reduction, Role};
pub use scenario::{ConfigOverride, FixedPlan, SweepPlan};
pub use series::{MetricLog, MissingReason, Sample, SeriesPoint, SweepSeries};
pub use strategy::Strategy;
