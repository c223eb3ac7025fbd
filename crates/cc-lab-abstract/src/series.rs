use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::impairment::ImpairmentAxis;
use crate::metric::{Metric, Reduction};
use crate::strategy::Strategy;

/// One record of a metric log: independent variable `x`, measured value `y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
}

/// Time series captured for one (strategy, role, stream, metric).
///
/// The writer never enforces ordering; [`MetricLog::first_regression`] is
/// consulted when the log is read back for aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricLog {
    pub metric: Metric,
    pub samples: Vec<Sample>,
}

impl MetricLog {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.samples.push(Sample { x, y });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index of the first record whose `x` is smaller than its predecessor's.
    /// A NaN on either side counts as a regression.
    pub fn first_regression(&self) -> Option<usize> {
        self.samples
            .windows(2)
            .position(|pair| {
                !matches!(
                    pair[1].x.partial_cmp(&pair[0].x),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            })
            .map(|idx| idx + 1)
    }

    pub fn is_monotonic(&self) -> bool {
        self.first_regression().is_none()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.y).collect()
    }

    pub fn reduce(&self, reduction: Reduction) -> Option<f64> {
        reduction.apply(&self.values())
    }
}

/// Why a sweep point carries no measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    /// The point was never reached.
    NotRun,
    /// The sweep was cancelled before this point ran.
    Cancelled,
    /// The emulated link could not be configured.
    ImpairmentFailed,
    /// A peer failed to start or exited unsuccessfully.
    SessionFailed,
    SessionTimedOut,
    /// The log was present and well formed but had no records.
    EmptyLog,
    /// The log violated the column or ordering invariant.
    LogFormat,
    /// An earlier malformed log stopped aggregation of this series.
    Halted,
}

/// One entry of a [`SweepSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeriesPoint {
    Measured { setting: f64, value: f64 },
    Missing { setting: f64, reason: MissingReason },
}

impl SeriesPoint {
    pub fn setting(&self) -> f64 {
        match self {
            SeriesPoint::Measured { setting, .. } | SeriesPoint::Missing { setting, .. } => {
                *setting
            }
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            SeriesPoint::Measured { value, .. } => Some(*value),
            SeriesPoint::Missing { .. } => None,
        }
    }

    pub fn missing_reason(&self) -> Option<MissingReason> {
        match self {
            SeriesPoint::Measured { .. } => None,
            SeriesPoint::Missing { reason, .. } => Some(*reason),
        }
    }
}

/// Folded summary of one strategy and one metric across a sweep.
///
/// Always holds exactly one point per swept setting, in sweep order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSeries {
    pub strategy: Strategy,
    pub metric: Metric,
    pub reduction: Reduction,
    pub axis: ImpairmentAxis,
    pub points: Vec<SeriesPoint>,
}

impl SweepSeries {
    /// A series with every point marked [`MissingReason::NotRun`].
    pub fn pending(
        strategy: Strategy,
        metric: Metric,
        reduction: Reduction,
        axis: ImpairmentAxis,
        settings: &[f64],
    ) -> Self {
        let points = settings
            .iter()
            .map(|&setting| SeriesPoint::Missing {
                setting,
                reason: MissingReason::NotRun,
            })
            .collect();
        Self {
            strategy,
            metric,
            reduction,
            axis,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn record(&mut self, index: usize, value: f64) {
        let setting = self.points[index].setting();
        self.points[index] = SeriesPoint::Measured { setting, value };
    }

    pub fn record_missing(&mut self, index: usize, reason: MissingReason) {
        let setting = self.points[index].setting();
        self.points[index] = SeriesPoint::Missing { setting, reason };
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(SeriesPoint::value).collect()
    }

    /// Only the measured `(setting, value)` pairs, still in sweep order.
    pub fn measured(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points
            .iter()
            .filter_map(|p| p.value().map(|v| (p.setting(), v)))
    }
}
