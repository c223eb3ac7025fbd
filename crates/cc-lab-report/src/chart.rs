//! Backend-independent chart model built from materialized logs and series.

use cc_lab_abstract::{
    ImpairmentAxis, ImpairmentSetting, Metric, MetricLog, Strategy, SweepSeries,
};
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<SeriesSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub strategy: Strategy,
    pub label: String,
    pub color: [u8; 3],
    pub points: Vec<(f64, f64)>,
}

/// Colour used for `strategy` in every chart.
pub fn color_for(strategy: Strategy) -> [u8; 3] {
    match strategy {
        Strategy::Default => [214, 39, 40],
        Strategy::EventBased => [31, 119, 180],
        Strategy::PerformanceBased => [44, 160, 44],
    }
}

fn series_spec(strategy: Strategy, mut points: Vec<(f64, f64)>) -> SeriesSpec {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    SeriesSpec {
        strategy,
        label: strategy.display_name().to_string(),
        color: color_for(strategy),
        points,
    }
}

/// `metric` against its independent variable, one line per strategy.
pub fn fixed_chart(
    metric: Metric,
    setting: &ImpairmentSetting,
    traces: &[(Strategy, MetricLog)],
) -> ChartSpec {
    let mut series: Vec<SeriesSpec> = traces
        .iter()
        .map(|(strategy, log)| {
            series_spec(*strategy, log.samples.iter().map(|s| (s.x, s.y)).collect())
        })
        .collect();
    series.sort_by_key(|s| s.strategy);
    ChartSpec {
        title: format!("{} at {}", metric.title(), setting),
        x_label: metric.x_label().to_string(),
        y_label: metric.y_label().to_string(),
        series,
    }
}

/// Folded summary against the swept setting. Missing points are dropped
/// without moving the others.
pub fn swept_chart(metric: Metric, axis: ImpairmentAxis, series: &[&SweepSeries]) -> ChartSpec {
    let matching: Vec<&SweepSeries> = series
        .iter()
        .copied()
        .filter(|s| s.metric == metric)
        .collect();
    let reduction = matching
        .first()
        .map(|s| s.reduction)
        .unwrap_or(metric.default_reduction());
    let mut lines: Vec<SeriesSpec> = matching
        .iter()
        .map(|s| series_spec(s.strategy, s.measured().collect()))
        .collect();
    lines.sort_by_key(|s| s.strategy);
    ChartSpec {
        title: format!("{} vs {}", metric.title(), axis.display_name()),
        x_label: axis.display_name().to_string(),
        y_label: format!("{} {}", reduction.label(), metric.y_label()),
        series: lines,
    }
}

impl ChartSpec {
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }

    /// Axis ranges covering every point, padded so flat or empty charts still draw.
    pub fn bounds(&self) -> (Range<f64>, Range<f64>) {
        let points = || self.series.iter().flat_map(|s| s.points.iter().copied());
        let x = span(points().map(|p| p.0));
        let y = span(points().map(|p| p.1));

        let x = if x.start == x.end {
            x.start - 1.0..x.end + 1.0
        } else {
            x
        };
        let y = if y.start >= 0.0 {
            let top = if y.end > 0.0 { y.end * 1.05 } else { 1.0 };
            0.0..top
        } else {
            let pad = ((y.end - y.start) * 0.05).max(1.0);
            y.start - pad..y.end + pad
        };
        (x, y)
    }
}

fn span(values: impl Iterator<Item = f64>) -> Range<f64> {
    values
        .fold(None, |acc: Option<Range<f64>>, v| match acc {
            None => Some(v..v),
            Some(r) => Some(r.start.min(v)..r.end.max(v)),
        })
        .unwrap_or(0.0..1.0)
}
