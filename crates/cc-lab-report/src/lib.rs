pub mod chart;
pub mod render;

pub use chart::{ChartSpec, SeriesSpec, color_for, fixed_chart, swept_chart};
pub use render::render_svg;

use cc_lab_abstract::{
    ImpairmentAxis, ImpairmentSetting, LogLayout, Metric, MetricLog, ReportMode, Strategy,
    SweepSeries,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to draw {path}: {message}")]
    Draw { path: PathBuf, message: String },
    #[error("failed to encode chart data for {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Files written for one chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub svg: PathBuf,
    pub data: PathBuf,
}

/// Writes `<metric>-<mode>.svg` plus the chart model as `<metric>-<mode>.json`.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_chart(
        &self,
        mode: ReportMode,
        metric: Metric,
        spec: &ChartSpec,
    ) -> Result<Artifact, ReportError> {
        fs::create_dir_all(&self.dir).map_err(|source| ReportError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let svg = LogLayout::report_path(&self.dir, mode, metric, "svg");
        let data = LogLayout::report_path(&self.dir, mode, metric, "json");

        let json = serde_json::to_string_pretty(spec).map_err(|source| ReportError::Json {
            path: data.clone(),
            source,
        })?;
        fs::write(&data, json).map_err(|source| ReportError::Io {
            path: data.clone(),
            source,
        })?;
        render_svg(spec, &svg)?;

        info!(path = %svg.display(), points = spec.point_count(), "chart written");
        Ok(Artifact { svg, data })
    }

    pub fn fixed(
        &self,
        metric: Metric,
        setting: &ImpairmentSetting,
        traces: &[(Strategy, MetricLog)],
    ) -> Result<Artifact, ReportError> {
        self.write_chart(ReportMode::Fixed, metric, &fixed_chart(metric, setting, traces))
    }

    pub fn swept(
        &self,
        metric: Metric,
        axis: ImpairmentAxis,
        series: &[&SweepSeries],
    ) -> Result<Artifact, ReportError> {
        self.write_chart(ReportMode::Varied, metric, &swept_chart(metric, axis, series))
    }

    /// One swept chart per metric. A failed metric is logged and the rest still render.
    pub fn swept_all(
        &self,
        axis: ImpairmentAxis,
        series: &[SweepSeries],
    ) -> Vec<(Metric, Result<Artifact, ReportError>)> {
        Metric::ALL
            .into_iter()
            .map(|metric| {
                let of_metric: Vec<&SweepSeries> =
                    series.iter().filter(|s| s.metric == metric).collect();
                let result = self.swept(metric, axis, &of_metric);
                if let Err(e) = &result {
                    warn!(%metric, error = %e, "swept chart failed");
                }
                (metric, result)
            })
            .collect()
    }

    /// One fixed-condition chart per metric, with traces supplied by `load`.
    pub fn fixed_all<F>(
        &self,
        setting: &ImpairmentSetting,
        mut load: F,
    ) -> Vec<(Metric, Result<Artifact, ReportError>)>
    where
        F: FnMut(Metric) -> Vec<(Strategy, MetricLog)>,
    {
        Metric::ALL
            .into_iter()
            .map(|metric| {
                let result = self.fixed(metric, setting, &load(metric));
                if let Err(e) = &result {
                    warn!(%metric, error = %e, "fixed chart failed");
                }
                (metric, result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_lab_abstract::Reduction;

    fn series(strategy: Strategy, metric: Metric) -> SweepSeries {
        let mut s = SweepSeries::pending(
            strategy,
            metric,
            metric.default_reduction(),
            ImpairmentAxis::Bandwidth,
            &[10.0, 20.0],
        );
        s.record(0, 1.0 + f64::from(strategy.selector()));
        s.record(1, 2.0 + f64::from(strategy.selector()));
        s
    }

    #[test]
    fn writes_svg_and_chart_data_per_metric() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path().join("reports"));
        let all: Vec<SweepSeries> = Strategy::ALL
            .into_iter()
            .flat_map(|s| Metric::ALL.into_iter().map(move |m| series(s, m)))
            .collect();

        let results = generator.swept_all(ImpairmentAxis::Bandwidth, &all);
        assert_eq!(results.len(), 3);
        for (metric, result) in results {
            let artifact = result.unwrap();
            assert_eq!(
                artifact.svg,
                dir.path().join(format!("reports/{}-varied.svg", metric.as_str()))
            );
            let svg = fs::read_to_string(&artifact.svg).unwrap();
            assert!(svg.contains("<svg"));
            assert!(svg.contains("Vivace"));
            let data: ChartSpec =
                serde_json::from_str(&fs::read_to_string(&artifact.data).unwrap()).unwrap();
            assert_eq!(data.series.len(), 3);
        }
    }

    #[test]
    fn rerendering_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path());
        let s = series(Strategy::EventBased, Metric::Window);

        let first = generator.swept(Metric::Window, ImpairmentAxis::Bandwidth, &[&s]).unwrap();
        let before = fs::read(&first.data).unwrap();
        let second = generator.swept(Metric::Window, ImpairmentAxis::Bandwidth, &[&s]).unwrap();
        assert_eq!(fs::read(&second.data).unwrap(), before);
    }

    #[test]
    fn one_failing_metric_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path());
        // A directory squatting on the loss chart's data path makes that write fail.
        fs::create_dir_all(LogLayout::report_path(dir.path(), ReportMode::Fixed, Metric::Loss, "json"))
            .unwrap();
        let setting = ImpairmentSetting::drop_rate(1.0).unwrap();

        let results = generator.fixed_all(&setting, |metric| {
            let mut log = MetricLog::new(metric);
            log.push(0.0, 1.0);
            log.push(1.0, 2.0);
            vec![(Strategy::Default, log)]
        });
        let failed: Vec<Metric> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(m, _)| *m)
            .collect();
        assert_eq!(failed, vec![Metric::Loss]);
        assert!(LogLayout::report_path(dir.path(), ReportMode::Fixed, Metric::Latency, "svg").exists());
    }

    #[test]
    fn y_label_names_the_reduction() {
        let mut s = series(Strategy::Default, Metric::Latency);
        s.reduction = Reduction::Percentile { p: 95.0 };
        let spec = swept_chart(Metric::Latency, ImpairmentAxis::Bandwidth, &[&s]);
        assert!(spec.y_label.starts_with("p95"));
    }
}
