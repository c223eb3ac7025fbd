//! Running a sweep and folding its logs into per-strategy summary series.

use cc_lab_abstract::{
    ImpairmentAxis, LogLayout, Metric, MissingReason, ReductionConfig, Role, SeriesPoint, StreamId,
    Strategy, SweepPlan, SweepSeries,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use crate::error::{LogFormatError, SessionError};
use crate::impairment::ImpairmentController;
use crate::logs::read_metric_log;
use crate::netem::LinkEmulator;
use crate::session::{SessionExecutor, SessionRequest};

/// Shared flag checked between sessions. The in-flight session always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why one sweep point (or one metric of it) has no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFailure {
    pub strategy: Strategy,
    pub setting: f64,
    /// `None` when the whole session failed.
    pub metric: Option<Metric>,
    pub reason: MissingReason,
    pub message: String,
}

/// Everything a sweep produced, in sweep order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub axis: ImpairmentAxis,
    pub role: Role,
    pub settings: Vec<f64>,
    pub strategies: Vec<Strategy>,
    /// One series per (strategy, metric), strategies in plan order.
    pub series: Vec<SweepSeries>,
    pub failures: Vec<PointFailure>,
    /// False when the sweep was cancelled or points were never reached.
    pub completed: bool,
}

impl SweepReport {
    /// Report with every point pending.
    pub fn pending(plan: &SweepPlan, reductions: &ReductionConfig) -> Self {
        let settings = plan.setting_values();
        let series = plan
            .strategies
            .iter()
            .flat_map(|&strategy| {
                Metric::ALL.into_iter().map(move |metric| (strategy, metric))
            })
            .map(|(strategy, metric)| {
                SweepSeries::pending(
                    strategy,
                    metric,
                    reductions.for_metric(metric),
                    plan.axis,
                    &settings,
                )
            })
            .collect();
        Self {
            axis: plan.axis,
            role: plan.role,
            settings,
            strategies: plan.strategies.clone(),
            series,
            failures: Vec::new(),
            completed: false,
        }
    }

    pub fn series_for(&self, strategy: Strategy, metric: Metric) -> Option<&SweepSeries> {
        self.series
            .iter()
            .find(|s| s.strategy == strategy && s.metric == metric)
    }

    fn series_mut(&mut self, strategy: Strategy, metric: Metric) -> Option<&mut SweepSeries> {
        self.series
            .iter_mut()
            .find(|s| s.strategy == strategy && s.metric == metric)
    }

    /// Every strategy's series for `metric`, in plan order.
    pub fn metric_series(&self, metric: Metric) -> Vec<&SweepSeries> {
        self.series.iter().filter(|s| s.metric == metric).collect()
    }

    fn mark_remaining(&mut self, reason: MissingReason) {
        for series in &mut self.series {
            for idx in 0..series.len() {
                if series.points[idx].missing_reason() == Some(MissingReason::NotRun) {
                    series.record_missing(idx, reason);
                }
            }
        }
    }

    fn has_unrun_points(&self) -> bool {
        self.series.iter().any(|s| {
            s.points
                .iter()
                .any(|p| p.missing_reason() == Some(MissingReason::NotRun))
        })
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    pub fn load_json(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write one `setting value` line per point to each strategy's summary file.
    ///
    /// Missing points are written as `setting missing` so lines stay aligned
    /// with the sweep.
    pub fn export_summaries(&self, layout: &LogLayout) -> io::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.series.len());
        for series in &self.series {
            let path = layout.summary_path(series.strategy, series.metric);
            let mut out = String::new();
            for point in &series.points {
                let _ = match point {
                    SeriesPoint::Measured { setting, value } => writeln!(out, "{setting} {value}"),
                    SeriesPoint::Missing { setting, .. } => writeln!(out, "{setting} missing"),
                };
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, out)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Reduce one raw log to its summary value. `Ok(None)` means the log had no records.
///
/// The value is always finite; a reduction that overflows is a format error.
pub fn fold_point(
    layout: &LogLayout,
    strategy: Strategy,
    role: Role,
    stream: StreamId,
    metric: Metric,
    reductions: &ReductionConfig,
) -> Result<Option<f64>, LogFormatError> {
    let path = layout.path_for(strategy, role, stream, metric);
    let log = read_metric_log(&path, metric)?;
    let reduction = reductions.for_metric(metric);
    match log.reduce(reduction) {
        Some(value) if !value.is_finite() => Err(LogFormatError::NonFinite {
            path,
            reduction: reduction.label(),
            value,
        }),
        folded => Ok(folded),
    }
}

/// Drives sessions across a sweep against one shared link.
pub struct BenchRunner<L, E> {
    controller: ImpairmentController<L>,
    executor: E,
    reductions: ReductionConfig,
    cancel: CancelToken,
}

impl<L: LinkEmulator, E: SessionExecutor> BenchRunner<L, E> {
    pub fn new(controller: ImpairmentController<L>, executor: E, reductions: ReductionConfig) -> Self {
        Self {
            controller,
            executor,
            reductions,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn controller(&self) -> &ImpairmentController<L> {
        &self.controller
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Apply the request's setting, then run its session.
    pub(crate) async fn run_session(
        &mut self,
        request: &SessionRequest,
        layout: &LogLayout,
    ) -> Result<(), SessionError> {
        self.controller
            .apply_setting(&request.setting)
            .map_err(|source| SessionError::Impairment {
                setting: request.setting,
                source,
            })?;
        self.executor.execute(request, layout).await
    }

    pub(crate) fn clear_link(&mut self) {
        if let Err(e) = self.controller.clear() {
            warn!(error = %e, "failed to clear link impairment");
        }
    }

    /// Run every (setting, strategy) pair in order and fold the results.
    ///
    /// Per-point failures are recorded in the report and never abort the sweep.
    pub async fn run(&mut self, plan: &SweepPlan, layout: &LogLayout) -> SweepReport {
        let mut report = SweepReport::pending(plan, &self.reductions);
        let mut halted: HashSet<(Strategy, Metric)> = HashSet::new();
        info!(
            axis = %plan.axis,
            points = plan.len(),
            strategies = plan.strategies.len(),
            "sweep starting"
        );

        'points: for (index, setting) in plan.settings.iter().enumerate() {
            let stream = StreamId::for_point(index);
            for &strategy in &plan.strategies {
                if self.cancel.is_cancelled() {
                    warn!(%setting, "sweep cancelled");
                    break 'points;
                }
                let request = SessionRequest {
                    strategy,
                    setting: *setting,
                    stream,
                };
                info!(index, %setting, %strategy, "sweep point");
                match self.run_session(&request, layout).await {
                    Ok(()) => self.fold_into(&mut report, &mut halted, plan.role, index, &request, layout),
                    Err(e) => {
                        let reason = e.missing_reason();
                        warn!(%setting, %strategy, error = %e, "sweep point failed");
                        for metric in Metric::ALL {
                            let reason = if halted.contains(&(strategy, metric)) {
                                MissingReason::Halted
                            } else {
                                reason
                            };
                            if let Some(series) = report.series_mut(strategy, metric) {
                                series.record_missing(index, reason);
                            }
                        }
                        report.failures.push(PointFailure {
                            strategy,
                            setting: setting.value,
                            metric: None,
                            reason,
                            message: error_chain(&e),
                        });
                    }
                }
            }
        }

        self.clear_link();
        report.completed = !self.cancel.is_cancelled();
        if !report.completed {
            report.mark_remaining(MissingReason::Cancelled);
        }
        info!(
            completed = report.completed,
            failures = report.failures.len(),
            "sweep finished"
        );
        report
    }

    fn fold_into(
        &self,
        report: &mut SweepReport,
        halted: &mut HashSet<(Strategy, Metric)>,
        role: Role,
        index: usize,
        request: &SessionRequest,
        layout: &LogLayout,
    ) {
        let strategy = request.strategy;
        for metric in Metric::ALL {
            let outcome = if halted.contains(&(strategy, metric)) {
                Err(MissingReason::Halted)
            } else {
                match fold_point(layout, strategy, role, request.stream, metric, &self.reductions) {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(MissingReason::EmptyLog),
                    Err(e) if e.is_absent() => Err(MissingReason::EmptyLog),
                    Err(e) => {
                        error!(%strategy, %metric, error = %e, "malformed log, halting series");
                        halted.insert((strategy, metric));
                        report.failures.push(PointFailure {
                            strategy,
                            setting: request.setting.value,
                            metric: Some(metric),
                            reason: MissingReason::LogFormat,
                            message: e.to_string(),
                        });
                        Err(MissingReason::LogFormat)
                    }
                }
            };
            if let Some(series) = report.series_mut(strategy, metric) {
                match outcome {
                    Ok(value) => series.record(index, value),
                    Err(reason) => series.record_missing(index, reason),
                }
            }
        }
    }
}

/// Fold logs already on disk without launching any session.
///
/// Points whose log was never written stay [`MissingReason::NotRun`] and
/// leave the report incomplete.
pub fn fold_existing(plan: &SweepPlan, layout: &LogLayout, reductions: &ReductionConfig) -> SweepReport {
    let mut report = SweepReport::pending(plan, reductions);
    for &strategy in &plan.strategies {
        for metric in Metric::ALL {
            for (index, setting) in plan.settings.iter().enumerate() {
                let stream = StreamId::for_point(index);
                let result = fold_point(layout, strategy, plan.role, stream, metric, reductions);
                let Some(series) = report.series_mut(strategy, metric) else {
                    continue;
                };
                match result {
                    Ok(Some(value)) => series.record(index, value),
                    Ok(None) => series.record_missing(index, MissingReason::EmptyLog),
                    Err(e) if e.is_absent() => {}
                    Err(e) => {
                        error!(%strategy, %metric, error = %e, "malformed log, halting series");
                        series.record_missing(index, MissingReason::LogFormat);
                        for later in index + 1..series.len() {
                            series.record_missing(later, MissingReason::Halted);
                        }
                        report.failures.push(PointFailure {
                            strategy,
                            setting: setting.value,
                            metric: Some(metric),
                            reason: MissingReason::LogFormat,
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }
    report.completed = !report.has_unrun_points();
    report
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingLink, ScriptedSession};
    use cc_lab_abstract::Reduction;

    fn runner(session: ScriptedSession) -> BenchRunner<RecordingLink, ScriptedSession> {
        BenchRunner::new(
            ImpairmentController::new(RecordingLink::default()),
            session,
            ReductionConfig::default(),
        )
    }

    fn drop_rate_plan() -> SweepPlan {
        SweepPlan::new(
            ImpairmentAxis::DropRate,
            &[0.1, 0.6, 1.2],
            &Strategy::ALL,
            Role::Server,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn full_sweep_yields_aligned_series_in_sweep_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let mut runner = runner(ScriptedSession::new());
        let report = runner.run(&drop_rate_plan(), &layout).await;

        assert!(report.completed);
        assert!(report.failures.is_empty());
        assert_eq!(report.series.len(), 9);
        for metric in Metric::ALL {
            let series = report.metric_series(metric);
            assert_eq!(
                series.iter().map(|s| s.strategy).collect::<Vec<_>>(),
                Strategy::ALL.to_vec()
            );
            for s in series {
                assert_eq!(s.len(), 3);
                let expected: Vec<Option<f64>> = (0..3)
                    .map(|i| Some(ScriptedSession::expected(s.strategy, StreamId::for_point(i), metric)))
                    .collect();
                assert_eq!(s.values(), expected);
            }
        }

        let order: Vec<(f64, Strategy)> = runner
            .executor()
            .calls()
            .iter()
            .map(|r| (r.setting.value, r.strategy))
            .collect();
        assert_eq!(order[0], (0.1, Strategy::Default));
        assert_eq!(order[2], (0.1, Strategy::PerformanceBased));
        assert_eq!(order[3], (0.6, Strategy::Default));
        assert_eq!(order.len(), 9);
    }

    #[tokio::test]
    async fn timed_out_middle_point_becomes_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let session = ScriptedSession::new().time_out(Strategy::EventBased, StreamId(2));
        let report = runner(session).run(&drop_rate_plan(), &layout).await;

        let loss = report.series_for(Strategy::EventBased, Metric::Loss).unwrap();
        assert_eq!(loss.len(), 3);
        assert_eq!(loss.values()[1], None);
        assert_eq!(
            loss.points[1].missing_reason(),
            Some(MissingReason::SessionTimedOut)
        );
        assert!(loss.values()[0].is_some() && loss.values()[2].is_some());
        assert_eq!(report.failures.len(), 1);
        assert!(report.completed);

        let other = report.series_for(Strategy::Default, Metric::Loss).unwrap();
        assert!(other.values().iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn impairment_failure_skips_only_that_point() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let mut runner = BenchRunner::new(
            ImpairmentController::new(RecordingLink::default().rejecting_loss(0.6)),
            ScriptedSession::new(),
            ReductionConfig::default(),
        );
        let report = runner.run(&drop_rate_plan(), &layout).await;

        for strategy in Strategy::ALL {
            let window = report.series_for(strategy, Metric::Window).unwrap();
            assert_eq!(
                window.points[1].missing_reason(),
                Some(MissingReason::ImpairmentFailed)
            );
            assert!(window.points[2].value().is_some());
        }
        assert!(runner.controller().link().current().is_clear());
    }

    #[tokio::test]
    async fn malformed_log_halts_only_its_series() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let session = ScriptedSession::new().raw(
            Strategy::Default,
            StreamId(1),
            Metric::Window,
            "0.5 100\n0.2 200\n",
        );
        let report = runner(session).run(&drop_rate_plan(), &layout).await;

        let window = report.series_for(Strategy::Default, Metric::Window).unwrap();
        assert_eq!(window.points[0].missing_reason(), Some(MissingReason::LogFormat));
        assert_eq!(window.points[1].missing_reason(), Some(MissingReason::Halted));
        assert_eq!(window.points[2].missing_reason(), Some(MissingReason::Halted));

        let loss = report.series_for(Strategy::Default, Metric::Loss).unwrap();
        assert!(loss.values().iter().all(Option::is_some));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].metric, Some(Metric::Window));
    }

    #[tokio::test]
    async fn empty_log_is_a_sentinel_not_a_zero() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let session = ScriptedSession::new().raw(Strategy::Default, StreamId(3), Metric::Loss, "\n");
        let report = runner(session).run(&drop_rate_plan(), &layout).await;
        let loss = report.series_for(Strategy::Default, Metric::Loss).unwrap();
        assert_eq!(loss.points[2].missing_reason(), Some(MissingReason::EmptyLog));
    }

    #[tokio::test]
    async fn non_finite_values_never_become_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path().join("logs"));
        let session = ScriptedSession::new()
            .raw(Strategy::Default, StreamId(1), Metric::Window, "0.0 nan\n0.5 100\n")
            .raw(Strategy::EventBased, StreamId(1), Metric::Window, "0.0 1e308\n0.5 1e308\n");
        let reductions = ReductionConfig {
            window: Reduction::Sum,
            ..ReductionConfig::default()
        };
        let mut runner = BenchRunner::new(
            ImpairmentController::new(RecordingLink::default()),
            session,
            reductions,
        );
        let report = runner.run(&drop_rate_plan(), &layout).await;

        for strategy in [Strategy::Default, Strategy::EventBased] {
            let window = report.series_for(strategy, Metric::Window).unwrap();
            assert_eq!(window.points[0].missing_reason(), Some(MissingReason::LogFormat));
        }
        assert!(
            report
                .series
                .iter()
                .flat_map(|s| s.values())
                .flatten()
                .all(f64::is_finite)
        );

        let path = dir.path().join("sweep.json");
        report.write_json(&path).unwrap();
        assert_eq!(SweepReport::load_json(&path).unwrap(), report);
    }

    #[tokio::test]
    async fn empty_and_single_point_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());

        let empty = SweepPlan::new(ImpairmentAxis::Bandwidth, &[], &Strategy::ALL, Role::Server).unwrap();
        let report = runner(ScriptedSession::new()).run(&empty, &layout).await;
        assert!(report.completed);
        assert!(report.series.iter().all(SweepSeries::is_empty));

        let single = SweepPlan::new(ImpairmentAxis::Bandwidth, &[60.0], &Strategy::ALL, Role::Server).unwrap();
        let report = runner(ScriptedSession::new()).run(&single, &layout).await;
        assert!(report.series.iter().all(|s| s.len() == 1 && s.values()[0].is_some()));
    }

    #[tokio::test]
    async fn cancelled_sweep_marks_remaining_points() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut runner = runner(ScriptedSession::new()).with_cancel(cancel);
        let report = runner.run(&drop_rate_plan(), &layout).await;

        assert!(!report.completed);
        assert!(runner.executor().calls().is_empty());
        assert!(report.series.iter().all(|s| {
            s.len() == 3
                && s.points
                    .iter()
                    .all(|p| p.missing_reason() == Some(MissingReason::Cancelled))
        }));
    }

    #[tokio::test]
    async fn summaries_and_json_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path().join("logs"));
        let session = ScriptedSession::new().fail(Strategy::PerformanceBased, StreamId(1));
        let report = runner(session).run(&drop_rate_plan(), &layout).await;

        report.export_summaries(&layout).unwrap();
        let text =
            fs::read_to_string(layout.summary_path(Strategy::PerformanceBased, Metric::Loss)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0.1 missing");
        assert_eq!(lines[1], "0.6 32");

        let path = dir.path().join("reports/sweep.json");
        report.write_json(&path).unwrap();
        assert_eq!(SweepReport::load_json(&path).unwrap(), report);
    }

    #[tokio::test]
    async fn folding_existing_logs_matches_live_run() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let plan = drop_rate_plan();
        let live = runner(ScriptedSession::new()).run(&plan, &layout).await;

        let folded = fold_existing(&plan, &layout, &ReductionConfig::default());
        assert_eq!(folded.series, live.series);
        assert!(folded.completed);

        let longer = SweepPlan::new(
            ImpairmentAxis::DropRate,
            &[0.1, 0.6, 1.2, 2.0],
            &Strategy::ALL,
            Role::Server,
        )
        .unwrap();
        let partial = fold_existing(&longer, &layout, &ReductionConfig::default());
        assert!(!partial.completed);
    }

    #[tokio::test]
    async fn configured_reduction_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let reductions = ReductionConfig {
            window: Reduction::Max,
            ..ReductionConfig::default()
        };
        let mut runner = BenchRunner::new(
            ImpairmentController::new(RecordingLink::default()),
            ScriptedSession::new(),
            reductions,
        );
        let report = runner.run(&drop_rate_plan(), &layout).await;
        let window = report.series_for(Strategy::Default, Metric::Window).unwrap();
        assert_eq!(window.reduction, Reduction::Max);
        assert_eq!(
            window.values()[0],
            Some(ScriptedSession::expected(Strategy::Default, StreamId(1), Metric::Window) + 100.0)
        );
    }
}
