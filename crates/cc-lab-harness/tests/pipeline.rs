use cc_lab_abstract::{
    BenchConfig, ConfigOverride, ImpairmentAxis, LogLayout, Metric, MissingReason, StreamId,
    Strategy,
};
use cc_lab_harness::testing::{RecordingLink, ScriptedSession};
use cc_lab_harness::{
    ArchiveError, BenchRunner, CancelToken, ImpairmentController, SweepReport, archive_sweep,
    fold_existing, load_fixed_logs,
};
use cc_lab_report::{ChartSpec, ReportGenerator, swept_chart};
use std::fs;

fn config(root: &std::path::Path) -> BenchConfig {
    let mut config = BenchConfig::default();
    ConfigOverride {
        axis: Some(ImpairmentAxis::DropRate),
        values: Some(vec![0.1, 0.6, 1.2]),
        log_root: Some(root.join("logs")),
        report_dir: Some(root.join("reports")),
        ..ConfigOverride::default()
    }
    .apply_to(&mut config);
    config.archive_root = root.join("archive");
    config.fixed.log_root = root.join("logs-fixed");
    config.validate().unwrap();
    config
}

#[tokio::test]
async fn sweep_report_and_archive() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let layout = config.layout();
    let plan = config.sweep_plan().unwrap();

    let session = ScriptedSession::new().time_out(Strategy::EventBased, StreamId(2));
    let mut runner = BenchRunner::new(
        ImpairmentController::new(RecordingLink::default()),
        session,
        config.reductions,
    );
    let report = runner.run(&plan, &layout).await;
    assert!(report.completed);
    for series in &report.series {
        assert_eq!(series.len(), 3);
    }

    report.export_summaries(&layout).unwrap();
    let json = LogLayout::sweep_report_path(&config.report_dir);
    report.write_json(&json).unwrap();

    // Re-rendering from disk gives the same chart model as the live report.
    let reloaded = SweepReport::load_json(&json).unwrap();
    let live = swept_chart(Metric::Loss, report.axis, &report.metric_series(Metric::Loss));
    let again = swept_chart(Metric::Loss, reloaded.axis, &reloaded.metric_series(Metric::Loss));
    assert_eq!(live, again);
    assert_eq!(live.series[1].points.len(), 2);

    let generator = ReportGenerator::new(&config.report_dir);
    for (_, result) in generator.swept_all(report.axis, &report.series) {
        result.unwrap();
    }
    let data: ChartSpec = serde_json::from_str(
        &fs::read_to_string(config.report_dir.join("window-varied.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(data.x_label, "Drop Rate (%)");

    let moved = archive_sweep(&report, &layout, &config.archive_root).unwrap();
    assert_eq!(moved.len(), 3);
    assert!(!layout.strategy_dir(Strategy::Default).exists());

    // The archive mirrors the raw tree, so it can be folded again.
    let archived = LogLayout::new(LogLayout::archive_dir(&config.archive_root, ImpairmentAxis::DropRate));
    let refolded = fold_existing(&plan, &archived, &config.reductions);
    let loss = refolded.series_for(Strategy::EventBased, Metric::Loss).unwrap();
    assert_eq!(loss.points[1].missing_reason(), Some(MissingReason::NotRun));
    assert_eq!(
        refolded.series_for(Strategy::Default, Metric::Loss),
        report.series_for(Strategy::Default, Metric::Loss)
    );
}

#[tokio::test]
async fn cancelled_sweep_is_never_archived() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let layout = config.layout();
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut runner = BenchRunner::new(
        ImpairmentController::new(RecordingLink::default()),
        ScriptedSession::new(),
        config.reductions,
    )
    .with_cancel(cancel);
    let report = runner.run(&config.sweep_plan().unwrap(), &layout).await;

    let err = archive_sweep(&report, &layout, &config.archive_root).unwrap_err();
    assert!(matches!(err, ArchiveError::IncompleteSweep));
    assert!(!config.archive_root.exists());
}

#[tokio::test]
async fn fixed_condition_traces_feed_the_fixed_charts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let layout = config.fixed_layout();
    let plan = config.fixed_plan().unwrap();
    assert_eq!(plan.setting.axis, ImpairmentAxis::DropRate);

    let mut runner = BenchRunner::new(
        ImpairmentController::new(RecordingLink::default()),
        ScriptedSession::new(),
        config.reductions,
    );
    let fixed = runner.run_fixed(&plan, &layout).await;
    assert!(fixed.failures.is_empty());

    let generator = ReportGenerator::new(&config.report_dir);
    let results = generator.fixed_all(&plan.setting, |metric| {
        load_fixed_logs(&plan, &layout, metric, &fixed.failures)
    });
    for (metric, result) in results {
        let artifact = result.unwrap();
        let data: ChartSpec = serde_json::from_str(&fs::read_to_string(&artifact.data).unwrap()).unwrap();
        assert_eq!(data.series.len(), 3, "{metric}");
    }
    assert!(config.report_dir.join("latency-fixed.svg").exists());
}
