use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::{info, warn};

use cc_lab_abstract::{BenchConfig, LogLayout};
use cc_lab_harness::{
    BenchRunner, CancelToken, FixedReport, ImpairmentController, NetemLink, ProcessSession,
    SweepReport, archive_sweep, fold_existing, load_fixed_logs,
};
use cc_lab_report::{Artifact, ReportError, ReportGenerator};

fn runner(config: &BenchConfig) -> BenchRunner<NetemLink, ProcessSession> {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current session");
            handle.cancel();
        }
    });
    BenchRunner::new(
        ImpairmentController::new(NetemLink::new(&config.link)),
        ProcessSession::new(config.session.clone()),
        config.reductions,
    )
    .with_cancel(cancel)
}

fn check_charts<M: std::fmt::Display>(results: Vec<(M, Result<Artifact, ReportError>)>) -> Result<()> {
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    for (metric, result) in &results {
        if let Ok(artifact) = result {
            info!(%metric, svg = %artifact.svg.display(), "report ready");
        }
    }
    if failed > 0 {
        bail!("{failed} of {} charts failed to render", results.len());
    }
    Ok(())
}

fn publish(report: &SweepReport, config: &BenchConfig, layout: &LogLayout) -> Result<()> {
    report
        .export_summaries(layout)
        .context("writing folded summaries")?;
    let path = LogLayout::sweep_report_path(&config.report_dir);
    report
        .write_json(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "sweep report saved");

    for failure in &report.failures {
        warn!(
            strategy = %failure.strategy,
            setting = failure.setting,
            reason = ?failure.reason,
            "{}",
            failure.message
        );
    }

    let generator = ReportGenerator::new(&config.report_dir);
    check_charts(generator.swept_all(report.axis, &report.series))
}

pub async fn sweep(config: BenchConfig, archive: bool) -> Result<()> {
    let layout = config.layout();
    let plan = config.sweep_plan()?;
    let mut runner = runner(&config);
    let report = runner.run(&plan, &layout).await;
    // Archive even when a chart failed to render.
    let published = publish(&report, &config, &layout);

    if !report.completed {
        warn!("sweep did not complete; raw logs left in place");
    } else if archive {
        let moved = archive_sweep(&report, &layout, &config.archive_root)
            .context("archiving sweep logs")?;
        info!(strategies = moved.len(), "sweep archived");
    }
    published
}

pub async fn fixed(config: BenchConfig) -> Result<()> {
    let layout = config.fixed_layout();
    let plan = config.fixed_plan()?;
    let mut runner = runner(&config);
    let report = runner.run_fixed(&plan, &layout).await;
    let path = LogLayout::fixed_report_path(&config.report_dir);
    report
        .write_json(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    if report.all_failed() {
        bail!("every fixed-condition session failed");
    }

    let generator = ReportGenerator::new(&config.report_dir);
    check_charts(generator.fixed_all(&plan.setting, |metric| {
        load_fixed_logs(&plan, &layout, metric, &report.failures)
    }))
}

pub fn fold(config: BenchConfig) -> Result<()> {
    let layout = config.layout();
    let plan = config.sweep_plan()?;
    let report = fold_existing(&plan, &layout, &config.reductions);
    if !report.completed {
        warn!("some sweep points have no logs on disk");
    }
    publish(&report, &config, &layout)
}

pub fn report(config: BenchConfig, input: Option<&Path>, with_fixed: bool) -> Result<()> {
    let default_input = LogLayout::sweep_report_path(&config.report_dir);
    let input = input.unwrap_or(default_input.as_path());
    let generator = ReportGenerator::new(&config.report_dir);

    let report = SweepReport::load_json(input)
        .with_context(|| format!("reading sweep report {}", input.display()))?;
    check_charts(generator.swept_all(report.axis, &report.series))?;

    if with_fixed {
        let layout = config.fixed_layout();
        let plan = config.fixed_plan()?;
        let path = LogLayout::fixed_report_path(&config.report_dir);
        let failures = match FixedReport::load_json(&path) {
            Ok(fixed) => fixed.failures,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "no fixed-run record, charting every trace");
                Vec::new()
            }
        };
        check_charts(generator.fixed_all(&plan.setting, |metric| {
            load_fixed_logs(&plan, &layout, metric, &failures)
        }))?;
    }
    Ok(())
}

pub fn archive(config: BenchConfig) -> Result<()> {
    let moved = cc_lab_harness::archive(
        &config.layout(),
        &config.archive_root,
        config.sweep.axis,
        &config.strategies,
    )
    .context("archiving logs")?;
    if moved.is_empty() {
        warn!(root = %config.log_root.display(), "nothing to archive");
    }
    Ok(())
}
