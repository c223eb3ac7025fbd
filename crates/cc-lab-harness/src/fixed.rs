//! Fixed-condition runs: one session per strategy at a single setting.

use cc_lab_abstract::{
    FixedPlan, ImpairmentSetting, LogLayout, Metric, MetricLog, MissingReason, Strategy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

use crate::logs::read_metric_log;
use crate::netem::LinkEmulator;
use crate::session::{SessionExecutor, SessionRequest};
use crate::sweep::{BenchRunner, PointFailure};

/// Outcome of a fixed-condition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedReport {
    pub setting: ImpairmentSetting,
    pub strategies: Vec<Strategy>,
    pub failures: Vec<PointFailure>,
}

impl FixedReport {
    pub fn failed(&self, strategy: Strategy) -> bool {
        self.failures.iter().any(|f| f.strategy == strategy)
    }

    /// True when no strategy produced a usable session.
    pub fn all_failed(&self) -> bool {
        self.strategies.iter().all(|s| self.failed(*s))
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
}

impl<L: LinkEmulator, E: SessionExecutor> BenchRunner<L, E> {
    /// Run each strategy once under `plan.setting`.
    ///
    /// Strategies skipped by cancellation are recorded as failures so their
    /// stale logs are never charted.
    pub async fn run_fixed(&mut self, plan: &FixedPlan, layout: &LogLayout) -> FixedReport {
        let mut failures = Vec::new();
        info!(setting = %plan.setting, stream = %plan.stream, "fixed-condition run starting");
        for &strategy in &plan.strategies {
            if self.cancel_token().is_cancelled() {
                warn!(%strategy, "fixed-condition run cancelled");
                failures.push(PointFailure {
                    strategy,
                    setting: plan.setting.value,
                    metric: None,
                    reason: MissingReason::Cancelled,
                    message: "run cancelled".into(),
                });
                continue;
            }
            let request = SessionRequest {
                strategy,
                setting: plan.setting,
                stream: plan.stream,
            };
            if let Err(e) = self.run_session(&request, layout).await {
                warn!(%strategy, error = %e, "fixed-condition session failed");
                failures.push(PointFailure {
                    strategy,
                    setting: plan.setting.value,
                    metric: None,
                    reason: e.missing_reason(),
                    message: e.to_string(),
                });
            }
        }
        self.clear_link();
        FixedReport {
            setting: plan.setting,
            strategies: plan.strategies.clone(),
            failures,
        }
    }
}

/// Per-strategy traces of `metric` for a fixed-condition run, in plan order.
///
/// Strategies listed in `failures` are skipped even if a partial log exists.
/// Others whose log is absent or malformed are left out with a warning; the
/// chart is drawn from whatever remains.
pub fn load_fixed_logs(
    plan: &FixedPlan,
    layout: &LogLayout,
    metric: Metric,
    failures: &[PointFailure],
) -> Vec<(Strategy, MetricLog)> {
    plan.strategies
        .iter()
        .filter(|&&strategy| !failures.iter().any(|f| f.strategy == strategy))
        .filter_map(|&strategy| {
            let path = layout.path_for(strategy, plan.role, plan.stream, metric);
            match read_metric_log(&path, metric) {
                Ok(log) => Some((strategy, log)),
                Err(e) => {
                    warn!(%strategy, %metric, error = %e, "skipping trace");
                    None
                }
            }
        })
        .collect()
}
