//! On-disk structure of raw logs, folded summaries, reports and archives.
//!
//! Raw logs live at `<root>/<strategy>/<role>/<c|s><stream>/<metric>.log`.
//! Every other component resolves paths through [`LogLayout`]; nothing
//! globs or pattern-matches the tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::impairment::ImpairmentAxis;
use crate::metric::{Metric, Role};
use crate::strategy::Strategy;

/// Logical transport stream of a session. Sweep point `i` runs as stream `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u32);

impl StreamId {
    pub fn for_point(index: usize) -> Self {
        StreamId(index as u32 + 1)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportMode {
    Fixed,
    Varied,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::Fixed => "fixed",
            ReportMode::Varied => "varied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whole raw subtree owned by one strategy.
    pub fn strategy_dir(&self, strategy: Strategy) -> PathBuf {
        self.root.join(strategy.as_str())
    }

    pub fn session_dir(&self, strategy: Strategy, role: Role, stream: StreamId) -> PathBuf {
        self.strategy_dir(strategy)
            .join(role.as_str())
            .join(format!("{}{}", role.stream_prefix(), stream))
    }

    pub fn path_for(
        &self,
        strategy: Strategy,
        role: Role,
        stream: StreamId,
        metric: Metric,
    ) -> PathBuf {
        self.session_dir(strategy, role, stream)
            .join(metric.file_name())
    }

    /// Folded `setting value` export for one strategy and metric.
    pub fn summary_path(&self, strategy: Strategy, metric: Metric) -> PathBuf {
        self.strategy_dir(strategy).join(metric.file_name())
    }

    pub fn report_path(report_dir: &Path, mode: ReportMode, metric: Metric, ext: &str) -> PathBuf {
        report_dir.join(format!("{}-{}.{}", metric.as_str(), mode.as_str(), ext))
    }

    pub fn sweep_report_path(report_dir: &Path) -> PathBuf {
        report_dir.join("sweep.json")
    }

    pub fn fixed_report_path(report_dir: &Path) -> PathBuf {
        report_dir.join("fixed.json")
    }

    pub fn archive_dir(archive_root: &Path, axis: ImpairmentAxis) -> PathBuf {
        archive_root.join(axis.as_str())
    }

    pub fn archived_strategy_dir(
        archive_root: &Path,
        axis: ImpairmentAxis,
        strategy: Strategy,
    ) -> PathBuf {
        Self::archive_dir(archive_root, axis).join(strategy.as_str())
    }

    /// True when `path` lies inside a strategy subtree and would be moved by archival.
    pub fn overlaps_strategy_tree(&self, path: &Path) -> bool {
        Strategy::ALL
            .iter()
            .any(|s| path.starts_with(self.strategy_dir(*s)))
    }
}
