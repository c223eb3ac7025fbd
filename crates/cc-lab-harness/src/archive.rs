use cc_lab_abstract::{ImpairmentAxis, LogLayout, Strategy};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ArchiveError;
use crate::sweep::SweepReport;

/// Move every strategy's raw subtree to `<archive_root>/<axis>/<strategy>`.
///
/// Any earlier archive of `axis` is removed first, so archiving twice leaves
/// only the latest sweep. If that removal fails nothing is moved. With no raw
/// logs present the existing archive is left untouched.
pub fn archive(
    layout: &LogLayout,
    archive_root: &Path,
    axis: ImpairmentAxis,
    strategies: &[Strategy],
) -> Result<Vec<PathBuf>, ArchiveError> {
    let present: Vec<Strategy> = strategies
        .iter()
        .copied()
        .filter(|s| layout.strategy_dir(*s).exists())
        .collect();
    if present.is_empty() {
        debug!(root = %layout.root().display(), "no logs to archive");
        return Ok(Vec::new());
    }

    let axis_dir = LogLayout::archive_dir(archive_root, axis);
    match fs::remove_dir_all(&axis_dir) {
        Ok(()) => debug!(path = %axis_dir.display(), "removed previous archive"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ArchiveError::Conflict {
                path: axis_dir,
                source,
            });
        }
    }
    fs::create_dir_all(&axis_dir).map_err(|source| ArchiveError::Conflict {
        path: axis_dir.clone(),
        source,
    })?;

    let mut moved = Vec::new();
    for strategy in present {
        let from = layout.strategy_dir(strategy);
        let to = LogLayout::archived_strategy_dir(archive_root, axis, strategy);
        move_dir(&from, &to)?;
        info!(%strategy, to = %to.display(), "archived logs");
        moved.push(to);
    }
    Ok(moved)
}

/// Archive the logs behind `report`. Cancelled or partial sweeps are refused.
pub fn archive_sweep(
    report: &SweepReport,
    layout: &LogLayout,
    archive_root: &Path,
) -> Result<Vec<PathBuf>, ArchiveError> {
    if !report.completed {
        return Err(ArchiveError::IncompleteSweep);
    }
    archive(layout, archive_root, report.axis, &report.strategies)
}

/// Rename `from` to `to`, copying across filesystems when rename is not possible.
fn move_dir(from: &Path, to: &Path) -> Result<(), ArchiveError> {
    let wrap = |source| ArchiveError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_tree(from, to).map_err(wrap)?;
    fs::remove_dir_all(from).map_err(wrap)
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
