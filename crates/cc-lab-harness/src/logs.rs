//! Reading raw metric logs back for aggregation and reporting.

use cc_lab_abstract::{Metric, MetricLog};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use crate::error::LogFormatError;

/// Read and validate one raw log.
///
/// Blank lines are skipped. Every other line must have exactly
/// `metric.column_count()` finite numeric columns and the independent column
/// must be non-decreasing.
pub fn read_metric_log(path: &Path, metric: Metric) -> Result<MetricLog, LogFormatError> {
    let file = fs::File::open(path).map_err(|source| LogFormatError::Io {
        metric,
        path: path.to_path_buf(),
        source,
    })?;
    parse_metric_log(BufReader::new(file), path, metric)
}

pub fn parse_metric_log<R: BufRead>(
    reader: R,
    path: &Path,
    metric: Metric,
) -> Result<MetricLog, LogFormatError> {
    let mut log = MetricLog::new(metric);
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| LogFormatError::Io {
            metric,
            path: path.to_path_buf(),
            source,
        })?;
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.is_empty() {
            continue;
        }
        if columns.len() != metric.column_count() {
            return Err(LogFormatError::ColumnCount {
                path: path.to_path_buf(),
                line: line_no,
                expected: metric.column_count(),
                found: columns.len(),
            });
        }
        let column = |index: usize| -> Result<f64, LogFormatError> {
            columns[index]
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| LogFormatError::Parse {
                    path: path.to_path_buf(),
                    line: line_no,
                    column: index,
                    value: columns[index].to_string(),
                })
        };
        let x = column(metric.x_column())?;
        let y = column(metric.y_column())?;
        if let Some(prev) = log.samples.last()
            && x < prev.x
        {
            return Err(LogFormatError::NotMonotonic {
                path: path.to_path_buf(),
                line: line_no,
                previous: prev.x,
                current: x,
            });
        }
        log.push(x, y);
    }
    Ok(log)
}

/// Drop a torn trailing record so the file is a valid prefix of complete lines.
///
/// Returns the number of bytes removed. Missing files are left alone.
pub fn seal_log(path: &Path) -> io::Result<u64> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    if content.is_empty() || content.ends_with(b"\n") {
        return Ok(0);
    }
    let keep = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    file.set_len(keep as u64)?;
    file.sync_all()?;
    Ok((content.len() - keep) as u64)
}
