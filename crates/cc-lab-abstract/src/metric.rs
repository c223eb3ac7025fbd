use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which peer of a session produced a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Client, Role::Server];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }

    /// Prefix of the per-stream directory (`c1`, `s1`, ...).
    pub fn stream_prefix(&self) -> char {
        match self {
            Role::Client => 'c',
            Role::Server => 's',
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "server" => Ok(Role::Server),
            other => Err(format!("Unknown role '{other}'. Try 'client' or 'server'.")),
        }
    }
}

/// One of the three telemetry streams written per (strategy, role, stream).
///
/// Records are whitespace separated and columns are positional:
///
/// | metric  | columns                          | x         | y            |
/// |---------|----------------------------------|-----------|--------------|
/// | window  | `timestamp window_bytes`         | timestamp | window_bytes |
/// | loss    | `marker count`                   | marker    | count        |
/// | latency | `stream_id rtt_seconds timestamp`| timestamp | rtt_seconds  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Window,
    Loss,
    Latency,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Window, Metric::Loss, Metric::Latency];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Window => "window",
            Metric::Loss => "loss",
            Metric::Latency => "latency",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Metric::Window => "window.log",
            Metric::Loss => "loss.log",
            Metric::Latency => "latency.log",
        }
    }

    pub fn column_count(&self) -> usize {
        match self {
            Metric::Window | Metric::Loss => 2,
            Metric::Latency => 3,
        }
    }

    /// Column holding the independent variable.
    pub fn x_column(&self) -> usize {
        match self {
            Metric::Window | Metric::Loss => 0,
            Metric::Latency => 2,
        }
    }

    /// Column holding the measured value.
    pub fn y_column(&self) -> usize {
        1
    }

    pub fn x_label(&self) -> &'static str {
        match self {
            Metric::Window | Metric::Latency => "Time (s)",
            Metric::Loss => "Loss Marker",
        }
    }

    pub fn y_label(&self) -> &'static str {
        match self {
            Metric::Window => "Congestion Window (bytes)",
            Metric::Loss => "Packets Lost",
            Metric::Latency => "RTT (s)",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Metric::Window => "Congestion Window",
            Metric::Loss => "Packet Loss",
            Metric::Latency => "Round-Trip Latency",
        }
    }

    pub fn default_reduction(&self) -> Reduction {
        match self {
            Metric::Window => Reduction::Mean,
            Metric::Loss => Reduction::Final,
            Metric::Latency => Reduction::Mean,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "window" | "cwnd" => Ok(Metric::Window),
            "loss" => Ok(Metric::Loss),
            "latency" | "rtt" => Ok(Metric::Latency),
            other => Err(format!(
                "Unknown metric '{other}'. Try 'window', 'loss' or 'latency'."
            )),
        }
    }
}

/// How a session's metric log is folded into one sweep point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reduction {
    /// Value of the last record.
    Final,
    Sum,
    Mean,
    Max,
    /// Nearest-rank percentile, `p` in `0..=100`.
    Percentile { p: f64 },
}

impl Reduction {
    /// Reduce the dependent column. Returns `None` for an empty log.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Reduction::Final => values.last().copied(),
            Reduction::Sum => Some(values.iter().sum()),
            Reduction::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Reduction::Max => values.iter().copied().reduce(f64::max),
            Reduction::Percentile { p } => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let p = p.clamp(0.0, 100.0);
                let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
                Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
            }
        }
    }

    /// Short prefix for summary axis labels, e.g. "Mean RTT (s)".
    pub fn label(&self) -> String {
        match self {
            Reduction::Final => "Final".to_string(),
            Reduction::Sum => "Total".to_string(),
            Reduction::Mean => "Mean".to_string(),
            Reduction::Max => "Max".to_string(),
            Reduction::Percentile { p } => format!("p{p}"),
        }
    }
}
