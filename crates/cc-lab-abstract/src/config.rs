use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::impairment::{ImpairmentAxis, InvalidSetting};
use crate::layout::{LogLayout, StreamId};
use crate::metric::{Metric, Reduction, Role};
use crate::scenario::{FixedPlan, SweepPlan};
use crate::strategy::Strategy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Setting(#[from] InvalidSetting),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything an experiment needs, passed explicitly to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Root of the raw log tree written by sessions.
    pub log_root: PathBuf,
    /// Completed sweeps are moved under `<archive_root>/<axis>/`.
    pub archive_root: PathBuf,
    /// Rendered charts and `sweep.json`.
    pub report_dir: PathBuf,
    pub strategies: Vec<Strategy>,
    pub sweep: SweepConfig,
    pub fixed: FixedConfig,
    pub session: SessionConfig,
    pub link: LinkConfig,
    pub reductions: ReductionConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("logs"),
            archive_root: PathBuf::from("archive"),
            report_dir: PathBuf::from("reports"),
            strategies: Strategy::ALL.to_vec(),
            sweep: SweepConfig::default(),
            fixed: FixedConfig::default(),
            session: SessionConfig::default(),
            link: LinkConfig::default(),
            reductions: ReductionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub axis: ImpairmentAxis,
    pub values: Vec<f64>,
    /// Peer whose logs are folded into the summary series.
    pub role: Role,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            axis: ImpairmentAxis::Bandwidth,
            values: (1..=10).map(|i| f64::from(i * 10)).collect(),
            role: Role::Server,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixedConfig {
    pub axis: ImpairmentAxis,
    pub value: f64,
    pub stream: u32,
    pub role: Role,
    /// Fixed-condition runs keep their own tree so they never collide with a sweep.
    pub log_root: PathBuf,
}

impl Default for FixedConfig {
    fn default() -> Self {
        Self {
            axis: ImpairmentAxis::DropRate,
            value: 1.0,
            stream: 1,
            role: Role::Server,
            log_root: PathBuf::from("logs-fixed"),
        }
    }
}

/// External program launched for one peer.
///
/// `args` and `env` values may contain placeholders that are expanded per
/// session: `{strategy}`, `{selector}`, `{certificate}`, `{private_key}`,
/// `{endpoint}`, `{host}`, `{port}`, `{log_dir}`, `{stream}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub server: CommandTemplate,
    pub client: CommandTemplate,
    /// Passed through to the peers unmodified.
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    /// `host:port` the server listens on and the client connects to.
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Delay between starting the server and starting the client.
    pub server_startup_ms: u64,
    /// How long the server may keep running after the client finished.
    pub server_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: CommandTemplate {
                program: "python3".into(),
                args: [
                    "examples/http3_server.py",
                    "--certificate",
                    "{certificate}",
                    "--private-key",
                    "{private_key}",
                    "--host",
                    "{host}",
                    "--port",
                    "{port}",
                    "--congestion-control",
                    "{selector}",
                ]
                .map(String::from)
                .to_vec(),
                env: BTreeMap::new(),
            },
            client: CommandTemplate {
                program: "python3".into(),
                args: [
                    "examples/http3_client.py",
                    "--ca-certs",
                    "{certificate}",
                    "--congestion-control",
                    "{selector}",
                    "https://{endpoint}/",
                ]
                .map(String::from)
                .to_vec(),
                env: BTreeMap::new(),
            },
            certificate: PathBuf::from("tests/ssl_cert.pem"),
            private_key: PathBuf::from("tests/ssl_key.pem"),
            endpoint: "127.0.0.1:4433".into(),
            timeout_secs: 120,
            server_startup_ms: 500,
            server_grace_ms: 1000,
        }
    }
}

/// Where and how `tc netem` is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub interface: String,
    /// Run `tc` inside this network namespace (`ip netns exec`).
    pub namespace: Option<String>,
    pub sudo: bool,
    /// One-way delay assumed when sizing the netem queue for a bandwidth cap.
    pub base_delay_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".into(),
            namespace: None,
            sudo: false,
            base_delay_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReductionConfig {
    pub window: Reduction,
    pub loss: Reduction,
    pub latency: Reduction,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            window: Metric::Window.default_reduction(),
            loss: Metric::Loss.default_reduction(),
            latency: Metric::Latency.default_reduction(),
        }
    }
}

impl ReductionConfig {
    pub fn for_metric(&self, metric: Metric) -> Reduction {
        match metric {
            Metric::Window => self.window,
            Metric::Loss => self.loss,
            Metric::Latency => self.latency,
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn layout(&self) -> LogLayout {
        LogLayout::new(&self.log_root)
    }

    pub fn fixed_layout(&self) -> LogLayout {
        LogLayout::new(&self.fixed.log_root)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.fixed.stream == 0 {
            return Err(ConfigError::Invalid("fixed.stream is 1-based".into()));
        }
        if self.layout().overlaps_strategy_tree(&self.archive_root) {
            return Err(ConfigError::Invalid(format!(
                "archive_root {} lies inside a strategy log tree",
                self.archive_root.display()
            )));
        }
        self.sweep_plan()?;
        self.fixed_plan()?;
        Ok(())
    }

    pub fn sweep_plan(&self) -> Result<SweepPlan, ConfigError> {
        SweepPlan::new(
            self.sweep.axis,
            &self.sweep.values,
            &self.strategies,
            self.sweep.role,
        )
    }

    pub fn fixed_plan(&self) -> Result<FixedPlan, ConfigError> {
        FixedPlan::new(
            self.fixed.axis,
            self.fixed.value,
            &self.strategies,
            StreamId(self.fixed.stream),
            self.fixed.role,
        )
    }
}
