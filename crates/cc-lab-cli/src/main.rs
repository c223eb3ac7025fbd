mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cc_lab_abstract::{BenchConfig, ConfigOverride, ImpairmentAxis, Strategy};

#[derive(Parser, Debug)]
#[command(author, version, about = "Congestion-control benchmarking harness")]
struct Cli {
    /// TOML experiment description. Every field is optional.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep one impairment axis across every strategy.
    Sweep {
        #[command(flatten)]
        overrides: OverrideArgs,
        /// Keep raw logs in place after a completed sweep.
        #[arg(long, default_value_t = false)]
        no_archive: bool,
    },
    /// Run each strategy once at the fixed condition and chart the raw traces.
    Fixed {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Fold logs already on disk into summaries, `sweep.json` and swept charts.
    Fold {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Re-render charts from a saved sweep and, optionally, fixed-condition logs.
    Report {
        #[command(flatten)]
        overrides: OverrideArgs,
        /// Saved sweep report. Defaults to `<report_dir>/sweep.json`.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Also render fixed-condition charts.
        #[arg(long, default_value_t = false)]
        fixed: bool,
    },
    /// Move the current raw log tree under the archive root for the configured axis.
    Archive {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
}

#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Impairment axis: drop-rate or bandwidth.
    #[arg(long)]
    axis: Option<ImpairmentAxis>,
    /// Comma separated sweep values.
    #[arg(long, value_delimiter = ',')]
    values: Option<Vec<f64>>,
    /// Fixed-condition value on the active axis.
    #[arg(long)]
    fixed_value: Option<f64>,
    /// Comma separated strategies (reno, cubic, vivace or their long names).
    #[arg(long, value_delimiter = ',')]
    strategies: Option<Vec<Strategy>>,
    /// Per-session timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    log_root: Option<PathBuf>,
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

impl OverrideArgs {
    fn to_override(&self) -> ConfigOverride {
        ConfigOverride {
            axis: self.axis,
            values: self.values.clone(),
            fixed_value: self.fixed_value,
            strategies: self.strategies.clone(),
            timeout_secs: self.timeout,
            log_root: self.log_root.clone(),
            report_dir: self.report_dir.clone(),
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn load_config(path: Option<&Path>, overrides: &OverrideArgs) -> Result<BenchConfig> {
    let mut config = match path {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BenchConfig::default(),
    };
    overrides.to_override().apply_to(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    info!("cc-lab starting…");

    let config_path = cli.config.as_deref();
    match &cli.command {
        Command::Sweep {
            overrides,
            no_archive,
        } => commands::sweep(load_config(config_path, overrides)?, !no_archive).await,
        Command::Fixed { overrides } => commands::fixed(load_config(config_path, overrides)?).await,
        Command::Fold { overrides } => commands::fold(load_config(config_path, overrides)?),
        Command::Report {
            overrides,
            input,
            fixed,
        } => commands::report(load_config(config_path, overrides)?, input.as_deref(), *fixed),
        Command::Archive { overrides } => commands::archive(load_config(config_path, overrides)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sweep_overrides() {
        let cli = Cli::try_parse_from([
            "cc-lab",
            "sweep",
            "--axis",
            "drop-rate",
            "--values",
            "0.1,0.6,1.2",
            "--strategies",
            "reno,vivace",
            "--no-archive",
        ])
        .unwrap();
        let Command::Sweep {
            overrides,
            no_archive,
        } = cli.command
        else {
            panic!("expected sweep");
        };
        assert!(no_archive);
        let config = load_config(None, &overrides).unwrap();
        assert_eq!(config.sweep.axis, ImpairmentAxis::DropRate);
        assert_eq!(config.sweep.values, vec![0.1, 0.6, 1.2]);
        assert_eq!(
            config.strategies,
            vec![Strategy::Default, Strategy::PerformanceBased]
        );
    }

    #[test]
    fn invalid_override_is_rejected() {
        let overrides = OverrideArgs {
            axis: Some(ImpairmentAxis::DropRate),
            values: Some(vec![120.0]),
            ..OverrideArgs::default()
        };
        assert!(load_config(None, &overrides).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["cc-lab", "archive", "--config", "bench.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("bench.toml")));
    }
}
