use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{BenchConfig, ConfigError};
use crate::impairment::{ImpairmentAxis, ImpairmentSetting};
use crate::layout::StreamId;
use crate::metric::Role;
use crate::strategy::Strategy;

/// Ordered sweep over one impairment axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    pub axis: ImpairmentAxis,
    pub settings: Vec<ImpairmentSetting>,
    pub strategies: Vec<Strategy>,
    pub role: Role,
}

impl SweepPlan {
    /// Validates every value against the axis and rejects duplicates.
    /// An empty or single-point sweep is valid.
    pub fn new(
        axis: ImpairmentAxis,
        values: &[f64],
        strategies: &[Strategy],
        role: Role,
    ) -> Result<Self, ConfigError> {
        check_strategies(strategies)?;
        let mut settings: Vec<ImpairmentSetting> = Vec::with_capacity(values.len());
        for &value in values {
            let setting = ImpairmentSetting::new(axis, value)?;
            if settings.iter().any(|s| s.value == value) {
                return Err(ConfigError::Invalid(format!(
                    "sweep value {value} appears more than once"
                )));
            }
            settings.push(setting);
        }
        Ok(Self {
            axis,
            settings,
            strategies: strategies.to_vec(),
            role,
        })
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn setting_values(&self) -> Vec<f64> {
        self.settings.iter().map(|s| s.value).collect()
    }
}

/// A single, non-swept setting run once per strategy for detailed traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedPlan {
    pub setting: ImpairmentSetting,
    pub strategies: Vec<Strategy>,
    pub stream: StreamId,
    pub role: Role,
}

impl FixedPlan {
    pub fn new(
        axis: ImpairmentAxis,
        value: f64,
        strategies: &[Strategy],
        stream: StreamId,
        role: Role,
    ) -> Result<Self, ConfigError> {
        check_strategies(strategies)?;
        Ok(Self {
            setting: ImpairmentSetting::new(axis, value)?,
            strategies: strategies.to_vec(),
            stream,
            role,
        })
    }
}

fn check_strategies(strategies: &[Strategy]) -> Result<(), ConfigError> {
    if strategies.is_empty() {
        return Err(ConfigError::Invalid("at least one strategy is required".into()));
    }
    for (idx, strategy) in strategies.iter().enumerate() {
        if strategies[..idx].contains(strategy) {
            return Err(ConfigError::Invalid(format!(
                "strategy {strategy} listed more than once"
            )));
        }
    }
    Ok(())
}

/// Command-line overrides layered on top of a config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverride {
    pub axis: Option<ImpairmentAxis>,
    pub values: Option<Vec<f64>>,
    pub fixed_value: Option<f64>,
    pub strategies: Option<Vec<Strategy>>,
    pub timeout_secs: Option<u64>,
    pub log_root: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
}

impl ConfigOverride {
    pub fn apply_to(&self, config: &mut BenchConfig) {
        if let Some(v) = self.axis {
            config.sweep.axis = v;
            config.fixed.axis = v;
        }
        if let Some(v) = &self.values {
            config.sweep.values = v.clone();
        }
        if let Some(v) = self.fixed_value {
            config.fixed.value = v;
        }
        if let Some(v) = &self.strategies {
            config.strategies = v.clone();
        }
        if let Some(v) = self.timeout_secs {
            config.session.timeout_secs = v;
        }
        if let Some(v) = &self.log_root {
            config.log_root = v.clone();
        }
        if let Some(v) = &self.report_dir {
            config.report_dir = v.clone();
        }
    }
}
