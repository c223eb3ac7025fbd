use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The single network condition being varied in one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpairmentAxis {
    /// Packet drop probability, in percent.
    DropRate,
    /// Bandwidth cap, in Mbit/s.
    Bandwidth,
}

impl ImpairmentAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpairmentAxis::DropRate => "drop-rate",
            ImpairmentAxis::Bandwidth => "bandwidth",
        }
    }

    /// Axis label used by swept charts.
    pub fn display_name(&self) -> &'static str {
        match self {
            ImpairmentAxis::DropRate => "Drop Rate (%)",
            ImpairmentAxis::Bandwidth => "Bandwidth (Mbps)",
        }
    }
}

impl fmt::Display for ImpairmentAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpairmentAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop-rate" | "drop_rate" | "loss" => Ok(ImpairmentAxis::DropRate),
            "bandwidth" | "rate" => Ok(ImpairmentAxis::Bandwidth),
            other => Err(format!(
                "Unknown impairment axis '{other}'. Try 'drop-rate' or 'bandwidth'."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSetting {
    #[error("drop rate must be within 0..=100 percent, got {0}")]
    DropRate(f64),
    #[error("bandwidth cap must be a positive number of Mbps, got {0}")]
    Bandwidth(f64),
}

/// One point on an impairment axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpairmentSetting {
    pub axis: ImpairmentAxis,
    pub value: f64,
}

impl ImpairmentSetting {
    pub fn new(axis: ImpairmentAxis, value: f64) -> Result<Self, InvalidSetting> {
        let setting = Self { axis, value };
        setting.validate()?;
        Ok(setting)
    }

    pub fn drop_rate(percent: f64) -> Result<Self, InvalidSetting> {
        Self::new(ImpairmentAxis::DropRate, percent)
    }

    pub fn bandwidth(mbps: f64) -> Result<Self, InvalidSetting> {
        Self::new(ImpairmentAxis::Bandwidth, mbps)
    }

    pub fn validate(&self) -> Result<(), InvalidSetting> {
        match self.axis {
            ImpairmentAxis::DropRate => {
                if !self.value.is_finite() || !(0.0..=100.0).contains(&self.value) {
                    return Err(InvalidSetting::DropRate(self.value));
                }
            }
            ImpairmentAxis::Bandwidth => {
                if !self.value.is_finite() || self.value <= 0.0 {
                    return Err(InvalidSetting::Bandwidth(self.value));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ImpairmentSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.axis {
            ImpairmentAxis::DropRate => write!(f, "drop-rate={}%", self.value),
            ImpairmentAxis::Bandwidth => write!(f, "bandwidth={}Mbps", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_rate_bounds() {
        assert!(ImpairmentSetting::drop_rate(0.0).is_ok());
        assert!(ImpairmentSetting::drop_rate(100.0).is_ok());
        assert_eq!(
            ImpairmentSetting::drop_rate(100.5),
            Err(InvalidSetting::DropRate(100.5))
        );
        assert!(ImpairmentSetting::drop_rate(-0.1).is_err());
        assert!(ImpairmentSetting::drop_rate(f64::NAN).is_err());
    }

    #[test]
    fn bandwidth_must_be_positive() {
        assert!(ImpairmentSetting::bandwidth(60.0).is_ok());
        assert_eq!(
            ImpairmentSetting::bandwidth(0.0),
            Err(InvalidSetting::Bandwidth(0.0))
        );
        assert!(ImpairmentSetting::bandwidth(f64::INFINITY).is_err());
    }

    #[test]
    fn axis_labels() {
        assert_eq!(ImpairmentAxis::DropRate.display_name(), "Drop Rate (%)");
        assert_eq!(ImpairmentAxis::Bandwidth.display_name(), "Bandwidth (Mbps)");
        assert_eq!("loss".parse::<ImpairmentAxis>(), Ok(ImpairmentAxis::DropRate));
    }
}
