use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Congestion-control algorithm selected for one session.
///
/// The set is closed: the external transport implementation understands
/// exactly these three variants, addressed by [`Strategy::selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Loss-based default (Reno).
    Default,
    /// Event-based alternative (CUBIC).
    EventBased,
    /// Throughput/performance-optimizing alternative (Vivace).
    PerformanceBased,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Default,
        Strategy::EventBased,
        Strategy::PerformanceBased,
    ];

    /// Stable key used for directory names and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Default => "default",
            Strategy::EventBased => "event-based",
            Strategy::PerformanceBased => "performance-based",
        }
    }

    /// Name shown in chart legends.
    pub fn display_name(&self) -> &'static str {
        match self {
            Strategy::Default => "Reno",
            Strategy::EventBased => "CUBIC",
            Strategy::PerformanceBased => "Vivace",
        }
    }

    /// Numeric selector understood by the protocol implementation under test.
    pub fn selector(&self) -> u8 {
        match self {
            Strategy::Default => 0,
            Strategy::EventBased => 1,
            Strategy::PerformanceBased => 2,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "reno" | "0" => Ok(Strategy::Default),
            "event-based" | "cubic" | "1" => Ok(Strategy::EventBased),
            "performance-based" | "vivace" | "2" => Ok(Strategy::PerformanceBased),
            other => Err(format!(
                "Unknown strategy '{other}'. Try 'default', 'event-based' or 'performance-based'."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_algorithm_aliases() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>(), Ok(strategy));
            assert_eq!(
                strategy.selector().to_string().parse::<Strategy>(),
                Ok(strategy)
            );
        }
        assert_eq!("CUBIC".parse::<Strategy>(), Ok(Strategy::EventBased));
        assert!("bbr".parse::<Strategy>().is_err());
    }

    #[test]
    fn keys_are_distinct() {
        let mut keys: Vec<_> = Strategy::ALL.iter().map(|s| s.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Strategy::ALL.len());
    }
}
