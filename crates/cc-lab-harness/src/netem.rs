//! `tc netem` backend for the emulated link.

use cc_lab_abstract::{ImpairmentAxis, ImpairmentSetting, LinkConfig};
use std::process::{Command, Output};
use tracing::debug;

use crate::error::ImpairmentError;

const MTU_BYTES: u64 = 1400;
const MIN_QUEUE_PACKETS: u64 = 20;

/// Complete desired state of the link. Fields left `None` are not in effect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkShape {
    pub loss_percent: Option<f64>,
    pub rate_mbit: Option<f64>,
}

impl LinkShape {
    /// Shape with only `setting`'s axis active.
    pub fn for_setting(setting: &ImpairmentSetting) -> Self {
        match setting.axis {
            ImpairmentAxis::DropRate => Self {
                loss_percent: Some(setting.value),
                rate_mbit: None,
            },
            ImpairmentAxis::Bandwidth => Self {
                loss_percent: None,
                rate_mbit: Some(setting.value),
            },
        }
    }

    pub fn is_clear(&self) -> bool {
        self.loss_percent.is_none() && self.rate_mbit.is_none()
    }
}

/// Something that can put the shared link into a [`LinkShape`].
///
/// `configure` replaces the whole link state; nothing from a previous
/// shape may survive it.
pub trait LinkEmulator {
    fn configure(&mut self, shape: &LinkShape) -> Result<(), ImpairmentError>;
}

/// Applies shapes with `tc qdisc ... netem`, optionally inside a network namespace.
#[derive(Debug, Clone)]
pub struct NetemLink {
    interface: String,
    namespace: Option<String>,
    sudo: bool,
    base_delay_ms: u32,
}

impl NetemLink {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            interface: config.interface.clone(),
            namespace: config.namespace.clone(),
            sudo: config.sudo,
            base_delay_ms: config.base_delay_ms,
        }
    }

    fn command(&self, tc_args: &[String]) -> Command {
        let mut argv: Vec<String> = Vec::new();
        if let Some(ns) = &self.namespace {
            argv.extend(["ip", "netns", "exec", ns.as_str()].map(String::from));
        }
        argv.push("tc".into());
        argv.extend(tc_args.iter().cloned());

        let mut cmd = if self.sudo {
            Command::new("sudo")
        } else {
            Command::new(argv.remove(0))
        };
        cmd.args(argv);
        cmd
    }

    fn tc(&self, args: &[String]) -> Result<Output, ImpairmentError> {
        let rendered = format!("tc {}", args.join(" "));
        debug!(command = %rendered, "running tc");
        self.command(args)
            .output()
            .map_err(|source| ImpairmentError::Spawn {
                command: rendered,
                source,
            })
    }
}

impl LinkEmulator for NetemLink {
    fn configure(&mut self, shape: &LinkShape) -> Result<(), ImpairmentError> {
        // Start from a clean root qdisc so no parameter of the previous shape survives.
        let del = ["qdisc", "del", "dev", self.interface.as_str(), "root"].map(String::from);
        let _ = self.tc(&del);

        let Some(args) = netem_args(&self.interface, shape, self.base_delay_ms) else {
            return Ok(());
        };
        let output = self.tc(&args)?;
        if !output.status.success() {
            return Err(ImpairmentError::Rejected {
                command: format!("tc {}", args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Arguments for `tc` installing `shape`, or `None` when the link should stay clear.
///
/// A bandwidth cap gets a finite queue of twice the bandwidth-delay product
/// (at least [`MIN_QUEUE_PACKETS`]) so excess traffic is dropped, not buffered.
/// The limit saturates at `u32::MAX` packets, the largest queue `tc` accepts.
pub fn netem_args(interface: &str, shape: &LinkShape, base_delay_ms: u32) -> Option<Vec<String>> {
    if shape.is_clear() {
        return None;
    }
    let mut args: Vec<String> = ["qdisc", "add", "dev", interface, "root", "netem"]
        .map(String::from)
        .to_vec();

    let rate_kbit = shape.rate_mbit.map(|mbit| (mbit * 1000.0).round().max(1.0) as u64);
    if let Some(rate) = rate_kbit {
        let rtt_ms = u64::from(base_delay_ms) * 2;
        let bdp_bytes = rate.saturating_mul(125).saturating_mul(rtt_ms) / 1000;
        let limit = (bdp_bytes / MTU_BYTES)
            .saturating_mul(2)
            .clamp(MIN_QUEUE_PACKETS, u64::from(u32::MAX));
        args.push("limit".into());
        args.push(limit.to_string());
    }
    if let Some(loss) = shape.loss_percent {
        args.push("loss".into());
        args.push(format!("{loss}%"));
    }
    if let Some(rate) = rate_kbit {
        args.push("rate".into());
        args.push(format!("{rate}kbit"));
    }
    Some(args)
}
