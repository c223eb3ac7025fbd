//! In-memory stand-ins for the link emulator and the session peers.
//!
//! Used by unit tests here and by the integration tests; both are
//! deterministic so sweep results can be asserted exactly.

use cc_lab_abstract::{LogLayout, Metric, Role, StreamId, Strategy};
use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ImpairmentError, SessionError};
use crate::netem::{LinkEmulator, LinkShape};
use crate::session::{SessionExecutor, SessionRequest};

/// Records every shape it is asked to apply.
#[derive(Debug, Default)]
pub struct RecordingLink {
    history: Vec<LinkShape>,
    current: LinkShape,
    fail_on: Option<usize>,
    reject_loss: Vec<f64>,
}

impl RecordingLink {
    /// The `call`-th configure (1-based) fails.
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    /// Every attempt to install a drop rate of `percent` fails.
    pub fn rejecting_loss(mut self, percent: f64) -> Self {
        self.reject_loss.push(percent);
        self
    }

    /// Last shape that was successfully installed.
    pub fn current(&self) -> LinkShape {
        self.current
    }

    /// All attempted shapes, including rejected ones.
    pub fn history(&self) -> &[LinkShape] {
        &self.history
    }
}

impl LinkEmulator for RecordingLink {
    fn configure(&mut self, shape: &LinkShape) -> Result<(), ImpairmentError> {
        self.history.push(*shape);
        let rejected = self.fail_on == Some(self.history.len())
            || shape
                .loss_percent
                .is_some_and(|loss| self.reject_loss.contains(&loss));
        if rejected {
            return Err(ImpairmentError::Rejected {
                command: "tc qdisc add".into(),
                status: "exit status: 2".into(),
                stderr: "RTNETLINK answers: Invalid argument".into(),
            });
        }
        self.current = *shape;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Script {
    Fail,
    TimeOut,
    Raw(Metric, String),
}

/// Writes synthetic, well-formed logs for every request unless scripted otherwise.
///
/// Values are a function of (strategy, stream) only, see [`ScriptedSession::expected`].
#[derive(Debug, Default)]
pub struct ScriptedSession {
    scripts: HashMap<(Strategy, StreamId), Script>,
    calls: Mutex<Vec<SessionRequest>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The peer exits non-zero without writing logs.
    pub fn fail(mut self, strategy: Strategy, stream: StreamId) -> Self {
        self.scripts.insert((strategy, stream), Script::Fail);
        self
    }

    /// Logs are partially written, then the session reports a timeout.
    pub fn time_out(mut self, strategy: Strategy, stream: StreamId) -> Self {
        self.scripts.insert((strategy, stream), Script::TimeOut);
        self
    }

    /// `metric`'s log is replaced with `text` for both roles; others are synthetic.
    pub fn raw(mut self, strategy: Strategy, stream: StreamId, metric: Metric, text: &str) -> Self {
        self.scripts
            .insert((strategy, stream), Script::Raw(metric, text.to_string()));
        self
    }

    /// Requests seen so far, in execution order.
    pub fn calls(&self) -> Vec<SessionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Folded value the synthetic logs produce under the default reductions.
    pub fn expected(strategy: Strategy, stream: StreamId, metric: Metric) -> f64 {
        let base = f64::from(strategy.selector() + 1);
        let stream = f64::from(stream.0);
        match metric {
            Metric::Window => base * 1000.0 + stream,
            Metric::Loss => base * 10.0 + stream,
            Metric::Latency => base / 100.0,
        }
    }

    fn synthetic(strategy: Strategy, stream: StreamId, metric: Metric) -> String {
        let value = Self::expected(strategy, stream, metric);
        match metric {
            // Mean of symmetric samples is `value`.
            Metric::Window => format!("0.0 {}\n0.5 {}\n1.0 {}\n", value - 100.0, value, value + 100.0),
            Metric::Loss => format!("1 {}\n2 {}\n", value - 1.0, value),
            Metric::Latency => format!("{id} {value} 0.5\n{id} {value} 1.0\n", id = stream.0),
        }
    }

    fn write(layout: &LogLayout, request: &SessionRequest, metric: Metric, text: &str) {
        for role in Role::ALL {
            let path = layout.path_for(request.strategy, role, request.stream, metric);
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = fs::write(path, text);
        }
    }
}

impl SessionExecutor for ScriptedSession {
    async fn execute(
        &self,
        request: &SessionRequest,
        layout: &LogLayout,
    ) -> Result<(), SessionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(*request);
        }
        let script = self.scripts.get(&(request.strategy, request.stream)).cloned();
        match script {
            Some(Script::Fail) => {
                return Err(SessionError::ExitStatus {
                    peer: "client",
                    status: "exit status: 1".into(),
                });
            }
            Some(Script::TimeOut) => {
                Self::write(layout, request, Metric::Window, "0.0 1000\n");
                return Err(SessionError::Timeout(Duration::from_secs(1)));
            }
            Some(Script::Raw(metric, text)) => {
                for other in Metric::ALL.into_iter().filter(|m| *m != metric) {
                    let text = Self::synthetic(request.strategy, request.stream, other);
                    Self::write(layout, request, other, &text);
                }
                Self::write(layout, request, metric, &text);
            }
            None => {
                for metric in Metric::ALL {
                    let text = Self::synthetic(request.strategy, request.stream, metric);
                    Self::write(layout, request, metric, &text);
                }
            }
        }
        Ok(())
    }
}
