//! Launching one client/server session per sweep point.

use cc_lab_abstract::{
    CommandTemplate, ImpairmentSetting, LogLayout, Metric, Role, SessionConfig, StreamId, Strategy,
};
use std::fs;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::logs::seal_log;

/// One unit of work for a [`SessionExecutor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRequest {
    pub strategy: Strategy,
    /// Snapshot of the impairment in effect while the session runs.
    pub setting: ImpairmentSetting,
    pub stream: StreamId,
}

/// Runs a session to completion and leaves its logs under `layout`.
///
/// The returned future must not resolve until the peers are gone and every
/// log it wrote is sealed.
pub trait SessionExecutor {
    fn execute(
        &self,
        request: &SessionRequest,
        layout: &LogLayout,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Spawns the configured server and client programs as child processes.
#[derive(Debug, Clone)]
pub struct ProcessSession {
    config: SessionConfig,
}

impl ProcessSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    fn prepare_dirs(&self, request: &SessionRequest, layout: &LogLayout) -> Result<(), SessionError> {
        for role in Role::ALL {
            let dir = layout.session_dir(request.strategy, role, request.stream);
            fs::create_dir_all(&dir).map_err(|source| SessionError::LogDir {
                path: dir.clone(),
                source,
            })?;
            // Peers append, so stale records from an earlier run must go.
            for metric in Metric::ALL {
                let path = dir.join(metric.file_name());
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(SessionError::LogDir { path, source }),
                }
            }
        }
        Ok(())
    }

    fn spawn(
        &self,
        role: Role,
        request: &SessionRequest,
        layout: &LogLayout,
    ) -> Result<Child, SessionError> {
        let template = match role {
            Role::Server => &self.config.server,
            Role::Client => &self.config.client,
        };
        let log_dir = layout.session_dir(request.strategy, role, request.stream);
        let ctx = PlaceholderContext::new(&self.config, request, &log_dir);
        let mut cmd = build_command(template, &ctx);
        cmd.env("CC_LAB_STRATEGY", request.strategy.as_str())
            .env("CC_LAB_SELECTOR", request.strategy.selector().to_string())
            .env("CC_LAB_LOG_DIR", &log_dir)
            .env("CC_LAB_ROLE", role.as_str())
            .env("CC_LAB_STREAM", request.stream.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(peer = role.as_str(), program = %template.program, "spawning peer");
        cmd.spawn().map_err(|source| SessionError::Spawn {
            peer: role.as_str(),
            program: template.program.clone(),
            source,
        })
    }

    async fn run_peers(
        &self,
        request: &SessionRequest,
        layout: &LogLayout,
    ) -> Result<(), SessionError> {
        let mut server = self.spawn(Role::Server, request, layout)?;
        sleep(Duration::from_millis(self.config.server_startup_ms)).await;

        if let Some(status) = server.try_wait().map_err(|source| SessionError::Wait {
            peer: "server",
            source,
        })? {
            return Err(exit_error("server", status));
        }

        let mut client = match self.spawn(Role::Client, request, layout) {
            Ok(child) => child,
            Err(e) => {
                terminate(&mut server).await;
                return Err(e);
            }
        };

        let limit = Duration::from_secs(self.config.timeout_secs);
        let client_status = match timeout(limit, client.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                terminate(&mut server).await;
                return Err(SessionError::Wait {
                    peer: "client",
                    source,
                });
            }
            Err(_) => {
                warn!(?limit, "session timed out, killing peers");
                terminate(&mut client).await;
                terminate(&mut server).await;
                return Err(SessionError::Timeout(limit));
            }
        };

        // The server normally runs until killed; give it time to flush its logs.
        let grace = Duration::from_millis(self.config.server_grace_ms);
        match timeout(grace, server.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                warn!(%status, "server exited unsuccessfully");
                if client_status.success() {
                    return Err(exit_error("server", status));
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(source)) => {
                return Err(SessionError::Wait {
                    peer: "server",
                    source,
                });
            }
            Err(_) => terminate(&mut server).await,
        }

        if !client_status.success() {
            return Err(exit_error("client", client_status));
        }
        Ok(())
    }

    fn seal(&self, request: &SessionRequest, layout: &LogLayout) {
        for role in Role::ALL {
            for metric in Metric::ALL {
                let path = layout.path_for(request.strategy, role, request.stream, metric);
                match seal_log(&path) {
                    Ok(0) => {}
                    Ok(bytes) => {
                        warn!(path = %path.display(), bytes, "truncated torn log record")
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to seal log"),
                }
            }
        }
    }
}

impl SessionExecutor for ProcessSession {
    async fn execute(
        &self,
        request: &SessionRequest,
        layout: &LogLayout,
    ) -> Result<(), SessionError> {
        self.prepare_dirs(request, layout)?;
        info!(
            strategy = %request.strategy,
            setting = %request.setting,
            stream = %request.stream,
            "session starting"
        );
        let started = Instant::now();
        let result = self.run_peers(request, layout).await;
        self.seal(request, layout);
        match &result {
            Ok(()) => info!(elapsed = ?started.elapsed(), "session finished"),
            Err(e) => warn!(elapsed = ?started.elapsed(), error = %e, "session failed"),
        }
        result
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "peer already gone");
    }
}

fn exit_error(peer: &'static str, status: ExitStatus) -> SessionError {
    SessionError::ExitStatus {
        peer,
        status: status.to_string(),
    }
}

/// Values substituted into `{name}` placeholders of a [`CommandTemplate`].
#[derive(Debug, Clone)]
pub struct PlaceholderContext {
    vars: Vec<(&'static str, String)>,
}

impl PlaceholderContext {
    pub fn new(config: &SessionConfig, request: &SessionRequest, log_dir: &Path) -> Self {
        let (host, port) = config
            .endpoint
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.to_string()))
            .unwrap_or_else(|| (config.endpoint.clone(), String::new()));
        Self {
            vars: vec![
                ("strategy", request.strategy.as_str().to_string()),
                ("selector", request.strategy.selector().to_string()),
                ("certificate", config.certificate.display().to_string()),
                ("private_key", config.private_key.display().to_string()),
                ("endpoint", config.endpoint.clone()),
                ("host", host),
                ("port", port),
                ("log_dir", log_dir.display().to_string()),
                ("stream", request.stream.to_string()),
            ],
        }
    }

    /// Replace every known placeholder in `text`. Unknown braces are kept verbatim.
    pub fn expand(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, value) in &self.vars {
            out = out.replace(&format!("{{{name}}}"), value);
        }
        out
    }
}

fn build_command(template: &CommandTemplate, ctx: &PlaceholderContext) -> Command {
    let mut cmd = Command::new(ctx.expand(&template.program));
    cmd.args(template.args.iter().map(|a| ctx.expand(a)));
    for (key, value) in &template.env {
        cmd.env(key, ctx.expand(value));
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request() -> SessionRequest {
        SessionRequest {
            strategy: Strategy::PerformanceBased,
            setting: ImpairmentSetting::drop_rate(0.6).unwrap(),
            stream: StreamId(2),
        }
    }

    fn sh(script: &str) -> CommandTemplate {
        CommandTemplate {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: BTreeMap::new(),
        }
    }

    fn config(server: &str, client: &str, timeout_secs: u64) -> SessionConfig {
        SessionConfig {
            server: sh(server),
            client: sh(client),
            timeout_secs,
            server_startup_ms: 50,
            server_grace_ms: 100,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn expands_placeholders() {
        let config = SessionConfig::default();
        let ctx = PlaceholderContext::new(&config, &request(), Path::new("/tmp/logs/s2"));
        assert_eq!(ctx.expand("--cc={selector}"), "--cc=2");
        assert_eq!(ctx.expand("{host}:{port}"), "127.0.0.1:4433");
        assert_eq!(ctx.expand("https://{endpoint}/"), "https://127.0.0.1:4433/");
        assert_eq!(ctx.expand("{log_dir}/{strategy}"), "/tmp/logs/s2/performance-based");
        assert_eq!(ctx.expand("{unknown}"), "{unknown}");
    }

    #[test]
    fn default_templates_select_strategy_by_number() {
        let config = SessionConfig::default();
        let ctx = PlaceholderContext::new(&config, &request(), Path::new("x"));
        let args: Vec<String> = config.server.args.iter().map(|a| ctx.expand(a)).collect();
        assert!(args.windows(2).any(|w| w == ["--congestion-control", "2"]));
        assert!(args.iter().any(|a| a == "tests/ssl_cert.pem"));
    }

    #[tokio::test]
    async fn peers_write_logs_through_environment() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let session = ProcessSession::new(config(
            r#"printf '0.0 1000\n0.5 2000\n' > "$CC_LAB_LOG_DIR/window.log"; sleep 5"#,
            r#"printf '2 0.03 1.0\n' > "$CC_LAB_LOG_DIR/latency.log""#,
            10,
        ));
        session.execute(&request(), &layout).await.unwrap();

        let server_window =
            layout.path_for(Strategy::PerformanceBased, Role::Server, StreamId(2), Metric::Window);
        assert_eq!(fs::read_to_string(server_window).unwrap(), "0.0 1000\n0.5 2000\n");
        let client_latency =
            layout.path_for(Strategy::PerformanceBased, Role::Client, StreamId(2), Metric::Latency);
        assert!(client_latency.exists());
    }

    #[tokio::test]
    async fn hung_client_times_out_and_torn_record_is_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let session = ProcessSession::new(config(
            r#"printf '0.0 1000\n0.5 20' > "$CC_LAB_LOG_DIR/window.log"; sleep 30"#,
            "sleep 30",
            1,
        ));
        let err = session.execute(&request(), &layout).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));

        let path =
            layout.path_for(Strategy::PerformanceBased, Role::Server, StreamId(2), Metric::Window);
        assert_eq!(fs::read_to_string(path).unwrap(), "0.0 1000\n");
    }

    #[tokio::test]
    async fn failing_client_is_a_session_failure() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let session = ProcessSession::new(config("sleep 5", "exit 3", 10));
        let err = session.execute(&request(), &layout).await.unwrap_err();
        assert!(matches!(err, SessionError::ExitStatus { peer: "client", .. }));
    }

    #[tokio::test]
    async fn stale_logs_are_removed_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let stale =
            layout.path_for(Strategy::PerformanceBased, Role::Client, StreamId(2), Metric::Loss);
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "1 99\n").unwrap();

        let session = ProcessSession::new(config("sleep 5", "true", 10));
        session.execute(&request(), &layout).await.unwrap();
        assert!(!stale.exists());
    }
}
