use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use orca_compose::{DockerCompose, Orchestrator};
use orca_core::{AutoSyncFlag, OrcaConfig};
use orca_sync::{Fetcher, Stack};

use crate::control::{self, ControlState};
use crate::error::{io_err, DaemonError};
use crate::logging;

/// Width of the repository column in the per-cycle status line.
pub const REPO_COLUMN_WIDTH: usize = 50;

/// Initialise logging, start a tokio runtime and block until the daemon exits.
pub fn start_blocking(config: OrcaConfig) -> Result<(), DaemonError> {
    logging::init(&config.loglevel);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon against the configured `docker compose` command.
pub async fn run(config: OrcaConfig) -> Result<(), DaemonError> {
    config.validate()?;
    let listener = TcpListener::bind(&config.listen)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: config.listen.clone(),
            source,
        })?;
    let orchestrator: Arc<dyn Orchestrator> =
        Arc::new(DockerCompose::new(config.compose_command.clone()));
    run_with(config, orchestrator, listener).await
}

/// Run one loop per stack plus the control surface on `listener`.
///
/// Returns when every stack loop has ended, either through a shutdown
/// signal or because none of them can make progress any more.
pub async fn run_with(
    config: OrcaConfig,
    orchestrator: Arc<dyn Orchestrator>,
    listener: TcpListener,
) -> Result<(), DaemonError> {
    config.validate()?;
    prepare_dirs(&config)?;

    let autosync = AutoSyncFlag::new(config.autosync);
    let fetcher = Fetcher::new(config.fetch_timeout());
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tracing::info!(
        target: "orca",
        version = env!("CARGO_PKG_VERSION"),
        stacks = config.repos.len(),
        autosync = %config.autosync,
        interval_secs = config.interval,
        "orca starting",
    );

    let control_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let state = ControlState::new(autosync.clone(), config.basicauth.clone());
        tokio::spawn(async move {
            let result = control::serve(listener, state, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let mut stack_handles = Vec::new();
    for repo in config.repo_configs() {
        let stack = Stack::new(repo, &config);
        tracing::info!(
            target: "orca",
            stack = %stack.name(),
            id = %stack.id(),
            workdir = %stack.workdir().display(),
            target_dir = %stack.target_dir().display(),
            "stack registered",
        );
        let name = stack.name().to_string();
        let handle = tokio::spawn(run_stack_loop(
            stack,
            fetcher.clone(),
            orchestrator.clone(),
            autosync.clone(),
            config.interval(),
            shutdown_tx.subscribe(),
        ));
        stack_handles.push((name, handle));
    }

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok::<(), DaemonError>(()),
                signal = shutdown_signal() => {
                    let name = signal.map_err(DaemonError::Signal)?;
                    tracing::info!(target: "orca", signal = name, "shutting down");
                    let _ = shutdown.send(());
                    Ok(())
                }
            }
        })
    };

    let mut first_error = None;
    for (name, handle) in stack_handles {
        if let Err(err) = handle_join(&name, handle.await) {
            tracing::error!(target: "orca", stack = %name, error = %err, "stack task failed");
            first_error.get_or_insert(err);
        }
    }

    // Every stack loop is done; stop the control surface and signal listener.
    let _ = shutdown_tx.send(());
    handle_join("control", control_handle.await)?;
    handle_join("signal_handler", signal_handle.await)?;

    tracing::info!(target: "orca", "orca stopped");
    first_error.map_or(Ok(()), Err)
}

/// Create `workdir` and `targetpath`. Either failing is fatal at startup.
fn prepare_dirs(config: &OrcaConfig) -> Result<(), DaemonError> {
    for dir in [&config.workdir, &config.targetpath] {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    Ok(())
}

/// Reconcile `stack` every `interval` until shutdown.
///
/// Each cycle runs on the blocking pool. A fatal cycle error ends only this
/// stack's loop; the sleep between cycles is cut short by a shutdown.
pub async fn run_stack_loop(
    mut stack: Stack,
    fetcher: Fetcher,
    orchestrator: Arc<dyn Orchestrator>,
    autosync: AutoSyncFlag,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let (returned, outcome) = {
            let fetcher = fetcher.clone();
            let orchestrator = orchestrator.clone();
            let autosync = autosync.clone();
            tokio::task::spawn_blocking(move || {
                let outcome = stack.cycle(&fetcher, orchestrator.as_ref(), &autosync);
                (stack, outcome)
            })
            .await
            .map_err(|err| DaemonError::Join {
                task: "stack cycle".to_string(),
                reason: err.to_string(),
            })?
        };
        stack = returned;

        match outcome {
            Ok(status) => {
                let line = stack.status_line(REPO_COLUMN_WIDTH);
                let last_synced_at = stack.last_synced_at().map(|at| at.to_rfc3339());
                if status.is_error() {
                    tracing::warn!(target: "orca", ?last_synced_at, "{line}");
                } else {
                    tracing::info!(target: "orca", ?last_synced_at, "{line}");
                }
            }
            Err(err) => {
                tracing::error!(
                    target: "orca",
                    stack = %stack.name(),
                    error = %err,
                    "stopping stack loop",
                );
                return Ok(());
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::debug!(target: "orca", stack = %stack.name(), "stack loop stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str, std::io::Error> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "ctrl-c"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str, std::io::Error> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task: task.to_string(),
            reason: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use orca_compose::{ApplyError, ApplyOptions, ComposeProject};
    use orca_core::{AutoSync, Credential, RepoConfig, RepoEntry, StackName};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Orchestrator for Counting {
        fn apply(&self, _: &ComposeProject, _: &ApplyOptions) -> Result<(), ApplyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(root: &std::path::Path, url: &str, interval: u64) -> OrcaConfig {
        let mut config = OrcaConfig {
            workdir: root.join("work"),
            targetpath: root.join("deploy"),
            interval,
            listen: "127.0.0.1:0".to_string(),
            ..OrcaConfig::default()
        };
        config.repos.insert(
            "web".to_string(),
            RepoEntry {
                url: url.to_string(),
                ..RepoEntry::default()
            },
        );
        config
    }

    fn stack(config: &OrcaConfig, url: &str) -> Stack {
        Stack::new(
            RepoConfig {
                name: StackName::from("web"),
                url: url.to_string(),
                credential: Credential::none(),
            },
            config,
        )
    }

    #[tokio::test]
    async fn fatal_cycle_ends_only_the_loop() {
        let root = TempDir::new().unwrap();
        let url = "ftp://example.com/docker-compose.yaml";
        let config = config(root.path(), url, 3600);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            run_stack_loop(
                stack(&config, url),
                Fetcher::new(Duration::from_secs(1)),
                Arc::new(Counting::default()),
                AutoSyncFlag::new(AutoSync::On),
                config.interval(),
                shutdown_rx,
            ),
        )
        .await
        .expect("loop must return without waiting for the interval");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_interval_sleep() {
        let root = TempDir::new().unwrap();
        // Nothing listens on port 1: every cycle is a non-fatal pull error.
        let url = "http://127.0.0.1:1/docker-compose.yaml";
        let config = config(root.path(), url, 3600);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let handle = tokio::spawn(run_stack_loop(
            stack(&config, url),
            Fetcher::new(Duration::from_secs(1)),
            Arc::new(Counting::default()),
            AutoSyncFlag::new(AutoSync::On),
            config.interval(),
            shutdown_rx,
        ));
        shutdown_tx.send(()).expect("receiver alive");

        let joined = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("loop must stop well before the hour-long interval");
        assert!(joined.expect("join").is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn loop_reconciles_every_interval() {
        let mut server = mockito::Server::new_async().await;
        let remote = server
            .mock("GET", "/docker-compose.yaml")
            .with_body("services:\n  web:\n    image: nginx\n")
            .expect_at_least(3)
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let url = format!("{}/docker-compose.yaml", server.url());
        let config = config(root.path(), &url, 1);
        let engine = Arc::new(Counting::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let handle = tokio::spawn(run_stack_loop(
            stack(&config, &url),
            Fetcher::new(Duration::from_secs(5)),
            engine.clone(),
            AutoSyncFlag::new(AutoSync::On),
            Duration::from_millis(50),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(600)).await;
        shutdown_tx.send(()).expect("receiver alive");
        handle.await.expect("join").expect("loop");

        remote.assert_async().await;
        // Unchanged remote: only the first cycle reaches the engine.
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daemon_exits_once_every_stack_has_stopped() {
        let root = TempDir::new().unwrap();
        let config = config(root.path(), "ftp://example.com/docker-compose.yaml", 3600);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            run_with(config, Arc::new(Counting::default()), listener),
        )
        .await
        .expect("daemon must exit");
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_start() {
        let root = TempDir::new().unwrap();
        let config = config(root.path(), "https://example.com/c.yml", 0);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");

        let err = run_with(config, Arc::new(Counting::default()), listener)
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)), "{err}");
    }

    #[tokio::test]
    async fn unusable_workdir_is_fatal_at_startup() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let mut config = config(root.path(), "http://127.0.0.1:1/docker-compose.yaml", 1);
        config.workdir = blocker.join("work");
        config.targetpath = blocker.join("deploy");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run_with(config, Arc::new(Counting::default()), listener),
        )
        .await
        .expect("startup must fail without entering the loop")
        .unwrap_err();
        match err {
            DaemonError::Io { path, .. } => assert_eq!(path, blocker.join("work")),
            other => panic!("expected an I/O error, got {other}"),
        }
    }

    #[tokio::test]
    async fn startup_creates_missing_directories() {
        let root = TempDir::new().unwrap();
        let config = config(root.path(), "ftp://example.com/docker-compose.yaml", 3600);
        let (work, deploy) = (config.workdir.clone(), config.targetpath.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");

        run_with(config, Arc::new(Counting::default()), listener)
            .await
            .expect("daemon");
        assert!(work.is_dir());
        assert!(deploy.is_dir());
    }
}
