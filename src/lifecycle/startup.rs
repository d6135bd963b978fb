//! Startup orchestration and the server handle.
//!
//! # Responsibilities
//! - Initialize the compiler and run the first compile
//! - Start watch loops and the recompile trigger
//! - Bind the listener and begin accepting traffic
//! - Tear everything down, once, in reverse order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener starts last (traffic only once there is something to serve)
//! - Draining in-flight requests on stop is bounded; stragglers are aborted

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::compile::{
    ArtifactStore, CompileError, CompileOrchestrator, CompileSettings, Compiler, InitError,
};
use crate::config::ServerConfig;
use crate::http::server::{self, AppState, DevState};
use crate::lifecycle::shutdown::Shutdown;
use crate::reload::ReloadChannel;
use crate::validator::Validator;
use crate::watch::{CoalescingTrigger, WatchHandle, WatchTarget};

/// How long `stop` lets in-flight requests finish before dropping them.
const SERVER_DRAIN_LIMIT: Duration = Duration::from_secs(5);

/// Where the server is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Initializing,
    Serving,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("compiler initialization failed: {0}")]
    Init(#[from] InitError),
    #[error("first compile failed: {0}")]
    FirstCompile(#[source] CompileError),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

struct Tasks {
    server: JoinHandle<Result<(), std::io::Error>>,
    trigger: Option<JoinHandle<u64>>,
    watchers: WatchHandle,
}

struct HandleInner {
    local_addr: SocketAddr,
    state: watch::Sender<LifecycleState>,
    shutdown: Shutdown,
    orchestrator: Arc<CompileOrchestrator>,
    channel: Arc<ReloadChannel>,
    tasks: Mutex<Option<Tasks>>,
}

/// Control over a running server.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<HandleInner>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    /// Shut down: stop watching, close every live reload connection, stop the
    /// HTTP server and release the compiler. Only the first call does the
    /// work; later calls wait for it to finish.
    pub async fn stop(&self) {
        let first = self.inner.state.send_if_modified(|state| {
            if *state == LifecycleState::Serving {
                *state = LifecycleState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if !first {
            self.wait().await;
            return;
        }

        tracing::info!("Shutting down");
        self.inner.shutdown.trigger();

        let tasks = self.inner.tasks.lock().await.take();
        if let Some(tasks) = tasks {
            tasks.watchers.join().await;
            if let Some(trigger) = tasks.trigger {
                if let Err(e) = trigger.await {
                    tracing::warn!(error = %e, "Recompile trigger panicked");
                }
            }
            self.inner.channel.close_all();
            let mut server = tasks.server;
            let joined = match tokio::time::timeout(SERVER_DRAIN_LIMIT, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(
                        limit_secs = SERVER_DRAIN_LIMIT.as_secs(),
                        "In-flight requests did not finish, aborting HTTP server"
                    );
                    server.abort();
                    server.await
                }
            };
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
            }
        }

        self.inner.orchestrator.release().await;
        self.inner.state.send_replace(LifecycleState::Stopped);
        tracing::info!("Shutdown complete");
    }

    /// Resolve once the server has stopped.
    pub async fn wait(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.inner.local_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Bring the server up. Returns once the listener is bound and the first
/// compile has been published.
pub async fn start(
    config: ServerConfig,
    compiler: Arc<dyn Compiler>,
    validator: Arc<dyn Validator>,
) -> Result<ServerHandle, StartupError> {
    let config = Arc::new(config);
    let (state, _) = watch::channel(LifecycleState::Idle);
    state.send_replace(LifecycleState::Initializing);

    let store = Arc::new(ArtifactStore::new());
    let channel = Arc::new(ReloadChannel::new(config.reload.client_buffer));
    let orchestrator = Arc::new(CompileOrchestrator::new(
        compiler,
        CompileSettings::from(config.as_ref()),
        store.clone(),
        channel.clone(),
    ));

    orchestrator.initialize().await?;
    tracing::info!(script = ?config.project.script, "Compiler initialized");

    if let Err(e) = orchestrator.recompile().await {
        orchestrator.release().await;
        return Err(StartupError::FirstCompile(e));
    }

    let shutdown = Shutdown::new();

    let (trigger, watchers) = if config.watch.enabled {
        let on_fire = {
            let orchestrator = orchestrator.clone();
            move || {
                let orchestrator = orchestrator.clone();
                async move {
                    // Outcome is logged and broadcast by the orchestrator.
                    let _ = orchestrator.recompile().await;
                }
            }
        };
        let (trigger, trigger_task) =
            CoalescingTrigger::spawn(config.watch.debounce(), shutdown.subscribe(), on_fire);
        let targets = WatchTarget::from_config(&config);
        let watchers = crate::watch::start(&targets, &trigger, &shutdown.subscribe());
        tracing::info!(watched = watchers.active(), of = targets.len(), "File watching enabled");
        (Some(trigger_task), watchers)
    } else {
        tracing::info!("File watching disabled");
        (None, WatchHandle::default())
    };

    let address = config.listener.bind_address();
    let bound = match TcpListener::bind(&address).await {
        Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
        Err(e) => Err(e),
    };
    let (listener, local_addr) = match bound {
        Ok(bound) => bound,
        Err(source) => {
            shutdown.trigger();
            watchers.join().await;
            if let Some(task) = trigger {
                let _ = task.await;
            }
            orchestrator.release().await;
            return Err(StartupError::Bind { address, source });
        }
    };

    let app = AppState::new(DevState {
        script_dir: config.script_dir(),
        watch_enabled: config.watch.enabled,
        config: config.clone(),
        store,
        orchestrator: orchestrator.clone(),
        channel: channel.clone(),
        validator,
        shutdown: shutdown.subscribe(),
    });
    let server_task = tokio::spawn(server::run(
        listener,
        server::build_router(app),
        shutdown.subscribe(),
    ));

    state.send_replace(LifecycleState::Serving);
    tracing::info!(url = %format!("http://{}", local_addr), "Preview server ready");

    Ok(ServerHandle {
        inner: Arc::new(HandleInner {
            local_addr,
            state,
            shutdown,
            orchestrator,
            channel,
            tasks: Mutex::new(Some(Tasks {
                server: server_task,
                trigger,
                watchers,
            })),
        }),
    })
}
