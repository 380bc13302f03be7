//! The event loop tying configuration, engines and a bot together.
//!
//! ```rust,ignore
//! use xbot_runtime::XbotRuntime;
//!
//! let runtime = XbotRuntime::builder()
//!     .profile("production")
//!     .build(bot)?;
//!
//! runtime.engine().add(on_command("ping").handle(|_ctx| async { "pong" }));
//!
//! let events = runtime.event_sender();
//! tokio::spawn(async move { /* feed events from the gateway */ });
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use figment::Provider;
use tokio::signal;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use xbot_core::{BoxedBot, BoxedEvent};
use xbot_framework::{BotSettings, Engine, EngineRegistry, MemoryLimiter};

use crate::config::{ConfigLoader, XbotConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging::{self, LoggingError};

const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Handle for submitting events to a running [`XbotRuntime`].
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<BoxedEvent>,
}

impl EventSender {
    /// Queues an event, waiting while the queue is full.
    pub async fn send(&self, event: impl Into<BoxedEvent>) -> RuntimeResult<()> {
        self.tx
            .send(event.into())
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }
}

/// Owns the configuration, the engines and the event queue.
///
/// Events leave the queue in order and each dispatch runs as its own task.
/// Handlers are launched by the engines.
pub struct XbotRuntime {
    config: XbotConfig,
    bot: BoxedBot,
    registry: EngineRegistry,
    tx: mpsc::Sender<BoxedEvent>,
    rx: Mutex<mpsc::Receiver<BoxedEvent>>,
}

impl XbotRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Validates `config`, installs the global subscriber and creates the
    /// runtime.
    pub fn from_config(config: XbotConfig, bot: BoxedBot) -> RuntimeResult<Self> {
        validate_config(&config)?;
        match logging::init_from_config(&config.logging) {
            Ok(()) | Err(LoggingError::AlreadyInstalled(_)) => {}
            Err(err) => return Err(err.into()),
        }

        info!(
            log_level = %config.logging.level,
            command_prefix = %config.bot.command_prefix,
            super_users = config.bot.super_users.len(),
            "Runtime initialized from configuration"
        );

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Ok(Self {
            config,
            bot,
            registry: EngineRegistry::new(),
            tx,
            rx: Mutex::new(rx),
        })
    }

    pub fn config(&self) -> &XbotConfig {
        &self.config
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    /// Bot settings derived from the `[bot]` section.
    pub fn settings(&self) -> BotSettings {
        self.config.bot.to_settings()
    }

    /// Creates an engine using the configured settings and registers it.
    pub fn engine(&self) -> Engine {
        let engine = Engine::with_settings(self.settings());
        self.registry.register(engine.clone());
        engine
    }

    /// An in-memory limiter swept at the configured interval.
    pub fn limiter(&self, window: Duration, max: usize) -> Arc<MemoryLimiter> {
        Arc::new(MemoryLimiter::with_sweep_interval(
            window,
            max,
            self.config.limiter.sweep_interval(),
        ))
    }

    pub fn event_sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        let signal = shutdown_signal()?;
        info!("xbot runtime is now running. Press Ctrl+C to stop.");
        self.run_until(signal).await
    }

    /// Dispatches queued events until `shutdown` completes, then waits for the
    /// in-flight dispatches and handlers.
    ///
    /// Events that are already queued when `shutdown` completes are still
    /// dispatched.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut rx = self.rx.try_lock().map_err(|_| RuntimeError::AlreadyRunning)?;
        let mut dispatches = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let registry = self.registry.clone();
                    let bot = Arc::clone(&self.bot);
                    dispatches.spawn(async move { registry.dispatch(event, bot).await });
                }
                Some(joined) = dispatches.join_next() => log_dispatch(joined),
                () = &mut shutdown => break,
            }
        }

        debug!(pending = dispatches.len(), "draining dispatches");
        while let Some(joined) = dispatches.join_next().await {
            log_dispatch(joined);
        }
        self.registry.wait_idle().await;

        info!("xbot runtime stopped");
        Ok(())
    }

    /// Shuts every engine down, waiting for their in-flight handlers.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

impl std::fmt::Debug for XbotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XbotRuntime")
            .field("config", &self.config)
            .field("self_id", &self.bot.self_id())
            .field("registry", &self.registry)
            .finish()
    }
}

fn log_dispatch(joined: Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(matched) => debug!(matched, "event dispatched"),
        Err(err) => error!(error = %err, "dispatch task failed"),
    }
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => warn!(error = %err, "Ctrl+C listener failed, shutting down"),
    }
}

#[cfg(unix)]
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            result = signal::ctrl_c() => log_ctrl_c(result),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    Ok(async { log_ctrl_c(signal::ctrl_c().await) })
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration and builds an [`XbotRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge<P: Provider>(mut self, provider: P) -> Self {
        self.config_loader = self.config_loader.merge(provider);
        self
    }

    pub fn build(self, bot: BoxedBot) -> RuntimeResult<XbotRuntime> {
        let config = self.config_loader.load()?;
        XbotRuntime::from_config(config, bot)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
