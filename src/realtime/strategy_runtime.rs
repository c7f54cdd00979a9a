use crate::config::RuntimeConfig;
use crate::context::TradingContext;
use crate::core::signalled;
use crate::error::{ConfigError, Error};
use crate::exchanges::ConnectionManager;
use crate::monitoring::{AlertLevel, AlertManager};
use crate::realtime::handler::{consume, EventHandler, NoopHandler};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::{debug, error, info};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

/// Boxed task future run by the runtime
pub type TaskFuture = BoxFuture<'static, Result<(), Error>>;

type TaskFactory = Box<dyn FnOnce() -> TaskFuture + Send>;

fn boxed<F, Fut>(task: F) -> TaskFactory
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Box::new(move || task().boxed())
}

/// Publishes how the policy task ended when it is dropped, whether it
/// returned, failed, panicked or was aborted
struct PolicyGuard {
    /// `Some(expected)` once ended; `expected` is true when shutdown was already under way
    ended: watch::Sender<Option<bool>>,
    shutdown: watch::Receiver<bool>,
}

impl Drop for PolicyGuard {
    fn drop(&mut self) {
        let expected = *self.shutdown.borrow();
        self.ended.send_replace(Some(expected));
    }
}

struct Tasks {
    handler: Box<dyn EventHandler>,
    setup: Vec<TaskFactory>,
    background: Vec<TaskFactory>,
    policy: TaskFactory,
}

/// Collects the tasks a [`StrategyRuntime`] runs
pub struct StrategyRuntimeBuilder {
    config: RuntimeConfig,
    context: TradingContext,
    handler: Box<dyn EventHandler>,
    setup: Vec<TaskFactory>,
    background: Vec<TaskFactory>,
    policy: Option<TaskFactory>,
}

impl StrategyRuntimeBuilder {
    pub fn new(config: RuntimeConfig, context: TradingContext) -> Self {
        Self {
            config,
            context,
            handler: Box::new(NoopHandler),
            setup: Vec::new(),
            background: Vec::new(),
            policy: None,
        }
    }

    /// Receiver of every event from the delivery queue
    pub fn handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// One-shot task, awaited before the next setup task starts
    pub fn setup<F, Fut>(mut self, task: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.setup.push(boxed(task));
        self
    }

    /// Task started concurrently once setup is done
    pub fn background<F, Fut>(mut self, task: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.background.push(boxed(task));
        self
    }

    /// The trading loop; watched and expected to run until shutdown
    pub fn policy<F, Fut>(mut self, task: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.policy = Some(boxed(task));
        self
    }

    pub fn build(self) -> Result<StrategyRuntime, ConfigError> {
        self.config.validate()?;
        let policy = self.policy.ok_or(ConfigError::Empty("policy task"))?;
        Ok(StrategyRuntime {
            config: self.config,
            connection: self.context.connection,
            alerts: self.context.alerts,
            tasks: std::sync::Mutex::new(Some(Tasks {
                handler: self.handler,
                setup: self.setup,
                background: self.background,
                policy,
            })),
            shutdown: watch::channel(false).0,
        })
    }
}

/// Runs setup, background and policy tasks against one connection
pub struct StrategyRuntime {
    config: RuntimeConfig,
    connection: Arc<ConnectionManager>,
    alerts: Arc<AlertManager>,
    tasks: std::sync::Mutex<Option<Tasks>>,
    shutdown: watch::Sender<bool>,
}

impl StrategyRuntime {
    pub fn builder(config: RuntimeConfig, context: TradingContext) -> StrategyRuntimeBuilder {
        StrategyRuntimeBuilder::new(config, context)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Start the connection and run every task until shutdown or the first failure.
    ///
    /// A task error or panic ends the run with that error; cancelled tasks are
    /// ignored. The connection is closed before returning. A runtime runs once.
    pub async fn run(&self) -> Result<(), Error> {
        let tasks = self
            .tasks
            .lock()
            .ok()
            .and_then(|mut tasks| tasks.take())
            .ok_or_else(|| Error::Task(format!("{} already ran", self.config.name)))?;
        if self.is_shutdown() {
            return Ok(());
        }

        let receiver = self
            .connection
            .take_event_receiver()
            .ok_or_else(|| Error::Task("event queue already taken".to_string()))?;

        let result = match self.connection.start().await {
            Ok(()) => {
                self.alerts
                    .emit(
                        AlertLevel::Info,
                        &self.config.name,
                        format!("Run {}", self.config.name),
                    )
                    .await;
                self.run_tasks(tasks, receiver).await
            }
            Err(e) => Err(e.into()),
        };

        self.shutdown.send_replace(true);
        self.connection.close().await;
        info!("{} stopped", self.config.name);
        result
    }

    async fn run_tasks(
        &self,
        tasks: Tasks,
        receiver: crate::core::EventReceiver,
    ) -> Result<(), Error> {
        let Tasks {
            handler,
            setup,
            background,
            policy,
        } = tasks;
        let mut shutdown = self.shutdown.subscribe();

        for (index, task) in setup.into_iter().enumerate() {
            debug!("{}: setup task {}", self.config.name, index);
            tokio::select! {
                _ = signalled(&mut shutdown) => return Ok(()),
                result = task() => result?,
            }
        }

        let mut set = JoinSet::new();
        let consumer_shutdown = self.shutdown.subscribe();
        set.spawn(async move {
            consume(receiver, handler, consumer_shutdown).await;
            Ok(())
        });
        for task in background {
            set.spawn(task());
        }

        let (ended_tx, ended_rx) = watch::channel(None);
        let watchdog = Watchdog {
            config: self.config.clone(),
            ended: ended_rx,
            alerts: Arc::clone(&self.alerts),
            raised: Arc::new(Mutex::new(false)),
        };
        let guard = PolicyGuard {
            ended: ended_tx,
            shutdown: self.shutdown.subscribe(),
        };
        let policy = policy();
        set.spawn(async move {
            let _guard = guard;
            policy.await
        });
        set.spawn(watchdog.clone().run());

        let outcome = loop {
            tokio::select! {
                _ = signalled(&mut shutdown) => break Ok(()),
                joined = set.join_next() => match joined {
                    None => break Ok(()),
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(e))) => {
                        error!("{}: task failed: {}", self.config.name, e);
                        break Err(e);
                    }
                    Some(Err(e)) if e.is_cancelled() => continue,
                    Some(Err(e)) => {
                        error!("{}: task panicked: {}", self.config.name, e);
                        break Err(Error::Task(e.to_string()));
                    }
                },
            }
        };

        self.shutdown.send_replace(true);
        set.shutdown().await;
        // the loop may exit on the policy's own failure before the watchdog wakes
        watchdog.check().await;
        outcome
    }

    /// Stop every task and close the connection. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        info!("Shutting down {}", self.config.name);
        self.connection.close().await;
    }
}

/// Polls the policy task and raises one critical alert when it ends outside shutdown
#[derive(Clone)]
struct Watchdog {
    config: RuntimeConfig,
    ended: watch::Receiver<Option<bool>>,
    alerts: Arc<AlertManager>,
    /// Held across the emit so an abort mid-alert leaves it unset
    raised: Arc<Mutex<bool>>,
}

impl Watchdog {
    async fn run(self) -> Result<(), Error> {
        let mut poll = tokio::time::interval(self.config.watchdog_interval());
        loop {
            poll.tick().await;
            if self.check().await {
                return Ok(());
            }
        }
    }

    /// True once the policy has ended
    async fn check(&self) -> bool {
        let state = *self.ended.borrow();
        match state {
            None => false,
            Some(true) => true,
            Some(false) => {
                let mut raised = self.raised.lock().await;
                if !*raised {
                    self.alerts
                        .emit(
                            AlertLevel::Critical,
                            &self.config.name,
                            format!("Policy task of {} has ended", self.config.name),
                        )
                        .await;
                    *raised = true;
                }
                true
            }
        }
    }
}

impl std::fmt::Debug for StrategyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRuntime")
            .field("name", &self.config.name)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
