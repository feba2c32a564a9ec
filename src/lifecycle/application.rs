//! Application
//!
//! Owns the lifecycle state machine and drives the lifecycle registry resolved
//! from the DI container.

use super::{
    LifecycleError, LifecycleEvent, LifecycleEvents, LifecycleObserver,
    LifecycleObserverRegistry, LifecycleRegistry, ObserverOptions, Operation, ProcessSignals,
    Result, ShutdownCoordinator, ShutdownOptions, SignalDispatcher, State, registry::DEFAULT_GROUP,
};
use crate::config::ApplicationConfig;
use crate::di::Container;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast, watch};

/// Result of an in-flight transition as seen by callers waiting on it
type Outcome = std::result::Result<(), String>;

/// An application instance with a start/stop lifecycle
///
/// | Current            | `start()`                    | `stop()`                     |
/// |--------------------|------------------------------|------------------------------|
/// | created / stopped  | runs the start sequence      | no-op                        |
/// | starting           | waits for the running start  | [`LifecycleError::InvalidState`] |
/// | started            | no-op                        | runs the stop sequence       |
/// | stopping           | [`LifecycleError::InvalidState`] | waits for the running stop |
///
/// Every transition publishes [`LifecycleEvent::StateChanged`] followed by
/// [`LifecycleEvent::Entered`].
///
/// If the registry fails, the error is returned to the caller and the
/// application stays in `starting`/`stopping`. Callers waiting on the same
/// transition get [`LifecycleError::TransitionFailed`]. Calling the same
/// operation again retries it; the opposite operation is rejected until then.
///
/// # Example
///
/// ```rust,ignore
/// use armature::lifecycle::{Application, ShutdownOptions, State};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), armature::lifecycle::LifecycleError> {
///     let app = Application::builder()
///         .container(container)
///         .shutdown(ShutdownOptions::new().grace_period(Duration::from_secs(10)))
///         .observer(database_service, "DatabaseService")
///         .observer(http_server, "HttpServer")
///         .build()?;
///
///     app.start().await?;
///     app.wait_for(State::Stopped).await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

struct ApplicationInner {
    container: Container,
    core: Mutex<Core>,
    events: LifecycleEvents,
    shutdown: ShutdownCoordinator,
}

struct Core {
    state: State,
    in_flight: Option<InFlight>,
}

/// The start or stop sequence currently running
struct InFlight {
    operation: Operation,
    done: watch::Receiver<Option<Outcome>>,
}

enum Begin {
    /// Nothing to do in the current state
    Skip,
    /// The same operation is already running
    Wait(watch::Receiver<Option<Outcome>>),
    /// This caller runs the sequence
    Run(watch::Sender<Option<Outcome>>),
}

/// A non-owning handle used by the shutdown listener
pub(crate) struct WeakApplication(Weak<ApplicationInner>);

impl WeakApplication {
    pub(crate) fn upgrade(&self) -> Option<Application> {
        self.0.upgrade().map(|inner| Application { inner })
    }
}

impl ApplicationInner {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the new state, then notify. Runs under the core lock so
    /// notifications are published in transition order.
    fn transition(&self, core: &mut Core, to: State) {
        let from = core.state;
        core.state = to;
        tracing::debug!("Application state: {} -> {}", from, to);
        self.events.transition(from, to);
    }
}

/// Settles the running transition, including when the driving future is dropped
struct Flight<'a> {
    inner: &'a ApplicationInner,
    operation: Operation,
    done: watch::Sender<Option<Outcome>>,
    settled: bool,
}

impl Flight<'_> {
    fn settle(&mut self, outcome: Outcome) {
        if self.settled {
            return;
        }
        self.settled = true;

        let mut core = self.inner.lock_core();
        if outcome.is_ok() {
            self.inner.transition(&mut core, self.operation.settled());
        }
        core.in_flight = None;
        self.done.send_replace(Some(outcome));
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let message = format!("{} was cancelled", self.operation);
        self.settle(Err(message));
    }
}

impl Application {
    /// Create an application over `container` with default options
    ///
    /// Signals are handled through [`ProcessSignals::global`].
    pub fn new(container: Container) -> Self {
        Self::assemble(
            container,
            ShutdownOptions::default(),
            ObserverOptions::default(),
            ProcessSignals::global(),
        )
    }

    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    fn assemble(
        mut container: Container,
        shutdown: ShutdownOptions,
        observers: ObserverOptions,
        signals: Arc<dyn SignalDispatcher>,
    ) -> Self {
        if !container.contains::<dyn LifecycleRegistry>() {
            container
                .register_arc(Arc::new(LifecycleObserverRegistry::with_options(observers)))
                .register_trait::<dyn LifecycleRegistry, LifecycleObserverRegistry, _>(|r| {
                    r as Arc<dyn LifecycleRegistry>
                });
        }

        Self {
            inner: Arc::new(ApplicationInner {
                container,
                core: Mutex::new(Core {
                    state: State::Created,
                    in_flight: None,
                }),
                events: LifecycleEvents::new(),
                shutdown: ShutdownCoordinator::new(shutdown, signals),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakApplication {
        WeakApplication(Arc::downgrade(&self.inner))
    }

    /// Get a reference to the container
    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// The current lifecycle state
    pub fn state(&self) -> State {
        self.inner.lock_core().state
    }

    /// Subscribe to lifecycle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.inner.shutdown
    }

    pub fn shutdown_options(&self) -> &ShutdownOptions {
        self.inner.shutdown.options()
    }

    /// Whether a signal-triggered shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_shutting_down()
    }

    /// Register an observer with the default registry
    ///
    /// # Errors
    /// Returns [`LifecycleError::Dependency`] if the container binds a custom
    /// [`LifecycleRegistry`] instead of [`LifecycleObserverRegistry`].
    pub fn lifecycle_observer<T>(
        &self,
        observer: Arc<RwLock<T>>,
        name: impl Into<String>,
    ) -> Result<()>
    where
        T: LifecycleObserver + 'static,
    {
        self.lifecycle_observer_in_group(observer, name, DEFAULT_GROUP)
    }

    /// Register an observer in `group` with the default registry
    ///
    /// # Errors
    /// See [`lifecycle_observer`](Self::lifecycle_observer).
    pub fn lifecycle_observer_in_group<T>(
        &self,
        observer: Arc<RwLock<T>>,
        name: impl Into<String>,
        group: impl Into<String>,
    ) -> Result<()>
    where
        T: LifecycleObserver + 'static,
    {
        let registry = self.inner.container.resolve::<LifecycleObserverRegistry>()?;
        registry.register_in_group(observer, name, group);
        Ok(())
    }

    /// Start the application
    ///
    /// # Errors
    /// - [`LifecycleError::InvalidState`] while a stop is running
    /// - any error returned by the lifecycle registry
    pub async fn start(&self) -> Result<()> {
        self.run(Operation::Start).await
    }

    /// Stop the application
    ///
    /// # Errors
    /// - [`LifecycleError::InvalidState`] while a start is running
    /// - any error returned by the lifecycle registry
    pub async fn stop(&self) -> Result<()> {
        self.run(Operation::Stop).await
    }

    /// Wait until the application is in `state`
    ///
    /// Returns immediately if it already is.
    pub async fn wait_for(&self, state: State) {
        let mut events = self.subscribe();
        if self.state() == state {
            return;
        }
        loop {
            match events.recv().await {
                Ok(LifecycleEvent::Entered(entered)) if entered == state => return,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    if self.state() == state {
                        return;
                    }
                }
                Err(RecvError::Closed) => return,
            }
        }
    }

    /// Decide what `operation` does in the current state, and claim the
    /// transition if this caller is the one to run it.
    fn begin(&self, operation: Operation) -> Result<Begin> {
        let mut core = self.inner.lock_core();
        let state = core.state;

        if state == operation.settled() || (operation == Operation::Stop && state == State::Created)
        {
            return Ok(Begin::Skip);
        }

        if state == operation.in_progress() {
            if let Some(in_flight) = &core.in_flight {
                debug_assert_eq!(in_flight.operation, operation);
                return Ok(Begin::Wait(in_flight.done.clone()));
            }
            tracing::warn!("Retrying {} of the application after a failed attempt", operation);
        } else if state.is_transitional() {
            return Err(LifecycleError::invalid_state(operation, state));
        }

        let (done, receiver) = watch::channel(None);
        core.in_flight = Some(InFlight {
            operation,
            done: receiver,
        });
        if state != operation.in_progress() {
            self.inner.transition(&mut core, operation.in_progress());
        }
        Ok(Begin::Run(done))
    }

    async fn run(&self, operation: Operation) -> Result<()> {
        let done = match self.begin(operation)? {
            Begin::Skip => return Ok(()),
            Begin::Wait(done) => return Self::wait(operation, done).await,
            Begin::Run(done) => done,
        };

        let mut flight = Flight {
            inner: &self.inner,
            operation,
            done,
            settled: false,
        };
        let result = self.drive(operation).await;
        flight.settle(result.as_ref().map(|_| ()).map_err(ToString::to_string));
        result
    }

    async fn wait(operation: Operation, mut done: watch::Receiver<Option<Outcome>>) -> Result<()> {
        tracing::debug!("Application {} already in progress; waiting", operation);
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(message)) => Err(LifecycleError::TransitionFailed { operation, message }),
            None => Err(LifecycleError::TransitionFailed {
                operation,
                message: "transition was abandoned".to_string(),
            }),
        }
    }

    /// The start/stop sequence proper, run by exactly one caller per transition
    async fn drive(&self, operation: Operation) -> Result<()> {
        let shutdown = &self.inner.shutdown;
        match operation {
            Operation::Start => {
                tracing::info!("Starting application...");
                shutdown.arm(self.downgrade())?;
                self.registry()?.start().await?;
                tracing::info!("Application started");
            }
            Operation::Stop => {
                tracing::info!("Stopping application...");
                if !shutdown.is_shutting_down() {
                    shutdown.disarm();
                }
                self.registry()?.stop().await?;
                tracing::info!("Application stopped");
            }
        }
        Ok(())
    }

    fn registry(&self) -> Result<Arc<dyn LifecycleRegistry>> {
        Ok(self.inner.container.resolve_trait::<dyn LifecycleRegistry>()?)
    }
}

type PendingObserver = Box<dyn FnOnce(&LifecycleObserverRegistry) + Send>;

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    container: Option<Container>,
    shutdown: ShutdownOptions,
    observer_options: ObserverOptions,
    signals: Option<Arc<dyn SignalDispatcher>>,
    observers: Vec<PendingObserver>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self {
            container: None,
            shutdown: ShutdownOptions::default(),
            observer_options: ObserverOptions::default(),
            signals: None,
            observers: Vec::new(),
        }
    }

    /// Set the DI container. An empty one is used otherwise.
    pub fn container(mut self, container: Container) -> Self {
        self.container = Some(container);
        self
    }

    /// Set the shutdown options
    pub fn shutdown(mut self, shutdown: ShutdownOptions) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Set the observer ordering options of the default registry
    pub fn observer_options(mut self, options: ObserverOptions) -> Self {
        self.observer_options = options;
        self
    }

    /// Apply a loaded [`ApplicationConfig`]
    pub fn config(self, config: ApplicationConfig) -> Self {
        self.shutdown(config.shutdown)
            .observer_options(config.observers)
    }

    /// Use `signals` instead of the process-wide dispatcher
    pub fn signals(mut self, signals: Arc<dyn SignalDispatcher>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Register an observer in the default group
    pub fn observer<T>(self, observer: Arc<RwLock<T>>, name: impl Into<String>) -> Self
    where
        T: LifecycleObserver + 'static,
    {
        self.observer_in_group(observer, name, DEFAULT_GROUP)
    }

    /// Register an observer in `group`
    pub fn observer_in_group<T>(
        mut self,
        observer: Arc<RwLock<T>>,
        name: impl Into<String>,
        group: impl Into<String>,
    ) -> Self
    where
        T: LifecycleObserver + 'static,
    {
        let name = name.into();
        let group = group.into();
        self.observers.push(Box::new(move |registry| {
            registry.register_in_group(observer, name, group)
        }));
        self
    }

    /// Build the application
    ///
    /// The application is left in the `created` state.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Dependency`] if observers were registered but
    /// the container binds a custom [`LifecycleRegistry`].
    pub fn build(self) -> Result<Application> {
        let signals = self
            .signals
            .unwrap_or_else(|| ProcessSignals::global() as Arc<dyn SignalDispatcher>);
        let app = Application::assemble(
            self.container.unwrap_or_default(),
            self.shutdown,
            self.observer_options,
            signals,
        );

        if !self.observers.is_empty() {
            let registry = app.container().resolve::<LifecycleObserverRegistry>()?;
            for register in self.observers {
                register(&registry);
            }
        }

        Ok(app)
    }
}
