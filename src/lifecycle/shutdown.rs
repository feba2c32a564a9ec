//! Graceful Shutdown
//!
//! Turns OS termination signals into a graceful stop of the application,
//! bounded by an optional grace period.

use super::application::{Application, WeakApplication};
use super::{Result, Signal, SignalDispatcher, SignalListener};
use serde::{Deserialize, Deserializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Which signals trigger a graceful shutdown, and how long it may take
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShutdownOptions {
    /// Signals that trigger a graceful stop
    pub signals: Vec<Signal>,
    /// Deadline for the graceful stop, in milliseconds when deserialized.
    /// `None` waits for the stop however long it takes.
    #[serde(deserialize_with = "grace_period_ms")]
    pub grace_period: Option<Duration>,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            signals: vec![Signal::Term],
            grace_period: None,
        }
    }
}

impl ShutdownOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(mut self, signals: impl IntoIterator<Item = Signal>) -> Self {
        self.signals = signals.into_iter().collect();
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = Some(grace_period);
        self
    }
}

fn grace_period_ms<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

/// Coordinates signal-driven shutdown for one application
///
/// The coordinator owns a single [`SignalListener`], created the first time
/// the application starts. On the first matching signal it:
///
/// 1. marks the application as shutting down (later signals are ignored)
/// 2. arms the grace-period deadline, if one is configured
/// 3. stops the application
/// 4. cancels the deadline, deregisters its listener and re-raises the signal
///
/// If the deadline fires first, the listener is deregistered and the signal is
/// re-raised without waiting for the stop to finish.
pub struct ShutdownCoordinator {
    options: ShutdownOptions,
    dispatcher: Arc<dyn SignalDispatcher>,
    listener: Mutex<Option<SignalListener>>,
    shutting_down: AtomicBool,
}

impl ShutdownCoordinator {
    pub(crate) fn new(options: ShutdownOptions, dispatcher: Arc<dyn SignalDispatcher>) -> Self {
        Self {
            options,
            dispatcher,
            listener: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &ShutdownOptions {
        &self.options
    }

    /// Whether a signal-triggered shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Whether the listener is currently registered for every configured signal
    pub fn is_armed(&self) -> bool {
        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        listener.is_some()
            && self
                .options
                .signals
                .iter()
                .all(|&signal| self.dispatcher.listener_count(signal) > 0)
    }

    /// Register this application's listener for the configured signals
    ///
    /// The listener is created on the first call and reused afterwards, so
    /// calling this again after [`disarm`](Self::disarm) restores the same one.
    pub(crate) fn arm(&self, app: WeakApplication) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| {
                tracing::debug!("Creating shutdown listener for {:?}", self.options.signals);
                SignalListener::new(move |signal| {
                    if let Some(app) = app.upgrade() {
                        app.shutdown_coordinator().on_signal(&app, signal);
                    }
                })
            })
            .clone();

        for &signal in &self.options.signals {
            let registered = self.dispatcher.listener_count(signal);
            let max = self.dispatcher.max_listeners();
            if registered >= max {
                tracing::warn!(
                    "{} already has {} listeners (max {}); possible listener leak",
                    signal,
                    registered,
                    max
                );
            }
            self.dispatcher.add_listener(signal, listener.clone())?;
        }
        Ok(())
    }

    /// Deregister this application's listener. Safe to call repeatedly.
    pub(crate) fn disarm(&self) {
        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(listener) = listener.as_ref() {
            for &signal in &self.options.signals {
                self.dispatcher.remove_listener(signal, listener.id());
            }
            tracing::debug!("Removed shutdown listener");
        }
    }

    fn on_signal(&self, app: &Application, signal: Signal) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("Received {} outside a tokio runtime; ignoring", signal);
            return;
        };
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress; ignoring {}", signal);
            return;
        }

        tracing::info!("Received {}, starting graceful shutdown...", signal);

        let deadline = self.options.grace_period.map(|grace| {
            let app = app.clone();
            runtime.spawn(async move {
                tokio::time::sleep(grace).await;
                tracing::warn!(
                    "Graceful shutdown exceeded {:?}, forcing termination on {}",
                    grace,
                    signal
                );
                let coordinator = app.shutdown_coordinator();
                coordinator.disarm();
                coordinator.dispatcher.raise(signal);
            })
        });

        let app = app.clone();
        runtime.spawn(async move {
            match app.stop().await {
                Ok(()) => tracing::info!("Graceful shutdown complete"),
                Err(e) => tracing::error!("Error during graceful shutdown: {}", e),
            }
            if let Some(deadline) = deadline {
                deadline.abort();
            }
            let coordinator = app.shutdown_coordinator();
            coordinator.disarm();
            coordinator.dispatcher.raise(signal);
        });
    }
}
