//! Process signal dispatching
//!
//! OS signal delivery is a process-wide resource. Every application owns one
//! [`SignalListener`] and registers it against a [`SignalDispatcher`]; the
//! dispatcher fans each delivered signal out to all listeners registered for it.

use super::{LifecycleError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use strum_macros::{Display, EnumString, IntoStaticStr};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Listener limit per signal above which registration logs a leak warning.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// A termination-style OS signal
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum Signal {
    #[strum(serialize = "SIGTERM")]
    #[serde(rename = "SIGTERM")]
    Term,
    #[strum(serialize = "SIGINT")]
    #[serde(rename = "SIGINT")]
    Int,
    #[strum(serialize = "SIGHUP")]
    #[serde(rename = "SIGHUP")]
    Hup,
    #[strum(serialize = "SIGQUIT")]
    #[serde(rename = "SIGQUIT")]
    Quit,
    #[strum(serialize = "SIGUSR1")]
    #[serde(rename = "SIGUSR1")]
    Usr1,
    #[strum(serialize = "SIGUSR2")]
    #[serde(rename = "SIGUSR2")]
    Usr2,
}

impl Signal {
    /// The platform's number for this signal
    #[cfg(unix)]
    pub fn number(self) -> i32 {
        self.kind().as_raw_value()
    }

    /// The POSIX number for this signal
    #[cfg(not(unix))]
    pub fn number(self) -> i32 {
        match self {
            Signal::Hup => 1,
            Signal::Int => 2,
            Signal::Quit => 3,
            Signal::Usr1 => 10,
            Signal::Usr2 => 12,
            Signal::Term => 15,
        }
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            Signal::Term => SignalKind::terminate(),
            Signal::Int => SignalKind::interrupt(),
            Signal::Hup => SignalKind::hangup(),
            Signal::Quit => SignalKind::quit(),
            Signal::Usr1 => SignalKind::user_defined1(),
            Signal::Usr2 => SignalKind::user_defined2(),
        }
    }
}

/// Identity of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type SignalCallback = Arc<dyn Fn(Signal) + Send + Sync>;

/// Exit the way the default disposition of `signal` would be reported
fn exit_with(signal: Signal) {
    std::process::exit(128 + signal.number());
}

/// A callback invoked when a signal is delivered
///
/// Clones share the same [`ListenerId`], so registering a clone twice is the
/// same as registering it once.
#[derive(Clone)]
pub struct SignalListener {
    id: ListenerId,
    callback: SignalCallback,
}

impl SignalListener {
    pub fn new(callback: impl Fn(Signal) + Send + Sync + 'static) -> Self {
        Self {
            id: ListenerId::next(),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn notify(&self, signal: Signal) {
        (self.callback)(signal)
    }
}

impl fmt::Debug for SignalListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalListener").field("id", &self.id).finish()
    }
}

/// Abstraction over the process-wide signal dispatcher
pub trait SignalDispatcher: Send + Sync {
    /// Register `listener` for `signal`. Registering the same listener twice is a no-op.
    ///
    /// # Errors
    /// Returns [`LifecycleError::SignalSetup`] if the OS handler cannot be installed.
    fn add_listener(&self, signal: Signal, listener: SignalListener) -> Result<()>;

    /// Deregister a listener. Unknown listeners are ignored.
    fn remove_listener(&self, signal: Signal, id: ListenerId);

    /// Number of listeners currently registered for `signal`
    fn listener_count(&self, signal: Signal) -> usize;

    /// Listener count per signal considered a potential leak
    fn max_listeners(&self) -> usize {
        DEFAULT_MAX_LISTENERS
    }

    /// Raise `signal` against the current process
    fn raise(&self, signal: Signal);
}

/// Listener bookkeeping shared by the dispatchers
#[derive(Default)]
struct ListenerTable {
    listeners: DashMap<Signal, Vec<SignalListener>>,
}

impl ListenerTable {
    fn add(&self, signal: Signal, listener: SignalListener) {
        let mut entry = self.listeners.entry(signal).or_default();
        if !entry.iter().any(|l| l.id == listener.id) {
            entry.push(listener);
        }
    }

    fn remove(&self, signal: Signal, id: ListenerId) {
        if let Some(mut entry) = self.listeners.get_mut(&signal) {
            entry.retain(|l| l.id != id);
        }
    }

    fn count(&self, signal: Signal) -> usize {
        self.listeners.get(&signal).map_or(0, |l| l.len())
    }

    /// Deliver `signal` to a snapshot of its listeners. Returns how many were notified.
    fn dispatch(&self, signal: Signal) -> usize {
        // Snapshot first: listeners may deregister themselves while running.
        let snapshot = self
            .listeners
            .get(&signal)
            .map(|l| l.value().clone())
            .unwrap_or_default();
        for listener in &snapshot {
            listener.notify(signal);
        }
        snapshot.len()
    }

    /// Dispatch `signal`, falling back to `unhandled` when nobody is listening.
    fn deliver(&self, signal: Signal, unhandled: &SignalCallback) {
        if self.dispatch(signal) == 0 {
            tracing::warn!("No listeners left for {}, terminating process", signal);
            unhandled(signal);
        }
    }
}

/// Dispatcher backed by the real OS signal handlers
///
/// A tokio signal stream is installed the first time a listener registers for a
/// signal. The OS handler it sets up replaces the default disposition for the
/// life of the process, so a signal that reaches no listener terminates the
/// process with status `128 + signo`.
///
/// The stream runs on the runtime that registered the listener. If that runtime
/// shuts down, the next registration installs a fresh stream.
pub struct ProcessSignals {
    listeners: Arc<ListenerTable>,
    installed: DashMap<Signal, JoinHandle<()>>,
    unhandled: SignalCallback,
    max_listeners: usize,
}

impl Default for ProcessSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSignals {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(ListenerTable::default()),
            installed: DashMap::new(),
            unhandled: Arc::new(exit_with),
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }

    /// The dispatcher shared by every application in this process
    pub fn global() -> Arc<ProcessSignals> {
        static GLOBAL: OnceLock<Arc<ProcessSignals>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ProcessSignals::new())))
    }

    pub fn with_max_listeners(mut self, max_listeners: usize) -> Self {
        self.max_listeners = max_listeners;
        self
    }

    /// Replace what happens to a signal that reaches no listener
    ///
    /// Defaults to exiting with `128 + signo`.
    pub fn on_unhandled(mut self, unhandled: impl Fn(Signal) + Send + Sync + 'static) -> Self {
        self.unhandled = Arc::new(unhandled);
        self
    }

    fn install(&self, signal: Signal) -> Result<()> {
        let slot = match self.installed.entry(signal) {
            Entry::Occupied(slot) if !slot.get().is_finished() => return Ok(()),
            slot => slot,
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LifecycleError::signal_setup(format!("{signal}: {e}")))?;
        let listeners = Arc::clone(&self.listeners);
        let unhandled = Arc::clone(&self.unhandled);

        #[cfg(unix)]
        let handle = {
            let mut stream = tokio::signal::unix::signal(signal.kind())
                .map_err(|e| LifecycleError::signal_setup(format!("{signal}: {e}")))?;
            runtime.spawn(async move {
                while stream.recv().await.is_some() {
                    tracing::info!("Received {} signal", signal);
                    listeners.deliver(signal, &unhandled);
                }
            })
        };

        #[cfg(not(unix))]
        let handle = {
            if signal != Signal::Int {
                return Err(LifecycleError::signal_setup(format!(
                    "{signal} is not supported on this platform"
                )));
            }
            runtime.spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received Ctrl+C signal");
                    listeners.deliver(signal, &unhandled);
                }
            })
        };

        tracing::debug!("Installed {} handler", signal);
        slot.insert(handle);
        Ok(())
    }
}

impl SignalDispatcher for ProcessSignals {
    fn add_listener(&self, signal: Signal, listener: SignalListener) -> Result<()> {
        self.install(signal)?;
        self.listeners.add(signal, listener);
        Ok(())
    }

    fn remove_listener(&self, signal: Signal, id: ListenerId) {
        self.listeners.remove(signal, id);
    }

    fn listener_count(&self, signal: Signal) -> usize {
        self.listeners.count(signal)
    }

    fn max_listeners(&self) -> usize {
        self.max_listeners
    }

    fn raise(&self, signal: Signal) {
        self.listeners.deliver(signal, &self.unhandled);
    }
}

/// Dispatcher that never touches the OS
///
/// Signals are delivered with [`emit`](Self::emit); raised signals are recorded
/// and delivered to whichever listeners are still registered.
pub struct InMemorySignals {
    listeners: ListenerTable,
    raised: watch::Sender<Vec<Signal>>,
    max_listeners: usize,
}

impl Default for InMemorySignals {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySignals {
    pub fn new() -> Self {
        let (raised, _) = watch::channel(Vec::new());
        Self {
            listeners: ListenerTable::default(),
            raised,
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }

    pub fn with_max_listeners(mut self, max_listeners: usize) -> Self {
        self.max_listeners = max_listeners;
        self
    }

    /// Deliver `signal` as if the OS had sent it. Returns how many listeners ran.
    pub fn emit(&self, signal: Signal) -> usize {
        self.listeners.dispatch(signal)
    }

    /// Every signal raised so far, oldest first
    pub fn raised(&self) -> Vec<Signal> {
        self.raised.borrow().to_vec()
    }

    /// Wait until at least `count` signals have been raised
    pub async fn wait_raised(&self, count: usize) -> Vec<Signal> {
        let mut rx = self.raised.subscribe();
        match rx.wait_for(|raised| raised.len() >= count).await {
            Ok(raised) => raised.to_vec(),
            Err(_) => self.raised(),
        }
    }
}

impl SignalDispatcher for InMemorySignals {
    fn add_listener(&self, signal: Signal, listener: SignalListener) -> Result<()> {
        self.listeners.add(signal, listener);
        Ok(())
    }

    fn remove_listener(&self, signal: Signal, id: ListenerId) {
        self.listeners.remove(signal, id);
    }

    fn listener_count(&self, signal: Signal) -> usize {
        self.listeners.count(signal)
    }

    fn max_listeners(&self) -> usize {
        self.max_listeners
    }

    fn raise(&self, signal: Signal) {
        tracing::debug!("Raised {}", signal);
        self.raised.send_modify(|raised| raised.push(signal));
        self.listeners.dispatch(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_listener() -> (SignalListener, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let listener = SignalListener::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (listener, hits)
    }

    #[cfg(unix)]
    fn send_to_self(signal: Signal) {
        let status = std::process::Command::new("kill")
            .arg(format!("-{}", signal.number()))
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::Term.to_string(), "SIGTERM");
        assert_eq!(Signal::from_str("SIGINT").unwrap(), Signal::Int);
        assert!(Signal::from_str("SIGKILL").is_err());
        assert_eq!(Signal::Term.number(), 15);
        assert_eq!(Signal::Int.number(), 2);

        let parsed: Vec<Signal> = serde_json::from_str(r#"["SIGTERM", "SIGHUP"]"#).unwrap();
        assert_eq!(parsed, vec![Signal::Term, Signal::Hup]);
    }

    #[test]
    fn test_add_listener_is_idempotent() {
        let signals = InMemorySignals::new();
        let (listener, hits) = counting_listener();

        signals.add_listener(Signal::Term, listener.clone()).unwrap();
        signals.add_listener(Signal::Term, listener.clone()).unwrap();
        assert_eq!(signals.listener_count(Signal::Term), 1);

        assert_eq!(signals.emit(Signal::Term), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_only_own_listener() {
        let signals = InMemorySignals::new();
        let (mine, my_hits) = counting_listener();
        let (theirs, their_hits) = counting_listener();

        signals.add_listener(Signal::Term, mine.clone()).unwrap();
        signals.add_listener(Signal::Term, theirs).unwrap();

        signals.remove_listener(Signal::Term, mine.id());
        signals.remove_listener(Signal::Term, mine.id());
        assert_eq!(signals.listener_count(Signal::Term), 1);

        signals.emit(Signal::Term);
        assert_eq!(my_hits.load(Ordering::SeqCst), 0);
        assert_eq!(their_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_only_matching_signal() {
        let signals = InMemorySignals::new();
        let (listener, hits) = counting_listener();
        signals.add_listener(Signal::Int, listener).unwrap();

        assert_eq!(signals.emit(Signal::Term), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_raise_is_recorded_and_delivered() {
        let signals = InMemorySignals::new();
        let (listener, hits) = counting_listener();
        signals.add_listener(Signal::Term, listener).unwrap();

        signals.raise(Signal::Term);

        assert_eq!(signals.wait_raised(1).await, vec![Signal::Term]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_process_signals_tracks_listeners() {
        let signals = ProcessSignals::new().on_unhandled(|_| {});
        let (listener, _) = counting_listener();

        signals.add_listener(Signal::Usr2, listener.clone()).unwrap();
        assert_eq!(signals.listener_count(Signal::Usr2), 1);

        signals.remove_listener(Signal::Usr2, listener.id());
        assert_eq!(signals.listener_count(Signal::Usr2), 0);
    }

    #[test]
    fn test_raise_without_listeners_terminates() {
        let terminated = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = Arc::clone(&terminated);
        let signals =
            ProcessSignals::new().on_unhandled(move |signal| record.lock().unwrap().push(signal));
        let (listener, hits) = counting_listener();

        signals.raise(Signal::Term);
        assert_eq!(*terminated.lock().unwrap(), vec![Signal::Term]);

        // Listener registration needs a runtime; the table alone decides delivery.
        signals.listeners.add(Signal::Term, listener);
        signals.raise(Signal::Term);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(terminated.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_os_signal_without_listeners_terminates() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let signals = ProcessSignals::new().on_unhandled(move |signal| {
            let _ = tx.send(signal);
        });
        let (listener, hits) = counting_listener();

        signals.add_listener(Signal::Usr1, listener.clone()).unwrap();
        signals.remove_listener(Signal::Usr1, listener.id());
        send_to_self(Signal::Usr1);

        let terminated = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(terminated, Some(Signal::Usr1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_reinstalls_after_runtime_shutdown() {
        let signals = ProcessSignals::new().on_unhandled(|_| {});
        let runtime = || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
        };

        let (first, _) = counting_listener();
        runtime().block_on(async { signals.add_listener(Signal::Usr2, first.clone()).unwrap() });
        signals.remove_listener(Signal::Usr2, first.id());

        let (second, hits) = counting_listener();
        runtime().block_on(async {
            signals.add_listener(Signal::Usr2, second).unwrap();
            send_to_self(Signal::Usr2);
            tokio::time::timeout(Duration::from_secs(5), async {
                while hits.load(Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
        });
    }
}
