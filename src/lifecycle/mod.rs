//! Application Lifecycle
//!
//! This module provides the application state machine, the registry that
//! starts and stops lifecycle observers as a unit, and signal-driven graceful
//! shutdown.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. DI Container Creation
//!    ↓
//! 2. Observer Registration
//!    ↓
//! 3. Application::start()              created/stopped → starting
//!    ├─ arm shutdown signal listener
//!    └─ LifecycleRegistry::start()     ← observers start, group by group
//!    ↓                                 starting → started
//! [Running...]
//!    ↓
//! 4. Application::stop() or a shutdown signal (SIGTERM)
//!    ↓                                 started → stopping
//! 5. LifecycleRegistry::stop()         ← observers stop, in reverse
//!    ↓                                 stopping → stopped
//! 6. Signal re-raised (signal-triggered shutdown only)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use armature::lifecycle::{Application, LifecycleObserver, LifecycleError};
//! use async_trait::async_trait;
//!
//! pub struct DatabaseService {
//!     config: Arc<DatabaseConfig>,
//! }
//!
//! #[async_trait]
//! impl LifecycleObserver for DatabaseService {
//!     async fn start(&mut self) -> Result<(), LifecycleError> {
//!         tracing::info!("Opening database connections");
//!         Ok(())
//!     }
//!
//!     async fn stop(&mut self) -> Result<(), LifecycleError> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//! ```

mod application;
mod error;
mod events;
mod registry;
mod shutdown;
mod signal;
mod state;
mod traits;

pub use application::{Application, ApplicationBuilder};
pub use error::{LifecycleError, Result};
pub use events::{LifecycleEvent, LifecycleEvents};
pub use registry::{DEFAULT_GROUP, LifecycleObserverRegistry, ObserverOptions};
pub use shutdown::{ShutdownCoordinator, ShutdownOptions};
pub use signal::{
    DEFAULT_MAX_LISTENERS, InMemorySignals, ListenerId, ProcessSignals, Signal, SignalDispatcher,
    SignalListener,
};
pub use state::{Operation, State};
pub use traits::{LifecycleObserver, LifecycleRegistry};
