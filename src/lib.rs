//! # Armature
//!
//! An application container with built-in dependency injection and a
//! coordinated start/stop lifecycle for Rust services.
//!
//! ## Features
//!
//! - **Dependency Injection**: type-keyed container with `Arc<dyn Trait>` bindings
//! - **Lifecycle State Machine**: `created → starting → started → stopping → stopped`,
//!   with concurrent `start()`/`stop()` calls collapsed into one sequence
//! - **Lifecycle Observers**: components started in group order and stopped in reverse
//! - **Graceful Shutdown**: SIGTERM-driven stop bounded by a grace period
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use armature::prelude::*;
//! use std::time::Duration;
//!
//! struct Database;
//!
//! #[async_trait]
//! impl LifecycleObserver for Database {
//!     async fn start(&mut self) -> Result<(), LifecycleError> {
//!         tracing::info!("connected");
//!         Ok(())
//!     }
//!
//!     async fn stop(&mut self) -> Result<(), LifecycleError> {
//!         tracing::info!("disconnected");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LifecycleError> {
//!     let app = Application::builder()
//!         .container(ContainerBuilder::new().build())
//!         .shutdown(ShutdownOptions::new().grace_period(Duration::from_secs(10)))
//!         .observer(Arc::new(RwLock::new(Database)), "Database")
//!         .build()?;
//!
//!     app.start().await?;
//!
//!     // SIGTERM stops the application and then terminates the process.
//!     app.wait_for(State::Stopped).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod di;
pub mod error;
pub mod lifecycle;

// Re-export core types
pub use config::{ApplicationConfig, ConfigService};
pub use di::{Container, ContainerBuilder};
pub use error::{ArmatureError, Result};
pub use lifecycle::{Application, ApplicationBuilder, LifecycleError, State};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use armature::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ApplicationConfig, ConfigService};
    pub use crate::di::{Container, ContainerBuilder};
    pub use crate::error::ArmatureError;
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, InMemorySignals, LifecycleError, LifecycleEvent,
        LifecycleObserver, LifecycleObserverRegistry, LifecycleRegistry, ObserverOptions,
        ProcessSignals, ShutdownOptions, Signal, SignalDispatcher, State,
    };
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use tokio::sync::RwLock;
}
