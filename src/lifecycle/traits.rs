//! Lifecycle contracts
//!
//! [`LifecycleObserver`] is implemented by components that take part in
//! application start and stop. [`LifecycleRegistry`] is the aggregate the
//! application resolves from the container and drives as a unit.

use super::LifecycleError;
use async_trait::async_trait;

/// A component with start/stop hooks coordinated by the application
///
/// Both hooks default to no-ops, so a component only implements the side it
/// cares about.
///
/// # Example
///
/// ```rust,ignore
/// use armature::lifecycle::{LifecycleObserver, LifecycleError};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl LifecycleObserver for DatabaseService {
///     async fn start(&mut self) -> Result<(), LifecycleError> {
///         self.pool = Some(create_pool(&self.config).await
///             .map_err(|e| LifecycleError::init_failed(e.to_string()))?);
///         Ok(())
///     }
///
///     async fn stop(&mut self) -> Result<(), LifecycleError> {
///         if let Some(pool) = self.pool.take() {
///             pool.close().await;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Called when the application starts
    ///
    /// Open connections, bind listeners, start background tasks.
    async fn start(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Called when the application stops
    ///
    /// Drain servers, close connections, release resources.
    async fn stop(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Aggregate start/stop over every registered observer
///
/// The application calls `start` once per start transition and `stop` once per
/// stop transition. Ordering of the individual observers is up to the registry.
#[async_trait]
pub trait LifecycleRegistry: Send + Sync {
    async fn start(&self) -> Result<(), LifecycleError>;

    async fn stop(&self) -> Result<(), LifecycleError>;
}
