use crate::di::Container;
use crate::lifecycle::LifecycleRegistry;
use std::sync::Arc;

/// Collects the services an application needs before it is built
///
/// Each service is registered once and shared. A trait binding makes a service
/// resolvable as `Arc<dyn Trait>`; this is how the lifecycle finds its
/// `dyn LifecycleRegistry`, which [`registry`](Self::registry) sets up in one call.
///
/// # Example
/// ```
/// use armature::ContainerBuilder;
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {}
/// struct SystemClock;
/// impl Clock for SystemClock {}
///
/// let container = ContainerBuilder::new()
///     .register(SystemClock)
///     .bind::<dyn Clock, SystemClock, _>(|c| c as Arc<dyn Clock>)
///     .build();
/// assert!(container.resolve_trait::<dyn Clock>().is_ok());
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: 'static + Send + Sync>(mut self, service: T) -> Self {
        self.container.register(service);
        self
    }

    /// Register a service that is already shared elsewhere
    pub fn register_arc<T: 'static + Send + Sync>(mut self, service: Arc<T>) -> Self {
        self.container.register_arc(service);
        self
    }

    /// Make `Impl` resolvable as `Arc<Trait>` through `caster`
    ///
    /// Order does not matter: `Impl` may be registered before or after the binding.
    pub fn bind<Trait, Impl, F>(mut self, caster: F) -> Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        Impl: 'static + Send + Sync,
        F: Fn(Arc<Impl>) -> Arc<Trait> + 'static + Send + Sync,
    {
        self.container.register_trait::<Trait, Impl, F>(caster);
        self
    }

    /// Use `registry` as the application's lifecycle registry
    ///
    /// Replaces the default observer registry the application would otherwise bind.
    pub fn registry<R: LifecycleRegistry + 'static>(self, registry: Arc<R>) -> Self {
        self.register_arc(registry)
            .bind::<dyn LifecycleRegistry, R, _>(|r| r as Arc<dyn LifecycleRegistry>)
    }

    pub fn build(self) -> Container {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Result;
    use async_trait::async_trait;

    struct NoopRegistry;

    #[async_trait]
    impl LifecycleRegistry for NoopRegistry {
        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_is_resolvable_both_ways() {
        let registry = Arc::new(NoopRegistry);
        let container = ContainerBuilder::new().registry(Arc::clone(&registry)).build();

        assert!(container.contains::<dyn LifecycleRegistry>());
        let concrete = container.resolve::<NoopRegistry>().unwrap();
        assert!(Arc::ptr_eq(&concrete, &registry));
        assert!(container.resolve_trait::<dyn LifecycleRegistry>().is_ok());
    }
}
