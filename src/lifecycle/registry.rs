//! Lifecycle Observer Registry
//!
//! Holds the registered observers and runs their hooks in group order.

use super::{LifecycleError, LifecycleObserver, LifecycleRegistry, Operation, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

/// Group used by observers registered without one
pub const DEFAULT_GROUP: &str = "default";

/// Ordering options for the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObserverOptions {
    /// Groups started first, in this order. Other groups follow in the order
    /// they were first registered.
    pub ordered_groups: Vec<String>,
    /// Run the observers of one group concurrently
    pub parallel: bool,
}

/// A registered observer
#[derive(Clone)]
struct ObserverHook {
    observer: Arc<RwLock<dyn LifecycleObserver>>,
    name: String,
    group: String,
}

/// Default [`LifecycleRegistry`]
///
/// - Groups start in [`ObserverOptions::ordered_groups`] order, then the rest
///   in first-registration order; observers within a group in registration order
/// - Stop runs groups and observers in **reverse order**
/// - The first failing hook aborts the sequence and its error is returned as-is
///
/// # Example
///
/// ```rust,ignore
/// use armature::lifecycle::LifecycleObserverRegistry;
///
/// let registry = LifecycleObserverRegistry::new();
/// registry.register_in_group(db_service, "DatabaseService", "datasource");
/// registry.register_in_group(http_server, "HttpServer", "server");
///
/// registry.start().await?;
/// // ... application runs ...
/// registry.stop().await?;
/// ```
pub struct LifecycleObserverRegistry {
    options: ObserverOptions,
    hooks: StdRwLock<Vec<ObserverHook>>,
}

impl Default for LifecycleObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleObserverRegistry {
    /// Create a registry with default ordering
    pub fn new() -> Self {
        Self::with_options(ObserverOptions::default())
    }

    pub fn with_options(options: ObserverOptions) -> Self {
        Self {
            options,
            hooks: StdRwLock::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &ObserverOptions {
        &self.options
    }

    /// Register an observer in the default group
    pub fn register<T>(&self, observer: Arc<RwLock<T>>, name: impl Into<String>)
    where
        T: LifecycleObserver + 'static,
    {
        self.register_in_group(observer, name, DEFAULT_GROUP);
    }

    /// Register an observer in `group`
    pub fn register_in_group<T>(
        &self,
        observer: Arc<RwLock<T>>,
        name: impl Into<String>,
        group: impl Into<String>,
    ) where
        T: LifecycleObserver + 'static,
    {
        let hook = ObserverHook {
            observer,
            name: name.into(),
            group: group.into(),
        };
        tracing::debug!("Registered lifecycle observer {} in group {}", hook.name, hook.group);
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Get the number of registered observers
    pub fn observer_count(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Group names in start order
    pub fn groups(&self) -> Vec<String> {
        self.grouped().into_iter().map(|(group, _)| group).collect()
    }

    /// Snapshot of the observers bucketed by group, in start order
    fn grouped(&self) -> Vec<(String, Vec<ObserverHook>)> {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);

        let mut registered: Vec<(String, Vec<ObserverHook>)> = Vec::new();
        for hook in hooks.iter() {
            match registered.iter_mut().find(|(group, _)| *group == hook.group) {
                Some((_, bucket)) => bucket.push(hook.clone()),
                None => registered.push((hook.group.clone(), vec![hook.clone()])),
            }
        }

        let mut ordered = Vec::with_capacity(registered.len());
        for name in &self.options.ordered_groups {
            if let Some(pos) = registered.iter().position(|(group, _)| group == name) {
                ordered.push(registered.remove(pos));
            }
        }
        ordered.extend(registered);
        ordered
    }

    async fn run_group(&self, group: &str, hooks: Vec<ObserverHook>, op: Operation) -> Result<()> {
        tracing::debug!("Running {} for group {} ({} observers)", op, group, hooks.len());

        if !self.options.parallel || hooks.len() < 2 {
            for hook in hooks {
                invoke(hook, op).await?;
            }
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for hook in hooks {
            tasks.spawn(invoke(hook, op));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(LifecycleError::hook_failed(group, e.to_string())));
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

async fn invoke(hook: ObserverHook, op: Operation) -> Result<()> {
    tracing::debug!("{}: {}", op, hook.name);
    let mut observer = hook.observer.write().await;
    let result = match op {
        Operation::Start => observer.start().await,
        Operation::Stop => observer.stop().await,
    };
    match &result {
        Ok(()) => tracing::debug!("{} complete: {}", op, hook.name),
        Err(e) => tracing::error!("Lifecycle observer {} failed to {}: {}", hook.name, op, e),
    }
    result
}

#[async_trait]
impl LifecycleRegistry for LifecycleObserverRegistry {
    async fn start(&self) -> Result<()> {
        tracing::info!("Starting lifecycle observers...");

        let groups = self.grouped();
        let count: usize = groups.iter().map(|(_, hooks)| hooks.len()).sum();
        for (group, hooks) in groups {
            self.run_group(&group, hooks, Operation::Start).await?;
        }

        tracing::info!("Lifecycle observers started ({} observers)", count);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!("Stopping lifecycle observers...");

        let groups = self.grouped();
        let count: usize = groups.iter().map(|(_, hooks)| hooks.len()).sum();
        for (group, mut hooks) in groups.into_iter().rev() {
            hooks.reverse();
            self.run_group(&group, hooks, Operation::Stop).await?;
        }

        tracing::info!("Lifecycle observers stopped ({} observers)", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct TestService {
        started: bool,
        stopped: bool,
    }

    #[async_trait]
    impl LifecycleObserver for TestService {
        async fn start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.stopped = true;
            Ok(())
        }
    }

    struct OrderedService {
        id: &'static str,
        order: Arc<RwLock<Vec<String>>>,
        fail_on_start: bool,
    }

    impl OrderedService {
        fn new(id: &'static str, order: &Arc<RwLock<Vec<String>>>) -> Arc<RwLock<Self>> {
            Arc::new(RwLock::new(Self {
                id,
                order: Arc::clone(order),
                fail_on_start: false,
            }))
        }
    }

    #[async_trait]
    impl LifecycleObserver for OrderedService {
        async fn start(&mut self) -> Result<()> {
            if self.fail_on_start {
                return Err(LifecycleError::init_failed(format!("{} unavailable", self.id)));
            }
            self.order.write().await.push(format!("start {}", self.id));
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.order.write().await.push(format!("stop {}", self.id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lifecycle_hooks() {
        let service = Arc::new(RwLock::new(TestService {
            started: false,
            stopped: false,
        }));

        let registry = LifecycleObserverRegistry::new();
        registry.register(Arc::clone(&service), "TestService");
        assert_eq!(registry.observer_count(), 1);

        registry.start().await.unwrap();
        assert!(service.read().await.started);

        registry.stop().await.unwrap();
        assert!(service.read().await.stopped);
    }

    #[tokio::test]
    async fn test_stop_reverse_order() {
        let order = Arc::new(RwLock::new(Vec::new()));
        let registry = LifecycleObserverRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(OrderedService::new(id, &order), id);
        }

        registry.start().await.unwrap();
        registry.stop().await.unwrap();

        assert_eq!(
            *order.read().await,
            vec!["start a", "start b", "start c", "stop c", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn test_group_ordering() {
        let order = Arc::new(RwLock::new(Vec::new()));
        let registry = LifecycleObserverRegistry::with_options(ObserverOptions {
            ordered_groups: vec!["datasource".into(), "server".into()],
            parallel: false,
        });
        registry.register_in_group(OrderedService::new("http", &order), "http", "server");
        registry.register(OrderedService::new("cache", &order), "cache");
        registry.register_in_group(OrderedService::new("db", &order), "db", "datasource");

        assert_eq!(registry.groups(), vec!["datasource", "server", DEFAULT_GROUP]);

        registry.start().await.unwrap();
        registry.stop().await.unwrap();

        assert_eq!(
            *order.read().await,
            vec![
                "start db",
                "start http",
                "start cache",
                "stop cache",
                "stop http",
                "stop db"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_and_propagates() {
        let order = Arc::new(RwLock::new(Vec::new()));
        let registry = LifecycleObserverRegistry::new();
        let broken = OrderedService::new("broken", &order);
        broken.write().await.fail_on_start = true;

        registry.register(OrderedService::new("first", &order), "first");
        registry.register(broken, "broken");
        registry.register(OrderedService::new("never", &order), "never");

        let err = registry.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::InitializationFailed(ref msg) if msg == "broken unavailable"));
        assert_eq!(*order.read().await, vec!["start first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_group() {
        struct Slow;

        #[async_trait]
        impl LifecycleObserver for Slow {
            async fn start(&mut self) -> Result<()> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }
        }

        let registry = LifecycleObserverRegistry::with_options(ObserverOptions {
            ordered_groups: Vec::new(),
            parallel: true,
        });
        for i in 0..3 {
            registry.register(Arc::new(RwLock::new(Slow)), format!("Slow{}", i));
        }

        let began = tokio::time::Instant::now();
        registry.start().await.unwrap();
        assert!(began.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn test_options_from_json() {
        let options: ObserverOptions =
            serde_json::from_str(r#"{"orderedGroups": ["datasource"], "parallel": true}"#).unwrap();
        assert_eq!(options.ordered_groups, vec!["datasource"]);
        assert!(options.parallel);

        let options: ObserverOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ObserverOptions::default());
    }
}
