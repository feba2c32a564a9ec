use crate::error::{ArmatureError, Result};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

type AnyArc = Arc<dyn Any + Send + Sync>;

/// Turns the stored concrete instance into an `Arc<Arc<dyn Trait>>` erased as `Any`.
/// Returns `None` when the stored instance is not the bound implementation.
type CasterFn = Arc<dyn Fn(AnyArc) -> Option<AnyArc> + Send + Sync>;

/// Thread-safe dependency injection container.
///
/// Bindings are keyed by `TypeId`. Every binding is a singleton: `resolve`
/// hands out clones of the same `Arc`.
#[derive(Clone)]
pub struct Container {
    services: DashMap<TypeId, ServiceEntry>,
    trait_mappings: DashMap<TypeId, TypeId>,
    casters: DashMap<TypeId, CasterFn>,
}

#[derive(Clone)]
struct ServiceEntry {
    instance: AnyArc,
}

impl Container {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            trait_mappings: DashMap::new(),
            casters: DashMap::new(),
        }
    }

    pub fn register<T: 'static + Send + Sync>(&mut self, instance: T) -> &mut Self {
        self.register_arc(Arc::new(instance))
    }

    /// Register an instance that is already shared elsewhere.
    pub fn register_arc<T: 'static + Send + Sync>(&mut self, instance: Arc<T>) -> &mut Self {
        tracing::debug!("Binding {}", std::any::type_name::<T>());
        self.services
            .insert(TypeId::of::<T>(), ServiceEntry { instance });
        self
    }

    pub fn register_trait<Trait, Impl, F>(&mut self, caster_fn: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        Impl: 'static + Send + Sync,
        F: Fn(Arc<Impl>) -> Arc<Trait> + 'static + Send + Sync,
    {
        let trait_id = TypeId::of::<Trait>();
        let impl_id = TypeId::of::<Impl>();

        self.trait_mappings.insert(trait_id, impl_id);

        let caster: CasterFn = Arc::new(move |instance: AnyArc| {
            let concrete = instance.downcast::<Impl>().ok()?;
            let trait_obj: Arc<Trait> = caster_fn(concrete);
            Some(Arc::new(trait_obj) as AnyArc)
        });

        self.casters.insert(trait_id, caster);
        self
    }

    pub fn resolve<T: 'static + Send + Sync>(&self) -> Result<Arc<T>> {
        let entry = self
            .services
            .get(&TypeId::of::<T>())
            .ok_or_else(|| ArmatureError::DependencyNotFound {
                type_name: std::any::type_name::<T>().to_string(),
            })?;
        entry
            .instance
            .clone()
            .downcast::<T>()
            .map_err(|_| ArmatureError::DowncastFailed {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn resolve_trait<T: ?Sized + 'static + Send + Sync>(&self) -> Result<Arc<T>> {
        let requested_type_id = TypeId::of::<T>();

        let caster = self.casters.get(&requested_type_id).ok_or_else(|| {
            ArmatureError::DependencyNotFound {
                type_name: std::any::type_name::<T>().to_string(),
            }
        })?;

        let impl_type_id = self.trait_mappings.get(&requested_type_id).ok_or_else(|| {
            ArmatureError::DependencyNotFound {
                type_name: format!(
                    "No implementation mapping found for trait '{}'",
                    std::any::type_name::<T>()
                ),
            }
        })?;

        let entry =
            self.services
                .get(&*impl_type_id)
                .ok_or_else(|| ArmatureError::DependencyNotFound {
                    type_name: format!(
                        "Implementation for trait '{}' not registered",
                        std::any::type_name::<T>()
                    ),
                })?;

        let downcast_failed = || ArmatureError::DowncastFailed {
            type_name: std::any::type_name::<T>().to_string(),
        };

        // The caster yields an Arc<dyn Any> holding an Arc<T>.
        let wrapper = (caster.value())(entry.instance.clone())
            .ok_or_else(downcast_failed)?
            .downcast::<Arc<T>>()
            .map_err(|_| downcast_failed())?;
        Ok(wrapper.as_ref().clone())
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.services.contains_key(&type_id) || self.trait_mappings.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestService {
        value: i32,
    }

    trait MyTrait: Send + Sync {
        fn get_value(&self) -> i32;
    }

    struct MyTraitImpl {
        value: i32,
    }

    impl MyTrait for MyTraitImpl {
        fn get_value(&self) -> i32 {
            self.value
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut container = Container::new();
        container.register(TestService { value: 42 });
        let service = container.resolve::<TestService>().unwrap();
        assert_eq!(service.value, 42);
    }

    #[test]
    fn test_resolve_returns_same_instance() {
        let shared = Arc::new(TestService { value: 7 });
        let mut container = Container::new();
        container.register_arc(Arc::clone(&shared));

        let first = container.resolve::<TestService>().unwrap();
        let second = container.resolve::<TestService>().unwrap();
        assert!(Arc::ptr_eq(&first, &shared));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_register_and_resolve_trait() {
        let mut container = Container::new();
        container.register(MyTraitImpl { value: 99 });
        container.register_trait::<dyn MyTrait, MyTraitImpl, _>(|i| i as Arc<dyn MyTrait>);
        assert!(container.contains::<dyn MyTrait>());
        let trait_instance = container.resolve_trait::<dyn MyTrait>().unwrap();
        assert_eq!(trait_instance.get_value(), 99);
    }

    #[test]
    fn test_missing_dependency() {
        let container = Container::new();
        let err = container.resolve::<TestService>().err().unwrap();
        assert!(matches!(err, ArmatureError::DependencyNotFound { .. }));

        let err = container.resolve_trait::<dyn MyTrait>().err().unwrap();
        assert!(matches!(err, ArmatureError::DependencyNotFound { .. }));
    }

    #[test]
    fn test_trait_bound_without_implementation() {
        let mut container = Container::new();
        container.register_trait::<dyn MyTrait, MyTraitImpl, _>(|i| i as Arc<dyn MyTrait>);
        let err = container.resolve_trait::<dyn MyTrait>().err().unwrap();
        assert!(matches!(err, ArmatureError::DependencyNotFound { .. }));
    }
}
