//! Service container: registration, lifetimes and per-request scopes.
//!
//! ```text
//! ServiceCollection ──build()──▶ ServiceProvider ──create_scope()──▶ Scope
//!   (startup, mutable)            (shared, immutable)                 (one per request)
//! ```
//!
//! A registration maps a `(type, optional key)` pair to a [`Lifetime`] and a
//! factory. Keyed and unkeyed registrations of the same type are independent
//! identities, so several differently-managed instances of one service type
//! can coexist.
//!
//! ```rust
//! use std::sync::Arc;
//! use pillole::{CounterService, CounterStore, Lifetime, ServiceCollection};
//!
//! let provider = ServiceCollection::new()
//!     .add_instance(CounterStore::new())
//!     .add_keyed("myService", Lifetime::Scoped, |s| {
//!         Ok(CounterService::new(s.resolve::<CounterStore>()?))
//!     })
//!     .build();
//!
//! let scope = provider.create_scope();
//! let a = scope.resolve_keyed::<CounterService>("myService").unwrap();
//! let b = scope.resolve_keyed::<CounterService>("myService").unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! assert_eq!(a.value(), 1);
//! ```

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;

use crate::config::Configuration;
use crate::error::Error;
use crate::options::Options;

/// How many instances of a registration are created and how long each lives.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Lifetime {
    /// One instance per provider, created on first resolution.
    Singleton,
    /// One instance per [`Scope`]; repeated resolutions in a scope share it.
    Scoped,
    /// A fresh instance on every resolution.
    Transient,
}

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Scope) -> Result<Instance, Error> + Send + Sync>;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct ServiceId {
    type_id: TypeId,
    key: Option<String>,
}

impl ServiceId {
    fn of<T: 'static>(key: Option<&str>) -> Self {
        Self { type_id: TypeId::of::<T>(), key: key.map(str::to_owned) }
    }
}

struct Registration {
    source: Source,
    type_name: &'static str,
}

enum Source {
    /// Registered already built with [`ServiceCollection::add_instance`].
    Instance(Instance),
    Factory {
        lifetime: Lifetime,
        factory: Factory,
        // Held while a singleton is built so concurrent first resolutions
        // construct it once.
        singleton: Mutex<Option<Instance>>,
    },
}

// ── ServiceCollection ────────────────────────────────────────────────────────

/// Startup-time registry of services.
///
/// Each `add_*` call returns `self` so registrations chain. Registering the
/// same `(type, key)` twice replaces the earlier registration.
#[derive(Default)]
pub struct ServiceCollection {
    registrations: HashMap<ServiceId, Registration>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `lifetime`, built by `factory`.
    pub fn add<T, F>(self, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.insert::<T, F>(None, lifetime, factory)
    }

    /// Register `T` under `key` and `lifetime`. Resolve with
    /// [`Scope::resolve_keyed`].
    pub fn add_keyed<T, F>(self, key: impl Into<String>, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        let key = key.into();
        self.insert::<T, F>(Some(key.as_str()), lifetime, factory)
    }

    pub fn add_singleton<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.add(Lifetime::Singleton, factory)
    }

    pub fn add_scoped<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.add(Lifetime::Scoped, factory)
    }

    pub fn add_transient<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.add(Lifetime::Transient, factory)
    }

    pub fn add_keyed_scoped<T, F>(self, key: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.add_keyed(key, Lifetime::Scoped, factory)
    }

    /// Register an already-built singleton.
    pub fn add_instance<T>(mut self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.registrations.insert(
            ServiceId::of::<T>(None),
            Registration { source: Source::Instance(Arc::new(value)), type_name: type_name::<T>() },
        );
        self
    }

    /// Bind configuration `section` into `T` and register it as a singleton
    /// [`Options<T>`].
    ///
    /// Binding happens here, once. A missing or malformed section fails the
    /// whole startup rather than the first request.
    pub fn configure<T>(self, config: &Configuration, section: &str) -> Result<Self, Error>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let value: T = config.section(section)?;
        tracing::debug!(section, target_type = type_name::<T>(), "options bound");
        Ok(self.add_instance(Options::new(value)))
    }

    /// Freeze the registrations into a shareable provider.
    pub fn build(self) -> ServiceProvider {
        ServiceProvider { registrations: Arc::new(self.registrations) }
    }

    fn insert<T, F>(mut self, key: Option<&str>, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |scope: &Scope| {
            factory(scope).map(|value| Arc::new(value) as Instance)
        });
        self.registrations.insert(
            ServiceId::of::<T>(key),
            Registration {
                source: Source::Factory { lifetime, factory, singleton: Mutex::new(None) },
                type_name: type_name::<T>(),
            },
        );
        self
    }
}

// ── ServiceProvider ──────────────────────────────────────────────────────────

/// The built container. Cloning is one `Arc` increment.
#[derive(Clone)]
pub struct ServiceProvider {
    registrations: Arc<HashMap<ServiceId, Registration>>,
}

impl ServiceProvider {
    /// Open a resolution scope. The server opens one per request.
    pub fn create_scope(&self) -> Scope {
        Scope { provider: self.clone(), cache: Mutex::new(HashMap::new()) }
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

// ── Scope ────────────────────────────────────────────────────────────────────

/// A resolution context holding the scoped instances it has created.
///
/// Dropping the scope drops its scoped instances.
pub struct Scope {
    provider: ServiceProvider,
    cache: Mutex<HashMap<ServiceId, Instance>>,
}

impl Scope {
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.resolve_id(ServiceId::of::<T>(None))
    }

    pub fn resolve_keyed<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>, Error> {
        self.resolve_id(ServiceId::of::<T>(Some(key)))
    }

    fn resolve_id<T: Send + Sync + 'static>(&self, id: ServiceId) -> Result<Arc<T>, Error> {
        let not_registered = |key: Option<String>| Error::ServiceNotRegistered {
            type_name: type_name::<T>(),
            key,
        };
        let Some(reg) = self.provider.registrations.get(&id) else {
            return Err(not_registered(id.key));
        };

        let instance = match &reg.source {
            Source::Instance(instance) => Arc::clone(instance),
            Source::Factory { lifetime, factory, singleton } => match lifetime {
                Lifetime::Singleton => self.singleton(&id, reg.type_name, factory, singleton)?,
                Lifetime::Scoped => self.scoped(&id, reg.type_name, factory)?,
                Lifetime::Transient => {
                    let _building = Building::enter(&self.provider, &id, reg.type_name)?;
                    factory(self)?
                }
            },
        };

        instance.downcast::<T>().map_err(|_| not_registered(id.key))
    }

    fn singleton(
        &self,
        id: &ServiceId,
        type_name: &'static str,
        factory: &Factory,
        slot: &Mutex<Option<Instance>>,
    ) -> Result<Instance, Error> {
        // Entered before taking the lock: a factory that reaches its own
        // singleton must fail, not wait on a lock this thread holds.
        let _building = Building::enter(&self.provider, id, type_name)?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(instance) = slot.as_ref() {
            return Ok(Arc::clone(instance));
        }
        // Built in a fresh scope so a singleton never captures this
        // request's scoped instances.
        let root = self.provider.create_scope();
        let instance = factory(&root)?;
        tracing::debug!(service = type_name, "singleton constructed");
        *slot = Some(Arc::clone(&instance));
        Ok(instance)
    }

    fn scoped(&self, id: &ServiceId, type_name: &'static str, factory: &Factory) -> Result<Instance, Error> {
        if let Some(instance) = self.lock_cache().get(id) {
            return Ok(Arc::clone(instance));
        }
        // The lock is released while the factory runs: it may resolve other
        // scoped services from this same scope.
        let built = {
            let _building = Building::enter(&self.provider, id, type_name)?;
            factory(self)?
        };
        let mut cache = self.lock_cache();
        let instance = cache.entry(id.clone()).or_insert(built);
        Ok(Arc::clone(instance))
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<ServiceId, Instance>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Cycle detection ──────────────────────────────────────────────────────────

thread_local! {
    // Registrations whose factories are running on this thread, outermost
    // first. Factories are synchronous, so a cycle always re-enters on the
    // thread that started it.
    static BUILDING: RefCell<Vec<(usize, ServiceId)>> = const { RefCell::new(Vec::new()) };
}

/// Marks `(provider, id)` as under construction until dropped.
struct Building;

impl Building {
    fn enter(provider: &ServiceProvider, id: &ServiceId, type_name: &'static str) -> Result<Self, Error> {
        let provider = Arc::as_ptr(&provider.registrations) as usize;
        BUILDING.with_borrow_mut(|stack| {
            if stack.iter().any(|(p, building)| *p == provider && building == id) {
                tracing::error!(service = type_name, key = ?id.key, "circular dependency");
                return Err(Error::CircularDependency { type_name, key: id.key.clone() });
            }
            stack.push((provider, id.clone()));
            Ok(Building)
        })
    }
}

impl Drop for Building {
    fn drop(&mut self) {
        BUILDING.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cached", &self.lock_cache().len())
            .finish()
    }
}
