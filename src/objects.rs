//! # Object registry: a minimal dependency-injection store.
//!
//! Callbacks receive shared collaborators (notification senders, status-bar
//! updaters, ...) through the [`Inject`](crate::Inject) behavior, which resolves
//! [`Dependency`] identifiers here.
//!
//! ## Rules
//! - Objects are singletons keyed by name.
//! - A type identifier ([`Dependency::of`]) is keyed by its Rust type name and is
//!   built lazily with `T::default()` on first lookup.
//! - A name identifier ([`Dependency::named`]) must be registered up front.
//! - An already-built value cannot be registered without a name.
//!
//! ```rust
//! use deskvisor::{Dependency, ObjectRegistry};
//!
//! #[derive(Default)]
//! struct Notifier { app: String }
//!
//! let objects = ObjectRegistry::new();
//! let a = objects.get_as::<Notifier>(&Dependency::of::<Notifier>()).unwrap();
//! let b = objects.get_as::<Notifier>(&Dependency::of::<Notifier>()).unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! ```

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::RegistryError;

/// A registered singleton.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Identifier of an injectable object.
#[derive(Clone)]
pub struct Dependency {
    name: Cow<'static, str>,
    build: Option<fn() -> Object>,
}

impl Dependency {
    /// Identifies `T` by its type name; it is built with `T::default()` when absent.
    pub fn of<T: Default + Send + Sync + 'static>() -> Self {
        Self {
            name: Cow::Borrowed(type_name::<T>()),
            build: Some(build_default::<T>),
        }
    }

    /// Identifies an object registered under an explicit name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            build: None,
        }
    }

    /// Lookup name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("buildable", &self.build.is_some())
            .finish()
    }
}

fn build_default<T: Default + Send + Sync + 'static>() -> Object {
    Arc::new(T::default())
}

/// Name-keyed store of shared objects.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<String, Object>>,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an already-built value. A name is mandatory for values.
    pub fn register_value<T: Send + Sync + 'static>(
        &self,
        value: T,
        name: Option<&str>,
    ) -> Result<(), RegistryError> {
        let Some(name) = name else {
            return Err(RegistryError::Unnamed {
                type_name: type_name::<T>(),
            });
        };
        self.insert(name.to_string(), Arc::new(value));
        Ok(())
    }

    /// Builds the object behind a type identifier and stores it under `name`,
    /// or under the type name when `name` is `None`. Replaces any previous entry.
    pub fn register(&self, dep: &Dependency, name: Option<&str>) -> Result<Object, RegistryError> {
        let build = dep.build.ok_or_else(|| RegistryError::NotFound {
            name: dep.name().to_string(),
        })?;
        let obj = build();
        let key = name.unwrap_or(dep.name()).to_string();
        self.insert(key, Arc::clone(&obj));
        Ok(obj)
    }

    /// Returns the stored object, building and storing it first for type identifiers.
    pub fn get(&self, dep: &Dependency) -> Result<Object, RegistryError> {
        if let Some(obj) = self.lookup(dep.name()) {
            return Ok(obj);
        }
        let build = dep.build.ok_or_else(|| RegistryError::NotFound {
            name: dep.name().to_string(),
        })?;

        // Built outside the lock: constructors may themselves use the registry.
        let built = build();
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            objects.entry(dep.name().to_string()).or_insert(built),
        ))
    }

    /// Like [`get`](Self::get), downcast to `T`.
    pub fn get_as<T: Send + Sync + 'static>(&self, dep: &Dependency) -> Result<Arc<T>, RegistryError> {
        self.get(dep)?
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                name: dep.name().to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Whether an object is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, name: &str) -> Option<Object> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn insert(&self, name: String, obj: Object) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, obj);
    }
}
