// Copyright 2026 wraith Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Construction deduplication.
//!
//! Equal constructor arguments yield the same shared instance for as long as anything keeps that instance alive.

use std::{
    any::{type_name, Any, TypeId},
    borrow::Cow,
    fmt::Debug,
    sync::{Arc, LazyLock},
};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use wraith_common::{
    code::{HashBuilder, Key, Referent},
    error::{ErrorKind, Result},
    metrics::{registry::noop::NoopMetricsRegistry, Boxer, RegistryOps},
    scope::Scope,
};
use wraith_memory::{Tracked, WeakValueCache, WeakValueCacheBuilder};

use crate::args::{CallArgs, InstanceKey};

/// What an instance-caching construction does with arguments that cannot form a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhashablePolicy {
    /// Log a warning and construct an uncached instance.
    #[default]
    Warn,
    /// Fail with [`ErrorKind::Unhashable`].
    Error,
}

/// A type whose construction can be deduplicated by [`instantiate`].
///
/// Caching is opt-in per type: a type gets it only by declaring `const INST_CACHING: bool = true`. Nothing is
/// inherited, a wrapper of a caching type must opt in on its own.
pub trait CachedInstance: Sized + Send + Sync + 'static {
    /// Whether constructions of this type are cached.
    const INST_CACHING: bool = false;

    /// What to do with arguments that cannot form a key.
    const ON_UNHASHABLE: UnhashablePolicy = UnhashablePolicy::Warn;

    /// Construct a new instance. The reserved bypass keyword never reaches this function.
    fn construct(args: &CallArgs) -> Result<Self>;
}

/// Return the live value of `key` in `cache`, or construct one with `build` and register it.
///
/// `build` runs outside of any cache lock and its failure is returned unchanged. If another caller registers a value for
/// `key` while `build` runs, that value wins and is returned.
#[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::instance::construct_or_reuse"))]
pub fn construct_or_reuse<K, T, S, F, E>(
    cache: &WeakValueCache<K, T, S>,
    key: K,
    build: F,
) -> std::result::Result<Tracked<T>, E>
where
    K: Key + Clone,
    T: Referent,
    S: HashBuilder,
    F: FnOnce() -> std::result::Result<T, E>,
{
    if let Ok(instance) = cache.get_or_none(&key) {
        cache.metrics().instance_hit.increase(1);
        return Ok(instance);
    }
    cache.metrics().instance_miss.increase(1);

    let instance = Tracked::new(build()?);
    Ok(cache.setdefault(key, instance))
}

/// The instance cache of one type.
///
/// Cheap to clone. Clones share the same instances.
pub struct InstanceCache<T, K = InstanceKey>
where
    T: Referent,
    K: Key + Clone,
{
    cache: WeakValueCache<K, T>,
}

impl<T, K> Clone for InstanceCache<T, K>
where
    T: Referent,
    K: Key + Clone,
{
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<T, K> Debug for InstanceCache<T, K>
where
    T: Referent,
    K: Key + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCache").field("cache", &self.cache).finish()
    }
}

impl<T, K> Default for InstanceCache<T, K>
where
    T: Referent,
    K: Key + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K> InstanceCache<T, K>
where
    T: Referent,
    K: Key + Clone,
{
    /// Create an instance cache named after `T`.
    pub fn new() -> Self {
        let registry: Arc<dyn RegistryOps> = Arc::new(NoopMetricsRegistry);
        Self::with_registry(&registry)
    }

    fn with_registry(registry: &Arc<dyn RegistryOps>) -> Self {
        let cache = WeakValueCacheBuilder::new()
            .with_name(Cow::Borrowed(type_name::<T>()))
            .with_metrics_registry(registry.clone().boxed())
            .build();
        match cache {
            Ok(cache) => Self::from_cache(cache),
            // The default shard count is never zero.
            Err(e) => unreachable!("{e}"),
        }
    }

    /// Wrap an existing weak-value cache.
    pub fn from_cache(cache: WeakValueCache<K, T>) -> Self {
        Self { cache }
    }

    /// The underlying weak-value cache.
    pub fn cache(&self) -> &WeakValueCache<K, T> {
        &self.cache
    }

    /// Return the live instance of `key`, or construct and register one.
    pub fn get_or_construct<F, E>(&self, key: K, build: F) -> std::result::Result<Tracked<T>, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        construct_or_reuse(&self.cache, key, build)
    }

    /// Count of registered instances, including the ones being dropped.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no instance is registered.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Per-type instance caches, keyed by [`TypeId`].
///
/// A cache is created the first time a caching type is instantiated. Types that have not opted in never get one.
pub struct InstanceRegistry {
    caches: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    metrics_registry: Arc<dyn RegistryOps>,
}

impl Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("types", &self.caches.read().len())
            .field("metrics_registry", &self.metrics_registry)
            .finish()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: LazyLock<InstanceRegistry> = LazyLock::new(InstanceRegistry::new);

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_metrics_registry(Arc::new(NoopMetricsRegistry))
    }

    /// Create an empty registry whose caches report to `registry`.
    pub fn with_metrics_registry(registry: Arc<dyn RegistryOps>) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            metrics_registry: registry,
        }
    }

    /// The process wide registry used by [`instantiate`].
    pub fn global() -> &'static InstanceRegistry {
        &GLOBAL
    }

    /// Get the instance cache of `T`, creating it on first use.
    pub fn cache<T>(&self) -> InstanceCache<T>
    where
        T: CachedInstance,
    {
        let id = TypeId::of::<T>();
        let found = self
            .caches
            .read()
            .with(|caches| caches.get(&id).and_then(|c| c.downcast_ref::<InstanceCache<T>>()).cloned());
        if let Some(cache) = found {
            return cache;
        }

        self.caches.write().with(|mut caches| {
            caches
                .entry(id)
                .or_insert_with(|| {
                    tracing::debug!(ty = type_name::<T>(), "[instance]: create instance cache");
                    Box::new(InstanceCache::<T>::with_registry(&self.metrics_registry))
                })
                .downcast_ref::<InstanceCache<T>>()
                .cloned()
                // Entries are inserted under the `TypeId` of their own type.
                .unwrap_or_else(|| unreachable!("instance cache type mismatch for {}", type_name::<T>()))
        })
    }

    /// Construct a `T` from `args`, reusing a live instance constructed from equal arguments.
    ///
    /// The bypass keyword is stripped first, whether or not `T` caches. Then:
    /// - a type without caching, or a call with a truthy bypass keyword, constructs a fresh instance;
    /// - arguments that cannot form a key are handled per [`CachedInstance::ON_UNHASHABLE`];
    /// - otherwise a live instance with an equal key is returned, or a new one is constructed and registered.
    ///
    /// Constructor failures are returned unchanged.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::instance::instantiate"))]
    pub fn instantiate<T>(&self, mut args: CallArgs) -> Result<Tracked<T>>
    where
        T: CachedInstance,
    {
        let bypass = args.take_bypass();
        if !T::INST_CACHING {
            return T::construct(&args).map(Tracked::new);
        }

        let cache = self.cache::<T>();
        let metrics = cache.cache().metrics();

        if bypass {
            metrics.instance_bypass.increase(1);
            return T::construct(&args).map(Tracked::new);
        }

        let key = match InstanceKey::new(&args) {
            Ok(key) => key,
            Err(e) if e.kind() == ErrorKind::Unhashable => {
                metrics.instance_unhashable.increase(1);
                return match T::ON_UNHASHABLE {
                    UnhashablePolicy::Warn => {
                        tracing::warn!("caching for {}, key={} is unhashable", type_name::<T>(), args);
                        T::construct(&args).map(Tracked::new)
                    }
                    UnhashablePolicy::Error => Err(e.with_context("type", type_name::<T>())),
                };
            }
            Err(e) => return Err(e),
        };

        cache.get_or_construct(key, || T::construct(&args))
    }
}

/// Construct a `T` from `args` with the global registry. See [`InstanceRegistry::instantiate`].
pub fn instantiate<T>(args: CallArgs) -> Result<Tracked<T>>
where
    T: CachedInstance,
{
    InstanceRegistry::global().instantiate(args)
}
