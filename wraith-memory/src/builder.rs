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

use std::{borrow::Cow, marker::PhantomData, sync::Arc};

use wraith_common::{
    code::{DefaultHasher, HashBuilder, Key, Referent},
    error::{Error, ErrorKind, Result},
    event::EventListener,
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry, BoxedRegistry, Boxer},
};

use crate::cache::{WeakValueCache, WeakValueCacheConfig, DEFAULT_NAME, DEFAULT_SHARDS};

/// Builder of [`WeakValueCache`].
pub struct WeakValueCacheBuilder<K, T, S = DefaultHasher>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    name: Cow<'static, str>,
    shards: usize,
    hash_builder: S,
    event_listener: Option<Arc<dyn EventListener<Key = K>>>,
    registry: BoxedRegistry,
    _marker: PhantomData<fn() -> T>,
}

impl<K, T> Default for WeakValueCacheBuilder<K, T, DefaultHasher>
where
    K: Key + Clone,
    T: Referent,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> WeakValueCacheBuilder<K, T, DefaultHasher>
where
    K: Key + Clone,
    T: Referent,
{
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            name: Cow::Borrowed(DEFAULT_NAME),
            shards: DEFAULT_SHARDS,
            hash_builder: DefaultHasher::default(),
            event_listener: None,
            registry: NoopMetricsRegistry.boxed(),
            _marker: PhantomData,
        }
    }
}

impl<K, T, S> WeakValueCacheBuilder<K, T, S>
where
    K: Key + Clone,
    T: Referent,
    S: HashBuilder,
{
    /// Set the name of the cache. The name is used as the metrics label.
    ///
    /// The default name is `wraith`.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the shard count. Entries are distributed to shards by hash, operations on different shards run in parallel.
    ///
    /// The default shard count is 8. It must be greater than zero.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the hash builder.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> WeakValueCacheBuilder<K, T, OS>
    where
        OS: HashBuilder,
    {
        WeakValueCacheBuilder {
            name: self.name,
            shards: self.shards,
            hash_builder,
            event_listener: self.event_listener,
            registry: self.registry,
            _marker: PhantomData,
        }
    }

    /// Set the event listener.
    pub fn with_event_listener(mut self, event_listener: Arc<dyn EventListener<Key = K>>) -> Self {
        self.event_listener = Some(event_listener);
        self
    }

    /// Set the metrics registry.
    ///
    /// The default registry is a noop registry.
    pub fn with_metrics_registry(mut self, registry: BoxedRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build the weak-value cache.
    pub fn build(self) -> Result<WeakValueCache<K, T, S>> {
        if self.shards == 0 {
            return Err(Error::new(ErrorKind::Config, "shards must be greater than zero").with_context("shards", 0));
        }

        let metrics = Arc::new(Metrics::new(self.name.clone(), &*self.registry));
        Ok(WeakValueCache::with_config(WeakValueCacheConfig {
            name: self.name,
            shards: self.shards,
            hash_builder: self.hash_builder,
            event_listener: self.event_listener,
            metrics,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::hash::{BuildHasherDefault, DefaultHasher as StdHasher};

    use super::*;
    use crate::tracked::Tracked;

    #[test]
    fn test_zero_shards() {
        let err = WeakValueCacheBuilder::<u64, u64>::new().with_shards(0).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_build_with_options() {
        let cache = WeakValueCacheBuilder::<u64, u64>::new()
            .with_name("points")
            .with_shards(3)
            .with_hash_builder(BuildHasherDefault::<StdHasher>::default())
            .build()
            .unwrap();
        assert_eq!(cache.name(), "points");
        assert_eq!(cache.shards(), 3);

        let value = Tracked::new(1);
        cache.set(1, value.clone()).unwrap();
        assert_eq!(*cache.get_or_none(&1).unwrap(), 1);
    }
}
