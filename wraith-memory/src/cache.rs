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

use std::{
    borrow::Cow,
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use equivalent::Equivalent;
use itertools::Itertools;
use parking_lot::RwLock;
use wraith_common::{
    code::{DefaultHasher, HashBuilder, Key, Referent},
    error::{Error, ErrorKind, Result},
    event::{Event, EventListener},
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry},
    scope::Scope,
    strict_assert, strict_assert_eq,
};

use crate::{
    finalizer::Finalizer,
    indexer::Indexer,
    record::WeakRecord,
    tracked::{Tracked, WeakTracked},
};

/// Default shard count of the weak-value cache.
pub const DEFAULT_SHARDS: usize = 8;
/// Default name of the weak-value cache, used as the metrics label.
pub const DEFAULT_NAME: &str = "wraith";

/// A value assignment for [`WeakValueCache::set`].
///
/// Built from a strong handle, from a weak handle (always rejected), or from `None` (delete).
pub enum Assign<T> {
    /// Store the value weakly.
    Strong(Tracked<T>),
    /// A weak handle. Storing a weak handle to a weak handle is a usage error.
    Weak(WeakTracked<T>),
    /// Delete the key if present.
    Delete,
}

impl<T> From<Tracked<T>> for Assign<T> {
    fn from(value: Tracked<T>) -> Self {
        Self::Strong(value)
    }
}

impl<T> From<WeakTracked<T>> for Assign<T> {
    fn from(value: WeakTracked<T>) -> Self {
        Self::Weak(value)
    }
}

impl<T> From<Option<Tracked<T>>> for Assign<T> {
    fn from(value: Option<Tracked<T>>) -> Self {
        match value {
            Some(value) => Self::Strong(value),
            None => Self::Delete,
        }
    }
}

pub(crate) struct WeakValueCacheConfig<K, S>
where
    K: Key,
    S: HashBuilder,
{
    pub name: Cow<'static, str>,
    pub shards: usize,
    pub hash_builder: S,
    pub event_listener: Option<Arc<dyn EventListener<Key = K>>>,
    pub metrics: Arc<Metrics>,
}

pub(crate) struct Shared<K, T, S>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    name: Cow<'static, str>,
    shards: Vec<RwLock<Indexer<K, T>>>,
    hash_builder: S,
    tokens: AtomicU64,

    metrics: Arc<Metrics>,
    event_listener: Option<Arc<dyn EventListener<Key = K>>>,
}

impl<K, T, S> Shared<K, T, S>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    fn shard(&self, hash: u64) -> &RwLock<Indexer<K, T>> {
        &self.shards[hash as usize % self.shards.len()]
    }

    fn hash<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.hash_builder.hash_one(key)
    }

    fn next_token(&self) -> u64 {
        self.tokens.fetch_add(1, Ordering::Relaxed)
    }

    /// Report records that left the cache and release them.
    ///
    /// Must be called out of the lock critical section.
    fn leave<I>(&self, event: Event, records: I)
    where
        I: IntoIterator<Item = WeakRecord<K, T>>,
    {
        let mut count = 0;
        for record in records {
            count += 1;
            if let Some(listener) = self.event_listener.as_ref() {
                listener.on_leave(event, record.key());
            }
        }
        if count == 0 {
            return;
        }

        let counter = match event {
            Event::Finalize => &self.metrics.weak_finalize,
            Event::Stale => &self.metrics.weak_stale,
            Event::Remove => &self.metrics.weak_remove,
            Event::Replace => &self.metrics.weak_replace,
            Event::Clear => &self.metrics.weak_clear,
        };
        counter.increase(count);
        if event != Event::Replace {
            self.metrics.weak_entries.decrease(count);
        }
    }

    /// Eager eviction, driven by a [`Finalizer`].
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::cache::finalize"))]
    pub(crate) fn finalize(&self, key: &K, token: Option<u64>) -> bool {
        let hash = self.hash(key);
        let record = self.shard(hash).write().with(|mut shard| {
            shard.remove_if(hash, key, |r| match token {
                Some(token) => r.token() == token,
                None => true,
            })
        });

        match record {
            Some(record) => {
                tracing::trace!(cache = %self.name, token = record.token(), "[weak cache]: finalize entry");
                self.leave(Event::Finalize, Some(record));
                true
            }
            None => false,
        }
    }
}

/// A mapping from keys to values that it does not keep alive.
///
/// Values are stored as [`WeakTracked`] handles whose death callback is a [`Finalizer`] bound to the entry. When the
/// last [`Tracked`] handle of a value drops, the finalizer removes the entry right away (eager eviction). A lookup that
/// finds an entry whose value is gone removes it too and reports a miss (lazy eviction). Both paths are idempotent.
///
/// The cache is cheap to clone. Clones share the same entries.
pub struct WeakValueCache<K, T, S = DefaultHasher>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    shared: Arc<Shared<K, T, S>>,
}

impl<K, T, S> Clone for WeakValueCache<K, T, S>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K, T, S> Debug for WeakValueCache<K, T, S>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakValueCache")
            .field("name", &self.shared.name)
            .field("shards", &self.shared.shards.len())
            .field("len", &self.len())
            .finish()
    }
}

impl<K, T> Default for WeakValueCache<K, T, DefaultHasher>
where
    K: Key + Clone,
    T: Referent,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> WeakValueCache<K, T, DefaultHasher>
where
    K: Key + Clone,
    T: Referent,
{
    /// Create a weak-value cache with the default configuration.
    ///
    /// Use [`crate::WeakValueCacheBuilder`] for more options.
    pub fn new() -> Self {
        Self::with_config(WeakValueCacheConfig {
            name: Cow::Borrowed(DEFAULT_NAME),
            shards: DEFAULT_SHARDS,
            hash_builder: DefaultHasher::default(),
            event_listener: None,
            metrics: Arc::new(Metrics::new(DEFAULT_NAME, &NoopMetricsRegistry)),
        })
    }
}

impl<K, T, S> WeakValueCache<K, T, S>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    pub(crate) fn shared(&self) -> &Arc<Shared<K, T, S>> {
        &self.shared
    }

    /// Number of stored entries, including the ones whose value is gone but not removed yet.
    ///
    /// It is an upper bound of the live values.
    pub fn len(&self) -> usize {
        self.shared.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Whether the cache stores no entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the cache.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Shard count of the cache.
    pub fn shards(&self) -> usize {
        self.shared.shards.len()
    }

    /// Hash builder of the cache.
    pub fn hash_builder(&self) -> &S {
        &self.shared.hash_builder
    }

    /// Metrics of the cache.
    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }
}

impl<K, T, S> WeakValueCache<K, T, S>
where
    K: Key + Clone,
    T: Referent,
    S: HashBuilder,
{
    pub(crate) fn with_config(config: WeakValueCacheConfig<K, S>) -> Self {
        strict_assert!(config.shards > 0);

        let shards = (0..config.shards).map(|_| RwLock::new(Indexer::default())).collect_vec();
        tracing::debug!(cache = %config.name, shards = config.shards, "[weak cache]: create");

        let shared = Shared {
            name: config.name,
            shards,
            hash_builder: config.hash_builder,
            tokens: AtomicU64::new(0),
            metrics: config.metrics,
            event_listener: config.event_listener,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Resolve the value of `key`.
    ///
    /// Returns an error of kind [`ErrorKind::NotFound`] if the key is absent, or if its value is gone. In the latter
    /// case the entry is removed.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::cache::get_or_none"))]
    pub fn get_or_none<Q>(&self, key: &Q) -> Result<Tracked<T>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.shared.hash(key);
        let shard = self.shared.shard(hash);

        let token = match shard
            .read()
            .with(|shard| shard.get(hash, key).map(|r| r.resolve().ok_or(r.token())))
        {
            Some(Ok(value)) => {
                self.shared.metrics.weak_hit.increase(1);
                return Ok(value);
            }
            Some(Err(token)) => token,
            None => {
                self.shared.metrics.weak_miss.increase(1);
                return Err(Error::not_found());
            }
        };

        // The value is gone. Remove the entry unless it has been replaced meanwhile.
        let stale = shard
            .write()
            .with(|mut shard| shard.remove_if(hash, key, |r| r.token() == token && !r.is_alive()));
        self.shared.metrics.weak_miss.increase(1);
        if let Some(record) = stale {
            tracing::debug!(cache = %self.shared.name, token, "[weak cache]: evict stale entry on lookup");
            self.shared.leave(Event::Stale, Some(record));
        }
        Err(Error::not_found())
    }

    /// Resolve the value of `key`, or return `default` on a miss.
    pub fn get<Q>(&self, key: &Q, default: Option<Tracked<T>>) -> Option<Tracked<T>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        match self.get_or_none(key) {
            Ok(value) => Some(value),
            Err(e) => {
                strict_assert_eq!(e.kind(), ErrorKind::NotFound);
                default
            }
        }
    }

    /// Assign `key`.
    ///
    /// - A [`Tracked`] value is stored weakly, replacing any previous entry of `key`. The replaced entry is released
    ///   and its finalizer disarmed.
    /// - A [`WeakTracked`] value is rejected with [`ErrorKind::WeakValue`]. The cache is left untouched.
    /// - `None` deletes `key` if present.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::cache::set"))]
    pub fn set(&self, key: K, value: impl Into<Assign<T>>) -> Result<()> {
        match value.into() {
            Assign::Strong(value) => {
                self.insert(key, &value);
                Ok(())
            }
            Assign::Weak(_) => Err(Error::new(ErrorKind::WeakValue, "cannot set value to a weak handle")),
            Assign::Delete => {
                self.remove(&key);
                Ok(())
            }
        }
    }

    fn record(&self, key: K, value: &Tracked<T>) -> WeakRecord<K, T> {
        let hash = self.shared.hash(&key);
        let token = self.shared.next_token();
        let finalizer = Finalizer::for_entry(Arc::downgrade(&self.shared), key.clone(), token);
        let weak = Tracked::downgrade_with(value, move || {
            finalizer.call();
        });
        WeakRecord::new(key, hash, token, weak)
    }

    fn insert(&self, key: K, value: &Tracked<T>) {
        let record = self.record(key, value);
        let hash = record.hash();

        let old = self.shared.shard(hash).write().with(|mut shard| shard.insert(record));

        // Deallocate data out of the lock critical section.
        match old {
            Some(old) => self.shared.leave(Event::Replace, Some(old)),
            None => {
                self.shared.metrics.weak_insert.increase(1);
                self.shared.metrics.weak_entries.increase(1);
            }
        }
    }

    /// Return the live value of `key` if any, otherwise store `value` and return it.
    ///
    /// The check and the store happen within one critical section, so concurrent callers with the same key all get the
    /// same value.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::cache::setdefault"))]
    pub fn setdefault(&self, key: K, value: Tracked<T>) -> Tracked<T> {
        let record = self.record(key, &value);
        let hash = record.hash();

        let res = self.shared.shard(hash).write().with(|mut shard| {
            if let Some(existing) = shard.get(hash, record.key()).and_then(WeakRecord::resolve) {
                return Err((existing, record));
            }
            Ok(shard.insert(record))
        });

        // Deallocate data out of the lock critical section.
        match res {
            Err((existing, record)) => {
                drop(record);
                self.shared.metrics.weak_hit.increase(1);
                existing
            }
            Ok(stale) => {
                self.shared.metrics.weak_insert.increase(1);
                self.shared.metrics.weak_entries.increase(1);
                self.shared.leave(Event::Stale, stale);
                value
            }
        }
    }

    /// Remove `key`, returning its value if it is still alive.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::cache::remove"))]
    pub fn remove<Q>(&self, key: &Q) -> Option<Tracked<T>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.shared.hash(key);
        let record = self
            .shared
            .shard(hash)
            .write()
            .with(|mut shard| shard.remove(hash, key))?;

        // Resolve before the record and its finalizer are released.
        let value = record.resolve();
        self.shared.leave(Event::Remove, Some(record));
        value
    }

    /// Whether `key` maps to a live value.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.shared.hash(key);
        self.shared
            .shard(hash)
            .read()
            .with(|shard| shard.get(hash, key).is_some_and(WeakRecord::is_alive))
    }

    /// Snapshot of all stored keys, dead entries included.
    pub fn keys(&self) -> Vec<K> {
        self.snapshot(|r| Some(r.key().clone()))
    }

    /// Snapshot of all live values.
    pub fn values(&self) -> Vec<Tracked<T>> {
        self.snapshot(WeakRecord::resolve)
    }

    /// Snapshot of all live entries.
    pub fn items(&self) -> Vec<(K, Tracked<T>)> {
        self.snapshot(|r| r.resolve().map(|v| (r.key().clone(), v)))
    }

    /// Snapshot of the stored weak handles, dead ones included.
    ///
    /// The returned handles carry no death callback.
    pub fn raw_values(&self) -> Vec<WeakTracked<T>> {
        self.snapshot(|r| Some(r.weak().clone()))
    }

    /// Snapshot of the stored keys and weak handles, dead ones included.
    pub fn raw_items(&self) -> Vec<(K, WeakTracked<T>)> {
        self.snapshot(|r| Some((r.key().clone(), r.weak().clone())))
    }

    fn snapshot<R, F>(&self, f: F) -> Vec<R>
    where
        F: Fn(&WeakRecord<K, T>) -> Option<R>,
    {
        let mut res = vec![];
        for shard in self.shared.shards.iter() {
            shard.read().with(|shard| res.extend(shard.iter().filter_map(&f)));
        }
        res
    }

    /// Drop all entries, live or not.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::cache::clear"))]
    pub fn clear(&self) {
        let mut garbages = vec![];
        for shard in self.shared.shards.iter() {
            shard.write().with(|mut shard| {
                garbages.extend(shard.drain());
                strict_assert_eq!(shard.len(), 0);
            });
        }

        // Deallocate data out of the lock critical section.
        self.shared.leave(Event::Clear, garbages);
    }

    /// Sweep all shards and remove the entries whose value is gone. Returns the count of removed entries.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::cache::purge"))]
    pub fn purge(&self) -> usize {
        let mut garbages = vec![];
        for shard in self.shared.shards.iter() {
            shard.write().with(|mut shard| garbages.extend(shard.remove_dead()));
        }
        let count = garbages.len();
        if count > 0 {
            tracing::debug!(cache = %self.shared.name, count, "[weak cache]: purge stale entries");
        }

        // Deallocate data out of the lock critical section.
        self.shared.leave(Event::Stale, garbages);
        count
    }

    #[cfg(test)]
    pub(crate) fn swap_record(&self, record: WeakRecord<K, T>) -> Option<WeakRecord<K, T>> {
        let hash = record.hash();
        self.shared.shard(hash).write().with(|mut shard| shard.insert(record))
    }

    #[cfg(test)]
    pub(crate) fn token_of(&self, key: &K) -> Option<u64> {
        let hash = self.shared.hash(key);
        self.shared
            .shard(hash)
            .read()
            .with(|shard| shard.get(hash, key).map(WeakRecord::token))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, thread};

    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;
    use crate::{builder::WeakValueCacheBuilder, test_utils::Recorder};

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<WeakValueCache<String, String>>();
        is_send_sync_static::<Finalizer<String, String>>();
    }

    fn cache_for_test() -> (WeakValueCache<u64, String>, Recorder<u64>) {
        let recorder = Recorder::default();
        let cache = WeakValueCacheBuilder::<u64, String>::new()
            .with_name("test")
            .with_shards(4)
            .with_event_listener(Arc::new(recorder.clone()))
            .build()
            .unwrap();
        (cache, recorder)
    }

    #[test_log::test]
    fn test_identity_preserved() {
        let (cache, _) = cache_for_test();
        let value = Tracked::new("v".to_string());
        cache.set(1, value.clone()).unwrap();

        let got = cache.get_or_none(&1).unwrap();
        assert!(Tracked::ptr_eq(&got, &value));
        assert!(cache.contains_key(&1));
        assert_eq!(cache.len(), 1);
    }

    #[test_log::test]
    fn test_eager_eviction_on_last_drop() {
        let (cache, recorder) = cache_for_test();
        let value = Tracked::new("v".to_string());
        cache.set(1, value.clone()).unwrap();
        let other = value.clone();

        drop(value);
        assert!(cache.contains_key(&1));
        drop(other);

        assert!(!cache.contains_key(&1));
        assert_eq!(cache.len(), 0);
        assert_eq!(recorder.dump(), vec![(Event::Finalize, 1)]);
        assert_eq!(cache.get_or_none(&1).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test_log::test]
    fn test_lazy_eviction_on_lookup() {
        let (cache, recorder) = cache_for_test();
        let value = Tracked::new("v".to_string());
        cache.set(1, value.clone()).unwrap();

        // Disarm the finalizer by replacing the entry with a callback-less copy of the same handle.
        let hash = cache.shared.hash(&1u64);
        let weak = Tracked::downgrade(&value);
        let armed = cache
            .shared
            .shard(hash)
            .write()
            .with(|mut shard| shard.insert(WeakRecord::new(1, hash, u64::MAX, weak)));
        drop(armed);
        drop(value);

        assert_eq!(cache.len(), 1);
        assert!(!cache.contains_key(&1));
        assert!(cache.get_or_none(&1).unwrap_err().is_not_found());
        assert_eq!(cache.len(), 0);
        assert_eq!(recorder.dump(), vec![(Event::Stale, 1)]);

        // Lazy eviction is idempotent.
        assert!(cache.get(&1, None).is_none());
        assert_eq!(recorder.dump().len(), 1);
    }

    #[test_log::test]
    fn test_overwrite() {
        let (cache, recorder) = cache_for_test();
        let a = Tracked::new("a".to_string());
        let b = Tracked::new("b".to_string());
        let weak_a = Tracked::downgrade(&a);

        cache.set(1, a.clone()).unwrap();
        cache.set(1, b.clone()).unwrap();
        assert!(Tracked::ptr_eq(&cache.get_or_none(&1).unwrap(), &b));

        // The old value is reclaimable right away and its finalizer does not touch the new entry.
        drop(a);
        assert!(!weak_a.is_alive());
        assert!(cache.contains_key(&1));
        assert_eq!(recorder.dump(), vec![(Event::Replace, 1)]);
    }

    #[test_log::test]
    fn test_set_weak_is_rejected() {
        let (cache, _) = cache_for_test();
        let a = Tracked::new("a".to_string());
        cache.set(1, a.clone()).unwrap();

        let b = Tracked::new("b".to_string());
        let err = cache.set(1, Tracked::downgrade(&b)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WeakValue);
        assert!(err.kind().is_usage());
        assert!(Tracked::ptr_eq(&cache.get_or_none(&1).unwrap(), &a));

        let err = cache.set(2, Tracked::downgrade(&b)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WeakValue);
        assert!(!cache.contains_key(&2));
    }

    #[test_log::test]
    fn test_set_none_deletes() {
        let (cache, recorder) = cache_for_test();
        let a = Tracked::new("a".to_string());
        cache.set(1, a.clone()).unwrap();
        cache.set(1, None).unwrap();
        assert!(!cache.contains_key(&1));
        cache.set(1, None).unwrap();
        assert_eq!(recorder.dump(), vec![(Event::Remove, 1)]);

        // The removed entry's finalizer is disarmed.
        drop(a);
        assert_eq!(recorder.dump().len(), 1);
    }

    #[test_log::test]
    fn test_get_default() {
        let (cache, _) = cache_for_test();
        let default = Tracked::new("default".to_string());
        let got = cache.get(&1, Some(default.clone())).unwrap();
        assert!(Tracked::ptr_eq(&got, &default));
        assert!(cache.get(&1, None).is_none());
    }

    #[test_log::test]
    fn test_remove() {
        let (cache, _) = cache_for_test();
        let a = Tracked::new("a".to_string());
        cache.set(1, a.clone()).unwrap();
        let removed = cache.remove(&1).unwrap();
        assert!(Tracked::ptr_eq(&removed, &a));
        assert!(cache.remove(&1).is_none());
        assert!(cache.is_empty());
    }

    #[test_log::test]
    fn test_setdefault() {
        let (cache, _) = cache_for_test();
        let a = Tracked::new("a".to_string());
        let b = Tracked::new("b".to_string());

        assert!(Tracked::ptr_eq(&cache.setdefault(1, a.clone()), &a));
        assert!(Tracked::ptr_eq(&cache.setdefault(1, b.clone()), &a));

        drop(a);
        assert!(!cache.contains_key(&1));
        assert!(Tracked::ptr_eq(&cache.setdefault(1, b.clone()), &b));
        assert!(cache.contains_key(&1));
    }

    #[test_log::test]
    fn test_snapshots() {
        let (cache, _) = cache_for_test();
        let values = (0..8u64).map(|i| Tracked::new(i.to_string())).collect_vec();
        for (i, v) in values.iter().enumerate() {
            cache.set(i as u64, v.clone()).unwrap();
        }

        let keys: HashSet<_> = cache.keys().into_iter().collect();
        assert_eq!(keys, (0..8).collect());
        assert_eq!(cache.values().len(), 8);
        assert!(cache
            .items()
            .iter()
            .all(|(k, v)| Tracked::ptr_eq(v, &values[*k as usize])));

        let raw = cache.raw_values();
        assert_eq!(raw.len(), 8);
        assert!(raw.iter().all(|w| w.is_alive() && !w.is_armed()));
        assert_eq!(cache.raw_items().len(), 8);

        drop(values);
        assert!(raw.iter().all(|w| !w.is_alive()));
        assert!(cache.is_empty());
    }

    #[test_log::test]
    fn test_clear_and_purge() {
        let (cache, recorder) = cache_for_test();
        let values = (0..8u64).map(|i| Tracked::new(i.to_string())).collect_vec();
        for (i, v) in values.iter().enumerate() {
            cache.set(i as u64, v.clone()).unwrap();
        }
        assert_eq!(cache.purge(), 0);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(recorder.dump().len(), 8);
        assert!(recorder.dump().iter().all(|(e, _)| *e == Event::Clear));

        // Cleared entries do not finalize.
        drop(values);
        assert_eq!(recorder.dump().len(), 8);
    }

    #[test_log::test]
    fn test_finalizer_does_not_outlive_cache() {
        let (cache, recorder) = cache_for_test();
        let a = Tracked::new("a".to_string());
        cache.set(1, a.clone()).unwrap();
        drop(cache);
        drop(a);
        assert!(recorder.dump().is_empty());
    }

    #[test_log::test]
    fn test_listener_may_reenter_cache() {
        struct Reenter(parking_lot::Mutex<Option<WeakValueCache<u64, String>>>);

        impl EventListener for Reenter {
            type Key = u64;

            fn on_leave(&self, _: Event, key: &u64) {
                if let Some(cache) = self.0.lock().as_ref() {
                    assert!(!cache.contains_key(key));
                }
            }
        }

        let listener = Arc::new(Reenter(parking_lot::Mutex::new(None)));
        let cache = WeakValueCacheBuilder::<u64, String>::new()
            .with_event_listener(listener.clone())
            .build()
            .unwrap();
        *listener.0.lock() = Some(cache.clone());

        let a = Tracked::new("a".to_string());
        cache.set(1, a.clone()).unwrap();
        drop(a);
        assert!(cache.is_empty());
        listener.0.lock().take();
    }

    #[test_log::test]
    fn test_concurrent_fuzzy() {
        const THREADS: usize = 8;
        const KEYS: u64 = 64;
        const OPS: usize = 10_000;

        let cache: WeakValueCache<u64, u64> = WeakValueCacheBuilder::new().with_shards(4).build().unwrap();

        let handles = (0..THREADS)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(t as u64);
                    let mut holding = vec![];
                    for _ in 0..OPS {
                        let key = rng.random_range(0..KEYS);
                        match rng.random_range(0..6) {
                            0 => {
                                let value = Tracked::new(key);
                                cache.set(key, value.clone()).unwrap();
                                holding.push(value);
                            }
                            1 => {
                                let value = cache.setdefault(key, Tracked::new(key));
                                assert_eq!(*value, key);
                                holding.push(value);
                            }
                            2 => {
                                if let Ok(value) = cache.get_or_none(&key) {
                                    assert_eq!(*value, key);
                                }
                            }
                            3 => {
                                cache.remove(&key);
                            }
                            4 => {
                                if !holding.is_empty() {
                                    let index = rng.random_range(0..holding.len());
                                    holding.swap_remove(index);
                                }
                            }
                            _ => {
                                cache.purge();
                            }
                        }
                    }
                })
            })
            .collect_vec();

        for handle in handles {
            handle.join().unwrap();
        }

        // Every value has been dropped with its holder, so no entry may survive.
        assert!(cache.is_empty(), "{} entries left", cache.len());
        assert!(cache.values().is_empty());
    }
}
