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
    fmt::Debug,
    sync::{Arc, Weak},
};

use wraith_common::code::{DefaultHasher, HashBuilder, Key, Referent};

use crate::cache::{Shared, WeakValueCache};

/// The death callback bound to a (cache, key) pair.
///
/// [`Finalizer::call`] deletes the key from the cache if it is still present. It can be called any number of times: an
/// absent key, or a cache that has been dropped, makes it a no-op.
///
/// A finalizer refers to the cache state weakly, so it never keeps the cache alive.
pub struct Finalizer<K, T, S = DefaultHasher>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    shared: Weak<Shared<K, T, S>>,
    key: K,
    token: Option<u64>,
}

impl<K, T, S> Finalizer<K, T, S>
where
    K: Key,
    T: Referent,
    S: HashBuilder,
{
    /// Bind a finalizer to `cache` and `key`. Calling it deletes whatever entry `key` holds at that time.
    pub fn new(cache: &WeakValueCache<K, T, S>, key: K) -> Self {
        Self {
            shared: Arc::downgrade(cache.shared()),
            key,
            token: None,
        }
    }

    /// Bind a finalizer to one entry. Calling it deletes the entry only if `key` still holds the entry with `token`.
    pub(crate) fn for_entry(shared: Weak<Shared<K, T, S>>, key: K, token: u64) -> Self {
        Self {
            shared,
            key,
            token: Some(token),
        }
    }

    /// The key the finalizer deletes.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Delete the bound key if present. Returns whether an entry was deleted.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "wraith::memory::finalizer::call"))]
    pub fn call(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            tracing::trace!("[finalizer]: cache is gone, skip");
            return false;
        };
        shared.finalize(&self.key, self.token)
    }
}

impl<K, T, S> Debug for Finalizer<K, T, S>
where
    K: Key + Debug,
    T: Referent,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finalizer")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("bound", &(self.shared.strong_count() > 0))
            .finish()
    }
}
