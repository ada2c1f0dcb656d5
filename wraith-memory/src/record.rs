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

use std::fmt::Debug;

use crate::tracked::{Tracked, WeakTracked};

/// A stored entry of the weak-value cache.
pub(crate) struct WeakRecord<K, T> {
    key: K,
    hash: u64,
    token: u64,
    weak: WeakTracked<T>,
}

impl<K, T> WeakRecord<K, T> {
    pub fn new(key: K, hash: u64, token: u64, weak: WeakTracked<T>) -> Self {
        Self { key, hash, token, weak }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Cache-unique token of the entry. A new entry under the same key gets a new token.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn weak(&self) -> &WeakTracked<T> {
        &self.weak
    }

    pub fn is_alive(&self) -> bool {
        self.weak.is_alive()
    }

    /// Must not be called by a caller that may drop the returned handle within a shard lock.
    pub fn resolve(&self) -> Option<Tracked<T>> {
        self.weak.try_resolve()
    }
}

impl<K, T> Debug for WeakRecord<K, T>
where
    K: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRecord")
            .field("key", &self.key)
            .field("hash", &self.hash)
            .field("token", &self.token)
            .field("weak", &self.weak)
            .finish()
    }
}
