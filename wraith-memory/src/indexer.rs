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

use std::hash::Hash;

use equivalent::Equivalent;
use hashbrown::hash_table::{Entry as HashTableEntry, HashTable};
use itertools::Itertools;

use crate::record::WeakRecord;

/// Hash table index of one cache shard.
///
/// The indexer never resolves or drops handles by itself. Every record taken out is returned to the caller, who drops it
/// out of the lock critical section.
pub(crate) struct Indexer<K, T> {
    table: HashTable<WeakRecord<K, T>>,
}

impl<K, T> Default for Indexer<K, T> {
    fn default() -> Self {
        Self {
            table: HashTable::new(),
        }
    }
}

impl<K, T> Indexer<K, T>
where
    K: Hash + Eq,
{
    /// Insert a record, returning the record it replaces.
    pub fn insert(&mut self, mut record: WeakRecord<K, T>) -> Option<WeakRecord<K, T>> {
        match self
            .table
            .entry(record.hash(), |r| r.key() == record.key(), |r| r.hash())
        {
            HashTableEntry::Occupied(mut o) => {
                std::mem::swap(o.get_mut(), &mut record);
                Some(record)
            }
            HashTableEntry::Vacant(v) => {
                v.insert(record);
                None
            }
        }
    }

    pub fn get<Q>(&self, hash: u64, key: &Q) -> Option<&WeakRecord<K, T>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.table.find(hash, |r| key.equivalent(r.key()))
    }

    pub fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<WeakRecord<K, T>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.remove_if(hash, key, |_| true)
    }

    /// Remove the record of `key` only if `predicate` holds for it.
    pub fn remove_if<Q, P>(&mut self, hash: u64, key: &Q, predicate: P) -> Option<WeakRecord<K, T>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
        P: FnOnce(&WeakRecord<K, T>) -> bool,
    {
        let Ok(o) = self.table.find_entry(hash, |r| key.equivalent(r.key())) else {
            return None;
        };
        if !predicate(o.get()) {
            return None;
        }
        let (r, _) = o.remove();
        Some(r)
    }

    /// Remove all records whose referent is gone.
    pub fn remove_dead(&mut self) -> Vec<WeakRecord<K, T>> {
        let dead = self
            .table
            .iter()
            .filter(|r| !r.is_alive())
            .map(|r| (r.hash(), r.token()))
            .collect_vec();
        dead.into_iter()
            .filter_map(|(hash, token)| {
                self.table
                    .find_entry(hash, |r| r.token() == token)
                    .ok()
                    .map(|o| o.remove().0)
            })
            .collect()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = WeakRecord<K, T>> + '_ {
        self.table.drain()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeakRecord<K, T>> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use wraith_common::code::DefaultHasher;

    use super::*;
    use crate::tracked::Tracked;

    fn record(hasher: &DefaultHasher, key: u64, token: u64, value: &Tracked<String>) -> WeakRecord<u64, String> {
        WeakRecord::new(key, hasher.hash_one(key), token, Tracked::downgrade(value))
    }

    #[test]
    fn test_insert_replace_remove() {
        let hasher = DefaultHasher::default();
        let mut indexer = Indexer::default();
        let v1 = Tracked::new("v1".to_string());
        let v2 = Tracked::new("v2".to_string());

        assert!(indexer.insert(record(&hasher, 1, 1, &v1)).is_none());
        let old = indexer.insert(record(&hasher, 1, 2, &v2)).unwrap();
        assert_eq!(old.token(), 1);
        assert_eq!(indexer.len(), 1);

        let hash = hasher.hash_one(1u64);
        assert!(indexer.get(hash, &1u64).unwrap().weak().refers_to(&v2));
        assert!(indexer.remove_if(hash, &1u64, |r| r.token() == 1).is_none());
        assert_eq!(indexer.remove_if(hash, &1u64, |r| r.token() == 2).unwrap().token(), 2);
        assert!(indexer.remove(hash, &1u64).is_none());
        assert_eq!(indexer.len(), 0);
    }

    #[test]
    fn test_remove_dead() {
        let hasher = DefaultHasher::default();
        let mut indexer = Indexer::default();
        let values = (0..10u64).map(|i| Tracked::new(i.to_string())).collect_vec();
        for (i, v) in values.iter().enumerate() {
            indexer.insert(record(&hasher, i as u64, i as u64, v));
        }

        let (odd, even): (Vec<_>, Vec<_>) = values.into_iter().enumerate().partition(|(i, _)| i % 2 == 1);
        drop(odd);

        let removed = indexer.remove_dead();
        assert_eq!(removed.len(), 5);
        assert!(removed.iter().all(|r| r.key() % 2 == 1));
        assert_eq!(indexer.len(), 5);
        assert!(indexer.iter().all(|r| r.is_alive()));
        drop(even);
    }
}
