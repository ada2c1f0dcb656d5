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

//! Utilities for testing.

use std::sync::Arc;

use parking_lot::Mutex;
use wraith_common::{
    code::Key,
    event::{Event, EventListener},
};

/// An event listener that records all events with their keys.
#[derive(Debug)]
pub struct Recorder<K> {
    records: Arc<Mutex<Vec<(Event, K)>>>,
}

impl<K> Clone for Recorder<K> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<K> Default for Recorder<K> {
    fn default() -> Self {
        Self {
            records: Default::default(),
        }
    }
}

impl<K> EventListener for Recorder<K>
where
    K: Key + Clone,
{
    type Key = K;

    fn on_leave(&self, reason: Event, key: &K) {
        self.records.lock().push((reason, key.clone()));
    }
}

impl<K> Recorder<K>
where
    K: Clone,
{
    /// Get all recorded events.
    pub fn dump(&self) -> Vec<(Event, K)> {
        self.records.lock().clone()
    }
}
