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

use serde::{Deserialize, Serialize};

use crate::code::Key;

/// Why an entry left a weak-value cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// The referent was dropped and its finalizer removed the entry.
    Finalize,
    /// A read found the referent dropped and removed the entry lazily.
    Stale,
    /// Explicit removal.
    Remove,
    /// Replacement by a newer value under the same key.
    Replace,
    /// Cache clear.
    Clear,
}

/// Trait for the customized event listener.
///
/// Listeners are always called outside of the cache locks, so it is fine to call back into the cache.
pub trait EventListener: Send + Sync + 'static {
    /// Associated key type.
    type Key;

    /// Called when an entry leaves the cache with the reason.
    #[expect(unused_variables)]
    fn on_leave(&self, reason: Event, key: &Self::Key)
    where
        Self::Key: Key,
    {
    }
}
