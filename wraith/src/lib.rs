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

//! wraith: weak-reference instance caching.
//!
//! - [`WeakValueCache`]: a concurrent mapping that does not keep its values alive. An entry goes away with the last
//!   [`Tracked`] handle of its value.
//! - [`instantiate`] and [`InstanceCache`]: construction deduplication. Equal constructor arguments yield the same
//!   live instance.
//! - [`MemoizedAttribute`]: a derived value computed from its owner on first access and kept in a [`Slot`].
//!
//! ```rust
//! use wraith::{Tracked, WeakValueCache};
//!
//! let cache: WeakValueCache<u64, String> = WeakValueCache::new();
//! let value = Tracked::new("hello".to_string());
//! cache.set(1, value.clone()).unwrap();
//! assert_eq!(cache.get_or_none(&1).unwrap().as_str(), "hello");
//!
//! drop(value);
//! assert!(cache.get_or_none(&1).is_err());
//! ```

mod args;
mod instance;
mod memo;
mod prelude;

pub use prelude::*;
pub use wraith_common as common;
pub use wraith_memory as memory;
