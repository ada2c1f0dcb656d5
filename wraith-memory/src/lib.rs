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

//! A weak-value cache: a mapping that does not keep its values alive.
//!
//! Values are wrapped in [`Tracked`] handles. The cache stores [`WeakTracked`] handles whose death callback, a
//! [`Finalizer`], removes the entry as soon as the last [`Tracked`] handle of the value drops.

mod builder;
mod cache;
mod finalizer;
mod indexer;
mod prelude;
mod record;
mod tracked;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use prelude::*;
