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

//! Shared components for wraith.

/// Assertion helpers.
pub mod assert;
/// Key and hasher bounds.
pub mod code;
/// The error type shared by all wraith crates.
pub mod error;
/// Cache events and listeners.
pub mod event;
/// Metrics model and registries.
pub mod metrics;
/// Scoped functional helpers.
pub mod scope;
