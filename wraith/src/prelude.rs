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

pub use wraith_common::{
    code::{DefaultHasher, HashBuilder, Key, Referent},
    error::{Error, ErrorKind, Result},
    event::{Event, EventListener},
    metrics::{registry::noop::NoopMetricsRegistry, BoxedRegistry, Boxer, RegistryOps},
    scope::Scope,
};
#[cfg(feature = "prometheus")]
pub use wraith_common::metrics::registry::prometheus::PrometheusMetricsRegistry;
pub use wraith_memory::{Assign, Finalizer, Tracked, WeakTracked, WeakValueCache, WeakValueCacheBuilder};

pub use crate::{
    args::{Arg, CallArgs, InstanceKey, Opaque, BYPASS_KEYWORD},
    instance::{construct_or_reuse, instantiate, CachedInstance, InstanceCache, InstanceRegistry, UnhashablePolicy},
    memo::{jit_attr, jit_attr_none, Access, MemoizedAttribute, MemoizedAttributeBuilder, Slot, StorePath},
};
