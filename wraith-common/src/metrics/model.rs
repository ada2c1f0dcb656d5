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

use std::borrow::Cow;

use super::{BoxedCounter, BoxedGauge, BoxedHistogram, RegistryOps};
use crate::metrics::registry::noop::NoopMetricsRegistry;

// FIXME: https://github.com/rust-lang/rust-analyzer/issues/17685
// #[expect(missing_docs)]
/// Metrics of one wraith component, labeled with the component name.
#[derive(Debug)]
pub struct Metrics {
    /* weak-value cache metrics */
    /// ... ...
    pub weak_insert: BoxedCounter,
    /// ... ...
    pub weak_replace: BoxedCounter,
    /// ... ...
    pub weak_hit: BoxedCounter,
    /// ... ...
    pub weak_miss: BoxedCounter,
    /// ... ...
    pub weak_remove: BoxedCounter,
    /// ... ...
    pub weak_stale: BoxedCounter,
    /// ... ...
    pub weak_finalize: BoxedCounter,
    /// ... ...
    pub weak_clear: BoxedCounter,

    /// ... ...
    pub weak_entries: BoxedGauge,

    /* instance cache metrics */
    /// ... ...
    pub instance_hit: BoxedCounter,
    /// ... ...
    pub instance_miss: BoxedCounter,
    /// ... ...
    pub instance_bypass: BoxedCounter,
    /// ... ...
    pub instance_unhashable: BoxedCounter,

    /* memoized attribute metrics */
    /// ... ...
    pub memo_hit: BoxedCounter,
    /// ... ...
    pub memo_compute: BoxedCounter,

    /// ... ...
    pub memo_compute_duration: BoxedHistogram,
}

impl Metrics {
    /// Create a new metric with the given name.
    pub fn new(name: impl Into<Cow<'static, str>>, registry: &dyn RegistryOps) -> Self {
        let name = name.into();
        let label = |op: &'static str| [name.clone(), Cow::Borrowed(op)];

        /* weak-value cache metrics */

        let wraith_weak_op_total = registry.register_counter_vec(
            "wraith_weak_op_total".into(),
            "wraith weak-value cache operations".into(),
            &["name", "op"],
        );
        let wraith_weak_entries = registry.register_gauge_vec(
            "wraith_weak_entries".into(),
            "wraith weak-value cache entries, dead ones not yet removed included".into(),
            &["name"],
        );

        let weak_insert = wraith_weak_op_total.counter(&label("insert"));
        let weak_replace = wraith_weak_op_total.counter(&label("replace"));
        let weak_hit = wraith_weak_op_total.counter(&label("hit"));
        let weak_miss = wraith_weak_op_total.counter(&label("miss"));
        let weak_remove = wraith_weak_op_total.counter(&label("remove"));
        let weak_stale = wraith_weak_op_total.counter(&label("stale"));
        let weak_finalize = wraith_weak_op_total.counter(&label("finalize"));
        let weak_clear = wraith_weak_op_total.counter(&label("clear"));

        let weak_entries = wraith_weak_entries.gauge(&[name.clone()]);

        /* instance cache metrics */

        let wraith_instance_op_total = registry.register_counter_vec(
            "wraith_instance_op_total".into(),
            "wraith instance cache operations".into(),
            &["name", "op"],
        );

        let instance_hit = wraith_instance_op_total.counter(&label("hit"));
        let instance_miss = wraith_instance_op_total.counter(&label("miss"));
        let instance_bypass = wraith_instance_op_total.counter(&label("bypass"));
        let instance_unhashable = wraith_instance_op_total.counter(&label("unhashable"));

        /* memoized attribute metrics */

        let wraith_memo_op_total = registry.register_counter_vec(
            "wraith_memo_op_total".into(),
            "wraith memoized attribute operations".into(),
            &["name", "op"],
        );
        let wraith_memo_op_duration = registry.register_histogram_vec(
            "wraith_memo_op_duration".into(),
            "wraith memoized attribute operation durations".into(),
            &["name", "op"],
        );

        let memo_hit = wraith_memo_op_total.counter(&label("hit"));
        let memo_compute = wraith_memo_op_total.counter(&label("compute"));

        let memo_compute_duration = wraith_memo_op_duration.histogram(&label("compute"));

        Self {
            weak_insert,
            weak_replace,
            weak_hit,
            weak_miss,
            weak_remove,
            weak_stale,
            weak_finalize,
            weak_clear,
            weak_entries,
            instance_hit,
            instance_miss,
            instance_bypass,
            instance_unhashable,
            memo_hit,
            memo_compute,
            memo_compute_duration,
        }
    }

    /// Build noop metrics.
    ///
    /// Note: `noop` is only supposed to be called by other wraith components.
    #[doc(hidden)]
    pub fn noop() -> Self {
        Self::new("test", &NoopMetricsRegistry)
    }
}
