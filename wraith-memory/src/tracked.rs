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

//! Strong and weak handles with an observable end of life.
//!
//! A [`Tracked`] is a reference counted strong handle. A [`WeakTracked`] does not keep the value alive and may carry
//! a death callback. The callback runs synchronously on the thread that drops the last [`Tracked`], exactly once, and
//! only if the [`WeakTracked`] that carries it is still alive at that moment.

use std::{
    fmt::Debug,
    ops::Deref,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use wraith_common::scope::Scope;

type Callback = Mutex<Option<Box<dyn FnOnce() + Send>>>;

struct Inner<T> {
    value: T,
    callbacks: Mutex<Vec<Weak<Callback>>>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // The strong count is zero here, so no weak handle can resolve anymore.
        let callbacks = std::mem::take(self.callbacks.get_mut());
        for callback in callbacks.iter().filter_map(Weak::upgrade) {
            let f = callback.lock().take();
            if let Some(f) = f {
                tracing::trace!("[tracked]: run death callback");
                f();
            }
        }
    }
}

/// A strong, reference counted handle to a value whose death can be observed through [`WeakTracked`].
///
/// Methods are associated functions, in the manner of [`Arc`], so that they never shadow methods of `T`.
pub struct Tracked<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Tracked<T> {
    /// Wrap `value` in a new strong handle.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value,
                callbacks: Mutex::new(vec![]),
            }),
        }
    }

    /// Create a weak handle without a death callback.
    pub fn downgrade(this: &Self) -> WeakTracked<T> {
        WeakTracked {
            inner: Arc::downgrade(&this.inner),
            callback: None,
        }
    }

    /// Create a weak handle that runs `callback` when the last strong handle drops.
    ///
    /// Dropping the returned weak handle first disarms the callback.
    pub fn downgrade_with<F>(this: &Self, callback: F) -> WeakTracked<T>
    where
        F: FnOnce() + Send + 'static,
    {
        let callback: Arc<Callback> = Arc::new(Mutex::new(Some(Box::new(callback))));
        this.inner.callbacks.lock().with(|mut callbacks| {
            callbacks.retain(|c| c.strong_count() > 0);
            callbacks.push(Arc::downgrade(&callback));
        });
        tracing::trace!("[tracked]: arm death callback");
        WeakTracked {
            inner: Arc::downgrade(&this.inner),
            callback: Some(callback),
        }
    }

    /// Whether the two handles point to the same value.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Count of strong handles of the value.
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Address of the value, stable for its whole life.
    pub fn as_ptr(this: &Self) -> *const () {
        Arc::as_ptr(&this.inner) as *const ()
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.value
    }
}

impl<T> AsRef<T> for Tracked<T> {
    fn as_ref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> From<T> for Tracked<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> Debug for Tracked<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Tracked").field(&self.inner.value).finish()
    }
}

/// A weak handle to a [`Tracked`] value.
pub struct WeakTracked<T> {
    inner: Weak<Inner<T>>,
    callback: Option<Arc<Callback>>,
}

impl<T> WeakTracked<T> {
    /// Get a strong handle if the value is still alive.
    pub fn try_resolve(&self) -> Option<Tracked<T>> {
        self.inner.upgrade().map(|inner| Tracked { inner })
    }

    /// Whether the value is still alive.
    ///
    /// The answer may be outdated as soon as it is returned, unless the caller holds a strong handle.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Whether this handle carries a death callback that has not run yet.
    pub fn is_armed(&self) -> bool {
        self.callback.as_ref().is_some_and(|c| c.lock().is_some())
    }

    /// Whether both weak handles point to the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// Whether this weak handle points to the value of `tracked`.
    pub fn refers_to(&self, tracked: &Tracked<T>) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&tracked.inner))
    }
}

impl<T> Drop for WeakTracked<T> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            // Release the callback captures after the lock is released.
            let disarmed = callback.lock().take();
            drop(disarmed);
        }
    }
}

/// Cloning a weak handle never clones its death callback.
impl<T> Clone for WeakTracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            callback: None,
        }
    }
}

impl<T> Debug for WeakTracked<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakTracked")
            .field("alive", &self.is_alive())
            .field("armed", &self.is_armed())
            .finish()
    }
}
