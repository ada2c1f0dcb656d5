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

/// Scoped extensions.
///
/// `guard.with(|guard| ...)` bounds a lock critical section to the closure, which makes it explicit
/// that everything returned from the closure is released after the guard.
pub trait Scope {
    /// Scoped with ownership.
    fn with<F, R>(self, f: F) -> R
    where
        Self: Sized,
        F: FnOnce(Self) -> R,
    {
        f(self)
    }
}
impl<T> Scope for T {}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_scope_releases_guard() {
        let m = Mutex::new(vec![1, 2, 3]);
        let len = m.lock().with(|mut v| {
            v.push(4);
            v.len()
        });
        assert_eq!(len, 4);
        assert!(m.try_lock().is_some());
    }
}
