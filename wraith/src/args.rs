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

//! Dynamic constructor arguments and the instance keys computed from them.

use std::{
    any::Any,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

use itertools::Itertools;
use wraith_common::error::{Error, Result};

/// The reserved keyword that turns instance caching off for one construction.
///
/// It is never part of an [`InstanceKey`] and never reaches a constructor through [`crate::instantiate`].
pub const BYPASS_KEYWORD: &str = "disable_inst_caching";

/// An object compared and hashed by identity.
///
/// An explicit hash may be given with [`Opaque::with_hash`]. Equality stays identity based, so distinct objects with
/// the same hash are still distinct keys.
#[derive(Clone)]
pub struct Opaque {
    value: Arc<dyn Any + Send + Sync>,
    hash: Option<u64>,
    type_name: &'static str,
}

impl Opaque {
    /// Wrap `value` as an identity compared object.
    pub fn new<V>(value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        Self {
            value: Arc::new(value),
            hash: None,
            type_name: std::any::type_name::<V>(),
        }
    }

    /// Wrap `value` with an explicit hash.
    pub fn with_hash<V>(value: V, hash: u64) -> Self
    where
        V: Any + Send + Sync,
    {
        Self {
            hash: Some(hash),
            ..Self::new(value)
        }
    }

    /// Downcast the wrapped object.
    pub fn downcast_ref<V>(&self) -> Option<&V>
    where
        V: Any,
    {
        self.value.downcast_ref()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.value) as *const ()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Opaque {}

impl Hash for Opaque {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.hash {
            Some(hash) => hash.hash(state),
            None => (self.addr() as usize).hash(state),
        }
    }
}

impl Debug for Opaque {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} object at {:p}>", self.type_name, self.addr())
    }
}

/// A dynamic argument value.
///
/// `Float` compares by bit pattern with `-0.0` folded into `0.0`, which keeps [`Eq`] and [`Hash`] consistent. `List`
/// and `Map` are mutable containers: they compare structurally but cannot be part of an [`InstanceKey`].
#[derive(Clone)]
pub enum Arg {
    /// The absent value.
    None,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(Arc<str>),
    /// A byte string.
    Bytes(Arc<[u8]>),
    /// An immutable sequence.
    Tuple(Arc<[Arg]>),
    /// A mutable sequence.
    List(Arc<[Arg]>),
    /// A mutable mapping.
    Map(Arc<[(Arg, Arg)]>),
    /// An object compared by identity.
    Opaque(Opaque),
}

impl Arg {
    /// Build a tuple.
    pub fn tuple(items: impl IntoIterator<Item = impl Into<Arg>>) -> Self {
        Self::Tuple(items.into_iter().map_into::<Arg>().collect())
    }

    /// Build a list.
    pub fn list(items: impl IntoIterator<Item = impl Into<Arg>>) -> Self {
        Self::List(items.into_iter().map_into::<Arg>().collect())
    }

    /// Build a map.
    pub fn map<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Arg>,
        V: Into<Arg>,
    {
        Self::Map(items.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Whether the argument may be part of an [`InstanceKey`].
    pub fn is_hashable(&self) -> bool {
        match self {
            Arg::List(_) | Arg::Map(_) => false,
            Arg::Tuple(items) => items.iter().all(Arg::is_hashable),
            _ => true,
        }
    }

    /// Truthiness: empty, zero and `None` values are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Arg::None => false,
            Arg::Bool(v) => *v,
            Arg::Int(v) => *v != 0,
            Arg::Float(v) => *v != 0.0,
            Arg::Str(v) => !v.is_empty(),
            Arg::Bytes(v) => !v.is_empty(),
            Arg::Tuple(v) | Arg::List(v) => !v.is_empty(),
            Arg::Map(v) => !v.is_empty(),
            Arg::Opaque(_) => true,
        }
    }

    fn float_bits(v: f64) -> u64 {
        if v == 0.0 {
            0.0f64.to_bits()
        } else {
            v.to_bits()
        }
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Arg::None, Arg::None) => true,
            (Arg::Bool(a), Arg::Bool(b)) => a == b,
            (Arg::Int(a), Arg::Int(b)) => a == b,
            (Arg::Float(a), Arg::Float(b)) => Self::float_bits(*a) == Self::float_bits(*b),
            (Arg::Str(a), Arg::Str(b)) => a == b,
            (Arg::Bytes(a), Arg::Bytes(b)) => a == b,
            (Arg::Tuple(a), Arg::Tuple(b)) | (Arg::List(a), Arg::List(b)) => a == b,
            (Arg::Map(a), Arg::Map(b)) => a == b,
            (Arg::Opaque(a), Arg::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Arg {}

impl Hash for Arg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Arg::None => {}
            Arg::Bool(v) => v.hash(state),
            Arg::Int(v) => v.hash(state),
            Arg::Float(v) => Self::float_bits(*v).hash(state),
            Arg::Str(v) => v.hash(state),
            Arg::Bytes(v) => v.hash(state),
            Arg::Tuple(v) | Arg::List(v) => v.hash(state),
            Arg::Map(v) => v.hash(state),
            Arg::Opaque(v) => v.hash(state),
        }
    }
}

fn fmt_seq(f: &mut std::fmt::Formatter<'_>, open: &str, items: &[Arg], close: &str) -> std::fmt::Result {
    write!(f, "{open}{}", items.iter().join(", "))?;
    if open == "(" && items.len() == 1 {
        write!(f, ",")?;
    }
    write!(f, "{close}")
}

/// Renders the argument the way it reads in a warning or an error context.
impl Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::None => write!(f, "None"),
            Arg::Bool(true) => write!(f, "True"),
            Arg::Bool(false) => write!(f, "False"),
            Arg::Int(v) => write!(f, "{v}"),
            Arg::Float(v) => write!(f, "{v:?}"),
            Arg::Str(v) => write!(f, "'{}'", v.escape_default()),
            Arg::Bytes(v) => write!(f, "b'{}'", v.escape_ascii()),
            Arg::Tuple(v) => fmt_seq(f, "(", v, ")"),
            Arg::List(v) => fmt_seq(f, "[", v, "]"),
            Arg::Map(v) => write!(f, "{{{}}}", v.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")),
            Arg::Opaque(v) => write!(f, "{v:?}"),
        }
    }
}

impl Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v as _)
    }
}

impl From<u32> for Arg {
    fn from(v: u32) -> Self {
        Arg::Int(v as _)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.into())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Str(v.into())
    }
}

impl From<&[u8]> for Arg {
    fn from(v: &[u8]) -> Self {
        Arg::Bytes(v.into())
    }
}

impl From<Opaque> for Arg {
    fn from(v: Opaque) -> Self {
        Arg::Opaque(v)
    }
}

impl<A> From<Option<A>> for Arg
where
    A: Into<Arg>,
{
    fn from(v: Option<A>) -> Self {
        v.map_or(Arg::None, Into::into)
    }
}

/// Arguments of one construction call: positional arguments and keyword arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Arg>,
    keywords: Vec<(Arc<str>, Arg)>,
}

impl CallArgs {
    /// Create empty call arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Set a keyword argument. Setting the same name again replaces the earlier value.
    pub fn kwarg(mut self, name: impl Into<Arc<str>>, arg: impl Into<Arg>) -> Self {
        let name = name.into();
        let arg = arg.into();
        match self.keywords.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = arg,
            None => self.keywords.push((name, arg)),
        }
        self
    }

    /// Positional arguments.
    pub fn positional(&self) -> &[Arg] {
        &self.positional
    }

    /// Keyword arguments, in call order.
    pub fn keywords(&self) -> &[(Arc<str>, Arg)] {
        &self.keywords
    }

    /// Get a positional argument.
    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.positional.get(index)
    }

    /// Get a keyword argument.
    pub fn keyword(&self, name: &str) -> Option<&Arg> {
        self.keywords.iter().find(|(n, _)| n.as_ref() == name).map(|(_, v)| v)
    }

    /// Strip [`BYPASS_KEYWORD`] from the keywords, returning whether caching was turned off.
    pub fn take_bypass(&mut self) -> bool {
        match self.keywords.iter().position(|(n, _)| n.as_ref() == BYPASS_KEYWORD) {
            Some(index) => self.keywords.remove(index).1.is_truthy(),
            None => false,
        }
    }

    fn sorted_keywords(&self) -> Vec<(Arc<str>, Arg)> {
        self.keywords
            .iter()
            .filter(|(n, _)| n.as_ref() != BYPASS_KEYWORD)
            .cloned()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .collect()
    }
}

fn fmt_key(
    f: &mut std::fmt::Formatter<'_>,
    positional: &[Arg],
    keywords: Option<&[(Arc<str>, Arg)]>,
) -> std::fmt::Result {
    write!(f, "(")?;
    fmt_seq(f, "(", positional, ")")?;
    match keywords {
        None => write!(f, ", None)"),
        Some(keywords) => {
            let items = keywords
                .iter()
                .map(|(n, v)| Arg::tuple([Arg::Str(n.clone()), v.clone()]))
                .collect_vec();
            write!(f, ", ")?;
            fmt_seq(f, "(", &items, ")")?;
            write!(f, ")")
        }
    }
}

/// Renders the arguments as the key they would form.
impl Display for CallArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keywords = self.sorted_keywords();
        fmt_key(f, &self.positional, (!keywords.is_empty()).then_some(keywords.as_slice()))
    }
}

/// The identity of a construction: positional arguments plus keyword arguments sorted by name.
///
/// No keyword arguments at all is represented by a sentinel, so a call without keywords and a call with only
/// [`BYPASS_KEYWORD`] produce the same key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    positional: Arc<[Arg]>,
    keywords: Option<Arc<[(Arc<str>, Arg)]>>,
}

impl InstanceKey {
    /// Compute the key of `args`.
    ///
    /// Fails with [`wraith_common::error::ErrorKind::Unhashable`] if any argument is a mutable container.
    pub fn new(args: &CallArgs) -> Result<Self> {
        let keywords = args.sorted_keywords();
        let hashable = args.positional.iter().all(Arg::is_hashable) && keywords.iter().all(|(_, v)| v.is_hashable());
        if !hashable {
            return Err(Error::unhashable(args));
        }

        Ok(Self {
            positional: args.positional.as_slice().into(),
            keywords: (!keywords.is_empty()).then(|| keywords.into()),
        })
    }

    /// Positional part of the key.
    pub fn positional(&self) -> &[Arg] {
        &self.positional
    }

    /// Keyword part of the key, sorted by name. `None` if the call had no keywords.
    pub fn keywords(&self) -> Option<&[(Arc<str>, Arg)]> {
        self.keywords.as_deref()
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_key(f, &self.positional, self.keywords.as_deref())
    }
}

impl Debug for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InstanceKey{self}")
    }
}

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;

    use wraith_common::{code::DefaultHasher, error::ErrorKind};

    use super::*;

    #[test]
    fn test_keyword_order_independent() {
        let a = CallArgs::new().arg(1).kwarg("x", 1).kwarg("y", "two");
        let b = CallArgs::new().arg(1).kwarg("y", "two").kwarg("x", 1);
        let ka = InstanceKey::new(&a).unwrap();
        let kb = InstanceKey::new(&b).unwrap();
        assert_eq!(ka, kb);

        let hasher = DefaultHasher::default();
        assert_eq!(hasher.hash_one(&ka), hasher.hash_one(&kb));
        assert_eq!(ka.to_string(), "((1,), (('x', 1), ('y', 'two')))");
    }

    #[test]
    fn test_keyword_sentinel() {
        let plain = InstanceKey::new(&CallArgs::new().arg(1).arg(2)).unwrap();
        let bypass_only = InstanceKey::new(&CallArgs::new().arg(1).arg(2).kwarg(BYPASS_KEYWORD, false)).unwrap();
        assert!(plain.keywords().is_none());
        assert_eq!(plain, bypass_only);
        assert_eq!(plain.to_string(), "((1, 2), None)");
    }

    #[test]
    fn test_unhashable() {
        let args = CallArgs::new().arg(Arg::list(Vec::<Arg>::new()));
        let err = InstanceKey::new(&args).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unhashable);
        assert_eq!(err.context(), &[("key", "(([],), None)".to_string())]);

        let nested = CallArgs::new().arg(Arg::tuple([Arg::Int(1), Arg::map([("a", 1)])]));
        assert!(InstanceKey::new(&nested).is_err());

        let kw = CallArgs::new().kwarg("x", Arg::list([1, 2]));
        assert!(InstanceKey::new(&kw).is_err());
    }

    #[test]
    fn test_take_bypass() {
        let mut args = CallArgs::new().arg(1).kwarg(BYPASS_KEYWORD, true).kwarg("x", 2);
        assert!(args.take_bypass());
        assert!(args.keyword(BYPASS_KEYWORD).is_none());
        assert_eq!(args.keywords().len(), 1);
        assert!(!args.take_bypass());

        let mut args = CallArgs::new().kwarg(BYPASS_KEYWORD, 0);
        assert!(!args.take_bypass());
        assert!(args.keywords().is_empty());
    }

    #[test]
    fn test_float_and_identity_equality() {
        assert_eq!(Arg::Float(0.0), Arg::Float(-0.0));
        assert_ne!(Arg::Float(1.0), Arg::Int(1));

        let a = Opaque::with_hash(1u8, 42);
        let b = Opaque::with_hash(1u8, 42);
        let hasher = DefaultHasher::default();
        assert_eq!(hasher.hash_one(&a), hasher.hash_one(&b));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.downcast_ref::<u8>(), Some(&1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Arg::tuple([Arg::None, Arg::Bool(true)]).to_string(), "(None, True)");
        assert_eq!(Arg::Tuple(Arc::from([])).to_string(), "()");
        assert_eq!(Arg::from(&b"ab\n"[..]).to_string(), "b'ab\\n'");
        assert_eq!(Arg::map([("k", 1.5)]).to_string(), "{'k': 1.5}");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Arg::None.is_truthy());
        assert!(!Arg::Int(0).is_truthy());
        assert!(Arg::Int(3).is_truthy());
        assert!(!Arg::from("").is_truthy());
        assert!(Arg::list([0]).is_truthy());
        assert!(Arg::Opaque(Opaque::new(())).is_truthy());
    }
}
