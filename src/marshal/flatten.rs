use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use crate::marshal::table::RedisFields;
use crate::proto::arg::Arg;

/// Values that expand into a `key, value, key, value, ...` argument list.
pub trait Flatten {
    /// Appends the flattened pairs to `args`.
    fn flatten_into(&self, args: &mut Vec<Arg>);
}

/// Flattens `value` into a fresh argument list.
pub fn flatten<T: Flatten + ?Sized>(value: &T) -> Vec<Arg> {
    let mut args = Vec::new();
    value.flatten_into(&mut args);
    args
}

/// Flattens the tagged fields of a struct in declaration order. Fields whose
/// value yields no argument (`None` options) are skipped together with their
/// tag.
pub fn flatten_fields<T: RedisFields>(value: &T, args: &mut Vec<Arg>) {
    for binding in T::field_table().bindings() {
        if let Some(arg) = (binding.get)(value) {
            args.push(Arg::from(binding.tag));
            args.push(arg);
        }
    }
}

impl<T: Flatten + ?Sized> Flatten for &T {
    fn flatten_into(&self, args: &mut Vec<Arg>) {
        (**self).flatten_into(args)
    }
}

impl<K, V, S> Flatten for HashMap<K, V, S>
where
    K: Clone + Into<Arg>,
    V: Clone + Into<Arg>,
    S: BuildHasher,
{
    fn flatten_into(&self, args: &mut Vec<Arg>) {
        args.reserve(self.len() * 2);
        for (key, value) in self {
            args.push(key.clone().into());
            args.push(value.clone().into());
        }
    }
}

impl<K, V> Flatten for BTreeMap<K, V>
where
    K: Clone + Into<Arg>,
    V: Clone + Into<Arg>,
{
    fn flatten_into(&self, args: &mut Vec<Arg>) {
        args.reserve(self.len() * 2);
        for (key, value) in self {
            args.push(key.clone().into());
            args.push(value.clone().into());
        }
    }
}

impl<K, V> Flatten for [(K, V)]
where
    K: Clone + Into<Arg>,
    V: Clone + Into<Arg>,
{
    fn flatten_into(&self, args: &mut Vec<Arg>) {
        args.reserve(self.len() * 2);
        for (key, value) in self {
            args.push(key.clone().into());
            args.push(value.clone().into());
        }
    }
}

impl<K, V> Flatten for Vec<(K, V)>
where
    K: Clone + Into<Arg>,
    V: Clone + Into<Arg>,
{
    fn flatten_into(&self, args: &mut Vec<Arg>) {
        self.as_slice().flatten_into(args)
    }
}
