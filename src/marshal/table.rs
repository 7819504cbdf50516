use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::proto::arg::Arg;

/// Accessors for one tagged field of `T`.
pub struct FieldBinding<T> {
    /// Name of the field on the wire.
    pub tag: &'static str,
    /// Reads the field; `None` leaves it out of flattened output.
    pub get: fn(&T) -> Option<Arg>,
    /// Parses a raw value into the field.
    pub set: fn(&mut T, &[u8]) -> Result<(), String>,
}

impl<T> fmt::Debug for FieldBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding").field("tag", &self.tag).finish()
    }
}

/// The field bindings of a type, in declaration order, indexed by tag.
pub struct FieldTable<T> {
    bindings: Vec<FieldBinding<T>>,
    by_tag: HashMap<&'static str, usize>,
}

impl<T> FieldTable<T> {
    /// Indexes `bindings`. When a tag repeats, the first binding wins.
    pub fn new(bindings: Vec<FieldBinding<T>>) -> Self {
        let mut by_tag = HashMap::with_capacity(bindings.len());
        for (index, binding) in bindings.iter().enumerate() {
            by_tag.entry(binding.tag).or_insert(index);
        }
        Self { bindings, by_tag }
    }

    /// All bindings in declaration order.
    pub fn bindings(&self) -> &[FieldBinding<T>] {
        &self.bindings
    }

    /// Looks a binding up by its wire tag.
    pub fn get(&self, tag: &str) -> Option<&FieldBinding<T>> {
        self.by_tag.get(tag).map(|&index| &self.bindings[index])
    }

    /// Tags in declaration order.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bindings.iter().map(|b| b.tag)
    }
}

impl<T> fmt::Debug for FieldTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tags()).finish()
    }
}

/// A struct whose fields map onto hash fields.
///
/// Implemented with [`redis_fields!`](crate::redis_fields); only the fields
/// listed there take part in flattening and scanning.
pub trait RedisFields: Default + 'static {
    /// Builds the bindings. Called once per type; use
    /// [`field_table`](RedisFields::field_table) to read them.
    fn bindings() -> Vec<FieldBinding<Self>>;

    /// The cached table for this type.
    fn field_table() -> &'static FieldTable<Self> {
        cached_table::<Self>()
    }
}

type TableCache = RwLock<HashMap<TypeId, &'static (dyn Any + Send + Sync)>>;

static TABLES: OnceLock<TableCache> = OnceLock::new();

/// Returns the table for `T`, building and leaking it on first use.
pub fn cached_table<T: RedisFields>() -> &'static FieldTable<T> {
    let cache = TABLES.get_or_init(Default::default);
    let id = TypeId::of::<T>();

    let cached = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .copied();
    let entry = match cached {
        Some(entry) => entry,
        None => {
            let mut tables = cache.write().unwrap_or_else(PoisonError::into_inner);
            let entry = *tables
                .entry(id)
                .or_insert_with(|| -> &'static (dyn Any + Send + Sync) {
                    Box::leak(Box::new(FieldTable::new(T::bindings())))
                });
            entry
        }
    };

    match entry.downcast_ref::<FieldTable<T>>() {
        Some(table) => table,
        // Keyed by TypeId, so the downcast always matches.
        None => Box::leak(Box::new(FieldTable::new(T::bindings()))),
    }
}

/// Implements [`RedisFields`](crate::marshal::RedisFields) and
/// [`Flatten`](crate::marshal::Flatten) for a struct.
///
/// Each entry binds a field to its wire tag. Fields that are not listed have
/// no tag and are skipped. Every listed field must implement
/// [`FieldValue`](crate::marshal::FieldValue).
///
/// ```
/// use respool::marshal::{flatten, scan_pairs};
/// use respool::proto::frame::Frame;
/// use respool::redis_fields;
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Session {
///     user: String,
///     visits: i64,
///     cached: bool,
/// }
///
/// redis_fields!(Session {
///     user => "user",
///     visits => "visits",
/// });
///
/// let session = Session { user: "ana".to_string(), visits: 3, cached: true };
/// assert_eq!(flatten(&session).len(), 4);
///
/// let mut loaded = Session::default();
/// scan_pairs(
///     &[Frame::bulk("user"), Frame::bulk("ana"), Frame::bulk("visits"), Frame::bulk("3")],
///     &mut loaded,
/// )
/// .unwrap();
/// assert_eq!(loaded, Session { user: "ana".to_string(), visits: 3, cached: false });
/// ```
#[macro_export]
macro_rules! redis_fields {
    ($ty:ty { $($field:ident => $tag:literal),* $(,)? }) => {
        impl $crate::marshal::RedisFields for $ty {
            fn bindings() -> ::std::vec::Vec<$crate::marshal::FieldBinding<Self>> {
                ::std::vec![
                    $(
                        $crate::marshal::FieldBinding {
                            tag: $tag,
                            get: |value: &Self| -> ::std::option::Option<$crate::proto::arg::Arg> {
                                $crate::marshal::FieldValue::to_arg(&value.$field)
                            },
                            set: |value: &mut Self, raw: &[u8]| -> ::std::result::Result<(), ::std::string::String> {
                                value.$field = $crate::marshal::FieldValue::from_wire(raw)?;
                                ::std::result::Result::Ok(())
                            },
                        },
                    )*
                ]
            }
        }

        impl $crate::marshal::Flatten for $ty {
            fn flatten_into(&self, args: &mut ::std::vec::Vec<$crate::proto::arg::Arg>) {
                $crate::marshal::flatten_fields(self, args)
            }
        }
    };
}
