//! Column name to record field mapping.
//!
//! A [`Record`] declares its fields once through [`Record::map_fields`], the resulting
//! [`FieldMap`] is built on first use and cached for the rest of the process.
//!
//! Usually implemented with derive macro:
//!
//! ```
//! #[derive(Default, rower::Record)]
//! struct Stuff {
//!     id: i64,
//!     #[sql("first_name")]
//!     name: String,
//!     middle_name: Option<String>,
//! }
//! ```
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{OnceLock, PoisonError, RwLock},
};

use crate::{decode::DecodeError, row::Column};

/// Decode column into a record field.
pub type Setter<T> = fn(&mut T, Column) -> Result<(), DecodeError>;

/// A struct shaped destination whose fields are mapped by column name.
pub trait Record: Sized + 'static {
    /// Register every mapped field.
    fn map_fields(map: &mut FieldMapBuilder<Self>);
}

/// Column name to field setter table of a [`Record`].
pub struct FieldMap<T> {
    fields: HashMap<&'static str, Setter<T>>,
}

type Registry = RwLock<HashMap<TypeId, &'static (dyn Any + Send + Sync)>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl<T: Record> FieldMap<T> {
    /// Get the cached field map for `T`, building it on first call.
    pub fn get() -> &'static FieldMap<T> {
        let registry = REGISTRY.get_or_init(Default::default);
        let id = TypeId::of::<T>();

        let cached = registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied();

        if let Some(map) = cached.and_then(|e| e.downcast_ref()) {
            return map;
        }

        let mut builder = FieldMapBuilder { fields: HashMap::new() };
        T::map_fields(&mut builder);

        let mut registry = registry.write().unwrap_or_else(PoisonError::into_inner);
        let entry = *registry.entry(id).or_insert_with(|| {
            crate::common::verbose!(record = std::any::type_name::<T>(), "field map built");
            let map: &'static (dyn Any + Send + Sync) =
                Box::leak(Box::new(FieldMap::<T> { fields: builder.fields }));
            map
        });

        match entry.downcast_ref() {
            Some(map) => map,
            None => unreachable!("registry is keyed by type id"),
        }
    }

    /// Decode `column` into the field mapped by its name.
    pub fn load(&self, record: &mut T, column: Column) -> Result<(), DecodeError> {
        match self.fields.get(column.name()) {
            Some(setter) => setter(record, column),
            None => Err(DecodeError::Unmapped(column.name_bytestr())),
        }
    }

    /// Returns `true` if `name` is mapped.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder passed to [`Record::map_fields`].
pub struct FieldMapBuilder<T> {
    fields: HashMap<&'static str, Setter<T>>,
}

impl<T> FieldMapBuilder<T> {
    /// Map column `name` to `setter`, later registration with the same name wins.
    pub fn field(&mut self, name: &'static str, setter: Setter<T>) -> &mut Self {
        self.fields.insert(name, setter);
        self
    }
}
