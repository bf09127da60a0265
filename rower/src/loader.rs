//! Result destinations.
//!
//! A [`Loader`] receives every row of a result set, for each row it provides a
//! destination through [`Loader::new_record`], then every column is handed to that
//! destination by index through [`ColumnLoader::load_column`].
//!
//! Provided loaders:
//!
//! - [`Vec<T>`] of [`Record`], one record per row
//! - [`Single`], load into a single record
//! - [`Strings`], [`Ints`] and [`IntSet`], flatten columns of every row
//! - [`Values`], load into list of existing values
//! - [`Callback`] and [`RecordCallback`], call a function for each row
//! - [`Discard`], drop everything
use std::collections::HashSet;

use crate::{
    Result,
    decode::{Decode, DecodeError, DecodeInto},
    mapper::{FieldMap, Record},
    row::{Column, ColumnInfo},
};

mod callback;

pub use callback::{Arguments, Callback, IntoCallbackResult, RecordCallback, RowFn};

/// Destination of a single row.
pub trait ColumnLoader {
    /// Place the column at `index` into the destination.
    fn load_column(&mut self, index: usize, column: Column) -> Result<(), DecodeError>;
}

/// Record is loaded by column name through its [`FieldMap`].
impl<T: Record> ColumnLoader for T {
    fn load_column(&mut self, _: usize, column: Column) -> Result<(), DecodeError> {
        FieldMap::<T>::get().load(self, column)
    }
}

/// Destination factory for a result set.
pub trait Loader {
    /// Called when the result set columns are described, before any row.
    fn describe(&mut self, columns: &[ColumnInfo]) -> Result<(), DecodeError> {
        let _ = columns;
        Ok(())
    }

    /// Returns destination for the next row.
    fn new_record(&mut self) -> &mut dyn ColumnLoader;

    /// Called after every column of a row is loaded.
    fn end_record(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called instead of [`Loader::end_record`] when a column of the row failed to load.
    fn abort_record(&mut self) { }
}

/// Append a new record for each row.
///
/// A row that fails to load is removed, the list only contains complete records.
impl<T: Record + Default> Loader for Vec<T> {
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self.push(T::default());
        let len = self.len();
        &mut self[len - 1]
    }

    fn abort_record(&mut self) {
        self.pop();
    }
}

/// Load every row into the same record.
///
/// Used to load a single row result, the last row wins.
#[derive(Debug)]
pub struct Single<'a, T>(pub &'a mut T);

impl<T: Record> Loader for Single<'_, T> {
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        &mut *self.0
    }
}

/// Accept and drop every column.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ColumnLoader for Discard {
    fn load_column(&mut self, _: usize, _: Column) -> Result<(), DecodeError> {
        Ok(())
    }
}

impl Loader for Discard {
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self
    }
}

/// List of string, every column of every row is appended.
///
/// NULL is appended as empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Strings(pub Vec<String>);

impl ColumnLoader for Strings {
    fn load_column(&mut self, _: usize, column: Column) -> Result<(), DecodeError> {
        self.0.push(Option::<String>::decode(column)?.unwrap_or_default());
        Ok(())
    }
}

impl Loader for Strings {
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self
    }
}

/// List of integer, every column of every row is appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ints(pub Vec<i64>);

impl ColumnLoader for Ints {
    fn load_column(&mut self, _: usize, column: Column) -> Result<(), DecodeError> {
        self.0.push(column.decode()?);
        Ok(())
    }
}

impl Loader for Ints {
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self
    }
}

/// Set of integer, every column of every row is inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntSet(pub HashSet<i64>);

impl ColumnLoader for IntSet {
    fn load_column(&mut self, _: usize, column: Column) -> Result<(), DecodeError> {
        self.0.insert(column.decode()?);
        Ok(())
    }
}

impl Loader for IntSet {
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self
    }
}

/// Load columns by position into existing values.
///
/// Created with [`values!`][crate::values].
pub struct Values<'a>(pub Vec<&'a mut dyn DecodeInto>);

impl ColumnLoader for Values<'_> {
    fn load_column(&mut self, index: usize, column: Column) -> Result<(), DecodeError> {
        match self.0.get_mut(index) {
            Some(value) => value.decode_into(column),
            None => Err(DecodeError::IndexOutOfBounds(index)),
        }
    }
}

impl Loader for Values<'_> {
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self
    }
}

/// Create [`Values`] loader.
///
/// ```
/// let mut id = 0i64;
/// let mut name = String::new();
/// let loader = rower::values![id, name];
/// # drop(loader);
/// ```
#[macro_export]
macro_rules! values {
    ($($value:expr),* $(,)?) => {
        $crate::loader::Values(::std::vec![$(&mut $value as &mut dyn $crate::decode::DecodeInto),*])
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mapper::FieldMapBuilder;
    use bytes::Bytes;

    fn col(value: Option<&'static str>) -> Column {
        Column::from_parts("c", 0, value.map(|e| Bytes::from_static(e.as_bytes())))
    }

    fn load_rows<L: Loader>(loader: &mut L, rows: &[&[Option<&'static str>]]) -> Result<()> {
        for row in rows {
            let record = loader.new_record();
            for (i, value) in row.iter().enumerate() {
                record.load_column(i, col(*value))?;
            }
            loader.end_record()?;
        }
        Ok(())
    }

    #[test]
    fn scalar_collections() {
        let mut strings = Strings::default();
        load_rows(&mut strings, &[&[Some("a")], &[None], &[Some("b")]]).unwrap();
        assert_eq!(strings.0, ["a", "", "b"]);

        let mut ints = Ints::default();
        load_rows(&mut ints, &[&[Some("1"), Some("2")], &[Some("2")]]).unwrap();
        assert_eq!(ints.0, [1, 2, 2]);

        let mut set = IntSet::default();
        load_rows(&mut set, &[&[Some("1")], &[Some("1")], &[Some("3")]]).unwrap();
        assert_eq!(set.0.len(), 2);

        assert!(load_rows(&mut Ints::default(), &[&[None]]).is_err());
    }

    #[test]
    fn values() {
        let mut id = 0i64;
        let mut name = None::<String>;
        let mut loader = crate::values![id, name];
        load_rows(&mut loader, &[&[Some("9"), Some("x")]]).unwrap();
        assert!(load_rows(&mut loader, &[&[Some("9"), Some("x"), Some("y")]]).is_err());
        drop(loader);
        assert_eq!(id, 9);
        assert_eq!(name.as_deref(), Some("x"));
    }

    #[derive(Default)]
    struct Pair {
        a: i32,
    }

    impl Record for Pair {
        fn map_fields(map: &mut FieldMapBuilder<Self>) {
            map.field("c", |r, col| {
                r.a = col.decode()?;
                Ok(())
            });
        }
    }

    #[test]
    fn records() {
        let mut pairs = Vec::<Pair>::new();
        load_rows(&mut pairs, &[&[Some("1")], &[Some("2")]]).unwrap();
        assert_eq!(pairs.iter().map(|e| e.a).collect::<Vec<_>>(), [1, 2]);

        let mut pair = Pair::default();
        load_rows(&mut Single(&mut pair), &[&[Some("5")]]).unwrap();
        assert_eq!(pair.a, 5);

        load_rows(&mut Discard, &[&[Some("5"), None]]).unwrap();
    }
}
