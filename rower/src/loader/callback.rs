//! Per row callback loader.
use std::marker::PhantomData;

use super::{ColumnLoader, Loader};
use crate::{
    Error, Result,
    decode::{Decode, DecodeError},
    mapper::Record,
    row::{Column, ColumnInfo},
};

/// Positional callback parameters, implemented for tuples of [`Decode`] up to 8 elements.
pub trait Arguments: Sized {
    /// Decoded parameters of the current row.
    type Slots: Default;

    /// Number of parameters.
    const ARITY: usize;

    /// Decode column into parameter at `index`.
    fn load(slots: &mut Self::Slots, index: usize, column: Column) -> Result<(), DecodeError>;

    /// Take all decoded parameters, missing one is an error.
    fn take(slots: &mut Self::Slots) -> Result<Self, DecodeError>;
}

/// A function that can be called with [`Arguments`].
pub trait RowFn<Args> {
    fn call(&mut self, args: Args) -> Result<()>;
}

/// Allowed callback return type, `()` or `Result<(), E>`.
pub trait IntoCallbackResult {
    fn into_result(self) -> Result<()>;
}

impl IntoCallbackResult for () {
    fn into_result(self) -> Result<()> {
        Ok(())
    }
}

impl<E: Into<Error>> IntoCallbackResult for Result<(), E> {
    fn into_result(self) -> Result<()> {
        self.map_err(Into::into)
    }
}

macro_rules! arguments {
    ($arity:literal; $($t:ident $i:tt),*) => {
        impl<$($t: Decode),*> Arguments for ($($t,)*) {
            type Slots = ($(Option<$t>,)*);

            const ARITY: usize = $arity;

            fn load(slots: &mut Self::Slots, index: usize, column: Column) -> Result<(), DecodeError> {
                match index {
                    $($i => slots.$i = Some(column.decode()?),)*
                    _ => return Err(DecodeError::ArgumentCount { columns: index + 1, arguments: $arity }),
                }
                Ok(())
            }

            fn take(slots: &mut Self::Slots) -> Result<Self, DecodeError> {
                Ok(($(
                    match slots.$i.take() {
                        Some(value) => value,
                        None => return Err(DecodeError::ArgumentCount { columns: $i, arguments: $arity }),
                    },
                )*))
            }
        }

        impl<Func, Ret, $($t),*> RowFn<($($t,)*)> for Func
        where
            Func: FnMut($($t),*) -> Ret,
            Ret: IntoCallbackResult,
        {
            #[allow(non_snake_case)]
            fn call(&mut self, ($($t,)*): ($($t,)*)) -> Result<()> {
                (*self)($($t),*).into_result()
            }
        }
    };
}

arguments!(1; A0 0);
arguments!(2; A0 0, A1 1);
arguments!(3; A0 0, A1 1, A2 2);
arguments!(4; A0 0, A1 1, A2 2, A3 3);
arguments!(5; A0 0, A1 1, A2 2, A3 3, A4 4);
arguments!(6; A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
arguments!(7; A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6);
arguments!(8; A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7);

/// Call a function for each row, columns are bound to parameters by position.
///
/// The parameter count must equal the column count, checked when the result set
/// is described, before any row is processed.
pub struct Callback<F, Args: Arguments> {
    f: F,
    slots: Args::Slots,
    _p: PhantomData<fn(Args)>,
}

impl<F, Args> Callback<F, Args>
where
    F: RowFn<Args>,
    Args: Arguments,
{
    pub fn new(f: F) -> Self {
        Self { f, slots: Default::default(), _p: PhantomData }
    }
}

impl<F, Args: Arguments> ColumnLoader for Callback<F, Args> {
    fn load_column(&mut self, index: usize, column: Column) -> Result<(), DecodeError> {
        Args::load(&mut self.slots, index, column)
    }
}

impl<F, Args> Loader for Callback<F, Args>
where
    F: RowFn<Args>,
    Args: Arguments,
{
    fn describe(&mut self, columns: &[ColumnInfo]) -> Result<(), DecodeError> {
        if columns.len() != Args::ARITY {
            return Err(DecodeError::ArgumentCount { columns: columns.len(), arguments: Args::ARITY });
        }
        Ok(())
    }

    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self.slots = Default::default();
        self
    }

    fn end_record(&mut self) -> Result<()> {
        let args = Args::take(&mut self.slots)?;
        self.f.call(args)
    }
}

/// Call a function for each row with a reused record.
pub struct RecordCallback<F, T> {
    f: F,
    record: T,
}

impl<F, T, R> RecordCallback<F, T>
where
    F: FnMut(&T) -> R,
    R: IntoCallbackResult,
    T: Record + Default,
{
    pub fn new(f: F) -> Self {
        Self { f, record: T::default() }
    }
}

impl<F, T, R> Loader for RecordCallback<F, T>
where
    F: FnMut(&T) -> R,
    R: IntoCallbackResult,
    T: Record + Default,
{
    fn new_record(&mut self) -> &mut dyn ColumnLoader {
        self.record = T::default();
        &mut self.record
    }

    fn end_record(&mut self) -> Result<()> {
        (self.f)(&self.record).into_result()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::ErrorKind, mapper::FieldMapBuilder};
    use bytes::Bytes;

    fn col(value: Option<&'static str>) -> Column {
        Column::from_parts("c", 0, value.map(|e| Bytes::from_static(e.as_bytes())))
    }

    fn row<L: Loader>(loader: &mut L, values: &[Option<&'static str>]) -> Result<()> {
        let record = loader.new_record();
        for (i, value) in values.iter().enumerate() {
            record.load_column(i, col(*value))?;
        }
        loader.end_record()
    }

    fn describe(n: usize) -> Vec<ColumnInfo> {
        use crate::postgres::backend::RowDescription;
        use bytes::{BufMut, BytesMut};

        let mut body = BytesMut::new();
        for _ in 0..n {
            body.put_slice(b"c\0");
            body.put_u32(0);
            body.put_i16(0);
            body.put_u32(25);
            body.put_i16(-1);
            body.put_i32(-1);
            body.put_u16(0);
        }
        ColumnInfo::parse(RowDescription { field_len: n as u16, body: body.freeze() }).unwrap()
    }

    #[test]
    fn positional() {
        let mut seen = vec![];
        let mut cb = Callback::new(|id: i32, name: Option<String>| seen.push((id, name)));
        cb.describe(&describe(2)).unwrap();
        row(&mut cb, &[Some("1"), None]).unwrap();
        row(&mut cb, &[Some("2"), Some("x")]).unwrap();
        drop(cb);
        assert_eq!(seen, [(1, None), (2, Some("x".to_owned()))]);
    }

    #[test]
    fn argument_count() {
        let mut cb = Callback::new(|_: i32, _: i32, _: i32| {});
        let err = cb.describe(&describe(2)).unwrap_err();
        assert!(matches!(err, DecodeError::ArgumentCount { columns: 2, arguments: 3 }));

        let mut cb = Callback::new(|_: i32| {});
        assert!(cb.describe(&describe(2)).is_err());
        assert!(row(&mut cb, &[Some("1"), Some("2")]).is_err());
    }

    #[test]
    fn callback_error() {
        let mut cb = Callback::new(|id: i32| -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            match id {
                0 => Err("zero".into()),
                _ => Ok(()),
            }
        });
        row(&mut cb, &[Some("1")]).unwrap();
        let err = row(&mut cb, &[Some("0")]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Callback(_)));
    }

    #[derive(Default)]
    struct Stuff {
        id: i32,
        middle_name: Option<String>,
    }

    impl Record for Stuff {
        fn map_fields(map: &mut FieldMapBuilder<Self>) {
            map.field("c", |r, col| {
                r.middle_name = col.decode()?;
                Ok(())
            });
        }
    }

    #[test]
    fn record_callback() {
        let mut names = vec![];
        let mut cb = RecordCallback::new(|s: &Stuff| names.push((s.id, s.middle_name.clone())));
        row(&mut cb, &[None]).unwrap();
        row(&mut cb, &[Some("test")]).unwrap();
        row(&mut cb, &[None]).unwrap();
        drop(cb);
        assert_eq!(names, [(0, None), (0, Some("test".to_owned())), (0, None)]);
    }
}
