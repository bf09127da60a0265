use proc_macro::TokenStream;
use syn::DeriveInput;

mod record;
mod decode;

macro_rules! error {
    ($span:expr, $($tt:tt)*) => {
        return Err(syn::Error::new($span, format!($($tt)*)))
    };
}

pub(crate) use error;

/// Derive `Record`, mapping each named field by column name.
///
/// Field attributes:
///
/// - `#[sql("column")]` map the field to a differently named column
/// - `#[sql(skip)]` never map the field
#[proc_macro_derive(Record, attributes(sql))]
pub fn record(input: TokenStream) -> TokenStream {
    match record::record(syn::parse_macro_input!(input as DeriveInput)) {
        Ok(ok) => ok,
        Err(err) => err.into_compile_error().into(),
    }
}

/// Derive `Decode` for single field struct, delegating to the field.
#[proc_macro_derive(Decode)]
pub fn decode(input: TokenStream) -> TokenStream {
    match decode::decode(syn::parse_macro_input!(input as DeriveInput)) {
        Ok(ok) => ok,
        Err(err) => err.into_compile_error().into(),
    }
}
