use proc_macro::TokenStream;
use quote::quote;
use syn::{ext::IdentExt, spanned::Spanned, *};

use crate::error;

enum Mapping {
    Column(String),
    Skip,
}

fn mapping(field: &Field) -> Result<Mapping> {
    let mut mapping = None;

    for attr in field.attrs.iter().filter(|e| e.path().is_ident("sql")) {
        if mapping.is_some() {
            error!(attr.span(), "duplicate `sql` attribute");
        }
        mapping = Some(attr.parse_args_with(|input: parse::ParseStream| {
            if input.peek(LitStr) {
                let name: LitStr = input.parse()?;
                if name.value().is_empty() {
                    error!(name.span(), "column name cannot be empty");
                }
                return Ok(Mapping::Column(name.value()));
            }
            let ident: Ident = input.parse()?;
            match ident.to_string().as_str() {
                "skip" => Ok(Mapping::Skip),
                other => error!(ident.span(), "unknown attribute `{other}`, expected `skip` or a column name"),
            }
        })?);
    }

    match mapping {
        Some(mapping) => Ok(mapping),
        None => {
            let Some(ident) = &field.ident else {
                error!(field.span(), "expected named field")
            };
            Ok(Mapping::Column(ident.unraw().to_string()))
        }
    }
}

pub fn record(input: DeriveInput) -> Result<TokenStream> {
    let DeriveInput { attrs: _, vis: _, ident, mut generics, data } = input;

    let named = match data {
        Data::Struct(DataStruct { fields: Fields::Named(FieldsNamed { named, .. }), .. }) => named,
        Data::Struct(_) => error!(ident.span(), "`Record` requires named fields, use row callback for positional columns"),
        Data::Enum(_) | Data::Union(_) => error!(ident.span(), "only struct is supported"),
    };

    let mut setters = vec![];

    for field in &named {
        let Mapping::Column(name) = mapping(field)? else {
            continue;
        };
        let Some(id) = &field.ident else {
            error!(field.span(), "expected named field")
        };
        setters.push(quote! {
            map.field(#name, |record, column| {
                record.#id = column.decode()?;
                Ok(())
            });
        });
    }

    for ty in generics.type_params_mut() {
        ty.bounds.push(parse_quote!(::rower::Decode));
        ty.bounds.push(parse_quote!('static));
    }

    let (g1, g2, g3) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #g1 ::rower::Record for #ident #g2 #g3 {
            fn map_fields(map: &mut ::rower::mapper::FieldMapBuilder<Self>) {
                #(#setters)*
            }
        }
    }.into())
}
