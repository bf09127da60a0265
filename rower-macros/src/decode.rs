use proc_macro::TokenStream;
use quote::quote;
use syn::*;

use crate::error;

pub fn decode(input: DeriveInput) -> Result<TokenStream> {
    let DeriveInput { attrs: _, vis: _, ident, mut generics, data } = input;

    let body = match data {
        Data::Struct(st) => match &st.fields {
            Fields::Unnamed(FieldsUnnamed { unnamed, .. }) => {
                if unnamed.len() != 1 {
                    error!(ident.span(), "only one field struct is supported")
                }

                quote! {
                    Ok(Self(column.decode()?))
                }
            }
            Fields::Named(FieldsNamed { named, .. }) => {
                let Some(name) = named.first().and_then(|e| e.ident.as_ref()) else {
                    error!(ident.span(), "only one field struct is supported")
                };
                if named.len() != 1 {
                    error!(ident.span(), "only one field struct is supported")
                }

                quote! {
                    Ok(Self {
                        #name: column.decode()?,
                    })
                }
            },
            Fields::Unit => quote! { Ok(Self) }
        },
        Data::Enum(_) => error!(ident.span(), "enum is not yet supported"),
        Data::Union(_) => error!(ident.span(), "union is not supported"),
    };

    for ty in generics.type_params_mut() {
        ty.bounds.push(parse_quote!(::rower::Decode));
    }

    let (g1, g2, g3) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #g1 ::rower::Decode for #ident #g2 #g3 {
            fn decode(column: ::rower::Column) -> ::core::result::Result<Self, ::rower::DecodeError> {
                #body
            }
        }
    }.into())
}
