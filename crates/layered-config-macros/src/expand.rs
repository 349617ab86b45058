use proc_macro::TokenStream;
use quote::quote_spanned;
use syn::{spanned::Spanned, Data, DeriveInput, Fields};

/// The single field a newtype derives `FromConfigValue` through, plus how to name it in
/// constructor position (`NewType(__value)` vs `NewType { inner: __value }`).
struct NewtypeField {
    member: syn::Member,
    ty: syn::Type,
}

fn newtype_field(data: &Data, span: &impl Spanned) -> syn::Result<NewtypeField> {
    let Data::Struct(data) = data else {
        let message = "#[derive(FromConfigValue)] can only be placed on structs";
        return Err(syn::Error::new(span.span(), message));
    };
    let field = match &data.fields {
        Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
            let field = fields.unnamed.first().unwrap();
            NewtypeField {
                member: syn::Member::Unnamed(syn::Index::from(0)),
                ty: field.ty.clone(),
            }
        }
        Fields::Named(fields) if fields.named.len() == 1 => {
            let field = fields.named.first().unwrap();
            NewtypeField {
                member: syn::Member::Named(field.ident.clone().unwrap()),
                ty: field.ty.clone(),
            }
        }
        _ => {
            let message = "#[derive(FromConfigValue)] requires a struct with exactly one field";
            return Err(syn::Error::new(span.span(), message));
        }
    };
    Ok(field)
}

pub(crate) fn impl_from_config_value(input: TokenStream) -> TokenStream {
    let input: DeriveInput = syn::parse_macro_input!(input as DeriveInput);
    let field = match newtype_field(&input.data, &input.ident) {
        Ok(field) => field,
        Err(err) => return err.into_compile_error().into(),
    };

    let name = &input.ident;
    let name_span = name.span();
    let ty = &field.ty;
    let construct = match &field.member {
        syn::Member::Unnamed(_) => quote_spanned!(name_span=> #name(__value)),
        syn::Member::Named(ident) => quote_spanned!(name_span=> #name { #ident: __value }),
    };

    let expanded = quote_spanned! {name_span=>
        impl ::layered_config::FromConfigValue for #name {
            fn from_config_value(raw: &str) -> ::layered_config::anyhow::Result<Self> {
                let __value: #ty = ::layered_config::FromConfigValue::from_config_value(raw)?;
                ::core::result::Result::Ok(#construct)
            }
        }
    };
    expanded.into()
}
