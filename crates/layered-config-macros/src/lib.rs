//! `#[derive(FromConfigValue)]`. Placed on a single-field newtype, it delegates conversion to the
//! field's own [`layered_config::FromConfigValue`] implementation.

extern crate proc_macro;

use proc_macro::TokenStream;

mod expand;

#[proc_macro_derive(FromConfigValue)]
pub fn derive_from_config_value(input: TokenStream) -> TokenStream {
    expand::impl_from_config_value(input)
}
