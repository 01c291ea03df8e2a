//! Resolves whether generated code should refer to `trellis_core`/
//! `trellis_security`/`trellis_data`/`trellis_data_sqlx` directly or through
//! the `trellis` facade crate, depending on which one the user's `Cargo.toml`
//! actually depends on.

use proc_macro2::TokenStream;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::quote;

fn facade_or_direct(direct: &str, facade_module: &str) -> TokenStream {
    if let Ok(found) = crate_name("trellis") {
        let module = syn::Ident::new(facade_module, proc_macro2::Span::call_site());
        return match found {
            FoundCrate::Itself => quote!(crate::#module),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident::#module)
            }
        };
    }

    if let Ok(found) = crate_name(direct) {
        return match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident)
            }
        };
    }

    let fallback = syn::Ident::new(facade_module, proc_macro2::Span::call_site());
    quote!(::#fallback)
}

pub fn trellis_core_path() -> TokenStream {
    facade_or_direct("trellis-core", "trellis_core")
}

pub fn trellis_security_path() -> TokenStream {
    facade_or_direct("trellis-security", "trellis_security")
}

pub fn trellis_data_path() -> TokenStream {
    facade_or_direct("trellis-data", "trellis_data")
}

pub fn trellis_data_sqlx_path() -> TokenStream {
    facade_or_direct("trellis-data-sqlx", "trellis_data_sqlx")
}
