//! `#[routes]`: expands an `impl Controller { ... }` block into route
//! registrations. Each method annotated `#[get("/path")]` (or `post`/`put`/
//! `delete`/`patch`) becomes one entry in the generated `__trellis_routes`
//! associated function, which `AppBuilder` wiring feeds into `.route(...)`.
//!
//! `#[get]`/`#[post]`/`#[put]`/`#[delete]`/`#[patch]` are themselves
//! registered as identity no-op attribute macros (see `lib.rs`) purely so
//! rust-analyzer and `cargo doc` don't choke on an "unknown attribute" when
//! they see one used inside this block — by the time they would run, this
//! macro has already parsed and stripped them from its own raw token view
//! of the impl block.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Attribute, ImplItem, ItemImpl, LitStr, Token};

use crate::crate_path::trellis_core_path;

pub(crate) const ROUTE_ATTRS: &[&str] = &["get", "post", "put", "delete", "patch"];

struct RoutesArgs {
    base: Option<String>,
}

impl Parse for RoutesArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut base = None;
        let pairs = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated(input)?;
        for pair in pairs {
            if pair.path.is_ident("base") {
                if let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(s), .. }) = &pair.value {
                    base = Some(s.value());
                }
            }
        }
        Ok(RoutesArgs { base })
    }
}

pub fn expand(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(args as RoutesArgs);
    let item_impl = syn::parse_macro_input!(input as ItemImpl);
    match generate(&args, &item_impl) {
        Ok(out) => out.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

pub(crate) fn route_attr(attrs: &[Attribute]) -> Option<(&'static str, Attribute)> {
    attrs.iter().find_map(|attr| {
        ROUTE_ATTRS
            .iter()
            .find(|name| attr.path().is_ident(name))
            .map(|name| (*name, attr.clone()))
    })
}

pub(crate) fn http_method_tokens(krate: &TokenStream2, name: &str) -> TokenStream2 {
    match name {
        "get" => quote! { #krate::http::Method::GET },
        "post" => quote! { #krate::http::Method::POST },
        "put" => quote! { #krate::http::Method::PUT },
        "delete" => quote! { #krate::http::Method::DELETE },
        "patch" => quote! { #krate::http::Method::PATCH },
        _ => unreachable!("route_attr only returns names from ROUTE_ATTRS"),
    }
}

fn generate(args: &RoutesArgs, item_impl: &ItemImpl) -> syn::Result<TokenStream2> {
    let self_ty = &item_impl.self_ty;
    let krate = trellis_core_path();
    let base = args.base.clone().unwrap_or_default();

    let mut cleaned_items: Vec<TokenStream2> = Vec::new();
    let mut shims: Vec<TokenStream2> = Vec::new();
    let mut registrations: Vec<TokenStream2> = Vec::new();
    let mut scanner_entries: Vec<TokenStream2> = Vec::new();

    for item in &item_impl.items {
        let ImplItem::Fn(method) = item else {
            cleaned_items.push(quote! { #item });
            continue;
        };

        let Some((verb, attr)) = route_attr(&method.attrs) else {
            cleaned_items.push(quote! { #method });
            continue;
        };

        let path_lit: LitStr = attr.parse_args().map_err(|_| {
            syn::Error::new_spanned(&attr, format!("#[{verb}(...)] expects a single string literal path"))
        })?;
        let path = path_lit.value();
        let full_path = join_path(&base, &path);
        let method_ident = &method.sig.ident;
        let shim_ident = format_ident!("__TrellisHandler_{}_{}", self_ty_ident(self_ty), method_ident);
        let method_tokens = http_method_tokens(&krate, verb);

        registrations.push(quote! {
            (
                #method_tokens,
                #full_path.to_string(),
                std::sync::Arc::new(#shim_ident(controller.clone())) as std::sync::Arc<dyn #krate::pipeline::Handler>,
            )
        });

        let self_ty_name: String = quote!(#self_ty).to_string().split_whitespace().collect();
        scanner_entries.push(quote! {
            #krate::registry::RouteRegistration {
                method: #method_tokens,
                path: #full_path.to_string(),
                controller_type: std::any::TypeId::of::<#self_ty>(),
                controller_name: #self_ty_name,
                handler_name: stringify!(#method_ident),
            }
        });

        shims.push(quote! {
            #[allow(non_camel_case_types)]
            struct #shim_ident(std::sync::Arc<#self_ty>);

            #[#krate::async_trait::async_trait]
            impl #krate::pipeline::Handler for #shim_ident {
                async fn call(
                    &self,
                    ctx: #krate::pipeline::RequestContext,
                ) -> Result<#krate::http::Response<#krate::bytes::Bytes>, #krate::error::AppError> {
                    self.0.#method_ident(ctx).await
                }
            }
        });

        let mut stripped = method.clone();
        stripped.attrs.retain(|a| !ROUTE_ATTRS.iter().any(|n| a.path().is_ident(n)));
        cleaned_items.push(quote! { #stripped });
    }

    let attrs = &item_impl.attrs;
    let (impl_generics, _, where_clause) = item_impl.generics.split_for_impl();

    Ok(quote! {
        #(#shims)*

        #(#attrs)*
        impl #impl_generics #self_ty #where_clause {
            #(#cleaned_items)*

            /// Route table entries generated from this block's `#[get]`/
            /// `#[post]`/`#[put]`/`#[delete]`/`#[patch]` methods.
            pub fn __trellis_routes(
                controller: std::sync::Arc<Self>,
            ) -> Vec<(#krate::http::Method, String, std::sync::Arc<dyn #krate::pipeline::Handler>)> {
                vec![#(#registrations),*]
            }

            /// Scanner-table entries for this block, for
            /// `AppBuilder::with_route_registrations`.
            pub fn __trellis_route_registrations() -> Vec<#krate::registry::RouteRegistration> {
                vec![#(#scanner_entries),*]
            }
        }
    })
}

pub(crate) fn self_ty_ident(ty: &syn::Type) -> String {
    quote!(#ty).to_string().replace([':', ' ', '<', '>'], "_")
}

pub(crate) fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if !path.starts_with('/') {
        return format!("{base}/{path}");
    }
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{base}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::join_path;

    #[test]
    fn joins_base_and_path() {
        assert_eq!(join_path("/users", "/{id}"), "/users/{id}");
        assert_eq!(join_path("/users", ""), "/users");
        assert_eq!(join_path("", "/health"), "/health");
    }
}
