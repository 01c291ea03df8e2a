//! `#[component]`: turns a constructor (`fn new(...) -> Self` or
//! `async fn new(...) -> Self`) into a [`Bean`](trellis_core::beans::Bean) or
//! [`AsyncBean`](trellis_core::beans::AsyncBean) impl, so a service only has
//! to write the constructor it would have written anyway.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{FnArg, ImplItem, ItemImpl, ReturnType, Type};

use crate::crate_path::trellis_core_path;

pub fn expand(_args: TokenStream, input: TokenStream) -> TokenStream {
    let item_impl = syn::parse_macro_input!(input as ItemImpl);
    match generate(&item_impl) {
        Ok(bean_impl) => {
            let cleaned_impl = strip_config_attrs_from_constructor(&item_impl);
            quote! {
                #cleaned_impl
                #bean_impl
            }
            .into()
        }
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate(item_impl: &ItemImpl) -> syn::Result<TokenStream2> {
    let self_ty = &item_impl.self_ty;
    let (constructor, is_async) = find_constructor(item_impl)?;
    let fn_name = &constructor.sig.ident;
    let type_name_str = quote!(#self_ty).to_string();
    let krate = trellis_core_path();

    let mut dep_types: Vec<TokenStream2> = Vec::new();
    let mut build_stmts: Vec<TokenStream2> = Vec::new();
    let mut arg_forwards: Vec<TokenStream2> = Vec::new();
    let mut config_keys: Vec<String> = Vec::new();
    let mut needs_config = false;

    for (i, arg) in constructor.sig.inputs.iter().enumerate() {
        let FnArg::Typed(pat_type) = arg else {
            return Err(syn::Error::new_spanned(
                arg,
                "#[component] constructor must not take `self` — it is a static factory function",
            ));
        };
        let ty = &*pat_type.ty;
        let arg_name = syn::Ident::new(&format!("__arg_{i}"), proc_macro2::Span::call_site());
        arg_forwards.push(quote! { #arg_name });

        let config_attr = pat_type.attrs.iter().find(|a| a.path().is_ident("config"));
        if let Some(attr) = config_attr {
            let key: syn::LitStr = attr.parse_args()?;
            let key_str = key.value();
            config_keys.push(key_str.clone());
            needs_config = true;
            build_stmts.push(quote! {
                let #arg_name: #ty = __trellis_config.get(#key_str).map_err(|err| #krate::beans::BeanError::Construction {
                    bean: #type_name_str.to_string(),
                    message: format!("config key '{}': {}", #key_str, err),
                })?;
            });
        } else {
            let inner = arc_inner(ty).ok_or_else(|| {
                syn::Error::new_spanned(ty, "#[component] dependency parameters must be declared as `Arc<T>`")
            })?;
            dep_types.push(quote! { std::any::TypeId::of::<#inner>() });
            let inject_attr = pat_type.attrs.iter().find(|a| a.path().is_ident("inject"));
            let name_override = inject_attr.map(parse_inject_name).transpose()?.flatten();
            build_stmts.push(match name_override {
                Some(name) => quote! { let #arg_name: std::sync::Arc<#inner> = ctx.get_named::<#inner>(#name)?; },
                None => quote! { let #arg_name: std::sync::Arc<#inner> = ctx.get::<#inner>()?; },
            });
        }
    }

    if needs_config {
        dep_types.push(quote! { std::any::TypeId::of::<#krate::config::TrellisConfig>() });
    }

    let config_prelude = if needs_config {
        quote! { let __trellis_config = ctx.get::<#krate::config::TrellisConfig>()?; }
    } else {
        quote! {}
    };

    if is_async {
        Ok(quote! {
            #[#krate::async_trait::async_trait]
            impl #krate::beans::AsyncBean for #self_ty {
                fn dependencies() -> Vec<std::any::TypeId> {
                    vec![#(#dep_types),*]
                }

                fn config_keys() -> Vec<&'static str> {
                    vec![#(#config_keys),*]
                }

                async fn build(ctx: &#krate::beans::BeanContext) -> Result<Self, #krate::beans::BeanError> {
                    #config_prelude
                    #(#build_stmts)*
                    Self::#fn_name(#(#arg_forwards),*).await
                }
            }
        })
    } else {
        Ok(quote! {
            impl #krate::beans::Bean for #self_ty {
                fn dependencies() -> Vec<std::any::TypeId> {
                    vec![#(#dep_types),*]
                }

                fn config_keys() -> Vec<&'static str> {
                    vec![#(#config_keys),*]
                }

                fn build(ctx: &#krate::beans::BeanContext) -> Result<Self, #krate::beans::BeanError> {
                    #config_prelude
                    #(#build_stmts)*
                    Ok(Self::#fn_name(#(#arg_forwards),*))
                }
            }
        })
    }
}

/// `#[inject]` has no arguments; `#[inject(name = "...")]` requests a
/// by-name lookup instead of the default by-type one.
fn parse_inject_name(attr: &syn::Attribute) -> syn::Result<Option<String>> {
    if let syn::Meta::Path(_) = &attr.meta {
        return Ok(None);
    }
    let mut name = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            name = Some(value.value());
            Ok(())
        } else {
            Err(meta.error("unrecognized #[inject] argument, expected `name`"))
        }
    })?;
    Ok(name)
}

fn arc_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else { return None };
    let segment = path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else { return None };
    args.args.iter().find_map(|a| match a {
        syn::GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

/// First static method returning `Self` (or the impl type by name).
fn find_constructor(item_impl: &ItemImpl) -> syn::Result<(&syn::ImplItemFn, bool)> {
    for item in &item_impl.items {
        if let ImplItem::Fn(method) = item {
            if method.sig.inputs.iter().any(|arg| matches!(arg, FnArg::Receiver(_))) {
                continue;
            }
            if returns_self(&method.sig.output, &item_impl.self_ty) {
                return Ok((method, method.sig.asyncness.is_some()));
            }
        }
    }
    Err(syn::Error::new_spanned(
        &item_impl.self_ty,
        "#[component] requires a constructor — a static method returning Self:\n\
         \n  #[component]\n  impl MyService {\n      fn new(dep: Arc<OtherService>) -> Self { Self { dep } }\n  }",
    ))
}

fn returns_self(ret: &ReturnType, self_ty: &Type) -> bool {
    match ret {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Path(tp) if tp.path.is_ident("Self") => true,
            Type::Path(tp) => match self_ty {
                Type::Path(self_tp) => {
                    tp.path.segments.last().map(|s| &s.ident) == self_tp.path.segments.last().map(|s| &s.ident)
                }
                _ => false,
            },
            _ => false,
        },
    }
}

/// Re-emits the impl block with `#[config(...)]` stripped from constructor
/// params (they aren't real attributes any other tool would understand).
fn strip_config_attrs_from_constructor(item_impl: &ItemImpl) -> TokenStream2 {
    let mut items: Vec<TokenStream2> = Vec::new();

    for item in &item_impl.items {
        if let ImplItem::Fn(method) = item {
            let is_constructor = !method.sig.inputs.iter().any(|arg| matches!(arg, FnArg::Receiver(_)))
                && returns_self(&method.sig.output, &item_impl.self_ty);

            if is_constructor {
                let vis = &method.vis;
                let sig_ident = &method.sig.ident;
                let sig_asyncness = &method.sig.asyncness;
                let sig_output = &method.sig.output;
                let body = &method.block;
                let attrs = &method.attrs;

                let clean_params: Vec<TokenStream2> = method
                    .sig
                    .inputs
                    .iter()
                    .map(|arg| match arg {
                        FnArg::Receiver(r) => quote! { #r },
                        FnArg::Typed(pt) => {
                            let kept: Vec<_> = pt
                                .attrs
                                .iter()
                                .filter(|a| !a.path().is_ident("config") && !a.path().is_ident("inject"))
                                .collect();
                            let pat = &pt.pat;
                            let ty = &pt.ty;
                            quote! { #(#kept)* #pat: #ty }
                        }
                    })
                    .collect();

                items.push(quote! {
                    #(#attrs)*
                    #vis #sig_asyncness fn #sig_ident(#(#clean_params),*) #sig_output #body
                });
            } else {
                items.push(quote! { #method });
            }
        } else {
            items.push(quote! { #item });
        }
    }

    let self_ty = &item_impl.self_ty;
    let (impl_generics, _, where_clause) = item_impl.generics.split_for_impl();
    let attrs = &item_impl.attrs;

    quote! {
        #(#attrs)*
        impl #impl_generics #self_ty #where_clause {
            #(#items)*
        }
    }
}
