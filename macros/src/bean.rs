//! `#[derive(Bean)]`: wires a struct's `#[inject]` and `#[config("key")]`
//! fields into a [`Bean`](trellis_core::beans::Bean) impl without the
//! application writing `build`/`dependencies`/`config_keys` by hand.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, PathArguments, Type};

use crate::crate_path::trellis_core_path;

pub fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match generate(&input) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// `Arc<T>` -> `T`; anything else is rejected, since `#[inject]` fields are
/// resolved from the container, which only ever hands out `Arc<T>`.
fn arc_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else { return None };
    let segment = path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else { return None };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
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

fn generate(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "#[derive(Bean)] only works on structs with named fields:\n\
                     \n  #[derive(Bean)]\n  struct MyService {\n      #[inject] dep: Arc<OtherService>,\n  }",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "#[derive(Bean)] only works on structs")),
    };

    let krate = trellis_core_path();
    let mut dep_types: Vec<TokenStream2> = Vec::new();
    let mut field_inits: Vec<TokenStream2> = Vec::new();
    let mut config_keys: Vec<String> = Vec::new();
    let mut needs_config = false;

    for field in fields {
        let field_name = field.ident.as_ref().unwrap();
        let field_type = &field.ty;

        let inject_attr = field.attrs.iter().find(|a| a.path().is_ident("inject"));
        let config_attr = field.attrs.iter().find(|a| a.path().is_ident("config"));

        if let Some(attr) = inject_attr {
            let inner = arc_inner(field_type).ok_or_else(|| {
                syn::Error::new_spanned(field_type, "#[inject] fields must be declared as `Arc<T>`")
            })?;
            let name_override = parse_inject_name(attr)?;
            dep_types.push(quote! { std::any::TypeId::of::<#inner>() });
            field_inits.push(match name_override {
                Some(name) => quote! { #field_name: ctx.get_named::<#inner>(#name)? },
                None => quote! { #field_name: ctx.get::<#inner>()? },
            });
        } else if let Some(attr) = config_attr {
            let key: syn::LitStr = attr.parse_args()?;
            let key_str = key.value();
            config_keys.push(key_str.clone());
            needs_config = true;
            field_inits.push(quote! {
                #field_name: __trellis_config.get(#key_str).map_err(|err| #krate::beans::BeanError::Construction {
                    bean: #name_str.to_string(),
                    message: format!("config key '{}': {}", #key_str, err),
                })?
            });
        } else {
            field_inits.push(quote! { #field_name: Default::default() });
        }
    }

    let config_prelude = if needs_config {
        quote! { let __trellis_config = ctx.get::<#krate::config::TrellisConfig>()?; }
    } else {
        quote! {}
    };

    if needs_config {
        dep_types.push(quote! { std::any::TypeId::of::<#krate::config::TrellisConfig>() });
    }

    Ok(quote! {
        impl #krate::beans::Bean for #name {
            fn dependencies() -> Vec<std::any::TypeId> {
                vec![#(#dep_types),*]
            }

            fn config_keys() -> Vec<&'static str> {
                vec![#(#config_keys),*]
            }

            fn build(ctx: &#krate::beans::BeanContext) -> Result<Self, #krate::beans::BeanError> {
                #config_prelude
                Ok(Self {
                    #(#field_inits,)*
                })
            }
        }
    })
}
