//! `#[derive(Entity)]`: maps a struct's named fields onto
//! [`Entity`](trellis_data::Entity) and
//! [`SqlxEntity`](trellis_data_sqlx::SqlxEntity) impls. The table name comes
//! from `#[entity(table = "...")]`; the primary key is whichever field is
//! marked `#[id]`, falling back to a field literally named `id`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

use crate::crate_path::{trellis_data_path, trellis_data_sqlx_path};

pub fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match generate(&input) {
        Ok(out) => out.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => return Err(syn::Error::new_spanned(name, "#[derive(Entity)] requires named fields")),
        },
        _ => return Err(syn::Error::new_spanned(name, "#[derive(Entity)] only works on structs")),
    };

    let entity_attr = input
        .attrs
        .iter()
        .find(|a| a.path().is_ident("entity"))
        .ok_or_else(|| syn::Error::new_spanned(name, "#[derive(Entity)] requires #[entity(table = \"...\")]"))?;

    let mut table_name: Option<String> = None;
    entity_attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table") {
            let value = meta.value()?;
            let lit: syn::LitStr = value.parse()?;
            table_name = Some(lit.value());
        }
        Ok(())
    })?;
    let table_name = table_name
        .ok_or_else(|| syn::Error::new_spanned(entity_attr, "#[entity(...)] requires a `table = \"...\"` key"))?;

    let id_field = fields
        .iter()
        .find(|f| f.attrs.iter().any(|a| a.path().is_ident("id")))
        .or_else(|| fields.iter().find(|f| f.ident.as_ref().map(|i| i == "id").unwrap_or(false)))
        .ok_or_else(|| syn::Error::new_spanned(name, "no field marked #[id] and no field named `id`"))?;
    let id_field_name = id_field.ident.as_ref().unwrap();
    let id_field_ty = &id_field.ty;

    let deleted_at_field = fields.iter().find(|f| f.attrs.iter().any(|a| a.path().is_ident("deleted_at")));
    let deleted_at_tokens = match deleted_at_field {
        Some(field) => {
            let col = field.ident.as_ref().unwrap().to_string();
            quote! { fn deleted_at_column() -> Option<&'static str> { Some(#col) } }
        }
        None => quote! {},
    };

    let column_names: Vec<String> = fields.iter().map(|f| f.ident.as_ref().unwrap().to_string()).collect();

    let data_path = trellis_data_path();
    let sqlx_path = trellis_data_sqlx_path();

    let column_value_entries: Vec<TokenStream2> = fields
        .iter()
        .filter(|f| f.ident.as_ref() != Some(id_field_name))
        .map(|f| {
            let fname = f.ident.as_ref().unwrap();
            let col = fname.to_string();
            quote! { (#col, #sqlx_path::IntoQueryParam::into_query_param(self.#fname.clone())) }
        })
        .collect();

    Ok(quote! {
        impl #data_path::Entity for #name {
            type Id = #id_field_ty;

            fn table_name() -> &'static str {
                #table_name
            }

            fn id_column() -> &'static str {
                stringify!(#id_field_name)
            }

            fn columns() -> &'static [&'static str] {
                &[#(#column_names),*]
            }

            #deleted_at_tokens

            fn id(&self) -> Self::Id {
                self.#id_field_name.clone()
            }

            fn with_id(mut self, id: Self::Id) -> Self {
                self.#id_field_name = id;
                self
            }
        }

        impl #sqlx_path::SqlxEntity for #name {
            fn column_values(&self) -> Vec<(&'static str, #sqlx_path::QueryParam)> {
                vec![#(#column_value_entries),*]
            }
        }
    })
}
