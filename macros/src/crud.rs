//! `#[crud(entity = Entity, repository_field = repo, base = "/path")]`:
//! synthesizes all ten [`trellis_core::crud::CrudOp`] operations, skipping
//! any operation whose method/path a hand-declared `#[get]`/`#[post]`/...
//! method on the same impl block already claims — `search` included, so an
//! application with a real free-text index can still hand-write its own.
//!
//! Behaves like [`crate::routes::expand`] for hand-declared methods (same
//! shim/registration shape, same verb-attribute stripping) and additionally
//! emits one shim per un-overridden [`CrudOp`](trellis_core::crud::CrudOp),
//! wired to `self.<repository_field>` via the base
//! [`Repository`](trellis_data::repository::Repository) trait.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Ident, ImplItem, ItemImpl, Token};

use trellis_core::crud::CrudOp;

use crate::crate_path::{trellis_core_path, trellis_data_path};
use crate::routes::{http_method_tokens, join_path, route_attr, self_ty_ident, ROUTE_ATTRS};

struct CrudArgs {
    entity: syn::Path,
    repository_field: Ident,
    base: String,
    batch_limit: usize,
}

impl Parse for CrudArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut entity = None;
        let mut repository_field = None;
        let mut base = None;
        let mut batch_limit = 100usize;

        let pairs = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated(input)?;
        for pair in pairs {
            if pair.path.is_ident("entity") {
                if let syn::Expr::Path(p) = &pair.value {
                    entity = Some(p.path.clone());
                }
            } else if pair.path.is_ident("repository_field") {
                if let syn::Expr::Path(p) = &pair.value {
                    repository_field = p.path.get_ident().cloned();
                }
            } else if pair.path.is_ident("base") {
                if let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(s), .. }) = &pair.value {
                    base = Some(s.value());
                }
            } else if pair.path.is_ident("batch_limit") {
                if let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Int(i), .. }) = &pair.value {
                    batch_limit = i.base10_parse()?;
                }
            }
        }

        Ok(CrudArgs {
            entity: entity.ok_or_else(|| input.error("#[crud(...)] requires `entity = EntityType`"))?,
            repository_field: repository_field
                .ok_or_else(|| input.error("#[crud(...)] requires `repository_field = field_name`"))?,
            base: base.ok_or_else(|| input.error("#[crud(...)] requires `base = \"/path\"`"))?,
            batch_limit,
        })
    }
}

pub fn expand(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(args as CrudArgs);
    let item_impl = syn::parse_macro_input!(input as ItemImpl);
    match generate(&args, &item_impl) {
        Ok(out) => out.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate(args: &CrudArgs, item_impl: &ItemImpl) -> syn::Result<TokenStream2> {
    let self_ty = &item_impl.self_ty;
    let self_ty_name = self_ty_ident(self_ty);
    let core_path = trellis_core_path();
    let data_path = trellis_data_path();
    let entity = &args.entity;
    let repo_field = &args.repository_field;
    let base = &args.base;
    let batch_limit = args.batch_limit;

    let mut cleaned_items: Vec<TokenStream2> = Vec::new();
    let mut shims: Vec<TokenStream2> = Vec::new();
    let mut registrations: Vec<TokenStream2> = Vec::new();
    let mut scanner_entries: Vec<TokenStream2> = Vec::new();
    let mut declared: Vec<(http::Method, String)> = Vec::new();

    for item in &item_impl.items {
        let ImplItem::Fn(method) = item else {
            cleaned_items.push(quote! { #item });
            continue;
        };

        let Some((verb, attr)) = route_attr(&method.attrs) else {
            cleaned_items.push(quote! { #method });
            continue;
        };

        let path_lit: syn::LitStr = attr
            .parse_args()
            .map_err(|_| syn::Error::new_spanned(&attr, format!("#[{verb}(...)] expects a single string literal path")))?;
        let full_path = join_path(base, &path_lit.value());
        let method_ident = &method.sig.ident;
        let shim_ident = format_ident!("__TrellisCrudHandler_{}_{}", self_ty_name, method_ident);
        let method_tokens = http_method_tokens(&core_path, verb);
        declared.push((http_method_from_verb(verb), full_path.clone()));

        registrations.push(quote! {
            (
                #method_tokens,
                #full_path.to_string(),
                std::sync::Arc::new(#shim_ident(controller.clone())) as std::sync::Arc<dyn #core_path::pipeline::Handler>,
            )
        });

        scanner_entries.push(quote! {
            #core_path::registry::RouteRegistration {
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

            #[#core_path::async_trait::async_trait]
            impl #core_path::pipeline::Handler for #shim_ident {
                async fn call(
                    &self,
                    ctx: #core_path::pipeline::RequestContext,
                ) -> Result<#core_path::http::Response<#core_path::bytes::Bytes>, #core_path::error::AppError> {
                    self.0.#method_ident(ctx).await
                }
            }
        });

        let mut stripped = method.clone();
        stripped.attrs.retain(|a| !ROUTE_ATTRS.iter().any(|n| a.path().is_ident(n)));
        cleaned_items.push(quote! { #stripped });
    }

    for op in CrudOp::all() {
        let (method, path) = op.method_and_path(base);
        if declared.iter().any(|(m, p)| *m == method && *p == path) {
            continue;
        }
        let op_name = format!("{op:?}");
        let shim_ident = format_ident!("__TrellisCrudGenerated_{}_{}", self_ty_name, op_name);
        let method_tokens = http_verb_tokens(&core_path, &method);

        registrations.push(quote! {
            (
                #method_tokens,
                #path.to_string(),
                std::sync::Arc::new(#shim_ident(controller.clone())) as std::sync::Arc<dyn #core_path::pipeline::Handler>,
            )
        });

        scanner_entries.push(quote! {
            #core_path::registry::RouteRegistration {
                method: #method_tokens,
                path: #path.to_string(),
                controller_type: std::any::TypeId::of::<#self_ty>(),
                controller_name: #self_ty_name,
                handler_name: #op_name,
            }
        });

        shims.push(generated_op_shim(&shim_ident, self_ty, repo_field, entity, op, batch_limit, &core_path, &data_path));
    }

    let attrs = &item_impl.attrs;
    let (impl_generics, _, where_clause) = item_impl.generics.split_for_impl();

    Ok(quote! {
        #(#shims)*

        #(#attrs)*
        impl #impl_generics #self_ty #where_clause {
            #(#cleaned_items)*

            pub fn __trellis_routes(
                controller: std::sync::Arc<Self>,
            ) -> Vec<(#core_path::http::Method, String, std::sync::Arc<dyn #core_path::pipeline::Handler>)> {
                vec![#(#registrations),*]
            }

            /// Scanner-table entries for this block, for
            /// `AppBuilder::with_route_registrations`.
            pub fn __trellis_route_registrations() -> Vec<#core_path::registry::RouteRegistration> {
                vec![#(#scanner_entries),*]
            }
        }
    })
}

fn http_method_from_verb(verb: &str) -> http::Method {
    match verb {
        "get" => http::Method::GET,
        "post" => http::Method::POST,
        "put" => http::Method::PUT,
        "delete" => http::Method::DELETE,
        "patch" => http::Method::PATCH,
        _ => unreachable!("route_attr only returns names from ROUTE_ATTRS"),
    }
}

fn http_verb_tokens(krate: &TokenStream2, method: &http::Method) -> TokenStream2 {
    match *method {
        http::Method::GET => quote! { #krate::http::Method::GET },
        http::Method::POST => quote! { #krate::http::Method::POST },
        http::Method::PUT => quote! { #krate::http::Method::PUT },
        http::Method::DELETE => quote! { #krate::http::Method::DELETE },
        _ => quote! { #krate::http::Method::PATCH },
    }
}

/// Every generated shim shares the same shape: parse inputs from `ctx`,
/// call the matching `Repository` method through `self.0.<repo_field>`,
/// and serialize the result.
#[allow(clippy::too_many_arguments)]
fn generated_op_shim(
    shim_ident: &Ident,
    self_ty: &syn::Type,
    repo_field: &Ident,
    entity: &syn::Path,
    op: CrudOp,
    batch_limit: usize,
    core_path: &TokenStream2,
    data_path: &TokenStream2,
) -> TokenStream2 {
    let body = match op {
        CrudOp::FindAll => quote! {
            let pageable = #data_path::Pageable {
                page: ctx.query.get("page").and_then(|v| v.parse().ok()).unwrap_or(0),
                size: ctx.query.get("size").and_then(|v| v.parse().ok()).unwrap_or(20),
                sort: ctx.query.get("sort").cloned(),
            };
            let page = #data_path::repository::Repository::find_all_paged(&self.0.#repo_field, &pageable).await?;
            Ok(#core_path::pipeline::success_response(
                #core_path::http::StatusCode::OK,
                serde_json::to_value(page).map_err(|e| #core_path::error::AppError::Internal(e.to_string()))?,
            ))
        },
        CrudOp::FindById => quote! {
            let id = __trellis_parse_id::<#entity>(&ctx)?;
            let found = #data_path::repository::Repository::find_by_id(&self.0.#repo_field, id).await?;
            match found {
                Some(entity) => Ok(#core_path::pipeline::success_response(
                    #core_path::http::StatusCode::OK,
                    serde_json::to_value(entity).map_err(|e| #core_path::error::AppError::Internal(e.to_string()))?,
                )),
                None => Err(#core_path::error::AppError::NotFound("no such entity".to_string())),
            }
        },
        CrudOp::Create => quote! {
            let entity: #entity = serde_json::from_slice(&ctx.body).map_err(|e| #core_path::error::AppError::BadRequest(e.to_string()))?;
            let saved = #data_path::repository::Repository::save(&self.0.#repo_field, entity).await?;
            Ok(#core_path::pipeline::success_response(
                #core_path::http::StatusCode::CREATED,
                serde_json::to_value(saved).map_err(|e| #core_path::error::AppError::Internal(e.to_string()))?,
            ))
        },
        CrudOp::Update => quote! {
            let id = __trellis_parse_id::<#entity>(&ctx)?;
            if #data_path::repository::Repository::find_by_id(&self.0.#repo_field, id.clone()).await?.is_none() {
                return Err(#core_path::error::AppError::NotFound("no such entity".to_string()));
            }
            let entity: #entity = serde_json::from_slice(&ctx.body).map_err(|e| #core_path::error::AppError::BadRequest(e.to_string()))?;
            let entity = #data_path::Entity::with_id(entity, id);
            let saved = #data_path::repository::Repository::save(&self.0.#repo_field, entity).await?;
            Ok(#core_path::pipeline::success_response(
                #core_path::http::StatusCode::OK,
                serde_json::to_value(saved).map_err(|e| #core_path::error::AppError::Internal(e.to_string()))?,
            ))
        },
        CrudOp::Delete => quote! {
            let id = __trellis_parse_id::<#entity>(&ctx)?;
            if #data_path::repository::Repository::find_by_id(&self.0.#repo_field, id.clone()).await?.is_none() {
                return Err(#core_path::error::AppError::NotFound("no such entity".to_string()));
            }
            #data_path::repository::Repository::delete(&self.0.#repo_field, id).await?;
            Ok(#core_path::pipeline::success_response(#core_path::http::StatusCode::OK, serde_json::Value::Null))
        },
        CrudOp::Search => quote! {
            let columns: &[&str] = <#entity as #data_path::Entity>::columns();
            let field_filters: Vec<(String, String)> = ctx.query.iter()
                .filter(|(k, _)| k.as_str() != "q" && columns.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let (filters, match_any) = if !field_filters.is_empty() {
                (field_filters, false)
            } else if let Some(q) = ctx.query.get("q") {
                (columns.iter().map(|c| (c.to_string(), q.clone())).collect(), true)
            } else {
                (Vec::new(), true)
            };
            let found = #data_path::repository::Repository::search(&self.0.#repo_field, &filters, match_any).await?;
            Ok(#core_path::pipeline::success_response(
                #core_path::http::StatusCode::OK,
                serde_json::to_value(found).map_err(|e| #core_path::error::AppError::Internal(e.to_string()))?,
            ))
        },
        CrudOp::Count => quote! {
            let count = #data_path::repository::Repository::count(&self.0.#repo_field).await?;
            Ok(#core_path::pipeline::success_response(#core_path::http::StatusCode::OK, serde_json::json!({ "count": count })))
        },
        CrudOp::Exists => quote! {
            let id = __trellis_parse_id::<#entity>(&ctx)?;
            let exists = #data_path::repository::Repository::exists_by_id(&self.0.#repo_field, id).await?;
            Ok(#core_path::pipeline::success_response(#core_path::http::StatusCode::OK, serde_json::json!({ "exists": exists })))
        },
        CrudOp::CreateBatch | CrudOp::UpdateBatch => quote! {
            let entities: Vec<#entity> = serde_json::from_slice(&ctx.body).map_err(|e| #core_path::error::AppError::BadRequest(e.to_string()))?;
            let plan = #core_path::crud::CrudPlan::new(#batch_limit);
            let result = #core_path::crud::execute_batch(entities, &plan, |entity| {
                #data_path::repository::Repository::save(&self.0.#repo_field, entity)
            }).await.map_err(|e| #core_path::error::AppError::BadRequest(e.to_string()))?;
            Ok(#core_path::pipeline::success_response(#core_path::http::StatusCode::OK, serde_json::json!({
                "succeeded": result.succeeded,
                "failed": result.failed.iter().map(|f| serde_json::json!({ "index": f.index, "message": f.message })).collect::<Vec<_>>(),
            })))
        },
        CrudOp::DeleteBatch => quote! {
            let ids: Vec<<#entity as #data_path::Entity>::Id> = serde_json::from_slice(&ctx.body).map_err(|e| #core_path::error::AppError::BadRequest(e.to_string()))?;
            let plan = #core_path::crud::CrudPlan::new(#batch_limit);
            let result = #core_path::crud::execute_batch(ids, &plan, |id| {
                #data_path::repository::Repository::delete(&self.0.#repo_field, id)
            }).await.map_err(|e| #core_path::error::AppError::BadRequest(e.to_string()))?;
            Ok(#core_path::pipeline::success_response(#core_path::http::StatusCode::OK, serde_json::json!({
                "succeeded": result.succeeded.len(),
                "failed": result.failed.iter().map(|f| serde_json::json!({ "index": f.index, "message": f.message })).collect::<Vec<_>>(),
            })))
        },
    };

    quote! {
        #[allow(non_camel_case_types)]
        struct #shim_ident(std::sync::Arc<#self_ty>);

        #[#core_path::async_trait::async_trait]
        impl #core_path::pipeline::Handler for #shim_ident {
            async fn call(
                &self,
                ctx: #core_path::pipeline::RequestContext,
            ) -> Result<#core_path::http::Response<#core_path::bytes::Bytes>, #core_path::error::AppError> {
                #[allow(dead_code)]
                fn __trellis_parse_id<E: #data_path::Entity>(
                    ctx: &#core_path::pipeline::RequestContext,
                ) -> Result<E::Id, #core_path::error::AppError>
                where
                    E::Id: std::str::FromStr,
                {
                    let raw = ctx.path_params.get("id").ok_or_else(|| #core_path::error::AppError::BadRequest("missing id path parameter".to_string()))?;
                    raw.parse::<E::Id>().map_err(|_| #core_path::error::AppError::BadRequest(format!("invalid id '{raw}'")))
                }

                #body
            }
        }
    }
}
