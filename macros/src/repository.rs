//! `#[repository(entity = Entity, db = Dialect)]`: attaches a generated,
//! `sqlx`-backed implementation to a hand-declared repository trait.
//!
//! Every method name is parsed with [`trellis_data::query_parser::parse`]
//! *at macro-expansion time* — once, not once per request — and the
//! resulting [`QueryIntent`] is re-emitted as a literal value, so there is
//! no parsing cost left at runtime, only the query execution itself.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemTrait, Path, TraitItem, Type};

use trellis_data::query_parser::Operation as QueryOperation;
use trellis_data::query_parser::{self, Condition, ConditionOp, Connector, Direction, QueryIntent};

use crate::crate_path::{trellis_core_path, trellis_data_path, trellis_data_sqlx_path};

struct RepositoryArgs {
    entity: Path,
    db: Path,
}

impl syn::parse::Parse for RepositoryArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut entity = None;
        let mut db = None;
        let pairs = syn::punctuated::Punctuated::<syn::MetaNameValue, syn::Token![,]>::parse_terminated(input)?;
        for pair in pairs {
            if pair.path.is_ident("entity") {
                if let syn::Expr::Path(p) = &pair.value {
                    entity = Some(p.path.clone());
                }
            } else if pair.path.is_ident("db") {
                if let syn::Expr::Path(p) = &pair.value {
                    db = Some(p.path.clone());
                }
            }
        }
        Ok(RepositoryArgs {
            entity: entity.ok_or_else(|| input.error("#[repository(...)] requires `entity = EntityType`"))?,
            db: db.ok_or_else(|| input.error("#[repository(...)] requires `db = SqlxDialect`"))?,
        })
    }
}

pub fn expand(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as RepositoryArgs);
    let item_trait = parse_macro_input!(input as ItemTrait);
    match generate(&args, &item_trait) {
        Ok(out) => out.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Turns a Rust type's token string into the [`ConditionOp`]-appropriate
/// `QueryParam` constructor, for the common scalar and list shapes a query
/// method parameter takes.
fn scalar_param_expr(sqlx_path: &TokenStream2, arg_ident: &syn::Ident, ty: &Type) -> syn::Result<TokenStream2> {
    let ty_str: String = quote!(#ty).to_string().split_whitespace().collect();
    let expr = match ty_str.as_str() {
        "String" => quote! { #sqlx_path::QueryParam::Text(#arg_ident.clone()) },
        "i64" => quote! { #sqlx_path::QueryParam::Int(#arg_ident) },
        "i32" => quote! { #sqlx_path::QueryParam::Int(#arg_ident as i64) },
        "f64" => quote! { #sqlx_path::QueryParam::Float(#arg_ident) },
        "f32" => quote! { #sqlx_path::QueryParam::Float(#arg_ident as f64) },
        "bool" => quote! { #sqlx_path::QueryParam::Bool(#arg_ident) },
        "Vec<String>" => quote! { #sqlx_path::QueryParam::TextList(#arg_ident.clone()) },
        "Vec<i64>" => quote! { #sqlx_path::QueryParam::IntList(#arg_ident.clone()) },
        other => {
            return Err(syn::Error::new_spanned(
                ty,
                format!("unsupported query-method parameter type `{other}`; use String, i64, f64, bool, Vec<String>, or Vec<i64>"),
            ))
        }
    };
    Ok(expr)
}

/// Caller has already checked `params.len() == intent.param_count()`.
fn bind_params(intent: &QueryIntent, params: &[&syn::PatType], sqlx_path: &TokenStream2) -> syn::Result<TokenStream2> {
    let mut entries = Vec::new();
    let mut idx = 0usize;
    for cond in &intent.conditions {
        for _ in 0..cond.op.param_count() {
            let pat = params[idx];
            let syn::Pat::Ident(pat_ident) = pat.pat.as_ref() else {
                return Err(syn::Error::new_spanned(&pat.pat, "query-method parameters must be simple identifiers"));
            };
            entries.push(scalar_param_expr(sqlx_path, &pat_ident.ident, &pat.ty)?);
            idx += 1;
        }
    }
    Ok(quote! { vec![#(#entries),*] })
}

fn intent_literal(intent: &QueryIntent, data_path: &TokenStream2) -> TokenStream2 {
    let operation = match intent.operation {
        QueryOperation::Find => quote! { #data_path::QueryOperation::Find },
        QueryOperation::Count => quote! { #data_path::QueryOperation::Count },
        QueryOperation::Exists => quote! { #data_path::QueryOperation::Exists },
        QueryOperation::Delete => quote! { #data_path::QueryOperation::Delete },
    };

    let conditions: Vec<TokenStream2> = intent.conditions.iter().map(|c| condition_literal(c, data_path)).collect();

    let order_by: Vec<TokenStream2> = intent
        .order_by
        .iter()
        .map(|t| {
            let field = &t.field;
            let direction = match t.direction {
                Direction::Asc => quote! { #data_path::Direction::Asc },
                Direction::Desc => quote! { #data_path::Direction::Desc },
            };
            quote! { #data_path::OrderTerm { field: #field.to_string(), direction: #direction } }
        })
        .collect();

    quote! {
        #data_path::QueryIntent {
            operation: #operation,
            conditions: vec![#(#conditions),*],
            order_by: vec![#(#order_by),*],
        }
    }
}

fn condition_literal(cond: &Condition, data_path: &TokenStream2) -> TokenStream2 {
    let field = &cond.field;
    let connector = match cond.connector {
        None => quote! { None },
        Some(Connector::And) => quote! { Some(#data_path::Connector::And) },
        Some(Connector::Or) => quote! { Some(#data_path::Connector::Or) },
    };
    let op = condition_op_tokens(cond.op, data_path);
    quote! { #data_path::Condition { connector: #connector, field: #field.to_string(), op: #op } }
}

fn condition_op_tokens(op: ConditionOp, data_path: &TokenStream2) -> TokenStream2 {
    let name = match op {
        ConditionOp::Equals => quote!(Equals),
        ConditionOp::GreaterThan => quote!(GreaterThan),
        ConditionOp::GreaterThanEqual => quote!(GreaterThanEqual),
        ConditionOp::LessThan => quote!(LessThan),
        ConditionOp::LessThanEqual => quote!(LessThanEqual),
        ConditionOp::Between => quote!(Between),
        ConditionOp::Like => quote!(Like),
        ConditionOp::Containing => quote!(Containing),
        ConditionOp::StartingWith => quote!(StartingWith),
        ConditionOp::EndingWith => quote!(EndingWith),
        ConditionOp::IsNull => quote!(IsNull),
        ConditionOp::IsNotNull => quote!(IsNotNull),
        ConditionOp::In => quote!(In),
        ConditionOp::NotIn => quote!(NotIn),
        ConditionOp::Not => quote!(Not),
        ConditionOp::True => quote!(True),
        ConditionOp::False => quote!(False),
    };
    quote! { #data_path::ConditionOp::#name }
}

/// `Result<Vec<T>, _>` or `Result<Option<T>, _>` are the only two shapes a
/// `findBy...` method may return.
enum FindShape {
    Vec,
    Option,
}

fn find_shape(sig: &syn::Signature) -> syn::Result<FindShape> {
    let syn::ReturnType::Type(_, ty) = &sig.output else {
        return Err(syn::Error::new_spanned(sig, "query methods must return Result<_, DataError>"));
    };
    let Type::Path(path) = ty.as_ref() else {
        return Err(syn::Error::new_spanned(ty, "expected Result<_, DataError>"));
    };
    let last = path.path.segments.last().unwrap();
    if last.ident != "Result" {
        return Err(syn::Error::new_spanned(ty, "expected Result<_, DataError>"));
    }
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return Err(syn::Error::new_spanned(ty, "expected Result<_, DataError>"));
    };
    let Some(syn::GenericArgument::Type(ok_ty)) = args.args.first() else {
        return Err(syn::Error::new_spanned(ty, "expected Result<_, DataError>"));
    };
    let Type::Path(ok_path) = ok_ty else {
        return Err(syn::Error::new_spanned(ok_ty, "findBy... must return Result<Vec<T>, _> or Result<Option<T>, _>"));
    };
    match ok_path.path.segments.last().map(|s| s.ident.to_string()).as_deref() {
        Some("Vec") => Ok(FindShape::Vec),
        Some("Option") => Ok(FindShape::Option),
        _ => Err(syn::Error::new_spanned(
            ok_ty,
            "findBy... must return Result<Vec<T>, _> or Result<Option<T>, _>",
        )),
    }
}

fn generate(args: &RepositoryArgs, item_trait: &ItemTrait) -> syn::Result<TokenStream2> {
    let trait_ident = &item_trait.ident;
    let entity = &args.entity;
    let db = &args.db;
    let data_path = trellis_data_path();
    let sqlx_path = trellis_data_sqlx_path();
    let core_path = trellis_core_path();
    let impl_ident = syn::Ident::new(&format!("{trait_ident}Impl"), trait_ident.span());

    let mut method_impls: Vec<TokenStream2> = Vec::new();

    for item in &item_trait.items {
        let TraitItem::Fn(method) = item else { continue };
        let sig = &method.sig;
        let method_ident = &sig.ident;
        let method_name = method_ident.to_string();
        let inputs = &sig.inputs;
        let output = &sig.output;

        let intent = query_parser::parse(&method_name, &[])
            .map_err(|err| syn::Error::new_spanned(method_ident, format!("could not parse query method name: {err}")))?;

        let params: Vec<&syn::PatType> = inputs
            .iter()
            .filter_map(|arg| match arg {
                FnArg::Typed(pat) => Some(pat),
                FnArg::Receiver(_) => None,
            })
            .collect();

        if params.len() != intent.param_count() {
            return Err(syn::Error::new_spanned(
                method_ident,
                format!(
                    "'{method_name}' parses to {} bound parameter(s) but the method declares {}",
                    intent.param_count(),
                    params.len()
                ),
            ));
        }

        let intent_tokens = intent_literal(&intent, &data_path);
        let params_tokens = bind_params(&intent, &params, &sqlx_path)?;

        let call = match intent.operation {
            QueryOperation::Find => match find_shape(sig)? {
                FindShape::Vec => quote! { self.inner.find_by_intent(&__intent, __params).await },
                FindShape::Option => {
                    quote! { self.inner.find_by_intent(&__intent, __params).await.map(|mut rows| rows.pop()) }
                }
            },
            QueryOperation::Count => quote! { self.inner.count_by_intent(&__intent, __params).await },
            QueryOperation::Exists => {
                quote! { self.inner.count_by_intent(&__intent, __params).await.map(|count| count > 0) }
            }
            QueryOperation::Delete => quote! { self.inner.delete_by_intent(&__intent, __params).await },
        };

        method_impls.push(quote! {
            async fn #method_ident(#inputs) #output {
                let __intent: #data_path::QueryIntent = #intent_tokens;
                let __params: Vec<#sqlx_path::QueryParam> = #params_tokens;
                #call
            }
        });
    }

    Ok(quote! {
        #[#core_path::async_trait::async_trait]
        #item_trait

        pub struct #impl_ident {
            inner: #sqlx_path::SqlxRepository<#entity, #db>,
        }

        impl #impl_ident {
            pub fn new(pool: sqlx::Pool<#db>) -> Self {
                #impl_ident { inner: #sqlx_path::SqlxRepository::new(pool) }
            }

            pub fn inner(&self) -> &#sqlx_path::SqlxRepository<#entity, #db> {
                &self.inner
            }
        }

        #[#core_path::async_trait::async_trait]
        impl #trait_ident for #impl_ident {
            #(#method_impls)*
        }

        // Forwards the base `Repository` surface to `inner` so a type built
        // by this macro is a drop-in `Repository<Entity, Entity::Id>` for
        // `#[crud]` or any other code that only knows the base trait,
        // without that caller having to reach through `.inner()` itself.
        #[#core_path::async_trait::async_trait]
        impl #data_path::repository::Repository<#entity, <#entity as #data_path::Entity>::Id> for #impl_ident {
            async fn find_by_id(&self, id: <#entity as #data_path::Entity>::Id) -> Result<Option<#entity>, #data_path::DataError> {
                #data_path::repository::Repository::find_by_id(&self.inner, id).await
            }

            async fn find_all(&self) -> Result<Vec<#entity>, #data_path::DataError> {
                #data_path::repository::Repository::find_all(&self.inner).await
            }

            async fn find_all_paged(&self, pageable: &#data_path::page::Pageable) -> Result<#data_path::page::Page<#entity>, #data_path::DataError> {
                #data_path::repository::Repository::find_all_paged(&self.inner, pageable).await
            }

            async fn find_all_by_id(&self, ids: &[<#entity as #data_path::Entity>::Id]) -> Result<Vec<#entity>, #data_path::DataError> {
                #data_path::repository::Repository::find_all_by_id(&self.inner, ids).await
            }

            async fn save(&self, entity: #entity) -> Result<#entity, #data_path::DataError> {
                #data_path::repository::Repository::save(&self.inner, entity).await
            }

            async fn save_all(&self, entities: Vec<#entity>) -> Result<Vec<#entity>, #data_path::DataError> {
                #data_path::repository::Repository::save_all(&self.inner, entities).await
            }

            async fn delete(&self, id: <#entity as #data_path::Entity>::Id) -> Result<(), #data_path::DataError> {
                #data_path::repository::Repository::delete(&self.inner, id).await
            }

            async fn delete_all_by_id(&self, ids: &[<#entity as #data_path::Entity>::Id]) -> Result<(), #data_path::DataError> {
                #data_path::repository::Repository::delete_all_by_id(&self.inner, ids).await
            }

            async fn delete_all_in_batch(&self) -> Result<u64, #data_path::DataError> {
                #data_path::repository::Repository::delete_all_in_batch(&self.inner).await
            }

            async fn count(&self) -> Result<u64, #data_path::DataError> {
                #data_path::repository::Repository::count(&self.inner).await
            }

            async fn search(&self, filters: &[(String, String)], match_any: bool) -> Result<Vec<#entity>, #data_path::DataError> {
                #data_path::repository::Repository::search(&self.inner, filters, match_any).await
            }
        }
    })
}
