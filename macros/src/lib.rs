extern crate proc_macro;
use proc_macro::TokenStream;

pub(crate) mod bean;
pub(crate) mod component;
pub(crate) mod crate_path;
pub(crate) mod crud;
pub(crate) mod entity;
pub(crate) mod repository;
pub(crate) mod routes;

/// Derive macro wiring a struct's `#[inject]`/`#[config("key")]` fields into
/// a [`Bean`](trellis_core::beans::Bean) impl.
#[proc_macro_derive(Bean, attributes(inject, config))]
pub fn derive_bean(input: TokenStream) -> TokenStream {
    bean::expand(input)
}

/// Attribute macro on an `impl Type { fn new(...) -> Self }` block, turning
/// the constructor into a [`Bean`](trellis_core::beans::Bean) or
/// [`AsyncBean`](trellis_core::beans::AsyncBean) impl.
#[proc_macro_attribute]
pub fn component(args: TokenStream, input: TokenStream) -> TokenStream {
    component::expand(args, input)
}

/// Attribute macro on an `impl Controller { ... }` block — expands
/// `#[get]`/`#[post]`/`#[put]`/`#[delete]`/`#[patch]`-annotated methods into
/// a `__trellis_routes` route table.
#[proc_macro_attribute]
pub fn routes(args: TokenStream, input: TokenStream) -> TokenStream {
    routes::expand(args, input)
}

// ---------------------------------------------------------------------------
// No-op route-verb attributes — consumed by #[routes] from the raw token
// stream it receives (attribute expansion is outside-in, so these never
// actually run on the final output). Declared here only so rust-analyzer
// and `cargo doc` don't reject them as unknown attributes.
// ---------------------------------------------------------------------------

/// Register a **GET** route. Consumed by [`routes`] — a no-op on its own.
#[proc_macro_attribute]
pub fn get(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Register a **POST** route. Consumed by [`routes`] — a no-op on its own.
#[proc_macro_attribute]
pub fn post(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Register a **PUT** route. Consumed by [`routes`] — a no-op on its own.
#[proc_macro_attribute]
pub fn put(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Register a **DELETE** route. Consumed by [`routes`] — a no-op on its own.
#[proc_macro_attribute]
pub fn delete(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Register a **PATCH** route. Consumed by [`routes`] — a no-op on its own.
#[proc_macro_attribute]
pub fn patch(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Derive macro mapping a struct's named fields onto
/// [`Entity`](trellis_data::Entity) and
/// [`SqlxEntity`](trellis_data_sqlx::SqlxEntity) impls.
#[proc_macro_derive(Entity, attributes(entity, id, deleted_at))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::expand(input)
}

/// Attribute macro on a hand-declared repository trait — synthesizes a
/// `sqlx`-backed implementation from each method's name.
#[proc_macro_attribute]
pub fn repository(args: TokenStream, input: TokenStream) -> TokenStream {
    repository::expand(args, input)
}

/// Attribute macro on an `impl Controller { ... }` block — like
/// [`routes`], but also synthesizes the generated CRUD operations for
/// whichever of [`CrudOp`](trellis_core::crud::CrudOp)'s ten operations the
/// block doesn't declare a hand-written route for.
#[proc_macro_attribute]
pub fn crud(args: TokenStream, input: TokenStream) -> TokenStream {
    crud::expand(args, input)
}
