//! Trellis — a reflection-free DI, routing, ORM-synthesis, and JWT-security
//! framework.
//!
//! This facade crate re-exports every Trellis sub-crate through a single
//! dependency. The proc macros in `trellis-macros` use `proc-macro-crate` to
//! detect whether an application depends on `trellis` (this facade) or the
//! individual crates directly, and generate the matching path either way.
//!
//! ```ignore
//! use trellis::prelude::*;
//! ```

pub extern crate trellis_core;
pub extern crate trellis_macros;

pub use trellis_core::*;

pub use trellis_data;
pub use trellis_data_sqlx;
pub use trellis_security;

// Flattened root-level re-exports so application code can `use trellis::X;`
// directly instead of reaching through a sub-crate path. `Entity` here is
// the trait from `trellis-data`; the derive macro of the same name lives in
// the macro namespace and is re-exported right below it — the two never
// collide since derives and traits occupy different namespaces.
pub use trellis_data::{entity::Entity, error::DataError, page::{Page, Pageable}, repository::Repository};
pub use trellis_data_sqlx::{SqlxEntity, SqlxRepository};
pub use trellis_security::{Claims, JwtSecurityPolicy, Jwt, SecurityConfig, SecurityError};
pub use trellis_macros::{component, crud, delete, get, patch, post, put, repository, routes, Bean, Entity};
pub use trellis_core::async_trait;

pub mod prelude {
    pub use trellis_core::builder::AppBuilder;
    pub use trellis_core::config::TrellisConfig;
    pub use trellis_core::crud::{CrudBinding, CrudOp, CrudPlan};
    pub use trellis_core::error::AppError;
    pub use trellis_core::pipeline::{Handler, RequestContext};
    pub use trellis_core::security::{Classification, Identity, SecurityPolicy, SecurityRules};

    pub use trellis_data::{Entity, Page, Pageable, Repository};
    pub use trellis_data_sqlx::{SqlxEntity, SqlxRepository};
    pub use trellis_security::{Claims, JwtSecurityPolicy, Jwt, SecurityConfig, SecurityError};

    pub use trellis_macros::{component, crud, delete, get, patch, post, put, repository, routes, Bean, Entity as DeriveEntity};

    pub use crate::async_trait::async_trait;
}
