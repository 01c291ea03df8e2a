//! DI container, router, request pipeline, config, and error types for
//! Trellis. This crate has no knowledge of JWTs or SQL; those live in
//! `trellis-security` and `trellis-data-sqlx` respectively, wired in by an
//! application through [`builder::AppBuilder`].

pub mod beans;
pub mod builder;
pub mod config;
pub mod crud;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod security;

pub use beans::{AsyncBean, Bean, BeanContainer, BeanContext, BeanError, BeanKey, BeanRegistry, BeanScope, PostInit, PreDestroy, Producer};
pub use builder::AppBuilder;
pub use config::{ConfigError, ConfigValue, FromConfigValue, SecretResolver, TrellisConfig};
pub use crud::{execute_batch, BatchError, BatchFailure, BatchResult, CrudBinding, CrudOp, CrudPlan};
pub use error::AppError;
pub use metrics::Metrics;
pub use pipeline::{success_response, Handler, Pipeline, RequestContext};
pub use registry::{EntityRegistration, RouteRegistration, StartupRegistry};
pub use router::{parse_query_string, Route, RouteTable};
pub use security::{Classification, Identity, SecurityPolicy, SecurityRules};

/// Re-exported so macro-generated code (`trellis-macros`) can refer to these
/// without requiring applications to add them as direct dependencies.
pub use async_trait;
pub use bytes;
pub use http;
