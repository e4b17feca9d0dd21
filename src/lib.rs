//! Declarative CRUD generation over in-memory persisted entities.
//!
//! Describe an entity once as an [`schema::EntitySchema`] of
//! [`schema::FieldSpec`]s, then mount [`routes::entity_router`] to get a full
//! REST surface: create, list (filtered, sorted, paginated), get, update,
//! three flavours of delete, and schema-faithful dummy-record generation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use crudgen::schema::{EntitySchema, FieldSpec};
//! use crudgen::store::ModelRegistry;
//! use crudgen::routes::{entity_router, RouteRule};
//!
//! let users = EntitySchema::new("users")
//!     .field("name", FieldSpec::string().required("name is required"))
//!     .field("email", FieldSpec::string().required("email is required").unique());
//!
//! let registry = Arc::new(ModelRegistry::new());
//! let app = axum::Router::new()
//!     .nest("/users", entity_router(&registry, users, RouteRule::defaults()));
//! ```

pub mod errors;
pub mod generate;
pub mod pipeline;
pub mod query;
pub mod response;
pub mod routes;
pub mod schema;
pub mod store;
pub mod validation;

pub use errors::ApiError;
pub use routes::{entity_router, OperationKind, RequestContext, RouteRule};
pub use schema::{EntitySchema, FieldKind, FieldSpec, SemanticHint};
pub use store::{ModelRegistry, PersistedEntity, SortSpec};
