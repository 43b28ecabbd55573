//! Typed client for the Super-Kanban integration API.
//!
//! [`SuperKanbanApi`] is the seam the exporter, reconciler, and session
//! controller talk through; [`RestSuperKanbanClient`] is the production
//! implementation over `reqwest`.  Tests substitute in-memory fakes.

pub mod api;
pub mod auth;
pub mod rest;
pub mod types;
pub mod url;

pub use api::SuperKanbanApi;
pub use auth::{resolve_auth, AuthScope};
pub use rest::RestSuperKanbanClient;
pub use url::normalize_base_url;
