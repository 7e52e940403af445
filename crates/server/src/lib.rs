//! HTTP server for the tfmirror provider network mirror.
//!
//! This crate provides the protocol surface:
//! - Mirror protocol adapter (index listing, version manifest, archive serving)
//! - Cache engine with single-flight installs and digest verification
//! - Recursive cache invalidation (DELETE surface)
//! - Upstream provider-registry client
//! - Metrics exposition

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod upstream;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use upstream::RegistryClient;
