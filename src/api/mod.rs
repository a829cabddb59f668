//! The HTTP surface named in §6: SBOM/document upload and download, the
//! visibility/public-flag endpoints, the access-request/NDA lifecycle,
//! the billing and identity webhooks, domain admission, and release
//! composition.
//!
//! [`state::AppState`] carries every collaborator a handler needs.
//! [`routes::build_router`] wires [`handlers`] behind [`middleware`].

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
