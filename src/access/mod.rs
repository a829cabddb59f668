//! Access-Request & NDA Store (C6) and Access-Control Resolver (C7).

pub mod model;
pub mod request;
pub mod resolver;

pub use model::{AccessRequest, AccessRequestStatus, NdaSignature};
pub use request::{AccessRequestError, PendingCountCache};
pub use resolver::{evaluate, ArtifactContext, Decision, DenyReason, ItemKind};
