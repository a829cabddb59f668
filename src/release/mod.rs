//! Release Composer (C9).

pub mod composer;
pub mod model;
pub mod store;

pub use composer::{compose, ComposeError};
pub use model::ComposedRelease;
pub use store::{
    add_document_artifact, add_sbom_artifact, create_release, delete_release, get_or_create_latest_release,
    update_release, ReleaseError,
};
