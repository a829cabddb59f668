//! Artifact Metadata Store (C8): Products, Projects, Components, SBOMs, and
//! Documents, plus the content-addressed object store backing uploads.

pub mod model;
pub mod object_store;
pub mod sbom;
pub mod store;

pub use model::{Component, ComponentType, Document, Product, Project, Release, ReleaseArtifact, Sbom, SbomFormat, Visibility};
pub use object_store::{content_addressed_key, FilesystemObjectStore, ObjectStore, ObjectStoreError};
pub use sbom::{detect, merge_metadata, Detected, MergeMode, SbomParseError};
pub use store::ArtifactError;
