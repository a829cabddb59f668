//! Aggregate document shapes produced by the release composer.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Sbom,
    Document,
}

impl LeafKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sbom => "sbom",
            Self::Document => "document",
        }
    }
}

/// A single SBOM or Document reachable from a release via `release_artifacts`,
/// joined with its owning component for permission evaluation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeafRow {
    pub leaf_id: Uuid,
    pub kind: String,
    pub component_id: Uuid,
    pub component_name: String,
    pub component_visibility: crate::artifacts::Visibility,
    pub component_is_global: bool,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ExternalReference {
    pub url: String,
    #[serde(rename = "type")]
    pub ref_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ComposedComponent {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "externalReferences")]
    pub external_references: Vec<ExternalReference>,
}

#[derive(Debug, Serialize)]
pub struct ComposedMetadata {
    pub release_name: String,
    pub release_slug: String,
}

/// A CycloneDX-shaped aggregate document (§4.6): every reachable leaf the
/// caller may read, as an external reference to a plain or signed download
/// URL depending on whether the leaf is effectively public.
#[derive(Debug, Serialize)]
pub struct ComposedRelease {
    #[serde(rename = "bomFormat")]
    pub bom_format: &'static str,
    #[serde(rename = "specVersion")]
    pub spec_version: &'static str,
    pub serial_number: String,
    pub version: i32,
    pub metadata: ComposedMetadata,
    pub components: Vec<ComposedComponent>,
}
