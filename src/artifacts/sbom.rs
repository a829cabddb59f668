//! SBOM format/version detection and metadata merge (§4.5).

use serde_json::Value;
use thiserror::Error;

use super::model::SbomFormat;

const SUPPORTED_CYCLONEDX: &[&str] = &["1.3", "1.4", "1.5", "1.6", "1.7"];
const SUPPORTED_SPDX: &[&str] = &["SPDX-2.2", "SPDX-2.3", "SPDX-3.0"];

#[derive(Debug, Error)]
pub enum SbomParseError {
    #[error("payload is not valid JSON")]
    InvalidJson,
    #[error("could not identify a format from the payload")]
    InvalidFormat,
    #[error("unsupported {format} version: {version}")]
    UnsupportedVersion { format: &'static str, version: String },
}

#[derive(Debug)]
pub struct Detected {
    pub format: SbomFormat,
    pub format_version: String,
}

/// Detects format and version from the payload's own `specVersion` (for
/// CycloneDX) or `spdxVersion` (for SPDX) field.
pub fn detect(bytes: &[u8]) -> Result<Detected, SbomParseError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|_| SbomParseError::InvalidJson)?;

    if let Some(version) = value.get("specVersion").and_then(Value::as_str) {
        return if SUPPORTED_CYCLONEDX.contains(&version) {
            Ok(Detected {
                format: SbomFormat::Cyclonedx,
                format_version: version.to_string(),
            })
        } else {
            Err(SbomParseError::UnsupportedVersion {
                format: "CycloneDX",
                version: version.to_string(),
            })
        };
    }

    if let Some(version) = value.get("spdxVersion").and_then(Value::as_str) {
        return if SUPPORTED_SPDX.contains(&version) {
            Ok(Detected {
                format: SbomFormat::Spdx,
                format_version: version.to_string(),
            })
        } else {
            Err(SbomParseError::UnsupportedVersion {
                format: "SPDX",
                version: version.to_string(),
            })
        };
    }

    Err(SbomParseError::InvalidFormat)
}

/// Merge mode for component metadata vs SBOM-supplied metadata on read
/// (§4.5). Elementwise for `authors`/`licenses`/`supplier`/`manufacturer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    SbomWins,
    ComponentWins,
}

const ELEMENTWISE_FIELDS: &[&str] = &["authors", "licenses", "supplier", "manufacturer"];

/// Merges two metadata objects. Empty fields in the winner yield to the
/// loser; listed fields merge elementwise rather than wholesale replacing.
pub fn merge_metadata(component: &Value, sbom: &Value, mode: MergeMode) -> Value {
    let (winner, loser) = match mode {
        MergeMode::SbomWins => (sbom, component),
        MergeMode::ComponentWins => (component, sbom),
    };

    let mut merged = winner.as_object().cloned().unwrap_or_default();
    let loser_obj = loser.as_object();

    for (key, loser_value) in loser_obj.into_iter().flatten() {
        let winner_value = merged.get(key);
        let winner_is_empty = match winner_value {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            _ => false,
        };

        if ELEMENTWISE_FIELDS.contains(&key.as_str()) {
            let mut combined = winner_value.and_then(Value::as_array).cloned().unwrap_or_default();
            if let Some(loser_array) = loser_value.as_array() {
                for item in loser_array {
                    if !combined.contains(item) {
                        combined.push(item.clone());
                    }
                }
            }
            if !combined.is_empty() {
                merged.insert(key.clone(), Value::Array(combined));
            }
        } else if winner_is_empty {
            merged.insert(key.clone(), loser_value.clone());
        }
    }

    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_supported_cyclonedx_version() {
        let detected = detect(br#"{"specVersion":"1.5"}"#).unwrap();
        assert_eq!(detected.format, SbomFormat::Cyclonedx);
        assert_eq!(detected.format_version, "1.5");
    }

    #[test]
    fn rejects_unsupported_cyclonedx_version() {
        let err = detect(br#"{"specVersion":"0.9"}"#).unwrap_err();
        assert!(matches!(err, SbomParseError::UnsupportedVersion { .. }));
    }

    #[test]
    fn detects_spdx() {
        let detected = detect(br#"{"spdxVersion":"SPDX-2.3"}"#).unwrap();
        assert_eq!(detected.format, SbomFormat::Spdx);
    }

    #[test]
    fn rejects_payload_with_neither_field() {
        assert!(matches!(detect(br#"{"foo":"bar"}"#), Err(SbomParseError::InvalidFormat)));
    }

    #[test]
    fn sbom_wins_merge_fills_empty_fields_from_component() {
        let component = json!({ "description": "from component", "authors": ["Alice"] });
        let sbom = json!({ "description": "", "authors": ["Bob"] });
        let merged = merge_metadata(&component, &sbom, MergeMode::SbomWins);
        assert_eq!(merged["description"], "from component");
        let authors = merged["authors"].as_array().unwrap();
        assert!(authors.iter().any(|a| a == "Alice"));
        assert!(authors.iter().any(|a| a == "Bob"));
    }

    #[test]
    fn component_wins_merge_prefers_component_values() {
        let component = json!({ "description": "from component" });
        let sbom = json!({ "description": "from sbom" });
        let merged = merge_metadata(&component, &sbom, MergeMode::ComponentWins);
        assert_eq!(merged["description"], "from component");
    }
}
