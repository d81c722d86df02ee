use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

/// Server-pushed state change, as sent on the info endpoint.
///
/// The set is closed: a frame whose tag is not listed here fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InfoKind {
    /// Initial value before any frame arrived
    #[default]
    None,
    FixtureTypesUpdated,
    ProjectSaved,
    ProjectLoaded,
    SystemShutdown,
    UniversesUpdated,
    EndpointConfigChanged,
    EffectListChanged,
    /// Patch of a single universe changed
    UniversePatchChanged { universe_index: u16 },
}

/// Why a frame could not be turned into an [`InfoKind`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown event tag: {0}")]
    UnknownTag(String),

    #[error("unexpected frame shape: {0}")]
    UnexpectedShape(String),

    #[error("invalid payload for {tag}: {reason}")]
    InvalidPayload { tag: &'static str, reason: String },

    #[error("binary frames are not part of the protocol ({0} bytes)")]
    Binary(usize),
}

impl DecodeError {
    /// Short label used for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::Malformed(_) => "malformed",
            DecodeError::UnknownTag(_) => "unknown_tag",
            DecodeError::UnexpectedShape(_) => "unexpected_shape",
            DecodeError::InvalidPayload { .. } => "invalid_payload",
            DecodeError::Binary(_) => "binary",
        }
    }
}

const UNIVERSE_PATCH_CHANGED: &str = "UniversePatchChanged";

impl InfoKind {
    /// Every unit variant, in declaration order.
    pub const UNIT_VARIANTS: [InfoKind; 8] = [
        InfoKind::None,
        InfoKind::FixtureTypesUpdated,
        InfoKind::ProjectSaved,
        InfoKind::ProjectLoaded,
        InfoKind::SystemShutdown,
        InfoKind::UniversesUpdated,
        InfoKind::EndpointConfigChanged,
        InfoKind::EffectListChanged,
    ];

    /// Wire tag of this variant
    pub fn tag(&self) -> &'static str {
        match self {
            InfoKind::None => "None",
            InfoKind::FixtureTypesUpdated => "FixtureTypesUpdated",
            InfoKind::ProjectSaved => "ProjectSaved",
            InfoKind::ProjectLoaded => "ProjectLoaded",
            InfoKind::SystemShutdown => "SystemShutdown",
            InfoKind::UniversesUpdated => "UniversesUpdated",
            InfoKind::EndpointConfigChanged => "EndpointConfigChanged",
            InfoKind::EffectListChanged => "EffectListChanged",
            InfoKind::UniversePatchChanged { .. } => UNIVERSE_PATCH_CHANGED,
        }
    }

    /// Decode one text frame.
    ///
    /// Accepted shapes:
    /// - `"ProjectSaved"` or `{"ProjectSaved": null}` for unit variants
    /// - `{"UniversePatchChanged": 3}` or
    ///   `{"UniversePatchChanged": {"universe_index": 3}}`
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(frame)?;
        Self::from_value(value)
    }

    /// Decode an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(tag) => Self::unit_from_tag(&tag),
            Value::Object(map) => {
                if map.len() != 1 {
                    return Err(DecodeError::UnexpectedShape(format!(
                        "object with {} keys, expected exactly one tag",
                        map.len()
                    )));
                }
                let Some((tag, payload)) = map.into_iter().next() else {
                    return Err(DecodeError::UnexpectedShape("empty object".to_string()));
                };

                if tag == UNIVERSE_PATCH_CHANGED {
                    let universe_index = universe_index_from(payload)?;
                    return Ok(InfoKind::UniversePatchChanged { universe_index });
                }

                match payload {
                    Value::Null => Self::unit_from_tag(&tag),
                    other => {
                        // Only report the payload problem for tags we know
                        let kind = Self::unit_from_tag(&tag)?;
                        Err(DecodeError::InvalidPayload {
                            tag: kind.tag(),
                            reason: format!("unit variant carries payload {}", other),
                        })
                    }
                }
            }
            other => Err(DecodeError::UnexpectedShape(format!(
                "expected string or object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Encode in the server's canonical form.
    pub fn to_frame(&self) -> String {
        let value = match self {
            InfoKind::UniversePatchChanged { universe_index } => {
                serde_json::json!({ UNIVERSE_PATCH_CHANGED: universe_index })
            }
            unit => Value::String(unit.tag().to_string()),
        };
        value.to_string()
    }

    fn unit_from_tag(tag: &str) -> Result<Self, DecodeError> {
        if tag == UNIVERSE_PATCH_CHANGED {
            return Err(DecodeError::InvalidPayload {
                tag: UNIVERSE_PATCH_CHANGED,
                reason: "missing universe index".to_string(),
            });
        }
        Self::UNIT_VARIANTS
            .iter()
            .find(|kind| kind.tag() == tag)
            .copied()
            .ok_or_else(|| DecodeError::UnknownTag(tag.to_string()))
    }
}

fn universe_index_from(payload: Value) -> Result<u16, DecodeError> {
    let raw = match payload {
        Value::Object(mut fields) => fields.remove("universe_index").ok_or_else(|| {
            DecodeError::InvalidPayload {
                tag: UNIVERSE_PATCH_CHANGED,
                reason: "missing universe_index field".to_string(),
            }
        })?,
        other => other,
    };

    raw.as_u64()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| DecodeError::InvalidPayload {
            tag: UNIVERSE_PATCH_CHANGED,
            reason: format!("universe index must be an integer in 0..=65535, got {}", raw),
        })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for InfoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoKind::UniversePatchChanged { universe_index } => {
                write!(f, "{}({})", self.tag(), universe_index)
            }
            other => f.write_str(other.tag()),
        }
    }
}

impl FromStr for InfoKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_unit_variants_from_string() {
        assert_eq!(InfoKind::decode("\"ProjectSaved\"").unwrap(), InfoKind::ProjectSaved);
        assert_eq!(
            InfoKind::decode("\"UniversesUpdated\"").unwrap(),
            InfoKind::UniversesUpdated
        );
        assert_eq!(InfoKind::decode("\"None\"").unwrap(), InfoKind::None);
    }

    #[test]
    fn test_decode_unit_variant_object_form() {
        assert_eq!(
            InfoKind::decode(r#"{"EffectListChanged": null}"#).unwrap(),
            InfoKind::EffectListChanged
        );
    }

    #[test]
    fn test_decode_universe_patch_changed() {
        let newtype = InfoKind::decode(r#"{"UniversePatchChanged": 3}"#).unwrap();
        let named = InfoKind::decode(r#"{"UniversePatchChanged": {"universe_index": 3}}"#).unwrap();

        assert_eq!(newtype, InfoKind::UniversePatchChanged { universe_index: 3 });
        assert_eq!(named, newtype);
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let err = InfoKind::decode("\"LightsOn\"").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTag(ref t) if t == "LightsOn"));
        assert_eq!(err.reason(), "unknown_tag");

        let err = InfoKind::decode(r#"{"LightsOn": 1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTag(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            InfoKind::decode("ProjectSaved").unwrap_err(),
            DecodeError::Malformed(_)
        ));
        assert!(matches!(
            InfoKind::decode("[1, 2]").unwrap_err(),
            DecodeError::UnexpectedShape(_)
        ));
        assert!(matches!(
            InfoKind::decode(r#"{"ProjectSaved": null, "ProjectLoaded": null}"#).unwrap_err(),
            DecodeError::UnexpectedShape(_)
        ));
    }

    #[test]
    fn test_decode_rejects_bad_universe_payload() {
        for frame in [
            "\"UniversePatchChanged\"",
            r#"{"UniversePatchChanged": -1}"#,
            r#"{"UniversePatchChanged": 70000}"#,
            r#"{"UniversePatchChanged": "3"}"#,
            r#"{"UniversePatchChanged": {"index": 3}}"#,
        ] {
            let err = InfoKind::decode(frame).unwrap_err();
            assert!(
                matches!(err, DecodeError::InvalidPayload { .. }),
                "frame {} gave {:?}",
                frame,
                err
            );
        }
    }

    #[test]
    fn test_unit_variant_with_payload_is_rejected() {
        let err = InfoKind::decode(r#"{"ProjectSaved": 5}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload { tag: "ProjectSaved", .. }));
    }

    #[test]
    fn test_to_frame_matches_server_encoding() {
        assert_eq!(InfoKind::SystemShutdown.to_frame(), "\"SystemShutdown\"");
        assert_eq!(
            InfoKind::UniversePatchChanged { universe_index: 12 }.to_frame(),
            r#"{"UniversePatchChanged":12}"#
        );
    }

    #[test]
    fn test_every_unit_variant_decodes_its_own_frame() {
        for kind in InfoKind::UNIT_VARIANTS {
            assert_eq!(InfoKind::decode(&kind.to_frame()).unwrap(), kind);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(InfoKind::ProjectLoaded.to_string(), "ProjectLoaded");
        assert_eq!(
            InfoKind::UniversePatchChanged { universe_index: 4 }.to_string(),
            "UniversePatchChanged(4)"
        );
    }
}
