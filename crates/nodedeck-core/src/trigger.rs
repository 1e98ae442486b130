//! Tray trigger payloads and their trust-boundary validation.
//!
//! External triggers arrive as JSON (one payload per line when fed over a
//! stream). Free-form section/action strings are validated into closed enums
//! on receipt; unrecognized values are carried explicitly instead of being
//! passed deeper as raw text.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_TRIGGER_LINE_BYTES: usize = 16 * 1024;

/// Dashboard section a tray trigger targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraySection {
    Config,
    Controls,
    Logs,
    Delete,
    Unrecognized,
}

impl TraySection {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "config" => TraySection::Config,
            "controls" => TraySection::Controls,
            "logs" => TraySection::Logs,
            "delete" => TraySection::Delete,
            _ => TraySection::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TraySection::Config => "config",
            TraySection::Controls => "controls",
            TraySection::Logs => "logs",
            TraySection::Delete => "delete",
            TraySection::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for TraySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TraySection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TraySection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TraySectionVisitor;

        impl<'de> Visitor<'de> for TraySectionVisitor {
            type Value = TraySection;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a tray section as a string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TraySection::from_wire(value))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                self.visit_str(&value)
            }
        }

        deserializer.deserialize_str(TraySectionVisitor)
    }
}

/// Action verb carried by a tray trigger. `Show` is the reveal-only
/// sentinel: it selects a node without queueing a pending action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayVerb {
    Show,
    Edit,
    Start,
    Stop,
    Open,
    Delete,
    Unrecognized(String),
}

impl TrayVerb {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "show" => TrayVerb::Show,
            "edit" => TrayVerb::Edit,
            "start" => TrayVerb::Start,
            "stop" => TrayVerb::Stop,
            "open" => TrayVerb::Open,
            "delete" => TrayVerb::Delete,
            _ => TrayVerb::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrayVerb::Show => "show",
            TrayVerb::Edit => "edit",
            TrayVerb::Start => "start",
            TrayVerb::Stop => "stop",
            TrayVerb::Open => "open",
            TrayVerb::Delete => "delete",
            TrayVerb::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for TrayVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TrayVerb {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TrayVerb {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TrayVerbVisitor;

        impl<'de> Visitor<'de> for TrayVerbVisitor {
            type Value = TrayVerb;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a tray action verb as a string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TrayVerb::from_wire(value))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                self.visit_str(&value)
            }
        }

        deserializer.deserialize_str(TrayVerbVisitor)
    }
}

/// Wire shape of an external trigger: identifies a node, a dashboard
/// section, and the intended verb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    pub node_name: String,
    pub section: TraySection,
    pub action: TrayVerb,
}

/// A one-shot instruction awaiting consumption by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayAction {
    pub section: TraySection,
    pub verb: TrayVerb,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerFrameError {
    #[error("trigger line exceeds max size: {size} > {max}")]
    OversizedLine { size: usize, max: usize },
    #[error("trigger decode failed: {0}")]
    Decode(String),
}

/// Decode one NDJSON trigger line. Blank lines and trailing `\r` are the
/// caller's concern only insofar as this trims them before parsing.
pub fn parse_trigger_line(
    line: &str,
    max_line_bytes: usize,
) -> Result<TriggerPayload, TriggerFrameError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.len() > max_line_bytes {
        return Err(TriggerFrameError::OversizedLine {
            size: trimmed.len(),
            max: max_line_bytes,
        });
    }
    serde_json::from_str(trimmed).map_err(|err| TriggerFrameError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_decodes_camel_case_wire_fields() {
        let payload = parse_trigger_line(
            r#"{"nodeName": "alpha", "section": "controls", "action": "start"}"#,
            DEFAULT_MAX_TRIGGER_LINE_BYTES,
        )
        .expect("decode");
        assert_eq!(payload.node_name, "alpha");
        assert_eq!(payload.section, TraySection::Controls);
        assert_eq!(payload.action, TrayVerb::Start);
    }

    #[test]
    fn unknown_section_and_verb_become_unrecognized() {
        let payload = parse_trigger_line(
            r#"{"nodeName": "beta", "section": "metrics", "action": "explode"}"#,
            DEFAULT_MAX_TRIGGER_LINE_BYTES,
        )
        .expect("decode");
        assert_eq!(payload.section, TraySection::Unrecognized);
        assert_eq!(
            payload.action,
            TrayVerb::Unrecognized("explode".to_string())
        );
    }

    #[test]
    fn verb_parsing_is_case_insensitive() {
        assert_eq!(TrayVerb::from_wire("Show"), TrayVerb::Show);
        assert_eq!(TrayVerb::from_wire(" STOP "), TrayVerb::Stop);
    }

    #[test]
    fn oversized_line_is_rejected() {
        let line = format!(
            r#"{{"nodeName": "{}", "section": "logs", "action": "open"}}"#,
            "x".repeat(256)
        );
        let result = parse_trigger_line(&line, 64);
        assert!(matches!(
            result,
            Err(TriggerFrameError::OversizedLine { .. })
        ));
    }

    #[test]
    fn malformed_line_reports_decode_error() {
        let result = parse_trigger_line("{\"nodeName\":", DEFAULT_MAX_TRIGGER_LINE_BYTES);
        assert!(matches!(result, Err(TriggerFrameError::Decode(_))));
    }

    #[test]
    fn verb_serializes_back_to_its_wire_string() {
        let json = serde_json::to_string(&TrayVerb::Unrecognized("poke".to_string()))
            .expect("serialize");
        assert_eq!(json, "\"poke\"");
        let json = serde_json::to_string(&TrayVerb::Show).expect("serialize");
        assert_eq!(json, "\"show\"");
    }
}
