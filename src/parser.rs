//! Section Parser
//!
//! Asks the Parser role to split a paper into sections and validates the
//! structured reply. Models rarely answer with bare JSON, so the object is
//! dug out of code fences or surrounding prose first.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::{AgentRole, AnalysisAgent};
use crate::document::{Section, SectionSet};
use crate::error::PipelineResult;
use crate::recovery::RetryExecutor;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("valid code fence regex")
});

/// Parser reply could not be turned into a section set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Parser reply is not a JSON object: {0}")]
    Malformed(String),

    #[error("Unknown section '{0}'")]
    UnknownSection(String),

    #[error("Section {0} appears more than once")]
    DuplicateSection(Section),

    #[error("Section {section} has a {found} value, expected a string")]
    InvalidValue { section: Section, found: &'static str },

    #[error("Parser reply names no sections")]
    Empty,
}

/// Splits raw paper text into a [`SectionSet`]
#[derive(Debug, Clone)]
pub struct SectionParser {
    agent: AnalysisAgent,
    retry: RetryExecutor,
}

impl SectionParser {
    pub fn new(agent: AnalysisAgent, retry: RetryExecutor) -> Self {
        debug_assert_eq!(agent.role(), AgentRole::Parser);
        Self { agent, retry }
    }

    /// Parse `full_text` into named sections. Malformed replies are not retried.
    pub async fn parse(&self, full_text: &str) -> PipelineResult<SectionSet> {
        let prompt = build_parse_prompt(full_text);
        let reply = self
            .retry
            .execute(self.agent.role().name(), || self.agent.respond(&prompt))
            .await?;

        let sections = parse_sections(&reply)?;
        info!(
            sections = ?sections.keys().map(Section::as_str).collect::<Vec<_>>(),
            "Paper parsed"
        );
        Ok(sections)
    }
}

pub fn build_parse_prompt(full_text: &str) -> String {
    format!(
        "Parse this paper into sections (Introduction, Methodology, Results, Discussion):\n\n{}",
        full_text
    )
}

/// Validate a parser reply into a section set
pub fn parse_sections(reply: &str) -> Result<SectionSet, ParseError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| ParseError::Malformed("no JSON object found".to_string()))?;

    let Entries(entries) =
        serde_json::from_str(json).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let mut sections = SectionSet::new();
    for (key, value) in entries {
        let section: Section = key
            .parse()
            .map_err(|_| ParseError::UnknownSection(key.clone()))?;

        let text = match value {
            Value::String(text) => text,
            other => {
                return Err(ParseError::InvalidValue {
                    section,
                    found: kind(&other),
                })
            }
        };

        if sections.insert(section, text).is_some() {
            return Err(ParseError::DuplicateSection(section));
        }
    }

    if sections.is_empty() {
        return Err(ParseError::Empty);
    }

    debug!(count = sections.len(), "Parser reply validated");
    Ok(sections)
}

/// Object members in reply order, repeated keys included
struct Entries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Entries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Extract the outermost JSON object from text
///
/// Prefers the body of a Markdown code fence, then falls back to the first
/// balanced `{...}` span. Braces inside string literals are ignored.
fn extract_json_object(s: &str) -> Option<&str> {
    if let Some(body) = CODE_FENCE.captures(s).and_then(|c| c.get(1)) {
        if let Some(object) = balanced_object(body.as_str()) {
            return Some(object);
        }
    }
    balanced_object(s)
}

fn balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object() {
        let text = "Here are the sections: {\"Introduction\": \"x\"} hope that helps";
        assert_eq!(extract_json_object(text), Some("{\"Introduction\": \"x\"}"));
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let text = r#"{"Results": "set {a, b} where \"}\" is literal"} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"Results": "set {a, b} where \"}\" is literal"}"#)
        );
    }

    #[test]
    fn test_extract_prefers_code_fence() {
        let text = "Example {not json}\n```json\n{\"Discussion\": \"d\"}\n```";
        assert_eq!(extract_json_object(text), Some("{\"Discussion\": \"d\"}"));
    }

    #[test]
    fn test_parse_valid_reply() {
        let sections =
            parse_sections(r#"{"Introduction": "Intro text", "methodology": "Methods..."}"#).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[&Section::Introduction], "Intro text");
        assert_eq!(sections[&Section::Methodology], "Methods...");
    }

    #[test]
    fn test_malformed_reply() {
        assert!(matches!(
            parse_sections("I could not find any sections."),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_sections(r#"{"Introduction": "unterminated}"#),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_section() {
        assert_eq!(
            parse_sections(r#"{"Introduction": "a", "Conclusion": "b"}"#),
            Err(ParseError::UnknownSection("Conclusion".to_string()))
        );
    }

    #[test]
    fn test_duplicate_section() {
        assert_eq!(
            parse_sections(r#"{"Results": "a", "RESULTS": "b"}"#),
            Err(ParseError::DuplicateSection(Section::Results))
        );
        assert_eq!(
            parse_sections(r#"{"Results": "first", "Results": "second"}"#),
            Err(ParseError::DuplicateSection(Section::Results))
        );
    }

    #[test]
    fn test_non_object_reply_is_malformed() {
        assert!(matches!(parse_sections(r#"["Results"]"#), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_non_string_value() {
        assert_eq!(
            parse_sections(r#"{"Results": ["a", "b"]}"#),
            Err(ParseError::InvalidValue {
                section: Section::Results,
                found: "array"
            })
        );
    }

    #[test]
    fn test_empty_object() {
        assert_eq!(parse_sections("{}"), Err(ParseError::Empty));
    }

    #[test]
    fn test_prompt_format() {
        assert_eq!(
            build_parse_prompt("BODY"),
            "Parse this paper into sections (Introduction, Methodology, Results, Discussion):\n\nBODY"
        );
    }
}
