//! Parsing model output into JSON.
//!
//! Models answer with a JSON object, usually inside a ```` ```json ```` fence and
//! sometimes cut short. [`parse_partial_json`] closes whatever is still open so
//! a truncated object can be read while it is being generated.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

lazy_static! {
    static ref FENCED_JSON: Regex =
        Regex::new(r"(?s)```(?:json)?(.*?)(?:```|$)").expect("valid fence regex");
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("missing required key `{0}`")]
    MissingKey(String),
}

/// The content of the first fenced block, or the whole text when unfenced.
pub fn extract_json_block(text: &str) -> &str {
    match FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => text.trim(),
    }
}

/// Parses possibly truncated JSON by closing open strings, arrays and objects,
/// dropping trailing characters until something parses.
pub fn parse_partial_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    let mut chars: Vec<char> = Vec::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        let mut c = c;
        if in_string {
            if c == '"' && !escaped {
                in_string = false;
            } else if c == '\n' && !escaped {
                // Raw newlines are invalid inside JSON strings.
                chars.push('\\');
                c = 'n';
            } else if c == '\\' {
                escaped = !escaped;
            } else {
                escaped = false;
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    escaped = false;
                }
                '{' => closers.push('}'),
                '[' => closers.push(']'),
                '}' | ']' => {
                    if closers.last() == Some(&c) {
                        closers.pop();
                    } else {
                        return None;
                    }
                }
                _ => {}
            }
        }
        chars.push(c);
    }

    if in_string {
        if escaped {
            chars.pop();
        }
        chars.push('"');
    }

    let closing: String = closers.iter().rev().collect();

    while !chars.is_empty() {
        let candidate: String = chars.iter().collect::<String>() + &closing;
        if let Ok(value) = serde_json::from_str(&candidate) {
            return Some(value);
        }
        chars.pop();
    }

    None
}

/// Fence-aware partial parse used for streamed output.
pub fn parse_json_markdown(text: &str) -> Option<Value> {
    parse_partial_json(extract_json_block(text))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    String,
    Array,
    Object,
}

impl FieldType {
    fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    fn empty_value(&self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Array => Value::Array(Vec::new()),
            FieldType::Object => Value::Object(Map::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub field_type: FieldType,
    pub description: &'static str,
}

impl ResponseSchema {
    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::String,
            description,
        }
    }

    pub fn array(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Array,
            description,
        }
    }

    pub fn object(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Object,
            description,
        }
    }
}

/// Checks model output against a fixed set of required keys.
#[derive(Debug, Clone)]
pub struct StructuredOutputParser {
    schemas: Vec<ResponseSchema>,
}

impl StructuredOutputParser {
    pub fn new(schemas: Vec<ResponseSchema>) -> Self {
        Self { schemas }
    }

    pub fn format_instructions(&self) -> String {
        let fields: Vec<String> = self
            .schemas
            .iter()
            .map(|s| format!("\t\"{}\": {}  // {}", s.name, s.field_type.as_str(), s.description))
            .collect();

        format!(
            "The output should be a markdown code snippet formatted in the following schema, \
             including the leading and trailing \"```json\" and \"```\":\n\n```json\n{{\n{}\n}}\n```",
            fields.join("\n")
        )
    }

    pub fn parse(&self, text: &str) -> Result<Map<String, Value>, ParseError> {
        let block = extract_json_block(text);
        let value: Value =
            serde_json::from_str(block).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

        let object = match value {
            Value::Object(map) => map,
            _ => return Err(ParseError::NotAnObject),
        };

        for schema in &self.schemas {
            if !object.contains_key(schema.name) {
                return Err(ParseError::MissingKey(schema.name.to_string()));
            }
        }

        Ok(object)
    }

    /// Best-effort recovery: the candidate whose partial parse has the most
    /// required keys, earliest first on ties, with every missing required key
    /// set to an empty value.
    pub fn repair(&self, candidates: &[&str]) -> Map<String, Value> {
        // max_by_key keeps the last maximum, so walk the candidates backwards.
        let mut object = candidates
            .iter()
            .rev()
            .filter_map(|text| match parse_json_markdown(text) {
                Some(Value::Object(map)) => Some(map),
                _ => None,
            })
            .max_by_key(|map| self.schemas.iter().filter(|s| map.contains_key(s.name)).count())
            .unwrap_or_default();

        for schema in &self.schemas {
            object
                .entry(schema.name.to_string())
                .or_insert_with(|| schema.field_type.empty_value());
        }

        object
    }
}
