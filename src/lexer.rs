//! Pull-style JSON lexer.
//!
//! [`JsonReader`] turns JSON text into a flat sequence of [`JsonNode`]
//! events. Grammar checking and string unescaping are left to `serde_json`,
//! whose errors carry the line and column of the first offending character.
//! Numbers are handed out as their raw text so no precision is lost before the
//! caller knows the target type.
//!
//! Nodes are consumed through the [`NodeSource`] trait, which the reordering
//! reader implements as well, so value readers work on either.
//!
//! ```rust
//! use odata_json_light::lexer::{JsonNode, JsonReader, JsonScalar, NodeSource};
//!
//! let mut reader = JsonReader::from_str(r#"{"Id":42}"#);
//! assert_eq!(reader.read().unwrap(), JsonNode::StartObject);
//! assert_eq!(reader.read().unwrap(), JsonNode::Property("Id".into()));
//! assert_eq!(reader.read().unwrap(), JsonNode::Value(JsonScalar::Number("42".into())));
//! assert_eq!(reader.read().unwrap(), JsonNode::EndObject);
//! assert_eq!(reader.read().unwrap(), JsonNode::EndOfInput);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;

use crate::emitter;
use crate::{Error, Result};

/// A JSON scalar.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonScalar {
    Null,
    Bool(bool),
    /// Number in its original textual form.
    Number(String),
    String(String),
}

impl JsonScalar {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonScalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Parses a number (or a numeric string) as `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            JsonScalar::Number(n) | JsonScalar::String(n) => n.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for JsonScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonScalar::Null => f.write_str("null"),
            JsonScalar::Bool(b) => write!(f, "{}", b),
            JsonScalar::Number(n) => f.write_str(n),
            JsonScalar::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// One lexer event.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonNode {
    StartObject,
    Property(String),
    Value(JsonScalar),
    StartArray,
    EndArray,
    EndObject,
    EndOfInput,
}

impl JsonNode {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            JsonNode::StartObject => "StartObject",
            JsonNode::Property(_) => "Property",
            JsonNode::Value(_) => "PrimitiveValue",
            JsonNode::StartArray => "StartArray",
            JsonNode::EndArray => "EndArray",
            JsonNode::EndObject => "EndObject",
            JsonNode::EndOfInput => "EndOfInput",
        }
    }
}

impl fmt::Display for JsonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// A source of JSON nodes.
pub trait NodeSource {
    fn read(&mut self) -> Result<JsonNode>;

    fn peek(&mut self) -> Result<&JsonNode>;

    /// Consumes one complete value, including any nested structure.
    fn skip_value(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.read()? {
                JsonNode::StartObject | JsonNode::StartArray => depth += 1,
                JsonNode::EndObject | JsonNode::EndArray => depth = depth.saturating_sub(1),
                JsonNode::Property(_) => continue,
                JsonNode::Value(_) => {}
                JsonNode::EndOfInput => return Err(Error::unexpected_eof("a value")),
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    /// Consumes one complete value and returns its nodes.
    fn read_value_nodes(&mut self) -> Result<Vec<JsonNode>> {
        let mut nodes = Vec::new();
        let mut depth = 0usize;
        loop {
            let node = self.read()?;
            match node {
                JsonNode::StartObject | JsonNode::StartArray => depth += 1,
                JsonNode::EndObject | JsonNode::EndArray => depth = depth.saturating_sub(1),
                JsonNode::Property(_) => {
                    nodes.push(node);
                    continue;
                }
                JsonNode::Value(_) => {}
                JsonNode::EndOfInput => return Err(Error::unexpected_eof("a value")),
            }
            nodes.push(node);
            if depth == 0 {
                return Ok(nodes);
            }
        }
    }

    /// Consumes one complete value and returns it as compact JSON text.
    fn read_raw_value(&mut self) -> Result<String> {
        let nodes = self.read_value_nodes()?;
        emitter::render(&nodes)
    }
}

/// Members of one JSON object, in wire order and with duplicates kept.
struct Members<'a>(Vec<(String, &'a RawValue)>);

impl<'de> Deserialize<'de> for Members<'de> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = Members<'de>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(name) = map.next_key::<String>()? {
                    members.push((name, map.next_value()?));
                }
                Ok(Members(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}

/// Flattens already validated JSON text into nodes.
struct Flattener<'n> {
    nodes: &'n mut Vec<JsonNode>,
    depth: usize,
    max_depth: usize,
}

impl Flattener<'_> {
    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::MaxDepthExceeded(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn value(&mut self, raw: &RawValue) -> Result<()> {
        let text = raw.get();
        match text.as_bytes().first() {
            Some(b'{') => {
                self.enter()?;
                self.nodes.push(JsonNode::StartObject);
                let Members(members) = serde_json::from_str(text)?;
                for (name, value) in members {
                    self.nodes.push(JsonNode::Property(name));
                    self.value(value)?;
                }
                self.nodes.push(JsonNode::EndObject);
                self.depth -= 1;
            }
            Some(b'[') => {
                self.enter()?;
                self.nodes.push(JsonNode::StartArray);
                let items: Vec<&RawValue> = serde_json::from_str(text)?;
                for item in items {
                    self.value(item)?;
                }
                self.nodes.push(JsonNode::EndArray);
                self.depth -= 1;
            }
            Some(b'"') => {
                let s: String = serde_json::from_str(text)?;
                self.nodes.push(JsonNode::Value(JsonScalar::String(s)));
            }
            Some(b't') => self.nodes.push(JsonNode::Value(JsonScalar::Bool(true))),
            Some(b'f') => self.nodes.push(JsonNode::Value(JsonScalar::Bool(false))),
            Some(b'n') => self.nodes.push(JsonNode::Value(JsonScalar::Null)),
            _ => self.nodes.push(JsonNode::Value(JsonScalar::Number(text.to_string()))),
        }
        Ok(())
    }
}

/// The lexer over an owned input buffer.
///
/// Tokenizing is done by `serde_json` the first time a node is requested: the
/// top-level value is captured as a [`RawValue`], which validates it and keeps
/// number text untouched, and is then flattened into nodes. Trailing content
/// is checked after the value, so its error follows the value's nodes.
#[derive(Debug)]
pub struct JsonReader {
    input: String,
    nodes: VecDeque<JsonNode>,
    failure: Option<Error>,
    tokenized: bool,
    max_depth: usize,
}

impl JsonReader {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: &str) -> Self {
        Self::from_string(input.to_string())
    }

    pub fn from_string(input: String) -> Self {
        JsonReader {
            input,
            nodes: VecDeque::new(),
            failure: None,
            tokenized: false,
            max_depth: 100,
        }
    }

    /// Fills the input buffer from a blocking reader.
    pub fn from_reader<R: io::Read>(mut reader: R) -> Result<Self> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        Ok(Self::from_string(input))
    }

    /// Fills the input buffer from an async reader.
    #[cfg(feature = "tokio")]
    pub async fn from_async_reader<R>(mut reader: R) -> Result<Self>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncReadExt;

        let mut input = String::new();
        reader.read_to_string(&mut input).await?;
        Ok(Self::from_string(input))
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn tokenize(&mut self) {
        self.tokenized = true;
        let mut nodes = Vec::new();
        let outcome = flatten(&self.input, self.max_depth, &mut nodes);
        self.nodes = nodes.into();
        self.nodes.push_back(JsonNode::EndOfInput);
        if let Err(err) = outcome {
            // Nodes read before the failure stay readable; the error replaces EndOfInput.
            self.nodes.pop_back();
            self.failure = Some(err);
        }
    }

    fn fill(&mut self) -> Result<()> {
        if !self.tokenized {
            self.tokenize();
        }
        if self.nodes.is_empty() {
            match &self.failure {
                Some(err) => return Err(err.clone()),
                None => self.nodes.push_back(JsonNode::EndOfInput),
            }
        }
        Ok(())
    }
}

fn flatten(input: &str, max_depth: usize, nodes: &mut Vec<JsonNode>) -> Result<()> {
    let mut deserializer = serde_json::Deserializer::from_str(input);
    let raw = <&RawValue>::deserialize(&mut deserializer)?;
    Flattener {
        nodes,
        depth: 0,
        max_depth,
    }
    .value(raw)?;
    deserializer.end()?;
    Ok(())
}

impl NodeSource for JsonReader {
    fn read(&mut self) -> Result<JsonNode> {
        self.fill()?;
        match self.nodes.pop_front() {
            Some(node) => Ok(node),
            None => Err(Error::unexpected_eof("a node")),
        }
    }

    fn peek(&mut self) -> Result<&JsonNode> {
        self.fill()?;
        match self.nodes.front() {
            Some(node) => Ok(node),
            None => Err(Error::unexpected_eof("a node")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(json: &str) -> Result<Vec<JsonNode>> {
        let mut reader = JsonReader::from_str(json);
        let mut out = Vec::new();
        loop {
            let node = reader.read()?;
            if node == JsonNode::EndOfInput {
                return Ok(out);
            }
            out.push(node);
        }
    }

    #[test]
    fn test_numbers_keep_raw_text() {
        let all = nodes("[9007199254740993, -0.50, 1E+3]").unwrap();
        assert_eq!(
            all[1..4],
            [
                JsonNode::Value(JsonScalar::Number("9007199254740993".into())),
                JsonNode::Value(JsonScalar::Number("-0.50".into())),
                JsonNode::Value(JsonScalar::Number("1E+3".into())),
            ]
        );
    }

    #[test]
    fn test_surrogate_pair_escape() {
        let all = nodes(r#""\ud83d\ude00""#).unwrap();
        assert_eq!(all, vec![JsonNode::Value(JsonScalar::String("😀".into()))]);
    }

    #[test]
    fn test_syntax_error_position() {
        let err = nodes("{\n  \"a\" 1}").unwrap_err();
        match err {
            Error::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_rejects_trailing_comma_and_garbage() {
        assert!(nodes("[1,]").is_err());
        assert!(nodes("{} x").is_err());
        assert!(nodes("{\"a\":1,}").is_err());
        assert!(nodes("01").is_err());
    }

    #[test]
    fn test_trailing_content_fails_after_the_value() {
        let mut reader = JsonReader::from_str("{} x");
        assert_eq!(reader.read().unwrap(), JsonNode::StartObject);
        assert_eq!(reader.read().unwrap(), JsonNode::EndObject);
        assert_eq!(reader.read().unwrap_err().message_key(), "syntax");
    }

    #[test]
    fn test_duplicate_members_are_kept_in_order() {
        let all = nodes(r#"{"a":1,"b":2,"a":3}"#).unwrap();
        let names: Vec<_> = all
            .iter()
            .filter_map(|node| match node {
                JsonNode::Property(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["a", "b", "a"]);
    }

    #[test]
    fn test_empty_input_is_an_early_end() {
        let err = nodes("  ").unwrap_err();
        assert_eq!(err.message_key(), "unexpected_end_of_input");
    }

    #[test]
    fn test_skip_and_raw_value() {
        let mut reader = JsonReader::from_str(r#"[{"a":[1,{"b":null}]}, "next"]"#);
        reader.read().unwrap();
        assert_eq!(reader.read_raw_value().unwrap(), r#"{"a":[1,{"b":null}]}"#);
        reader.skip_value().unwrap();
        assert_eq!(reader.read().unwrap(), JsonNode::EndArray);
    }

    #[test]
    fn test_depth_limit() {
        let mut reader = JsonReader::from_str("[[[1]]]").with_max_depth(2);
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(reader.read().unwrap_err(), Error::MaxDepthExceeded(2));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut reader = JsonReader::from_str("true");
        assert_eq!(reader.peek().unwrap(), &JsonNode::Value(JsonScalar::Bool(true)));
        assert_eq!(reader.read().unwrap(), JsonNode::Value(JsonScalar::Bool(true)));
        assert_eq!(reader.read().unwrap(), JsonNode::EndOfInput);
    }
}
