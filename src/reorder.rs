//! Metadata-reordering node reader.
//!
//! JSON object members are unordered, yet a resource cannot be materialized
//! before its type is known, and a pull reader should report the id and etag
//! together with the resource start. [`ReorderingReader`] wraps the lexer and,
//! for objects flagged as top-level resource scopes, buffers every immediate
//! member (with its complete value) and replays them with `@odata.type`,
//! `@odata.id` and `@odata.etag` first, everything else in original order.
//!
//! Objects not flagged pass through untouched. Buffering is bounded by one
//! object.
//!
//! ```rust
//! use odata_json_light::lexer::{JsonNode, JsonReader, NodeSource};
//! use odata_json_light::reorder::ReorderingReader;
//!
//! let json = r##"{"Name":"x","@odata.etag":"E","@odata.type":"#NS.T"}"##;
//! let mut reader = ReorderingReader::new(JsonReader::from_str(json));
//! reader.reorder_next_object().unwrap();
//!
//! let mut names = Vec::new();
//! while let Ok(node) = reader.read() {
//!     match node {
//!         JsonNode::Property(name) => names.push(name),
//!         JsonNode::EndOfInput => break,
//!         _ => {}
//!     }
//! }
//! assert_eq!(names, vec!["@odata.type", "@odata.etag", "Name"]);
//! ```

use std::collections::VecDeque;

use tracing::trace;

use crate::lexer::{JsonNode, JsonReader, JsonScalar, NodeSource};
use crate::vocabulary::{self, PropertyName};
use crate::{Error, Result};

/// Name and, for scalar members, value of a buffered object member.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyPeek {
    pub name: String,
    pub scalar: Option<JsonScalar>,
}

/// A node reader that reorders control annotations of flagged objects.
#[derive(Debug)]
pub struct ReorderingReader {
    lexer: JsonReader,
    replay: VecDeque<JsonNode>,
}

fn precedence(name: &str) -> u8 {
    match vocabulary::classify(name) {
        PropertyName::ODataAnnotation(vocabulary::TYPE) => 0,
        PropertyName::ODataAnnotation(vocabulary::ID) => 1,
        PropertyName::ODataAnnotation(vocabulary::ETAG) => 2,
        _ => 3,
    }
}

impl ReorderingReader {
    pub fn new(lexer: JsonReader) -> Self {
        ReorderingReader {
            lexer,
            replay: VecDeque::new(),
        }
    }

    fn next_raw(&mut self) -> Result<JsonNode> {
        match self.replay.pop_front() {
            Some(node) => Ok(node),
            None => self.lexer.read(),
        }
    }

    /// Buffers and reorders the object starting at the next node.
    ///
    /// Returns the object's immediate members in replay order. Does nothing
    /// and returns an empty list when the next node is not an object start.
    pub fn reorder_next_object(&mut self) -> Result<Vec<PropertyPeek>> {
        if self.peek()? != &JsonNode::StartObject {
            return Ok(Vec::new());
        }
        self.next_raw()?;

        let mut members: Vec<(String, Vec<JsonNode>)> = Vec::new();
        loop {
            match self.next_raw()? {
                JsonNode::EndObject => break,
                JsonNode::Property(name) => {
                    let value = self.read_buffered_value()?;
                    members.push((name, value));
                }
                JsonNode::EndOfInput => return Err(Error::unexpected_eof("end of object")),
                other => {
                    return Err(Error::invalid_content_start("Property", other));
                }
            }
        }
        members.sort_by_key(|(name, _)| precedence(name));
        trace!(members = members.len(), "reordered resource scope");

        let peeks = members
            .iter()
            .map(|(name, value)| PropertyPeek {
                name: name.clone(),
                scalar: match value.as_slice() {
                    [JsonNode::Value(scalar)] => Some(scalar.clone()),
                    _ => None,
                },
            })
            .collect();

        let mut replay = VecDeque::with_capacity(self.replay.len() + members.len() * 2 + 2);
        replay.push_back(JsonNode::StartObject);
        for (name, value) in members {
            replay.push_back(JsonNode::Property(name));
            replay.extend(value);
        }
        replay.push_back(JsonNode::EndObject);
        replay.extend(self.replay.drain(..));
        self.replay = replay;
        Ok(peeks)
    }

    fn read_buffered_value(&mut self) -> Result<Vec<JsonNode>> {
        let mut nodes = Vec::new();
        let mut depth = 0usize;
        loop {
            let node = self.next_raw()?;
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

    /// Puts nodes back in front of the stream.
    pub fn unread(&mut self, nodes: Vec<JsonNode>) {
        for node in nodes.into_iter().rev() {
            self.replay.push_front(node);
        }
    }

    /// Reads the next node; the input is buffered at construction, so this never waits.
    #[cfg(feature = "tokio")]
    pub async fn read_async(&mut self) -> Result<JsonNode> {
        self.read()
    }

    /// Async counterpart of [`ReorderingReader::reorder_next_object`].
    #[cfg(feature = "tokio")]
    pub async fn reorder_next_object_async(&mut self) -> Result<Vec<PropertyPeek>> {
        self.reorder_next_object()
    }
}

impl NodeSource for ReorderingReader {
    fn read(&mut self) -> Result<JsonNode> {
        self.next_raw()
    }

    fn peek(&mut self) -> Result<&JsonNode> {
        if self.replay.is_empty() {
            return self.lexer.peek();
        }
        match self.replay.front() {
            Some(node) => Ok(node),
            None => Err(Error::unexpected_eof("a node")),
        }
    }
}
