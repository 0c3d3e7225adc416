//! Push-style JSON emitter.
//!
//! [`JsonEmitter`] writes JSON text into an in-memory buffer through a
//! `serde_json` [`CompactFormatter`], tracking where the `,` and `:`
//! separators go so callers only describe structure. The
//! buffer can be drained into any [`std::io::Write`] (or, with the `tokio`
//! feature, any `AsyncWrite`) between top-level payload parts.
//!
//! ```rust
//! use odata_json_light::emitter::JsonEmitter;
//!
//! let mut out = JsonEmitter::new();
//! out.start_object()?;
//! out.property("Name")?;
//! out.string("Al\"ice")?;
//! out.property("Tags")?;
//! out.start_array()?;
//! out.number("1")?;
//! out.boolean(true)?;
//! out.null()?;
//! out.end_array()?;
//! out.end_object()?;
//!
//! assert_eq!(out.as_str(), r#"{"Name":"Al\"ice","Tags":[1,true,null]}"#);
//! # Ok::<(), odata_json_light::Error>(())
//! ```

use std::io;

use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter};

use crate::lexer::{JsonNode, JsonScalar};
use crate::Result;

/// Adapts the output `String` to the byte sink `serde_json` formats into.
struct StringSink<'a>(&'a mut String);

impl io::Write for StringSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = std::str::from_utf8(buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.0.push_str(text);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An in-memory JSON writer.
#[derive(Debug, Default)]
pub struct JsonEmitter {
    output: String,
    formatter: CompactFormatter,
    needs_comma: bool,
    after_property: bool,
}

impl JsonEmitter {
    pub fn new() -> Self {
        JsonEmitter {
            output: String::with_capacity(256),
            formatter: CompactFormatter,
            needs_comma: false,
            after_property: false,
        }
    }

    fn before_value(&mut self) -> Result<()> {
        if self.after_property {
            self.after_property = false;
            self.formatter.begin_object_value(&mut StringSink(&mut self.output))?;
        } else {
            self.formatter
                .begin_array_value(&mut StringSink(&mut self.output), !self.needs_comma)?;
        }
        Ok(())
    }

    pub fn start_object(&mut self) -> Result<()> {
        self.before_value()?;
        self.formatter.begin_object(&mut StringSink(&mut self.output))?;
        self.needs_comma = false;
        Ok(())
    }

    pub fn end_object(&mut self) -> Result<()> {
        self.formatter.end_object(&mut StringSink(&mut self.output))?;
        self.needs_comma = true;
        Ok(())
    }

    pub fn start_array(&mut self) -> Result<()> {
        self.before_value()?;
        self.formatter.begin_array(&mut StringSink(&mut self.output))?;
        self.needs_comma = false;
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<()> {
        self.formatter.end_array(&mut StringSink(&mut self.output))?;
        self.needs_comma = true;
        Ok(())
    }

    /// Writes a member name; the next value call writes its value.
    pub fn property(&mut self, name: &str) -> Result<()> {
        self.formatter
            .begin_object_key(&mut StringSink(&mut self.output), !self.needs_comma)?;
        self.escaped(name)?;
        self.formatter.end_object_key(&mut StringSink(&mut self.output))?;
        self.after_property = true;
        self.needs_comma = false;
        Ok(())
    }

    pub fn null(&mut self) -> Result<()> {
        self.before_value()?;
        self.formatter.write_null(&mut StringSink(&mut self.output))?;
        self.needs_comma = true;
        Ok(())
    }

    pub fn boolean(&mut self, value: bool) -> Result<()> {
        self.before_value()?;
        self.formatter.write_bool(&mut StringSink(&mut self.output), value)?;
        self.needs_comma = true;
        Ok(())
    }

    /// Writes a number from its already formatted text.
    pub fn number(&mut self, text: &str) -> Result<()> {
        self.before_value()?;
        self.formatter.write_number_str(&mut StringSink(&mut self.output), text)?;
        self.needs_comma = true;
        Ok(())
    }

    pub fn string(&mut self, value: &str) -> Result<()> {
        self.before_value()?;
        self.escaped(value)?;
        self.needs_comma = true;
        Ok(())
    }

    fn escaped(&mut self, value: &str) -> Result<()> {
        value.serialize(&mut serde_json::Serializer::new(StringSink(&mut self.output)))?;
        Ok(())
    }

    /// Inserts pre-rendered JSON text as one value.
    pub fn raw(&mut self, json: &str) -> Result<()> {
        self.before_value()?;
        self.formatter.write_raw_fragment(&mut StringSink(&mut self.output), json)?;
        self.needs_comma = true;
        Ok(())
    }

    pub fn scalar(&mut self, scalar: &JsonScalar) -> Result<()> {
        match scalar {
            JsonScalar::Null => self.null(),
            JsonScalar::Bool(b) => self.boolean(*b),
            JsonScalar::Number(n) => self.number(n),
            JsonScalar::String(s) => self.string(s),
        }
    }

    /// Replays a sequence of lexer nodes.
    pub fn nodes(&mut self, nodes: &[JsonNode]) -> Result<()> {
        for node in nodes {
            match node {
                JsonNode::StartObject => self.start_object()?,
                JsonNode::EndObject => self.end_object()?,
                JsonNode::StartArray => self.start_array()?,
                JsonNode::EndArray => self.end_array()?,
                JsonNode::Property(name) => self.property(name)?,
                JsonNode::Value(scalar) => self.scalar(scalar)?,
                JsonNode::EndOfInput => {}
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.output
    }

    pub fn into_string(self) -> String {
        self.output
    }

    /// Moves the buffered text out, leaving the separator state intact.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Drains the buffered text into `writer`.
    pub fn flush_to<W: io::Write>(&mut self, writer: &mut W) -> Result<()> {
        writer.write_all(self.output.as_bytes())?;
        writer.flush()?;
        self.output.clear();
        Ok(())
    }

    /// Drains the buffered text into an async `writer`.
    #[cfg(feature = "tokio")]
    pub async fn flush_to_async<W>(&mut self, writer: &mut W) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        use tokio::io::AsyncWriteExt;

        writer.write_all(self.output.as_bytes()).await?;
        writer.flush().await?;
        self.output.clear();
        Ok(())
    }
}

/// Renders lexer nodes as compact JSON text.
pub fn render(nodes: &[JsonNode]) -> Result<String> {
    let mut emitter = JsonEmitter::new();
    emitter.nodes(nodes)?;
    Ok(emitter.into_string())
}
