//! Input and output contexts.
//!
//! A context owns everything one payload needs: the options, the shared model
//! and the lexer or emitter. Readers and writers borrow their context mutably
//! for the duration of a payload, so a context is never shared between two
//! of them at once.

use std::io;
use std::sync::Arc;

use crate::edm::EdmModel;
use crate::emitter::JsonEmitter;
use crate::lexer::JsonReader;
use crate::reorder::ReorderingReader;
use crate::type_name::TypeNameOracle;
use crate::vocabulary;
use crate::{JsonLightOptions, Result};

/// The write side: options, model, oracle and the output buffer.
pub struct OutputContext {
    options: JsonLightOptions,
    model: Arc<dyn EdmModel>,
    oracle: TypeNameOracle,
    pub(crate) emitter: JsonEmitter,
}

impl OutputContext {
    pub fn new(model: Arc<dyn EdmModel>, options: JsonLightOptions) -> Self {
        OutputContext {
            oracle: TypeNameOracle::for_level(options.metadata_level),
            options,
            model,
            emitter: JsonEmitter::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &JsonLightOptions {
        &self.options
    }

    #[must_use]
    pub fn model(&self) -> &dyn EdmModel {
        &*self.model
    }

    pub(crate) fn shared_model(&self) -> Arc<dyn EdmModel> {
        Arc::clone(&self.model)
    }

    #[must_use]
    pub fn oracle(&self) -> TypeNameOracle {
        self.oracle
    }

    /// The JSON written so far and not yet flushed.
    #[must_use]
    pub fn output(&self) -> &str {
        self.emitter.as_str()
    }

    pub fn into_string(self) -> String {
        self.emitter.into_string()
    }

    /// Drains the buffered output into `writer`.
    pub fn flush<W: io::Write>(&mut self, writer: &mut W) -> Result<()> {
        self.emitter.flush_to(writer)
    }

    /// Drains the buffered output into an async `writer`.
    #[cfg(feature = "tokio")]
    pub async fn flush_async<W>(&mut self, writer: &mut W) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        self.emitter.flush_to_async(writer).await
    }

    /// `@odata.<local>`, or `@<local>` under the omit-prefix option.
    pub(crate) fn annotation_name(&self, local: &str) -> String {
        vocabulary::odata_annotation(local, self.options.omit_odata_prefix)
    }

    /// `<property>@odata.<local>`, or `<property>@<local>` under the omit-prefix option.
    pub(crate) fn property_annotation_name(&self, property: &str, local: &str) -> String {
        vocabulary::property_odata_annotation(property, local, self.options.omit_odata_prefix)
    }

    pub(crate) fn write_annotation_string(&mut self, local: &str, value: &str) -> Result<()> {
        let name = self.annotation_name(local);
        self.emitter.property(&name)?;
        self.emitter.string(value)
    }
}

/// The read side: options, model and the reordering node reader.
pub struct InputContext {
    options: JsonLightOptions,
    model: Arc<dyn EdmModel>,
    pub(crate) reader: ReorderingReader,
}

impl InputContext {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: &str, model: Arc<dyn EdmModel>, options: JsonLightOptions) -> Self {
        Self::from_lexer(JsonReader::from_str(input), model, options)
    }

    /// Reads the whole of `reader` into the input buffer.
    pub fn from_reader<R: io::Read>(reader: R, model: Arc<dyn EdmModel>, options: JsonLightOptions) -> Result<Self> {
        Ok(Self::from_lexer(JsonReader::from_reader(reader)?, model, options))
    }

    /// Reads the whole of an async `reader` into the input buffer.
    #[cfg(feature = "tokio")]
    pub async fn from_async_reader<R>(reader: R, model: Arc<dyn EdmModel>, options: JsonLightOptions) -> Result<Self>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let lexer = JsonReader::from_async_reader(reader).await?;
        Ok(Self::from_lexer(lexer, model, options))
    }

    fn from_lexer(lexer: JsonReader, model: Arc<dyn EdmModel>, options: JsonLightOptions) -> Self {
        let lexer = lexer.with_max_depth(options.max_nesting_depth);
        InputContext {
            options,
            model,
            reader: ReorderingReader::new(lexer),
        }
    }

    #[must_use]
    pub fn options(&self) -> &JsonLightOptions {
        &self.options
    }

    #[must_use]
    pub fn model(&self) -> &dyn EdmModel {
        &*self.model
    }

    pub(crate) fn shared_model(&self) -> Arc<dyn EdmModel> {
        Arc::clone(&self.model)
    }
}
