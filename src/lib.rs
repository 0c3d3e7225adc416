//! # odata_json_light
//!
//! Reader and writer for the OData JSON Light payload format.
//!
//! ## What is JSON Light?
//!
//! JSON Light is the JSON encoding of OData resources, resource sets,
//! properties, collections and delta results. Plain JSON members carry the
//! data; control information (type names, ids, links, counts) travels in
//! `@odata.*` annotations whose presence depends on the negotiated
//! [`MetadataLevel`]:
//!
//! - **full**: every piece of control information is written, computed by URL
//!   convention where the caller did not supply it
//! - **minimal**: only what a client cannot compute from the model and the
//!   context URL
//! - **none**: no control information at all
//!
//! ## Key Features
//!
//! - **Metadata-aware type names**: one [`TypeNameOracle`] per metadata level decides
//!   when `@odata.type` is needed
//! - **Pull readers**: [`ResourceReader`] and [`DeltaReader`] advance one item at a
//!   time, with `@odata.type`, `@odata.id` and `@odata.etag` promoted ahead of data
//! - **Caller-driven writers**: [`ResourceWriter`] and [`DeltaWriter`] check every
//!   call against their scope stack
//! - **Model-driven values**: declared types drive parsing, undeclared
//!   properties follow [`UndeclaredPropertyBehavior`]
//! - **Serde bridge**: [`to_value`] and [`to_resource`] turn `Serialize` types into values
//!
//! ## Quick Start
//!
//! ```rust
//! use odata_json_light::edm::{EdmTypeRef, ModelBuilder, PrimitiveKind, StructuredType};
//! use odata_json_light::{resource_from_str, resource_to_string, JsonLightOptions, Resource};
//!
//! let model = ModelBuilder::new()
//!     .structured_type(
//!         StructuredType::entity("NS.Customer")
//!             .key("Id")
//!             .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
//!             .property("Balance", EdmTypeRef::primitive(PrimitiveKind::Decimal)),
//!     )
//!     .build();
//!
//! let customer = Resource::of_type("NS.Customer")
//!     .with_property("Id", 1i32)
//!     .with_property("Balance", odata_json_light::PrimitiveValue::Decimal("12.50".into()));
//!
//! let json = resource_to_string(&customer, model.clone(), JsonLightOptions::full()).unwrap();
//! assert_eq!(json, r##"{"@odata.type":"#NS.Customer","Id":1,"Balance":12.50}"##);
//!
//! let back = resource_from_str(&json, model, JsonLightOptions::full(), Some("NS.Customer")).unwrap();
//! assert_eq!(back.property("Balance"), customer.property("Balance"));
//! ```
//!
//! ## Streaming
//!
//! Readers and writers borrow a context: [`InputContext`] owns the buffered
//! input, [`OutputContext`] the output. With the `tokio` feature, contexts
//! can be filled from an `AsyncRead` and flushed to an `AsyncWrite`; the
//! input is read completely before the first item is produced.
//!
//! ## Logging
//!
//! State transitions are logged through `tracing` at `debug` level and type
//! name decisions at `trace` level. Nothing is logged above `debug`.

pub mod annotations;
pub mod context;
pub mod convert;
pub mod de;
pub mod delta;
pub mod edm;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod map;
pub mod metadata;
pub mod options;
pub mod primitive;
pub mod reader;
pub mod reorder;
pub mod resource;
pub mod ser;
pub mod type_name;
pub mod value;
pub mod vocabulary;
pub mod writer;

pub use context::{InputContext, OutputContext};
pub use convert::{to_resource, to_value, ValueSerializer};
pub use de::Deserializer;
pub use delta::{DeltaItem, DeltaReader, DeltaReaderState};
pub use edm::{EdmModel, Model, ModelBuilder};
pub use error::{Error, Result};
pub use map::PropertyMap;
pub use metadata::NavigationSource;
pub use options::{AnnotationFilter, JsonLightOptions, MessageKind, MetadataLevel, UndeclaredPropertyBehavior};
pub use reader::{ReaderItem, ReaderState, ResourceReader};
pub use resource::{
    DeletedEntry, DeletedReason, DeltaLink, DeltaResourceSet, EntityReferenceLink, InstanceAnnotation,
    NestedResourceInfo, Operation, Property, Resource, ResourceBuilder, ResourceSet,
};
pub use ser::Serializer;
pub use type_name::TypeNameOracle;
pub use value::{CollectionValue, EnumValue, PrimitiveValue, StreamReference, TypeAnnotation, UntypedValue, Value};
pub use writer::{write_collection, write_property, DeltaWriter, ResourceWriter, WriterState};

use std::io;
use std::sync::Arc;

/// Writes a single top-level resource to a string.
///
/// Nested resources held as property values are written inline. Use a
/// [`ResourceWriter`] for resource sets, navigation links and convention
/// metadata.
///
/// # Errors
///
/// Returns an error if a value does not fit its declared type or a type name
/// required at the chosen metadata level cannot be determined.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn resource_to_string(resource: &Resource, model: Arc<dyn EdmModel>, options: JsonLightOptions) -> Result<String> {
    let mut ctx = OutputContext::new(model, options);
    let mut writer = ResourceWriter::new(&mut ctx);
    writer.write_start_resource(resource)?;
    writer.write_end()?;
    Ok(ctx.into_string())
}

/// Writes a single top-level resource to an I/O stream.
///
/// # Errors
///
/// Returns an error if writing fails, or for the reasons listed on [`resource_to_string`].
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn resource_to_writer<W>(
    mut writer: W,
    resource: &Resource,
    model: Arc<dyn EdmModel>,
    options: JsonLightOptions,
) -> Result<()>
where
    W: io::Write,
{
    let mut ctx = OutputContext::new(model, options);
    let mut resource_writer = ResourceWriter::new(&mut ctx);
    resource_writer.write_start_resource(resource)?;
    resource_writer.write_end()?;
    ctx.flush(&mut writer)
}

/// Reads a single top-level resource from a string.
///
/// Expanded navigation content is kept as property values.
///
/// # Errors
///
/// Returns an error if the input is not valid JSON, is not a resource object,
/// or does not fit the model. Syntax errors carry line and column.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn resource_from_str(
    json: &str,
    model: Arc<dyn EdmModel>,
    options: JsonLightOptions,
    expected_type: Option<&str>,
) -> Result<Resource> {
    let mut ctx = InputContext::from_str(json, model, options);
    Deserializer::new(&mut ctx).read_resource(expected_type)
}

/// Reads a single top-level resource from an I/O stream.
///
/// # Errors
///
/// Returns an error if reading fails, or for the reasons listed on [`resource_from_str`].
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn resource_from_reader<R>(
    reader: R,
    model: Arc<dyn EdmModel>,
    options: JsonLightOptions,
    expected_type: Option<&str>,
) -> Result<Resource>
where
    R: io::Read,
{
    let mut ctx = InputContext::from_reader(reader, model, options)?;
    Deserializer::new(&mut ctx).read_resource(expected_type)
}
