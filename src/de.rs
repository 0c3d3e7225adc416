//! JSON Light value deserialization.
//!
//! This module provides the [`Deserializer`], which walks JSON Light objects
//! node by node and materializes OData values from them.
//!
//! ## Overview
//!
//! Every member of a resource object is classified by its name (see
//! [`vocabulary::classify`]) and handled accordingly:
//!
//! - **Reserved annotations** (`@odata.id`, `@odata.etag`, ...) fill the
//!   resource's control information
//! - **Property annotations** (`Price@odata.type`, `Price@Measures.Unit`) are
//!   parked in the [`PropertyAndAnnotationCollector`] until `Price` arrives
//! - **Declared properties** are parsed by their declared type; a wire type
//!   annotation must be compatible with it or the read fails before any value
//!   is materialized
//! - **Undeclared properties** follow the configured
//!   [`UndeclaredPropertyBehavior`]; open types always keep them
//! - **Metadata references** (`#NS.Rate`) become actions or functions
//!
//! Values without any type information are inferred from their JSON shape:
//! strings, booleans and numbers become primitives, objects led by
//! `@odata.type` become resources, and anything else is kept as raw
//! [`UntypedValue`] text.
//!
//! ## Usage
//!
//! ```rust
//! use odata_json_light::edm::Model;
//! use odata_json_light::{Deserializer, InputContext, JsonLightOptions};
//!
//! let json = r#"{"@odata.id":"Customers(1)","Name":"Alice","Age":30}"#;
//! let mut ctx = InputContext::from_str(json, Model::empty(), JsonLightOptions::new());
//! let customer = Deserializer::new(&mut ctx).read_resource(None).unwrap();
//!
//! assert_eq!(customer.id.as_deref(), Some("Customers(1)"));
//! assert_eq!(customer.property("Age").and_then(|v| v.as_i64()), Some(30));
//! ```

use std::sync::Arc;

use tracing::{debug, trace};

use crate::annotations::{DeferredProperty, PendingAnnotations, PropertyAndAnnotationCollector};
use crate::context::InputContext;
use crate::edm::{collection_item_name, EdmModel, EdmType, EdmTypeRef, OperationKind, PrimitiveKind, PropertyKind};
use crate::emitter;
use crate::lexer::{JsonNode, JsonScalar, NodeSource};
use crate::primitive::{infer_primitive, parse_primitive};
use crate::reorder::ReorderingReader;
use crate::vocabulary::{self, PropertyName};
use crate::{
    CollectionValue, EnumValue, Error, InstanceAnnotation, JsonLightOptions, NestedResourceInfo, Operation, Property,
    Resource, ResourceBuilder, Result, StreamReference, UndeclaredPropertyBehavior, UntypedValue, Value,
};

/// Where a resource object sits in the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    /// The payload's top-level resource.
    TopLevel,
    /// An item of the top-level resource set.
    SetItem,
    /// An item of a delta `value` array, already reordered by the delta reader.
    DeltaItem,
    Nested,
}

impl ScopeKind {
    fn reorders(self) -> bool {
        matches!(self, ScopeKind::TopLevel | ScopeKind::SetItem)
    }

    fn allows_context(self) -> bool {
        self != ScopeKind::Nested
    }
}

/// What follows a navigation property name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NestedContent {
    Resource,
    ResourceSet,
    /// An expanded single-valued navigation property that is `null`.
    Null,
    /// No value on the wire, only link annotations.
    Deferred,
}

/// A navigation property reached inside a resource body.
#[derive(Clone, Debug)]
pub(crate) struct PendingNavigation {
    pub info: NestedResourceInfo,
    pub content: NestedContent,
    pub target_type: Option<String>,
    /// Entity reference URLs from `Nav@odata.bind`.
    pub links: Vec<String>,
}

pub(crate) enum BodyStep {
    End,
    Navigation(PendingNavigation),
}

/// Per-object read state of one resource.
pub(crate) struct BodyScope {
    pub builder: ResourceBuilder,
    pub context: Option<String>,
    collector: PropertyAndAnnotationCollector,
    kind: ScopeKind,
    navigations: Vec<String>,
}

impl BodyScope {
    fn new(type_name: Option<String>, kind: ScopeKind) -> Self {
        BodyScope {
            builder: ResourceBuilder::new(type_name),
            context: None,
            collector: PropertyAndAnnotationCollector::new(),
            kind,
            navigations: Vec::new(),
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        self.builder.type_name()
    }
}

/// Control information of a resource set, a delta set or a top-level collection.
#[derive(Clone, Debug, Default)]
pub(crate) struct SetHeader {
    pub context: Option<String>,
    pub type_name: Option<String>,
    pub count: Option<i64>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
    pub annotations: Vec<InstanceAnnotation>,
    /// The set's own reserved annotations under `""`, annotation types under `@Term`.
    pub collector: PropertyAndAnnotationCollector,
}

/// The JSON Light value deserializer.
///
/// Borrows an [`InputContext`] and reads values from its node stream.
pub struct Deserializer<'c> {
    pub(crate) reader: &'c mut ReorderingReader,
    model: Arc<dyn EdmModel>,
    options: JsonLightOptions,
}

impl<'c> Deserializer<'c> {
    pub fn new(ctx: &'c mut InputContext) -> Self {
        let model = ctx.shared_model();
        let options = ctx.options().clone();
        Deserializer {
            reader: &mut ctx.reader,
            model,
            options,
        }
    }

    pub(crate) fn model(&self) -> &dyn EdmModel {
        &*self.model
    }

    pub(crate) fn options(&self) -> &JsonLightOptions {
        &self.options
    }

    /// Reads a complete top-level resource, expanded navigation properties included.
    ///
    /// Expanded navigation content is kept as ordinary property values.
    pub fn read_resource(&mut self, expected_type: Option<&str>) -> Result<Resource> {
        let scope = self.begin_resource(expected_type, ScopeKind::TopLevel, "")?;
        let resource = self.materialize(scope)?;
        self.expect_end_of_input()?;
        Ok(resource)
    }

    /// Reads a top-level property payload.
    ///
    /// Primitive, enum and collection values are wrapped in a `value` member;
    /// a complex value is the payload object itself.
    pub fn read_property(&mut self, name: &str, expected: Option<&EdmTypeRef>) -> Result<Property> {
        if let Some(type_name) = expected.and_then(EdmTypeRef::structured_name) {
            let scope = self.begin_resource(Some(type_name), ScopeKind::TopLevel, name)?;
            let resource = self.materialize(scope)?;
            self.expect_end_of_input()?;
            return Ok(Property::new(name, resource));
        }

        self.expect_start_object()?;
        let mut collector = PropertyAndAnnotationCollector::new();
        let mut value = None;
        let mut instance_annotations = Vec::new();
        loop {
            let member = match self.reader.read()? {
                JsonNode::EndObject => break,
                JsonNode::Property(member) => member,
                other => return Err(Error::invalid_content_start("Property", other)),
            };
            match vocabulary::classify(&member) {
                PropertyName::ODataAnnotation(vocabulary::CONTEXT)
                | PropertyName::ODataAnnotation(vocabulary::METADATA_ETAG) => self.reader.skip_value()?,
                PropertyName::ODataAnnotation(local @ vocabulary::TYPE) => {
                    let scalar = self.read_scalar()?;
                    collector.add_odata_annotation("", local, scalar)?;
                }
                PropertyName::PropertyODataAnnotation {
                    property,
                    name: local @ vocabulary::TYPE,
                } if property == vocabulary::VALUE || property.starts_with('@') => {
                    let scalar = self.read_scalar()?;
                    collector.add_odata_annotation(property, local, scalar)?;
                }
                PropertyName::InstanceAnnotation(term) => {
                    let pending = collector.take(&format!("@{}", term))?;
                    if let Some(annotation) = self.read_instance_annotation(term, pending.type_name())? {
                        instance_annotations.push(annotation);
                    }
                }
                PropertyName::Property(vocabulary::VALUE) => {
                    let pending = collector.take(vocabulary::VALUE)?;
                    let wire_type = pending.type_name().or_else(|| collector.pending_type_name(""));
                    let wire_type = wire_type.map(str::to_string);
                    value = Some(self.read_value(name, expected, wire_type.as_deref())?);
                }
                PropertyName::ODataAnnotation(_) => return Err(Error::UnexpectedAnnotation(member.clone())),
                _ => return Err(Error::UnexpectedTopLevelProperty(member.clone())),
            }
        }
        self.expect_end_of_input()?;

        let value = value.ok_or(Error::MissingValueProperty)?;
        if let Some(target) = collector.unclaimed("") {
            return Err(Error::PropertyAnnotationWithoutProperty(target.to_string()));
        }
        Ok(Property {
            name: name.to_string(),
            value,
            instance_annotations,
            type_annotation: None,
        })
    }

    /// Reads a top-level collection payload: `{"value":[...]}`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidContentStart`] when the payload is not an
    /// object or `value` is not an array, [`Error::MissingValueProperty`] when
    /// `value` is absent and [`Error::UnexpectedTopLevelProperty`] for any other
    /// ordinary member.
    pub fn read_collection(&mut self, item_type: Option<&EdmTypeRef>) -> Result<CollectionValue> {
        self.expect_start_object()?;
        let mut header = SetHeader::default();
        if !self.read_set_members(&mut header)? {
            return Err(Error::MissingValueProperty);
        }

        let declared = item_type.map(|item| EdmTypeRef::collection(item.clone()));
        let target = match (declared, header.type_name.as_deref()) {
            (Some(declared), Some(wire)) => {
                let wire = vocabulary::from_wire_type_name(wire);
                Some(self.check_compatible(vocabulary::VALUE, &declared, &wire)?)
            }
            (None, Some(wire)) => Some(self.resolve_wire_type(&vocabulary::from_wire_type_name(wire))),
            (declared, None) => declared,
        };
        let collection = match target.as_ref() {
            Some(target) => self.read_collection_items(vocabulary::VALUE, target.collection_item(), Some(target.full_name()))?,
            None => self.read_collection_items(vocabulary::VALUE, None, None)?,
        };

        if self.read_set_members(&mut header)? {
            return Err(Error::DuplicateProperty(vocabulary::VALUE.to_string()));
        }
        self.expect_end_of_input()?;
        Ok(collection)
    }

    pub(crate) fn expect_start_object(&mut self) -> Result<()> {
        match self.reader.read()? {
            JsonNode::StartObject => Ok(()),
            other => Err(Error::invalid_content_start("StartObject", other)),
        }
    }

    pub(crate) fn expect_end_of_input(&mut self) -> Result<()> {
        match self.reader.read()? {
            JsonNode::EndOfInput => Ok(()),
            other => Err(Error::invalid_content_start("EndOfInput", other)),
        }
    }

    fn read_scalar(&mut self) -> Result<JsonScalar> {
        match self.reader.read()? {
            JsonNode::Value(scalar) => Ok(scalar),
            other => Err(Error::invalid_content_start("PrimitiveValue", other)),
        }
    }

    /// Reads a string-valued annotation; `null` reads as absent.
    pub(crate) fn read_string(&mut self) -> Result<Option<String>> {
        scalar_string(self.read_scalar()?)
    }

    /// Opens a resource object and resolves its type.
    ///
    /// A leading `@odata.type` is consumed here; anywhere later in the object it
    /// is rejected.
    pub(crate) fn begin_resource(&mut self, expected: Option<&str>, kind: ScopeKind, name: &str) -> Result<BodyScope> {
        if kind.reorders() {
            self.reader.reorder_next_object()?;
        }
        self.expect_start_object()?;

        let leading_type = matches!(
            self.reader.peek()?,
            JsonNode::Property(p) if vocabulary::classify(p) == PropertyName::ODataAnnotation(vocabulary::TYPE)
        );
        let wire_type = if leading_type {
            self.reader.read()?;
            self.read_string()?
        } else {
            None
        };

        let type_name = self.resolve_structured_type(name, expected, wire_type.as_deref())?;
        trace!(?kind, type_name = ?type_name, "begin resource");
        Ok(BodyScope::new(type_name, kind))
    }

    fn resolve_structured_type(&self, name: &str, expected: Option<&str>, wire: Option<&str>) -> Result<Option<String>> {
        let wire = match wire {
            Some(wire) => vocabulary::from_wire_type_name(wire),
            None => return Ok(expected.map(str::to_string)),
        };
        let expected = match expected {
            Some(expected) => expected,
            None => return Ok(Some(wire)),
        };
        if wire == expected || self.model.find_structured_type(expected).is_none() {
            return Ok(Some(wire));
        }
        if self.model.find_structured_type(&wire).is_none() {
            return Err(Error::UnknownType(wire));
        }
        if self.model.is_derived_from(&wire, expected) {
            Ok(Some(wire))
        } else {
            Err(Error::type_conflict(name, expected, &wire))
        }
    }

    /// Reads members until the object ends or a navigation property is reached.
    pub(crate) fn read_body_step(&mut self, scope: &mut BodyScope) -> Result<BodyStep> {
        loop {
            let member = match self.reader.read()? {
                JsonNode::EndObject => return Ok(BodyStep::End),
                JsonNode::Property(member) => member,
                other => return Err(Error::invalid_content_start("Property", other)),
            };
            match vocabulary::classify(&member) {
                PropertyName::ODataAnnotation(local) => self.read_resource_annotation(scope, &member, local)?,
                PropertyName::InstanceAnnotation(term) => {
                    let pending = scope.collector.take(&format!("@{}", term))?;
                    if let Some(annotation) = self.read_instance_annotation(term, pending.type_name())? {
                        scope.builder.add_annotation(annotation);
                    }
                }
                PropertyName::PropertyODataAnnotation { property, .. }
                | PropertyName::PropertyAnnotation { property, .. }
                    if scope.navigations.iter().any(|n| n == property) =>
                {
                    trace!(annotation = %member, "ignoring annotation after navigation property");
                    self.reader.skip_value()?;
                }
                PropertyName::PropertyODataAnnotation { property, name } => {
                    if name == vocabulary::BIND {
                        let urls = self.read_bind_urls()?;
                        scope.collector.add_binds(property, urls)?;
                    } else {
                        let scalar = self.read_scalar()?;
                        scope.collector.add_odata_annotation(property, name, scalar)?;
                    }
                }
                PropertyName::PropertyAnnotation { property, term } => {
                    let pending = scope.collector.take(&format!("{}@{}", property, term))?;
                    if let Some(annotation) = self.read_instance_annotation(term, pending.type_name())? {
                        scope.collector.add_custom_annotation(property, annotation)?;
                    }
                }
                PropertyName::MetadataReference(metadata) => self.read_operations(&mut scope.builder, metadata)?,
                PropertyName::Property(property) => {
                    if let Some(navigation) = self.read_member(scope, property)? {
                        return Ok(BodyStep::Navigation(navigation));
                    }
                }
            }
        }
    }

    fn read_resource_annotation(&mut self, scope: &mut BodyScope, member: &str, local: &str) -> Result<()> {
        match local {
            vocabulary::ID => {
                if let Some(id) = self.read_string()? {
                    scope.builder.set_id(id)?;
                }
            }
            vocabulary::ETAG => {
                if let Some(etag) = self.read_string()? {
                    scope.builder.set_etag(etag)?;
                }
            }
            vocabulary::EDIT_LINK => {
                if let Some(link) = self.read_string()? {
                    scope.builder.set_edit_link(link)?;
                }
            }
            vocabulary::READ_LINK => {
                if let Some(link) = self.read_string()? {
                    scope.builder.set_read_link(link)?;
                }
            }
            vocabulary::MEDIA_EDIT_LINK => {
                if let Some(link) = self.read_string()? {
                    scope.builder.media_resource_mut().edit_link = Some(link);
                }
            }
            vocabulary::MEDIA_READ_LINK => {
                if let Some(link) = self.read_string()? {
                    scope.builder.media_resource_mut().read_link = Some(link);
                }
            }
            vocabulary::MEDIA_CONTENT_TYPE => {
                if let Some(content_type) = self.read_string()? {
                    scope.builder.media_resource_mut().content_type = Some(content_type);
                }
            }
            vocabulary::MEDIA_ETAG => {
                if let Some(etag) = self.read_string()? {
                    scope.builder.media_resource_mut().etag = Some(etag);
                }
            }
            vocabulary::CONTEXT if scope.kind.allows_context() => scope.context = self.read_string()?,
            vocabulary::METADATA_ETAG => self.reader.skip_value()?,
            _ => return Err(Error::UnexpectedAnnotation(member.to_string())),
        }
        Ok(())
    }

    fn read_member(&mut self, scope: &mut BodyScope, property: &str) -> Result<Option<PendingNavigation>> {
        let pending = scope.collector.take(property)?;
        let declared = scope
            .type_name()
            .and_then(|t| self.model.find_property(t, property))
            .map(|p| p.kind.clone());

        let value = match declared {
            Some(PropertyKind::Navigation { target, collection }) => {
                let navigation = self.begin_navigation(scope, property, pending, Some(target), Some(collection))?;
                return Ok(Some(navigation));
            }
            Some(PropertyKind::Structural(type_ref)) if type_ref.as_primitive() == Some(PrimitiveKind::Stream) => {
                self.reader.skip_value()?;
                Value::Stream(pending.stream_reference())
            }
            Some(PropertyKind::Structural(type_ref)) => self.read_value(property, Some(&type_ref), pending.type_name())?,
            None if pending.defines_navigation() => {
                let navigation = self.begin_navigation(scope, property, pending, None, None)?;
                return Ok(Some(navigation));
            }
            None => {
                let open = match scope.type_name() {
                    Some(t) => self.model.find_structured_type(t).is_none() || self.model.is_open(t),
                    None => true,
                };
                if !open {
                    match self.options.undeclared_property_behavior {
                        UndeclaredPropertyBehavior::Fail => {
                            return Err(Error::undeclared_property(property, scope.type_name().unwrap_or_default()));
                        }
                        UndeclaredPropertyBehavior::IgnoreAndDiscard => {
                            debug!(property, type_name = ?scope.type_name(), "discarding undeclared property");
                            self.reader.skip_value()?;
                            return Ok(None);
                        }
                        UndeclaredPropertyBehavior::KeepAsOpen => {}
                    }
                }
                self.read_value(property, None, pending.type_name())?
            }
        };

        scope.builder.add_property(Property {
            name: property.to_string(),
            value,
            instance_annotations: pending.custom,
            type_annotation: None,
        })?;
        Ok(None)
    }

    fn begin_navigation(
        &mut self,
        scope: &mut BodyScope,
        name: &str,
        pending: PendingAnnotations,
        target_type: Option<String>,
        collection: Option<bool>,
    ) -> Result<PendingNavigation> {
        scope.navigations.push(name.to_string());
        let content = match self.reader.peek()? {
            JsonNode::StartObject => NestedContent::Resource,
            JsonNode::StartArray => NestedContent::ResourceSet,
            JsonNode::Value(JsonScalar::Null) => NestedContent::Null,
            other => return Err(Error::invalid_content_start("StartObject", other)),
        };
        if content == NestedContent::Null {
            self.reader.read()?;
        }
        let collection = collection.or(match content {
            NestedContent::ResourceSet => Some(true),
            NestedContent::Resource => Some(false),
            _ => None,
        });
        trace!(navigation = name, ?content, "navigation property");
        Ok(PendingNavigation {
            info: navigation_info(name, &pending, collection),
            content,
            target_type,
            links: pending.binds,
        })
    }

    /// Resolves leftover annotations once the object has closed.
    ///
    /// Stream annotations become stream properties; navigation annotations are
    /// returned as deferred navigation properties.
    pub(crate) fn finish_body(&mut self, scope: &mut BodyScope) -> Result<Vec<PendingNavigation>> {
        let mut navigations = Vec::new();
        for deferred in scope.collector.finish()? {
            match deferred {
                DeferredProperty::Stream(name, stream) => {
                    scope.builder.add_property(Property::new(&name, Value::Stream(stream)))?;
                }
                DeferredProperty::Navigation(name, pending) => {
                    let declared = scope
                        .type_name()
                        .and_then(|t| self.model.find_property(t, &name))
                        .map(|p| p.kind.clone());
                    let (target_type, collection) = match declared {
                        Some(PropertyKind::Navigation { target, collection }) => (Some(target), Some(collection)),
                        _ => (None, None),
                    };
                    navigations.push(PendingNavigation {
                        info: navigation_info(&name, &pending, collection),
                        content: NestedContent::Deferred,
                        target_type,
                        links: pending.binds,
                    });
                }
            }
        }
        Ok(navigations)
    }

    /// Reads the rest of a resource, keeping expanded navigation content as property values.
    pub(crate) fn materialize(&mut self, mut scope: BodyScope) -> Result<Resource> {
        while let BodyStep::Navigation(navigation) = self.read_body_step(&mut scope)? {
            self.materialize_navigation(&mut scope, navigation)?;
        }
        self.finish_body(&mut scope)?;
        Ok(scope.builder.build())
    }

    fn materialize_navigation(&mut self, scope: &mut BodyScope, navigation: PendingNavigation) -> Result<()> {
        let target = navigation.target_type.as_deref();
        let name = navigation.info.name.as_str();
        let value = match navigation.content {
            NestedContent::Resource => Value::from(self.read_nested_resource(target, name)?),
            NestedContent::ResourceSet => {
                match self.reader.read()? {
                    JsonNode::StartArray => {}
                    other => return Err(Error::invalid_content_start("StartArray", other)),
                }
                let mut items = Vec::new();
                loop {
                    let next = match self.reader.peek()? {
                        JsonNode::EndArray => None,
                        JsonNode::Value(JsonScalar::Null) => Some(false),
                        _ => Some(true),
                    };
                    match next {
                        None => {
                            self.reader.read()?;
                            break;
                        }
                        Some(false) => {
                            self.reader.read()?;
                            items.push(Value::Null);
                        }
                        Some(true) => items.push(Value::from(self.read_nested_resource(target, name)?)),
                    }
                }
                let type_name = target.map(|t| format!("{}{})", crate::edm::COLLECTION_PREFIX, t));
                Value::Collection(CollectionValue::new(type_name.as_deref(), items))
            }
            NestedContent::Null => Value::Null,
            NestedContent::Deferred => return Ok(()),
        };
        scope.builder.add_property(Property::new(name, value))
    }

    fn read_nested_resource(&mut self, expected: Option<&str>, name: &str) -> Result<Resource> {
        let scope = self.begin_resource(expected, ScopeKind::Nested, name)?;
        self.materialize(scope)
    }

    fn read_instance_annotation(&mut self, term: &str, sibling_type: Option<&str>) -> Result<Option<InstanceAnnotation>> {
        if !self.options.annotation_filter.matches(term) {
            trace!(annotation = term, "instance annotation filtered out");
            self.reader.skip_value()?;
            return Ok(None);
        }
        let declared = self.model.find_term(term).map(|t| t.type_ref.clone());
        let value = self.read_value(&format!("@{}", term), declared.as_ref(), sibling_type)?;
        Ok(Some(InstanceAnnotation::new(term, value)))
    }

    fn read_bind_urls(&mut self) -> Result<Vec<String>> {
        let is_array = matches!(self.reader.peek()?, JsonNode::StartArray);
        if !is_array {
            return Ok(self.read_string()?.into_iter().collect());
        }
        self.reader.read()?;
        let mut urls = Vec::new();
        loop {
            match self.reader.read()? {
                JsonNode::EndArray => return Ok(urls),
                JsonNode::Value(JsonScalar::String(url)) => urls.push(url),
                other => return Err(Error::invalid_primitive("Edm.String", other)),
            }
        }
    }

    fn read_operations(&mut self, builder: &mut ResourceBuilder, metadata: &str) -> Result<()> {
        let qualified = match metadata.find('#') {
            Some(pos) => &metadata[pos + 1..],
            None => metadata,
        };
        let kind = self
            .model
            .find_operation(qualified)
            .map(|op| op.kind)
            .unwrap_or(OperationKind::Action);

        let mut operations = Vec::new();
        let is_array = matches!(self.reader.peek()?, JsonNode::StartArray);
        if is_array {
            self.reader.read()?;
            while !matches!(self.reader.peek()?, JsonNode::EndArray) {
                operations.push(self.read_operation(metadata)?);
            }
            self.reader.read()?;
        } else {
            operations.push(self.read_operation(metadata)?);
        }

        for operation in operations {
            match kind {
                OperationKind::Action => builder.add_action(operation),
                OperationKind::Function => builder.add_function(operation),
            }
        }
        Ok(())
    }

    fn read_operation(&mut self, metadata: &str) -> Result<Operation> {
        self.expect_start_object()?;
        let mut operation = Operation::new(metadata);
        loop {
            match self.reader.read()? {
                JsonNode::EndObject => return Ok(operation),
                JsonNode::Property(name) => match name.as_str() {
                    vocabulary::OPERATION_TITLE => operation.title = self.read_string()?,
                    vocabulary::OPERATION_TARGET => operation.target = self.read_string()?,
                    _ => self.reader.skip_value()?,
                },
                other => return Err(Error::invalid_content_start("Property", other)),
            }
        }
    }

    /// Reads set-level members until `value` (returns `true`, positioned at
    /// the array) or the end of the object (returns `false`).
    pub(crate) fn read_set_members(&mut self, header: &mut SetHeader) -> Result<bool> {
        loop {
            let member = match self.reader.read()? {
                JsonNode::EndObject => {
                    if let Some(target) = header.collector.unclaimed("") {
                        return Err(Error::PropertyAnnotationWithoutProperty(target.to_string()));
                    }
                    return Ok(false);
                }
                JsonNode::Property(member) => member,
                other => return Err(Error::invalid_content_start("Property", other)),
            };
            match vocabulary::classify(&member) {
                PropertyName::ODataAnnotation(local @ vocabulary::CONTEXT) => {
                    header.context = scalar_string(self.read_header_annotation(header, local)?)?;
                }
                PropertyName::ODataAnnotation(local @ vocabulary::TYPE) => {
                    header.type_name = scalar_string(self.read_header_annotation(header, local)?)?;
                }
                PropertyName::ODataAnnotation(local @ vocabulary::COUNT) => {
                    let scalar = self.read_header_annotation(header, local)?;
                    let count = scalar
                        .as_i64()
                        .ok_or_else(|| Error::invalid_primitive("Edm.Int64", &scalar))?;
                    header.count = Some(count);
                }
                PropertyName::ODataAnnotation(local @ vocabulary::NEXT_LINK) => {
                    header.next_link = scalar_string(self.read_header_annotation(header, local)?)?;
                }
                PropertyName::ODataAnnotation(local @ vocabulary::DELTA_LINK) => {
                    header.delta_link = scalar_string(self.read_header_annotation(header, local)?)?;
                }
                PropertyName::ODataAnnotation(vocabulary::METADATA_ETAG) => self.reader.skip_value()?,
                PropertyName::InstanceAnnotation(term) => {
                    let pending = header.collector.take(&format!("@{}", term))?;
                    if let Some(annotation) = self.read_instance_annotation(term, pending.type_name())? {
                        header.annotations.push(annotation);
                    }
                }
                PropertyName::PropertyODataAnnotation {
                    property,
                    name: local @ vocabulary::TYPE,
                } if property.starts_with('@') => {
                    let scalar = self.read_scalar()?;
                    header.collector.add_odata_annotation(property, local, scalar)?;
                }
                PropertyName::Property(vocabulary::VALUE) => {
                    let is_array = matches!(self.reader.peek()?, JsonNode::StartArray);
                    if !is_array {
                        let found = self.reader.read()?;
                        return Err(Error::invalid_content_start("StartArray", found));
                    }
                    return Ok(true);
                }
                PropertyName::PropertyODataAnnotation {
                    property: vocabulary::VALUE,
                    ..
                }
                | PropertyName::PropertyAnnotation {
                    property: vocabulary::VALUE,
                    ..
                } => self.reader.skip_value()?,
                PropertyName::ODataAnnotation(_) => return Err(Error::UnexpectedAnnotation(member.clone())),
                _ => return Err(Error::UnexpectedTopLevelProperty(member.clone())),
            }
        }
    }

    /// Reads a reserved set annotation, rejecting a second occurrence of the same one.
    fn read_header_annotation(&mut self, header: &mut SetHeader, local: &str) -> Result<JsonScalar> {
        let scalar = self.read_scalar()?;
        header.collector.add_odata_annotation("", local, scalar.clone())?;
        Ok(scalar)
    }

    /// Reads one value against its declared type and optional wire type name.
    pub(crate) fn read_value(&mut self, name: &str, expected: Option<&EdmTypeRef>, wire_type: Option<&str>) -> Result<Value> {
        let target = match wire_type {
            None => expected.cloned(),
            Some(wire) => {
                let wire = vocabulary::from_wire_type_name(wire);
                Some(match expected {
                    Some(declared) => self.check_compatible(name, declared, &wire)?,
                    None => self.resolve_wire_type(&wire),
                })
            }
        };
        self.read_typed_value(name, target.as_ref())
    }

    /// Resolves a wire type name, falling back to a structured type the model does not know.
    fn resolve_wire_type(&self, wire: &str) -> EdmTypeRef {
        if let Some(resolved) = self.model.resolve_type(wire) {
            return resolved;
        }
        match collection_item_name(wire) {
            Some(item) => EdmTypeRef::collection(self.resolve_wire_type(item)),
            None => EdmTypeRef::complex(wire),
        }
    }

    /// Checks a wire type against the declared type and returns the type to read with.
    fn check_compatible(&self, name: &str, declared: &EdmTypeRef, wire: &str) -> Result<EdmTypeRef> {
        let conflict = || Error::type_conflict(name, &declared.full_name(), wire);

        if let (EdmType::Collection(declared_item), Some(wire_item)) = (&declared.definition, collection_item_name(wire)) {
            let mut item = self.check_compatible(name, declared_item, wire_item)?;
            item.nullable = declared_item.nullable;
            let mut resolved = EdmTypeRef::collection(item);
            resolved.nullable = declared.nullable;
            return Ok(resolved);
        }

        let resolved = match self.model.resolve_type(wire) {
            Some(resolved) => resolved,
            None if declared.is_untyped() => return Ok(self.resolve_wire_type(wire)),
            None => match &declared.definition {
                EdmType::Complex(d) | EdmType::Entity(d) if self.model.find_structured_type(d).is_some() => {
                    return Err(Error::UnknownType(wire.to_string()));
                }
                EdmType::Complex(_) => return Ok(EdmTypeRef { nullable: declared.nullable, ..EdmTypeRef::complex(wire) }),
                EdmType::Entity(_) => return Ok(EdmTypeRef { nullable: declared.nullable, ..EdmTypeRef::entity(wire) }),
                _ => return Err(conflict()),
            },
        };

        let compatible = match (&declared.definition, &resolved.definition) {
            (EdmType::Untyped, _) => true,
            (EdmType::Primitive(d), EdmType::Primitive(w)) => w.can_convert_to(*d),
            (EdmType::Enum(d), EdmType::Enum(w)) => d == w,
            (EdmType::Complex(d) | EdmType::Entity(d), EdmType::Complex(w) | EdmType::Entity(w)) => {
                self.model.is_derived_from(w, d)
            }
            _ => false,
        };
        if !compatible {
            return Err(conflict());
        }

        let mut target = match &declared.definition {
            EdmType::Primitive(kind) if !kind.is_abstract() => declared.clone(),
            _ => resolved,
        };
        target.nullable = declared.nullable;
        Ok(target)
    }

    fn read_typed_value(&mut self, name: &str, target: Option<&EdmTypeRef>) -> Result<Value> {
        let is_null = matches!(self.reader.peek()?, JsonNode::Value(JsonScalar::Null));
        if is_null {
            self.reader.read()?;
            if target.map_or(false, |t| !t.nullable) {
                return Err(Error::NullValueForNonNullable(name.to_string()));
            }
            return Ok(Value::Null);
        }

        let target = match target {
            Some(target) => target,
            None => return self.read_inferred_value(name),
        };
        match &target.definition {
            EdmType::Primitive(PrimitiveKind::Stream) => {
                self.reader.skip_value()?;
                Ok(Value::Stream(StreamReference::default()))
            }
            EdmType::Primitive(kind) => {
                let scalar = self.read_scalar()?;
                Ok(Value::Primitive(parse_primitive(*kind, &scalar)?))
            }
            EdmType::Enum(enum_name) => self.read_enum(enum_name),
            EdmType::Complex(type_name) | EdmType::Entity(type_name) => {
                let is_string = matches!(self.reader.peek()?, JsonNode::Value(JsonScalar::String(_)));
                if is_string && self.model.find_structured_type(type_name).is_none() {
                    // an enum member whose type the model does not know
                    return self.read_enum(type_name);
                }
                Ok(Value::from(self.read_nested_resource(Some(type_name), name)?))
            }
            EdmType::Collection(item) => {
                let collection = self.read_collection_items(name, Some(item), Some(target.full_name()))?;
                Ok(Value::Collection(collection))
            }
            EdmType::Untyped => self.read_inferred_value(name),
        }
    }

    fn read_enum(&mut self, enum_name: &str) -> Result<Value> {
        let scalar = self.read_scalar()?;
        let member = scalar
            .as_str()
            .ok_or_else(|| Error::invalid_primitive(enum_name, &scalar))?;
        if let Some(enum_type) = self.model.find_enum_type(enum_name) {
            if !enum_type.accepts(member) {
                return Err(Error::invalid_primitive(enum_name, member));
            }
        }
        Ok(Value::Enum(EnumValue::new(enum_name, member)))
    }

    fn read_inferred_value(&mut self, name: &str) -> Result<Value> {
        #[derive(PartialEq)]
        enum Shape {
            Scalar,
            Object,
            Array,
        }

        let shape = match self.reader.peek()? {
            JsonNode::Value(_) => Shape::Scalar,
            JsonNode::StartObject => Shape::Object,
            JsonNode::StartArray => Shape::Array,
            other => return Err(Error::invalid_content_start("PrimitiveValue", other)),
        };
        match shape {
            Shape::Scalar => {
                let scalar = self.read_scalar()?;
                Ok(infer_primitive(&scalar)?.map_or(Value::Null, Value::Primitive))
            }
            Shape::Array => Ok(Value::Untyped(UntypedValue(self.reader.read_raw_value()?))),
            Shape::Object => {
                let nodes = self.reader.read_value_nodes()?;
                let typed = matches!(
                    nodes.get(1),
                    Some(JsonNode::Property(p)) if vocabulary::classify(p) == PropertyName::ODataAnnotation(vocabulary::TYPE)
                );
                if typed {
                    self.reader.unread(nodes);
                    Ok(Value::from(self.read_nested_resource(None, name)?))
                } else {
                    Ok(Value::Untyped(UntypedValue(emitter::render(&nodes)?)))
                }
            }
        }
    }

    fn read_collection_items(&mut self, name: &str, item: Option<&EdmTypeRef>, type_name: Option<String>) -> Result<CollectionValue> {
        match self.reader.read()? {
            JsonNode::StartArray => {}
            other => return Err(Error::invalid_content_start("StartArray", other)),
        }
        let mut items = Vec::new();
        while !matches!(self.reader.peek()?, JsonNode::EndArray) {
            items.push(self.read_typed_value(name, item)?);
        }
        self.reader.read()?;
        Ok(CollectionValue::new(type_name.as_deref(), items))
    }
}

/// A string-valued annotation; `null` reads as absent.
fn scalar_string(scalar: JsonScalar) -> Result<Option<String>> {
    match scalar {
        JsonScalar::String(s) => Ok(Some(s)),
        JsonScalar::Null => Ok(None),
        other => Err(Error::invalid_primitive("Edm.String", other)),
    }
}

fn navigation_info(name: &str, pending: &PendingAnnotations, collection: Option<bool>) -> NestedResourceInfo {
    NestedResourceInfo {
        name: name.to_string(),
        is_collection: collection,
        url: pending.string(vocabulary::NAVIGATION_LINK),
        association_link_url: pending.string(vocabulary::ASSOCIATION_LINK),
        count: pending.count(),
        next_link: pending.string(vocabulary::NEXT_LINK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::{ModelBuilder, StructuredType};
    use crate::{Model, UndeclaredPropertyBehavior};

    fn model() -> Arc<dyn EdmModel> {
        ModelBuilder::new()
            .structured_type(StructuredType::complex("NS.Address").property(
                "City",
                EdmTypeRef::primitive(PrimitiveKind::String),
            ))
            .structured_type(
                StructuredType::entity("NS.Customer")
                    .key("Id")
                    .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                    .property("Birthday", EdmTypeRef::primitive(PrimitiveKind::DateTimeOffset))
                    .property("Big", EdmTypeRef::primitive(PrimitiveKind::Int64))
                    .property("Address", EdmTypeRef::complex("NS.Address"))
                    .property("Tags", EdmTypeRef::collection(EdmTypeRef::primitive(PrimitiveKind::String))),
            )
            .build()
    }

    fn read(json: &str, options: JsonLightOptions) -> Result<Resource> {
        let mut ctx = InputContext::from_str(json, model(), options);
        Deserializer::new(&mut ctx).read_resource(Some("NS.Customer"))
    }

    #[test]
    fn test_discard_undeclared_property() {
        let options = JsonLightOptions::new()
            .with_undeclared_property_behavior(UndeclaredPropertyBehavior::IgnoreAndDiscard);
        let resource = read(r#"{"Id":1,"UndeclaredX":{"A":1}}"#, options).unwrap();
        assert_eq!(resource.properties.len(), 1);
    }

    #[test]
    fn test_fail_on_undeclared_property() {
        let err = read(r#"{"Id":1,"X":2}"#, JsonLightOptions::new()).unwrap_err();
        assert_eq!(err.message_key(), "undeclared_property");
    }

    #[test]
    fn test_keep_undeclared_as_open() {
        let options = JsonLightOptions::new().with_undeclared_property_behavior(UndeclaredPropertyBehavior::KeepAsOpen);
        let resource = read(r#"{"Id":1,"X":{"A":1}}"#, options).unwrap();
        assert!(matches!(resource.property("X"), Some(Value::Untyped(raw)) if raw.raw() == r#"{"A":1}"#));
    }

    #[test]
    fn test_conflicting_wire_type_is_rejected() {
        let err = read(
            r##"{"Id":1,"Birthday@odata.type":"#String","Birthday":"x"}"##,
            JsonLightOptions::new(),
        )
        .unwrap_err();
        assert_eq!(err.message_key(), "type_conflict");
    }

    #[test]
    fn test_int64_accepts_string_and_number() {
        let resource = read(r#"{"Id":1,"Big":"9007199254740993"}"#, JsonLightOptions::new()).unwrap();
        assert_eq!(resource.property("Big").and_then(Value::as_i64), Some(9_007_199_254_740_993));
    }

    #[test]
    fn test_null_for_non_nullable_key() {
        let err = read(r#"{"Id":null}"#, JsonLightOptions::new()).unwrap_err();
        assert_eq!(err, Error::NullValueForNonNullable("Id".into()));
    }

    #[test]
    fn test_nested_complex_and_collection() {
        let resource = read(
            r#"{"Id":1,"Address":{"City":"Oslo"},"Tags":["a","b"]}"#,
            JsonLightOptions::new(),
        )
        .unwrap();
        let address = resource.property("Address").and_then(Value::as_resource).unwrap();
        assert_eq!(address.type_name.as_deref(), Some("NS.Address"));
        let tags = resource.property("Tags").and_then(Value::as_collection).unwrap();
        assert_eq!(tags.items.len(), 2);
        assert_eq!(tags.type_name.as_deref(), Some("Collection(Edm.String)"));
    }

    #[test]
    fn test_type_after_properties_is_rejected() {
        let mut ctx = InputContext::from_str(
            r##"{"City":"Oslo","@odata.type":"#NS.Address"}"##,
            model(),
            JsonLightOptions::new(),
        );
        let mut de = Deserializer::new(&mut ctx);
        let scope = de.begin_resource(Some("NS.Address"), ScopeKind::Nested, "Address").unwrap();
        let err = de.materialize(scope).unwrap_err();
        assert_eq!(err, Error::UnexpectedAnnotation("@odata.type".into()));
    }

    #[test]
    fn test_metadata_reference_defaults_to_action() {
        let json = r##"{"#NS.Rate":{"title":"Rate","target":"Customers(1)/NS.Rate"}}"##;
        let mut ctx = InputContext::from_str(json, Model::empty(), JsonLightOptions::new());
        let resource = Deserializer::new(&mut ctx).read_resource(None).unwrap();
        assert_eq!(resource.actions.len(), 1);
        assert_eq!(resource.actions[0].target.as_deref(), Some("Customers(1)/NS.Rate"));
    }

    #[test]
    fn test_top_level_collection_value_must_be_array() {
        let mut ctx = InputContext::from_str(r#"{"value":"foobar"}"#, Model::empty(), JsonLightOptions::new());
        let err = Deserializer::new(&mut ctx).read_collection(None).unwrap_err();
        assert_eq!(err.message_key(), "invalid_content_start");
    }

    #[test]
    fn test_top_level_collection_rejects_other_properties() {
        let mut ctx = InputContext::from_str(r#"{"other":1,"value":[]}"#, Model::empty(), JsonLightOptions::new());
        let err = Deserializer::new(&mut ctx).read_collection(None).unwrap_err();
        assert_eq!(err, Error::UnexpectedTopLevelProperty("other".into()));
    }

    #[test]
    fn test_stream_annotations_define_property() {
        let json = r#"{"Photo@odata.mediaReadLink":"Photos(1)/$value"}"#;
        let mut ctx = InputContext::from_str(json, Model::empty(), JsonLightOptions::new());
        let resource = Deserializer::new(&mut ctx).read_resource(None).unwrap();
        assert!(matches!(
            resource.property("Photo"),
            Some(Value::Stream(s)) if s.read_link.as_deref() == Some("Photos(1)/$value")
        ));
    }
}
