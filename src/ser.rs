//! JSON Light value serialization.
//!
//! This module provides the [`Serializer`], which writes OData values,
//! properties and resource bodies into an [`OutputContext`].
//!
//! ## Overview
//!
//! At every value boundary the serializer asks the context's
//! [`TypeNameOracle`](crate::type_name::TypeNameOracle) whether a type name is
//! needed, then writes in a fixed order:
//!
//! - **Resource header**: `@odata.type`, `@odata.id`, `@odata.etag`, edit and
//!   read links, media links, then custom instance annotations
//! - **Properties**: each preceded by its `@odata.type` and its custom
//!   annotations
//! - **Trailer**: navigation links and advertised operations, written once all
//!   properties are out
//!
//! Control information is filtered by metadata level. Full metadata writes
//! explicit values and fills gaps from [`ConventionMetadata`]; minimal
//! metadata writes only explicit values the conventions would not reproduce;
//! no-metadata writes none of it.
//!
//! ## Usage
//!
//! ```rust
//! use odata_json_light::edm::Model;
//! use odata_json_light::{JsonLightOptions, OutputContext, Serializer, Value};
//!
//! let mut ctx = OutputContext::new(Model::empty(), JsonLightOptions::minimal());
//! let mut ser = Serializer::new(&mut ctx);
//! ser.write_value("Small", &Value::from(7i16), None).unwrap();
//! drop(ser);
//!
//! assert_eq!(ctx.output(), "7");
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::context::OutputContext;
use crate::edm::{EdmModel, EdmTypeRef, PropertyKind};
use crate::metadata::ConventionMetadata;
use crate::primitive::format_primitive;
use crate::type_name::TypeNameOracle;
use crate::vocabulary::{self, to_wire_type_name};
use crate::{
    CollectionValue, Error, InstanceAnnotation, JsonLightOptions, MetadataLevel, Operation, Property, Resource,
    Result, StreamReference, Value,
};

/// The JSON Light value serializer.
///
/// Borrows an [`OutputContext`] and appends to its buffer.
pub struct Serializer<'c> {
    pub(crate) ctx: &'c mut OutputContext,
    model: Arc<dyn EdmModel>,
    oracle: TypeNameOracle,
    options: JsonLightOptions,
}

impl<'c> Serializer<'c> {
    pub fn new(ctx: &'c mut OutputContext) -> Self {
        Serializer {
            model: ctx.shared_model(),
            oracle: ctx.oracle(),
            options: ctx.options().clone(),
            ctx,
        }
    }

    fn level(&self) -> MetadataLevel {
        self.options.metadata_level
    }

    pub(crate) fn model(&self) -> &dyn EdmModel {
        &*self.model
    }

    pub(crate) fn write_annotation_string(&mut self, local: &str, value: &str) -> Result<()> {
        self.ctx.write_annotation_string(local, value)
    }

    fn write_property_annotation_string(&mut self, property: &str, local: &str, value: &str) -> Result<()> {
        let name = self.ctx.property_annotation_name(property, local);
        self.ctx.emitter.property(&name)?;
        self.ctx.emitter.string(value)
    }

    /// Declared type of a property, navigation properties included.
    pub(crate) fn declared_type(&self, owner: Option<&str>, property: &str) -> Option<EdmTypeRef> {
        let declared = self.model.find_property(owner?, property)?;
        Some(match &declared.kind {
            PropertyKind::Structural(type_ref) => type_ref.clone(),
            PropertyKind::Navigation { target, collection: true } => {
                EdmTypeRef::collection(EdmTypeRef::entity(target))
            }
            PropertyKind::Navigation { target, .. } => EdmTypeRef::entity(target),
        })
    }

    /// Writes one JSON value, without any annotation of its own.
    ///
    /// `name` identifies the value in error messages.
    pub fn write_value(&mut self, name: &str, value: &Value, declared: Option<&EdmTypeRef>) -> Result<()> {
        match value {
            Value::Null => {
                if declared.map_or(false, |d| !d.nullable) {
                    return Err(Error::NullValueForNonNullable(name.to_string()));
                }
                self.ctx.emitter.null()?;
            }
            Value::Primitive(p) => {
                if let Some(kind) = declared.and_then(EdmTypeRef::as_primitive) {
                    if !p.kind().can_convert_to(kind) {
                        return Err(Error::type_conflict(name, kind.full_name(), p.kind().full_name()));
                    }
                }
                let scalar = format_primitive(p, self.options.ieee754_compatible)?;
                self.ctx.emitter.scalar(&scalar)?;
            }
            Value::Enum(e) => self.ctx.emitter.string(&e.value)?,
            Value::Resource(resource) => {
                let expected = declared.and_then(EdmTypeRef::structured_name);
                self.write_resource_object(resource, expected)?;
            }
            Value::Collection(collection) => self.write_collection_items(name, collection, declared)?,
            Value::Stream(_) => {
                return Err(Error::custom(format!(
                    "stream property '{}' has no inline value",
                    name
                )))
            }
            Value::Untyped(raw) => self.ctx.emitter.raw(raw.raw())?,
        }
        Ok(())
    }

    fn write_collection_items(&mut self, name: &str, collection: &CollectionValue, declared: Option<&EdmTypeRef>) -> Result<()> {
        if collection.item_shape().is_none() {
            return Err(Error::MixedCollection(name.to_string()));
        }
        let resolved = match declared {
            Some(declared) => Some(declared.clone()),
            None => collection
                .type_name
                .as_deref()
                .and_then(|t| self.model.resolve_type(t)),
        };
        let item = resolved.as_ref().and_then(EdmTypeRef::collection_item).cloned();

        self.ctx.emitter.start_array()?;
        for value in &collection.items {
            self.write_value(name, value, item.as_ref())?;
        }
        self.ctx.emitter.end_array()?;
        Ok(())
    }

    /// Writes the type name annotation a value needs, if any.
    ///
    /// Resources carry their type inside their own object and are skipped here.
    fn write_value_type(&mut self, target: &str, property: &Property, declared: Option<&EdmTypeRef>) -> Result<()> {
        if let Value::Collection(collection) = &property.value {
            let determinable = collection.type_name.is_some()
                || collection.type_annotation.as_ref().map_or(false, |a| a.type_name.is_some())
                || property.type_annotation.as_ref().map_or(false, |a| a.type_name.is_some())
                || declared.is_some();
            if !determinable && self.level() != MetadataLevel::None {
                return Err(Error::MissingTypeName(property.name.clone()));
            }
        }
        if matches!(property.value, Value::Resource(_) | Value::Null | Value::Stream(_)) {
            return Ok(());
        }
        let type_name = self
            .oracle
            .value_type_name(&property.value, property.type_annotation.as_ref(), declared);
        if let Some(type_name) = type_name {
            trace!(property = %property.name, %type_name, "writing value type name");
            self.write_property_annotation_string(target, vocabulary::TYPE, &to_wire_type_name(&type_name))?;
        }
        Ok(())
    }

    /// Writes a property: its type name, its custom annotations, then its value.
    pub fn write_property(&mut self, owner: Option<&str>, property: &Property) -> Result<()> {
        let declared = self.declared_type(owner, &property.name);
        if let Value::Stream(stream) = &property.value {
            self.write_instance_annotations(Some(&property.name), &property.instance_annotations)?;
            return self.write_stream_links(&property.name, stream, None);
        }
        self.write_value_type(&property.name, property, declared.as_ref())?;
        self.write_instance_annotations(Some(&property.name), &property.instance_annotations)?;
        self.ctx.emitter.property(&property.name)?;
        self.write_value(&property.name, &property.value, declared.as_ref())
    }

    /// Writes custom annotations on the enclosing object, or on `target` when given.
    pub fn write_instance_annotations(&mut self, target: Option<&str>, annotations: &[InstanceAnnotation]) -> Result<()> {
        for annotation in annotations {
            let name = match target {
                Some(target) => format!("{}@{}", target, annotation.name),
                None => format!("@{}", annotation.name),
            };
            let declared = self.model.find_term(&annotation.name).map(|t| t.type_ref.clone());
            if !matches!(annotation.value, Value::Resource(_) | Value::Null) {
                if let Some(type_name) = self.oracle.value_type_name(&annotation.value, None, declared.as_ref()) {
                    self.write_property_annotation_string(&name, vocabulary::TYPE, &to_wire_type_name(&type_name))?;
                }
            }
            self.ctx.emitter.property(&name)?;
            self.write_value(&name, &annotation.value, declared.as_ref())?;
        }
        Ok(())
    }

    /// Writes the link annotations of a stream property.
    fn write_stream_links(&mut self, name: &str, stream: &StreamReference, convention: Option<&str>) -> Result<()> {
        let edit_link = match self.level() {
            MetadataLevel::None => return Ok(()),
            MetadataLevel::Full => stream.edit_link.as_deref().or(convention),
            MetadataLevel::Minimal => stream.edit_link.as_deref().filter(|l| Some(*l) != convention),
        };
        if let Some(link) = edit_link {
            self.write_property_annotation_string(name, vocabulary::MEDIA_EDIT_LINK, link)?;
        }
        if let Some(link) = stream.read_link.as_deref() {
            if self.level() == MetadataLevel::Full || stream.edit_link.as_deref() != Some(link) {
                self.write_property_annotation_string(name, vocabulary::MEDIA_READ_LINK, link)?;
            }
        }
        if let Some(content_type) = stream.content_type.as_deref() {
            self.write_property_annotation_string(name, vocabulary::MEDIA_CONTENT_TYPE, content_type)?;
        }
        if let Some(etag) = stream.etag.as_deref() {
            self.write_property_annotation_string(name, vocabulary::MEDIA_ETAG, etag)?;
        }
        Ok(())
    }

    /// Writes a complete nested resource object with no convention metadata.
    pub fn write_resource_object(&mut self, resource: &Resource, expected: Option<&str>) -> Result<()> {
        self.ctx.emitter.start_object()?;
        self.write_resource_header(resource, expected, None, None)?;
        let written = self.write_properties(resource, expected, None)?;
        self.write_resource_trailer(resource, None, &written)?;
        self.ctx.emitter.end_object()?;
        Ok(())
    }

    /// Writes everything between `{` and the first property.
    pub(crate) fn write_resource_header(
        &mut self,
        resource: &Resource,
        expected: Option<&str>,
        conventions: Option<&ConventionMetadata>,
        context_url: Option<&str>,
    ) -> Result<()> {
        let level = self.level();
        if let Some(context) = context_url.filter(|_| level != MetadataLevel::None) {
            self.write_annotation_string(vocabulary::CONTEXT, context)?;
        }
        if let Some(type_name) = self.oracle.resource_type_name(&*self.model, resource, expected) {
            self.write_annotation_string(vocabulary::TYPE, &to_wire_type_name(&type_name))?;
        }
        if level == MetadataLevel::None {
            return self.write_instance_annotations(None, &resource.instance_annotations);
        }

        let id = pick(level, resource.id.as_deref(), conventions.map(|c| c.id.as_str()));
        if let Some(id) = id {
            self.write_annotation_string(vocabulary::ID, id)?;
        }
        if let Some(etag) = resource.etag.as_deref() {
            self.write_annotation_string(vocabulary::ETAG, etag)?;
        }
        let edit_link = pick(level, resource.edit_link.as_deref(), conventions.map(|c| c.edit_link.as_str()));
        if let Some(link) = edit_link {
            self.write_annotation_string(vocabulary::EDIT_LINK, link)?;
        }
        let effective_edit = resource
            .edit_link
            .as_deref()
            .or_else(|| conventions.map(|c| c.edit_link.as_str()));
        if let Some(link) = resource.read_link.as_deref().filter(|l| Some(*l) != effective_edit) {
            self.write_annotation_string(vocabulary::READ_LINK, link)?;
        }

        let media = resource.media_resource.clone().unwrap_or_default();
        let convention_media = conventions.and_then(|c| c.media_edit_link.as_deref());
        if let Some(link) = pick(level, media.edit_link.as_deref(), convention_media) {
            self.write_annotation_string(vocabulary::MEDIA_EDIT_LINK, link)?;
        }
        if let Some(link) = media.read_link.as_deref() {
            self.write_annotation_string(vocabulary::MEDIA_READ_LINK, link)?;
        }
        if let Some(content_type) = media.content_type.as_deref() {
            self.write_annotation_string(vocabulary::MEDIA_CONTENT_TYPE, content_type)?;
        }
        if let Some(etag) = media.etag.as_deref() {
            self.write_annotation_string(vocabulary::MEDIA_ETAG, etag)?;
        }

        self.write_instance_annotations(None, &resource.instance_annotations)
    }

    /// Writes all properties, returning the names of navigation properties written.
    pub(crate) fn write_properties(
        &mut self,
        resource: &Resource,
        expected: Option<&str>,
        conventions: Option<&ConventionMetadata>,
    ) -> Result<Vec<String>> {
        let owner = resource.type_name.as_deref().or(expected);
        let mut navigations = Vec::new();
        for property in &resource.properties {
            let is_navigation = owner
                .and_then(|o| self.model.find_property(o, &property.name))
                .map_or(false, |p| p.is_navigation());
            if is_navigation {
                self.write_navigation_links(&property.name, None, conventions)?;
                navigations.push(property.name.clone());
            }
            if let (Value::Stream(stream), Some(c)) = (&property.value, conventions) {
                let convention = c
                    .stream_links
                    .iter()
                    .find(|(name, _)| *name == property.name)
                    .map(|(_, link)| link.as_str());
                self.write_instance_annotations(Some(&property.name), &property.instance_annotations)?;
                self.write_stream_links(&property.name, stream, convention)?;
                continue;
            }
            self.write_property(owner, property)?;
        }
        Ok(navigations)
    }

    /// Writes the navigation and association links of one navigation property.
    pub(crate) fn write_navigation_links(
        &mut self,
        name: &str,
        explicit: Option<(Option<&str>, Option<&str>)>,
        conventions: Option<&ConventionMetadata>,
    ) -> Result<()> {
        let level = self.level();
        let convention = conventions.and_then(|c| c.navigation(name));
        let (url, association) = explicit.unwrap_or((None, None));
        if let Some(link) = pick(level, association, convention.map(|c| c.association_link_url.as_str())) {
            self.write_property_annotation_string(name, vocabulary::ASSOCIATION_LINK, link)?;
        }
        if let Some(link) = pick(level, url, convention.map(|c| c.url.as_str())) {
            self.write_property_annotation_string(name, vocabulary::NAVIGATION_LINK, link)?;
        }
        Ok(())
    }

    /// Writes what follows the properties: unwritten convention links and operations.
    pub(crate) fn write_resource_trailer(
        &mut self,
        resource: &Resource,
        conventions: Option<&ConventionMetadata>,
        written: &[String],
    ) -> Result<()> {
        let level = self.level();
        if let (MetadataLevel::Full, Some(c)) = (level, conventions) {
            for link in &c.navigation_links {
                if !written.contains(&link.name) && !resource.properties.contains(&link.name) {
                    self.write_navigation_links(&link.name, None, conventions)?;
                }
            }
            for (name, link) in &c.stream_links {
                if !resource.properties.contains(name) {
                    self.write_property_annotation_string(name, vocabulary::MEDIA_EDIT_LINK, link)?;
                }
            }
        }
        if level != MetadataLevel::None {
            self.write_operations(resource, conventions)?;
        }
        Ok(())
    }

    /// Writes actions and functions, grouped by metadata key.
    ///
    /// # Errors
    ///
    /// Within a group of several operations, a missing target yields
    /// [`Error::OperationWithoutTarget`] and a repeated target yields
    /// [`Error::DuplicateOperationTarget`]. Nothing is written for the resource's
    /// operations when either is raised.
    pub(crate) fn write_operations(&mut self, resource: &Resource, conventions: Option<&ConventionMetadata>) -> Result<()> {
        let level = self.level();
        let mut groups: IndexMap<String, Vec<Operation>> = IndexMap::new();
        for operation in resource.actions.iter().chain(&resource.functions) {
            groups.entry(operation.key()).or_default().push(operation.clone());
        }
        if let (MetadataLevel::Full, Some(c)) = (level, conventions) {
            for operation in c.actions.iter().chain(&c.functions) {
                groups.entry(operation.key()).or_insert_with(|| vec![operation.clone()]);
            }
        }
        let computed: IndexMap<String, &Operation> = conventions
            .map(|c| c.actions.iter().chain(&c.functions).map(|op| (op.key(), op)).collect())
            .unwrap_or_default();

        for (key, operations) in &groups {
            if operations.len() < 2 {
                continue;
            }
            let mut seen = Vec::new();
            for operation in operations {
                let target = operation
                    .target
                    .as_deref()
                    .ok_or_else(|| Error::OperationWithoutTarget(key.clone()))?;
                if seen.contains(&target) {
                    return Err(Error::DuplicateOperationTarget {
                        metadata: key.clone(),
                        target: target.to_string(),
                    });
                }
                seen.push(target);
            }
        }

        for (key, operations) in groups {
            let convention = computed.get(&key).copied();
            self.ctx.emitter.property(&key)?;
            if operations.len() > 1 {
                self.ctx.emitter.start_array()?;
            }
            for operation in &operations {
                self.ctx.emitter.start_object()?;
                let title = pick(level, operation.title.as_deref(), convention.and_then(|c| c.title.as_deref()));
                if let Some(title) = title {
                    self.ctx.emitter.property(vocabulary::OPERATION_TITLE)?;
                    self.ctx.emitter.string(title)?;
                }
                let target = pick(level, operation.target.as_deref(), convention.and_then(|c| c.target.as_deref()));
                let target = target.or(operation.target.as_deref().filter(|_| operations.len() > 1));
                if let Some(target) = target {
                    self.ctx.emitter.property(vocabulary::OPERATION_TARGET)?;
                    self.ctx.emitter.string(target)?;
                }
                self.ctx.emitter.end_object()?;
            }
            if operations.len() > 1 {
                self.ctx.emitter.end_array()?;
            }
        }
        Ok(())
    }

    /// The type name a top-level collection carries; `force` writes it even when inferable.
    pub(crate) fn collection_type_name(&self, collection: &CollectionValue, declared: Option<&EdmTypeRef>, force: bool) -> Option<String> {
        if self.level() == MetadataLevel::None {
            return None;
        }
        let value = Value::Collection(collection.clone());
        match self.oracle.value_type_name(&value, None, declared) {
            Some(name) => Some(name),
            None if force => collection
                .type_name
                .clone()
                .or_else(|| declared.map(EdmTypeRef::full_name)),
            None => None,
        }
    }
}

/// Chooses the value of a piece of control information for a metadata level.
///
/// Full metadata writes the explicit value or else the computed one; minimal
/// writes the explicit value only when the conventions would not reproduce it.
fn pick<'a>(level: MetadataLevel, explicit: Option<&'a str>, computed: Option<&'a str>) -> Option<&'a str> {
    match level {
        MetadataLevel::Full => explicit.or(computed),
        MetadataLevel::Minimal => explicit.filter(|e| Some(*e) != computed),
        MetadataLevel::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::{Model, ModelBuilder, PrimitiveKind, StructuredType};
    use crate::{EnumValue, TypeAnnotation};

    fn written(options: JsonLightOptions, f: impl FnOnce(&mut Serializer<'_>) -> Result<()>) -> Result<String> {
        let model = ModelBuilder::new()
            .structured_type(
                StructuredType::entity("NS.Customer")
                    .key("Id")
                    .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                    .property("Small", EdmTypeRef::primitive(PrimitiveKind::Int16)),
            )
            .build();
        let mut ctx = OutputContext::new(model, options);
        f(&mut Serializer::new(&mut ctx))?;
        Ok(ctx.into_string())
    }

    #[test]
    fn test_undeclared_non_finite_double() {
        let out = written(JsonLightOptions::minimal(), |ser| {
            ser.write_property(
                Some("NS.Customer"),
                &Property::new("UndeclaredDoubleProperty", f64::INFINITY),
            )
        })
        .unwrap();
        assert_eq!(
            out,
            r##""UndeclaredDoubleProperty@odata.type":"#Double","UndeclaredDoubleProperty":"INF""##
        );
    }

    #[test]
    fn test_declared_int16_needs_no_type() {
        let out = written(JsonLightOptions::minimal(), |ser| {
            ser.write_property(Some("NS.Customer"), &Property::new("Small", 3i16))
        })
        .unwrap();
        assert_eq!(out, r#""Small":3"#);
    }

    #[test]
    fn test_explicit_annotation_forces_type() {
        let out = written(JsonLightOptions::minimal(), |ser| {
            let property = Property::new("Small", 3i16).with_type_annotation(TypeAnnotation::new("Edm.Int16"));
            ser.write_property(Some("NS.Customer"), &property)
        })
        .unwrap();
        assert_eq!(out, r##""Small@odata.type":"#Int16","Small":3"##);
    }

    #[test]
    fn test_mixed_collection_is_rejected() {
        let err = written(JsonLightOptions::minimal(), |ser| {
            let items = vec![Value::from(1i32), Value::from(Resource::new())];
            let collection = CollectionValue::new(Some("Collection(Edm.Int32)"), items);
            ser.write_property(None, &Property::new("Mixed", collection))
        })
        .unwrap_err();
        assert_eq!(err, Error::MixedCollection("Mixed".into()));
    }

    #[test]
    fn test_open_collection_without_type_name() {
        let err = written(JsonLightOptions::minimal(), |ser| {
            let collection = CollectionValue::new(None, vec![Value::from(1i32)]);
            ser.write_property(Some("NS.Customer"), &Property::new("Open", collection))
        })
        .unwrap_err();
        assert_eq!(err.message_key(), "missing_type_name");
    }

    #[test]
    fn test_duplicate_operation_targets() {
        let resource = Resource::new()
            .with_action(Operation::new("#NS.Rate").with_target("a"))
            .with_function(Operation::new("#NS.Rate").with_target("a"));
        let err = written(JsonLightOptions::full(), |ser| ser.write_operations(&resource, None)).unwrap_err();
        assert_eq!(err.message_key(), "duplicate_operation_target");

        let resource = Resource::new()
            .with_action(Operation::new("#NS.Rate").with_target("a"))
            .with_action(Operation::new("#NS.Rate"));
        let err = written(JsonLightOptions::full(), |ser| ser.write_operations(&resource, None)).unwrap_err();
        assert_eq!(err, Error::OperationWithoutTarget("#NS.Rate".into()));
    }

    #[test]
    fn test_grouped_operations_form_an_array() {
        let resource = Resource::new()
            .with_action(Operation::new("#NS.Rate").with_target("a"))
            .with_action(Operation::new("#NS.Rate").with_target("b"));
        let out = written(JsonLightOptions::full(), |ser| ser.write_operations(&resource, None)).unwrap();
        assert_eq!(out, r##""#NS.Rate":[{"target":"a"},{"target":"b"}]"##);
    }

    #[test]
    fn test_enum_and_null_values() {
        let mut ctx = OutputContext::new(Model::empty(), JsonLightOptions::minimal());
        let mut ser = Serializer::new(&mut ctx);
        ser.write_value("Color", &Value::from(EnumValue::new("NS.Color", "Red")), None).unwrap();
        let declared = EdmTypeRef::primitive(PrimitiveKind::Int32).not_null();
        assert!(ser.write_value("Id", &Value::Null, Some(&declared)).is_err());
        drop(ser);
        assert_eq!(ctx.output(), r#""Red""#);
    }
}
