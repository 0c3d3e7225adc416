//! Caller-driven payload writers.
//!
//! [`ResourceWriter`] writes a top-level resource or resource set through
//! `write_start_*` / `write_end` pairs, [`DeltaWriter`] does the same for a
//! delta payload and adds the delta record kinds, and [`write_property`] and
//! [`write_collection`] write the single-shot top-level payloads.
//!
//! Each writer keeps a stack of open scopes. A call that does not fit the
//! current scope fails with [`Error::InvalidState`]; any failure moves the
//! writer to [`WriterState::Exception`], after which every call fails.
//!
//! ```rust
//! use odata_json_light::edm::Model;
//! use odata_json_light::{JsonLightOptions, NestedResourceInfo, OutputContext, Resource, ResourceWriter};
//!
//! let mut ctx = OutputContext::new(Model::empty(), JsonLightOptions::minimal());
//! let mut writer = ResourceWriter::new(&mut ctx);
//! writer.write_start_resource(&Resource::new().with_property("Id", 1i32)).unwrap();
//! writer.write_start_nested(&NestedResourceInfo::new("Manager").collection(false)).unwrap();
//! writer.write_start_resource(&Resource::new().with_property("Id", 2i32)).unwrap();
//! writer.write_end().unwrap();
//! writer.write_end().unwrap();
//! writer.write_end().unwrap();
//! drop(writer);
//!
//! assert_eq!(ctx.output(), r#"{"Id":1,"Manager":{"Id":2}}"#);
//! ```

use std::io;

use tracing::debug;

use crate::context::OutputContext;
use crate::edm::{EdmTypeRef, PropertyKind};
use crate::metadata::{self, ConventionMetadata, NavigationSource};
use crate::ser::Serializer;
use crate::type_name::TypeNameOracle;
use crate::vocabulary::{self, to_wire_type_name};
use crate::{
    CollectionValue, DeletedEntry, DeltaLink, DeltaResourceSet, EntityReferenceLink, Error, MetadataLevel,
    NestedResourceInfo, Property, Resource, ResourceSet, Result, Value,
};

/// Where a writer stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    Start,
    ResourceSet,
    DeltaResourceSet,
    Resource,
    NestedResourceInfo,
    NestedResourceInfoWithContent,
    Completed,
    Exception,
}

struct ResourceFrame {
    resource: Resource,
    owner: Option<String>,
    conventions: Option<ConventionMetadata>,
    written_navigations: Vec<String>,
}

struct NestedFrame {
    info: NestedResourceInfo,
    target: Option<String>,
    links: Vec<String>,
    has_content: bool,
}

enum Frame {
    Set { expected: Option<String>, set: ResourceSet, top_level: bool },
    DeltaSet(DeltaResourceSet),
    Resource(ResourceFrame),
    Nested(NestedFrame),
}

/// Scope stack shared by the resource and delta writers.
struct WriterCore<'c> {
    ser: Serializer<'c>,
    stack: Vec<Frame>,
    source: Option<NavigationSource>,
    context_url: Option<String>,
    state: WriterState,
}

impl<'c> WriterCore<'c> {
    fn new(ctx: &'c mut OutputContext) -> Self {
        WriterCore {
            ser: Serializer::new(ctx),
            stack: Vec::new(),
            source: None,
            context_url: None,
            state: WriterState::Start,
        }
    }

    fn level(&self) -> MetadataLevel {
        self.ser.ctx.options().metadata_level
    }

    fn run<T>(&mut self, operation: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if matches!(self.state, WriterState::Exception | WriterState::Completed) {
            return Err(Error::invalid_state(operation, self.state));
        }
        let result = f(self);
        self.state = match &result {
            Err(_) => WriterState::Exception,
            Ok(_) => self.current_state(),
        };
        debug!(operation, state = ?self.state, "writer transition");
        result
    }

    fn current_state(&self) -> WriterState {
        match self.stack.last() {
            None => WriterState::Completed,
            Some(Frame::Set { .. }) => WriterState::ResourceSet,
            Some(Frame::DeltaSet(_)) => WriterState::DeltaResourceSet,
            Some(Frame::Resource(_)) => WriterState::Resource,
            Some(Frame::Nested(n)) if n.has_content || !n.links.is_empty() => WriterState::NestedResourceInfoWithContent,
            Some(Frame::Nested(_)) => WriterState::NestedResourceInfo,
        }
    }

    fn entity_set_type(&self) -> Option<String> {
        let source = self.source.as_ref()?;
        self.ser
            .model()
            .find_entity_set(&source.entity_set)
            .map(|set| set.entity_type.clone())
    }

    fn conventions_for(&self, resource: &Resource) -> Option<ConventionMetadata> {
        if self.level() == MetadataLevel::None {
            return None;
        }
        metadata::compute(self.ser.model(), self.source.as_ref()?, resource)
    }

    fn write_context(&mut self, computed: Option<String>) -> Result<()> {
        if self.level() == MetadataLevel::None {
            return Ok(());
        }
        match self.context_url.clone().or(computed) {
            Some(url) => self.ser.write_annotation_string(vocabulary::CONTEXT, &url),
            None => Ok(()),
        }
    }

    fn start_resource_set(&mut self, set: &ResourceSet) -> Result<()> {
        match self.stack.last_mut() {
            None if self.state == WriterState::Start => {
                let emitter = &mut self.ser.ctx.emitter;
                emitter.start_object()?;
                let context = self.source.as_ref().map(NavigationSource::context_url);
                self.write_context(context)?;
                if self.level() != MetadataLevel::None {
                    if let Some(type_name) = set.type_annotation.as_ref().and_then(|a| a.type_name.as_deref()) {
                        self.ser.write_annotation_string(vocabulary::TYPE, &to_wire_type_name(type_name))?;
                    }
                }
                if let Some(count) = set.count {
                    let name = self.ser.ctx.annotation_name(vocabulary::COUNT);
                    self.ser.ctx.emitter.property(&name)?;
                    self.ser.ctx.emitter.number(&count.to_string())?;
                }
                self.ser.write_instance_annotations(None, &set.instance_annotations)?;
                self.ser.ctx.emitter.property(vocabulary::VALUE)?;
                self.ser.ctx.emitter.start_array()?;
                let expected = self.entity_set_type();
                self.stack.push(Frame::Set {
                    expected,
                    set: set.clone(),
                    top_level: true,
                });
                Ok(())
            }
            Some(Frame::Nested(nested)) if !nested.has_content => {
                nested.has_content = true;
                let name = nested.info.name.clone();
                let expected = nested.target.clone();
                let count = set.count.filter(|_| nested.info.count.is_none());
                if let Some(count) = count {
                    let annotation = self.ser.ctx.property_annotation_name(&name, vocabulary::COUNT);
                    self.ser.ctx.emitter.property(&annotation)?;
                    self.ser.ctx.emitter.number(&count.to_string())?;
                }
                if let Some(link) = set.next_link.as_deref() {
                    let annotation = self.ser.ctx.property_annotation_name(&name, vocabulary::NEXT_LINK);
                    self.ser.ctx.emitter.property(&annotation)?;
                    self.ser.ctx.emitter.string(link)?;
                }
                self.ser.ctx.emitter.property(&name)?;
                self.ser.ctx.emitter.start_array()?;
                self.stack.push(Frame::Set {
                    expected,
                    set: set.clone(),
                    top_level: false,
                });
                Ok(())
            }
            _ => Err(Error::invalid_state("write_start_resource_set", self.state)),
        }
    }

    fn start_resource(&mut self, resource: &Resource) -> Result<()> {
        let (expected, conventions, context) = match self.stack.last_mut() {
            None if self.state == WriterState::Start => {
                let expected = self.entity_set_type();
                let context = self
                    .context_url
                    .clone()
                    .or_else(|| self.source.as_ref().map(NavigationSource::entity_context_url));
                (expected, self.conventions_for(resource), context)
            }
            Some(Frame::Set { expected, top_level, .. }) => {
                let (expected, top_level) = (expected.clone(), *top_level);
                let conventions = if top_level { self.conventions_for(resource) } else { None };
                (expected, conventions, None)
            }
            Some(Frame::DeltaSet(_)) => (self.entity_set_type(), self.conventions_for(resource), None),
            Some(Frame::Nested(nested)) if !nested.has_content && nested.info.is_collection != Some(true) => {
                nested.has_content = true;
                let name = nested.info.name.clone();
                let expected = nested.target.clone();
                self.ser.ctx.emitter.property(&name)?;
                (expected, None, None)
            }
            _ => return Err(Error::invalid_state("write_start_resource", self.state)),
        };
        let context = context.filter(|_| self.level() != MetadataLevel::None);

        self.ser.ctx.emitter.start_object()?;
        self.ser
            .write_resource_header(resource, expected.as_deref(), conventions.as_ref(), context.as_deref())?;
        let written = self
            .ser
            .write_properties(resource, expected.as_deref(), conventions.as_ref())?;
        let owner = resource.type_name.clone().or(expected);
        self.stack.push(Frame::Resource(ResourceFrame {
            resource: resource.clone(),
            owner,
            conventions,
            written_navigations: written,
        }));
        Ok(())
    }

    fn start_nested(&mut self, info: &NestedResourceInfo) -> Result<()> {
        let frame = match self.stack.last_mut() {
            Some(Frame::Resource(frame)) => frame,
            _ => return Err(Error::invalid_state("write_start_nested", self.state)),
        };
        if frame.written_navigations.contains(&info.name) || frame.resource.properties.contains(&info.name) {
            return Err(Error::DuplicateProperty(info.name.clone()));
        }
        frame.written_navigations.push(info.name.clone());

        let declared = frame
            .owner
            .as_deref()
            .and_then(|owner| self.ser.model().find_property(owner, &info.name))
            .map(|p| p.kind.clone());
        let (target, collection) = match declared {
            Some(PropertyKind::Navigation { target, collection }) => (Some(target), Some(collection)),
            _ => (None, None),
        };
        let mut info = info.clone();
        info.is_collection = info.is_collection.or(collection);

        let explicit = Some((info.url.as_deref(), info.association_link_url.as_deref()));
        self.ser
            .write_navigation_links(&info.name, explicit, frame.conventions.as_ref())?;
        if let Some(count) = info.count.filter(|_| self.ser.ctx.options().metadata_level != MetadataLevel::None) {
            let annotation = self.ser.ctx.property_annotation_name(&info.name, vocabulary::COUNT);
            self.ser.ctx.emitter.property(&annotation)?;
            self.ser.ctx.emitter.number(&count.to_string())?;
        }
        self.stack.push(Frame::Nested(NestedFrame {
            info,
            target,
            links: Vec::new(),
            has_content: false,
        }));
        Ok(())
    }

    fn entity_reference_link(&mut self, link: &EntityReferenceLink) -> Result<()> {
        let nested = match self.stack.last_mut() {
            Some(Frame::Nested(nested)) if !nested.has_content => nested,
            _ => return Err(Error::invalid_state("write_entity_reference_link", self.state)),
        };
        let url = link.url.as_deref().ok_or(Error::MissingEntityReferenceUrl)?;
        if nested.info.is_collection == Some(false) && !nested.links.is_empty() {
            return Err(Error::invalid_state("write_entity_reference_link", self.state));
        }
        nested.links.push(url.to_string());
        Ok(())
    }

    fn null_resource(&mut self) -> Result<()> {
        match self.stack.last_mut() {
            Some(Frame::Nested(nested))
                if !nested.has_content && nested.links.is_empty() && nested.info.is_collection != Some(true) =>
            {
                nested.has_content = true;
                let name = nested.info.name.clone();
                self.ser.ctx.emitter.property(&name)?;
                self.ser.ctx.emitter.null()?;
                Ok(())
            }
            _ => Err(Error::invalid_state("write_null_resource", self.state)),
        }
    }

    fn end(&mut self) -> Result<()> {
        let frame = match self.stack.pop() {
            Some(frame) => frame,
            None => return Err(Error::invalid_state("write_end", self.state)),
        };
        match frame {
            Frame::Resource(frame) => {
                self.ser.write_resource_trailer(
                    &frame.resource,
                    frame.conventions.as_ref(),
                    &frame.written_navigations,
                )?;
                self.ser.ctx.emitter.end_object()?;
            }
            Frame::Set { set, top_level, .. } => {
                self.ser.ctx.emitter.end_array()?;
                if top_level {
                    self.write_set_trailer(set.next_link.as_deref(), set.delta_link.as_deref())?;
                }
            }
            Frame::DeltaSet(set) => {
                self.ser.ctx.emitter.end_array()?;
                self.write_set_trailer(set.next_link.as_deref(), set.delta_link.as_deref())?;
            }
            Frame::Nested(nested) => {
                if !nested.links.is_empty() {
                    let name = self.ser.ctx.property_annotation_name(&nested.info.name, vocabulary::BIND);
                    self.ser.ctx.emitter.property(&name)?;
                    if nested.info.is_collection == Some(true) || nested.links.len() > 1 {
                        self.ser.ctx.emitter.start_array()?;
                        for url in &nested.links {
                            self.ser.ctx.emitter.string(url)?;
                        }
                        self.ser.ctx.emitter.end_array()?;
                    } else {
                        self.ser.ctx.emitter.string(&nested.links[0])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_set_trailer(&mut self, next_link: Option<&str>, delta_link: Option<&str>) -> Result<()> {
        if let Some(link) = next_link {
            self.ser.write_annotation_string(vocabulary::NEXT_LINK, link)?;
        }
        if let Some(link) = delta_link {
            self.ser.write_annotation_string(vocabulary::DELTA_LINK, link)?;
        }
        self.ser.ctx.emitter.end_object()
    }
}

/// Writes a top-level resource or resource set.
pub struct ResourceWriter<'c> {
    core: WriterCore<'c>,
}

impl<'c> ResourceWriter<'c> {
    pub fn new(ctx: &'c mut OutputContext) -> Self {
        ResourceWriter {
            core: WriterCore::new(ctx),
        }
    }

    /// Sets the entity set being written, which enables convention metadata
    /// and a computed context URL.
    #[must_use]
    pub fn with_navigation_source(mut self, source: NavigationSource) -> Self {
        self.core.source = Some(source);
        self
    }

    /// Sets the context URL written at the top of the payload.
    #[must_use]
    pub fn with_context_url(mut self, url: &str) -> Self {
        self.core.context_url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn state(&self) -> WriterState {
        self.core.state
    }

    pub fn write_start_resource_set(&mut self, set: &ResourceSet) -> Result<()> {
        self.core.run("write_start_resource_set", |core| core.start_resource_set(set))
    }

    /// Opens a resource and writes its control information and properties.
    pub fn write_start_resource(&mut self, resource: &Resource) -> Result<()> {
        self.core.run("write_start_resource", |core| core.start_resource(resource))
    }

    /// Opens a navigation property of the current resource.
    pub fn write_start_nested(&mut self, info: &NestedResourceInfo) -> Result<()> {
        self.core.run("write_start_nested", |core| core.start_nested(info))
    }

    /// Adds an entity reference to the current navigation property.
    ///
    /// References are written as `Nav@odata.bind` when the navigation property closes.
    pub fn write_entity_reference_link(&mut self, link: &EntityReferenceLink) -> Result<()> {
        self.core.run("write_entity_reference_link", |core| core.entity_reference_link(link))
    }

    /// Writes a `null` expansion of a single-valued navigation property.
    pub fn write_null_resource(&mut self) -> Result<()> {
        self.core.run("write_null_resource", WriterCore::null_resource)
    }

    /// Closes the innermost open scope.
    pub fn write_end(&mut self) -> Result<()> {
        self.core.run("write_end", WriterCore::end)
    }

    pub fn flush<W: io::Write>(&mut self, writer: &mut W) -> Result<()> {
        self.core.ser.ctx.flush(writer)
    }

    #[cfg(feature = "tokio")]
    pub async fn flush_async<W>(&mut self, writer: &mut W) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        self.core.ser.ctx.flush_async(writer).await
    }
}

/// Writes a delta payload.
///
/// Deleted entries and links are written in the 4.0 shape, each with a context
/// URL naming its record kind.
pub struct DeltaWriter<'c> {
    core: WriterCore<'c>,
}

impl<'c> DeltaWriter<'c> {
    pub fn new(ctx: &'c mut OutputContext) -> Self {
        DeltaWriter {
            core: WriterCore::new(ctx),
        }
    }

    #[must_use]
    pub fn with_navigation_source(mut self, source: NavigationSource) -> Self {
        self.core.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_context_url(mut self, url: &str) -> Self {
        self.core.context_url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn state(&self) -> WriterState {
        self.core.state
    }

    pub fn write_start(&mut self, set: &DeltaResourceSet) -> Result<()> {
        self.core.run("write_start", |core| {
            if core.state != WriterState::Start {
                return Err(Error::invalid_state("write_start", core.state));
            }
            core.ser.ctx.emitter.start_object()?;
            let context = core.source.as_ref().map(|s| {
                vocabulary::delta_context_url(Some(&s.service_root), Some(&s.entity_set), vocabulary::DELTA_SUFFIX)
            });
            core.write_context(context)?;
            if let Some(count) = set.count {
                let name = core.ser.ctx.annotation_name(vocabulary::COUNT);
                core.ser.ctx.emitter.property(&name)?;
                core.ser.ctx.emitter.number(&count.to_string())?;
            }
            core.ser.write_instance_annotations(None, &set.instance_annotations)?;
            core.ser.ctx.emitter.property(vocabulary::VALUE)?;
            core.ser.ctx.emitter.start_array()?;
            core.stack.push(Frame::DeltaSet(set.clone()));
            Ok(())
        })
    }

    pub fn write_start_resource(&mut self, resource: &Resource) -> Result<()> {
        self.core.run("write_start_resource", |core| core.start_resource(resource))
    }

    pub fn write_start_nested(&mut self, info: &NestedResourceInfo) -> Result<()> {
        self.core.run("write_start_nested", |core| core.start_nested(info))
    }

    pub fn write_start_resource_set(&mut self, set: &ResourceSet) -> Result<()> {
        self.core.run("write_start_resource_set", |core| {
            if !matches!(core.stack.last(), Some(Frame::Nested(_))) {
                return Err(Error::invalid_state("write_start_resource_set", core.state));
            }
            core.start_resource_set(set)
        })
    }

    pub fn write_entity_reference_link(&mut self, link: &EntityReferenceLink) -> Result<()> {
        self.core.run("write_entity_reference_link", |core| core.entity_reference_link(link))
    }

    pub fn write_deleted_entry(&mut self, entry: &DeletedEntry) -> Result<()> {
        self.core.run("write_deleted_entry", |core| {
            core.delta_record_start(vocabulary::DELETED_ENTITY_SUFFIX)?;
            let emitter = &mut core.ser.ctx.emitter;
            emitter.property(vocabulary::DELTA_ID)?;
            emitter.string(&entry.id)?;
            emitter.property(vocabulary::DELTA_REASON)?;
            emitter.string(entry.reason.as_str())?;
            emitter.end_object()?;
            Ok(())
        })
    }

    pub fn write_delta_link(&mut self, link: &DeltaLink) -> Result<()> {
        self.core.run("write_delta_link", |core| core.delta_link(vocabulary::LINK_SUFFIX, link))
    }

    pub fn write_deleted_link(&mut self, link: &DeltaLink) -> Result<()> {
        self.core
            .run("write_deleted_link", |core| core.delta_link(vocabulary::DELETED_LINK_SUFFIX, link))
    }

    pub fn write_end(&mut self) -> Result<()> {
        self.core.run("write_end", WriterCore::end)
    }

    pub fn flush<W: io::Write>(&mut self, writer: &mut W) -> Result<()> {
        self.core.ser.ctx.flush(writer)
    }

    #[cfg(feature = "tokio")]
    pub async fn flush_async<W>(&mut self, writer: &mut W) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        self.core.ser.ctx.flush_async(writer).await
    }
}

impl<'c> WriterCore<'c> {
    /// Opens a deleted entry or link object with its record context URL.
    fn delta_record_start(&mut self, suffix: &str) -> Result<()> {
        if !matches!(self.stack.last(), Some(Frame::DeltaSet(_))) {
            return Err(Error::invalid_state("write_delta_record", self.state));
        }
        let source = self.source.as_ref();
        let context = vocabulary::delta_context_url(
            source.map(|s| s.service_root.as_str()),
            source.map(|s| s.entity_set.as_str()),
            suffix,
        );
        self.ser.ctx.emitter.start_object()?;
        self.ser.write_annotation_string(vocabulary::CONTEXT, &context)?;
        Ok(())
    }

    fn delta_link(&mut self, suffix: &str, link: &DeltaLink) -> Result<()> {
        self.delta_record_start(suffix)?;
        let emitter = &mut self.ser.ctx.emitter;
        emitter.property(vocabulary::DELTA_SOURCE)?;
        emitter.string(&link.source)?;
        emitter.property(vocabulary::DELTA_RELATIONSHIP)?;
        emitter.string(&link.relationship)?;
        emitter.property(vocabulary::DELTA_TARGET)?;
        emitter.string(&link.target)?;
        emitter.end_object()?;
        Ok(())
    }
}

/// Writes a top-level property payload.
///
/// A complex value is written inline as the payload object; anything else is
/// wrapped in a `value` member.
///
/// # Errors
///
/// A collection whose type name cannot be determined from the value, its
/// annotation or `declared` fails with [`Error::MissingTypeName`].
pub fn write_property(
    ctx: &mut OutputContext,
    context_url: Option<&str>,
    property: &Property,
    declared: Option<&EdmTypeRef>,
) -> Result<()> {
    let mut ser = Serializer::new(ctx);
    let level = ser.ctx.options().metadata_level;
    let context_url = context_url.filter(|_| level != MetadataLevel::None);

    if let Value::Resource(resource) = &property.value {
        let expected = declared.and_then(EdmTypeRef::structured_name);
        ser.ctx.emitter.start_object()?;
        ser.write_resource_header(resource, expected, None, context_url)?;
        let written = ser.write_properties(resource, expected, None)?;
        ser.write_resource_trailer(resource, None, &written)?;
        ser.ctx.emitter.end_object()?;
        return Ok(());
    }

    let type_name = match &property.value {
        Value::Collection(collection) => {
            let annotated = property.type_annotation.as_ref().and_then(|a| a.type_name.clone());
            top_level_collection_type(&ser, collection, declared, context_url.is_none())?.or(annotated)
        }
        Value::Stream(_) => {
            return Err(Error::custom(format!(
                "stream property '{}' cannot be written as a top-level property",
                property.name
            )))
        }
        Value::Null | Value::Untyped(_) => None,
        value => {
            if level == MetadataLevel::None {
                None
            } else {
                TypeNameOracle::for_level(level).value_type_name(
                    value,
                    property.type_annotation.as_ref(),
                    declared,
                )
            }
        }
    };

    ser.ctx.emitter.start_object()?;
    if let Some(context) = context_url {
        ser.write_annotation_string(vocabulary::CONTEXT, context)?;
    }
    if let Some(type_name) = type_name {
        ser.write_annotation_string(vocabulary::TYPE, &to_wire_type_name(&type_name))?;
    }
    ser.write_instance_annotations(None, &property.instance_annotations)?;
    ser.ctx.emitter.property(vocabulary::VALUE)?;
    ser.write_value(&property.name, &property.value, declared)?;
    ser.ctx.emitter.end_object()?;
    Ok(())
}

/// Writes a top-level collection payload: `{"value":[...]}`.
pub fn write_collection(
    ctx: &mut OutputContext,
    context_url: Option<&str>,
    collection: &CollectionValue,
    item_type: Option<&EdmTypeRef>,
) -> Result<()> {
    let mut ser = Serializer::new(ctx);
    let level = ser.ctx.options().metadata_level;
    let context_url = context_url.filter(|_| level != MetadataLevel::None);
    let declared = item_type.map(|item| EdmTypeRef::collection(item.clone()));
    let type_name = top_level_collection_type(&ser, collection, declared.as_ref(), context_url.is_none())?;

    ser.ctx.emitter.start_object()?;
    if let Some(context) = context_url {
        ser.write_annotation_string(vocabulary::CONTEXT, context)?;
    }
    if let Some(type_name) = type_name {
        ser.write_annotation_string(vocabulary::TYPE, &to_wire_type_name(&type_name))?;
    }
    ser.ctx.emitter.property(vocabulary::VALUE)?;
    ser.write_value(vocabulary::VALUE, &Value::Collection(collection.clone()), declared.as_ref())?;
    ser.ctx.emitter.end_object()?;
    Ok(())
}

/// Type name of a top-level collection.
///
/// Requests carry no context URL, so there the type name is written even when
/// the declared type would make it inferable.
fn top_level_collection_type(
    ser: &Serializer<'_>,
    collection: &CollectionValue,
    declared: Option<&EdmTypeRef>,
    no_context: bool,
) -> Result<Option<String>> {
    let options = ser.ctx.options();
    let determinable = collection.type_name.is_some()
        || collection.type_annotation.as_ref().map_or(false, |a| a.type_name.is_some())
        || declared.is_some();
    if !determinable && options.metadata_level != MetadataLevel::None {
        return Err(Error::MissingTypeName(vocabulary::VALUE.to_string()));
    }
    let force = options.is_request() && no_context;
    Ok(ser.collection_type_name(collection, declared, force))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::{EdmModel, Model, ModelBuilder, PrimitiveKind, StructuredType};
    use crate::{JsonLightOptions, MessageKind, Operation};
    use std::sync::Arc;

    fn model() -> Arc<dyn EdmModel> {
        ModelBuilder::new()
            .structured_type(
                StructuredType::entity("NS.Customer")
                    .key("Id")
                    .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                    .navigation("Orders", "NS.Order", true)
                    .navigation("Manager", "NS.Customer", false),
            )
            .structured_type(
                StructuredType::entity("NS.Order")
                    .key("Id")
                    .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null()),
            )
            .entity_set("Customers", "NS.Customer")
            .build()
    }

    #[test]
    fn test_full_metadata_conventions() {
        let mut ctx = OutputContext::new(model(), JsonLightOptions::full());
        let mut writer =
            ResourceWriter::new(&mut ctx).with_navigation_source(NavigationSource::new("http://host/", "Customers"));
        writer
            .write_start_resource(&Resource::of_type("NS.Customer").with_property("Id", 1i32))
            .unwrap();
        writer.write_end().unwrap();
        assert_eq!(writer.state(), WriterState::Completed);
        drop(writer);

        assert_eq!(
            ctx.output(),
            concat!(
                r##"{"@odata.context":"http://host/$metadata#Customers/$entity","##,
                r##""@odata.type":"#NS.Customer","@odata.id":"http://host/Customers(1)","##,
                r##""@odata.editLink":"http://host/Customers(1)","Id":1,"##,
                r##""Orders@odata.associationLink":"http://host/Customers(1)/Orders/$ref","##,
                r##""Orders@odata.navigationLink":"http://host/Customers(1)/Orders","##,
                r##""Manager@odata.associationLink":"http://host/Customers(1)/Manager/$ref","##,
                r##""Manager@odata.navigationLink":"http://host/Customers(1)/Manager"}"##
            )
        );
    }

    #[test]
    fn test_minimal_drops_convention_values() {
        let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
        let mut writer =
            ResourceWriter::new(&mut ctx).with_navigation_source(NavigationSource::new("http://host/", "Customers"));
        let customer = Resource::of_type("NS.Customer")
            .with_id("http://host/Customers(1)")
            .with_etag("W/\"1\"")
            .with_property("Id", 1i32);
        writer.write_start_resource(&customer).unwrap();
        writer.write_end().unwrap();
        drop(writer);

        assert_eq!(
            ctx.output(),
            r#"{"@odata.context":"http://host/$metadata#Customers/$entity","@odata.etag":"W/\"1\"","Id":1}"#
        );
    }

    #[test]
    fn test_bind_links_in_request() {
        let options = JsonLightOptions::minimal().with_message_kind(MessageKind::Request);
        let mut ctx = OutputContext::new(model(), options);
        let mut writer = ResourceWriter::new(&mut ctx);
        writer
            .write_start_resource(&Resource::of_type("NS.Customer").with_property("Id", 5i32))
            .unwrap();
        writer.write_start_nested(&NestedResourceInfo::new("Orders")).unwrap();
        writer
            .write_entity_reference_link(&EntityReferenceLink::new("Orders(1)"))
            .unwrap();
        writer.write_end().unwrap();
        writer.write_end().unwrap();
        drop(writer);

        assert_eq!(ctx.output(), r#"{"Id":5,"Orders@odata.bind":["Orders(1)"]}"#);
    }

    #[test]
    fn test_reference_link_without_url() {
        let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
        let mut writer = ResourceWriter::new(&mut ctx);
        writer.write_start_resource(&Resource::of_type("NS.Customer")).unwrap();
        writer.write_start_nested(&NestedResourceInfo::new("Manager")).unwrap();
        let err = writer
            .write_entity_reference_link(&EntityReferenceLink::default())
            .unwrap_err();
        assert_eq!(err, Error::MissingEntityReferenceUrl);
        assert_eq!(writer.state(), WriterState::Exception);
        assert_eq!(writer.write_end().unwrap_err().message_key(), "invalid_state");
    }

    #[test]
    fn test_nested_set_and_null_expansion() {
        let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
        let mut writer = ResourceWriter::new(&mut ctx);
        writer.write_start_resource(&Resource::of_type("NS.Customer")).unwrap();
        writer.write_start_nested(&NestedResourceInfo::new("Orders")).unwrap();
        writer.write_start_resource_set(&ResourceSet::new().with_count(1)).unwrap();
        writer
            .write_start_resource(&Resource::new().with_property("Id", 7i32))
            .unwrap();
        writer.write_end().unwrap();
        writer.write_end().unwrap();
        writer.write_end().unwrap();
        writer.write_start_nested(&NestedResourceInfo::new("Manager")).unwrap();
        writer.write_null_resource().unwrap();
        writer.write_end().unwrap();
        writer.write_end().unwrap();
        drop(writer);

        assert_eq!(
            ctx.output(),
            r#"{"Orders@odata.count":1,"Orders":[{"Id":7}],"Manager":null}"#
        );
    }

    #[test]
    fn test_operations_after_properties() {
        let mut ctx = OutputContext::new(Model::empty(), JsonLightOptions::full());
        let mut writer = ResourceWriter::new(&mut ctx);
        let resource = Resource::new()
            .with_action(Operation::new("#NS.Rate").with_title("Rate"))
            .with_property("Name", "x");
        writer.write_start_resource(&resource).unwrap();
        writer.write_end().unwrap();
        drop(writer);
        assert_eq!(ctx.output(), r##"{"Name":"x","#NS.Rate":{"title":"Rate"}}"##);
    }

    #[test]
    fn test_top_level_property_and_collection() {
        let mut ctx = OutputContext::new(Model::empty(), JsonLightOptions::minimal());
        write_property(&mut ctx, Some("$metadata#Edm.Int16"), &Property::new("Small", 3i16), None).unwrap();
        assert_eq!(
            ctx.output(),
            r##"{"@odata.context":"$metadata#Edm.Int16","@odata.type":"#Int16","value":3}"##
        );

        let mut ctx = OutputContext::new(Model::empty(), JsonLightOptions::minimal());
        let err = write_collection(&mut ctx, None, &CollectionValue::new(None, vec![]), None).unwrap_err();
        assert_eq!(err.message_key(), "missing_type_name");
    }

    #[test]
    fn test_delta_records() {
        let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
        let mut writer =
            DeltaWriter::new(&mut ctx).with_navigation_source(NavigationSource::new("http://host/", "Customers"));
        writer
            .write_start(&DeltaResourceSet::new().with_delta_link("http://host/Customers?$deltatoken=2"))
            .unwrap();
        writer
            .write_deleted_entry(&DeletedEntry::new("Customers(2)", crate::DeletedReason::Deleted))
            .unwrap();
        writer
            .write_deleted_link(&DeltaLink::new("Customers(1)", "Orders", "Orders(3)"))
            .unwrap();
        writer.write_end().unwrap();
        drop(writer);

        assert_eq!(
            ctx.output(),
            concat!(
                r#"{"@odata.context":"http://host/$metadata#Customers/$delta","value":["#,
                r#"{"@odata.context":"http://host/$metadata#Customers/$deletedEntity","id":"Customers(2)","reason":"deleted"},"#,
                r#"{"@odata.context":"http://host/$metadata#Customers/$deletedLink","source":"Customers(1)","relationship":"Orders","target":"Orders(3)"}"#,
                r#"],"@odata.deltaLink":"http://host/Customers?$deltatoken=2"}"#
            )
        );
    }
}
