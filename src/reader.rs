//! Pull reader for resource and resource set payloads.
//!
//! [`ResourceReader::read`] advances one step at a time and exposes the item
//! reached through [`ResourceReader::item`]. A resource is reported twice:
//! at [`ReaderState::ResourceStart`] with the properties read up to its first
//! navigation property, and at [`ReaderState::ResourceEnd`] complete.
//!
//! Navigation properties appear as a `NestedResourceInfoStart` /
//! `NestedResourceInfoEnd` pair around their content: entity reference links
//! from `@odata.bind` first, then the expanded resource or resource set.
//! Navigation properties described only by annotations come after the
//! resource's last property.
//!
//! ```rust
//! use odata_json_light::edm::Model;
//! use odata_json_light::{InputContext, JsonLightOptions, ReaderItem, ReaderState, ResourceReader};
//!
//! let json = r#"{"value":[{"Name":"Alice"},{"Name":"Bob"}]}"#;
//! let mut ctx = InputContext::from_str(json, Model::empty(), JsonLightOptions::new());
//! let mut reader = ResourceReader::resource_set(&mut ctx, None);
//!
//! let mut names = Vec::new();
//! while reader.read().unwrap() {
//!     if let (ReaderState::ResourceEnd, ReaderItem::Resource(r)) = (reader.state(), reader.item()) {
//!         names.push(r.property("Name").and_then(|v| v.as_str()).unwrap_or_default().to_string());
//!     }
//! }
//! assert_eq!(names, ["Alice", "Bob"]);
//! ```

use std::collections::VecDeque;

use tracing::debug;

use crate::context::InputContext;
use crate::de::{BodyScope, BodyStep, Deserializer, NestedContent, PendingNavigation, ScopeKind, SetHeader};
use crate::edm::{collection_item_name, COLLECTION_PREFIX};
use crate::lexer::{JsonNode, NodeSource};
use crate::metadata::{self, NavigationSource};
use crate::vocabulary;
use crate::{EntityReferenceLink, Error, MetadataLevel, NestedResourceInfo, Resource, ResourceSet, Result};

/// Where a [`ResourceReader`] stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    Start,
    ResourceSetStart,
    ResourceSetEnd,
    ResourceStart,
    ResourceEnd,
    NestedResourceInfoStart,
    NestedResourceInfoEnd,
    EntityReferenceLink,
    Completed,
    Exception,
}

/// The item a reader reached with its last step.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum ReaderItem {
    #[default]
    None,
    ResourceSet(ResourceSet),
    Resource(Resource),
    NestedResourceInfo(NestedResourceInfo),
    EntityReferenceLink(EntityReferenceLink),
}

impl ReaderItem {
    #[must_use]
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            ReaderItem::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_resource_set(&self) -> Option<&ResourceSet> {
        match self {
            ReaderItem::ResourceSet(set) => Some(set),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_nested_resource_info(&self) -> Option<&NestedResourceInfo> {
        match self {
            ReaderItem::NestedResourceInfo(info) => Some(info),
            _ => None,
        }
    }
}

pub(crate) type Step = (ReaderState, ReaderItem);

struct ResourceFrame {
    scope: BodyScope,
    /// The body step read ahead when the resource was reported as started.
    pending: Option<BodyStep>,
    /// Annotation-only navigation properties, known once the object has closed.
    deferred: Option<VecDeque<PendingNavigation>>,
    apply_conventions: bool,
}

struct SetFrame {
    expected: Option<String>,
    header: SetHeader,
    top_level: bool,
}

struct NavigationFrame {
    navigation: PendingNavigation,
    next_link: usize,
    content_done: bool,
}

enum Frame {
    Resource(ResourceFrame),
    Set(SetFrame),
    Navigation(NavigationFrame),
}

enum Action {
    Emit(Step),
    Push(Frame, Step),
    Pop,
}

/// The scope stack below a payload's top level.
///
/// Shared with the delta reader, which pushes each delta resource onto it.
#[derive(Default)]
pub(crate) struct Cursor {
    stack: Vec<Frame>,
    pub source: Option<NavigationSource>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Context URL read in the innermost resource, if any.
    pub fn resource_context(&self) -> Option<String> {
        match self.stack.last() {
            Some(Frame::Resource(frame)) => frame.scope.context.clone(),
            _ => None,
        }
    }

    /// Pushes an opened resource and reports it as started.
    pub fn begin_resource(&mut self, de: &mut Deserializer<'_>, scope: BodyScope, apply_conventions: bool) -> Result<Step> {
        let action = resource_start(de, scope, apply_conventions)?;
        self.apply(de, action)
    }

    /// Pushes a resource set whose `[` has been consumed and reports it as started.
    pub fn begin_set(&mut self, expected: Option<String>, header: SetHeader, top_level: bool) -> Step {
        let item = ReaderItem::ResourceSet(resource_set(&header, expected.as_deref()));
        self.stack.push(Frame::Set(SetFrame {
            expected,
            header,
            top_level,
        }));
        (ReaderState::ResourceSetStart, item)
    }

    /// Advances the innermost scope by one item.
    pub fn step(&mut self, de: &mut Deserializer<'_>) -> Result<Step> {
        let action = match self.stack.last_mut() {
            Some(Frame::Resource(frame)) => resource_action(de, frame)?,
            Some(Frame::Set(frame)) => set_action(de, frame)?,
            Some(Frame::Navigation(frame)) => navigation_action(de, frame)?,
            None => return Err(Error::invalid_state("read", "no open scope")),
        };
        self.apply(de, action)
    }

    fn apply(&mut self, de: &Deserializer<'_>, action: Action) -> Result<Step> {
        match action {
            Action::Emit(step) => Ok(step),
            Action::Push(frame, step) => {
                self.stack.push(frame);
                Ok(step)
            }
            Action::Pop => match self.stack.pop() {
                Some(Frame::Resource(frame)) => {
                    let mut builder = frame.scope.builder;
                    if frame.apply_conventions && de.options().metadata_level != MetadataLevel::None {
                        if let Some(source) = self.source.as_ref() {
                            if let Some(conventions) = metadata::compute(de.model(), source, builder.peek()) {
                                builder.apply_conventions(Some(conventions.id), Some(conventions.edit_link));
                            }
                        }
                    }
                    Ok((ReaderState::ResourceEnd, ReaderItem::Resource(builder.build())))
                }
                Some(Frame::Set(frame)) => {
                    let set = resource_set(&frame.header, frame.expected.as_deref());
                    Ok((ReaderState::ResourceSetEnd, ReaderItem::ResourceSet(set)))
                }
                Some(Frame::Navigation(frame)) => Ok((
                    ReaderState::NestedResourceInfoEnd,
                    ReaderItem::NestedResourceInfo(frame.navigation.info),
                )),
                None => Err(Error::invalid_state("read", "no open scope")),
            },
        }
    }
}

fn resource_start(de: &mut Deserializer<'_>, mut scope: BodyScope, apply_conventions: bool) -> Result<Action> {
    let pending = de.read_body_step(&mut scope)?;
    let snapshot = scope.builder.snapshot();
    let frame = Frame::Resource(ResourceFrame {
        scope,
        pending: Some(pending),
        deferred: None,
        apply_conventions,
    });
    Ok(Action::Push(frame, (ReaderState::ResourceStart, ReaderItem::Resource(snapshot))))
}

fn navigation_start(navigation: PendingNavigation) -> Action {
    let item = ReaderItem::NestedResourceInfo(navigation.info.clone());
    let frame = Frame::Navigation(NavigationFrame {
        navigation,
        next_link: 0,
        content_done: false,
    });
    Action::Push(frame, (ReaderState::NestedResourceInfoStart, item))
}

fn resource_action(de: &mut Deserializer<'_>, frame: &mut ResourceFrame) -> Result<Action> {
    loop {
        if let Some(queue) = frame.deferred.as_mut() {
            return Ok(match queue.pop_front() {
                Some(navigation) => navigation_start(navigation),
                None => Action::Pop,
            });
        }
        let step = match frame.pending.take() {
            Some(step) => step,
            None => de.read_body_step(&mut frame.scope)?,
        };
        match step {
            BodyStep::Navigation(navigation) => return Ok(navigation_start(navigation)),
            BodyStep::End => frame.deferred = Some(de.finish_body(&mut frame.scope)?.into()),
        }
    }
}

fn set_action(de: &mut Deserializer<'_>, frame: &mut SetFrame) -> Result<Action> {
    let next = match de.reader.peek()? {
        JsonNode::EndArray => Some(true),
        JsonNode::StartObject => Some(false),
        _ => None,
    };
    match next {
        Some(true) => {
            de.reader.read()?;
            if frame.top_level && de.read_set_members(&mut frame.header)? {
                return Err(Error::DuplicateProperty(vocabulary::VALUE.to_string()));
            }
            Ok(Action::Pop)
        }
        Some(false) => {
            let kind = if frame.top_level { ScopeKind::SetItem } else { ScopeKind::Nested };
            let scope = de.begin_resource(frame.expected.as_deref(), kind, "")?;
            resource_start(de, scope, frame.top_level)
        }
        None => {
            let found = de.reader.read()?;
            Err(Error::invalid_content_start("StartObject", found))
        }
    }
}

fn navigation_action(de: &mut Deserializer<'_>, frame: &mut NavigationFrame) -> Result<Action> {
    if let Some(url) = frame.navigation.links.get(frame.next_link) {
        frame.next_link += 1;
        let link = EntityReferenceLink::new(url);
        return Ok(Action::Emit((ReaderState::EntityReferenceLink, ReaderItem::EntityReferenceLink(link))));
    }
    if frame.content_done {
        return Ok(Action::Pop);
    }
    frame.content_done = true;

    let info = &frame.navigation.info;
    let target = frame.navigation.target_type.clone();
    match frame.navigation.content {
        NestedContent::Resource => {
            let scope = de.begin_resource(target.as_deref(), ScopeKind::Nested, &info.name)?;
            resource_start(de, scope, false)
        }
        NestedContent::ResourceSet => {
            match de.reader.read()? {
                JsonNode::StartArray => {}
                other => return Err(Error::invalid_content_start("StartArray", other)),
            }
            let header = SetHeader {
                count: info.count,
                next_link: info.next_link.clone(),
                ..SetHeader::default()
            };
            let item = ReaderItem::ResourceSet(resource_set(&header, target.as_deref()));
            let frame = Frame::Set(SetFrame {
                expected: target,
                header,
                top_level: false,
            });
            Ok(Action::Push(frame, (ReaderState::ResourceSetStart, item)))
        }
        NestedContent::Null | NestedContent::Deferred => Ok(Action::Pop),
    }
}

fn resource_set(header: &SetHeader, item_type: Option<&str>) -> ResourceSet {
    let type_name = match header.type_name.as_deref() {
        Some(wire) => Some(vocabulary::from_wire_type_name(wire)),
        None => item_type.map(|t| format!("{}{})", COLLECTION_PREFIX, t)),
    };
    ResourceSet {
        type_name,
        count: header.count,
        next_link: header.next_link.clone(),
        delta_link: header.delta_link.clone(),
        instance_annotations: header.annotations.clone(),
        type_annotation: None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Payload {
    Resource,
    ResourceSet,
}

/// Reads a top-level resource or resource set payload.
pub struct ResourceReader<'c> {
    de: Deserializer<'c>,
    cursor: Cursor,
    payload: Payload,
    expected: Option<String>,
    state: ReaderState,
    item: ReaderItem,
    context_url: Option<String>,
}

impl<'c> ResourceReader<'c> {
    /// A reader for a single top-level resource of type `expected`.
    pub fn resource(ctx: &'c mut InputContext, expected: Option<&str>) -> Self {
        Self::new(ctx, Payload::Resource, expected)
    }

    /// A reader for a top-level resource set whose items are of type `expected`.
    pub fn resource_set(ctx: &'c mut InputContext, expected: Option<&str>) -> Self {
        Self::new(ctx, Payload::ResourceSet, expected)
    }

    fn new(ctx: &'c mut InputContext, payload: Payload, expected: Option<&str>) -> Self {
        ResourceReader {
            de: Deserializer::new(ctx),
            cursor: Cursor::new(),
            payload,
            expected: expected.map(str::to_string),
            state: ReaderState::Start,
            item: ReaderItem::None,
            context_url: None,
        }
    }

    /// Sets the entity set being read.
    ///
    /// Its entity type becomes the expected type when none was given, and ids
    /// and edit links the payload leaves out are computed by convention.
    #[must_use]
    pub fn with_navigation_source(mut self, source: NavigationSource) -> Self {
        self.cursor.source = Some(source);
        self
    }

    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    #[must_use]
    pub fn item(&self) -> &ReaderItem {
        &self.item
    }

    /// The payload's `@odata.context`, once read.
    #[must_use]
    pub fn context_url(&self) -> Option<&str> {
        self.context_url.as_deref()
    }

    /// Advances to the next item; returns `false` once the payload is complete.
    ///
    /// # Errors
    ///
    /// Any error moves the reader to [`ReaderState::Exception`]; every later
    /// call fails with [`Error::InvalidState`].
    pub fn read(&mut self) -> Result<bool> {
        match self.state {
            ReaderState::Completed => return Ok(false),
            ReaderState::Exception => return Err(Error::invalid_state("read", self.state)),
            _ => {}
        }
        match self.advance() {
            Ok((state, item)) => {
                debug!(?state, "reader transition");
                self.state = state;
                self.item = item;
                Ok(state != ReaderState::Completed)
            }
            Err(err) => {
                debug!(error = %err, "reader failed");
                self.state = ReaderState::Exception;
                self.item = ReaderItem::None;
                Err(err)
            }
        }
    }

    /// Async variant of [`read`](Self::read); the input is preloaded, so this never waits.
    #[cfg(feature = "tokio")]
    pub async fn read_async(&mut self) -> Result<bool> {
        self.read()
    }

    fn expected_type(&self) -> Option<String> {
        self.expected.clone().or_else(|| {
            let source = self.cursor.source.as_ref()?;
            self.de
                .model()
                .find_entity_set(&source.entity_set)
                .map(|set| set.entity_type.clone())
        })
    }

    fn advance(&mut self) -> Result<Step> {
        if self.state == ReaderState::Start {
            return self.start();
        }
        if self.cursor.is_empty() {
            self.de.expect_end_of_input()?;
            return Ok((ReaderState::Completed, ReaderItem::None));
        }
        self.cursor.step(&mut self.de)
    }

    fn start(&mut self) -> Result<Step> {
        let expected = self.expected_type();
        match self.payload {
            Payload::Resource => {
                let scope = self.de.begin_resource(expected.as_deref(), ScopeKind::TopLevel, "")?;
                let step = self.cursor.begin_resource(&mut self.de, scope, true)?;
                self.context_url = self.cursor.resource_context();
                Ok(step)
            }
            Payload::ResourceSet => {
                self.de.expect_start_object()?;
                let mut header = SetHeader::default();
                if !self.de.read_set_members(&mut header)? {
                    return Err(Error::MissingValueProperty);
                }
                self.de.reader.read()?;
                self.context_url = header.context.clone();
                let item_type = header
                    .type_name
                    .as_deref()
                    .map(vocabulary::from_wire_type_name)
                    .and_then(|wire| collection_item_name(&wire).map(str::to_string))
                    .or(expected);
                Ok(self.cursor.begin_set(item_type, header, true))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::{EdmModel, EdmTypeRef, ModelBuilder, PrimitiveKind, StructuredType};
    use crate::JsonLightOptions;
    use std::sync::Arc;

    fn model() -> Arc<dyn EdmModel> {
        ModelBuilder::new()
            .structured_type(
                StructuredType::entity("NS.Customer")
                    .key("Id")
                    .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                    .property("Name", EdmTypeRef::primitive(PrimitiveKind::String))
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

    fn states(json: &str, set: bool) -> (Vec<ReaderState>, Vec<ReaderItem>) {
        let mut ctx = InputContext::from_str(json, model(), JsonLightOptions::minimal());
        let source = NavigationSource::new("http://host/", "Customers");
        let mut reader = if set {
            ResourceReader::resource_set(&mut ctx, None)
        } else {
            ResourceReader::resource(&mut ctx, None)
        }
        .with_navigation_source(source);
        let mut states = Vec::new();
        let mut items = Vec::new();
        while reader.read().unwrap() {
            states.push(reader.state());
            items.push(reader.item().clone());
        }
        assert_eq!(reader.state(), ReaderState::Completed);
        (states, items)
    }

    #[test]
    fn test_set_with_conventions() {
        let json = concat!(
            r#"{"@odata.context":"http://host/$metadata#Customers","@odata.count":2,"#,
            r#""value":[{"Id":1,"Name":"A"},{"Id":2,"Name":"B"}],"#,
            r#""@odata.nextLink":"http://host/Customers?$skip=2"}"#
        );
        let (states, items) = states(json, true);
        assert_eq!(
            states,
            vec![
                ReaderState::ResourceSetStart,
                ReaderState::ResourceStart,
                ReaderState::ResourceEnd,
                ReaderState::ResourceStart,
                ReaderState::ResourceEnd,
                ReaderState::ResourceSetEnd,
            ]
        );
        assert_eq!(items[0].as_resource_set().and_then(|s| s.count), Some(2));
        let first = items[2].as_resource().unwrap();
        assert_eq!(first.id.as_deref(), Some("http://host/Customers(1)"));
        assert_eq!(first.type_name.as_deref(), Some("NS.Customer"));
        let end = items[5].as_resource_set().unwrap();
        assert_eq!(end.next_link.as_deref(), Some("http://host/Customers?$skip=2"));
        assert_eq!(end.type_name.as_deref(), Some("Collection(NS.Customer)"));
    }

    #[test]
    fn test_expanded_navigation() {
        let json = r#"{"Id":1,"Orders@odata.count":1,"Orders":[{"Id":10}],"Manager":null,"Name":"A"}"#;
        let (states, items) = states(json, false);
        assert_eq!(
            states,
            vec![
                ReaderState::ResourceStart,
                ReaderState::NestedResourceInfoStart,
                ReaderState::ResourceSetStart,
                ReaderState::ResourceStart,
                ReaderState::ResourceEnd,
                ReaderState::ResourceSetEnd,
                ReaderState::NestedResourceInfoEnd,
                ReaderState::NestedResourceInfoStart,
                ReaderState::NestedResourceInfoEnd,
                ReaderState::ResourceEnd,
            ]
        );
        let orders = items[1].as_nested_resource_info().unwrap();
        assert_eq!(orders.name, "Orders");
        assert_eq!(orders.is_collection, Some(true));
        assert_eq!(orders.count, Some(1));
        assert_eq!(items[2].as_resource_set().and_then(|s| s.count), Some(1));

        let start = items[0].as_resource().unwrap();
        assert!(start.property("Name").is_none());
        let end = items[9].as_resource().unwrap();
        assert_eq!(end.property("Name").and_then(|v| v.as_str()), Some("A"));
        assert!(end.property("Orders").is_none());
    }

    #[test]
    fn test_bind_links_and_deferred_navigation() {
        let json = concat!(
            r#"{"Id":1,"Orders@odata.bind":["Orders(1)","Orders(2)"],"#,
            r#""Manager@odata.navigationLink":"http://host/Customers(1)/Manager"}"#
        );
        let (states, items) = states(json, false);
        assert_eq!(
            states,
            vec![
                ReaderState::ResourceStart,
                ReaderState::NestedResourceInfoStart,
                ReaderState::EntityReferenceLink,
                ReaderState::EntityReferenceLink,
                ReaderState::NestedResourceInfoEnd,
                ReaderState::NestedResourceInfoStart,
                ReaderState::NestedResourceInfoEnd,
                ReaderState::ResourceEnd,
            ]
        );
        assert_eq!(
            items[3],
            ReaderItem::EntityReferenceLink(EntityReferenceLink::new("Orders(2)"))
        );
        let manager = items[5].as_nested_resource_info().unwrap();
        assert_eq!(manager.url.as_deref(), Some("http://host/Customers(1)/Manager"));
    }

    #[test]
    fn test_null_item_fails_and_poisons_reader() {
        let mut ctx = InputContext::from_str(r#"{"value":[null]}"#, model(), JsonLightOptions::minimal());
        let mut reader = ResourceReader::resource_set(&mut ctx, Some("NS.Customer"));
        assert!(reader.read().unwrap());
        let err = reader.read().unwrap_err();
        assert_eq!(err.message_key(), "invalid_content_start");
        assert_eq!(reader.state(), ReaderState::Exception);
        assert_eq!(reader.read().unwrap_err().message_key(), "invalid_state");
    }

    #[test]
    fn test_context_url_is_exposed() {
        let json = r#"{"@odata.context":"http://host/$metadata#Customers/$entity","Id":3}"#;
        let mut ctx = InputContext::from_str(json, model(), JsonLightOptions::minimal());
        let mut reader = ResourceReader::resource(&mut ctx, Some("NS.Customer"));
        assert!(reader.read().unwrap());
        assert_eq!(reader.context_url(), Some("http://host/$metadata#Customers/$entity"));
    }
}
