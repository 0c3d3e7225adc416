//! Pull reader for delta payloads.
//!
//! A delta payload is a set whose `value` array mixes changed resources with
//! deleted entries, added links and deleted links. Each item is buffered and
//! classified before it is reported:
//!
//! - an `@odata.removed` member, or a `$deletedEntity` context URL, or an
//!   object holding nothing but `id` and `reason`, is a deleted entry
//! - a `$link` or `$deletedLink` context URL, or the `source`,
//!   `relationship` and `target` triple, is a link; with `@odata.removed` it
//!   is a deleted link
//! - anything else is a resource
//!
//! While a resource's expanded content is read the reader reports
//! [`DeltaReaderState::NestedResource`] and the nested step through
//! [`DeltaReader::sub_state`].

use tracing::debug;

use crate::context::InputContext;
use crate::de::{Deserializer, ScopeKind, SetHeader};
use crate::lexer::{JsonNode, NodeSource};
use crate::metadata::{self, NavigationSource};
use crate::reader::{Cursor, ReaderItem, ReaderState};
use crate::reorder::PropertyPeek;
use crate::vocabulary::{self, ContextKind, PropertyName};
use crate::{
    DeletedEntry, DeletedReason, DeltaLink, DeltaResourceSet, EntityReferenceLink, Error, NestedResourceInfo, Property,
    Resource, ResourceSet, Result,
};

/// Where a [`DeltaReader`] stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaReaderState {
    Start,
    DeltaResourceSetStart,
    DeltaResourceStart,
    DeltaResourceEnd,
    DeltaDeletedEntry,
    DeltaLink,
    DeltaDeletedLink,
    /// Inside the expanded content of a delta resource; see [`DeltaReader::sub_state`].
    NestedResource,
    DeltaResourceSetEnd,
    Completed,
    Exception,
}

/// The item a delta reader reached with its last step.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum DeltaItem {
    #[default]
    None,
    DeltaResourceSet(DeltaResourceSet),
    Resource(Resource),
    DeletedEntry(DeletedEntry),
    Link(DeltaLink),
    DeletedLink(DeltaLink),
    NestedResourceInfo(NestedResourceInfo),
    ResourceSet(ResourceSet),
    EntityReferenceLink(EntityReferenceLink),
}

impl From<ReaderItem> for DeltaItem {
    fn from(item: ReaderItem) -> Self {
        match item {
            ReaderItem::None => DeltaItem::None,
            ReaderItem::ResourceSet(set) => DeltaItem::ResourceSet(set),
            ReaderItem::Resource(resource) => DeltaItem::Resource(resource),
            ReaderItem::NestedResourceInfo(info) => DeltaItem::NestedResourceInfo(info),
            ReaderItem::EntityReferenceLink(link) => DeltaItem::EntityReferenceLink(link),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemKind {
    Resource,
    DeletedEntry,
    Link,
    DeletedLink,
}

fn classify_item(peeks: &[PropertyPeek]) -> ItemKind {
    let mut context = None;
    let mut removed = false;
    let mut properties = Vec::new();
    for peek in peeks {
        match vocabulary::classify(&peek.name) {
            PropertyName::ODataAnnotation(vocabulary::CONTEXT) => {
                context = peek.scalar.as_ref().and_then(|s| s.as_str()).map(vocabulary::context_kind);
            }
            PropertyName::ODataAnnotation(vocabulary::REMOVED) => removed = true,
            PropertyName::Property(name) => properties.push(name),
            _ => {}
        }
    }
    let is_link_triple = [vocabulary::DELTA_SOURCE, vocabulary::DELTA_RELATIONSHIP, vocabulary::DELTA_TARGET]
        .iter()
        .all(|field| properties.contains(field));

    match context {
        Some(ContextKind::DeletedEntity) => return ItemKind::DeletedEntry,
        Some(ContextKind::Link) => return ItemKind::Link,
        Some(ContextKind::DeletedLink) => return ItemKind::DeletedLink,
        _ => {}
    }
    if is_link_triple {
        return if removed { ItemKind::DeletedLink } else { ItemKind::Link };
    }
    if removed {
        return ItemKind::DeletedEntry;
    }
    let mut names = properties.clone();
    names.sort_unstable();
    if names == [vocabulary::DELTA_ID, vocabulary::DELTA_REASON] {
        ItemKind::DeletedEntry
    } else {
        ItemKind::Resource
    }
}

type Step = (DeltaReaderState, DeltaItem);

/// Reads a delta payload.
///
/// ```rust
/// use odata_json_light::edm::Model;
/// use odata_json_light::{DeltaItem, DeltaReader, DeltaReaderState, InputContext, JsonLightOptions};
///
/// let json = r#"{"value":[{"@odata.removed":{"reason":"deleted"},"@odata.id":"Customers(5)"}]}"#;
/// let mut ctx = InputContext::from_str(json, Model::empty(), JsonLightOptions::new());
/// let mut reader = DeltaReader::new(&mut ctx, None);
///
/// reader.read().unwrap();
/// reader.read().unwrap();
/// assert_eq!(reader.state(), DeltaReaderState::DeltaDeletedEntry);
/// if let DeltaItem::DeletedEntry(entry) = reader.item() {
///     assert_eq!(entry.id, "Customers(5)");
/// }
/// ```
pub struct DeltaReader<'c> {
    de: Deserializer<'c>,
    cursor: Cursor,
    expected: Option<String>,
    header: SetHeader,
    set_ended: bool,
    state: DeltaReaderState,
    sub_state: ReaderState,
    item: DeltaItem,
}

impl<'c> DeltaReader<'c> {
    /// A reader for a delta of resources of type `expected`.
    pub fn new(ctx: &'c mut InputContext, expected: Option<&str>) -> Self {
        DeltaReader {
            de: Deserializer::new(ctx),
            cursor: Cursor::new(),
            expected: expected.map(str::to_string),
            header: SetHeader::default(),
            set_ended: false,
            state: DeltaReaderState::Start,
            sub_state: ReaderState::Start,
            item: DeltaItem::None,
        }
    }

    /// Sets the entity set the delta describes; see [`crate::ResourceReader::with_navigation_source`].
    #[must_use]
    pub fn with_navigation_source(mut self, source: NavigationSource) -> Self {
        self.cursor.source = Some(source);
        self
    }

    #[must_use]
    pub fn state(&self) -> DeltaReaderState {
        self.state
    }

    /// The nested reader state while in [`DeltaReaderState::NestedResource`].
    #[must_use]
    pub fn sub_state(&self) -> ReaderState {
        self.sub_state
    }

    #[must_use]
    pub fn item(&self) -> &DeltaItem {
        &self.item
    }

    #[must_use]
    pub fn context_url(&self) -> Option<&str> {
        self.header.context.as_deref()
    }

    /// Advances to the next item; returns `false` once the payload is complete.
    pub fn read(&mut self) -> Result<bool> {
        match self.state {
            DeltaReaderState::Completed => return Ok(false),
            DeltaReaderState::Exception => return Err(Error::invalid_state("read", self.state)),
            _ => {}
        }
        match self.advance() {
            Ok((state, item)) => {
                debug!(?state, sub_state = ?self.sub_state, "delta reader transition");
                self.state = state;
                self.item = item;
                Ok(state != DeltaReaderState::Completed)
            }
            Err(err) => {
                debug!(error = %err, "delta reader failed");
                self.state = DeltaReaderState::Exception;
                self.item = DeltaItem::None;
                Err(err)
            }
        }
    }

    #[cfg(feature = "tokio")]
    pub async fn read_async(&mut self) -> Result<bool> {
        self.read()
    }

    fn delta_set(&self) -> DeltaResourceSet {
        DeltaResourceSet {
            count: self.header.count,
            next_link: self.header.next_link.clone(),
            delta_link: self.header.delta_link.clone(),
            instance_annotations: self.header.annotations.clone(),
        }
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
        if self.state == DeltaReaderState::Start {
            self.de.expect_start_object()?;
            if !self.de.read_set_members(&mut self.header)? {
                return Err(Error::MissingValueProperty);
            }
            self.de.reader.read()?;
            return Ok((DeltaReaderState::DeltaResourceSetStart, DeltaItem::DeltaResourceSet(self.delta_set())));
        }
        if self.set_ended {
            self.de.expect_end_of_input()?;
            return Ok((DeltaReaderState::Completed, DeltaItem::None));
        }
        if !self.cursor.is_empty() {
            let (state, item) = self.cursor.step(&mut self.de)?;
            self.sub_state = state;
            if state == ReaderState::ResourceEnd && self.cursor.is_empty() {
                return Ok((DeltaReaderState::DeltaResourceEnd, item.into()));
            }
            return Ok((DeltaReaderState::NestedResource, item.into()));
        }

        let next = match self.de.reader.peek()? {
            JsonNode::EndArray => Some(true),
            JsonNode::StartObject => Some(false),
            _ => None,
        };
        match next {
            Some(true) => {
                self.de.reader.read()?;
                if self.de.read_set_members(&mut self.header)? {
                    return Err(Error::DuplicateProperty(vocabulary::VALUE.to_string()));
                }
                self.set_ended = true;
                Ok((DeltaReaderState::DeltaResourceSetEnd, DeltaItem::DeltaResourceSet(self.delta_set())))
            }
            Some(false) => self.read_item(),
            None => {
                let found = self.de.reader.read()?;
                Err(Error::invalid_content_start("StartObject", found))
            }
        }
    }

    fn read_item(&mut self) -> Result<Step> {
        let peeks = self.de.reader.reorder_next_object()?;
        let kind = classify_item(&peeks);
        debug!(?kind, "delta item");
        match kind {
            ItemKind::Resource => {
                let expected = self.expected_type();
                let scope = self.de.begin_resource(expected.as_deref(), ScopeKind::DeltaItem, "")?;
                let (state, item) = self.cursor.begin_resource(&mut self.de, scope, true)?;
                self.sub_state = state;
                Ok((DeltaReaderState::DeltaResourceStart, item.into()))
            }
            ItemKind::DeletedEntry => {
                let entry = self.read_deleted_entry()?;
                Ok((DeltaReaderState::DeltaDeletedEntry, DeltaItem::DeletedEntry(entry)))
            }
            ItemKind::Link => Ok((DeltaReaderState::DeltaLink, DeltaItem::Link(self.read_link()?))),
            ItemKind::DeletedLink => Ok((DeltaReaderState::DeltaDeletedLink, DeltaItem::DeletedLink(self.read_link()?))),
        }
    }

    /// Reads a deleted entry in either shape.
    ///
    /// Without an id, the id is computed from the entry's key properties when
    /// a navigation source is set.
    fn read_deleted_entry(&mut self) -> Result<DeletedEntry> {
        self.de.expect_start_object()?;
        let expected = self.expected_type();
        let mut id = None;
        let mut reason = None;
        let mut keys = Resource::new();
        keys.type_name = expected.clone();
        loop {
            let member = match self.de.reader.read()? {
                JsonNode::EndObject => break,
                JsonNode::Property(member) => member,
                other => return Err(Error::invalid_content_start("Property", other)),
            };
            match vocabulary::classify(&member) {
                PropertyName::ODataAnnotation(vocabulary::ID) | PropertyName::Property(vocabulary::DELTA_ID) => {
                    id = self.de.read_string()?;
                }
                PropertyName::Property(vocabulary::DELTA_REASON) => reason = self.de.read_string()?,
                PropertyName::ODataAnnotation(vocabulary::REMOVED) => {
                    if let Some(removed) = self.read_removed()? {
                        reason = Some(removed);
                    }
                }
                PropertyName::Property(name) => {
                    let declared = expected
                        .as_deref()
                        .and_then(|t| self.de.model().find_property(t, name))
                        .and_then(|p| p.type_ref().cloned());
                    let value = self.de.read_value(name, declared.as_ref(), None)?;
                    keys.properties.set(Property::new(name, value));
                }
                _ => self.de.reader.skip_value()?,
            }
        }

        let id = match id {
            Some(id) => id,
            None => self
                .cursor
                .source
                .as_ref()
                .and_then(|source| metadata::compute(self.de.model(), source, &keys))
                .map(|conventions| conventions.id)
                .ok_or_else(|| Error::InvalidDeltaItem("deleted entry without an id".to_string()))?,
        };
        let reason = match reason {
            Some(reason) => reason.parse()?,
            None => DeletedReason::default(),
        };
        Ok(DeletedEntry { id, reason })
    }

    /// Reads the `@odata.removed` object and returns its reason, if any.
    fn read_removed(&mut self) -> Result<Option<String>> {
        let is_object = matches!(self.de.reader.peek()?, JsonNode::StartObject);
        if !is_object {
            self.de.reader.skip_value()?;
            return Ok(None);
        }
        self.de.reader.read()?;
        let mut reason = None;
        loop {
            match self.de.reader.read()? {
                JsonNode::EndObject => return Ok(reason),
                JsonNode::Property(name) if name == vocabulary::DELTA_REASON => reason = self.de.read_string()?,
                JsonNode::Property(_) => self.de.reader.skip_value()?,
                other => return Err(Error::invalid_content_start("Property", other)),
            }
        }
    }

    fn read_link(&mut self) -> Result<DeltaLink> {
        self.de.expect_start_object()?;
        let mut link = DeltaLink::default();
        let mut seen = [false; 3];
        loop {
            let member = match self.de.reader.read()? {
                JsonNode::EndObject => break,
                JsonNode::Property(member) => member,
                other => return Err(Error::invalid_content_start("Property", other)),
            };
            let (slot, field) = match member.as_str() {
                vocabulary::DELTA_SOURCE => (&mut link.source, 0),
                vocabulary::DELTA_RELATIONSHIP => (&mut link.relationship, 1),
                vocabulary::DELTA_TARGET => (&mut link.target, 2),
                _ => {
                    self.de.reader.skip_value()?;
                    continue;
                }
            };
            if let Some(value) = self.de.read_string()? {
                *slot = value;
                seen[field] = true;
            }
        }
        if seen.iter().all(|s| *s) {
            Ok(link)
        } else {
            Err(Error::InvalidDeltaItem(
                "a delta link needs source, relationship and target".to_string(),
            ))
        }
    }
}
