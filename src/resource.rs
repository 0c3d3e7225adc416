//! Resources, resource sets and delta records.
//!
//! A [`Resource`] is one entity or complex instance. Readers build it through a
//! [`ResourceBuilder`] while its properties stream in and only hand out an
//! immutable `Resource` once the JSON object has closed. Writers take a fully
//! populated `Resource` and decide, per metadata level, which of its fields
//! reach the wire.
//!
//! Delta payloads interleave resources with lightweight records that are not
//! resources: [`DeletedEntry`] and [`DeltaLink`].

use std::fmt;
use std::str::FromStr;

use crate::{Error, PropertyMap, Result, StreamReference, TypeAnnotation, Value};

/// A custom annotation attached to a resource, property or resource set.
///
/// `name` is the qualified term without the leading `@`, e.g. `Display.Title`.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceAnnotation {
    pub name: String,
    pub value: Value,
}

impl InstanceAnnotation {
    pub fn new(name: &str, value: impl Into<Value>) -> Self {
        InstanceAnnotation {
            name: name.trim_start_matches('@').to_string(),
            value: value.into(),
        }
    }
}

/// A named value inside a resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
    pub instance_annotations: Vec<InstanceAnnotation>,
    /// Explicit type-name hint for a primitive or enum value.
    ///
    /// Resources and collections carry their own hint.
    pub type_annotation: Option<TypeAnnotation>,
}

impl Property {
    pub fn new(name: &str, value: impl Into<Value>) -> Self {
        Property {
            name: name.to_string(),
            value: value.into(),
            instance_annotations: Vec::new(),
            type_annotation: None,
        }
    }

    #[must_use]
    pub fn with_annotation(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.instance_annotations
            .push(InstanceAnnotation::new(name, value));
        self
    }

    #[must_use]
    pub fn with_type_annotation(mut self, annotation: TypeAnnotation) -> Self {
        self.type_annotation = Some(annotation);
        self
    }
}

/// An action or function advertised by a resource.
///
/// `metadata` is either the bare fragment (`#NS.Rate`) or the full metadata URL
/// ending in that fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub metadata: String,
    pub title: Option<String>,
    pub target: Option<String>,
}

impl Operation {
    pub fn new(metadata: &str) -> Self {
        Operation {
            metadata: metadata.to_string(),
            title: None,
            target: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// The property key this operation is written under, e.g. `#NS.Rate`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::Operation;
    ///
    /// assert_eq!(Operation::new("http://host/$metadata#NS.Rate").key(), "#NS.Rate");
    /// assert_eq!(Operation::new("NS.Rate").key(), "#NS.Rate");
    /// ```
    #[must_use]
    pub fn key(&self) -> String {
        match self.metadata.find('#') {
            Some(pos) => self.metadata[pos..].to_string(),
            None => format!("#{}", self.metadata),
        }
    }
}

/// One entity or complex instance.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Resource {
    pub type_name: Option<String>,
    pub id: Option<String>,
    pub etag: Option<String>,
    pub edit_link: Option<String>,
    pub read_link: Option<String>,
    /// Links of the media resource, for media entities.
    pub media_resource: Option<StreamReference>,
    pub properties: PropertyMap,
    pub instance_annotations: Vec<InstanceAnnotation>,
    pub actions: Vec<Operation>,
    pub functions: Vec<Operation>,
    pub type_annotation: Option<TypeAnnotation>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty resource of the given qualified type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::Resource;
    ///
    /// let customer = Resource::of_type("NS.Customer")
    ///     .with_id("http://host/Customers(1)")
    ///     .with_property("Id", 1i32)
    ///     .with_property("Name", "Alice");
    ///
    /// assert_eq!(customer.type_name.as_deref(), Some("NS.Customer"));
    /// assert_eq!(customer.property("Name").and_then(|v| v.as_str()), Some("Alice"));
    /// ```
    pub fn of_type(type_name: &str) -> Self {
        Resource {
            type_name: Some(type_name.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    #[must_use]
    pub fn with_edit_link(mut self, link: &str) -> Self {
        self.edit_link = Some(link.to_string());
        self
    }

    #[must_use]
    pub fn with_read_link(mut self, link: &str) -> Self {
        self.read_link = Some(link.to_string());
        self
    }

    #[must_use]
    pub fn with_media_resource(mut self, media: StreamReference) -> Self {
        self.media_resource = Some(media);
        self
    }

    /// Adds or replaces a property.
    #[must_use]
    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.set(Property::new(name, value));
        self
    }

    /// Adds or replaces a fully described property.
    #[must_use]
    pub fn with(mut self, property: Property) -> Self {
        self.properties.set(property);
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.instance_annotations
            .push(InstanceAnnotation::new(name, value));
        self
    }

    #[must_use]
    pub fn with_action(mut self, operation: Operation) -> Self {
        self.actions.push(operation);
        self
    }

    #[must_use]
    pub fn with_function(mut self, operation: Operation) -> Self {
        self.functions.push(operation);
        self
    }

    #[must_use]
    pub fn with_type_annotation(mut self, annotation: TypeAnnotation) -> Self {
        self.type_annotation = Some(annotation);
        self
    }

    /// Returns the value of the named property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.value(name)
    }
}

/// Accumulates a resource while the reader walks its JSON object.
///
/// Setters reject a second value for the same control information; the
/// `Resource` only escapes through [`ResourceBuilder::build`] once the object
/// has closed, or as a clone through [`ResourceBuilder::snapshot`].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    pub fn new(type_name: Option<String>) -> Self {
        ResourceBuilder {
            resource: Resource {
                type_name,
                ..Resource::default()
            },
        }
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.resource.type_name.as_deref()
    }

    pub fn set_type_name(&mut self, type_name: String) {
        self.resource.type_name = Some(type_name);
    }

    pub fn set_id(&mut self, id: String) -> Result<()> {
        set_once(&mut self.resource.id, id, "odata.id")
    }

    pub fn set_etag(&mut self, etag: String) -> Result<()> {
        set_once(&mut self.resource.etag, etag, "odata.etag")
    }

    pub fn set_edit_link(&mut self, link: String) -> Result<()> {
        set_once(&mut self.resource.edit_link, link, "odata.editLink")
    }

    pub fn set_read_link(&mut self, link: String) -> Result<()> {
        set_once(&mut self.resource.read_link, link, "odata.readLink")
    }

    pub fn media_resource_mut(&mut self) -> &mut StreamReference {
        self.resource
            .media_resource
            .get_or_insert_with(StreamReference::default)
    }

    pub fn add_property(&mut self, property: Property) -> Result<()> {
        self.resource.properties.insert(property)
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.resource.properties.contains(name)
    }

    pub fn add_annotation(&mut self, annotation: InstanceAnnotation) {
        self.resource.instance_annotations.push(annotation);
    }

    pub fn add_action(&mut self, operation: Operation) {
        self.resource.actions.push(operation);
    }

    pub fn add_function(&mut self, operation: Operation) {
        self.resource.functions.push(operation);
    }

    /// Fills id and links the payload omitted with values computed by convention.
    pub fn apply_conventions(&mut self, id: Option<String>, edit_link: Option<String>) {
        if self.resource.id.is_none() {
            self.resource.id = id;
        }
        if self.resource.edit_link.is_none() {
            self.resource.edit_link = edit_link;
        }
    }

    /// A copy of the resource as read so far.
    #[must_use]
    pub fn snapshot(&self) -> Resource {
        self.resource.clone()
    }

    pub(crate) fn peek(&self) -> &Resource {
        &self.resource
    }

    pub fn build(self) -> Resource {
        self.resource
    }
}

fn set_once(slot: &mut Option<String>, value: String, annotation: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::DuplicateProperty(format!("@{}", annotation)));
    }
    *slot = Some(value);
    Ok(())
}

/// An ordered set of resources: a feed or an expanded collection navigation property.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ResourceSet {
    /// Qualified collection type name, e.g. `Collection(NS.Customer)`.
    pub type_name: Option<String>,
    pub count: Option<i64>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
    pub instance_annotations: Vec<InstanceAnnotation>,
    pub type_annotation: Option<TypeAnnotation>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_next_link(mut self, link: &str) -> Self {
        self.next_link = Some(link.to_string());
        self
    }

    #[must_use]
    pub fn with_delta_link(mut self, link: &str) -> Self {
        self.delta_link = Some(link.to_string());
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.instance_annotations
            .push(InstanceAnnotation::new(name, value));
        self
    }
}

/// The top-level set of a delta payload.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct DeltaResourceSet {
    pub count: Option<i64>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
    pub instance_annotations: Vec<InstanceAnnotation>,
}

impl DeltaResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_next_link(mut self, link: &str) -> Self {
        self.next_link = Some(link.to_string());
        self
    }

    #[must_use]
    pub fn with_delta_link(mut self, link: &str) -> Self {
        self.delta_link = Some(link.to_string());
        self
    }
}

/// Why a resource left a delta result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeletedReason {
    #[default]
    Deleted,
    Changed,
}

impl DeletedReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeletedReason::Deleted => "deleted",
            DeletedReason::Changed => "changed",
        }
    }
}

impl fmt::Display for DeletedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletedReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deleted" => Ok(DeletedReason::Deleted),
            "changed" => Ok(DeletedReason::Changed),
            other => Err(Error::InvalidDeltaItem(format!(
                "unknown deleted entry reason '{}'",
                other
            ))),
        }
    }
}

/// A resource removed from a delta result.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct DeletedEntry {
    pub id: String,
    pub reason: DeletedReason,
}

impl DeletedEntry {
    pub fn new(id: &str, reason: DeletedReason) -> Self {
        DeletedEntry {
            id: id.to_string(),
            reason,
        }
    }
}

/// A relationship added to or removed from a delta result.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DeltaLink {
    pub source: String,
    pub target: String,
    pub relationship: String,
}

impl DeltaLink {
    pub fn new(source: &str, relationship: &str, target: &str) -> Self {
        DeltaLink {
            source: source.to_string(),
            target: target.to_string(),
            relationship: relationship.to_string(),
        }
    }
}

/// A navigation property of a resource, with its links and optional expanded content.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct NestedResourceInfo {
    pub name: String,
    /// `Some(true)` for collection-valued navigation properties, `None` when unknown.
    pub is_collection: Option<bool>,
    pub url: Option<String>,
    pub association_link_url: Option<String>,
    pub count: Option<i64>,
    pub next_link: Option<String>,
}

impl NestedResourceInfo {
    pub fn new(name: &str) -> Self {
        NestedResourceInfo {
            name: name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn collection(mut self, is_collection: bool) -> Self {
        self.is_collection = Some(is_collection);
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn with_association_link(mut self, url: &str) -> Self {
        self.association_link_url = Some(url.to_string());
        self
    }
}

/// A reference to an existing entity, by URL.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EntityReferenceLink {
    pub url: Option<String>,
}

impl EntityReferenceLink {
    pub fn new(url: &str) -> Self {
        EntityReferenceLink {
            url: Some(url.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_second_id() {
        let mut builder = ResourceBuilder::new(Some("NS.T".into()));
        builder.set_id("a".into()).unwrap();
        assert!(builder.set_id("b".into()).is_err());
        assert_eq!(builder.build().id.as_deref(), Some("a"));
    }

    #[test]
    fn test_conventions_do_not_override_payload() {
        let mut builder = ResourceBuilder::new(None);
        builder.set_id("payload".into()).unwrap();
        builder.apply_conventions(Some("computed".into()), Some("edit".into()));
        let resource = builder.build();
        assert_eq!(resource.id.as_deref(), Some("payload"));
        assert_eq!(resource.edit_link.as_deref(), Some("edit"));
    }

    #[test]
    fn test_deleted_reason_parse() {
        assert_eq!("changed".parse::<DeletedReason>().unwrap(), DeletedReason::Changed);
        assert!("gone".parse::<DeletedReason>().is_err());
    }

    #[test]
    fn test_annotation_name_strips_at() {
        assert_eq!(InstanceAnnotation::new("@NS.Term", 1i32).name, "NS.Term");
    }
}
