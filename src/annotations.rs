//! Per-object bookkeeping of properties and their annotations.
//!
//! Property annotations (`Price@odata.type`, `Price@Measures.Unit`) precede
//! the property they annotate. The [`PropertyAndAnnotationCollector`] holds
//! them, keyed by base property name, until the property arrives, hands them
//! over exactly once, and rejects duplicate property names.
//!
//! When the object closes, leftover annotations must describe something that
//! has no value on the wire: a stream property (media link annotations) or a
//! navigation property (navigation, association or bind annotations). Any
//! other leftover is an error.

use indexmap::{IndexMap, IndexSet};

use crate::lexer::JsonScalar;
use crate::vocabulary;
use crate::{Error, InstanceAnnotation, Result, StreamReference};

/// Annotations collected for one property.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingAnnotations {
    /// Reserved annotations by local name (`type`, `navigationLink`, ...).
    pub odata: IndexMap<String, JsonScalar>,
    pub custom: Vec<InstanceAnnotation>,
    /// Entity reference URLs from `@odata.bind`.
    pub binds: Vec<String>,
}

impl PendingAnnotations {
    /// The wire type name from `@odata.type`, if present.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.odata.get(vocabulary::TYPE).and_then(JsonScalar::as_str)
    }

    #[must_use]
    pub fn string(&self, name: &str) -> Option<String> {
        self.odata
            .get(name)
            .and_then(JsonScalar::as_str)
            .map(str::to_string)
    }

    #[must_use]
    pub fn count(&self) -> Option<i64> {
        self.odata.get(vocabulary::COUNT).and_then(JsonScalar::as_i64)
    }

    /// Returns `true` if the annotations describe a navigation property.
    #[must_use]
    pub fn defines_navigation(&self) -> bool {
        !self.binds.is_empty()
            || self.odata.contains_key(vocabulary::NAVIGATION_LINK)
            || self.odata.contains_key(vocabulary::ASSOCIATION_LINK)
    }

    /// Returns `true` if the annotations describe a stream property.
    #[must_use]
    pub fn defines_stream(&self) -> bool {
        [
            vocabulary::MEDIA_EDIT_LINK,
            vocabulary::MEDIA_READ_LINK,
            vocabulary::MEDIA_CONTENT_TYPE,
            vocabulary::MEDIA_ETAG,
        ]
        .iter()
        .any(|name| self.odata.contains_key(*name))
    }

    /// Builds the stream reference described by media annotations.
    #[must_use]
    pub fn stream_reference(&self) -> StreamReference {
        StreamReference {
            edit_link: self.string(vocabulary::MEDIA_EDIT_LINK),
            read_link: self.string(vocabulary::MEDIA_READ_LINK),
            content_type: self.string(vocabulary::MEDIA_CONTENT_TYPE),
            etag: self.string(vocabulary::MEDIA_ETAG),
        }
    }
}

/// A property with annotations but no value on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum DeferredProperty {
    Stream(String, StreamReference),
    Navigation(String, PendingAnnotations),
}

/// An ordered multimap from base property name to collected annotations.
#[derive(Clone, Debug, Default)]
pub struct PropertyAndAnnotationCollector {
    pending: IndexMap<String, PendingAnnotations>,
    processed: IndexSet<String>,
}

impl PropertyAndAnnotationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the property's value has already been read.
    #[must_use]
    pub fn is_processed(&self, property: &str) -> bool {
        self.processed.contains(property)
    }

    pub fn add_odata_annotation(&mut self, property: &str, name: &str, value: JsonScalar) -> Result<()> {
        if self.processed.contains(property) {
            return Err(Error::UnexpectedAnnotation(vocabulary::property_odata_annotation(
                property, name, false,
            )));
        }
        let entry = self.pending.entry(property.to_string()).or_default();
        if entry.odata.contains_key(name) {
            return Err(Error::DuplicateProperty(vocabulary::property_odata_annotation(
                property, name, false,
            )));
        }
        entry.odata.insert(name.to_string(), value);
        Ok(())
    }

    pub fn add_binds(&mut self, property: &str, urls: Vec<String>) -> Result<()> {
        if self.processed.contains(property) {
            return Err(Error::UnexpectedAnnotation(vocabulary::property_odata_annotation(
                property,
                vocabulary::BIND,
                false,
            )));
        }
        let entry = self.pending.entry(property.to_string()).or_default();
        if !entry.binds.is_empty() {
            return Err(Error::DuplicateProperty(vocabulary::property_odata_annotation(
                property,
                vocabulary::BIND,
                false,
            )));
        }
        entry.binds = urls;
        Ok(())
    }

    pub fn add_custom_annotation(&mut self, property: &str, annotation: InstanceAnnotation) -> Result<()> {
        if self.processed.contains(property) {
            return Err(Error::UnexpectedAnnotation(format!(
                "{}@{}",
                property, annotation.name
            )));
        }
        let entry = self.pending.entry(property.to_string()).or_default();
        if entry.custom.iter().any(|a| a.name == annotation.name) {
            return Err(Error::DuplicateProperty(format!(
                "{}@{}",
                property, annotation.name
            )));
        }
        entry.custom.push(annotation);
        Ok(())
    }

    /// The wire type collected for a property (or annotation target), without consuming it.
    #[must_use]
    pub fn pending_type_name(&self, property: &str) -> Option<&str> {
        self.pending.get(property).and_then(PendingAnnotations::type_name)
    }

    /// The first target other than `except` whose annotations were never claimed.
    #[must_use]
    pub fn unclaimed(&self, except: &str) -> Option<&str> {
        self.pending.keys().map(String::as_str).find(|key| *key != except)
    }

    /// Marks a property as read and hands over its annotations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateProperty`] if the property was already read.
    pub fn take(&mut self, property: &str) -> Result<PendingAnnotations> {
        if !self.processed.insert(property.to_string()) {
            return Err(Error::DuplicateProperty(property.to_string()));
        }
        Ok(self.pending.shift_remove(property).unwrap_or_default())
    }

    /// Drains the leftovers once the object has closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PropertyAnnotationWithoutProperty`] for annotations that
    /// define neither a stream nor a navigation property.
    pub fn finish(&mut self) -> Result<Vec<DeferredProperty>> {
        let mut deferred = Vec::with_capacity(self.pending.len());
        for (property, annotations) in self.pending.drain(..) {
            self.processed.insert(property.clone());
            if annotations.defines_navigation() {
                deferred.push(DeferredProperty::Navigation(property, annotations));
            } else if annotations.defines_stream() {
                let stream = annotations.stream_reference();
                deferred.push(DeferredProperty::Stream(property, stream));
            } else {
                return Err(Error::PropertyAnnotationWithoutProperty(property));
            }
        }
        Ok(deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> JsonScalar {
        JsonScalar::String(s.to_string())
    }

    #[test]
    fn test_annotations_flushed_once() {
        let mut collector = PropertyAndAnnotationCollector::new();
        collector
            .add_odata_annotation("Price", "type", string("#Decimal"))
            .unwrap();
        assert_eq!(collector.pending_type_name("Price"), Some("#Decimal"));

        let pending = collector.take("Price").unwrap();
        assert_eq!(pending.type_name(), Some("#Decimal"));
        assert!(collector.take("Price").is_err());
        assert!(collector.finish().unwrap().is_empty());
    }

    #[test]
    fn test_annotation_after_property_is_rejected() {
        let mut collector = PropertyAndAnnotationCollector::new();
        collector.take("Price").unwrap();
        let err = collector
            .add_odata_annotation("Price", "type", string("#Decimal"))
            .unwrap_err();
        assert_eq!(err, Error::UnexpectedAnnotation("Price@odata.type".into()));
    }

    #[test]
    fn test_orphan_annotation_is_an_error() {
        let mut collector = PropertyAndAnnotationCollector::new();
        collector
            .add_custom_annotation("Ghost", InstanceAnnotation::new("NS.Term", 1i32))
            .unwrap();
        assert_eq!(
            collector.finish().unwrap_err(),
            Error::PropertyAnnotationWithoutProperty("Ghost".into())
        );
    }

    #[test]
    fn test_deferred_stream_and_navigation() {
        let mut collector = PropertyAndAnnotationCollector::new();
        collector
            .add_odata_annotation("Photo", "mediaReadLink", string("http://host/Photo"))
            .unwrap();
        collector
            .add_odata_annotation("Orders", "navigationLink", string("http://host/Orders"))
            .unwrap();

        let deferred = collector.finish().unwrap();
        assert!(matches!(
            &deferred[0],
            DeferredProperty::Stream(name, s) if name == "Photo" && s.read_link.as_deref() == Some("http://host/Photo")
        ));
        assert!(matches!(&deferred[1], DeferredProperty::Navigation(name, _) if name == "Orders"));
    }

    #[test]
    fn test_duplicate_annotation_rejected() {
        let mut collector = PropertyAndAnnotationCollector::new();
        collector.add_odata_annotation("A", "type", string("#Int16")).unwrap();
        assert!(collector.add_odata_annotation("A", "type", string("#Int16")).is_err());
    }
}
