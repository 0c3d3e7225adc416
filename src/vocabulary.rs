//! JSON Light wire vocabulary.
//!
//! This module names every reserved annotation and well-known property the
//! reader and writer exchange, and classifies the property names found on the
//! wire.
//!
//! # Property names
//!
//! Every member of a JSON Light object falls into one of these shapes:
//!
//! | Shape | Example | [`PropertyName`] |
//! |-------|---------|------------------|
//! | Reserved annotation | `@odata.type`, `@type` | `ODataAnnotation("type")` |
//! | Custom instance annotation | `@Display.Title` | `InstanceAnnotation("Display.Title")` |
//! | Reserved property annotation | `Price@odata.type` | `PropertyODataAnnotation { .. }` |
//! | Custom property annotation | `Price@Measures.Unit` | `PropertyAnnotation { .. }` |
//! | Metadata reference | `#NS.Rate` | `MetadataReference("#NS.Rate")` |
//! | Ordinary property | `Price` | `Property("Price")` |
//!
//! The `odata.` prefix of reserved annotations may be omitted; both spellings
//! are recognized when reading. Custom annotation terms are always
//! namespace-qualified, so a bare `@name` without a dot is reserved.
//!
//! The annotation target is everything before the last `@`, which lets a
//! custom annotation carry its own type: `@NS.Term@odata.type` annotates the
//! instance annotation `@NS.Term`.
//!
//! # Type names
//!
//! Type names travel as `#` followed by the qualified name, with the `Edm.`
//! namespace dropped for primitive types:
//!
//! ```rust
//! use odata_json_light::vocabulary::{from_wire_type_name, to_wire_type_name};
//!
//! assert_eq!(to_wire_type_name("Edm.Int16"), "#Int16");
//! assert_eq!(to_wire_type_name("Collection(Edm.String)"), "#Collection(String)");
//! assert_eq!(to_wire_type_name("NS.Address"), "#NS.Address");
//!
//! assert_eq!(from_wire_type_name("#Double"), "Edm.Double");
//! assert_eq!(from_wire_type_name("Collection(NS.Address)"), "Collection(NS.Address)");
//! ```

use crate::edm::{collection_item_name, PrimitiveKind, COLLECTION_PREFIX};

pub const ODATA_NAMESPACE: &str = "odata";

pub const TYPE: &str = "type";
pub const ID: &str = "id";
pub const ETAG: &str = "etag";
pub const COUNT: &str = "count";
pub const NEXT_LINK: &str = "nextLink";
pub const DELTA_LINK: &str = "deltaLink";
pub const CONTEXT: &str = "context";
pub const ASSOCIATION_LINK: &str = "associationLink";
pub const NAVIGATION_LINK: &str = "navigationLink";
pub const MEDIA_EDIT_LINK: &str = "mediaEditLink";
pub const MEDIA_READ_LINK: &str = "mediaReadLink";
pub const MEDIA_CONTENT_TYPE: &str = "mediaContentType";
pub const MEDIA_ETAG: &str = "mediaEtag";
pub const EDIT_LINK: &str = "editLink";
pub const READ_LINK: &str = "readLink";
pub const BIND: &str = "bind";
pub const REMOVED: &str = "removed";
pub const METADATA_ETAG: &str = "metadataEtag";

/// Wrapper property of top-level collections, properties and resource sets.
pub const VALUE: &str = "value";

pub const DELTA_ID: &str = "id";
pub const DELTA_REASON: &str = "reason";
pub const DELTA_SOURCE: &str = "source";
pub const DELTA_TARGET: &str = "target";
pub const DELTA_RELATIONSHIP: &str = "relationship";

pub const OPERATION_TITLE: &str = "title";
pub const OPERATION_TARGET: &str = "target";

pub const DELETED_ENTITY_SUFFIX: &str = "$deletedEntity";
pub const LINK_SUFFIX: &str = "$link";
pub const DELETED_LINK_SUFFIX: &str = "$deletedLink";
pub const ENTITY_SUFFIX: &str = "$entity";
pub const DELTA_SUFFIX: &str = "$delta";

/// Suffix of a convention association link.
pub const REF_SEGMENT: &str = "$ref";
/// Suffix of a convention media resource link.
pub const VALUE_SEGMENT: &str = "$value";

/// A classified JSON Light member name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyName<'a> {
    Property(&'a str),
    /// A reserved annotation on the enclosing object, by local name (`type`, `id`, ...).
    ODataAnnotation(&'a str),
    /// A custom annotation on the enclosing object, by qualified term.
    InstanceAnnotation(&'a str),
    /// A reserved annotation on a property, e.g. `Price@odata.type`.
    PropertyODataAnnotation { property: &'a str, name: &'a str },
    /// A custom annotation on a property, e.g. `Price@Measures.Unit`.
    PropertyAnnotation { property: &'a str, term: &'a str },
    /// An advertised action or function, e.g. `#NS.Rate`.
    MetadataReference(&'a str),
}

/// Splits an annotation (without `@`) into reserved local name or custom term.
fn annotation_kind(annotation: &str) -> Result<&str, &str> {
    match annotation.strip_prefix("odata.") {
        Some(local) => Ok(local),
        None if !annotation.contains('.') => Ok(annotation),
        None => Err(annotation),
    }
}

/// Classifies a member name as read from the wire.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::vocabulary::{classify, PropertyName};
///
/// assert_eq!(classify("@odata.etag"), PropertyName::ODataAnnotation("etag"));
/// assert_eq!(classify("@etag"), PropertyName::ODataAnnotation("etag"));
/// assert_eq!(classify("@UI.Hidden"), PropertyName::InstanceAnnotation("UI.Hidden"));
/// assert_eq!(
///     classify("Orders@odata.count"),
///     PropertyName::PropertyODataAnnotation { property: "Orders", name: "count" }
/// );
/// assert_eq!(classify("#NS.Rate"), PropertyName::MetadataReference("#NS.Rate"));
/// assert_eq!(classify("Name"), PropertyName::Property("Name"));
/// ```
#[must_use]
pub fn classify(name: &str) -> PropertyName<'_> {
    if name.contains('#') {
        return PropertyName::MetadataReference(name);
    }
    match name.rfind('@') {
        Some(0) => match annotation_kind(&name[1..]) {
            Ok(local) => PropertyName::ODataAnnotation(local),
            Err(term) => PropertyName::InstanceAnnotation(term),
        },
        Some(at) => {
            let property = &name[..at];
            match annotation_kind(&name[at + 1..]) {
                Ok(local) => PropertyName::PropertyODataAnnotation {
                    property,
                    name: local,
                },
                Err(term) => PropertyName::PropertyAnnotation { property, term },
            }
        }
        None => PropertyName::Property(name),
    }
}

/// Spells a reserved annotation on the enclosing object: `@odata.type` or `@type`.
#[must_use]
pub fn odata_annotation(local: &str, omit_prefix: bool) -> String {
    if omit_prefix {
        format!("@{}", local)
    } else {
        format!("@{}.{}", ODATA_NAMESPACE, local)
    }
}

/// Spells a reserved annotation on a property: `Price@odata.type` or `Price@type`.
#[must_use]
pub fn property_odata_annotation(property: &str, local: &str, omit_prefix: bool) -> String {
    format!("{}{}", property, odata_annotation(local, omit_prefix))
}

fn is_primitive_name(name: &str) -> bool {
    PrimitiveKind::from_name(name).is_some() || name == "Edm.Untyped" || name == "Untyped"
}

/// Converts a qualified type name to its wire form.
#[must_use]
pub fn to_wire_type_name(type_name: &str) -> String {
    format!("#{}", short_type_name(type_name))
}

fn short_type_name(type_name: &str) -> String {
    if let Some(item) = collection_item_name(type_name) {
        return format!("{}{})", COLLECTION_PREFIX, short_type_name(item));
    }
    match type_name.strip_prefix("Edm.") {
        Some(short) if is_primitive_name(type_name) => short.to_string(),
        _ => type_name.to_string(),
    }
}

/// Converts a wire type name back to its qualified form.
///
/// The leading `#` and the `Edm.` namespace are both optional on input.
#[must_use]
pub fn from_wire_type_name(wire: &str) -> String {
    let name = wire.strip_prefix('#').unwrap_or(wire);
    if let Some(item) = collection_item_name(name) {
        return format!("{}{})", COLLECTION_PREFIX, from_wire_type_name(item));
    }
    if !name.contains('.') && is_primitive_name(name) {
        format!("Edm.{}", name)
    } else {
        name.to_string()
    }
}

/// The payload kind named by the fragment of a context URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Entity,
    Delta,
    DeletedEntity,
    Link,
    DeletedLink,
    Other,
}

/// Classifies a context URL by its trailing fragment segment.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::vocabulary::{context_kind, ContextKind};
///
/// assert_eq!(
///     context_kind("http://host/$metadata#Customers/$deletedLink"),
///     ContextKind::DeletedLink
/// );
/// assert_eq!(context_kind("http://host/$metadata#Customers/$link"), ContextKind::Link);
/// assert_eq!(context_kind("http://host/$metadata#Customers"), ContextKind::Other);
/// ```
#[must_use]
pub fn context_kind(context: &str) -> ContextKind {
    let fragment = match context.find('#') {
        Some(pos) => &context[pos + 1..],
        None => context,
    };
    if fragment.ends_with(DELETED_LINK_SUFFIX) {
        ContextKind::DeletedLink
    } else if fragment.ends_with(LINK_SUFFIX) {
        ContextKind::Link
    } else if fragment.ends_with(DELETED_ENTITY_SUFFIX) {
        ContextKind::DeletedEntity
    } else if fragment.ends_with(ENTITY_SUFFIX) {
        ContextKind::Entity
    } else if fragment.ends_with(DELTA_SUFFIX) {
        ContextKind::Delta
    } else {
        ContextKind::Other
    }
}

/// Builds the context URL of a delta record: `{root}$metadata#{set}/{suffix}`.
#[must_use]
pub fn delta_context_url(service_root: Option<&str>, entity_set: Option<&str>, suffix: &str) -> String {
    let root = service_root.unwrap_or("");
    match entity_set {
        Some(set) => format!("{}$metadata#{}/{}", root, set, suffix),
        None => format!("{}$metadata#{}", root, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_annotation_of_annotation() {
        assert_eq!(
            classify("@NS.Term@odata.type"),
            PropertyName::PropertyODataAnnotation {
                property: "@NS.Term",
                name: "type"
            }
        );
        assert_eq!(
            classify("Price@NS.Term@type"),
            PropertyName::PropertyODataAnnotation {
                property: "Price@NS.Term",
                name: "type"
            }
        );
    }

    #[test]
    fn test_classify_full_metadata_reference() {
        assert_eq!(
            classify("http://host/$metadata#NS.Rate"),
            PropertyName::MetadataReference("http://host/$metadata#NS.Rate")
        );
    }

    #[test]
    fn test_classify_custom_property_annotation() {
        assert_eq!(
            classify("Price@Measures.Unit"),
            PropertyName::PropertyAnnotation {
                property: "Price",
                term: "Measures.Unit"
            }
        );
    }

    #[test]
    fn test_omit_prefix_spelling() {
        assert_eq!(odata_annotation(TYPE, false), "@odata.type");
        assert_eq!(odata_annotation(TYPE, true), "@type");
        assert_eq!(property_odata_annotation("Nav", BIND, false), "Nav@odata.bind");
    }

    #[test]
    fn test_wire_names_round_trip() {
        for name in [
            "Edm.Int32",
            "Edm.Untyped",
            "NS.Customer",
            "Collection(Edm.Guid)",
            "Collection(NS.Address)",
        ] {
            assert_eq!(from_wire_type_name(&to_wire_type_name(name)), name);
        }
    }

    #[test]
    fn test_context_kind_delta_fragments() {
        assert_eq!(context_kind("$metadata#Orders/$deletedEntity"), ContextKind::DeletedEntity);
        assert_eq!(context_kind("$metadata#Orders/$delta"), ContextKind::Delta);
        assert_eq!(context_kind("$metadata#Orders/$entity"), ContextKind::Entity);
    }
}
