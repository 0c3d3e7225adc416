//! Convention metadata.
//!
//! OData URL conventions let a client compute an entity's id, its links and
//! its advertised operations from the service root, the entity set and the
//! key. [`compute`] does exactly that, as a pure function of the model, the
//! [`NavigationSource`] and the resource's key values.
//!
//! Writers use the result two ways: under full metadata they fill in whatever
//! the caller did not set explicitly; under minimal metadata they drop
//! explicit values that merely repeat the convention. Readers use it to fill
//! id and edit link when the payload omitted them.
//!
//! ```rust
//! use odata_json_light::edm::{EdmTypeRef, ModelBuilder, PrimitiveKind, StructuredType};
//! use odata_json_light::metadata::{compute, NavigationSource};
//! use odata_json_light::Resource;
//!
//! let model = ModelBuilder::new()
//!     .structured_type(
//!         StructuredType::entity("NS.Customer")
//!             .key("Id")
//!             .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
//!             .navigation("Orders", "NS.Order", true),
//!     )
//!     .entity_set("Customers", "NS.Customer")
//!     .build();
//!
//! let source = NavigationSource::new("http://host/service/", "Customers");
//! let customer = Resource::of_type("NS.Customer").with_property("Id", 1i32);
//! let conventions = compute(&*model, &source, &customer).unwrap();
//!
//! assert_eq!(conventions.id, "http://host/service/Customers(1)");
//! assert_eq!(conventions.navigation_links[0].url, "http://host/service/Customers(1)/Orders");
//! ```

use crate::edm::{EdmModel, OperationKind, PrimitiveKind};
use crate::primitive::format_primitive;
use crate::vocabulary::{REF_SEGMENT, VALUE_SEGMENT};
use crate::{Operation, PrimitiveValue, Resource, Value};

/// The entity set a resource belongs to, and the service it lives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationSource {
    /// Service root URL, ending in `/`.
    pub service_root: String,
    pub entity_set: String,
}

impl NavigationSource {
    pub fn new(service_root: &str, entity_set: &str) -> Self {
        let mut root = service_root.to_string();
        if !root.ends_with('/') {
            root.push('/');
        }
        NavigationSource {
            service_root: root,
            entity_set: entity_set.to_string(),
        }
    }

    /// The context URL of this entity set.
    #[must_use]
    pub fn context_url(&self) -> String {
        format!("{}$metadata#{}", self.service_root, self.entity_set)
    }

    /// The context URL of a single entity of this entity set.
    #[must_use]
    pub fn entity_context_url(&self) -> String {
        format!("{}/$entity", self.context_url())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationLinks {
    pub name: String,
    pub url: String,
    pub association_link_url: String,
}

/// Everything the URL conventions say about one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ConventionMetadata {
    pub id: String,
    pub edit_link: String,
    pub read_link: String,
    pub navigation_links: Vec<NavigationLinks>,
    /// Edit links of declared stream properties, by property name.
    pub stream_links: Vec<(String, String)>,
    pub media_edit_link: Option<String>,
    pub actions: Vec<Operation>,
    pub functions: Vec<Operation>,
}

impl ConventionMetadata {
    #[must_use]
    pub fn navigation(&self, name: &str) -> Option<&NavigationLinks> {
        self.navigation_links.iter().find(|l| l.name == name)
    }
}

/// Computes convention metadata for an entity.
///
/// Returns `None` when the entity's type is unknown or a key value is missing
/// or not representable in a URL.
pub fn compute(model: &dyn EdmModel, source: &NavigationSource, resource: &Resource) -> Option<ConventionMetadata> {
    let type_name = match resource.type_name.as_deref() {
        Some(name) => name.to_string(),
        None => model.find_entity_set(&source.entity_set)?.entity_type.clone(),
    };
    let structured = model.find_structured_type(&type_name)?;
    if !structured.is_entity() {
        return None;
    }

    let key = format_key(&model.key_of(&type_name), resource)?;
    let id = format!("{}{}{}", source.service_root, source.entity_set, key);
    let edit_link = id.clone();

    let mut navigation_links = Vec::new();
    let mut stream_links = Vec::new();
    for property in model.properties_of(&type_name) {
        if property.is_navigation() {
            let url = format!("{}/{}", edit_link, property.name);
            navigation_links.push(NavigationLinks {
                name: property.name.clone(),
                association_link_url: format!("{}/{}", url, REF_SEGMENT),
                url,
            });
        } else if property.type_ref().and_then(|t| t.as_primitive()) == Some(PrimitiveKind::Stream) {
            stream_links.push((property.name.clone(), format!("{}/{}", edit_link, property.name)));
        }
    }

    let is_media = has_stream(model, &type_name);
    let media_edit_link = is_media.then(|| format!("{}/{}", edit_link, VALUE_SEGMENT));

    let mut actions = Vec::new();
    let mut functions = Vec::new();
    for op in model.operations_for(&type_name) {
        let operation = Operation::new(&format!("#{}", op.name))
            .with_title(&op.name)
            .with_target(&format!("{}/{}", edit_link, op.name));
        match op.kind {
            OperationKind::Action => actions.push(operation),
            OperationKind::Function => functions.push(operation),
        }
    }

    Some(ConventionMetadata {
        read_link: edit_link.clone(),
        id,
        edit_link,
        navigation_links,
        stream_links,
        media_edit_link,
        actions,
        functions,
    })
}

fn has_stream(model: &dyn EdmModel, type_name: &str) -> bool {
    let mut current = model.find_structured_type(type_name);
    while let Some(ty) = current {
        if ty.has_stream {
            return true;
        }
        current = ty.base_type.as_deref().and_then(|b| model.find_structured_type(b));
    }
    false
}

/// Formats the key segment: `(1)`, `('a')` or `(A=1,B='x')`.
fn format_key(key: &[String], resource: &Resource) -> Option<String> {
    if key.is_empty() {
        return None;
    }
    let literals = key
        .iter()
        .map(|name| resource.property(name).and_then(key_literal))
        .collect::<Option<Vec<_>>>()?;
    if literals.len() == 1 {
        return Some(format!("({})", literals[0]));
    }
    let pairs: Vec<String> = key
        .iter()
        .zip(literals)
        .map(|(name, literal)| format!("{}={}", name, literal))
        .collect();
    Some(format!("({})", pairs.join(",")))
}

fn key_literal(value: &Value) -> Option<String> {
    match value {
        Value::Primitive(PrimitiveValue::String(s)) => {
            Some(format!("'{}'", escape_segment(&s.replace('\'', "''"))))
        }
        Value::Primitive(PrimitiveValue::Binary(_)) => None,
        Value::Primitive(p) if p.is_non_finite() => None,
        Value::Primitive(p) => format_primitive(p, false)
            .ok()
            .map(|scalar| escape_segment(&scalar.as_str().map(str::to_string).unwrap_or_else(|| scalar.to_string()))),
        Value::Enum(e) => {
            let type_name = e.type_name.as_deref()?;
            Some(format!("{}'{}'", type_name, escape_segment(&e.value)))
        }
        _ => None,
    }
}

fn escape_segment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '/' => out.push_str("%2F"),
            '?' => out.push_str("%3F"),
            '#' => out.push_str("%23"),
            '+' => out.push_str("%2B"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::{EdmTypeRef, ModelBuilder, StructuredType};
    use std::sync::Arc;

    fn model() -> Arc<dyn EdmModel> {
        ModelBuilder::new()
            .structured_type(
                StructuredType::entity("NS.Line")
                    .key("OrderId")
                    .key("Code")
                    .property("OrderId", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                    .property("Code", EdmTypeRef::primitive(PrimitiveKind::String).not_null())
                    .property("Sheet", EdmTypeRef::primitive(PrimitiveKind::Stream)),
            )
            .structured_type(
                StructuredType::entity("NS.Photo")
                    .media()
                    .key("Name")
                    .property("Name", EdmTypeRef::primitive(PrimitiveKind::String).not_null()),
            )
            .entity_set("Lines", "NS.Line")
            .entity_set("Photos", "NS.Photo")
            .action("NS.Ship", "NS.Line")
            .function("NS.Total", "NS.Line")
            .build()
    }

    #[test]
    fn test_composite_key_and_operations() {
        let model = model();
        let source = NavigationSource::new("http://host", "Lines");
        let line = Resource::new()
            .with_property("OrderId", 7i32)
            .with_property("Code", "a b");
        let meta = compute(&*model, &source, &line).unwrap();
        assert_eq!(meta.id, "http://host/Lines(OrderId=7,Code='a%20b')");
        assert_eq!(meta.read_link, meta.edit_link);
        assert_eq!(meta.stream_links[0].1, "http://host/Lines(OrderId=7,Code='a%20b')/Sheet");
        assert_eq!(meta.actions[0].key(), "#NS.Ship");
        assert_eq!(
            meta.functions[0].target.as_deref(),
            Some("http://host/Lines(OrderId=7,Code='a%20b')/NS.Total")
        );
        assert!(meta.media_edit_link.is_none());
    }

    #[test]
    fn test_media_entity_and_quote_escaping() {
        let model = model();
        let source = NavigationSource::new("http://host/", "Photos");
        let photo = Resource::of_type("NS.Photo").with_property("Name", "it's");
        let meta = compute(&*model, &source, &photo).unwrap();
        assert_eq!(meta.id, "http://host/Photos('it''s')");
        assert_eq!(meta.media_edit_link.as_deref(), Some("http://host/Photos('it''s')/$value"));
    }

    #[test]
    fn test_missing_key_yields_nothing() {
        let model = model();
        let source = NavigationSource::new("http://host/", "Lines");
        assert!(compute(&*model, &source, &Resource::new().with_property("OrderId", 1i32)).is_none());
    }

    #[test]
    fn test_context_urls() {
        let source = NavigationSource::new("http://host", "Lines");
        assert_eq!(source.context_url(), "http://host/$metadata#Lines");
        assert_eq!(source.entity_context_url(), "http://host/$metadata#Lines/$entity");
    }
}
