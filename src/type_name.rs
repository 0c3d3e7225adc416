//! Type-name decisions for writing.
//!
//! Whether a value carries `@odata.type` depends on the metadata level, on
//! what the reader will already know (the declared type), and on whether the
//! JSON shape alone identifies the value's type. [`TypeNameOracle`] holds one
//! strategy per metadata level and answers that question at every value
//! boundary.
//!
//! An explicit [`TypeAnnotation`] always wins, even when it names the declared
//! type, except under no-metadata where nothing is ever written.
//!
//! ```rust
//! use odata_json_light::edm::{EdmTypeRef, PrimitiveKind};
//! use odata_json_light::type_name::TypeNameOracle;
//! use odata_json_light::{MetadataLevel, Value};
//!
//! let oracle = TypeNameOracle::for_level(MetadataLevel::Minimal);
//!
//! // Int16 is ambiguous in JSON when nothing declares it
//! assert_eq!(oracle.value_type_name(&Value::from(7i16), None, None).as_deref(), Some("Edm.Int16"));
//!
//! // but inferable from a declared type
//! let declared = EdmTypeRef::primitive(PrimitiveKind::Int16);
//! assert_eq!(oracle.value_type_name(&Value::from(7i16), None, Some(&declared)), None);
//! ```

use tracing::trace;

use crate::edm::{EdmModel, EdmType, EdmTypeRef, StructuredKind};
use crate::{CollectionValue, EnumValue, MetadataLevel, PrimitiveValue, Resource, TypeAnnotation, Value};

/// One type-name strategy per metadata level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeNameOracle {
    FullMetadata,
    MinimalMetadata,
    NoMetadata,
}

impl TypeNameOracle {
    #[must_use]
    pub const fn for_level(level: MetadataLevel) -> Self {
        match level {
            MetadataLevel::Full => TypeNameOracle::FullMetadata,
            MetadataLevel::Minimal => TypeNameOracle::MinimalMetadata,
            MetadataLevel::None => TypeNameOracle::NoMetadata,
        }
    }

    /// The type name to write inside a resource's object, if any.
    ///
    /// `expected` is the type the reader will assume: the entity type of the
    /// set, the declared type of the property, or nothing for top-level and
    /// dynamic values.
    pub fn resource_type_name(
        &self,
        model: &dyn EdmModel,
        resource: &Resource,
        expected: Option<&str>,
    ) -> Option<String> {
        let decision = match self {
            TypeNameOracle::NoMetadata => None,
            _ if resource.type_annotation.is_some() => {
                resource.type_annotation.as_ref().and_then(|a| a.type_name.clone())
            }
            TypeNameOracle::FullMetadata => resource.type_name.clone(),
            TypeNameOracle::MinimalMetadata => {
                let actual = resource.type_name.as_deref();
                match (actual, expected) {
                    (Some(actual), Some(expected)) if actual != expected => Some(actual.to_string()),
                    (Some(actual), None) => {
                        let complex = model
                            .find_structured_type(actual)
                            .map(|t| t.kind == StructuredKind::Complex)
                            .unwrap_or(false);
                        complex.then(|| actual.to_string())
                    }
                    _ => None,
                }
            }
        };
        trace!(oracle = ?self, type_name = ?decision, "resource type name");
        decision
    }

    /// The type name to write for a primitive, enum or collection value, if any.
    ///
    /// `annotation` is the hint attached to the owning property; collections
    /// may also carry their own.
    pub fn value_type_name(
        &self,
        value: &Value,
        annotation: Option<&TypeAnnotation>,
        expected: Option<&EdmTypeRef>,
    ) -> Option<String> {
        if *self == TypeNameOracle::NoMetadata {
            return None;
        }
        let annotation = match value {
            Value::Collection(c) => c.type_annotation.as_ref().or(annotation),
            _ => annotation,
        };
        if let Some(annotation) = annotation {
            return annotation.type_name.clone();
        }
        let decision = match value {
            Value::Primitive(p) => self.primitive_type_name(p, expected),
            Value::Enum(e) => enum_type_name(e, expected),
            Value::Collection(c) => collection_type_name(c, expected),
            _ => None,
        };
        trace!(oracle = ?self, type_name = ?decision, "value type name");
        decision
    }

    fn primitive_type_name(&self, value: &PrimitiveValue, expected: Option<&EdmTypeRef>) -> Option<String> {
        let actual = value.kind().full_name();
        let open_slot = match expected {
            None => true,
            Some(e) => e.is_untyped() || e.as_primitive().map(|k| k.is_abstract()).unwrap_or(false),
        };
        match self {
            TypeNameOracle::FullMetadata if open_slot && expected.is_some() => Some(actual.to_string()),
            TypeNameOracle::FullMetadata | TypeNameOracle::MinimalMetadata if open_slot => {
                (!value.is_self_describing()).then(|| actual.to_string())
            }
            _ => None,
        }
    }
}

fn enum_type_name(value: &EnumValue, expected: Option<&EdmTypeRef>) -> Option<String> {
    let actual = value.type_name.as_deref()?;
    match expected.map(|e| &e.definition) {
        Some(EdmType::Enum(declared)) if declared == actual => None,
        _ => Some(actual.to_string()),
    }
}

fn collection_type_name(value: &CollectionValue, expected: Option<&EdmTypeRef>) -> Option<String> {
    let actual = value.type_name.as_deref()?;
    match expected {
        Some(e) if e.full_name() == actual => None,
        _ => Some(actual.to_string()),
    }
}
