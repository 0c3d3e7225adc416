//! In-memory representation of OData values.
//!
//! This module provides the [`Value`] enum, a tagged union over every value a
//! JSON Light payload can carry, and the leaf types it is built from.
//!
//! ## Core Types
//!
//! - [`Value`]: null, primitive, enum, resource, collection, stream reference or untyped raw JSON
//! - [`PrimitiveValue`]: a scalar together with its exact EDM primitive kind
//! - [`CollectionValue`]: an ordered, homogeneous list of values
//! - [`TypeAnnotation`]: an explicit type-name hint that overrides what the writer would decide
//!
//! ## Usage Patterns
//!
//! ```rust
//! use odata_json_light::{PrimitiveValue, Value};
//!
//! let count = Value::from(42i32);
//! let small = Value::from(7i16);
//! let text = Value::from("hello");
//!
//! assert!(count.is_primitive());
//! assert_eq!(small.as_primitive().map(|p| p.kind().full_name()), Some("Edm.Int16"));
//! assert_eq!(text.as_str(), Some("hello"));
//! ```
//!
//! ### Extracting Values
//!
//! ```rust
//! use odata_json_light::Value;
//! use std::convert::TryFrom;
//!
//! let value = Value::from(42i64);
//! let num: i64 = i64::try_from(value).unwrap();
//! assert_eq!(num, 42);
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::edm::PrimitiveKind;
use crate::Resource;

/// A dynamically-typed OData value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Primitive(PrimitiveValue),
    Enum(EnumValue),
    Resource(Box<Resource>),
    Collection(CollectionValue),
    Stream(StreamReference),
    Untyped(UntypedValue),
}

/// A primitive scalar tagged with its exact EDM kind.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveValue {
    Binary(Vec<u8>),
    Boolean(bool),
    Byte(u8),
    Date(NaiveDate),
    DateTimeOffset(DateTime<FixedOffset>),
    /// Decimal digits kept as validated text so no precision is lost.
    Decimal(String),
    Double(f64),
    Duration(chrono::Duration),
    Guid(Uuid),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    String(String),
    TimeOfDay(NaiveTime),
}

impl PrimitiveValue {
    /// Returns the exact EDM kind of this value.
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveValue::Binary(_) => PrimitiveKind::Binary,
            PrimitiveValue::Boolean(_) => PrimitiveKind::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveKind::Byte,
            PrimitiveValue::Date(_) => PrimitiveKind::Date,
            PrimitiveValue::DateTimeOffset(_) => PrimitiveKind::DateTimeOffset,
            PrimitiveValue::Decimal(_) => PrimitiveKind::Decimal,
            PrimitiveValue::Double(_) => PrimitiveKind::Double,
            PrimitiveValue::Duration(_) => PrimitiveKind::Duration,
            PrimitiveValue::Guid(_) => PrimitiveKind::Guid,
            PrimitiveValue::Int16(_) => PrimitiveKind::Int16,
            PrimitiveValue::Int32(_) => PrimitiveKind::Int32,
            PrimitiveValue::Int64(_) => PrimitiveKind::Int64,
            PrimitiveValue::SByte(_) => PrimitiveKind::SByte,
            PrimitiveValue::Single(_) => PrimitiveKind::Single,
            PrimitiveValue::String(_) => PrimitiveKind::String,
            PrimitiveValue::TimeOfDay(_) => PrimitiveKind::TimeOfDay,
        }
    }

    /// Returns `true` for an infinite or NaN Single or Double.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::PrimitiveValue;
    ///
    /// assert!(PrimitiveValue::Double(f64::INFINITY).is_non_finite());
    /// assert!(PrimitiveValue::Single(f32::NAN).is_non_finite());
    /// assert!(!PrimitiveValue::Double(1.5).is_non_finite());
    /// ```
    #[inline]
    #[must_use]
    pub fn is_non_finite(&self) -> bool {
        match self {
            PrimitiveValue::Double(d) => !d.is_finite(),
            PrimitiveValue::Single(s) => !s.is_finite(),
            _ => false,
        }
    }

    /// Returns `true` if the plain JSON form of this value reads back as the same kind.
    #[must_use]
    pub fn is_self_describing(&self) -> bool {
        self.kind().is_json_native() && !self.is_non_finite()
    }
}

/// An enumeration member, by name.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumValue {
    pub value: String,
    pub type_name: Option<String>,
}

impl EnumValue {
    pub fn new(type_name: &str, value: &str) -> Self {
        EnumValue {
            value: value.to_string(),
            type_name: Some(type_name.to_string()),
        }
    }
}

/// An explicit serialization type-name hint.
///
/// `Some(name)` forces `name` onto the wire; `None` forces the type name to be
/// omitted. Under no-metadata nothing is written either way.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::TypeAnnotation;
///
/// assert_eq!(TypeAnnotation::new("NS.Address").type_name.as_deref(), Some("NS.Address"));
/// assert!(TypeAnnotation::suppress().type_name.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub type_name: Option<String>,
}

impl TypeAnnotation {
    pub fn new(type_name: &str) -> Self {
        TypeAnnotation {
            type_name: Some(type_name.to_string()),
        }
    }

    pub fn suppress() -> Self {
        TypeAnnotation { type_name: None }
    }
}

/// An ordered collection of values.
///
/// Items must all be of the same wire shape: primitives (or enums) only, or
/// resources only. `null` may appear among either.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CollectionValue {
    /// Qualified collection type name, e.g. `Collection(NS.Address)`.
    pub type_name: Option<String>,
    pub items: Vec<Value>,
    pub type_annotation: Option<TypeAnnotation>,
}

impl CollectionValue {
    pub fn new(type_name: Option<&str>, items: Vec<Value>) -> Self {
        CollectionValue {
            type_name: type_name.map(str::to_string),
            items,
            type_annotation: None,
        }
    }

    #[must_use]
    pub fn with_type_annotation(mut self, annotation: TypeAnnotation) -> Self {
        self.type_annotation = Some(annotation);
        self
    }

    /// Wire shape shared by every non-null item, or `None` when the items disagree.
    pub(crate) fn item_shape(&self) -> Option<ItemShape> {
        let mut shape = ItemShape::Empty;
        for item in &self.items {
            let current = match item {
                Value::Null | Value::Untyped(_) => continue,
                Value::Primitive(_) | Value::Enum(_) => ItemShape::Scalar,
                Value::Resource(_) => ItemShape::Resource,
                Value::Collection(_) | Value::Stream(_) => return None,
            };
            if shape != ItemShape::Empty && shape != current {
                return None;
            }
            shape = current;
        }
        Some(shape)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ItemShape {
    Empty,
    Scalar,
    Resource,
}

/// Links and metadata of a binary stream: a stream property or a media resource.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct StreamReference {
    pub edit_link: Option<String>,
    pub read_link: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl StreamReference {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edit_link.is_none()
            && self.read_link.is_none()
            && self.content_type.is_none()
            && self.etag.is_none()
    }
}

/// Opaque JSON text of a value whose type could not be determined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UntypedValue(pub String);

impl UntypedValue {
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.0
    }
}

impl Value {
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        matches!(self, Value::Primitive(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_resource(&self) -> bool {
        matches!(self, Value::Resource(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Value::Collection(_))
    }

    #[must_use]
    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_collection(&self) -> Option<&CollectionValue> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// If the value is a string primitive, returns it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::Value;
    ///
    /// assert_eq!(Value::from("x").as_str(), Some("x"));
    /// assert_eq!(Value::from(1i32).as_str(), None);
    /// ```
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Primitive(PrimitiveValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Widens any integral primitive to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Primitive(PrimitiveValue::Byte(v)) => Some(i64::from(*v)),
            Value::Primitive(PrimitiveValue::SByte(v)) => Some(i64::from(*v)),
            Value::Primitive(PrimitiveValue::Int16(v)) => Some(i64::from(*v)),
            Value::Primitive(PrimitiveValue::Int32(v)) => Some(i64::from(*v)),
            Value::Primitive(PrimitiveValue::Int64(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Primitive(PrimitiveValue::Double(v)) => Some(*v),
            Value::Primitive(PrimitiveValue::Single(v)) => Some(f64::from(*v)),
            _ => self.as_i64().map(|i| i as f64),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Primitive(PrimitiveValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// A short description of the variant, used in error messages.
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Primitive(_) => "primitive",
            Value::Enum(_) => "enum",
            Value::Resource(_) => "resource",
            Value::Collection(_) => "collection",
            Value::Stream(_) => "stream",
            Value::Untyped(_) => "untyped",
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = crate::Error;

    fn try_from(value: Value) -> crate::Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| crate::Error::custom(format!("expected integer, found {:?}", value)))
    }
}

impl TryFrom<Value> for f64 {
    type Error = crate::Error;

    fn try_from(value: Value) -> crate::Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| crate::Error::custom(format!("expected number, found {:?}", value)))
    }
}

impl TryFrom<Value> for bool {
    type Error = crate::Error;

    fn try_from(value: Value) -> crate::Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| crate::Error::custom(format!("expected bool, found {:?}", value)))
    }
}

impl TryFrom<Value> for String {
    type Error = crate::Error;

    fn try_from(value: Value) -> crate::Result<Self> {
        match value {
            Value::Primitive(PrimitiveValue::String(s)) => Ok(s),
            Value::Enum(e) => Ok(e.value),
            _ => Err(crate::Error::custom(format!(
                "expected string, found {:?}",
                value
            ))),
        }
    }
}

macro_rules! primitive_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PrimitiveValue {
                fn from(value: $ty) -> Self {
                    PrimitiveValue::$variant(value)
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Primitive(PrimitiveValue::$variant(value))
                }
            }
        )*
    };
}

primitive_from! {
    bool => Boolean,
    u8 => Byte,
    i8 => SByte,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Single,
    f64 => Double,
    String => String,
    Uuid => Guid,
    NaiveDate => Date,
    NaiveTime => TimeOfDay,
    DateTime<FixedOffset> => DateTimeOffset,
    chrono::Duration => Duration,
    Vec<u8> => Binary,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Primitive(PrimitiveValue::String(value.to_string()))
    }
}

impl From<PrimitiveValue> for Value {
    fn from(value: PrimitiveValue) -> Self {
        Value::Primitive(value)
    }
}

impl From<EnumValue> for Value {
    fn from(value: EnumValue) -> Self {
        Value::Enum(value)
    }
}

impl From<Resource> for Value {
    fn from(value: Resource) -> Self {
        Value::Resource(Box::new(value))
    }
}

impl From<CollectionValue> for Value {
    fn from(value: CollectionValue) -> Self {
        Value::Collection(value)
    }
}

impl From<StreamReference> for Value {
    fn from(value: StreamReference) -> Self {
        Value::Stream(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tryfrom_i64() {
        let result: i64 = TryFrom::try_from(Value::from(42i32)).unwrap();
        assert_eq!(result, 42);

        let result: i64 = TryFrom::try_from(Value::from(7u8)).unwrap();
        assert_eq!(result, 7);

        assert!(i64::try_from(Value::from("test")).is_err());
    }

    #[test]
    fn test_tryfrom_f64() {
        let result: f64 = TryFrom::try_from(Value::from(3.5f64)).unwrap();
        assert_eq!(result, 3.5);

        let result: f64 = TryFrom::try_from(Value::from(f64::INFINITY)).unwrap();
        assert_eq!(result, f64::INFINITY);
    }

    #[test]
    fn test_tryfrom_string_accepts_enum_members() {
        let value = Value::Enum(EnumValue::new("NS.Color", "Red"));
        assert_eq!(String::try_from(value).unwrap(), "Red");
        assert!(String::try_from(Value::from(1i32)).is_err());
    }

    #[test]
    fn test_from_primitives_keeps_exact_kind() {
        assert_eq!(
            Value::from(1i16).as_primitive().map(PrimitiveValue::kind),
            Some(PrimitiveKind::Int16)
        );
        assert_eq!(
            Value::from(1.0f32).as_primitive().map(PrimitiveValue::kind),
            Some(PrimitiveKind::Single)
        );
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[test]
    fn test_self_describing() {
        assert!(PrimitiveValue::Int32(1).is_self_describing());
        assert!(PrimitiveValue::Double(1.5).is_self_describing());
        assert!(!PrimitiveValue::Double(f64::NAN).is_self_describing());
        assert!(!PrimitiveValue::Int16(1).is_self_describing());
        assert!(!PrimitiveValue::Int64(1).is_self_describing());
    }

    #[test]
    fn test_item_shape() {
        let scalars = CollectionValue::new(None, vec![Value::from(1i32), Value::Null]);
        assert_eq!(scalars.item_shape(), Some(ItemShape::Scalar));

        let mixed = CollectionValue::new(
            None,
            vec![Value::from(1i32), Value::from(Resource::new())],
        );
        assert_eq!(mixed.item_shape(), None);

        assert_eq!(CollectionValue::default().item_shape(), Some(ItemShape::Empty));
    }
}
