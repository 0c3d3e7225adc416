//! Conversion from `serde::Serialize` types into [`Value`]s.
//!
//! Structs and maps become [`Resource`]s, sequences and tuples become
//! [`CollectionValue`]s, and scalars become the closest EDM primitive. Unit
//! enum variants become [`EnumValue`]s without a type name; variants with data
//! have no OData counterpart and are rejected.
//!
//! | Rust | EDM |
//! |------|-----|
//! | `bool` | `Edm.Boolean` |
//! | `i8`, `u8` | `Edm.SByte`, `Edm.Byte` |
//! | `i16`, `u16` | `Edm.Int16`, `Edm.Int32` |
//! | `i32`, `u32` | `Edm.Int32`, `Edm.Int64` |
//! | `i64`, `u64` | `Edm.Int64`, `Edm.Int64` or `Edm.Decimal` |
//! | `f32`, `f64` | `Edm.Single`, `Edm.Double` |
//! | `char`, `&str` | `Edm.String` |
//! | `&[u8]` via `serialize_bytes` | `Edm.Binary` |
//!
//! ```rust
//! use serde::Serialize;
//! use odata_json_light::{to_resource, Value};
//!
//! #[derive(Serialize)]
//! struct Customer {
//!     id: i32,
//!     name: String,
//!     tags: Vec<String>,
//! }
//!
//! let customer = Customer { id: 1, name: "Alice".into(), tags: vec!["vip".into()] };
//! let resource = to_resource(Some("NS.Customer"), &customer).unwrap();
//!
//! assert_eq!(resource.type_name.as_deref(), Some("NS.Customer"));
//! assert_eq!(resource.property("id"), Some(&Value::from(1i32)));
//! ```

use serde::ser::{self, Serialize};

use crate::{CollectionValue, EnumValue, Error, PrimitiveValue, Property, PropertyMap, Resource, Result, Value};

/// Converts any `Serialize` value into a [`Value`].
pub fn to_value<T>(value: &T) -> Result<Value>
where
    T: ?Sized + Serialize,
{
    value.serialize(ValueSerializer)
}

/// Converts a struct or map into a [`Resource`] of the given type.
///
/// # Errors
///
/// Fails with [`Error::Custom`] when `value` does not serialize as a struct or map.
pub fn to_resource<T>(type_name: Option<&str>, value: &T) -> Result<Resource>
where
    T: ?Sized + Serialize,
{
    match to_value(value)? {
        Value::Resource(resource) => {
            let mut resource = *resource;
            resource.type_name = type_name.map(str::to_string);
            Ok(resource)
        }
        other => Err(Error::custom(format!("expected a struct or map, found {}", other.describe()))),
    }
}

/// A `serde` serializer producing [`Value`]s.
pub struct ValueSerializer;

pub struct SerializeVec {
    items: Vec<Value>,
}

pub struct SerializeResource {
    properties: PropertyMap,
    current_key: Option<String>,
}

impl SerializeResource {
    fn new() -> Self {
        SerializeResource {
            properties: PropertyMap::new(),
            current_key: None,
        }
    }

    fn push<T>(&mut self, name: String, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let value = to_value(value)?;
        self.properties.insert(Property::new(&name, value))
    }

    fn finish(self) -> Value {
        let mut resource = Resource::new();
        resource.properties = self.properties;
        Value::from(resource)
    }
}

fn primitive(value: impl Into<PrimitiveValue>) -> Result<Value> {
    Ok(Value::Primitive(value.into()))
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeVec;
    type SerializeTuple = SerializeVec;
    type SerializeTupleStruct = SerializeVec;
    type SerializeTupleVariant = ser::Impossible<Value, Error>;
    type SerializeMap = SerializeResource;
    type SerializeStruct = SerializeResource;
    type SerializeStructVariant = ser::Impossible<Value, Error>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        primitive(v)
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        primitive(v)
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        primitive(v)
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        primitive(v)
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        primitive(v)
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        primitive(v)
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        primitive(i32::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        primitive(i64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        match i64::try_from(v) {
            Ok(v) => primitive(v),
            Err(_) => Ok(Value::Primitive(PrimitiveValue::Decimal(v.to_string()))),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        primitive(v)
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        primitive(v)
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        primitive(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        primitive(v.to_string())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        primitive(v.to_vec())
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(self, _name: &'static str, _variant_index: u32, variant: &'static str) -> Result<Value> {
        Ok(Value::Enum(EnumValue {
            value: variant.to_string(),
            type_name: None,
        }))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        Err(Error::custom(format!("enum variant {}::{} carries data", name, variant)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeVec> {
        Ok(SerializeVec {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::custom(format!("enum variant {}::{} carries data", name, variant)))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeResource> {
        Ok(SerializeResource::new())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<SerializeResource> {
        Ok(SerializeResource::new())
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::custom(format!("enum variant {}::{} carries data", name, variant)))
    }
}

impl ser::SerializeSeq for SerializeVec {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Collection(CollectionValue::new(None, self.items)))
    }
}

impl ser::SerializeTuple for SerializeVec {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeVec {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeMap for SerializeResource {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        match to_value(key)? {
            Value::Primitive(PrimitiveValue::String(name)) => {
                self.current_key = Some(name);
                Ok(())
            }
            other => Err(Error::custom(format!("property names must be strings, found {}", other.describe()))),
        }
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .current_key
            .take()
            .ok_or_else(|| Error::custom("serialize_value called without serialize_key"))?;
        self.push(key, value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for SerializeResource {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(key.to_string(), value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    enum Color {
        Red,
        Custom(u8),
    }

    #[derive(Serialize)]
    struct Address {
        city: String,
        zip: Option<String>,
    }

    #[derive(Serialize)]
    struct Customer {
        id: u32,
        big: u64,
        favourite: Color,
        address: Address,
        scores: Vec<i16>,
    }

    #[test]
    fn test_struct_to_resource() {
        let customer = Customer {
            id: 7,
            big: u64::MAX,
            favourite: Color::Red,
            address: Address {
                city: "Oslo".into(),
                zip: None,
            },
            scores: vec![1, 2],
        };
        let resource = to_resource(Some("NS.Customer"), &customer).unwrap();

        assert_eq!(resource.property("id"), Some(&Value::from(7i64)));
        assert_eq!(
            resource.property("big"),
            Some(&Value::Primitive(PrimitiveValue::Decimal(u64::MAX.to_string())))
        );
        assert_eq!(
            resource.property("favourite"),
            Some(&Value::Enum(EnumValue {
                value: "Red".into(),
                type_name: None
            }))
        );
        let address = resource.property("address").and_then(Value::as_resource).unwrap();
        assert_eq!(address.property("zip"), Some(&Value::Null));
        let scores = resource.property("scores").and_then(Value::as_collection).unwrap();
        assert_eq!(scores.items, vec![Value::from(1i16), Value::from(2i16)]);
    }

    #[test]
    fn test_rejections() {
        assert!(to_value(&Color::Custom(3)).is_err());
        assert!(to_resource(None, &5i32).is_err());

        let mut keyed = BTreeMap::new();
        keyed.insert(1, "one");
        assert!(to_value(&keyed).is_err());
    }
}
