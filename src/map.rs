//! Ordered property map for resources.
//!
//! This module provides [`PropertyMap`], a wrapper around [`IndexMap`] that
//! keeps properties in the order they were read or added. Order matters on the
//! wire: writers emit properties in insertion order so that a payload read and
//! written back comes out identical.
//!
//! Property names are unique within a resource. [`PropertyMap::insert`]
//! rejects a second property with the same name instead of replacing it.
//!
//! ## Examples
//!
//! ```rust
//! use odata_json_light::{Property, PropertyMap, Value};
//!
//! let mut map = PropertyMap::new();
//! map.insert(Property::new("Name", Value::from("Alice"))).unwrap();
//! map.insert(Property::new("Age", Value::from(30i32))).unwrap();
//!
//! assert_eq!(map.len(), 2);
//! assert_eq!(map.value("Name").and_then(|v| v.as_str()), Some("Alice"));
//! assert!(map.insert(Property::new("Name", Value::Null)).is_err());
//! ```

use indexmap::IndexMap;

use crate::{Error, Property, Result, Value};

/// An ordered map of property names to properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyMap(IndexMap<String, Property>);

impl PropertyMap {
    #[must_use]
    pub fn new() -> Self {
        PropertyMap(IndexMap::new())
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        PropertyMap(IndexMap::with_capacity(capacity))
    }

    /// Appends a property.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateProperty`] if a property with the same name is already present.
    pub fn insert(&mut self, property: Property) -> Result<()> {
        if self.0.contains_key(&property.name) {
            return Err(Error::DuplicateProperty(property.name));
        }
        self.0.insert(property.name.clone(), property);
        Ok(())
    }

    /// Adds a property, replacing any existing property with the same name in place.
    pub fn set(&mut self, property: Property) {
        self.0.insert(property.name.clone(), property);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.0.get_mut(name)
    }

    /// Returns the value of the named property.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(|p| &p.value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Removes a property, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.0.shift_remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the property names, in insertion order.
    pub fn names(&self) -> indexmap::map::Keys<'_, String, Property> {
        self.0.keys()
    }

    /// Returns an iterator over the properties, in insertion order.
    pub fn iter(&self) -> indexmap::map::Values<'_, String, Property> {
        self.0.values()
    }
}

impl IntoIterator for PropertyMap {
    type Item = Property;
    type IntoIter = indexmap::map::IntoValues<String, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

impl<'a> IntoIterator for &'a PropertyMap {
    type Item = &'a Property;
    type IntoIter = indexmap::map::Values<'a, String, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}

/// Collects properties, keeping the last one when names repeat.
impl FromIterator<Property> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        PropertyMap(iter.into_iter().map(|p| (p.name.clone(), p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_is_kept() {
        let mut map = PropertyMap::new();
        for name in ["b", "a", "c"] {
            map.insert(Property::new(name, Value::Null)).unwrap();
        }
        let names: Vec<_> = map.names().cloned().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut map = PropertyMap::new();
        map.insert(Property::new("Id", Value::from(1i32))).unwrap();
        let err = map.insert(Property::new("Id", Value::from(2i32))).unwrap_err();
        assert_eq!(err, Error::DuplicateProperty("Id".into()));
        assert_eq!(map.value("Id").and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn test_remove_keeps_order() {
        let map: PropertyMap = ["x", "y", "z"]
            .into_iter()
            .map(|n| Property::new(n, Value::Null))
            .collect();
        let mut map = map;
        map.remove("y");
        let names: Vec<_> = map.names().cloned().collect();
        assert_eq!(names, vec!["x", "z"]);
    }
}
