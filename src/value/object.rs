use std::mem;

use arcstr::ArcStr;
use indexmap::map::{IndexMap, IntoIter};

use super::Value;

/// An ordered object value.
///
/// Field order follows insertion order, which the execution strategy keeps
/// equal to the order of the selection set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Object {
    key_value_list: IndexMap<ArcStr, Value>,
}

impl Object {
    /// Create a new Object value with a fixed number of
    /// preallocated slots for field-value pairs
    pub fn with_capacity(size: usize) -> Self {
        Self {
            key_value_list: IndexMap::with_capacity(size),
        }
    }

    /// Add a new field with a value
    ///
    /// If there is already a field for the given key and both values are
    /// objects, they are merged.
    ///
    /// Otherwise the existing value is replaced and returned.
    pub fn add_field(&mut self, k: impl Into<ArcStr>, value: Value) -> Option<Value> {
        let key = k.into();
        match (value, self.key_value_list.get_mut(&key)) {
            (Value::Object(obj_val), Some(Value::Object(existing_obj))) => {
                for (key, val) in obj_val {
                    _ = existing_obj.add_field(key, val);
                }
                None
            }
            (non_obj_val, _) => self.key_value_list.insert(key, non_obj_val),
        }
    }

    /// Check if the object already contains a field with the given name
    pub fn contains_field(&self, f: &str) -> bool {
        self.key_value_list.contains_key(f)
    }

    /// Get an iterator over all field value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &Value)> {
        self.key_value_list.iter()
    }

    /// Get the current number of fields
    pub fn field_count(&self) -> usize {
        self.key_value_list.len()
    }

    /// Get the value for a given field
    pub fn get_field_value(&self, key: &str) -> Option<&Value> {
        self.key_value_list.get(key)
    }

    /// Removes the value for a given field, leaving `null` in its slot so the
    /// field order is preserved.
    pub fn take_field_value(&mut self, key: &str) -> Option<Value> {
        self.key_value_list.get_mut(key).map(mem::take)
    }
}

impl IntoIterator for Object {
    type Item = (ArcStr, Value);
    type IntoIter = IntoIter<ArcStr, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.key_value_list.into_iter()
    }
}

impl<K> FromIterator<(K, Value)> for Object
where
    K: Into<ArcStr>,
{
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
    {
        let iter = iter.into_iter();
        let mut ret = Self {
            key_value_list: IndexMap::with_capacity(iter.size_hint().0),
        };
        for (k, v) in iter {
            _ = ret.add_field(k, v);
        }
        ret
    }
}
