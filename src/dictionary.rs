//! An ordered map of [`Key`] to [`Value`].
//!
//! The map is currently backed by an [`IndexMap`]. This may be changed in
//! a future minor release.
//!
//! [`IndexMap`]: https://docs.rs/indexmap/latest/indexmap/map/struct.IndexMap.html

use indexmap::{map, IndexMap};
#[cfg(feature = "serde")]
use serde::{de, ser};
use std::{
    fmt::{self, Debug},
    hash::Hash,
    iter::FromIterator,
    ops,
};

use crate::Value;

/// A mapping entry's key: either a method/field name, or a binary event id.
///
/// Text dialects only ever produce `Key::Name`; the binary dialect may
/// produce either, since its mappings can key entries by a numeric event
/// id instead of spelling the name out.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Name(String),
    Id(i64),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(s) => Some(s),
            Key::Id(_) => None,
        }
    }

    pub fn as_id(&self) -> Option<i64> {
        match self {
            Key::Id(id) => Some(*id),
            Key::Name(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(s) => f.write_str(s),
            Key::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<String> for Key {
    fn from(s: String) -> Key {
        Key::Name(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Key {
        Key::Name(s.to_owned())
    }
}

impl From<i64> for Key {
    fn from(id: i64) -> Key {
        Key::Id(id)
    }
}

/// An ordered mapping from [`Key`] to [`Value`], preserving insertion order
/// the way every dialect's mapping event stream requires.
pub struct Dictionary {
    map: IndexMap<Key, Value>,
}

impl Dictionary {
    /// Makes a new empty `Dictionary`.
    #[inline]
    pub fn new() -> Self {
        Dictionary {
            map: IndexMap::new(),
        }
    }

    /// Clears the dictionary, removing all values.
    #[inline]
    pub fn clear(&mut self) {
        self.map.clear()
    }

    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn get<K: Into<Key>>(&self, key: K) -> Option<&Value> {
        self.map.get(&key.into())
    }

    /// Returns true if the dictionary contains a value for the specified
    /// key.
    #[inline]
    pub fn contains_key<K: Into<Key>>(&self, key: K) -> bool {
        self.map.contains_key(&key.into())
    }

    /// Returns a mutable reference to the value corresponding to the key.
    #[inline]
    pub fn get_mut<K: Into<Key>>(&mut self, key: K) -> Option<&mut Value> {
        self.map.get_mut(&key.into())
    }

    /// Inserts a key-value pair into the dictionary.
    ///
    /// If the dictionary did not have this key present, `None` is
    /// returned. If it did, the old value is returned.
    #[inline]
    pub fn insert<K: Into<Key>>(&mut self, k: K, v: Value) -> Option<Value> {
        self.map.insert(k.into(), v)
    }

    /// Removes a key from the dictionary, returning its value if present.
    #[inline]
    pub fn remove<K: Into<Key>>(&mut self, key: K) -> Option<Value> {
        self.map.remove(&key.into())
    }

    /// Scan through each key-value pair in the map and keep those where the
    /// closure `keep` returns `true`.
    #[inline]
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Key, &mut Value) -> bool,
    {
        self.map.retain(keep)
    }

    /// Sort the dictionary's entries by key.
    ///
    /// Used by the canonical binary dialect, which requires mapping keys
    /// in byte order.
    #[inline]
    pub fn sort_keys(&mut self) {
        self.map.sort_keys()
    }

    /// Returns the number of elements in the dictionary.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the dictionary contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Gets an iterator over the entries of the dictionary.
    #[inline]
    pub fn iter(&self) -> Iter {
        Iter {
            iter: self.map.iter(),
        }
    }

    /// Gets a mutable iterator over the entries of the dictionary.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut {
        IterMut {
            iter: self.map.iter_mut(),
        }
    }

    /// Gets an iterator over the keys of the dictionary.
    #[inline]
    pub fn keys(&self) -> Keys {
        Keys {
            iter: self.map.keys(),
        }
    }

    /// Gets an iterator over the values of the dictionary.
    #[inline]
    pub fn values(&self) -> Values {
        Values {
            iter: self.map.values(),
        }
    }

    /// Gets an iterator over mutable values of the dictionary.
    #[inline]
    pub fn values_mut(&mut self) -> ValuesMut {
        ValuesMut {
            iter: self.map.values_mut(),
        }
    }
}

impl Default for Dictionary {
    #[inline]
    fn default() -> Self {
        Dictionary {
            map: Default::default(),
        }
    }
}

impl Clone for Dictionary {
    #[inline]
    fn clone(&self) -> Self {
        Dictionary {
            map: self.map.clone(),
        }
    }
}

impl PartialEq for Dictionary {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.map.eq(&other.map)
    }
}

/// Access an element of this dictionary. Panics if the given key is not
/// present in the dictionary.
impl<'a> ops::Index<&'a str> for Dictionary {
    type Output = Value;

    fn index(&self, index: &str) -> &Value {
        self.map.index(&Key::Name(index.to_owned()))
    }
}

/// Mutably access an element of this dictionary. Panics if the given key
/// is not present in the dictionary.
impl<'a> ops::IndexMut<&'a str> for Dictionary {
    fn index_mut(&mut self, index: &str) -> &mut Value {
        self.map
            .get_mut(&Key::Name(index.to_owned()))
            .expect("no entry found for key")
    }
}

impl Debug for Dictionary {
    #[inline]
    fn fmt(&self, formatter: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        self.map.fmt(formatter)
    }
}

#[cfg(feature = "serde")]
impl ser::Serialize for Dictionary {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self {
            map.serialize_entry(&k.to_string(), v)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> de::Deserialize<'de> for Dictionary {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Dictionary;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map")
            }

            #[inline]
            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Dictionary::new())
            }

            #[inline]
            fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
            where
                V: de::MapAccess<'de>,
            {
                let mut values = Dictionary::new();

                while let Some((key, value)) = visitor.next_entry::<String, Value>()? {
                    values.insert(key, value);
                }

                Ok(values)
            }
        }

        deserializer.deserialize_map(Visitor)
    }
}

impl<K: Into<Key>> FromIterator<(K, Value)> for Dictionary {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (K, Value)>,
    {
        Dictionary {
            map: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<K: Into<Key>> Extend<(K, Value)> for Dictionary {
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = (K, Value)>,
    {
        self.map.extend(iter.into_iter().map(|(k, v)| (k.into(), v)));
    }
}

macro_rules! delegate_iterator {
    (($name:ident $($generics:tt)*) => $item:ty) => {
        impl $($generics)* Iterator for $name $($generics)* {
            type Item = $item;
            #[inline]
            fn next(&mut self) -> Option<Self::Item> {
                self.iter.next()
            }
            #[inline]
            fn size_hint(&self) -> (usize, Option<usize>) {
                self.iter.size_hint()
            }
        }

        impl $($generics)* ExactSizeIterator for $name $($generics)* {
            #[inline]
            fn len(&self) -> usize {
                self.iter.len()
            }
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Key, &'a Value);
    type IntoIter = Iter<'a>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        Iter {
            iter: self.map.iter(),
        }
    }
}

/// An iterator over a `Dictionary`'s entries.
pub struct Iter<'a> {
    iter: map::Iter<'a, Key, Value>,
}

delegate_iterator!((Iter<'a>) => (&'a Key, &'a Value));

//////////////////////////////////////////////////////////////////////////////

impl<'a> IntoIterator for &'a mut Dictionary {
    type Item = (&'a Key, &'a mut Value);
    type IntoIter = IterMut<'a>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        IterMut {
            iter: self.map.iter_mut(),
        }
    }
}

/// A mutable iterator over a `Dictionary`'s entries.
pub struct IterMut<'a> {
    iter: map::IterMut<'a, Key, Value>,
}

delegate_iterator!((IterMut<'a>) => (&'a Key, &'a mut Value));

//////////////////////////////////////////////////////////////////////////////

impl IntoIterator for Dictionary {
    type Item = (Key, Value);
    type IntoIter = IntoIter;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            iter: self.map.into_iter(),
        }
    }
}

/// An owning iterator over a `Dictionary`'s entries.
pub struct IntoIter {
    iter: map::IntoIter<Key, Value>,
}

delegate_iterator!((IntoIter) => (Key, Value));

//////////////////////////////////////////////////////////////////////////////

/// An iterator over a `Dictionary`'s keys.
pub struct Keys<'a> {
    iter: map::Keys<'a, Key, Value>,
}

delegate_iterator!((Keys<'a>) => &'a Key);

//////////////////////////////////////////////////////////////////////////////

/// An iterator over a `Dictionary`'s values.
pub struct Values<'a> {
    iter: map::Values<'a, Key, Value>,
}

delegate_iterator!((Values<'a>) => &'a Value);

//////////////////////////////////////////////////////////////////////////////

/// A mutable iterator over a `Dictionary`'s values.
pub struct ValuesMut<'a> {
    iter: map::ValuesMut<'a, Key, Value>,
}

delegate_iterator!((ValuesMut<'a>) => &'a mut Value);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_by_name_and_id() {
        let mut dict = Dictionary::new();
        dict.insert("lastPrice", Value::Float64(1.5));
        dict.insert(17i64, Value::Bool(true));

        assert_eq!(dict.get("lastPrice").unwrap().as_text(), None);
        assert_eq!(dict.get(17i64).unwrap().as_bool(), Some(true));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut dict = Dictionary::new();
        dict.insert("b", Value::Bool(false));
        dict.insert("a", Value::Bool(true));

        let keys: Vec<&Key> = dict.keys().collect();
        assert_eq!(keys, vec![&Key::Name("b".into()), &Key::Name("a".into())]);
    }

    #[test]
    fn sort_keys_orders_mapping() {
        let mut dict = Dictionary::new();
        dict.insert("zebra", Value::Null);
        dict.insert("apple", Value::Null);
        dict.sort_keys();

        let keys: Vec<&Key> = dict.keys().collect();
        assert_eq!(
            keys,
            vec![&Key::Name("apple".into()), &Key::Name("zebra".into())]
        );
    }

    #[test]
    fn remove_returns_old_value() {
        let mut dict = Dictionary::new();
        dict.insert("k", Value::Bool(true));
        assert_eq!(dict.remove("k"), Some(Value::Bool(true)));
        assert_eq!(dict.remove("k"), None);
    }
}
