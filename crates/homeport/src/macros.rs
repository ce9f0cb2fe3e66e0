// Generates an ordered string map wrapper.
//
// Keys keep their insertion order. Replacing the value of an existing key
// does not move it.
macro_rules! string_map {
    (
        $(#[$attr:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(
            indexmap::IndexMap<String, String, hashbrown::DefaultHashBuilder>,
        );

        impl $name {
            #[doc = concat!("Creates an empty [`", stringify!($name), "`].")]
            #[must_use]
            #[inline]
            pub fn new() -> Self {
                Self(indexmap::IndexMap::with_hasher(
                    hashbrown::DefaultHashBuilder::default(),
                ))
            }

            /// Adds a pair, returning the updated collection.
            #[must_use]
            #[inline]
            pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
                self.set(key, value);
                self
            }

            /// Sets a pair, returning the value previously stored for the key.
            #[inline]
            pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
                self.0.insert(key.into(), value.into())
            }

            /// Returns a copy of the value stored for the key.
            #[must_use]
            #[inline]
            pub fn get(&self, key: &str) -> Option<String> {
                self.0.get(key).cloned()
            }

            /// Returns the value stored for the key without copying it.
            #[must_use]
            #[inline]
            pub fn get_ref(&self, key: &str) -> Option<&str> {
                self.0.get(key).map(String::as_str)
            }

            /// Removes a key, preserving the order of the remaining pairs.
            #[inline]
            pub fn remove(&mut self, key: &str) -> Option<String> {
                self.0.shift_remove(key)
            }

            /// Checks whether the key is present.
            #[must_use]
            #[inline]
            pub fn contains(&self, key: &str) -> bool {
                self.0.contains_key(key)
            }

            /// Returns the number of pairs.
            #[must_use]
            #[inline]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Checks whether the collection is empty.
            #[must_use]
            #[inline]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Iterates over the pairs in insertion order.
            #[inline]
            pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
                self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
            }
        }

        impl<K, V> FromIterator<(K, V)> for $name
        where
            K: Into<String>,
            V: Into<String>,
        {
            fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
                let mut map = Self::new();
                for (key, value) in iter {
                    map.set(key, value);
                }
                map
            }
        }

        impl IntoIterator for $name {
            type Item = (String, String);
            type IntoIter = indexmap::map::IntoIter<String, String>;

            fn into_iter(self) -> Self::IntoIter {
                self.0.into_iter()
            }
        }
    };
}

pub(crate) use string_map;
