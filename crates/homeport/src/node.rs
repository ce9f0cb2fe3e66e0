use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use crate::error::{Error, ErrorKind, Result};

// A node identified by a string unique among its siblings.
pub(crate) trait Node {
    // Kind of node, used in error messages.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

// The ordered children of a node.
//
// Children are kept in insertion order. Removing a child never reorders its
// siblings.
#[derive(Debug)]
pub(crate) struct Children<T: Node>(IndexMap<String, T, DefaultHashBuilder>);

impl<T: Node> Default for Children<T> {
    fn default() -> Self {
        Self(IndexMap::with_hasher(DefaultHashBuilder::default()))
    }
}

impl<T: Node + PartialEq> PartialEq for Children<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .values()
                .zip(other.0.values())
                .all(|(left, right)| left == right)
    }
}

impl<T: Node> Children<T> {
    pub(crate) fn attach(&mut self, child: T) -> Result<()> {
        if self.0.contains_key(child.id()) {
            return Err(Error::new(
                ErrorKind::DuplicateId,
                format!("{} `{}` is already attached.", T::KIND, child.id()),
            ));
        }
        self.0.insert(child.id().to_owned(), child);
        Ok(())
    }

    pub(crate) fn detach(&mut self, id: &str) -> Result<T> {
        self.0
            .shift_remove(id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("{} `{id}` not found.", T::KIND)))
    }

    pub(crate) fn get(&self, id: &str) -> Option<&T> {
        self.0.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.0.get_mut(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub(crate) fn iter(&self) -> impl ExactSizeIterator<Item = &T> {
        self.0.values()
    }
}
