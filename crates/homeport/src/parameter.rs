use crate::attributes::Attributes;
use crate::node::Node;

/// A parameter describing the legal shape of a service value.
///
/// Parameters are leaves: they carry attributes such as
/// [`MAX`](crate::attributes::MAX) or [`UNIT`](crate::attributes::UNIT) and
/// have no behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    // Identifier, unique within its service.
    id: String,
    // Attributes.
    attributes: Attributes,
}

impl Node for Parameter {
    const KIND: &'static str = "Parameter";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Parameter {
    /// Creates a [`Parameter`].
    #[must_use]
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    #[inline]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.set(key, value);
        self
    }

    /// Returns the parameter identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the attributes.
    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the mutable attributes.
    #[inline]
    pub const fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}
