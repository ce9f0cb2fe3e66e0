use crate::macros::string_map;

/// Attribute key describing the network address of a node.
pub const NETWORK: &str = "network";
/// Attribute key describing a node in human-readable form.
pub const DESCRIPTION: &str = "description";
/// Attribute key for the vendor identifier.
pub const VENDOR: &str = "vendor";
/// Attribute key for the product identifier.
pub const PRODUCT: &str = "product";
/// Attribute key for the firmware or software version.
pub const VERSION: &str = "version";
/// Attribute key for the physical location.
pub const LOCATION: &str = "location";
/// Attribute key for the kind of node, i.e. `lamp` or `temperature`.
pub const TYPE: &str = "type";
/// Attribute key for the unit of a value.
pub const UNIT: &str = "unit";
/// Attribute key for the maximum legal value.
pub const MAX: &str = "max";
/// Attribute key for the minimum legal value.
pub const MIN: &str = "min";
/// Attribute key for the increment between legal values.
pub const STEP: &str = "step";
/// Attribute key for the scale of a value.
pub const SCALE: &str = "scale";
/// Attribute key for an enumeration of legal values.
pub const VALUES: &str = "values";

string_map! {
    /// Free-form metadata attached to every node of the registry.
    ///
    /// Attributes are ordered by insertion and every getter copies the value
    /// out, so readers never hold a reference into a live node.
    pub struct Attributes;
}
