//! Association triples linking versions to other inventory objects

use serde::{Deserialize, Serialize};

/// Activation → inventory item relation
pub const ACTIVATION_FWD_ASSOCIATION: &str = "inventory";
/// Inventory item → activation relation
pub const ACTIVATION_REV_ASSOCIATION: &str = "activation";
/// Manager → active version relation
pub const ACTIVE_FWD_ASSOCIATION: &str = "active";
/// Active version → manager relation
pub const ACTIVE_REV_ASSOCIATION: &str = "software_version";
/// Manager → updateable version relation
pub const UPDATEABLE_FWD_ASSOCIATION: &str = "updateable";
/// Updateable version → manager relation
pub const UPDATEABLE_REV_ASSOCIATION: &str = "software_version";
/// Manager → running version relation
pub const FUNCTIONAL_FWD_ASSOCIATION: &str = "functional";
/// Running version → manager relation
pub const FUNCTIONAL_REV_ASSOCIATION: &str = "software_version";

/// A (forward, reverse, target path) relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    /// Forward relation name
    pub forward: String,
    /// Reverse relation name
    pub reverse: String,
    /// Object path of the related object
    pub path: String,
}

impl Association {
    /// Create a new association.
    pub fn new(forward: &str, reverse: &str, path: impl Into<String>) -> Self {
        Self {
            forward: forward.to_string(),
            reverse: reverse.to_string(),
            path: path.into(),
        }
    }

    /// Link an activation to its inventory item.
    pub fn inventory(inventory_path: &str) -> Self {
        Self::new(
            ACTIVATION_FWD_ASSOCIATION,
            ACTIVATION_REV_ASSOCIATION,
            inventory_path,
        )
    }

    /// Mark `path` as an active version.
    pub fn active(path: &str) -> Self {
        Self::new(ACTIVE_FWD_ASSOCIATION, ACTIVE_REV_ASSOCIATION, path)
    }

    /// Mark `path` as an updateable version.
    pub fn updateable(path: &str) -> Self {
        Self::new(UPDATEABLE_FWD_ASSOCIATION, UPDATEABLE_REV_ASSOCIATION, path)
    }

    /// Mark `path` as the running version.
    pub fn functional(path: &str) -> Self {
        Self::new(FUNCTIONAL_FWD_ASSOCIATION, FUNCTIONAL_REV_ASSOCIATION, path)
    }
}

/// Ordered list of associations published as a whole
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationList {
    entries: Vec<Association>,
}

impl AssociationList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an association.
    pub fn push(&mut self, association: Association) {
        self.entries.push(association);
    }

    /// Remove every association with the given forward relation.
    ///
    /// Returns whether anything was removed.
    pub fn remove_forward(&mut self, forward: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|a| a.forward != forward);
        self.entries.len() != before
    }

    /// Remove every association targeting `path`.
    ///
    /// Returns whether anything was removed.
    pub fn remove_path(&mut self, path: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|a| a.path != path);
        self.entries.len() != before
    }

    /// Number of associations with the given forward relation.
    pub fn count_forward(&self, forward: &str) -> usize {
        self.entries.iter().filter(|a| a.forward == forward).count()
    }

    /// Target of the functional association, if any.
    pub fn functional_path(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|a| a.forward == FUNCTIONAL_FWD_ASSOCIATION)
            .map(|a| a.path.as_str())
    }

    /// Whether the list holds exactly this association.
    pub fn contains(&self, association: &Association) -> bool {
        self.entries.contains(association)
    }

    /// Iterate over the associations in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Association> {
        self.entries.iter()
    }

    /// Number of associations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The associations as a slice.
    pub fn as_slice(&self) -> &[Association] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a AssociationList {
    type Item = &'a Association;
    type IntoIter = std::slice::Iter<'a, Association>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
