use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::FieldPath;

/// Field-path keyed validation messages (`"name"`, `"config.<plugin>.<key>"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl ToString, message: impl Into<String>) {
        self.0.insert(path.to_string(), message.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.0.remove(path)
    }

    pub fn for_field(&self, path: &FieldPath) -> Option<&str> {
        self.get(&path.to_string())
    }

    /// Adds `incoming` on top of the existing messages. Same-path entries are
    /// overwritten, everything else is kept.
    pub fn merge(&mut self, incoming: Self) {
        self.0.extend(incoming.0);
    }

    pub fn replace(&mut self, incoming: Self) {
        self.0 = incoming.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(path, message)| (path.as_str(), message.as_str()))
    }
}

impl<P: ToString, M: Into<String>> FromIterator<(P, M)> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = (P, M)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(path, message)| (path.to_string(), message.into()))
                .collect(),
        )
    }
}

impl IntoIterator for ValidationErrors {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
