//! Mapping of external category names onto ledger categories.
//!
//! The table is keyed by the external category name. Each entry names its
//! ledger target by id, by name, or both; the id wins when both are set.
//! Ledger names are not unique, so name matching is best effort.

use std::{collections::HashMap, fmt};

use api_types::ledger::Category;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{MapAccess, Visitor},
};

use crate::EngineError;

/// Ledger target of one external category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl CategorySpec {
    fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryMappingEntry {
    /// Category name on the external service.
    pub external_name: String,
    pub target: CategorySpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryMapping {
    entries: HashMap<String, CategorySpec>,
}

impl CategoryMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. A second entry for the same external name is a
    /// configuration error.
    pub fn add(&mut self, entry: CategoryMappingEntry) -> Result<(), EngineError> {
        if self.entries.contains_key(&entry.external_name) {
            return Err(EngineError::Configuration(format!(
                "duplicate category mapping for \"{}\"",
                entry.external_name
            )));
        }
        self.entries.insert(entry.external_name, entry.target);
        Ok(())
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = CategoryMappingEntry>,
    ) -> Result<Self, EngineError> {
        let mut mapping = Self::new();
        for entry in entries {
            mapping.add(entry)?;
        }
        Ok(mapping)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `external_name` to the id of one of `categories`.
    ///
    /// Returns `None` when there is no entry for the name or when its target
    /// is not among `categories`. Both cases are only logged: the caller is
    /// expected to go on without a category.
    pub fn categorize<'a>(&self, categories: &'a [Category], external_name: &str) -> Option<&'a str> {
        let Some(target) = self.entries.get(external_name) else {
            tracing::warn!(category = external_name, "no category mapping");
            return None;
        };

        if let Some(id) = target.id() {
            let found = categories.iter().find(|c| c.id == id);
            if found.is_none() {
                tracing::warn!(
                    category = external_name,
                    id,
                    "unknown ledger category id in mapping"
                );
            }
            return found.map(|c| c.id.as_str());
        }

        if let Some(name) = target.name() {
            let found = categories.iter().find(|c| c.name == name);
            if found.is_none() {
                tracing::warn!(
                    category = external_name,
                    name,
                    "unknown ledger category name in mapping"
                );
            }
            return found.map(|c| c.id.as_str());
        }

        tracing::warn!(category = external_name, "category mapping without target");
        None
    }
}

impl<'de> Deserialize<'de> for CategoryMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = CategoryMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of category name to { id, name }")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut mapping = CategoryMapping::new();
                while let Some((external_name, target)) =
                    access.next_entry::<String, CategorySpec>()?
                {
                    mapping
                        .add(CategoryMappingEntry {
                            external_name,
                            target,
                        })
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

impl Serialize for CategoryMapping {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}
