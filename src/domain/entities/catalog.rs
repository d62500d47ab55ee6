use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::document::EntityId;

/// Name to identifier snapshot of one catalog namespace.
pub type IdMap = HashMap<String, EntityId>;

/// Creation payload for correspondents and document types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub matching_algorithm: i32,
    #[serde(rename = "match")]
    pub match_pattern: String,
    pub is_insensitive: bool,
    pub owner: Option<EntityId>,
}

impl NewEntity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matching_algorithm: 0,
            match_pattern: String::new(),
            is_insensitive: true,
            owner: None,
        }
    }
}

/// Candidate names offered to the language model.
///
/// Every list is sorted: the rendered prompt is the cache key, so an
/// unstable order would turn every lookup into a miss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogNames {
    pub tags: Vec<String>,
    pub correspondents: Vec<String>,
    pub document_types: Vec<String>,
}

impl CatalogNames {
    pub fn from_maps(
        tags: &IdMap,
        correspondents: &IdMap,
        document_types: &IdMap,
        hidden_tags: &[&str],
    ) -> Self {
        let tags = tags
            .keys()
            .filter(|name| !hidden_tags.contains(&name.as_str()))
            .cloned()
            .collect();

        Self {
            tags: sorted(tags),
            correspondents: sorted(correspondents.keys().cloned().collect()),
            document_types: sorted(document_types.keys().cloned().collect()),
        }
    }
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}
