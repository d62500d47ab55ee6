use serde::{Deserialize, Serialize};

pub type DocumentId = i64;
pub type EntityId = i64;

/// Maximum title length accepted by the document service.
pub const MAX_TITLE_CHARS: usize = 128;

/// A custom field as stored by the document service. The value is kept in
/// its wire form (text, number, boolean, date or a list of document ids) and
/// sent back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub field: EntityId,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub original_file_name: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

impl Document {
    pub fn new(id: DocumentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Metadata proposed for one document.
///
/// `None` means "leave the attribute alone". For tags, `Some(vec![])` clears
/// every tag on the document, so the generator always normalizes a missing
/// tag list to an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSuggestion {
    #[serde(rename = "id", default)]
    pub document_id: DocumentId,
    #[serde(default)]
    pub original_document: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correspondent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "created_date", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentSuggestion {
    pub fn for_document(document: &Document) -> Self {
        Self {
            document_id: document.id,
            original_document: document.clone(),
            ..Self::default()
        }
    }

    pub fn tags_mut(&mut self) -> &mut Vec<String> {
        self.tags.get_or_insert_with(Vec::new)
    }

    pub fn remove_tag(&mut self, tag: &str) {
        if let Some(tags) = self.tags.as_mut() {
            tags.retain(|t| t != tag);
        }
    }
}

/// Partial update sent to the document service. Unset fields are omitted
/// from the payload so the service keeps its current values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<EntityId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correspondent: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomField>>,
}

impl DocumentUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Truncates to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn remove_tag(tags: &[String], tag: &str) -> Vec<String> {
    tags.iter().filter(|t| *t != tag).cloned().collect()
}
