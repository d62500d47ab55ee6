use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    ports::DocumentSource, truncate_chars, CustomField, DocumentId, DocumentSuggestion,
    DocumentUpdate, DomainError, EntityId, IdMap, NewEntity, MAX_TITLE_CHARS,
};

/// Length of a date-only value such as `2024-01-05`.
const DATE_ONLY_LEN: usize = 10;

/// Custom field stamped on every document a pipeline updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMarker {
    pub field: String,
    pub value: String,
}

impl ProcessedMarker {
    pub fn today(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

/// Name to id maps fetched at the start of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub tags: IdMap,
    pub correspondents: IdMap,
    pub document_types: IdMap,
    pub custom_fields: IdMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Correspondent,
    DocumentType,
}

impl EntityKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Correspondent => "correspondent",
            Self::DocumentType => "document type",
        }
    }
}

/// Entities created during the current pass. Kept apart from the fetched
/// snapshot so a name suggested twice in one pass is only created once.
#[derive(Debug, Default)]
struct CreatedEntities {
    correspondents: IdMap,
    document_types: IdMap,
}

impl CreatedEntities {
    fn map_mut(&mut self, kind: EntityKind) -> &mut IdMap {
        match kind {
            EntityKind::Correspondent => &mut self.correspondents,
            EntityKind::DocumentType => &mut self.document_types,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub updated: Vec<DocumentId>,
    pub created_correspondents: Vec<(String, EntityId)>,
    pub created_document_types: Vec<(String, EntityId)>,
}

/// Turns name-based suggestions into id-based partial updates.
pub struct Reconciler {
    source: Arc<dyn DocumentSource>,
}

impl Reconciler {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self { source }
    }

    /// Fetches the maps `suggestions` need. Correspondents, document types
    /// and custom fields are only requested when something refers to them.
    pub async fn snapshot(
        &self,
        suggestions: &[DocumentSuggestion],
        marker: Option<&ProcessedMarker>,
    ) -> Result<CatalogSnapshot, DomainError> {
        let mut snapshot = CatalogSnapshot {
            tags: self.source.list_tags().await?,
            ..CatalogSnapshot::default()
        };

        if suggestions.iter().any(|s| has_text(&s.correspondent)) {
            snapshot.correspondents = self.source.list_correspondents().await?;
        }
        if suggestions.iter().any(|s| has_text(&s.document_type)) {
            snapshot.document_types = self.source.list_document_types().await?;
        }
        if marker.is_some() {
            snapshot.custom_fields = self.source.list_custom_fields().await?;
        }

        Ok(snapshot)
    }

    /// Applies every suggestion in order. The first failed creation or
    /// update stops the pass; earlier updates stay applied.
    #[instrument(skip_all, fields(suggestions = suggestions.len()))]
    pub async fn reconcile(
        &self,
        suggestions: &[DocumentSuggestion],
        marker: Option<&ProcessedMarker>,
    ) -> Result<ReconcileSummary, DomainError> {
        let snapshot = self.snapshot(suggestions, marker).await?;
        let mut created = CreatedEntities::default();
        let mut summary = ReconcileSummary::default();

        for suggestion in suggestions {
            let update = self
                .build_update(suggestion, &snapshot, &mut created, &mut summary, marker)
                .await?;

            if update.is_empty() {
                debug!(document_id = suggestion.document_id, "nothing to update");
                continue;
            }

            self.source
                .update_document(suggestion.document_id, &update)
                .await
                .map_err(|e| {
                    DomainError::reconciliation(format!(
                        "updating document {}: {e}",
                        suggestion.document_id
                    ))
                })?;

            info!(document_id = suggestion.document_id, "document updated");
            summary.updated.push(suggestion.document_id);
        }

        Ok(summary)
    }

    async fn build_update(
        &self,
        suggestion: &DocumentSuggestion,
        snapshot: &CatalogSnapshot,
        created: &mut CreatedEntities,
        summary: &mut ReconcileSummary,
        marker: Option<&ProcessedMarker>,
    ) -> Result<DocumentUpdate, DomainError> {
        let document_id = suggestion.document_id;
        let mut update = DocumentUpdate::default();

        if let Some(names) = &suggestion.tags {
            update.tags = Some(resolve_tags(document_id, names, &snapshot.tags));
        }

        if let Some(name) = suggestion.correspondent.as_deref().filter(|n| !n.is_empty()) {
            let id = self
                .resolve_or_create(
                    EntityKind::Correspondent,
                    name,
                    &snapshot.correspondents,
                    created,
                    summary,
                )
                .await?;
            update.correspondent = Some(id);
        }

        if let Some(name) = suggestion.document_type.as_deref().filter(|n| !n.is_empty()) {
            let id = self
                .resolve_or_create(
                    EntityKind::DocumentType,
                    name,
                    &snapshot.document_types,
                    created,
                    summary,
                )
                .await?;
            update.document_type = Some(id);
        }

        if let Some(title) = &suggestion.title {
            let title = truncate_chars(title, MAX_TITLE_CHARS);
            if title.is_empty() {
                warn!(document_id, "empty title suggested, keeping original");
            } else {
                update.title = Some(title.to_string());
            }
        }

        if let Some(date) = &suggestion.date {
            if date.chars().count() == DATE_ONLY_LEN {
                update.created_date = Some(date.clone());
            } else {
                debug!(document_id, date = %date, "ignoring non date-only value");
            }
        }

        if let Some(content) = suggestion.content.as_deref().filter(|c| !c.is_empty()) {
            update.content = Some(content.to_string());
        }

        if let Some(marker) = marker {
            match snapshot.custom_fields.get(&marker.field) {
                Some(&field) => {
                    update.custom_fields = Some(stamp_marker(
                        &suggestion.original_document.custom_fields,
                        field,
                        &marker.value,
                    ));
                }
                None => warn!(field = %marker.field, "custom field not found, not marking document"),
            }
        }

        Ok(update)
    }

    async fn resolve_or_create(
        &self,
        kind: EntityKind,
        name: &str,
        known: &IdMap,
        created: &mut CreatedEntities,
        summary: &mut ReconcileSummary,
    ) -> Result<EntityId, DomainError> {
        if let Some(&id) = known.get(name).or_else(|| created.map_mut(kind).get(name)) {
            return Ok(id);
        }

        let entity = NewEntity::named(name);
        let id = match kind {
            EntityKind::Correspondent => self.source.create_correspondent(&entity).await,
            EntityKind::DocumentType => self.source.create_document_type(&entity).await,
        }
        .map_err(|e| {
            DomainError::reconciliation(format!("creating {} '{name}': {e}", kind.label()))
        })?;

        info!(name, id, kind = kind.label(), "created catalog entry");
        created.map_mut(kind).insert(name.to_string(), id);
        match kind {
            EntityKind::Correspondent => summary.created_correspondents.push((name.to_string(), id)),
            EntityKind::DocumentType => summary.created_document_types.push((name.to_string(), id)),
        }
        Ok(id)
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Tags are a closed vocabulary: unknown names are dropped, never created.
fn resolve_tags(document_id: DocumentId, names: &[String], tags: &IdMap) -> Vec<EntityId> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        match tags.get(name) {
            Some(id) if !ids.contains(id) => ids.push(*id),
            Some(_) => {}
            None => warn!(document_id, tag = %name, "suggested tag does not exist, skipping"),
        }
    }
    ids
}

fn stamp_marker(existing: &[CustomField], field: EntityId, value: &str) -> Vec<CustomField> {
    let mut fields: Vec<CustomField> = existing
        .iter()
        .filter(|f| f.field != field)
        .cloned()
        .collect();
    fields.push(CustomField {
        field,
        value: serde_json::Value::String(value.to_string()),
    });
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Document;
    use crate::infrastructure::InMemoryDocumentSource;

    fn source() -> Arc<InMemoryDocumentSource> {
        Arc::new(
            InMemoryDocumentSource::new()
                .with_tags(&[("Finance", 1), ("Insurance", 2)])
                .with_correspondents(&[("Acme", 10)])
                .with_document_types(&[("Invoice", 20)])
                .with_custom_fields(&[("auto_tagged", 30)])
                .with_document(Document::new(5, "scan").with_tags(["Finance"])),
        )
    }

    fn suggestion(id: DocumentId) -> DocumentSuggestion {
        let mut s = DocumentSuggestion::for_document(&Document::new(id, "scan"));
        s.tags = Some(vec![]);
        s
    }

    async fn single(
        source: &Arc<InMemoryDocumentSource>,
        s: DocumentSuggestion,
    ) -> DocumentUpdate {
        Reconciler::new(source.clone())
            .reconcile(&[s], None)
            .await
            .unwrap();
        source.updates().pop().map(|(_, u)| u).unwrap()
    }

    #[tokio::test]
    async fn test_title_truncated_to_128_chars() {
        let source = source();
        let mut s = suggestion(5);
        s.title = Some("x".repeat(200));

        let update = single(&source, s).await;
        assert_eq!(update.title, Some("x".repeat(128)));
    }

    #[tokio::test]
    async fn test_empty_title_keeps_original() {
        let source = source();
        let mut s = suggestion(5);
        s.title = Some(String::new());

        let update = single(&source, s).await;
        assert_eq!(update.title, None);
    }

    #[tokio::test]
    async fn test_date_only_value_applied() {
        let source = source();
        let mut s = suggestion(5);
        s.date = Some("2024-01-05".into());

        let update = single(&source, s).await;
        assert_eq!(update.created_date.as_deref(), Some("2024-01-05"));
    }

    #[tokio::test]
    async fn test_timestamp_date_ignored() {
        let source = source();
        let mut s = suggestion(5);
        s.date = Some("2024-01-05T00:00:00Z".into());

        let update = single(&source, s).await;
        assert_eq!(update.created_date, None);
    }

    #[tokio::test]
    async fn test_unknown_tags_dropped_not_created() {
        let source = source();
        let mut s = suggestion(5);
        s.tags = Some(vec!["Finance".into(), "Nope".into(), "Insurance".into(), "Finance".into()]);

        let update = single(&source, s).await;
        assert_eq!(update.tags, Some(vec![1, 2]));
        assert_eq!(source.tag_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_tag_set_clears_tags() {
        let source = source();
        let update = single(&source, suggestion(5)).await;
        assert_eq!(update.tags, Some(vec![]));
    }

    #[tokio::test]
    async fn test_unknown_correspondent_created_once() {
        let source = source();
        let mut s = suggestion(5);
        s.correspondent = Some("Globex".into());

        let summary = Reconciler::new(source.clone())
            .reconcile(&[s], None)
            .await
            .unwrap();

        let created = source.created_correspondents();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Globex");
        assert!(created[0].is_insensitive);

        let (_, update) = source.updates().pop().unwrap();
        assert_eq!(update.correspondent, Some(summary.created_correspondents[0].1));
    }

    #[tokio::test]
    async fn test_known_entities_not_created() {
        let source = source();
        let mut s = suggestion(5);
        s.correspondent = Some("Acme".into());
        s.document_type = Some("Invoice".into());

        let update = single(&source, s).await;
        assert_eq!(update.correspondent, Some(10));
        assert_eq!(update.document_type, Some(20));
        assert!(source.created_correspondents().is_empty());
        assert!(source.created_document_types().is_empty());
    }

    #[tokio::test]
    async fn test_same_new_name_in_one_pass_created_once() {
        let source = Arc::new(
            InMemoryDocumentSource::new()
                .with_document(Document::new(1, "a"))
                .with_document(Document::new(2, "b")),
        );
        let mut first = suggestion(1);
        first.document_type = Some("Receipt".into());
        let mut second = suggestion(2);
        second.document_type = Some("Receipt".into());

        let summary = Reconciler::new(source.clone())
            .reconcile(&[first, second], None)
            .await
            .unwrap();

        assert_eq!(source.created_document_types().len(), 1);
        assert_eq!(summary.updated, vec![1, 2]);
        let updates = source.updates();
        assert_eq!(updates[0].1.document_type, updates[1].1.document_type);
    }

    #[tokio::test]
    async fn test_creation_failure_aborts_remaining_documents() {
        let source = Arc::new(
            InMemoryDocumentSource::new()
                .with_document(Document::new(1, "a"))
                .with_document(Document::new(2, "b"))
                .with_document(Document::new(3, "c")),
        );
        let mut failing = suggestion(2);
        failing.correspondent = Some("Globex".into());
        let suggestions = vec![suggestion(1), failing, suggestion(3)];

        source.fail_creations(true);
        let err = Reconciler::new(source.clone())
            .reconcile(&suggestions, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Reconciliation(_)));
        let updated: Vec<_> = source.updates().into_iter().map(|(id, _)| id).collect();
        assert_eq!(updated, vec![1]);
    }

    #[tokio::test]
    async fn test_content_written_only_when_non_empty() {
        let source = source();
        let mut s = suggestion(5);
        s.content = Some(String::new());
        assert_eq!(single(&source, s).await.content, None);

        let mut s = suggestion(5);
        s.content = Some("ocr text".into());
        assert_eq!(single(&source, s).await.content.as_deref(), Some("ocr text"));
    }

    #[tokio::test]
    async fn test_marker_field_stamped() {
        let source = source();
        let mut s = suggestion(5);
        s.original_document.custom_fields = vec![CustomField {
            field: 4,
            value: "keep".into(),
        }];
        let marker = ProcessedMarker {
            field: "auto_tagged".into(),
            value: "2024-02-01".into(),
        };

        Reconciler::new(source.clone())
            .reconcile(&[s], Some(&marker))
            .await
            .unwrap();

        let (_, update) = source.updates().pop().unwrap();
        assert_eq!(
            update.custom_fields,
            Some(vec![
                CustomField {
                    field: 4,
                    value: "keep".into()
                },
                CustomField {
                    field: 30,
                    value: "2024-02-01".into()
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_marker_keeps_non_text_field_values() {
        let source = source();
        let mut s = suggestion(5);
        s.original_document.custom_fields = vec![
            CustomField {
                field: 2,
                value: serde_json::json!([11, 12]),
            },
            CustomField {
                field: 3,
                value: serde_json::json!(true),
            },
        ];
        let marker = ProcessedMarker {
            field: "auto_tagged".into(),
            value: "2024-02-01".into(),
        };

        Reconciler::new(source.clone())
            .reconcile(&[s], Some(&marker))
            .await
            .unwrap();

        let (_, update) = source.updates().pop().unwrap();
        let payload = serde_json::to_value(&update).unwrap();
        assert_eq!(
            payload["custom_fields"],
            serde_json::json!([
                {"field": 2, "value": [11, 12]},
                {"field": 3, "value": true},
                {"field": 30, "value": "2024-02-01"}
            ])
        );
    }

    #[tokio::test]
    async fn test_unknown_marker_field_skipped() {
        let source = source();
        let marker = ProcessedMarker::today("missing");

        Reconciler::new(source.clone())
            .reconcile(&[suggestion(5)], Some(&marker))
            .await
            .unwrap();

        let (_, update) = source.updates().pop().unwrap();
        assert_eq!(update.custom_fields, None);
    }
}
