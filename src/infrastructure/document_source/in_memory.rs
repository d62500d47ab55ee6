use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{
    ports::DocumentSource, Document, DocumentId, DocumentUpdate, DomainError, EntityId, IdMap,
    NewEntity,
};

#[derive(Default)]
struct State {
    documents: BTreeMap<DocumentId, Document>,
    files: HashMap<DocumentId, Vec<u8>>,
    tags: IdMap,
    correspondents: IdMap,
    document_types: IdMap,
    custom_fields: IdMap,
    next_id: EntityId,
    created_correspondents: Vec<NewEntity>,
    created_document_types: Vec<NewEntity>,
    updates: Vec<(DocumentId, DocumentUpdate)>,
    fail_creations: bool,
}

/// Document service held in memory. Records every creation and update so
/// callers can inspect what would have been sent.
pub struct InMemoryDocumentSource {
    state: RwLock<State>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_id: 1000,
                ..State::default()
            }),
        }
    }

    pub fn with_tags(self, tags: &[(&str, EntityId)]) -> Self {
        self.write().tags.extend(to_map(tags));
        self
    }

    pub fn with_correspondents(self, correspondents: &[(&str, EntityId)]) -> Self {
        self.write().correspondents.extend(to_map(correspondents));
        self
    }

    pub fn with_document_types(self, document_types: &[(&str, EntityId)]) -> Self {
        self.write().document_types.extend(to_map(document_types));
        self
    }

    pub fn with_custom_fields(self, fields: &[(&str, EntityId)]) -> Self {
        self.write().custom_fields.extend(to_map(fields));
        self
    }

    pub fn with_document(self, document: Document) -> Self {
        self.insert_document(document);
        self
    }

    pub fn insert_document(&self, document: Document) {
        self.write().documents.insert(document.id, document);
    }

    pub fn insert_file(&self, id: DocumentId, file: Vec<u8>) {
        self.write().files.insert(id, file);
    }

    pub fn document(&self, id: DocumentId) -> Option<Document> {
        self.read().documents.get(&id).cloned()
    }

    pub fn updates(&self) -> Vec<(DocumentId, DocumentUpdate)> {
        self.read().updates.clone()
    }

    pub fn created_correspondents(&self) -> Vec<NewEntity> {
        self.read().created_correspondents.clone()
    }

    pub fn created_document_types(&self) -> Vec<NewEntity> {
        self.read().created_document_types.clone()
    }

    pub fn tag_count(&self) -> usize {
        self.read().tags.len()
    }

    /// Makes every later creation call fail with an upstream error.
    pub fn fail_creations(&self, fail: bool) {
        self.write().fail_creations = fail;
    }

    // Handlers never panic while holding the lock, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn create(&self, entity: &NewEntity, correspondent: bool) -> Result<EntityId, DomainError> {
        let mut state = self.write();
        if state.fail_creations {
            return Err(DomainError::upstream(format!(
                "creating '{}' rejected",
                entity.name
            )));
        }

        state.next_id += 1;
        let id = state.next_id;
        if correspondent {
            state.correspondents.insert(entity.name.clone(), id);
            state.created_correspondents.push(entity.clone());
        } else {
            state.document_types.insert(entity.name.clone(), id);
            state.created_document_types.push(entity.clone());
        }
        Ok(id)
    }
}

impl Default for InMemoryDocumentSource {
    fn default() -> Self {
        Self::new()
    }
}

fn to_map(pairs: &[(&str, EntityId)]) -> IdMap {
    pairs.iter().map(|(name, id)| (name.to_string(), *id)).collect()
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn fetch_by_tags(
        &self,
        tags: &[String],
        page_limit: usize,
    ) -> Result<Vec<Document>, DomainError> {
        Ok(self
            .read()
            .documents
            .values()
            .filter(|doc| tags.iter().all(|t| doc.has_tag(t)))
            .take(page_limit)
            .cloned()
            .collect())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Document, DomainError> {
        self.document(id)
            .ok_or_else(|| DomainError::not_found(format!("document {id}")))
    }

    async fn list_tags(&self) -> Result<IdMap, DomainError> {
        Ok(self.read().tags.clone())
    }

    async fn list_correspondents(&self) -> Result<IdMap, DomainError> {
        Ok(self.read().correspondents.clone())
    }

    async fn list_document_types(&self) -> Result<IdMap, DomainError> {
        Ok(self.read().document_types.clone())
    }

    async fn list_custom_fields(&self) -> Result<IdMap, DomainError> {
        Ok(self.read().custom_fields.clone())
    }

    async fn create_correspondent(&self, entity: &NewEntity) -> Result<EntityId, DomainError> {
        self.create(entity, true)
    }

    async fn create_document_type(&self, entity: &NewEntity) -> Result<EntityId, DomainError> {
        self.create(entity, false)
    }

    async fn update_document(
        &self,
        id: DocumentId,
        update: &DocumentUpdate,
    ) -> Result<(), DomainError> {
        let mut state = self.write();
        let names: HashMap<EntityId, String> =
            state.tags.iter().map(|(n, id)| (*id, n.clone())).collect();

        let document = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("document {id}")))?;

        if let Some(title) = &update.title {
            document.title = title.clone();
        }
        if let Some(content) = &update.content {
            document.content = content.clone();
        }
        if let Some(tags) = &update.tags {
            document.tags = tags.iter().filter_map(|t| names.get(t).cloned()).collect();
        }
        if let Some(fields) = &update.custom_fields {
            document.custom_fields = fields.clone();
        }

        state.updates.push((id, update.clone()));
        Ok(())
    }

    async fn download_original(&self, id: DocumentId) -> Result<Vec<u8>, DomainError> {
        self.read()
            .files
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("original file of document {id}")))
    }
}
