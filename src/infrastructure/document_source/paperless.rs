//! paperless-ngx REST client.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::{
    ports::DocumentSource, CustomField, Document, DocumentId, DocumentUpdate, DomainError,
    EntityId, IdMap, NewEntity,
};

/// Page size used when walking full catalog lists.
const LIST_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    id: EntityId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: EntityId,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    id: DocumentId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Vec<EntityId>,
    #[serde(default)]
    original_file_name: Option<String>,
    #[serde(default)]
    custom_fields: Vec<CustomField>,
}

impl RawDocument {
    fn into_document(self, tag_names: &HashMap<EntityId, String>) -> Document {
        Document {
            id: self.id,
            title: self.title,
            content: self.content,
            tags: self
                .tags
                .iter()
                .filter_map(|id| tag_names.get(id).cloned())
                .collect(),
            original_file_name: self.original_file_name,
            custom_fields: self.custom_fields,
        }
    }
}

pub struct PaperlessClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl PaperlessClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| DomainError::validation(format!("invalid base url '{base_url}': {e}")))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::internal(format!("building http client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, DomainError> {
        self.base_url
            .join(path)
            .map_err(|e| DomainError::internal(format!("joining '{path}': {e}")))
    }

    /// Keeps our scheme and host: the service may report its own public
    /// address in pagination links.
    fn follow(&self, next: &str) -> Result<Url, DomainError> {
        let next = Url::parse(next)
            .map_err(|e| DomainError::upstream(format!("invalid next link '{next}': {e}")))?;
        let mut url = self.base_url.clone();
        url.set_path(next.path());
        url.set_query(next.query());
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Token {}", self.token))
    }

    async fn send(&self, request: RequestBuilder, expected: StatusCode) -> Result<Response, DomainError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == expected {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        if status == StatusCode::NOT_FOUND {
            return Err(DomainError::not_found(url.path().to_string()));
        }
        Err(DomainError::upstream(format!("{status} from {}: {body}", url.path())))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, DomainError> {
        let path = url.path().to_string();
        self.send(self.request(Method::GET, url), StatusCode::OK)
            .await?
            .json()
            .await
            .map_err(|e| DomainError::upstream(format!("decoding {path}: {e}")))
    }

    /// Walks every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, DomainError> {
        let mut url = self.url(path)?;
        url.query_pairs_mut()
            .append_pair("page_size", &LIST_PAGE_SIZE.to_string());

        let mut items = Vec::new();
        loop {
            let page: Page<T> = self.get_json(url).await?;
            items.extend(page.results);
            match page.next.as_deref() {
                Some(next) if !next.is_empty() => url = self.follow(next)?,
                _ => break,
            }
        }
        Ok(items)
    }

    async fn id_map(&self, path: &str) -> Result<IdMap, DomainError> {
        let entities: Vec<NamedEntity> = self.get_all(path).await?;
        Ok(entities.into_iter().map(|e| (e.name, e.id)).collect())
    }

    async fn tag_names(&self) -> Result<HashMap<EntityId, String>, DomainError> {
        Ok(self
            .list_tags()
            .await?
            .into_iter()
            .map(|(name, id)| (id, name))
            .collect())
    }

    async fn create(&self, path: &str, entity: &NewEntity) -> Result<EntityId, DomainError> {
        let request = self.request(Method::POST, self.url(path)?).json(entity);
        let created: Created = self
            .send(request, StatusCode::CREATED)
            .await?
            .json()
            .await
            .map_err(|e| DomainError::upstream(format!("decoding created entity: {e}")))?;
        Ok(created.id)
    }
}

fn transport_error(e: reqwest::Error) -> DomainError {
    if e.is_timeout() {
        DomainError::timeout(format!("document service: {e}"))
    } else {
        DomainError::upstream(format!("document service: {e}"))
    }
}

#[async_trait]
impl DocumentSource for PaperlessClient {
    #[instrument(skip(self))]
    async fn fetch_by_tags(
        &self,
        tags: &[String],
        page_limit: usize,
    ) -> Result<Vec<Document>, DomainError> {
        let query = tags
            .iter()
            .map(|t| format!("tag:{t}"))
            .collect::<Vec<_>>()
            .join(" ");

        let mut url = self.url("api/documents/")?;
        url.query_pairs_mut()
            .append_pair("query", &query)
            .append_pair("page_size", &page_limit.to_string());

        let page: Page<RawDocument> = self.get_json(url).await?;
        if page.results.is_empty() {
            return Ok(Vec::new());
        }

        let names = self.tag_names().await?;
        let documents: Vec<Document> = page
            .results
            .into_iter()
            .map(|d| d.into_document(&names))
            .collect();
        debug!(count = documents.len(), "fetched documents");
        Ok(documents)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Document, DomainError> {
        let raw: RawDocument = self
            .get_json(self.url(&format!("api/documents/{id}/"))?)
            .await?;
        let names = self.tag_names().await?;
        Ok(raw.into_document(&names))
    }

    async fn list_tags(&self) -> Result<IdMap, DomainError> {
        self.id_map("api/tags/").await
    }

    async fn list_correspondents(&self) -> Result<IdMap, DomainError> {
        self.id_map("api/correspondents/").await
    }

    async fn list_document_types(&self) -> Result<IdMap, DomainError> {
        self.id_map("api/document_types/").await
    }

    async fn list_custom_fields(&self) -> Result<IdMap, DomainError> {
        self.id_map("api/custom_fields/").await
    }

    async fn create_correspondent(&self, entity: &NewEntity) -> Result<EntityId, DomainError> {
        self.create("api/correspondents/", entity).await
    }

    async fn create_document_type(&self, entity: &NewEntity) -> Result<EntityId, DomainError> {
        self.create("api/document_types/", entity).await
    }

    #[instrument(skip(self, update))]
    async fn update_document(
        &self,
        id: DocumentId,
        update: &DocumentUpdate,
    ) -> Result<(), DomainError> {
        let url = self.url(&format!("api/documents/{id}/"))?;
        self.send(self.request(Method::PATCH, url).json(update), StatusCode::OK)
            .await?;
        Ok(())
    }

    async fn download_original(&self, id: DocumentId) -> Result<Vec<u8>, DomainError> {
        let url = self.url(&format!("api/documents/{id}/download/"))?;
        let bytes = self
            .send(self.request(Method::GET, url), StatusCode::OK)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_document_keeps_custom_field_values() {
        let raw: RawDocument = serde_json::from_value(serde_json::json!({
            "id": 4,
            "title": "scan",
            "tags": [1, 9],
            "custom_fields": [
                {"field": 2, "value": "2024-01-01"},
                {"field": 3, "value": null},
                {"field": 5, "value": 12},
                {"field": 6, "value": [11, 12]},
                {"field": 7, "value": true}
            ]
        }))
        .unwrap();
        let names = HashMap::from([(1, "Finance".to_string())]);

        let doc = raw.into_document(&names);
        assert_eq!(doc.tags, vec!["Finance"]);
        let values: Vec<_> = doc.custom_fields.iter().map(|f| f.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                serde_json::json!("2024-01-01"),
                serde_json::Value::Null,
                serde_json::json!(12),
                serde_json::json!([11, 12]),
                serde_json::json!(true),
            ]
        );
    }

    #[test]
    fn test_follow_keeps_configured_host() {
        let client =
            PaperlessClient::new("http://paperless.local:8000", "t", Duration::from_secs(1)).unwrap();
        let url = client
            .follow("https://public.example/api/tags/?page=2&page_size=100")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://paperless.local:8000/api/tags/?page=2&page_size=100"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            PaperlessClient::new("not a url", "t", Duration::from_secs(1)),
            Err(DomainError::Validation(_))
        ));
    }
}
