//! REST client for an Appwrite-compatible document API.
//!
//! Uses `reqwest` with project/key default headers and a request timeout.
//! Status codes map onto [`StoreError`]: 404 is `NotFound`, 409 is
//! `Conflict`, and every other failure is `Unavailable`.
//!
//! List calls page through the collection with `limit`/`offset` queries
//! until a short page arrives or the reported `total` is reached.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, error, instrument};
use url::Url;

use super::{DocumentStore, Filter, RawDocument, StoreError};
use crate::config::DocumentStoreConfig;

/// Page size requested by list calls.
const LIST_LIMIT: usize = 1000;

/// How much of an error body to keep for diagnostics.
const ERROR_BODY_CHARS: usize = 200;

/// Document store client speaking the remote REST API.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct HttpDocumentStore {
    inner: Arc<HttpDocumentStoreInner>,
}

struct HttpDocumentStoreInner {
    client: reqwest::Client,
    endpoint: Url,
    database_id: String,
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    /// Matching documents across all pages, when the server reports it.
    #[serde(default)]
    total: Option<usize>,
    documents: Vec<RawDocument>,
}

/// Documents gathered from successive list pages.
#[derive(Debug, Default)]
struct PageCollector {
    documents: Vec<RawDocument>,
    done: bool,
}

impl PageCollector {
    /// Offset of the next page to request.
    const fn offset(&self) -> usize {
        self.documents.len()
    }

    const fn is_done(&self) -> bool {
        self.done
    }

    fn push(&mut self, page: DocumentList) {
        let received = page.documents.len();
        self.documents.extend(page.documents);
        self.done = received < LIST_LIMIT
            || page.total.is_some_and(|total| self.documents.len() >= total);
    }

    fn into_documents(self) -> Vec<RawDocument> {
        self.documents
    }
}

impl HttpDocumentStore {
    /// Create a new document store client.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the headers are invalid or the
    /// HTTP client fails to build.
    pub fn new(config: &DocumentStoreConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Appwrite-Project",
            HeaderValue::from_str(&config.project_id)
                .map_err(|e| StoreError::Unavailable(format!("invalid project id: {e}")))?,
        );
        let mut key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|e| StoreError::Unavailable(format!("invalid API key format: {e}")))?;
        key.set_sensitive(true);
        headers.insert("X-Appwrite-Key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(HttpDocumentStoreInner {
                client,
                endpoint: config.endpoint.clone(),
                database_id: config.database_id.clone(),
            }),
        })
    }

    /// `{endpoint}/databases/{db}/collections/{collection}/documents[/{id}]`
    fn documents_url(&self, collection: &str, id: Option<&str>) -> Result<Url, StoreError> {
        documents_url(&self.inner.endpoint, &self.inner.database_id, collection, id)
    }

    /// Send a request and return the body of a successful response.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<String, StoreError> {
        let mut request = self.inner.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            return Ok(text);
        }

        let err = status_error(status, &text);
        if matches!(err, StoreError::Unavailable(_)) {
            error!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Document store returned non-success status"
            );
        } else {
            debug!(status = %status, "Document store rejected request");
        }
        Err(err)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    #[instrument(skip(self, filter), fields(collection = %collection))]
    async fn list_documents(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<RawDocument>, StoreError> {
        let mut pages = PageCollector::default();
        while !pages.is_done() {
            let mut url = self.documents_url(collection, None)?;
            {
                let mut query = url.query_pairs_mut();
                for encoded in encode_filter(filter, pages.offset()) {
                    query.append_pair("queries[]", &encoded);
                }
            }

            let body = self.send(Method::GET, url, None).await?;
            pages.push(parse_page(&body)?);
        }

        let documents = pages.into_documents();
        debug!(count = documents.len(), "Listed documents");
        Ok(documents)
    }

    #[instrument(skip(self), fields(collection = %collection, id = %id))]
    async fn get_document(&self, collection: &str, id: &str) -> Result<RawDocument, StoreError> {
        let url = self.documents_url(collection, Some(id))?;
        let body = self.send(Method::GET, url, None).await?;
        parse_document(&body)
    }

    #[instrument(skip(self, fields), fields(collection = %collection, id = %id))]
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<RawDocument, StoreError> {
        let url = self.documents_url(collection, None)?;
        let body = json!({ "documentId": id, "data": fields });
        let body = self.send(Method::POST, url, Some(body)).await?;
        parse_document(&body)
    }

    #[instrument(skip(self), fields(collection = %collection, id = %id))]
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let url = self.documents_url(collection, Some(id))?;
        self.send(Method::DELETE, url, None).await.map(|_| ())
    }
}

// =============================================================================
// Request / Response Helpers
// =============================================================================

fn documents_url(
    endpoint: &Url,
    database_id: &str,
    collection: &str,
    id: Option<&str>,
) -> Result<Url, StoreError> {
    let mut url = endpoint.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| StoreError::Unavailable(format!("endpoint {endpoint} cannot be a base")))?;
        segments
            .pop_if_empty()
            .extend(["databases", database_id, "collections", collection, "documents"]);
        if let Some(id) = id {
            segments.push(id);
        }
    }
    Ok(url)
}

/// Encode equality predicates as JSON query strings, plus the page window.
fn encode_filter(filter: &Filter, offset: usize) -> Vec<String> {
    filter
        .predicates()
        .iter()
        .map(|(field, value)| {
            json!({ "method": "equal", "attribute": field, "values": [value] }).to_string()
        })
        .chain([
            json!({ "method": "limit", "values": [LIST_LIMIT] }).to_string(),
            json!({ "method": "offset", "values": [offset] }).to_string(),
        ])
        .collect()
}

fn parse_page(body: &str) -> Result<DocumentList, StoreError> {
    serde_json::from_str(body)
        .map_err(|e| StoreError::Unavailable(format!("unreadable document list: {e}")))
}

fn parse_document(body: &str) -> Result<RawDocument, StoreError> {
    serde_json::from_str(body)
        .map_err(|e| StoreError::Unavailable(format!("unreadable document: {e}")))
}

fn status_error(status: StatusCode, body: &str) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::CONFLICT => StoreError::Conflict,
        _ => StoreError::Unavailable(format!(
            "HTTP {status}: {}",
            body.chars().take(ERROR_BODY_CHARS).collect::<String>()
        )),
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Unavailable("request timed out".to_string())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_url_with_and_without_id() {
        let endpoint = Url::parse("https://docs.test/v1/").unwrap();
        let list = documents_url(&endpoint, "main", "cart", None).unwrap();
        assert_eq!(
            list.as_str(),
            "https://docs.test/v1/databases/main/collections/cart/documents"
        );

        let one = documents_url(&endpoint, "main", "cart", Some("a b")).unwrap();
        assert_eq!(
            one.as_str(),
            "https://docs.test/v1/databases/main/collections/cart/documents/a%20b"
        );
    }

    fn page(len: usize, total: Option<usize>) -> DocumentList {
        DocumentList {
            total,
            documents: vec![RawDocument::default(); len],
        }
    }

    #[test]
    fn test_encode_filter_emits_equal_and_page_window() {
        let encoded = encode_filter(&Filter::all().eq("mealId", "m1"), 2000);
        assert_eq!(encoded.len(), 3);

        let first: Value = serde_json::from_str(&encoded[0]).unwrap();
        assert_eq!(first["method"], "equal");
        assert_eq!(first["attribute"], "mealId");
        assert_eq!(first["values"][0], "m1");

        let limit: Value = serde_json::from_str(&encoded[1]).unwrap();
        assert_eq!(limit["method"], "limit");
        assert_eq!(limit["values"][0], 1000);

        let offset: Value = serde_json::from_str(&encoded[2]).unwrap();
        assert_eq!(offset["method"], "offset");
        assert_eq!(offset["values"][0], 2000);
    }

    #[test]
    fn test_pages_are_collected_until_short_page() {
        let mut pages = PageCollector::default();
        pages.push(page(LIST_LIMIT, Some(2500)));
        assert!(!pages.is_done());
        assert_eq!(pages.offset(), 1000);

        pages.push(page(LIST_LIMIT, Some(2500)));
        assert!(!pages.is_done());
        assert_eq!(pages.offset(), 2000);

        pages.push(page(500, Some(2500)));
        assert!(pages.is_done());
        assert_eq!(pages.into_documents().len(), 2500);
    }

    #[test]
    fn test_full_page_reaching_total_stops() {
        let mut pages = PageCollector::default();
        pages.push(page(LIST_LIMIT, Some(1000)));
        assert!(pages.is_done());
    }

    #[test]
    fn test_full_page_without_total_asks_again() {
        let mut pages = PageCollector::default();
        pages.push(parse_page(r#"{"documents":[]}"#).unwrap());
        assert!(pages.is_done());

        let mut pages = PageCollector::default();
        pages.push(page(LIST_LIMIT, None));
        assert!(!pages.is_done());
        pages.push(page(0, None));
        assert!(pages.is_done());
        assert_eq!(pages.into_documents().len(), 1000);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_error(StatusCode::NOT_FOUND, ""), StoreError::NotFound);
        assert_eq!(status_error(StatusCode::CONFLICT, ""), StoreError::Conflict);
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "down"),
            StoreError::Unavailable(msg) if msg.contains("503") && msg.contains("down")
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_parse_document_keeps_system_fields() {
        let doc = parse_document(
            r#"{"$id":"m1","$createdAt":"2024-05-01T10:00:00.000+00:00","name":"Pho"}"#,
        )
        .unwrap();
        assert_eq!(doc.id(), Some("m1"));
        assert_eq!(doc.get("name"), Some(&Value::from("Pho")));
    }

    #[test]
    fn test_parse_list_body() {
        let list = parse_page(r#"{"total":1,"documents":[{"$id":"a"}]}"#).unwrap();
        assert_eq!(list.total, Some(1));
        assert_eq!(list.documents.len(), 1);
    }
}
