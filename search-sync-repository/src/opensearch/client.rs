//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    params::{Conflicts, Refresh},
    BulkParts, DeleteByQueryParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::SearchIndexConfig;
use crate::errors::SearchError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::get_index_settings;
use crate::opensearch::queries::{
    build_delete_query, build_search_query, document_source, parse_hit, total_hits,
};
use search_sync_shared::{
    document_key, EntityDocument, EntityId, SearchQuery, SearchResponse,
};

/// Search index stored in an OpenSearch cluster.
///
/// # Example
///
/// ```ignore
/// let config = SearchIndexConfig::with_index_name("entities");
/// let index = OpenSearchIndex::new("http://localhost:9200", config).await?;
/// index.ensure_index_exists().await?;
///
/// let place = EntityDocument::new("Place", 1).with_field("name", "Valinor");
/// index.index_documents(&[place]).await?;
/// ```
pub struct OpenSearchIndex {
    client: OpenSearch,
    config: SearchIndexConfig,
}

impl OpenSearchIndex {
    /// Create a new client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `config` - Index name and bulk request size
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchIndex)` - A new client instance
    /// * `Err(SearchError)` - If connection setup fails
    pub async fn new(url: &str, config: SearchIndexConfig) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            index = %config.index_name,
            "Created OpenSearch client"
        );

        Ok(Self { client, config })
    }

    /// Send bulk request lines, chunked by the configured bulk size.
    async fn send_bulk(&self, operations: Vec<Vec<Value>>) -> Result<(), SearchError> {
        for chunk in operations.chunks(self.config.bulk_size()) {
            let body: Vec<JsonBody<Value>> = chunk
                .iter()
                .flatten()
                .cloned()
                .map(JsonBody::from)
                .collect();

            let response = self
                .client
                .bulk(BulkParts::Index(&self.config.index_name))
                .body(body)
                .refresh(Refresh::True)
                .send()
                .await
                .map_err(|e| SearchError::bulk_write(e.to_string()))?;

            let response = check_status(response, SearchError::BulkWriteError).await?;
            let response_body: Value = response
                .json()
                .await
                .map_err(|e| SearchError::response(e.to_string()))?;

            let failures = bulk_failures(&response_body);
            if failures > 0 {
                error!(failures, "Bulk request had failed items");
                return Err(SearchError::bulk_write(format!(
                    "{} of {} bulk operations failed",
                    failures,
                    chunk.len()
                )));
            }
        }
        Ok(())
    }

    async fn write_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }
        let operations = documents
            .iter()
            .map(|doc| {
                vec![
                    json!({ "index": { "_id": doc.document_key() } }),
                    document_source(doc),
                ]
            })
            .collect();
        self.send_bulk(operations).await
    }

    async fn run_delete_by_query(&self, body: Value) -> Result<usize, SearchError> {
        let index = [self.config.index_name.as_str()];
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&index))
            .body(body)
            .conflicts(Conflicts::Proceed)
            .refresh(true)
            .send()
            .await
            .map_err(|e| SearchError::delete(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(0);
        }
        let response = check_status(response, SearchError::DeleteError).await?;
        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::response(e.to_string()))?;

        Ok(response_body
            .get("deleted")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

/// Turn a non-success response into an error carrying its body.
async fn check_status(
    response: Response,
    make_error: fn(String) -> SearchError,
) -> Result<Response, SearchError> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }
    let error_body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %error_body, "OpenSearch request failed");
    Err(make_error(format!(
        "Request failed with status {}: {}",
        status, error_body
    )))
}

/// Count the items of a bulk response that carry an error.
fn bulk_failures(response_body: &Value) -> usize {
    if !response_body
        .get("errors")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return 0;
    }
    response_body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.as_object()
                        .and_then(|op| op.values().next())
                        .and_then(|result| result.get("error"))
                        .is_some()
                })
                .count()
        })
        .unwrap_or(0)
}

#[async_trait]
impl SearchIndexProvider for OpenSearchIndex {
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn index_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError> {
        self.write_documents(documents).await?;
        debug!("Documents indexed");
        Ok(())
    }

    /// Documents are replaced wholesale, so an update is the same bulk
    /// `index` operation as an insert.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn update_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError> {
        self.write_documents(documents).await?;
        debug!("Documents updated");
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_documents(&self, entity_type: &str, ids: &[EntityId]) -> Result<(), SearchError> {
        if ids.is_empty() {
            return Ok(());
        }
        // A missing document yields a per-item 404 "not_found" result, not an error.
        let operations = ids
            .iter()
            .map(|id| vec![json!({ "delete": { "_id": document_key(entity_type, id) } })])
            .collect();
        self.send_bulk(operations).await?;
        debug!("Documents deleted");
        Ok(())
    }

    #[instrument(skip(self, query), fields(entity_type = %query.entity_type))]
    async fn delete_by_query(&self, query: &SearchQuery) -> Result<usize, SearchError> {
        let deleted = self.run_delete_by_query(build_delete_query(query)).await?;
        debug!(deleted, "Deleted documents by query");
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn purge_all(&self, entity_type: &str) -> Result<usize, SearchError> {
        let deleted = self
            .run_delete_by_query(build_delete_query(&SearchQuery::all(entity_type)))
            .await?;
        info!(deleted, "Purged entity type");
        Ok(deleted)
    }

    #[instrument(skip(self, query), fields(entity_type = %query.entity_type))]
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        let index = [self.config.index_name.as_str()];
        let response = self
            .client
            .search(SearchParts::Index(&index))
            .body(build_search_query(query))
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(SearchResponse::empty());
        }
        let response = check_status(response, SearchError::QueryError).await?;
        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::response(e.to_string()))?;

        let hits = response_body
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(parse_hit).collect())
            .unwrap_or_default();

        Ok(SearchResponse {
            total: total_hits(&response_body),
            hits,
        })
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        let index = [self.config.index_name.as_str()];
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&index))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if exists.status_code().is_success() {
            debug!(index = %self.config.index_name, "Index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.config.index_name))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SearchError::index_setup(e.to_string()))?;
        check_status(response, SearchError::IndexSetupError).await?;

        info!(index = %self.config.index_name, "Created search index");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let health: Value = response
            .json()
            .await
            .map_err(|e| SearchError::response(e.to_string()))?;
        let status = health
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        debug!(status, "OpenSearch cluster status");
        Ok(status == "green" || status == "yellow")
    }
}
