//! External metadata catalog.
//!
//! [`CatalogClient`] is the seam the identity rules talk to; [`DataverseClient`] implements it
//! over the Dataverse native and search APIs. Responses are read-only snapshots; nothing here
//! writes to the catalog.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CatalogError, CatalogResult, ValidationError};
use crate::http_client::AsyncHttpClient;

pub const API_KEY_HEADER: &str = "x-dataverse-key";

const OTHER_ID_BLOCK: &str = "dansDataVaultMetadata";
const OTHER_ID_FIELD: &str = "dansOtherId";
const OTHER_ID_SEARCH_FIELD: &str = "dansOtherId";
const SWORD_TOKEN_SEARCH_FIELD: &str = "dansSwordToken";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub persistent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleAssignment {
    pub assignee: String,
    pub role_alias: String,
}

impl RoleAssignment {
    pub fn new(assignee: impl Into<String>, role_alias: impl Into<String>) -> Self {
        Self {
            assignee: assignee.into(),
            role_alias: role_alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogRecord {
    pub persistent_id: String,
    pub other_id: Option<String>,
    pub role_assignments: BTreeSet<RoleAssignment>,
}

/// Per-account prefix the catalog stores in front of organizational identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherIdPrefix {
    pub account: String,
    pub prefix: String,
}

impl OtherIdPrefix {
    pub fn new(account: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn search_by_identifier(&self, identifier: &str) -> CatalogResult<Vec<SearchHit>>;

    async fn search_by_sword_token(&self, token: &str) -> CatalogResult<Vec<SearchHit>>;

    async fn get_dataset_latest_version(&self, persistent_id: &str)
    -> CatalogResult<CatalogRecord>;

    async fn get_collection_role_assignments(
        &self,
        collection: &str,
    ) -> CatalogResult<BTreeSet<RoleAssignment>>;

    async fn get_dataset_role_assignments(
        &self,
        persistent_id: &str,
    ) -> CatalogResult<BTreeSet<RoleAssignment>>;
}

/// Dataverse-backed catalog client
pub struct DataverseClient {
    http: AsyncHttpClient,
    base_url: Url,
}

impl DataverseClient {
    pub fn new(
        http: AsyncHttpClient,
        base_url: &str,
        api_key: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            ValidationError::Config(format!("Invalid catalog URL '{}': {}", base_url, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = match api_key {
            Some(key) => http.with_header(API_KEY_HEADER, key)?,
            None => http,
        };

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> CatalogResult<Url> {
        let mut url = self.base_url.join(path).map_err(|e| CatalogError::Transport {
            url: format!("{}{}", self.base_url, path),
            details: e.to_string(),
        })?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> CatalogResult<Value> {
        debug!(url = %url, "catalog request");
        self.http
            .get_json::<Value>(url.as_str())
            .await
            .map_err(|e| to_catalog_error(url.as_str(), e))
    }

    async fn search(&self, field: &str, value: &str) -> CatalogResult<Vec<SearchHit>> {
        let query = search_query(field, value);
        let url = self.url("api/search", &[("q", query.as_str()), ("type", "dataset")])?;
        let body = self.get(url.clone()).await?;
        parse_search_hits(&body).map_err(|details| CatalogError::Decode {
            url: url.to_string(),
            details,
        })
    }
}

#[async_trait]
impl CatalogClient for DataverseClient {
    async fn search_by_identifier(&self, identifier: &str) -> CatalogResult<Vec<SearchHit>> {
        self.search(OTHER_ID_SEARCH_FIELD, identifier).await
    }

    async fn search_by_sword_token(&self, token: &str) -> CatalogResult<Vec<SearchHit>> {
        self.search(SWORD_TOKEN_SEARCH_FIELD, token).await
    }

    async fn get_dataset_latest_version(
        &self,
        persistent_id: &str,
    ) -> CatalogResult<CatalogRecord> {
        let url = self.url(
            "api/datasets/:persistentId/",
            &[("persistentId", persistent_id)],
        )?;
        let body = self.get(url.clone()).await?;
        let other_id = parse_other_id(&body).map_err(|details| CatalogError::Decode {
            url: url.to_string(),
            details,
        })?;

        Ok(CatalogRecord {
            persistent_id: persistent_id.to_string(),
            other_id,
            role_assignments: BTreeSet::new(),
        })
    }

    async fn get_collection_role_assignments(
        &self,
        collection: &str,
    ) -> CatalogResult<BTreeSet<RoleAssignment>> {
        let url = self.url(&format!("api/dataverses/{}/assignments", collection), &[])?;
        let body = self.get(url.clone()).await?;
        parse_role_assignments(&body).map_err(|details| CatalogError::Decode {
            url: url.to_string(),
            details,
        })
    }

    async fn get_dataset_role_assignments(
        &self,
        persistent_id: &str,
    ) -> CatalogResult<BTreeSet<RoleAssignment>> {
        let url = self.url(
            "api/datasets/:persistentId/assignments",
            &[("persistentId", persistent_id)],
        )?;
        let body = self.get(url.clone()).await?;
        parse_role_assignments(&body).map_err(|details| CatalogError::Decode {
            url: url.to_string(),
            details,
        })
    }
}

/// Phrase query on one field; quotes and backslashes in `value` are escaped
fn search_query(field: &str, value: &str) -> String {
    let mut query = String::with_capacity(field.len() + value.len() + 3);
    query.push_str(field);
    query.push_str(":\"");
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            query.push('\\');
        }
        query.push(c);
    }
    query.push('"');
    query
}

fn to_catalog_error(url: &str, error: ValidationError) -> CatalogError {
    match error {
        ValidationError::HttpStatus { status, .. } => CatalogError::Status {
            url: url.to_string(),
            status,
        },
        ValidationError::Http(e) if e.is_decode() => CatalogError::Decode {
            url: url.to_string(),
            details: e.to_string(),
        },
        other => CatalogError::Transport {
            url: url.to_string(),
            details: other.to_string(),
        },
    }
}

/// `data.items[].global_id` from a search response
pub fn parse_search_hits(body: &Value) -> Result<Vec<SearchHit>, String> {
    let items = body
        .pointer("/data/items")
        .and_then(Value::as_array)
        .ok_or_else(|| "search response has no data.items array".to_string())?;

    items
        .iter()
        .map(|item| {
            item.get("global_id")
                .and_then(Value::as_str)
                .map(|pid| SearchHit {
                    persistent_id: pid.to_string(),
                })
                .ok_or_else(|| "search item without global_id".to_string())
        })
        .collect()
}

/// Stored other-id of the latest version, if any
pub fn parse_other_id(body: &Value) -> Result<Option<String>, String> {
    let blocks = body
        .pointer("/data/latestVersion/metadataBlocks")
        .ok_or_else(|| "dataset response has no data.latestVersion.metadataBlocks".to_string())?;

    let Some(fields) = blocks
        .get(OTHER_ID_BLOCK)
        .and_then(|block| block.get("fields"))
        .and_then(Value::as_array)
    else {
        return Ok(None);
    };

    let value = fields
        .iter()
        .find(|f| f.get("typeName").and_then(Value::as_str) == Some(OTHER_ID_FIELD))
        .and_then(|f| f.get("value"));

    Ok(match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(values)) => values.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    })
}

/// `data[]` entries of an assignments response
pub fn parse_role_assignments(body: &Value) -> Result<BTreeSet<RoleAssignment>, String> {
    let entries = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| "assignments response has no data array".to_string())?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let assignee = entry.get("assignee").and_then(Value::as_str)?;
            let alias = entry.get("_roleAlias").and_then(Value::as_str)?;
            Some(RoleAssignment::new(assignee, alias))
        })
        .collect())
}
