//! Schema resolution and the process-wide registry of compiled schemas.
//!
//! A schema location is either a local path or an http(s) URL. Remote documents go through the
//! two-tier [`SchemaDocumentCache`]; local ones are compiled straight from disk so relative
//! `xs:include` locations resolve. The resulting [`SchemaRegistry`] is built once at startup and
//! only read afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::SchemaDocumentCache;
use crate::error::{Result, ValidationError};
use crate::http_client::AsyncHttpClient;
use crate::libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};

/// Where a schema is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaLocation {
    Local(PathBuf),
    Remote(String),
}

impl SchemaLocation {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            SchemaLocation::Remote(location.to_string())
        } else {
            SchemaLocation::Local(PathBuf::from(location))
        }
    }
}

pub struct SchemaLoader {
    cache: Arc<SchemaDocumentCache>,
    http_client: AsyncHttpClient,
    libxml2: LibXml2Wrapper,
}

impl SchemaLoader {
    pub fn new(cache: Arc<SchemaDocumentCache>, http_client: AsyncHttpClient) -> Self {
        Self {
            cache,
            http_client,
            libxml2: LibXml2Wrapper::new(),
        }
    }

    /// Fetch and compile the schema at `location`
    pub async fn compile(&self, location: &SchemaLocation) -> Result<XmlSchemaPtr> {
        match location {
            SchemaLocation::Local(path) => self.compile_local(path).await,
            SchemaLocation::Remote(url) => self.compile_remote(url).await,
        }
    }

    async fn compile_local(&self, path: &Path) -> Result<XmlSchemaPtr> {
        let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ValidationError::SchemaNotFound {
                url: path.display().to_string(),
            },
            _ => ValidationError::Io(e),
        })?;
        let source = path.display().to_string();
        validate_schema_content(&data, &source)?;

        self.libxml2
            .parse_schema_from_file(path)
            .map_err(|e| ValidationError::SchemaParsing {
                url: source,
                details: e.to_string(),
            })
    }

    async fn compile_remote(&self, url: &str) -> Result<XmlSchemaPtr> {
        let data = match self.cache.get(url).await? {
            Some(cached) => Arc::clone(&cached.data),
            None => {
                debug!(url, "downloading schema");
                let data = self.http_client.download(url).await?;
                validate_schema_content(&data, url)?;
                self.cache.set(url, data.clone()).await?;
                Arc::new(data)
            }
        };

        self.libxml2
            .parse_schema_from_memory(&data)
            .map_err(|e| ValidationError::SchemaParsing {
                url: url.to_string(),
                details: e.to_string(),
            })
    }
}

/// Cheap sanity check before handing bytes to libxml2
fn validate_schema_content(data: &[u8], source: &str) -> Result<()> {
    let content = std::str::from_utf8(data).map_err(|_| ValidationError::SchemaParsing {
        url: source.to_string(),
        details: "Schema content is not valid UTF-8".to_string(),
    })?;

    if !content.trim_start().starts_with('<') {
        return Err(ValidationError::SchemaParsing {
            url: source.to_string(),
            details: "Schema content does not appear to be XML".to_string(),
        });
    }

    if !content.contains("<xs:schema")
        && !content.contains("<xsd:schema")
        && !content.contains("<schema")
    {
        return Err(ValidationError::SchemaParsing {
            url: source.to_string(),
            details: "Content does not appear to be an XML Schema (XSD)".to_string(),
        });
    }

    Ok(())
}

/// Compiled schemas keyed by schema key (e.g. `dataset.xml`)
#[derive(Default, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, XmlSchemaPtr>,
    libxml2: LibXml2Wrapper,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every configured schema. Any failure aborts startup.
    pub async fn load(
        locations: &BTreeMap<String, String>,
        loader: &SchemaLoader,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (key, location) in locations {
            let schema = loader.compile(&SchemaLocation::parse(location)).await?;
            info!(schema_key = %key, location = %location, "schema compiled");
            registry.insert(key.clone(), schema);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, key: impl Into<String>, schema: XmlSchemaPtr) {
        self.schemas.insert(key.into(), schema);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Validate `file` against the schema registered under `key`
    pub fn validate(&self, key: &str, file: &Path) -> Result<ValidationResult> {
        let schema = self
            .schemas
            .get(key)
            .ok_or_else(|| ValidationError::UnknownSchemaKey {
                key: key.to_string(),
            })?;
        Ok(self.libxml2.validate_file(schema, file)?)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("keys", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}
