use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::catalog::CatalogClient;
use crate::document::DocumentCache;
use crate::schema_loader::SchemaRegistry;
use crate::validators::identity::{IdentityFindings, IdentitySettings};
use crate::validators::polygon::{PolygonValidator, RingPolygonValidator};

/// Everything a rule may look at during one validation run.
///
/// Owned by exactly one run. The document cache and identity findings fill up as rules ask for
/// them and are dropped with the context.
pub struct Context {
    root: PathBuf,
    documents: DocumentCache,
    schemas: Arc<SchemaRegistry>,
    catalog: Option<Arc<dyn CatalogClient>>,
    identity: IdentitySettings,
    polygon_validator: Arc<dyn PolygonValidator>,
    identity_findings: OnceCell<Result<Arc<IdentityFindings>, String>>,
}

impl Context {
    pub fn new(root: impl Into<PathBuf>, schemas: Arc<SchemaRegistry>) -> Self {
        let root = root.into();
        Self {
            documents: DocumentCache::new(root.clone()),
            root,
            schemas,
            catalog: None,
            identity: IdentitySettings::default(),
            polygon_validator: Arc::new(RingPolygonValidator),
            identity_findings: OnceCell::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogClient>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_identity_settings(mut self, settings: IdentitySettings) -> Self {
        self.identity = settings;
        self
    }

    pub fn with_polygon_validator(mut self, validator: Arc<dyn PolygonValidator>) -> Self {
        self.polygon_validator = validator;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn catalog(&self) -> Option<&Arc<dyn CatalogClient>> {
        self.catalog.as_ref()
    }

    pub fn identity_settings(&self) -> &IdentitySettings {
        &self.identity
    }

    pub fn polygon_validator(&self) -> &dyn PolygonValidator {
        self.polygon_validator.as_ref()
    }

    pub(crate) fn identity_findings(
        &self,
    ) -> &OnceCell<Result<Arc<IdentityFindings>, String>> {
        &self.identity_findings
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("schemas", &self.schemas)
            .field("catalog", &self.catalog.is_some())
            .field("identity", &self.identity)
            .finish()
    }
}
