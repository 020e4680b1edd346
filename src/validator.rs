//! Package validation facade.
//!
//! [`BagValidator`] holds what lives for the whole process (the rule catalog, compiled
//! schemas, the catalog client and identity settings) and builds a fresh [`Context`] for every
//! package it is asked to check. Runs share nothing mutable, so any number of them may be in
//! flight at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::info;

use crate::catalog::CatalogClient;
use crate::context::Context;
use crate::error::Result;
use crate::package::PackageWorkspace;
use crate::report::{ComplianceVerdict, InformationPackageType, ReportBuilder, ValidationReport};
use crate::rules::{RuleCatalog, RuleEngine};
use crate::schema_loader::SchemaRegistry;
use crate::validators::identity::IdentitySettings;
use crate::validators::polygon::PolygonValidator;

/// How a package directory is handed to the rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Staging {
    /// Validate the directory where it is
    #[default]
    InPlace,
    /// Validate a temporary copy, removed when the run ends
    Copy,
}

#[derive(Clone)]
pub struct BagValidator {
    engine: RuleEngine,
    schemas: Arc<SchemaRegistry>,
    catalog: Option<Arc<dyn CatalogClient>>,
    identity: IdentitySettings,
    polygon_validator: Option<Arc<dyn PolygonValidator>>,
    package_type: InformationPackageType,
    staging: Staging,
}

impl BagValidator {
    pub fn new(rules: Arc<RuleCatalog>, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            engine: RuleEngine::new(rules),
            schemas,
            catalog: None,
            identity: IdentitySettings::default(),
            polygon_validator: None,
            package_type: InformationPackageType::default(),
            staging: Staging::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogClient>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_identity_settings(mut self, identity: IdentitySettings) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_polygon_validator(mut self, validator: Arc<dyn PolygonValidator>) -> Self {
        self.polygon_validator = Some(validator);
        self
    }

    pub fn with_package_type(mut self, package_type: InformationPackageType) -> Self {
        self.package_type = package_type;
        self
    }

    pub fn with_staging(mut self, staging: Staging) -> Self {
        self.staging = staging;
        self
    }

    fn context(&self, root: &Path) -> Context {
        let mut ctx = Context::new(root, Arc::clone(&self.schemas))
            .with_identity_settings(self.identity.clone());
        if let Some(catalog) = &self.catalog {
            ctx = ctx.with_catalog(Arc::clone(catalog));
        }
        if let Some(validator) = &self.polygon_validator {
            ctx = ctx.with_polygon_validator(Arc::clone(validator));
        }
        ctx
    }

    /// Run every rule against the package at `path` and return the raw report
    pub async fn run(&self, path: &Path) -> Result<ValidationReport> {
        let workspace = match self.staging {
            Staging::InPlace => PackageWorkspace::open(path)?,
            Staging::Copy => PackageWorkspace::stage(path).await?,
        };

        let ctx = self.context(workspace.root());
        let report = self.engine.run(&ctx).await;
        // The workspace, and with it any staged copy, is dropped here on every outcome
        Ok(report)
    }

    /// Validate one package.
    ///
    /// A run that ends on a fatal outcome is returned as
    /// [`ValidationError::RunAborted`](crate::error::ValidationError::RunAborted).
    pub async fn validate(&self, path: &Path) -> Result<ComplianceVerdict> {
        let started = Instant::now();
        let report = self.run(path).await?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let verdict = ReportBuilder::new(path, name)
            .package_type(self.package_type)
            .build(report);

        if let Ok(verdict) = &verdict {
            info!(
                bag = %path.display(),
                compliant = verdict.is_compliant,
                violations = verdict.rule_violations.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "package validated"
            );
        }
        verdict
    }

    /// Validate several packages concurrently; results keep the order of `paths`
    pub async fn validate_all(
        &self,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<ComplianceVerdict>)> {
        let runs = paths.iter().map(|path| async move {
            let verdict = self.validate(path).await;
            (path.clone(), verdict)
        });
        join_all(runs).await
    }
}

impl std::fmt::Debug for BagValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BagValidator")
            .field("rules", &self.engine.catalog().len())
            .field("schemas", &self.schemas)
            .field("catalog", &self.catalog.is_some())
            .field("package_type", &self.package_type)
            .field("staging", &self.staging)
            .finish()
    }
}
