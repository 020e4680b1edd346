//! # validate-bag Library
//!
//! Compliance checking of archival deposit packages (BagIt-derived bags) against a numbered
//! rule catalog: manifest coverage, XML schema conformance of the embedded metadata,
//! geospatial sanity of that metadata and reconciliation of declared identifiers with an
//! external catalog.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod http_client;
pub mod libxml2;
pub mod output;
pub mod package;
pub mod report;
pub mod rules;
pub mod schema_loader;
pub mod validator;
pub mod validators;

pub use cache::{CacheConfig, SchemaDocumentCache};
pub use catalog::{CatalogClient, CatalogRecord, DataverseClient, OtherIdPrefix, RoleAssignment};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigManager};
pub use context::Context;
pub use document::{DocumentCache, ParseDiagnostic, ParsedDocument};
pub use error::{CatalogError, RuleCatalogError, ValidationError};
pub use http_client::{AsyncHttpClient, HttpClientConfig};
pub use libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
pub use output::Output;
pub use package::{BagInfo, IdentityClaim, PackageWorkspace};
pub use report::{ComplianceVerdict, InformationPackageType, ReportBuilder, ValidationReport};
pub use rules::defaults::{ValidationLevel, default_catalog};
pub use rules::{Check, Outcome, Rule, RuleCatalog, RuleEngine, RuleId};
pub use schema_loader::{SchemaLoader, SchemaLocation, SchemaRegistry};
pub use validator::{BagValidator, Staging};
pub use validators::identity::{IdentityCheck, IdentitySettings};
pub use validators::polygon::{PolygonGeometry, PolygonValidator, RingPolygonValidator};
