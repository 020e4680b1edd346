use std::path::PathBuf;

use thiserror::Error;

use crate::report::ValidationReport;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("Schema parsing error: {url} - {details}")]
    SchemaParsing { url: String, details: String },

    #[error("Schema not found: {url}")]
    SchemaNotFound { url: String },

    #[error("No schema registered under key '{key}'")]
    UnknownSchemaKey { key: String },

    #[error("Bag on path '{path}' could not be found or read")]
    PackageNotFound { path: PathBuf },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule catalog error: {0}")]
    RuleCatalog(#[from] RuleCatalogError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("Validation aborted by rule {rule}: {diagnostic}")]
    RunAborted {
        rule: String,
        diagnostic: String,
        report: Box<ValidationReport>,
    },
}

/// Malformed rule catalogs. Raised at registration, never during a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleCatalogError {
    #[error("Duplicate rule id: {id}")]
    DuplicateId { id: String },

    #[error("Rule {rule} depends on unknown rule {dependency}")]
    UnknownDependency { rule: String, dependency: String },

    #[error("Dependency cycle through rules: {}", members.join(", "))]
    Cycle { members: Vec<String> },

    #[error("Invalid rule id '{id}': {reason}")]
    InvalidId { id: String, reason: String },
}

/// Failures talking to the external metadata catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog unreachable: {url} - {details}")]
    Transport { url: String, details: String },

    #[error("Catalog returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Catalog response from {url} could not be decoded: {details}")]
    Decode { url: String, details: String },
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// LibXML2-specific error types
#[derive(Error, Debug, Clone)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {details}")]
    SchemaParseFailed { details: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("File validation failed with code {code}: {file}")]
    ValidationFailed { code: i32, file: PathBuf },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

impl From<LibXml2Error> for ValidationError {
    fn from(err: LibXml2Error) -> Self {
        ValidationError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

impl ValidationError {
    /// True when the error carries a partially evaluated report
    pub fn is_aborted_run(&self) -> bool {
        matches!(self, ValidationError::RunAborted { .. })
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_catalog_error_display() {
        let cycle = RuleCatalogError::Cycle {
            members: vec!["1.1".to_string(), "1.2".to_string()],
        };
        assert_eq!(cycle.to_string(), "Dependency cycle through rules: 1.1, 1.2");

        let unknown = RuleCatalogError::UnknownDependency {
            rule: "3.1.7".to_string(),
            dependency: "9.9".to_string(),
        };
        assert!(unknown.to_string().contains("3.1.7"));
        assert!(unknown.to_string().contains("9.9"));
    }

    #[test]
    fn test_catalog_error_display() {
        let transport = CatalogError::Transport {
            url: "http://localhost:8080/api/search".to_string(),
            details: "connection refused".to_string(),
        };
        assert!(transport.to_string().contains("Catalog unreachable"));

        let status = CatalogError::Status {
            url: "http://localhost:8080/api/search".to_string(),
            status: 503,
        };
        assert!(status.to_string().contains("503"));
    }

    #[test]
    fn test_package_not_found_message() {
        let err = ValidationError::PackageNotFound {
            path: PathBuf::from("/some/non/existing/filename"),
        };
        assert_eq!(
            err.to_string(),
            "Bag on path '/some/non/existing/filename' could not be found or read"
        );
    }

    #[test]
    fn test_error_conversions() {
        let err: ValidationError = LibXml2Error::MemoryAllocation.into();
        assert!(matches!(err, ValidationError::LibXml2Internal { .. }));

        let err: ValidationError = ConfigError::Validation("bad".to_string()).into();
        assert!(matches!(err, ValidationError::Config(_)));

        let err: ValidationError = RuleCatalogError::DuplicateId {
            id: "1.1.1".to_string(),
        }
        .into();
        assert!(matches!(err, ValidationError::RuleCatalog(_)));
        assert!(!err.is_aborted_run());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let validation_error = ValidationError::Io(io_error);

        let source = validation_error.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("File not found"));
    }
}
