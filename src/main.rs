use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use validate_bag::cli::Cli;
use validate_bag::{
    AsyncHttpClient, BagValidator, Config, ConfigManager, DataverseClient, Output,
    SchemaDocumentCache, SchemaLoader, SchemaRegistry, Staging, ValidationError, ValidationLevel,
    default_catalog,
};

const EXIT_COMPLIANT: u8 = 0;
const EXIT_NOT_COMPLIANT: u8 = 1;
const EXIT_ABORTED: u8 = 2;
const EXIT_CONFIGURATION: u8 = 3;

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything built once per process
async fn build_validator(cli: &Cli, config: &Config) -> Result<BagValidator, ValidationError> {
    let level = if cli.stand_alone {
        ValidationLevel::StandAlone
    } else {
        ValidationLevel::WithCatalog
    };
    let rules = Arc::new(default_catalog(level)?);

    let http = AsyncHttpClient::new(config.http_client_config())?;
    let cache = Arc::new(SchemaDocumentCache::new(config.cache_config()));
    let loader = SchemaLoader::new(cache, http.clone());
    let schemas = Arc::new(SchemaRegistry::load(&config.schemas, &loader).await?);
    debug!(schemas = ?schemas.keys().collect::<Vec<_>>(), "schemas ready");

    let staging = if cli.copy {
        Staging::Copy
    } else {
        Staging::InPlace
    };
    let mut validator = BagValidator::new(rules, schemas)
        .with_identity_settings(config.identity_settings())
        .with_package_type(cli.package_type)
        .with_staging(staging);

    if level == ValidationLevel::WithCatalog {
        let catalog = DataverseClient::new(
            http,
            &config.catalog.base_url,
            config.catalog.api_key.as_deref(),
        )?;
        validator = validator.with_catalog(Arc::new(catalog));
    }

    Ok(validator)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        return ExitCode::from(EXIT_CONFIGURATION);
    }

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration could not be loaded");
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };

    let output = Output::new(config.output.format.into(), cli.verbosity());

    let validator = match build_validator(&cli, &config).await {
        Ok(validator) => validator,
        Err(e) => {
            eprint!("{}", output.format_error(&e));
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };

    match validator.validate(&cli.bag).await {
        Ok(verdict) => match output.format_verdict(&verdict) {
            Ok(text) => {
                print!("{}", text);
                if verdict.is_compliant {
                    ExitCode::from(EXIT_COMPLIANT)
                } else {
                    ExitCode::from(EXIT_NOT_COMPLIANT)
                }
            }
            Err(e) => {
                eprint!("{}", output.format_error(&e));
                ExitCode::from(EXIT_ABORTED)
            }
        },
        Err(e @ ValidationError::PackageNotFound { .. }) => {
            eprint!("{}", output.format_error(&e));
            ExitCode::from(EXIT_CONFIGURATION)
        }
        Err(e) => {
            eprint!("{}", output.format_error(&e));
            ExitCode::from(EXIT_ABORTED)
        }
    }
}
