use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::report::InformationPackageType;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only the verdict
    Quiet,
    #[default]
    Normal,
    /// Every rule outcome
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Check a deposit package against the rule catalog
#[derive(Parser, Debug, Clone)]
#[command(name = "validate-bag")]
#[command(about = "Check an archival deposit package (bag) for compliance with the deposit profile")]
#[command(version)]
pub struct Cli {
    /// Bag directory to validate
    #[arg(help = "Directory containing the bag")]
    pub bag: PathBuf,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Base URL of the catalog used for identity reconciliation
    #[arg(long = "catalog-url")]
    pub catalog_url: Option<String>,

    /// Only check what can be judged from the bag itself
    #[arg(long = "stand-alone")]
    pub stand_alone: bool,

    /// Information package type; only labels the verdict, the same rules apply to both types
    #[arg(long = "package-type", value_enum, default_value_t = InformationPackageType::Deposit)]
    pub package_type: InformationPackageType,

    /// Validate a staged copy of the bag instead of the original
    #[arg(long = "copy")]
    pub copy: bool,

    /// Cache directory for downloaded schemas
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.bag.is_dir() {
            return Err(format!("Bag directory does not exist: {}", self.bag.display()));
        }
        if let Some(timeout) = self.timeout
            && timeout == 0
        {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cli_parsing() {
        let cli = Cli::try_parse_from(["validate-bag", "/tmp/bag"]).unwrap();
        assert_eq!(cli.bag, PathBuf::from("/tmp/bag"));
        assert!(!cli.stand_alone);
        assert_eq!(cli.package_type, InformationPackageType::Deposit);
        assert_eq!(cli.output_format, None);
        assert_eq!(cli.verbosity(), VerbosityLevel::Normal);
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::try_parse_from([
            "validate-bag",
            "--stand-alone",
            "--package-type",
            "migration",
            "--format",
            "json",
            "-q",
            "/tmp/bag",
        ])
        .unwrap();
        assert!(cli.stand_alone);
        assert_eq!(cli.package_type, InformationPackageType::Migration);
        assert_eq!(cli.output_format, Some(OutputFormat::Json));
        assert_eq!(cli.verbosity(), VerbosityLevel::Quiet);
    }

    #[test]
    fn test_package_type_help_says_it_is_a_label() {
        use clap::CommandFactory;

        let command = Cli::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "package_type")
            .and_then(|arg| arg.get_help())
            .map(|help| help.to_string())
            .unwrap();
        assert!(help.contains("only labels the verdict"));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["validate-bag", "-v", "-q", "/tmp/bag"]).is_err());
    }

    #[test]
    fn test_validate_missing_bag() {
        let cli = Cli::try_parse_from(["validate-bag", "/definitely/not/here"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
