//! The numbered rule catalog a deposit package is checked against.

use crate::error::RuleCatalogError;
use crate::rules::{Check, Rule, RuleCatalog, RuleId};
use crate::validators::identity::IdentityCheck;

pub const BAGIT_TXT: &str = "bagit.txt";
pub const DATASET_XML: &str = "metadata/dataset.xml";
pub const FILES_XML: &str = "metadata/files.xml";

pub const DATASET_SCHEMA_KEY: &str = "dataset.xml";
pub const FILES_SCHEMA_KEY: &str = "files.xml";

/// How much of the catalog applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    /// Everything, including reconciliation against the catalog
    #[default]
    WithCatalog,
    /// Only what can be judged from the package itself
    StandAlone,
}

fn rule(id: &str, check: Check, depends_on: &[&str]) -> Result<Rule, RuleCatalogError> {
    depends_on
        .iter()
        .try_fold(Rule::new(RuleId::parse(id)?, check), |rule, dependency| {
            Ok(rule.depends_on(RuleId::parse(dependency)?))
        })
}

fn package_rules() -> Result<Vec<Rule>, RuleCatalogError> {
    Ok(vec![
        rule("1.1.1", Check::ManifestsCoverPayload, &[])?,
        rule("1.1.2", Check::ManifestChecksumsMatch, &[])?,
        rule("1.2.1", Check::FileExists(BAGIT_TXT.into()), &[])?,
        rule("1.2.2", Check::FileExists(crate::package::BAG_INFO.into()), &[])?,
        rule("2.1", Check::FileExists(DATASET_XML.into()), &[])?,
        rule("2.2", Check::FileExists(FILES_XML.into()), &[])?,
        rule(
            "3.1.1",
            Check::ConformsToSchema {
                path: DATASET_XML.into(),
                schema_key: DATASET_SCHEMA_KEY.to_string(),
            },
            &["2.1"],
        )?,
        // Needs the parsed tree, so a malformed dataset.xml aborts here after 3.1.1 reported it
        rule(
            "3.1.7",
            Check::PointsHaveAtLeastTwoValues {
                path: DATASET_XML.into(),
            },
            &["2.1"],
        )?,
        rule(
            "3.2.1",
            Check::ConformsToSchema {
                path: FILES_XML.into(),
                schema_key: FILES_SCHEMA_KEY.to_string(),
            },
            &["2.2"],
        )?,
    ])
}

fn identity_rules() -> Result<Vec<Rule>, RuleCatalogError> {
    [
        ("4.1", IdentityCheck::OrganizationalIdentifierMatchesOneDataset),
        ("4.2", IdentityCheck::SwordTokenResolvesToVersion),
        ("4.3(a)", IdentityCheck::DepositorRoleOnCollection),
        ("4.3(b)", IdentityCheck::DepositorRoleOnDataset),
        ("4.4(a)", IdentityCheck::SwordTokenLinkedToDataset),
        ("4.4(b)", IdentityCheck::OtherIdMatchesPrefixedIdentifier),
    ]
    .into_iter()
    .map(|(id, check)| rule(id, Check::Identity(check), &["1.2.2"]))
    .collect()
}

/// Build the default catalog for `level`
pub fn default_catalog(level: ValidationLevel) -> Result<RuleCatalog, RuleCatalogError> {
    let mut rules = package_rules()?;
    if level == ValidationLevel::WithCatalog {
        rules.extend(identity_rules()?);
    }
    RuleCatalog::new(rules)
}
