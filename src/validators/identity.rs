//! Reconciliation of the identifiers a package declares with what the catalog holds.
//!
//! One pass over the catalog produces [`IdentityFindings`] for all sub-checks at once; each
//! sub-check is exposed as its own rule and reads its slice of the findings. The pass runs at
//! most once per validation run and every sub-check runs regardless of the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{CatalogClient, OtherIdPrefix, RoleAssignment};
use crate::context::Context;
use crate::error::CatalogResult;
use crate::package::{BagInfo, IdentityClaim};
use crate::rules::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityCheck {
    /// The organizational identifier matches exactly one dataset
    OrganizationalIdentifierMatchesOneDataset,
    /// The SWORD token resolves to a dataset version
    SwordTokenResolvesToVersion,
    /// The depositor holds an accepted role on the collection
    DepositorRoleOnCollection,
    /// The depositor holds an accepted role on the dataset
    DepositorRoleOnDataset,
    /// The SWORD token is linked to the same dataset
    SwordTokenLinkedToDataset,
    /// The stored other-id equals the prefixed organizational identifier
    OtherIdMatchesPrefixedIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub accepted_role_aliases: Vec<String>,
    pub other_id_prefixes: Vec<OtherIdPrefix>,
    pub collection_alias: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            accepted_role_aliases: vec!["datasetcreator".to_string(), "dataseteditor".to_string()],
            other_id_prefixes: Vec::new(),
            collection_alias: "root".to_string(),
        }
    }
}

impl IdentitySettings {
    pub fn prefix_for(&self, account: &str) -> Option<&str> {
        self.other_id_prefixes
            .iter()
            .find(|p| p.account == account)
            .map(|p| p.prefix.as_str())
    }

    fn holds_accepted_role(&self, assignments: &BTreeSet<RoleAssignment>, account: &str) -> bool {
        let assignee = format!("@{}", account);
        assignments.iter().any(|a| {
            a.assignee == assignee && self.accepted_role_aliases.iter().any(|r| *r == a.role_alias)
        })
    }
}

/// Messages per sub-check. A sub-check with no entry passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFindings {
    findings: BTreeMap<IdentityCheck, Vec<String>>,
    dataset: Option<String>,
}

impl IdentityFindings {
    fn add(&mut self, check: IdentityCheck, message: String) {
        self.findings.entry(check).or_default().push(message);
    }

    pub fn messages(&self, check: IdentityCheck) -> &[String] {
        self.findings.get(&check).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Persistent id the package was matched to, if any
    pub fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Run all identity sub-checks against the catalog
pub async fn organizational_identifier_consistent(
    catalog: &dyn CatalogClient,
    claim: &IdentityClaim,
    settings: &IdentitySettings,
) -> CatalogResult<IdentityFindings> {
    let mut findings = IdentityFindings::default();

    let mut by_identifier = None;
    if let Some(identifier) = &claim.organizational_identifier {
        let hits = catalog.search_by_identifier(identifier).await?;
        debug!(identifier, hits = hits.len(), "organizational identifier search");
        match hits.as_slice() {
            [hit] => by_identifier = Some(hit.persistent_id.clone()),
            [] => findings.add(
                IdentityCheck::OrganizationalIdentifierMatchesOneDataset,
                format!(
                    "No dataset found with organizational identifier '{}'",
                    identifier
                ),
            ),
            many => findings.add(
                IdentityCheck::OrganizationalIdentifierMatchesOneDataset,
                format!(
                    "Organizational identifier '{}' matches {} datasets",
                    identifier,
                    many.len()
                ),
            ),
        }
    }

    let mut by_token = Vec::new();
    if let Some(token) = &claim.sword_token {
        by_token = catalog.search_by_sword_token(token).await?;
        debug!(token, hits = by_token.len(), "SWORD token search");
        if by_token.is_empty() {
            findings.add(
                IdentityCheck::SwordTokenResolvesToVersion,
                format!("No dataset version found for SWORD token '{}'", token),
            );
            findings.add(
                IdentityCheck::SwordTokenLinkedToDataset,
                format!("SWORD token '{}' is not linked to any dataset", token),
            );
        } else if let Some(pid) = &by_identifier
            && !by_token.iter().any(|hit| hit.persistent_id == *pid)
        {
            findings.add(
                IdentityCheck::SwordTokenLinkedToDataset,
                format!("SWORD token '{}' is not linked to dataset {}", token, pid),
            );
        }
    }

    let dataset = by_identifier.or_else(|| match by_token.as_slice() {
        [hit] => Some(hit.persistent_id.clone()),
        _ => None,
    });

    if let (Some(identifier), Some(pid)) = (&claim.organizational_identifier, &dataset) {
        let record = catalog.get_dataset_latest_version(pid).await?;
        let expected = match claim
            .owner_account
            .as_deref()
            .and_then(|account| settings.prefix_for(account))
        {
            Some(prefix) => format!("{}{}", prefix, identifier),
            None => identifier.clone(),
        };

        match record.other_id.as_deref() {
            Some(stored) if stored == expected => {}
            Some(stored) => findings.add(
                IdentityCheck::OtherIdMatchesPrefixedIdentifier,
                format!(
                    "Other identifier '{}' of dataset {} does not match '{}'",
                    stored, pid, expected
                ),
            ),
            None => findings.add(
                IdentityCheck::OtherIdMatchesPrefixedIdentifier,
                format!(
                    "Dataset {} has no other identifier; expected '{}'",
                    pid, expected
                ),
            ),
        }
    }

    if let Some(account) = &claim.owner_account {
        let collection = catalog
            .get_collection_role_assignments(&settings.collection_alias)
            .await?;
        if !settings.holds_accepted_role(&collection, account) {
            findings.add(
                IdentityCheck::DepositorRoleOnCollection,
                format!(
                    "User '{}' has none of the roles [{}] on collection '{}'",
                    account,
                    settings.accepted_role_aliases.join(", "),
                    settings.collection_alias
                ),
            );
        }

        if let Some(pid) = &dataset {
            let assignments = catalog.get_dataset_role_assignments(pid).await?;
            if !settings.holds_accepted_role(&assignments, account) {
                findings.add(
                    IdentityCheck::DepositorRoleOnDataset,
                    format!(
                        "User '{}' has none of the roles [{}] on dataset {}",
                        account,
                        settings.accepted_role_aliases.join(", "),
                        pid
                    ),
                );
            }
        }
    }

    findings.dataset = dataset;
    Ok(findings)
}

async fn reconcile(ctx: &Context, catalog: &dyn CatalogClient) -> Result<Arc<IdentityFindings>, String> {
    let info = BagInfo::read(ctx.root())
        .await
        .map_err(|e| format!("bag-info.txt could not be read: {}", e))?;
    let claim = IdentityClaim::from_bag_info(&info);

    organizational_identifier_consistent(catalog, &claim, ctx.identity_settings())
        .await
        .map(Arc::new)
        .map_err(|e| e.to_string())
}

/// Outcome of one identity sub-check, computing the shared findings on first use
pub async fn evaluate(ctx: &Context, check: IdentityCheck) -> Outcome {
    let Some(catalog) = ctx.catalog() else {
        return Outcome::Fatal("No catalog configured for identity reconciliation".to_string());
    };

    let findings = ctx
        .identity_findings()
        .get_or_init(|| reconcile(ctx, catalog.as_ref()))
        .await;

    match findings {
        Ok(findings) => Outcome::from_messages(findings.messages(check).to_vec()),
        Err(diagnostic) => Outcome::Fatal(diagnostic.clone()),
    }
}
