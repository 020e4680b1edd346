use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use validate_bag::catalog::{CatalogClient, CatalogRecord, RoleAssignment, SearchHit};
use validate_bag::error::{CatalogError, CatalogResult};

pub const DATASET_PID: &str = "doi:10.5072/FK2/QZZSST";
pub const ORGANIZATIONAL_ID: &str = "REPO1:1234";
pub const SWORD_TOKEN: &str = "urn:uuid:34632f71-11f8-48d8-9bf3-79551ad22b5e";
pub const ACCOUNT: &str = "user001";
pub const OTHER_ID_PREFIX: &str = "u1:";

/// In-memory catalog answering every lookup from fixed data
pub struct StubCatalog {
    pub identifier_hits: Vec<String>,
    pub token_hits: Vec<String>,
    pub other_id: Option<String>,
    pub collection_roles: BTreeSet<RoleAssignment>,
    pub dataset_roles: BTreeSet<RoleAssignment>,
    pub unreachable: bool,
    pub requests: Mutex<Vec<String>>,
}

impl StubCatalog {
    /// Catalog state matching a package built with the constants above
    pub fn consistent() -> Self {
        let assignee = format!("@{}", ACCOUNT);
        Self {
            identifier_hits: vec![DATASET_PID.to_string()],
            token_hits: vec![DATASET_PID.to_string()],
            other_id: Some(format!("{}{}", OTHER_ID_PREFIX, ORGANIZATIONAL_ID)),
            collection_roles: [RoleAssignment::new(assignee.clone(), "datasetcreator")]
                .into_iter()
                .collect(),
            dataset_roles: [RoleAssignment::new(assignee, "dataseteditor")]
                .into_iter()
                .collect(),
            unreachable: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::consistent()
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn request(&self, what: String) -> CatalogResult<()> {
        self.requests.lock().unwrap().push(what);
        if self.unreachable {
            return Err(CatalogError::Transport {
                url: "http://catalog.invalid/api".to_string(),
                details: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn hits(pids: &[String]) -> Vec<SearchHit> {
        pids.iter()
            .map(|pid| SearchHit {
                persistent_id: pid.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl CatalogClient for StubCatalog {
    async fn search_by_identifier(&self, identifier: &str) -> CatalogResult<Vec<SearchHit>> {
        self.request(format!("search dansOtherId {}", identifier))?;
        Ok(Self::hits(&self.identifier_hits))
    }

    async fn search_by_sword_token(&self, token: &str) -> CatalogResult<Vec<SearchHit>> {
        self.request(format!("search dansSwordToken {}", token))?;
        Ok(Self::hits(&self.token_hits))
    }

    async fn get_dataset_latest_version(&self, persistent_id: &str) -> CatalogResult<CatalogRecord> {
        self.request(format!("latest version {}", persistent_id))?;
        Ok(CatalogRecord {
            persistent_id: persistent_id.to_string(),
            other_id: self.other_id.clone(),
            role_assignments: self.dataset_roles.clone(),
        })
    }

    async fn get_collection_role_assignments(
        &self,
        collection: &str,
    ) -> CatalogResult<BTreeSet<RoleAssignment>> {
        self.request(format!("collection roles {}", collection))?;
        Ok(self.collection_roles.clone())
    }

    async fn get_dataset_role_assignments(
        &self,
        persistent_id: &str,
    ) -> CatalogResult<BTreeSet<RoleAssignment>> {
        self.request(format!("dataset roles {}", persistent_id))?;
        Ok(self.dataset_roles.clone())
    }
}
