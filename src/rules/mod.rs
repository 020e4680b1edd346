//! Rule model and catalog.
//!
//! A [`Rule`] pairs a numbered id with one [`Check`] and the ids it depends on. Rules never call
//! each other; the [`RuleCatalog`] owns the dependency graph, rejects malformed catalogs at
//! construction and fixes the execution order once.

pub mod defaults;
pub mod engine;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::context::Context;
use crate::error::RuleCatalogError;
use crate::validators::identity::IdentityCheck;
use crate::validators::{geo, identity, manifest, xml};

pub use engine::{RuleEngine, run};

/// Dotted rule number such as `3.1.7` or `4.4(a)`.
///
/// Ordered segment by segment: leading digits numerically, then the remaining suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn parse(id: &str) -> Result<Self, RuleCatalogError> {
        let invalid = |reason: &str| RuleCatalogError::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("empty id"));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }
        if id.split('.').any(str::is_empty) {
            return Err(invalid("empty segment"));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn sort_key(&self) -> Vec<(bool, u64, &str)> {
        self.0
            .split('.')
            .map(|segment| {
                let digits_end = segment
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(segment.len());
                let (digits, suffix) = segment.split_at(digits_end);
                // Non-numeric segments sort after numeric ones
                (digits.is_empty(), digits.parse().unwrap_or(u64::MAX), suffix)
            })
            .collect()
    }
}

impl Ord for RuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for RuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of evaluating one rule in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Violation(Vec<String>),
    /// Not evaluated because the named dependency did not succeed
    Skipped(RuleId),
    /// The run cannot continue; carries the diagnostic
    Fatal(String),
}

impl Outcome {
    /// `Success` for no messages, `Violation` otherwise
    pub fn from_messages(messages: Vec<String>) -> Self {
        if messages.is_empty() {
            Outcome::Success
        } else {
            Outcome::Violation(messages)
        }
    }

    pub fn violation(message: impl Into<String>) -> Self {
        Outcome::Violation(vec![message.into()])
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Violation(_) => "violation",
            Outcome::Skipped(_) => "skipped",
            Outcome::Fatal(_) => "fatal",
        }
    }
}

pub type CustomCheck = Arc<dyn Fn(&Context) -> Outcome + Send + Sync>;

/// What a rule evaluates. Closed set of validator families plus an escape hatch.
#[derive(Clone)]
pub enum Check {
    ManifestsCoverPayload,
    ManifestChecksumsMatch,
    FileExists(PathBuf),
    ConformsToSchema { path: PathBuf, schema_key: String },
    PointsHaveAtLeastTwoValues { path: PathBuf },
    Identity(IdentityCheck),
    Custom(CustomCheck),
}

impl Check {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Outcome + Send + Sync + 'static,
    {
        Check::Custom(Arc::new(f))
    }

    pub async fn evaluate(&self, ctx: &Context) -> Outcome {
        match self {
            Check::ManifestsCoverPayload => manifest::manifests_cover_payload(ctx.root()).await,
            Check::ManifestChecksumsMatch => manifest::manifest_checksums_match(ctx.root()).await,
            Check::FileExists(path) => manifest::file_exists(ctx.root(), path).await,
            Check::ConformsToSchema { path, schema_key } => {
                xml::conforms_to_schema(ctx, path, schema_key).await
            }
            Check::PointsHaveAtLeastTwoValues { path } => {
                geo::points_have_at_least_two_values(ctx, path).await
            }
            Check::Identity(check) => identity::evaluate(ctx, *check).await,
            Check::Custom(f) => (**f)(ctx),
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::ManifestsCoverPayload => f.write_str("ManifestsCoverPayload"),
            Check::ManifestChecksumsMatch => f.write_str("ManifestChecksumsMatch"),
            Check::FileExists(path) => f.debug_tuple("FileExists").field(path).finish(),
            Check::ConformsToSchema { path, schema_key } => f
                .debug_struct("ConformsToSchema")
                .field("path", path)
                .field("schema_key", schema_key)
                .finish(),
            Check::PointsHaveAtLeastTwoValues { path } => f
                .debug_struct("PointsHaveAtLeastTwoValues")
                .field("path", path)
                .finish(),
            Check::Identity(check) => f.debug_tuple("Identity").field(check).finish(),
            Check::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    id: RuleId,
    depends_on: BTreeSet<RuleId>,
    check: Check,
}

impl Rule {
    pub fn new(id: RuleId, check: Check) -> Self {
        Self {
            id,
            depends_on: BTreeSet::new(),
            check,
        }
    }

    pub fn depends_on(mut self, dependency: RuleId) -> Self {
        self.depends_on.insert(dependency);
        self
    }

    pub fn id(&self) -> &RuleId {
        &self.id
    }

    pub fn dependencies(&self) -> &BTreeSet<RuleId> {
        &self.depends_on
    }

    pub fn check(&self) -> &Check {
        &self.check
    }
}

/// Validated, immutable set of rules in execution order
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    ordered: Vec<Rule>,
}

impl RuleCatalog {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Result<Self, RuleCatalogError> {
        let mut by_id: BTreeMap<RuleId, Rule> = BTreeMap::new();
        for rule in rules {
            if by_id.contains_key(&rule.id) {
                return Err(RuleCatalogError::DuplicateId {
                    id: rule.id.to_string(),
                });
            }
            by_id.insert(rule.id.clone(), rule);
        }

        for rule in by_id.values() {
            if let Some(missing) = rule.depends_on.iter().find(|d| !by_id.contains_key(*d)) {
                return Err(RuleCatalogError::UnknownDependency {
                    rule: rule.id.to_string(),
                    dependency: missing.to_string(),
                });
            }
        }

        check_acyclic(&by_id)?;
        let order = execution_order(&by_id);

        let ordered = order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect();
        Ok(Self { ordered })
    }

    /// Rules in the order the engine runs them
    pub fn rules(&self) -> &[Rule] {
        &self.ordered
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.ordered.iter().find(|r| r.id.as_str() == id)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

fn check_acyclic(rules: &BTreeMap<RuleId, Rule>) -> Result<(), RuleCatalogError> {
    let mut graph: DiGraph<&RuleId, ()> = DiGraph::new();
    let nodes: BTreeMap<&RuleId, NodeIndex> =
        rules.keys().map(|id| (id, graph.add_node(id))).collect();

    for rule in rules.values() {
        for dependency in &rule.depends_on {
            graph.add_edge(nodes[dependency], nodes[&rule.id], ());
        }
    }

    if toposort(&graph, None).is_ok() {
        return Ok(());
    }

    let cyclic = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .min_by(|a, b| {
            let first = |scc: &Vec<NodeIndex>| scc.iter().map(|n| graph[*n]).min().cloned();
            first(a).cmp(&first(b))
        })
        .unwrap_or_default();

    let mut members: Vec<&RuleId> = cyclic.iter().map(|n| graph[*n]).collect();
    members.sort();

    Err(RuleCatalogError::Cycle {
        members: members.into_iter().map(RuleId::to_string).collect(),
    })
}

/// Kahn's algorithm with the lowest ready id first
fn execution_order(rules: &BTreeMap<RuleId, Rule>) -> Vec<RuleId> {
    let mut pending: BTreeMap<&RuleId, usize> = rules
        .values()
        .map(|r| (&r.id, r.depends_on.len()))
        .collect();
    let mut dependents: BTreeMap<&RuleId, Vec<&RuleId>> = BTreeMap::new();
    for rule in rules.values() {
        for dependency in &rule.depends_on {
            dependents.entry(dependency).or_default().push(&rule.id);
        }
    }

    let mut ready: BTreeSet<&RuleId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(rules.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.clone());
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    order
}
