mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use validate_bag::error::RuleCatalogError;
use validate_bag::{
    Check, Outcome, Rule, RuleCatalog, RuleEngine, RuleId, ValidationLevel, default_catalog,
    rules,
};

fn id(s: &str) -> RuleId {
    RuleId::parse(s).unwrap()
}

fn counting(counter: &Arc<AtomicUsize>, outcome: Outcome) -> Check {
    let counter = Arc::clone(counter);
    Check::custom(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        outcome.clone()
    })
}

#[tokio::test]
async fn test_one_outcome_per_rule_in_execution_order() -> anyhow::Result<()> {
    let bag = BagBuilder::new().build();
    let catalog = default_catalog(ValidationLevel::StandAlone)?;

    let report = rules::run(&catalog, &bag.context()).await;

    let reported: Vec<&str> = report.results().iter().map(|r| r.rule.as_str()).collect();
    let registered: Vec<&str> = catalog.rules().iter().map(|r| r.id().as_str()).collect();
    assert_eq!(reported, registered);

    let unique: BTreeSet<&str> = reported.iter().copied().collect();
    assert_eq!(unique.len(), reported.len());
    assert!(report.is_compliant(), "{:?}", report);
    Ok(())
}

#[tokio::test]
async fn test_dependent_of_failed_rule_is_skipped_and_never_invoked() -> anyhow::Result<()> {
    let bag = BagBuilder::new().build();
    let invoked = Arc::new(AtomicUsize::new(0));

    let catalog = RuleCatalog::new([
        Rule::new(id("1"), Check::custom(|_| Outcome::violation("no"))),
        Rule::new(id("2"), counting(&invoked, Outcome::Success)).depends_on(id("1")),
        Rule::new(id("3"), counting(&invoked, Outcome::Success)).depends_on(id("2")),
    ])?;

    let report = RuleEngine::new(Arc::new(catalog)).run(&bag.context()).await;

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(report.outcome("2"), Some(&Outcome::Skipped(id("1"))));
    // Skips cascade through the first unmet dependency
    assert_eq!(report.outcome("3"), Some(&Outcome::Skipped(id("2"))));
    Ok(())
}

#[tokio::test]
async fn test_missing_dataset_skips_its_dependents() {
    let bag = BagBuilder::new().without_dataset_xml().build();
    let catalog = default_catalog(ValidationLevel::StandAlone).unwrap();

    let report = rules::run(&catalog, &bag.context()).await;

    assert_eq!(
        report.outcome("2.1"),
        Some(&Outcome::violation("metadata/dataset.xml does not exist"))
    );
    assert_eq!(report.outcome("3.1.1"), Some(&Outcome::Skipped(id("2.1"))));
    assert_eq!(report.outcome("3.1.7"), Some(&Outcome::Skipped(id("2.1"))));
    assert_eq!(report.outcome("3.2.1"), Some(&Outcome::Success));
    assert_eq!(report.len(), catalog.len());
}

#[tokio::test]
async fn test_repeated_runs_are_identical() -> anyhow::Result<()> {
    let bag = BagBuilder::new()
        .dataset_xml(dataset_xml(&format!(
            "{}{}",
            point("1.0"),
            envelope("-7001 289000", "300000 629000")
        )))
        .unlisted_payload("data/extra-file.txt", b"extra")
        .build();
    let catalog = default_catalog(ValidationLevel::StandAlone)?;

    let first = serde_json::to_string(&rules::run(&catalog, &bag.context()).await)?;
    let second = serde_json::to_string(&rules::run(&catalog, &bag.context()).await)?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_fatal_outcome_ends_the_run() {
    let bag = BagBuilder::new().build();
    let after = Arc::new(AtomicUsize::new(0));

    let catalog = RuleCatalog::new([
        Rule::new(id("1.1"), Check::custom(|_| Outcome::Success)),
        Rule::new(id("1.2"), Check::custom(|_| Outcome::Fatal("gone".to_string()))),
        Rule::new(id("1.3"), counting(&after, Outcome::Success)),
        Rule::new(id("2"), counting(&after, Outcome::Success)),
    ])
    .unwrap();

    let report = rules::run(&catalog, &bag.context()).await;

    assert_eq!(after.load(Ordering::SeqCst), 0);
    assert_eq!(report.len(), 2);
    assert_eq!(report.fatal().map(|r| r.rule.as_str()), Some("1.2"));
    assert!(!report.is_compliant());
}

#[test]
fn test_malformed_catalogs_are_rejected_at_construction() {
    let cycle = RuleCatalog::new([
        Rule::new(id("1"), Check::custom(|_| Outcome::Success)),
        Rule::new(id("2"), Check::custom(|_| Outcome::Success)).depends_on(id("3")),
        Rule::new(id("3"), Check::custom(|_| Outcome::Success)).depends_on(id("2")),
    ]);
    assert_eq!(
        cycle.unwrap_err(),
        RuleCatalogError::Cycle {
            members: vec!["2".to_string(), "3".to_string()]
        }
    );

    let unknown = RuleCatalog::new([
        Rule::new(id("1"), Check::custom(|_| Outcome::Success)).depends_on(id("9")),
    ]);
    assert!(matches!(
        unknown,
        Err(RuleCatalogError::UnknownDependency { .. })
    ));

    let duplicate = RuleCatalog::new([
        Rule::new(id("1"), Check::custom(|_| Outcome::Success)),
        Rule::new(id("1"), Check::custom(|_| Outcome::Success)),
    ]);
    assert!(matches!(duplicate, Err(RuleCatalogError::DuplicateId { .. })));
}

#[test]
fn test_order_follows_dependencies_before_ids() {
    let catalog = RuleCatalog::new([
        Rule::new(id("1"), Check::custom(|_| Outcome::Success)).depends_on(id("3")),
        Rule::new(id("2"), Check::custom(|_| Outcome::Success)),
        Rule::new(id("3"), Check::custom(|_| Outcome::Success)),
    ])
    .unwrap();

    let order: Vec<&str> = catalog.rules().iter().map(|r| r.id().as_str()).collect();
    assert_eq!(order, vec!["2", "3", "1"]);
}
