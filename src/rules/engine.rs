use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::Context;
use crate::report::ValidationReport;
use crate::rules::{Outcome, RuleCatalog, RuleId};

/// Runs a fixed rule catalog against one context at a time
#[derive(Debug, Clone)]
pub struct RuleEngine {
    catalog: Arc<RuleCatalog>,
}

impl RuleEngine {
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub async fn run(&self, ctx: &Context) -> ValidationReport {
        run(&self.catalog, ctx).await
    }
}

/// Evaluate every rule in catalog order.
///
/// A rule whose dependencies did not all succeed is recorded as skipped without being
/// evaluated. The first `Fatal` outcome ends the run; the report then holds only the outcomes
/// computed so far, the fatal one last.
pub async fn run(catalog: &RuleCatalog, ctx: &Context) -> ValidationReport {
    info!(package = %ctx.root().display(), rules = catalog.len(), "validation run started");

    let mut report = ValidationReport::default();
    let mut outcomes: HashMap<&RuleId, Outcome> = HashMap::with_capacity(catalog.len());

    for rule in catalog.rules() {
        let unmet = rule
            .dependencies()
            .iter()
            .find(|dependency| !outcomes.get(dependency).is_some_and(Outcome::is_success));

        let outcome = match unmet {
            Some(dependency) => {
                warn!(rule = %rule.id(), dependency = %dependency, "rule skipped");
                Outcome::Skipped(dependency.clone())
            }
            None => rule.check().evaluate(ctx).await,
        };
        debug!(rule = %rule.id(), outcome = outcome.kind(), "rule evaluated");

        report.push(rule.id().clone(), outcome.clone());
        if let Outcome::Fatal(diagnostic) = &outcome {
            warn!(rule = %rule.id(), %diagnostic, "validation run aborted");
            return report;
        }
        outcomes.insert(rule.id(), outcome);
    }

    info!(
        package = %ctx.root().display(),
        compliant = report.is_compliant(),
        "validation run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Check, Rule};
    use crate::schema_loader::SchemaRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn id(s: &str) -> RuleId {
        RuleId::parse(s).unwrap()
    }

    fn context(dir: &TempDir) -> Context {
        Context::new(dir.path(), Arc::new(SchemaRegistry::new()))
    }

    fn counting(outcome: Outcome, calls: &Arc<AtomicUsize>) -> Check {
        let calls = Arc::clone(calls);
        Check::custom(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            outcome.clone()
        })
    }

    #[tokio::test]
    async fn test_every_rule_reported_once_in_order() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let catalog = RuleCatalog::new(vec![
            Rule::new(id("2.1"), counting(Outcome::Success, &calls)),
            Rule::new(id("1.1"), counting(Outcome::violation("bad"), &calls)),
            Rule::new(id("1.2"), counting(Outcome::Success, &calls)).depends_on(id("2.1")),
        ])
        .unwrap();

        let report = run(&catalog, &context(&dir)).await;
        let ids: Vec<_> = report.results().iter().map(|r| r.rule.as_str()).collect();

        assert_eq!(ids, vec!["1.1", "2.1", "1.2"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!report.is_compliant());
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_without_invoking() {
        let dir = TempDir::new().unwrap();
        let dependent_calls = Arc::new(AtomicUsize::new(0));
        let other_calls = Arc::new(AtomicUsize::new(0));
        let catalog = RuleCatalog::new(vec![
            Rule::new(id("2.1"), counting(Outcome::violation("missing"), &other_calls)),
            Rule::new(id("2.2"), counting(Outcome::Success, &other_calls)),
            Rule::new(id("3.1"), counting(Outcome::Success, &dependent_calls))
                .depends_on(id("2.2"))
                .depends_on(id("2.1")),
            Rule::new(id("3.2"), counting(Outcome::Success, &dependent_calls))
                .depends_on(id("3.1")),
        ])
        .unwrap();

        let report = run(&catalog, &context(&dir)).await;

        assert_eq!(dependent_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.outcome("3.1"), Some(&Outcome::Skipped(id("2.1"))));
        assert_eq!(report.outcome("3.2"), Some(&Outcome::Skipped(id("3.1"))));
        assert_eq!(report.results().len(), 4);
    }

    #[tokio::test]
    async fn test_fatal_aborts_remaining_rules() {
        let dir = TempDir::new().unwrap();
        let later_calls = Arc::new(AtomicUsize::new(0));
        let catalog = RuleCatalog::new(vec![
            Rule::new(id("1.1"), Check::custom(|_| Outcome::violation("first"))),
            Rule::new(id("1.2"), Check::custom(|_| Outcome::Fatal("parse failed".into()))),
            Rule::new(id("1.3"), counting(Outcome::Success, &later_calls)),
        ])
        .unwrap();

        let report = run(&catalog, &context(&dir)).await;

        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.results().len(), 2);
        let fatal = report.fatal().unwrap();
        assert_eq!(fatal.rule.as_str(), "1.2");
        assert_eq!(report.outcome("1.1"), Some(&Outcome::violation("first")));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(
            RuleCatalog::new(vec![
                Rule::new(id("4.4(b)"), Check::custom(|_| Outcome::violation("b"))),
                Rule::new(id("4.4(a)"), Check::custom(|_| Outcome::Success)),
                Rule::new(id("4.10"), Check::custom(|_| Outcome::Success))
                    .depends_on(id("4.4(b)")),
            ])
            .unwrap(),
        );
        let engine = RuleEngine::new(catalog);

        let first = engine.run(&context(&dir)).await;
        let second = engine.run(&context(&dir)).await;

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
