use std::path::Path;
use std::sync::Arc;

use crate::context::Context;
use crate::libxml2::{SchemaIssue, ValidationResult};
use crate::package::to_bag_path;
use crate::rules::Outcome;

/// `<filename> - line: L; column: C msg: M.`
fn render(file_name: &str, line: i64, column: i64, message: &str) -> String {
    let message = message.trim().trim_end_matches('.');
    format!(
        "{} - line: {}; column: {} msg: {}.",
        file_name, line, column, message
    )
}

fn render_issues(file_name: &str, issues: &[SchemaIssue]) -> Vec<String> {
    let mut ordered: Vec<&SchemaIssue> = issues.iter().collect();
    ordered.sort_by_key(|issue| (issue.line, issue.column));
    ordered
        .into_iter()
        .map(|issue| {
            render(
                file_name,
                i64::from(issue.line),
                i64::from(issue.column),
                &issue.message,
            )
        })
        .collect()
}

/// Well-formedness and schema conformance of `path`.
///
/// A parse failure is an ordinary violation for this rule: the diagnostic becomes its single
/// message.
pub async fn conforms_to_schema(ctx: &Context, path: &Path, schema_key: &str) -> Outcome {
    let document = match ctx.documents().get(path).await {
        Ok(document) => document,
        Err(e) => {
            return Outcome::Fatal(format!("{} could not be read: {}", to_bag_path(path), e));
        }
    };

    if let Some(diagnostic) = document.diagnostic() {
        return Outcome::violation(render(
            &document.file_name(),
            i64::from(diagnostic.line),
            i64::from(diagnostic.column),
            &diagnostic.message,
        ));
    }

    let schemas = Arc::clone(ctx.schemas());
    let key = schema_key.to_string();
    let full_path = ctx.root().join(path);
    let result =
        tokio::task::spawn_blocking(move || schemas.validate(&key, &full_path)).await;

    match result {
        Ok(Ok(ValidationResult::Valid)) => Outcome::Success,
        Ok(Ok(ValidationResult::Invalid { issues })) => {
            Outcome::from_messages(render_issues(&document.file_name(), &issues))
        }
        Ok(Err(e)) => Outcome::Fatal(e.to_string()),
        Err(e) => Outcome::Fatal(format!("schema validation task failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libxml2::LibXml2Wrapper;
    use crate::schema_loader::SchemaRegistry;
    use std::fs;
    use tempfile::TempDir;

    const FILES_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="files">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="file" minOccurs="0" maxOccurs="unbounded">
                    <xs:complexType>
                        <xs:attribute name="filepath" type="xs:string" use="required"/>
                    </xs:complexType>
                </xs:element>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

    fn context_with(files_xml: &str) -> (TempDir, Context) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("metadata")).unwrap();
        fs::write(dir.path().join("metadata/files.xml"), files_xml).unwrap();

        let schema = LibXml2Wrapper::new()
            .parse_schema_from_memory(FILES_XSD.as_bytes())
            .unwrap();
        let mut registry = SchemaRegistry::new();
        registry.insert("files.xml", schema);

        let ctx = Context::new(dir.path(), Arc::new(registry));
        (dir, ctx)
    }

    #[test]
    fn test_render_single_trailing_period() {
        assert_eq!(
            render("files.xml", 9, 7, "Element 'x': not expected.\n"),
            "files.xml - line: 9; column: 7 msg: Element 'x': not expected."
        );
    }

    #[tokio::test]
    async fn test_valid_document() {
        let (_dir, ctx) = context_with(r#"<files><file filepath="data/a.txt"/></files>"#);
        let outcome = conforms_to_schema(&ctx, Path::new("metadata/files.xml"), "files.xml").await;
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_schema_violation_messages() {
        let (_dir, ctx) = context_with("<files>\n  <file/>\n  <other/>\n</files>\n");
        match conforms_to_schema(&ctx, Path::new("metadata/files.xml"), "files.xml").await {
            Outcome::Violation(messages) => {
                assert!(!messages.is_empty());
                assert!(messages[0].starts_with("files.xml - line: 2;"));
                assert!(messages.iter().all(|m| m.ends_with('.') && !m.ends_with("..")));
            }
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_document_is_a_violation() {
        let (_dir, ctx) = context_with("<files>\n  <file filepath=\"a\">\n</files>\n");
        match conforms_to_schema(&ctx, Path::new("metadata/files.xml"), "files.xml").await {
            Outcome::Violation(messages) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].starts_with("files.xml - line: 3; column: "));
                assert!(messages[0].contains("must be terminated by the matching end-tag"));
            }
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_schema_key_is_fatal() {
        let (_dir, ctx) = context_with("<files/>");
        let outcome =
            conforms_to_schema(&ctx, Path::new("metadata/files.xml"), "dataset.xml").await;
        assert!(matches!(outcome, Outcome::Fatal(_)));
    }
}
