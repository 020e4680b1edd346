//! Per-run cache of parsed XML documents.
//!
//! A document is read and parsed at most once per validation run and the result, tree or
//! diagnostic, is shared by every rule that asks for the same relative path. The parsed form
//! is an owned element tree so it can outlive the source text and be shared via `Arc`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use encoding_rs::{Encoding, UTF_8};
use tokio::sync::OnceCell;
use tracing::debug;

/// Terminal parse failure with the position the parser stopped at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line: {}; column: {} msg: {}.",
            self.line, self.column, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

/// Owned element node. `text` is the concatenation of the element's direct text children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub text: String,
    pub children: Vec<XmlElement>,
    pub line: u32,
}

impl XmlElement {
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Attribute value by local name, ignoring namespace
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn child(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, name))
    }

    /// This element and all elements below it, in document order
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Cache entry for one path: the tree or the reason there is none
#[derive(Debug)]
pub struct ParsedDocument {
    path: PathBuf,
    content: Result<XmlElement, ParseDiagnostic>,
}

impl ParsedDocument {
    pub fn parse(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        let content = decode(bytes).and_then(|text| parse_tree(&text));

        Self {
            path: path.into(),
            content,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn root(&self) -> Result<&XmlElement, &ParseDiagnostic> {
        self.content.as_ref()
    }

    pub fn diagnostic(&self) -> Option<&ParseDiagnostic> {
        self.content.as_ref().err()
    }

    /// Diagnostic rendered as `<filename> - line: L; column: C msg: M.`
    pub fn describe_diagnostic(&self) -> Option<String> {
        self.diagnostic()
            .map(|d| format!("{} - {}", self.file_name(), d))
    }
}

fn parse_tree(text: &str) -> Result<XmlElement, ParseDiagnostic> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let document =
        roxmltree::Document::parse_with_options(text, options).map_err(|e| diagnostic_for(&e))?;
    Ok(build_element(&document, document.root_element()))
}

fn build_element(document: &roxmltree::Document<'_>, node: roxmltree::Node<'_, '_>) -> XmlElement {
    let mut text = String::new();
    let mut children = Vec::new();

    for child in node.children() {
        if child.is_element() {
            children.push(build_element(document, child));
        } else if child.is_text()
            && let Some(t) = child.text()
        {
            text.push_str(t);
        }
    }

    XmlElement {
        namespace: node.tag_name().namespace().map(str::to_string),
        name: node.tag_name().name().to_string(),
        attributes: node
            .attributes()
            .map(|a| XmlAttribute {
                namespace: a.namespace().map(str::to_string),
                name: a.name().to_string(),
                value: a.value().to_string(),
            })
            .collect(),
        text,
        children,
        line: document.text_pos_at(node.range().start).row,
    }
}

/// Parser errors phrased the way archive depositors are used to reading them
fn diagnostic_for(error: &roxmltree::Error) -> ParseDiagnostic {
    let message = match error {
        roxmltree::Error::UnexpectedCloseTag(expected, _, _) => format!(
            "The element type \"{expected}\" must be terminated by the matching end-tag \"</{expected}>\""
        ),
        roxmltree::Error::UnclosedRootNode | roxmltree::Error::UnexpectedEndOfStream => {
            "XML document structures must start and end within the same entity".to_string()
        }
        roxmltree::Error::NoRootNode => "Premature end of file".to_string(),
        roxmltree::Error::DuplicatedAttribute(name, _) => {
            format!("Attribute \"{name}\" was already specified for element")
        }
        roxmltree::Error::UnknownNamespace(prefix, _) => {
            format!("The prefix \"{prefix}\" for element is not bound")
        }
        other => strip_position(&other.to_string()),
    };
    let pos = error.pos();
    let column = match error {
        // Reported where the expected name stops matching, after `</`
        roxmltree::Error::UnexpectedCloseTag(expected, actual, _) => {
            let matched = if actual.starts_with(expected.as_str()) {
                expected.chars().count() as u32
            } else {
                0
            };
            pos.col + 2 + matched
        }
        _ => pos.col,
    };

    ParseDiagnostic {
        message,
        line: pos.row,
        column,
    }
}

fn strip_position(message: &str) -> String {
    match message.rfind(" at ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// Document text decoded per its byte order mark, else its declared `encoding`, else UTF-8
fn decode(bytes: &[u8]) -> Result<Cow<'_, str>, ParseDiagnostic> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_length)) => (encoding, &bytes[bom_length..]),
        None => (declared_encoding(bytes)?, bytes),
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| malformed(body, encoding))
}

/// Encoding named by an ASCII-compatible XML declaration
fn declared_encoding(bytes: &[u8]) -> Result<&'static Encoding, ParseDiagnostic> {
    let Some(rest) = bytes.strip_prefix(b"<?xml") else {
        return Ok(UTF_8);
    };
    let Some(end) = rest.windows(2).position(|w| w == b"?>") else {
        return Ok(UTF_8);
    };
    let declaration = String::from_utf8_lossy(&rest[..end]);
    let Some(label) = pseudo_attribute(&declaration, "encoding") else {
        return Ok(UTF_8);
    };

    // A declaration readable as ASCII is not UTF-16 whatever it says
    Encoding::for_label(label.trim().as_bytes())
        .map(Encoding::output_encoding)
        .ok_or_else(|| ParseDiagnostic {
            message: format!("Invalid encoding name \"{}\"", label),
            line: 1,
            column: end as u32 + 8,
        })
}

fn pseudo_attribute<'a>(declaration: &'a str, name: &str) -> Option<&'a str> {
    let start = declaration.find(name)? + name.len();
    let value = declaration[start..]
        .trim_start()
        .strip_prefix('=')?
        .trim_start();
    let quote = value.chars().next().filter(|c| matches!(*c, '"' | '\''))?;
    let value = &value[1..];
    value.find(quote).map(|end| &value[..end])
}

/// Position of the first byte sequence `encoding` cannot decode
fn malformed(body: &[u8], encoding: &'static Encoding) -> ParseDiagnostic {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(body.len())
        .unwrap_or(body.len().saturating_mul(3));
    let mut decoded = String::with_capacity(capacity);
    // Stops at the malformed sequence, leaving everything before it in `decoded`
    let _ = decoder.decode_to_string_without_replacement(body, &mut decoded, true);

    let line = decoded.matches('\n').count() as u32 + 1;
    let column = decoded
        .rsplit('\n')
        .next()
        .map_or(0, |current| current.chars().count()) as u32
        + 1;

    ParseDiagnostic {
        message: format!("Invalid byte sequence in {} document", encoding.name()),
        line,
        column,
    }
}

/// Run-scoped document cache rooted at the package directory
#[derive(Debug)]
pub struct DocumentCache {
    root: PathBuf,
    entries: Mutex<HashMap<PathBuf, Arc<OnceCell<Arc<ParsedDocument>>>>>,
}

impl DocumentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parsed form of `relative`, reading and parsing it on first request.
    ///
    /// I/O failures are returned as errors and are not cached; parse failures are cached as
    /// part of the [`ParsedDocument`].
    pub async fn get(&self, relative: &Path) -> std::io::Result<Arc<ParsedDocument>> {
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| std::io::Error::other("document cache lock poisoned"))?;
            Arc::clone(entries.entry(relative.to_path_buf()).or_default())
        };

        let document = cell
            .get_or_try_init(|| async {
                let full_path = self.root.join(relative);
                debug!(path = %relative.display(), "parsing document");
                let bytes = tokio::fs::read(&full_path).await?;
                Ok::<_, std::io::Error>(Arc::new(ParsedDocument::parse(relative, &bytes)))
            })
            .await?;

        Ok(Arc::clone(document))
    }

    /// Number of documents parsed so far in this run
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|c| c.initialized()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
