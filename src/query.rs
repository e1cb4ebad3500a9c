//! Extraction expressions evaluated against small XML documents.
//!
//! The language is deliberately tiny: `string(PATH)`, `concat(ARG, ...)`
//! with single-quoted literals, or a bare PATH. A PATH is a `/`-separated
//! element path (absolute when it starts with `/`, `*` matches any element)
//! optionally ending in `@attribute`. Element paths yield the text content of
//! the first matching element in document order.

use std::fmt;

use roxmltree::{Document, Node};

use crate::error::Error;

/// A compiled element/attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    /// Trailing `@name`, if the path selects an attribute.
    attribute: Option<String>,
    /// Whether evaluation starts at the document root.
    absolute: bool,
    /// Element names to descend through; `*` matches any element.
    steps: Vec<String>,
}

impl NodePath {
    /// Compile a path such as `/metadata/topic/@id` or `file/@name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExpression` for empty steps or illegal names.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let trimmed = text.trim();
        let invalid = |reason: &str| {
            return Error::InvalidExpression {
                expression: text.to_string(),
                reason: reason.to_string(),
            };
        };
        if trimmed.is_empty() {
            return Err(invalid("empty path"));
        }

        let absolute = trimmed.starts_with('/');
        let body = trimmed.trim_start_matches('/');
        let mut steps = Vec::new();
        let mut attribute = None;

        let parts: Vec<&str> = body.split('/').collect();
        let last = parts.len().saturating_sub(1);
        for (position, part) in parts.iter().enumerate() {
            let part = part.trim();
            if let Some(name) = part.strip_prefix('@') {
                if position != last || !is_name(name) {
                    return Err(invalid("attribute selector must be the final step"));
                }
                attribute = Some(name.to_string());
                continue;
            }
            if part != "*" && !is_name(part) {
                return Err(invalid("illegal element name"));
            }
            steps.push(part.to_string());
        }

        return Ok(Self { attribute, absolute, steps });
    }

    /// Evaluate against a whole document.
    pub fn eval_document(&self, doc: &Document<'_>) -> String {
        return self.eval(doc.root());
    }

    /// Evaluate relative to `context`; absolute paths restart at its document root.
    pub fn eval(&self, context: Node<'_, '_>) -> String {
        let start = if self.absolute { context.document().root() } else { context };
        let Some(node) = first_match(start, &self.steps) else {
            return String::new();
        };
        return match &self.attribute {
            Some(name) => node.attribute(name.as_str()).unwrap_or_default().to_string(),
            None => text_content(node),
        };
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        f.write_str(&self.steps.join("/"))?;
        if let Some(attribute) = &self.attribute {
            if !self.steps.is_empty() {
                f.write_str("/")?;
            }
            write!(f, "@{attribute}")?;
        }
        return Ok(());
    }
}

/// One `concat` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    /// Single-quoted literal text.
    Literal(String),
    /// Path evaluated at run time.
    Path(NodePath),
}

/// A compiled url/text extraction expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// Pieces concatenated in order; `string(P)` and `P` compile to one piece.
    args: Vec<Arg>,
    /// Source text, kept for diagnostics.
    source: String,
}

impl Expression {
    /// Compile an expression.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExpression` when the text is not `string(...)`,
    /// `concat(...)`, or a path.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let trimmed = text.trim();
        let args = if let Some(inner) = call_body(trimmed, "concat") {
            split_args(inner, text)?
                .into_iter()
                .map(|arg| return parse_arg(arg, text))
                .collect::<Result<Vec<_>, _>>()?
        } else if let Some(inner) = call_body(trimmed, "string") {
            vec![Arg::Path(NodePath::parse(inner)?)]
        } else {
            vec![Arg::Path(NodePath::parse(trimmed)?)]
        };
        return Ok(Self {
            args,
            source: text.to_string(),
        });
    }

    /// Evaluate against a parsed document.
    pub fn evaluate(&self, doc: &Document<'_>) -> String {
        let mut out = String::new();
        for arg in &self.args {
            match arg {
                Arg::Literal(text) => out.push_str(text),
                Arg::Path(path) => out.push_str(&path.eval_document(doc)),
            }
        }
        return out;
    }

    /// The expression as written.
    pub fn as_str(&self) -> &str {
        return &self.source;
    }
}

/// Default url rule for conceptual metadata: topic id plus `.htm`.
pub const DEFAULT_URL_EXPRESSION: &str = "concat(/metadata/topic/@id,'.htm')";

/// Default text rule for conceptual metadata: the topic title.
pub const DEFAULT_TEXT_EXPRESSION: &str = "string(/metadata/topic/title)";

/// Return the argument list of `name(...)`, if `text` is such a call.
fn call_body<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(name)?.trim_start();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    return Some(inner);
}

/// Split `concat` arguments on commas outside quotes.
fn split_args<'a>(inner: &'a str, source: &str) -> Result<Vec<&'a str>, Error> {
    let mut args = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            ',' if !in_quote => {
                args.push(inner.get(start..i).unwrap_or_default());
                start = i.saturating_add(1);
            },
            _ => {},
        }
    }
    if in_quote {
        return Err(Error::InvalidExpression {
            expression: source.to_string(),
            reason: "unterminated literal".to_string(),
        });
    }
    args.push(inner.get(start..).unwrap_or_default());
    return Ok(args);
}

/// Compile one `concat` argument.
fn parse_arg(arg: &str, source: &str) -> Result<Arg, Error> {
    let arg = arg.trim();
    if let Some(literal) = arg.strip_prefix('\'').and_then(|a| return a.strip_suffix('\'')) {
        return Ok(Arg::Literal(literal.to_string()));
    }
    if let Some(inner) = call_body(arg, "string") {
        return Ok(Arg::Path(NodePath::parse(inner)?));
    }
    if arg.is_empty() {
        return Err(Error::InvalidExpression {
            expression: source.to_string(),
            reason: "empty concat argument".to_string(),
        });
    }
    return Ok(Arg::Path(NodePath::parse(arg)?));
}

/// XML-ish name check: letters, digits, `_`, `-`, `.`, `:`; not starting with a digit.
fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    return (first.is_alphabetic() || first == '_')
        && chars.all(|c| return c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
}

/// Depth-first search for the first element chain matching `steps`.
fn first_match<'a, 'input>(node: Node<'a, 'input>, steps: &[String]) -> Option<Node<'a, 'input>> {
    let Some((step, rest)) = steps.split_first() else {
        return Some(node);
    };
    for child in node.children().filter(Node::is_element) {
        if step != "*" && child.tag_name().name() != step.as_str() {
            continue;
        }
        if let Some(found) = first_match(child, rest) {
            return Some(found);
        }
    }
    return None;
}

/// Concatenated descendant text of an element.
pub fn text_content(node: Node<'_, '_>) -> String {
    return node
        .descendants()
        .filter(Node::is_text)
        .filter_map(|n| return n.text())
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"<metadata><topic id="11111111-1111-1111-1111-111111111111"><title>Foo <b>Bar</b></title></topic></metadata>"#;

    #[test]
    fn default_expressions_extract_url_and_title() {
        let doc = Document::parse(METADATA).unwrap();
        let url = Expression::parse(DEFAULT_URL_EXPRESSION).unwrap();
        let text = Expression::parse(DEFAULT_TEXT_EXPRESSION).unwrap();
        assert_eq!(url.evaluate(&doc), "11111111-1111-1111-1111-111111111111.htm");
        assert_eq!(text.evaluate(&doc), "Foo Bar");
    }

    #[test]
    fn literals_may_contain_commas() {
        let doc = Document::parse(METADATA).unwrap();
        let expr = Expression::parse("concat('html/', /metadata/topic/@id, ',x')").unwrap();
        assert_eq!(expr.evaluate(&doc), "html/11111111-1111-1111-1111-111111111111,x");
    }

    #[test]
    fn missing_nodes_evaluate_to_empty() {
        let doc = Document::parse(METADATA).unwrap();
        let expr = Expression::parse("/metadata/nothing/@id").unwrap();
        assert_eq!(expr.evaluate(&doc), "");
    }

    #[test]
    fn relative_paths_start_at_context() {
        let doc = Document::parse(r#"<r><api><file name="a"/></api><api><file name="b"/></api></r>"#).unwrap();
        let path = NodePath::parse("file/@name").unwrap();
        let names: Vec<String> = doc
            .root_element()
            .children()
            .filter(Node::is_element)
            .map(|api| return path.eval(api))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(Expression::parse("concat('open, /a)").is_err());
        assert!(Expression::parse("/a/@b/c").is_err());
        assert!(Expression::parse("").is_err());
    }

    #[test]
    fn wildcard_matches_any_root() {
        let doc = Document::parse(r#"<reflection><apis><api id="x"/></apis></reflection>"#).unwrap();
        let path = NodePath::parse("/*/apis/api/@id").unwrap();
        assert_eq!(path.eval_document(&doc), "x");
        assert_eq!(path.to_string(), "/*/apis/api/@id");
    }
}
