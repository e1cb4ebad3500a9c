//! Finds `<referenceLink>` and `<conceptualLink>` markers in page text and
//! rewrites pages with their resolved markup.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::error::Error;
use crate::markup;
use crate::resolver::LinkResolver;
use crate::types::{DisplayOptions, DisplayTarget, ReferenceMarker};

#[allow(clippy::expect_used, reason = "constant pattern")]
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?s)<referenceLink\b(?P<attrs>[^>]*?)(?:/>|>(?P<body>.*?)</referenceLink\s*>)")
        .expect("valid reference marker regex");
});

#[allow(clippy::expect_used, reason = "constant pattern")]
static CONCEPTUAL: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?s)<conceptualLink\b(?P<attrs>[^>]*?)(?:/>|>(?P<body>.*?)</conceptualLink\s*>)")
        .expect("valid conceptual marker regex");
});

/// A parsed marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Link to a narrative topic: `guid` or `guid#anchor`, plus its text.
    Conceptual {
        /// Target with optional anchor.
        target: String,
        /// Marker text, if any.
        text: Option<String>,
    },
    /// Link to an API target.
    Reference(ReferenceMarker),
}

/// One marker occurrence in a page.
#[derive(Debug)]
pub struct MarkerMatch {
    /// The parsed marker, or why it could not be parsed.
    pub marker: Result<Marker, Error>,
    /// Byte range of the whole element.
    pub range: Range<usize>,
}

/// Every marker in `page`, in document order.
pub fn scan(page: &str) -> Vec<MarkerMatch> {
    let mut found: Vec<MarkerMatch> = REFERENCE
        .captures_iter(page)
        .map(|caps| return matched(&caps, parse_reference))
        .chain(CONCEPTUAL.captures_iter(page).map(|caps| return matched(&caps, parse_conceptual)))
        .collect();
    found.sort_by_key(|m| return m.range.start);
    return found;
}

/// Replace every marker in `page` with its resolved markup. `current` is the
/// id of the document the page renders. Markers that fail to parse or
/// resolve are removed and logged.
pub fn render_page(page: &str, resolver: &LinkResolver<'_>, current: Option<&str>) -> String {
    let mut out = String::with_capacity(page.len());
    let mut cursor = 0;
    for found in scan(page) {
        // a marker nested in an earlier one's contents was already consumed
        if found.range.start < cursor {
            continue;
        }
        out.push_str(&page[cursor..found.range.start]);
        cursor = found.range.end;

        let rendered = match found.marker {
            Ok(Marker::Reference(marker)) => resolver.resolve_or_drop(&marker, current).map(|link| return markup::render(&link)),
            Ok(Marker::Conceptual { target, text }) => {
                Some(markup::render(&resolver.resolve_conceptual(&target, text.as_deref())))
            },
            Err(e) => {
                warn!(offset = found.range.start, error = %e, "dropping malformed link marker");
                None
            },
        };
        if let Some(rendered) = rendered {
            out.push_str(&rendered);
        }
    }
    out.push_str(&page[cursor..]);
    debug!(bytes = out.len(), "rendered page");
    return out;
}

/// Wrap one regex match with its parse result.
fn matched(caps: &Captures<'_>, parse: fn(&Attributes, Option<&str>) -> Result<Marker, Error>) -> MarkerMatch {
    let range = caps.get(0).map_or(0..0, |m| return m.range());
    let attrs = caps.name("attrs").map_or("", |m| return m.as_str());
    let body = caps
        .name("body")
        .map(|m| return m.as_str())
        .filter(|b| return !b.trim().is_empty());
    let marker = Attributes::parse(attrs).and_then(|attributes| return parse(&attributes, body));
    return MarkerMatch { marker, range };
}

/// Attribute list of one marker element.
struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// Parse ` name="value" ...` by reading it as an empty XML element, so
    /// quoting and entities follow XML rules.
    fn parse(text: &str) -> Result<Self, Error> {
        let element = format!("<marker {}/>", text.trim().trim_end_matches('/'));
        let doc = roxmltree::Document::parse(&element).map_err(|e| {
            return Error::Marker {
                element: "attributes",
                reason: e.to_string(),
            };
        })?;
        let pairs = doc
            .root_element()
            .attributes()
            .map(|a| return (a.name().to_string(), a.value().to_string()))
            .collect();
        return Ok(Self(pairs));
    }

    fn get(&self, name: &str) -> Option<&str> {
        return self.0.iter().find(|(n, _)| return n == name).map(|(_, v)| return v.as_str());
    }

    /// A `true`/`false` attribute, or `default` when absent.
    fn flag(&self, element: &'static str, name: &str, default: bool) -> Result<bool, Error> {
        let Some(value) = self.get(name) else {
            return Ok(default);
        };
        return match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::Marker {
                element,
                reason: format!("`{name}` must be true or false, got `{value}`"),
            }),
        };
    }

    fn target(&self, element: &'static str) -> Result<String, Error> {
        return self
            .get("target")
            .map(str::trim)
            .filter(|t| return !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                return Error::Marker {
                    element,
                    reason: "missing `target` attribute".to_string(),
                };
            });
    }
}

fn parse_reference(attributes: &Attributes, body: Option<&str>) -> Result<Marker, Error> {
    const ELEMENT: &str = "referenceLink";
    let mut options = DisplayOptions::empty();
    options.set(DisplayOptions::SHOW_CONTAINER, attributes.flag(ELEMENT, "show-container", false)?);
    options.set(DisplayOptions::SHOW_TEMPLATES, attributes.flag(ELEMENT, "show-templates", true)?);
    options.set(DisplayOptions::SHOW_PARAMETERS, attributes.flag(ELEMENT, "show-parameters", true)?);

    let mut marker = ReferenceMarker::new(attributes.target(ELEMENT)?);
    marker.contents = body.map(str::to_string);
    marker.display_target = attributes.get("display-target").and_then(DisplayTarget::parse);
    marker.options = options;
    marker.prefer_overload = attributes.flag(ELEMENT, "prefer-overload", false)?;
    return Ok(Marker::Reference(marker));
}

fn parse_conceptual(attributes: &Attributes, body: Option<&str>) -> Result<Marker, Error> {
    return Ok(Marker::Conceptual {
        target: attributes.target("conceptualLink")?,
        text: body.map(|b| return b.trim().to_string()),
    });
}
