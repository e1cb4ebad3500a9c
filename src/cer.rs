//! Code entity references: parsing raw ids such as `M:Lib.Widget.Spin(System.Int32)`
//! and producing the natural display text for targets and references.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::types::{DisplayOptions, Target, TargetKind};

/// Id → target lookup used while rendering text.
pub trait TargetLookup {
    /// Look up a target by id.
    fn lookup(&self, id: &str) -> Option<Arc<Target>>;
}

/// A code entity reference, parsed from an id string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Any id that does not match one of the known shapes.
    Invalid(String),
    /// `P:`, `M:`, `E:`, `F:` or `Overload:` reference.
    Member {
        /// The full id as written.
        id: String,
        /// Member name, `#ctor` for constructors.
        name: String,
        /// Parameter type ids; `None` when the id carries no parameter list.
        parameters: Option<Vec<String>>,
        /// Number of method template parameters (``` ``n ``` suffix).
        templates: usize,
        /// Declaring type name, without the `T:` prefix.
        type_name: String,
    },
    /// `N:` reference.
    Namespace {
        /// Namespace name, possibly empty for the default namespace.
        name: String,
    },
    /// `T:` reference.
    Type {
        /// Full type name without the `T:` prefix, arity stripped.
        name: String,
        /// Number of template parameters.
        templates: usize,
    },
}

/// Identifier segment shared by the shape patterns.
const SEGMENT: &str = r"[_a-zA-Z0-9]+(?:`\d+)?";

/// `N:` ids.
#[allow(clippy::expect_used, reason = "constant pattern")]
static NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^N:([_a-zA-Z0-9]+(?:\.[_a-zA-Z0-9]+)*)?$").expect("valid namespace regex");
});

/// `T:` ids for simple (unspecialized) types.
#[allow(clippy::expect_used, reason = "constant pattern")]
static TYPE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"^T:((?:{SEGMENT}\.)*{SEGMENT})$");
    return Regex::new(&pattern).expect("valid type regex");
});

/// Member ids, with optional method arity, parameter list, and return type.
#[allow(clippy::expect_used, reason = "constant pattern")]
static MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"^(?:[MPEF]|Overload):((?:{SEGMENT}\.)*{SEGMENT})\.([_a-zA-Z0-9#]+)(?:``(\d+))?(?:\((.*)\))?(?:~.+)?$"
    );
    return Regex::new(&pattern).expect("valid member regex");
});

/// Arity suffix on a type name segment.
#[allow(clippy::expect_used, reason = "constant pattern")]
static ARITY: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"`(\d+)").expect("valid arity regex"));

impl Reference {
    /// Parse an id. Never fails; unknown shapes become `Invalid`.
    pub fn parse(id: &str) -> Self {
        let id = id.trim();
        if let Some(caps) = NAMESPACE.captures(id) {
            let name = caps.get(1).map(|m| return m.as_str()).unwrap_or_default();
            return Self::Namespace { name: name.to_string() };
        }
        if let Some(caps) = TYPE.captures(id) {
            let raw = caps.get(1).map(|m| return m.as_str()).unwrap_or_default();
            return Self::Type {
                name: ARITY.replace_all(raw, "").into_owned(),
                templates: trailing_arity(raw),
            };
        }
        if let Some(caps) = MEMBER.captures(id) {
            let raw_type = caps.get(1).map(|m| return m.as_str()).unwrap_or_default();
            return Self::Member {
                id: id.to_string(),
                name: caps.get(2).map(|m| return m.as_str().to_string()).unwrap_or_default(),
                parameters: caps.get(4).map(|m| return split_parameters(m.as_str())),
                templates: caps
                    .get(3)
                    .and_then(|m| return m.as_str().parse().ok())
                    .unwrap_or(0),
                type_name: ARITY.replace_all(raw_type, "").into_owned(),
            };
        }
        return Self::Invalid(id.to_string());
    }

    /// Whether the id failed to parse.
    pub fn is_invalid(&self) -> bool {
        return matches!(self, Self::Invalid(_));
    }
}

/// Number of template parameters declared by the last segment (`List`1` → 1).
fn trailing_arity(raw: &str) -> usize {
    let last = raw.rsplit('.').next().unwrap_or(raw);
    return ARITY
        .captures(last)
        .and_then(|c| return c.get(1))
        .and_then(|m| return m.as_str().parse().ok())
        .unwrap_or(0);
}

/// Split a parameter list on commas that are not nested in `{}`.
pub fn split_parameters(list: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    let mut depth = 0_u32;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '{' => {
                depth = depth.saturating_add(1);
                current.push(c);
            },
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            },
            ',' if depth == 0 => {
                parameters.push(std::mem::take(&mut current).trim().to_string());
            },
            _ => current.push(c),
        }
    }
    let last = current.trim();
    if !last.is_empty() || !parameters.is_empty() {
        parameters.push(last.to_string());
    }
    return parameters;
}

/// Short display name of a parameter or type id:
/// namespace dropped, `{..}` shown as `<..>`, by-ref marker removed.
pub fn short_type_name(id: &str) -> String {
    let body = id.strip_prefix("T:").unwrap_or(id).trim_end_matches('@').trim_end_matches('*');
    if let Some(position) = body.strip_prefix("``") {
        return format!("M{position}");
    }
    if let Some(position) = body.strip_prefix('`') {
        return format!("T{position}");
    }

    let (base, suffix) = split_array_suffix(body);
    let Some(open) = base.find('{') else {
        let name = base.rsplit('.').next().unwrap_or(base);
        return format!("{}{suffix}", ARITY.replace_all(name, ""));
    };
    let head = base.get(..open).unwrap_or(base);
    let args = base.get(open.saturating_add(1)..base.len().saturating_sub(1)).unwrap_or_default();
    let name = head.rsplit('.').next().unwrap_or(head);
    let rendered: Vec<String> = split_parameters(args).iter().map(|a| return short_type_name(a)).collect();
    return format!("{name}<{}>{suffix}", rendered.join(", "));
}

/// Split trailing `[]` / `[,]` array markers off a type id.
fn split_array_suffix(id: &str) -> (&str, &str) {
    let mut end = id.len();
    while id.get(..end).is_some_and(|s| return s.ends_with(']')) {
        let Some(open) = id.get(..end).and_then(|s| return s.rfind('[')) else {
            break;
        };
        end = open;
    }
    return (id.get(..end).unwrap_or(id), id.get(end..).unwrap_or_default());
}

/// Placeholder template list for references whose parameter names are
/// unknown. Names match what `short_type_name` gives positional template
/// parameters: `T0..` for type arity, `M0..` for method arity.
fn placeholder_templates(count: usize, prefix: char) -> String {
    if count == 0 {
        return String::new();
    }
    let names: Vec<String> = (0..count).map(|i| return format!("{prefix}{i}")).collect();
    return format!("<{}>", names.join(", "));
}

/// Render a parenthesized, comma-separated parameter list.
fn parameter_list(parameters: &[String]) -> String {
    let names: Vec<String> = parameters.iter().map(|p| return short_type_name(p)).collect();
    return format!("({})", names.join(", "));
}

// ── Natural text ─────────────────────────────────────────────────────

/// Natural display text for a loaded target.
pub fn target_text(target: &Target, options: DisplayOptions, lookup: &dyn TargetLookup) -> String {
    return match target.kind {
        TargetKind::Namespace => namespace_text(target),
        TargetKind::Enumeration | TargetKind::Type => type_text(target, options, lookup),
        TargetKind::Constructor
        | TargetKind::Event
        | TargetKind::Member
        | TargetKind::Method
        | TargetKind::Procedure
        | TargetKind::Property => member_text(target, options, lookup),
        TargetKind::Other => {
            if target.name.is_empty() {
                target.id.clone()
            } else {
                target.name.clone()
            }
        },
    };
}

/// Namespace targets show their name.
fn namespace_text(target: &Target) -> String {
    if !target.name.is_empty() {
        return target.name.clone();
    }
    let name = target.id.strip_prefix("N:").unwrap_or_default();
    return if name.is_empty() { "(Default Namespace)".to_string() } else { name.to_string() };
}

/// Type targets: optional namespace, outer type, name, template list.
fn type_text(target: &Target, options: DisplayOptions, lookup: &dyn TargetLookup) -> String {
    let mut out = String::new();
    if options.contains(DisplayOptions::SHOW_CONTAINER)
        && let Some(namespace) = &target.namespace
    {
        let name = match lookup.lookup(namespace) {
            Some(ns) => namespace_text(&ns),
            None => namespace.strip_prefix("N:").unwrap_or(namespace).to_string(),
        };
        if !name.is_empty() {
            out.push_str(&name);
            out.push('.');
        }
    }
    if let Some(outer) = &target.containing_type {
        out.push_str(&type_short_text(outer, DisplayOptions::default(), lookup));
        out.push('.');
    }
    out.push_str(&target.name);
    if options.contains(DisplayOptions::SHOW_TEMPLATES) && !target.templates.is_empty() {
        out.push_str(&format!("<{}>", target.templates.join(", ")));
    }
    return out;
}

/// Short text for a type id, preferring the loaded target's name and templates.
fn type_short_text(id: &str, options: DisplayOptions, lookup: &dyn TargetLookup) -> String {
    if let Some(target) = lookup.lookup(id) {
        return type_text(&target, options - DisplayOptions::SHOW_CONTAINER, lookup);
    }
    let mut out = short_type_name(id);
    if options.contains(DisplayOptions::SHOW_TEMPLATES)
        && let Reference::Type { templates, .. } = Reference::parse(id)
    {
        out.push_str(&placeholder_templates(templates, 'T'));
    }
    return out;
}

/// Member targets: optional declaring type, name, templates, parameters.
fn member_text(target: &Target, options: DisplayOptions, lookup: &dyn TargetLookup) -> String {
    let mut out = String::new();
    let declaring = target
        .containing_type
        .as_deref()
        .map(|t| return type_short_text(t, options, lookup));

    if options.contains(DisplayOptions::SHOW_CONTAINER)
        && let Some(declaring) = &declaring
    {
        out.push_str(declaring);
        out.push_str(if target.conversion_operator { " " } else { "." });
    }

    match target.kind {
        TargetKind::Constructor => {
            let name = target
                .containing_type
                .as_deref()
                .map(|t| return type_short_text(t, options - DisplayOptions::SHOW_TEMPLATES, lookup))
                .unwrap_or_else(|| return target.name.clone());
            out.push_str(&name);
            if options.contains(DisplayOptions::SHOW_PARAMETERS) {
                out.push_str(&parameter_list(&target.parameters));
            }
        },
        TargetKind::Method => {
            out.push_str(&target.name);
            if options.contains(DisplayOptions::SHOW_TEMPLATES) && !target.templates.is_empty() {
                out.push_str(&format!("<{}>", target.templates.join(", ")));
            }
            if options.contains(DisplayOptions::SHOW_PARAMETERS) {
                out.push_str(&parameter_list(&target.parameters));
            }
        },
        TargetKind::Property => {
            out.push_str(&target.name);
            if options.contains(DisplayOptions::SHOW_PARAMETERS) && !target.parameters.is_empty() {
                out.push_str(&parameter_list(&target.parameters));
            }
        },
        _ => out.push_str(&target.name),
    }
    return out;
}

/// Natural display text for a reference, using the target when one is loaded.
pub fn reference_text(reference: &Reference, options: DisplayOptions, lookup: &dyn TargetLookup) -> String {
    return match reference {
        Reference::Invalid(id) => id.clone(),
        Reference::Namespace { name } => {
            if name.is_empty() {
                "(Default Namespace)".to_string()
            } else {
                name.clone()
            }
        },
        Reference::Type { name, templates } => {
            let id = format!("T:{name}");
            if let Some(target) = lookup.lookup(&id) {
                return target_text(&target, options, lookup);
            }
            let mut out = if options.contains(DisplayOptions::SHOW_CONTAINER) {
                name.clone()
            } else {
                name.rsplit('.').next().unwrap_or(name).to_string()
            };
            if options.contains(DisplayOptions::SHOW_TEMPLATES) {
                out.push_str(&placeholder_templates(*templates, 'T'));
            }
            out
        },
        Reference::Member { id, .. } => {
            if let Some(target) = lookup.lookup(id) {
                return target_text(&target, options, lookup);
            }
            member_reference_text(reference, options, false)
        },
    };
}

/// Text for an extension-method shape: the receiver parameter is hidden
/// and the declaring static class is never shown.
pub fn extension_text(reference: &Reference, options: DisplayOptions) -> String {
    return member_reference_text(reference, options - DisplayOptions::SHOW_CONTAINER, true);
}

/// Member text built from the id alone.
fn member_reference_text(reference: &Reference, options: DisplayOptions, skip_receiver: bool) -> String {
    let Reference::Member { name, parameters, templates, type_name, .. } = reference else {
        return String::new();
    };
    let type_short = type_name.rsplit('.').next().unwrap_or(type_name);
    let mut out = String::new();
    if options.contains(DisplayOptions::SHOW_CONTAINER) {
        out.push_str(type_short);
        out.push('.');
    }
    if name == "#ctor" || name == "#cctor" {
        out.push_str(type_short);
    } else {
        out.push_str(name.rsplit('#').next().unwrap_or(name));
    }
    if options.contains(DisplayOptions::SHOW_TEMPLATES) {
        out.push_str(&placeholder_templates(*templates, 'M'));
    }
    if options.contains(DisplayOptions::SHOW_PARAMETERS)
        && let Some(parameters) = parameters
    {
        let shown = if skip_receiver { parameters.get(1..).unwrap_or_default() } else { parameters.as_slice() };
        out.push_str(&parameter_list(shown));
    }
    return out;
}
