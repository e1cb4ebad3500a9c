//! Reflection data reader: turns the `apis/api` records of a reflection XML
//! file into targets.

use std::path::Path;

use roxmltree::{Document, Node};

use crate::error::Error;
use crate::query::NodePath;
use crate::types::{LinkKind, Target, TargetKind};

/// Default element path of the container (grouping key) of each api.
pub const DEFAULT_CONTAINER_PATH: &str = "containers/library/@assembly";

/// Reads target records from reflection files.
#[derive(Debug, Clone)]
pub struct ReflectionReader {
    /// Path evaluated against each `api` element to produce `Target::container`.
    container: NodePath,
}

impl Default for ReflectionReader {
    #[allow(clippy::expect_used, reason = "constant path")]
    fn default() -> Self {
        let container = NodePath::parse(DEFAULT_CONTAINER_PATH)
            .expect("valid default container path");
        return Self { container };
    }
}

impl ReflectionReader {
    /// A reader using a custom container path.
    pub fn new(container: NodePath) -> Self {
        return Self { container };
    }

    /// Read every target declared in `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, `Error::Xml` if it is
    /// not well-formed, or `Error::SchemaInvalid` if an api lacks an id or
    /// output file.
    pub fn read_file(&self, path: &Path, link_kind: LinkKind) -> Result<Vec<Target>, Error> {
        let text = std::fs::read_to_string(path)?;
        return self.read_str(path, &text, link_kind);
    }

    /// Read targets from already-loaded text; `file` is used for diagnostics.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_file`], minus I/O.
    pub fn read_str(&self, file: &Path, text: &str, link_kind: LinkKind) -> Result<Vec<Target>, Error> {
        let doc = Document::parse(text).map_err(|source| {
            return Error::Xml {
                file: file.to_path_buf(),
                source,
            };
        })?;

        let mut targets = Vec::new();
        let apis = doc
            .root_element()
            .children()
            .filter(|n| return n.has_tag_name("apis"))
            .flat_map(|apis| return apis.children().filter(|n| return n.has_tag_name("api")));
        for api in apis {
            if child(api, "topicdata").is_some_and(|t| return t.has_attribute("notopic")) {
                continue;
            }
            self.read_api(file, api, link_kind, &mut targets)?;
        }
        return Ok(targets);
    }

    /// Append the target for one `api` element (and its enumeration values).
    fn read_api(&self, file: &Path, api: Node<'_, '_>, link_kind: LinkKind, out: &mut Vec<Target>) -> Result<(), Error> {
        let invalid = |reason: String| {
            return Error::SchemaInvalid {
                file: file.to_path_buf(),
                reason,
            };
        };

        let id = api.attribute("id").unwrap_or_default().to_string();
        if id.is_empty() {
            return Err(invalid("an api element has no id".to_string()));
        }
        let output = attr(api, "file", "name");
        if output.is_empty() {
            return Err(invalid(format!("api `{id}` has no output file")));
        }

        let mut target = Target {
            container: self.container.eval(api),
            default_link_kind: link_kind,
            file: output,
            id,
            ..Target::default()
        };

        let Some(apidata) = child(api, "apidata") else {
            out.push(target);
            return Ok(());
        };
        let group = apidata.attribute("group").unwrap_or_default();
        let subgroup = apidata.attribute("subgroup").unwrap_or_default();
        target.name = apidata.attribute("name").unwrap_or_default().to_string();

        match group {
            "namespace" => {
                target.kind = TargetKind::Namespace;
                if target.name.is_empty() {
                    target.name = "(Default Namespace)".to_string();
                }
            },
            "type" => {
                target.kind = if subgroup == "enumeration" { TargetKind::Enumeration } else { TargetKind::Type };
                target.namespace = non_empty(container_api(api, "namespace"));
                target.containing_type = non_empty(container_api(api, "type"));
                target.templates = template_names(api);
                if target.kind == TargetKind::Enumeration {
                    out.extend(enumeration_values(api, &target));
                }
            },
            "member" => {
                target.kind = match subgroup {
                    "constructor" => TargetKind::Constructor,
                    "event" => TargetKind::Event,
                    "method" => TargetKind::Method,
                    "property" => TargetKind::Property,
                    "field" => TargetKind::Member,
                    _ => TargetKind::Procedure,
                };
                target.containing_type = non_empty(container_api(api, "type"));
                target.overload = non_empty(attr(api, "overload", "api")).or_else(|| {
                    return child(api, "memberdata")
                        .and_then(|m| return m.attribute("overload"))
                        .and_then(|o| return non_empty(o.to_string()));
                });
                target.conversion_operator = apidata.attribute("subsubgroup") == Some("operator")
                    && matches!(target.name.as_str(), "Explicit" | "Implicit");
                if target.kind == TargetKind::Method {
                    target.templates = template_names(api);
                }
                target.parameters = parameter_types(api);
            },
            other => {
                return Err(invalid(format!("api `{}` has unknown group `{other}`", target.id)));
            },
        }

        out.push(target);
        return Ok(());
    }
}

/// First element child with the given name.
fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    return node.children().find(|n| return n.has_tag_name(name));
}

/// `@attribute` of the first `element` child, or empty.
fn attr(node: Node<'_, '_>, element: &str, attribute: &str) -> String {
    return child(node, element)
        .and_then(|n| return n.attribute(attribute))
        .unwrap_or_default()
        .to_string();
}

/// `containers/{kind}/@api`, or empty.
fn container_api(api: Node<'_, '_>, kind: &str) -> String {
    return child(api, "containers")
        .map(|c| return attr(c, kind, "api"))
        .unwrap_or_default();
}

/// `Some` unless empty.
fn non_empty(value: String) -> Option<String> {
    return (!value.is_empty()).then_some(value);
}

/// Names of `templates/template` children.
fn template_names(api: Node<'_, '_>) -> Vec<String> {
    let Some(templates) = child(api, "templates") else {
        return Vec::new();
    };
    return templates
        .children()
        .filter(|n| return n.has_tag_name("template"))
        .map(|n| return n.attribute("name").unwrap_or_default().to_string())
        .collect();
}

/// Type ids of `parameters/parameter`, one per parameter.
fn parameter_types(api: Node<'_, '_>) -> Vec<String> {
    let Some(parameters) = child(api, "parameters") else {
        return Vec::new();
    };
    return parameters
        .children()
        .filter(|n| return n.has_tag_name("parameter"))
        .map(|p| return p.children().find(Node::is_element).map(type_id).unwrap_or_default())
        .collect();
}

/// Type id for a parameter's type element: `type`, `arrayOf`, `referenceTo`,
/// `pointerTo`, or `template`.
fn type_id(node: Node<'_, '_>) -> String {
    let inner = || return node.children().find(Node::is_element).map(type_id).unwrap_or_default();
    return match node.tag_name().name() {
        "arrayOf" => format!("{}[]", inner()),
        "pointerTo" | "referenceTo" => inner(),
        "template" => node.attribute("name").unwrap_or_default().to_string(),
        _ => node.attribute("api").unwrap_or_default().to_string(),
    };
}

/// Member targets for the values of an enumeration, sharing its output file.
fn enumeration_values(api: Node<'_, '_>, enumeration: &Target) -> Vec<Target> {
    let Some(elements) = child(api, "elements") else {
        return Vec::new();
    };
    return elements
        .children()
        .filter(|n| return n.has_tag_name("element"))
        .filter_map(|element| {
            let id = element.attribute("api").filter(|a| return !a.is_empty())?;
            let name = element
                .attribute("name")
                .filter(|n| return !n.is_empty())
                .map(str::to_string)
                .or_else(|| return sibling_api_name(api, id))
                .unwrap_or_else(|| return id.rsplit('.').next().unwrap_or(id).to_string());
            return Some(Target {
                container: enumeration.container.clone(),
                containing_type: Some(enumeration.id.clone()),
                default_link_kind: enumeration.default_link_kind,
                file: enumeration.file.clone(),
                id: id.to_string(),
                kind: TargetKind::Member,
                name,
                ..Target::default()
            });
        })
        .collect();
}

/// Name declared by a later `api` sibling with the given id.
fn sibling_api_name(api: Node<'_, '_>, id: &str) -> Option<String> {
    return api
        .next_siblings()
        .find(|n| return n.has_tag_name("api") && n.attribute("id") == Some(id))
        .and_then(|n| return child(n, "apidata"))
        .and_then(|d| return d.attribute("name"))
        .map(str::to_string);
}
