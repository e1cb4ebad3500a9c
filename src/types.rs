/// Core domain types: targets, link kinds, markers, and resolved links.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How a link to a target should be materialized.
///
/// `LocalOrIndex` is a policy, not an answer: the resolver turns it into
/// `Local` or `Index` for each referencing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Anchor to an external documentation site.
    External,
    /// Indexed-keyword link carrying the raw id.
    Index,
    /// Anchor to the target's output file.
    Local,
    /// `Local` when the document shares the target's container, else `Index`.
    LocalOrIndex,
    /// Inert marker, no navigation.
    #[default]
    None,
    /// Inert marker for references to the current page.
    SelfLink,
    /// Scheme-style URI built from the raw id.
    SyntheticId,
}

impl FromStr for LinkKind {
    type Err = Error;

    /// Parse a configuration value case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        return match value.trim().to_ascii_lowercase().as_str() {
            "external" | "msdn" => Ok(Self::External),
            "id" => Ok(Self::SyntheticId),
            "index" => Ok(Self::Index),
            "local" => Ok(Self::Local),
            "localorindex" => Ok(Self::LocalOrIndex),
            "none" => Ok(Self::None),
            "self" => Ok(Self::SelfLink),
            _ => Err(Error::InvalidLinkKind { value: value.to_string() }),
        };
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::External => "external",
            Self::Index => "index",
            Self::Local => "local",
            Self::LocalOrIndex => "localorindex",
            Self::None => "none",
            Self::SelfLink => "self",
            Self::SyntheticId => "id",
        };
        return f.write_str(name);
    }
}

/// Entity kind of a documentable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Instance or static constructor.
    Constructor,
    /// Enumeration type.
    Enumeration,
    /// Event member.
    Event,
    /// Generic member without a more specific shape (fields, enum values).
    Member,
    /// Method, including operators.
    Method,
    /// Namespace topic.
    Namespace,
    /// Topic without api data (overview pages, overload groups).
    #[default]
    Other,
    /// Procedure-like member that is neither method, property nor event.
    Procedure,
    /// Property member.
    Property,
    /// Class, structure, interface, or delegate.
    Type,
}

impl TargetKind {
    /// Whether the overload-preference rules apply to this kind.
    pub fn is_member_like(self) -> bool {
        return matches!(
            self,
            Self::Constructor
                | Self::Event
                | Self::Member
                | Self::Method
                | Self::Procedure
                | Self::Property
        );
    }
}

/// A documentable entity with a stable id and a known output location.
/// Built once during index load and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Target {
    /// Grouping key used for same-container checks.
    pub container: String,
    /// Containing type id for members and nested types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing_type: Option<String>,
    /// Whether this is a user-defined `Explicit`/`Implicit` conversion operator.
    #[serde(default)]
    pub conversion_operator: bool,
    /// Link kind declared by the source the target was loaded from.
    #[serde(default)]
    pub default_link_kind: LinkKind,
    /// Link kind attached when the target is served from storage with an external hint.
    #[serde(skip)]
    pub external_link_kind: Option<LinkKind>,
    /// Output file name, without extension.
    pub file: String,
    /// Stable id, unique within one index snapshot.
    pub id: String,
    /// Entity kind.
    #[serde(default)]
    pub kind: TargetKind,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Namespace id for types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Overload-set id for members that belong to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overload: Option<String>,
    /// Parameter type ids, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Template parameter names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
}

impl Target {
    /// The kind used for link decisions before `LocalOrIndex` is resolved.
    pub fn base_link_kind(&self) -> LinkKind {
        return self.external_link_kind.unwrap_or(self.default_link_kind);
    }
}

bitflags::bitflags! {
    /// What to include when rendering a target's natural text.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DisplayOptions: u8 {
        /// Prefix the namespace or declaring type.
        const SHOW_CONTAINER  = 1 << 0;
        /// Append template parameter lists.
        const SHOW_TEMPLATES  = 1 << 1;
        /// Append method parameter lists.
        const SHOW_PARAMETERS = 1 << 2;
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        return Self::SHOW_TEMPLATES | Self::SHOW_PARAMETERS;
    }
}

/// Override for how a reference marker's text is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayTarget {
    /// Render the id written in the marker's contents.
    Content,
    /// Render the given code entity reference instead of the target.
    Cer(String),
    /// Render the contents as an extension-method call shape.
    Extension,
    /// Substitute the natural rendering into the contents at `{0}`.
    Format,
}

impl DisplayTarget {
    /// Interpret a `display-target` attribute value. Unknown values are CERs.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(match trimmed.to_ascii_lowercase().as_str() {
            "content" => Self::Content,
            "extension" => Self::Extension,
            "format" => Self::Format,
            _ => Self::Cer(trimmed.to_string()),
        });
    }
}

/// An in-document placeholder requesting a link to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMarker {
    /// Literal child content, kept as markup.
    pub contents: Option<String>,
    /// Optional text-production override.
    pub display_target: Option<DisplayTarget>,
    /// Rendering flags.
    pub options: DisplayOptions,
    /// Redirect members to their overload-set topic when one exists.
    pub prefer_overload: bool,
    /// Requested target id.
    pub target: String,
}

impl ReferenceMarker {
    /// A marker for `target` with default options.
    pub fn new(target: impl Into<String>) -> Self {
        return Self {
            contents: None,
            display_target: None,
            options: DisplayOptions::default(),
            prefer_overload: false,
            target: target.into(),
        };
    }
}

/// Link text: plain text is escaped on output, markup is written verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkText {
    /// Pre-built markup fragment.
    Markup(String),
    /// Plain text.
    Plain(String),
}

impl LinkText {
    /// The text content without distinguishing markup.
    pub fn as_str(&self) -> &str {
        return match self {
            Self::Markup(s) | Self::Plain(s) => s,
        };
    }
}

/// Kind-specific payload of a resolved link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// External documentation anchor.
    External {
        /// Frame attribute for the anchor.
        frame: String,
        /// Absolute URL.
        url: String,
    },
    /// Indexed keyword link.
    Index {
        /// Keyword, the raw target id.
        keyword: String,
    },
    /// Local anchor.
    Local {
        /// Possibly relative href.
        href: String,
    },
    /// Unresolved; rendered inert.
    None,
    /// Reference to the current page; rendered inert.
    SelfLink,
    /// Scheme URI built from the id.
    SyntheticId {
        /// The URI with `#` escaped.
        uri: String,
    },
}

impl LinkTarget {
    /// The resolved kind this payload represents.
    pub fn kind(&self) -> LinkKind {
        return match self {
            Self::External { .. } => LinkKind::External,
            Self::Index { .. } => LinkKind::Index,
            Self::Local { .. } => LinkKind::Local,
            Self::None => LinkKind::None,
            Self::SelfLink => LinkKind::SelfLink,
            Self::SyntheticId { .. } => LinkKind::SyntheticId,
        };
    }
}

/// The rendering decision for one marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// Where the link points.
    pub target: LinkTarget,
    /// What the link displays.
    pub text: LinkText,
}

/// Link kinds available to conceptual topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptualLinkKind {
    /// Scheme URI built from the topic id.
    Id,
    /// Indexed keyword link.
    Index,
    /// Anchor to the resolved url.
    Local,
    /// Inert marker.
    #[default]
    None,
}

impl FromStr for ConceptualLinkKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        return match value.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "index" => Ok(Self::Index),
            "local" => Ok(Self::Local),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidLinkKind { value: value.to_string() }),
        };
    }
}

/// A resolved conceptual topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptualTarget {
    /// Topic GUID, lowercased.
    pub id: String,
    /// Link kind configured for the directory the topic was found in.
    pub kind: ConceptualLinkKind,
    /// Display text.
    pub text: String,
    /// Resolved url, without anchor.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_kind_parses_case_insensitively() {
        assert_eq!("LocalOrIndex".parse::<LinkKind>().unwrap(), LinkKind::LocalOrIndex);
        assert_eq!("MSDN".parse::<LinkKind>().unwrap(), LinkKind::External);
        assert_eq!("id".parse::<LinkKind>().unwrap(), LinkKind::SyntheticId);
        assert!("sideways".parse::<LinkKind>().is_err());
    }

    #[test]
    fn external_kind_wins_over_default() {
        let mut target = Target {
            default_link_kind: LinkKind::Local,
            ..Target::default()
        };
        assert_eq!(target.base_link_kind(), LinkKind::Local);
        target.external_link_kind = Some(LinkKind::External);
        assert_eq!(target.base_link_kind(), LinkKind::External);
    }

    #[test]
    fn display_target_falls_back_to_cer() {
        assert_eq!(DisplayTarget::parse("Format"), Some(DisplayTarget::Format));
        assert_eq!(
            DisplayTarget::parse("T:System.String"),
            Some(DisplayTarget::Cer("T:System.String".to_string()))
        );
        assert_eq!(DisplayTarget::parse("  "), None);
    }

    #[test]
    fn default_options_show_templates_and_parameters() {
        let options = DisplayOptions::default();
        assert!(options.contains(DisplayOptions::SHOW_PARAMETERS));
        assert!(!options.contains(DisplayOptions::SHOW_CONTAINER));
    }
}
