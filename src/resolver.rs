use std::sync::Arc;

use tracing::warn;

use crate::cer::{self, Reference};
use crate::conceptual::{ConceptualLookup, ConceptualTargetCache, append_anchor, split_anchor};
use crate::context::ResolverContext;
use crate::error::Error;
use crate::index::TargetCollection;
use crate::markup::{escape_text, relative_path};
use crate::query::text_content;
use crate::types::{
    ConceptualLinkKind, DisplayOptions, DisplayTarget, LinkKind, LinkTarget, LinkText, ReferenceMarker,
    ResolvedLink, Target,
};

/// Default local href format; `{0}` is the target's output file.
pub const DEFAULT_HREF_FORMAT: &str = "{0}.htm";

/// Default frame for external anchors.
pub const DEFAULT_LINK_TARGET: &str = "_blank";

/// Default synthetic link format; `{0}` is the raw id.
pub const DEFAULT_ID_URI_FORMAT: &str = "ms-xhelp://?Id={0}";

/// Options for rendering reference links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceOptions {
    /// Location of the current document, relative to the output root.
    /// `{key}` is the document id, `{file}` its output file.
    /// When set, local hrefs are made relative to it.
    pub base_url: Option<String>,
    /// Local href format.
    pub href_format: String,
    /// Synthetic link format.
    pub id_uri_format: String,
    /// Frame attribute for external anchors.
    pub link_target: String,
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        return Self {
            base_url: None,
            href_format: DEFAULT_HREF_FORMAT.to_string(),
            id_uri_format: DEFAULT_ID_URI_FORMAT.to_string(),
            link_target: DEFAULT_LINK_TARGET.to_string(),
        };
    }
}

/// Options for rendering conceptual links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptualOptions {
    /// Kind forced onto every found link.
    pub base_kind: Option<ConceptualLinkKind>,
    /// Show the marker text instead of `[id]` for broken links.
    pub show_broken_link_text: bool,
    /// Prefer non-empty marker text over the topic title.
    pub show_text: bool,
}

/// Resolves reference and conceptual markers against one target snapshot.
pub struct LinkResolver<'ctx> {
    /// Fallback cache for ids that are not reference targets.
    conceptual: Option<Arc<ConceptualTargetCache>>,
    /// Conceptual rendering options.
    conceptual_options: ConceptualOptions,
    /// Source of the external url resolver.
    context: &'ctx ResolverContext,
    /// Reference rendering options.
    options: ReferenceOptions,
    /// The loaded targets.
    targets: TargetCollection,
}

impl<'ctx> LinkResolver<'ctx> {
    /// A resolver over `targets` without a conceptual fallback.
    pub fn new(context: &'ctx ResolverContext, targets: TargetCollection, options: ReferenceOptions) -> Self {
        return Self {
            conceptual: None,
            conceptual_options: ConceptualOptions::default(),
            context,
            options,
            targets,
        };
    }

    /// Attach the conceptual cache consulted for unknown reference ids.
    #[must_use]
    pub fn with_conceptual(mut self, cache: Arc<ConceptualTargetCache>, options: ConceptualOptions) -> Self {
        self.conceptual = Some(cache);
        self.conceptual_options = options;
        return self;
    }

    /// The snapshot this resolver reads.
    pub fn targets(&self) -> &TargetCollection {
        return &self.targets;
    }

    /// Resolve one reference marker as seen from `current` (the referencing
    /// document's id).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTarget` for an empty target id, or
    /// `Error::Marker` when a display mode needs contents the marker lacks.
    pub fn resolve(&self, marker: &ReferenceMarker, current: Option<&str>) -> Result<ResolvedLink, Error> {
        if marker.target.trim().is_empty() {
            return Err(Error::InvalidTarget {
                id: marker.target.clone(),
            });
        }

        let mut target = self.targets.get(&marker.target);
        if target.is_none()
            && let Some(cache) = &self.conceptual
        {
            let (id, _) = split_anchor(&marker.target);
            if matches!(cache.resolve(id), ConceptualLookup::Found(_)) {
                return Ok(self.resolve_conceptual(&marker.target, marker.contents.as_deref()));
            }
        }

        let mut target_id = marker.target.clone();
        let mut options = marker.options;
        let current_target = current.and_then(|key| return self.targets.get(key));

        let mut kind = match target.clone() {
            None => {
                warn!(id = %marker.target, "unknown reference link target");
                LinkKind::None
            },
            Some(found) => {
                if marker.prefer_overload && found.kind.is_member_like() {
                    let (redirect, shown) = self.prefer_overload(&found, options);
                    options = shown;
                    if let Some(overload) = redirect {
                        target_id.clone_from(&overload.id);
                        target = Some(overload);
                    }
                }
                let resolved = target.as_deref().unwrap_or(&found);
                resolve_local_or_index(resolved, current_target.as_deref())
            },
        };

        let is_self = current.is_some_and(|key| return key == target_id)
            || target
                .as_deref()
                .zip(current_target.as_deref())
                .is_some_and(|(t, c)| return t.file == c.file);
        if is_self {
            kind = LinkKind::SelfLink;
        }

        let link_target = self.link_target(kind, target.as_deref(), &target_id, current, current_target.as_deref());
        let text = self.link_text(marker, target.as_deref(), &target_id, options)?;
        return Ok(ResolvedLink {
            target: link_target,
            text,
        });
    }

    /// Resolve one marker, logging and dropping it on failure.
    pub fn resolve_or_drop(&self, marker: &ReferenceMarker, current: Option<&str>) -> Option<ResolvedLink> {
        return match self.resolve(marker, current) {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(id = %marker.target, error = %e, "dropping reference link");
                None
            },
        };
    }

    /// Resolve a conceptual marker: `target` is `guid` or `guid#anchor`,
    /// `text` the marker's own text.
    pub fn resolve_conceptual(&self, target: &str, text: Option<&str>) -> ResolvedLink {
        let (id, anchor) = split_anchor(target);
        let text = text.map(str::trim).filter(|t| return !t.is_empty());
        let lookup = match &self.conceptual {
            Some(cache) => cache.resolve(id),
            None if crate::conceptual::is_valid_id(id) => ConceptualLookup::Unknown,
            None => ConceptualLookup::Invalid,
        };

        let options = &self.conceptual_options;
        let broken = || {
            if options.show_broken_link_text {
                return text.unwrap_or_default().to_string();
            }
            return format!("[{id}]");
        };
        let (mut kind, url, shown) = match lookup {
            ConceptualLookup::Found(found) => {
                let shown = match text {
                    Some(t) if options.show_text => t.to_string(),
                    _ => found.text.clone(),
                };
                (found.kind, append_anchor(&found.url, anchor), shown)
            },
            ConceptualLookup::Unknown => {
                warn!(id, "unknown conceptual link target");
                (ConceptualLinkKind::None, String::new(), broken())
            },
            ConceptualLookup::Invalid => {
                warn!(id, "invalid conceptual link target");
                (ConceptualLinkKind::None, String::new(), broken())
            },
        };

        if let Some(base) = options.base_kind
            && kind != ConceptualLinkKind::None
        {
            kind = base;
        }

        let link_target = match kind {
            ConceptualLinkKind::None => LinkTarget::None,
            ConceptualLinkKind::Local => LinkTarget::Local { href: url },
            ConceptualLinkKind::Index => LinkTarget::Index {
                keyword: id.to_ascii_lowercase(),
            },
            ConceptualLinkKind::Id => LinkTarget::SyntheticId {
                uri: self.options.id_uri_format.replace("{0}", id),
            },
        };
        return ResolvedLink {
            target: link_target,
            text: LinkText::Plain(shown),
        };
    }

    /// Overload preference for a member: returns the overload-set target to
    /// redirect to (if any) and the adjusted display options.
    fn prefer_overload(&self, member: &Target, options: DisplayOptions) -> (Option<Arc<Target>>, DisplayOptions) {
        let Some(overload) = member.overload.as_deref() else {
            return (None, options - DisplayOptions::SHOW_PARAMETERS);
        };
        if member.conversion_operator {
            // operators converting to different types share one overload id
            return (None, options | DisplayOptions::SHOW_PARAMETERS);
        }
        return (self.targets.get(overload), options - DisplayOptions::SHOW_PARAMETERS);
    }

    /// Build the kind-specific payload, downgrading unresolvable external links.
    fn link_target(
        &self,
        kind: LinkKind,
        target: Option<&Target>,
        target_id: &str,
        current: Option<&str>,
        current_target: Option<&Target>,
    ) -> LinkTarget {
        return match (kind, target) {
            (LinkKind::Local, Some(target)) => LinkTarget::Local {
                href: self.local_href(target, current, current_target),
            },
            (LinkKind::Index, _) => LinkTarget::Index {
                keyword: target_id.to_string(),
            },
            (LinkKind::External, _) => match self.context.external(&self.targets).url(target_id) {
                Some(url) => LinkTarget::External {
                    frame: self.options.link_target.clone(),
                    url,
                },
                None => {
                    warn!(id = target_id, "external URL not found for target");
                    LinkTarget::None
                },
            },
            (LinkKind::SelfLink, _) => LinkTarget::SelfLink,
            (LinkKind::SyntheticId, _) => LinkTarget::SyntheticId {
                uri: self.options.id_uri_format.replace("{0}", &target_id.replace('#', "%23")),
            },
            (LinkKind::Local | LinkKind::LocalOrIndex | LinkKind::None, _) => LinkTarget::None,
        };
    }

    /// Format the target's href and make it relative to the current document.
    fn local_href(&self, target: &Target, current: Option<&str>, current_target: Option<&Target>) -> String {
        let href = self.options.href_format.replace("{0}", &target.file);
        let (Some(base_url), Some(key)) = (&self.options.base_url, current) else {
            return href;
        };
        let file = current_target.map(|t| return t.file.as_str()).unwrap_or_default();
        let base = base_url.replace("{key}", key).replace("{file}", file);
        return relative_path(&href, &base);
    }

    /// Text precedence: display target, then literal contents, then the
    /// natural rendering of the target or of the raw id.
    fn link_text(
        &self,
        marker: &ReferenceMarker,
        target: Option<&Target>,
        target_id: &str,
        options: DisplayOptions,
    ) -> Result<LinkText, Error> {
        let contents = || {
            return marker.contents.as_deref().ok_or_else(|| {
                return Error::Marker {
                    element: "referenceLink",
                    reason: format!("display-target on `{}` requires contents", marker.target),
                };
            });
        };

        let Some(display) = &marker.display_target else {
            if let Some(contents) = &marker.contents {
                return Ok(LinkText::Markup(contents.clone()));
            }
            return Ok(LinkText::Plain(self.natural_text(target, target_id, options)));
        };

        return Ok(match display {
            DisplayTarget::Cer(cer) => LinkText::Plain(self.reference_text(cer, options)),
            DisplayTarget::Content => {
                let cer = contents_cer(contents()?);
                LinkText::Plain(self.reference_text(&cer, options))
            },
            DisplayTarget::Extension => {
                let cer = contents_cer(contents()?);
                LinkText::Plain(cer::extension_text(&Reference::parse(&cer), options))
            },
            DisplayTarget::Format => {
                let format = contents()?;
                let rendered = escape_text(&self.natural_text(target, target_id, options));
                LinkText::Markup(format.replace("{0}", &rendered))
            },
        });
    }

    /// Natural rendering of a target, or of the raw id when no target exists.
    fn natural_text(&self, target: Option<&Target>, target_id: &str, options: DisplayOptions) -> String {
        if let Some(target) = target {
            return cer::target_text(target, options, &self.targets);
        }
        return self.reference_text(target_id, options);
    }

    /// Natural rendering of a code entity reference.
    fn reference_text(&self, id: &str, options: DisplayOptions) -> String {
        let reference = Reference::parse(id);
        if reference.is_invalid() {
            warn!(id, "invalid reference link target");
        }
        return cer::reference_text(&reference, options, &self.targets);
    }
}

/// `LocalOrIndex` becomes `Local` when the current document shares the
/// target's container, else `Index`. Other kinds pass through.
fn resolve_local_or_index(target: &Target, current: Option<&Target>) -> LinkKind {
    let kind = target.base_link_kind();
    if kind != LinkKind::LocalOrIndex {
        return kind;
    }
    if current.is_some_and(|c| return c.container == target.container) {
        return LinkKind::Local;
    }
    return LinkKind::Index;
}

/// The CER carried by marker contents: the first `api` attribute in the
/// fragment, else its trimmed text.
fn contents_cer(contents: &str) -> String {
    let wrapped = format!("<contents>{contents}</contents>");
    let Ok(doc) = roxmltree::Document::parse(&wrapped) else {
        return contents.trim().to_string();
    };
    if let Some(api) = doc.descendants().find_map(|n| return n.attribute("api")) {
        return api.to_string();
    }
    return text_content(doc.root_element()).trim().to_string();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conceptual::TargetDirectory;
    use crate::context::ExternalConfig;
    use crate::external::ExternalSettings;
    use crate::index::IndexSettings;
    use crate::types::TargetKind;

    const TOPIC: &str = "11111111-1111-1111-1111-111111111111";

    fn target(id: &str, file: &str, container: &str, kind: LinkKind) -> Target {
        return Target {
            container: container.to_string(),
            default_link_kind: kind,
            file: file.to_string(),
            id: id.to_string(),
            kind: TargetKind::Type,
            name: id.rsplit('.').next().unwrap_or(id).to_string(),
            ..Target::default()
        };
    }

    fn method(id: &str, name: &str, overload: Option<&str>, conversion: bool) -> Target {
        return Target {
            container: "Lib".to_string(),
            containing_type: Some("T:Lib.Money".to_string()),
            conversion_operator: conversion,
            default_link_kind: LinkKind::Local,
            file: id.replace([':', '.', '(', ')'], "_"),
            id: id.to_string(),
            kind: TargetKind::Method,
            name: name.to_string(),
            overload: overload.map(str::to_string),
            parameters: vec!["T:Lib.Money".to_string()],
            ..Target::default()
        };
    }

    fn collection() -> TargetCollection {
        return TargetCollection::from_targets(vec![
            target("T:Lib.Widget", "T_Lib_Widget", "Lib", LinkKind::LocalOrIndex),
            target("T:Lib.Gadget", "T_Lib_Gadget", "Lib", LinkKind::LocalOrIndex),
            target("T:Other.Thing", "T_Other_Thing", "Other", LinkKind::LocalOrIndex),
            target("T:Lib.Widget.Nested", "T_Lib_Widget", "Lib", LinkKind::Local),
            target("T:Lib.Ext", "T_Lib_Ext", "Lib", LinkKind::External),
            target("T:Lib.Id", "T_Lib_Id", "Lib", LinkKind::SyntheticId),
            method("M:Lib.Money.Add(Lib.Money)", "Add", Some("Overload:Lib.Money.Add"), false),
            Target {
                kind: TargetKind::Other,
                name: "Add".to_string(),
                ..target("Overload:Lib.Money.Add", "Overloads_Lib_Money_Add", "Lib", LinkKind::Local)
            },
            method("M:Lib.Money.op_Explicit(Lib.Money)~System.Decimal", "Explicit", Some("Overload:Lib.Money.op_Explicit"), true),
        ]);
    }

    fn resolve(context: &ResolverContext, marker: &ReferenceMarker, current: Option<&str>) -> ResolvedLink {
        return LinkResolver::new(context, collection(), ReferenceOptions::default())
            .resolve(marker, current)
            .unwrap();
    }

    #[test]
    fn same_file_is_a_self_link() {
        let context = ResolverContext::default();
        let link = resolve(&context, &ReferenceMarker::new("T:Lib.Widget.Nested"), Some("T:Lib.Widget"));
        assert_eq!(link.target, LinkTarget::SelfLink);
        let link = resolve(&context, &ReferenceMarker::new("T:Lib.Widget"), Some("T:Lib.Widget"));
        assert_eq!(link.target, LinkTarget::SelfLink);
    }

    #[test]
    fn local_or_index_depends_on_container() {
        let context = ResolverContext::default();
        let same = resolve(&context, &ReferenceMarker::new("T:Lib.Gadget"), Some("T:Lib.Widget"));
        assert_eq!(
            same.target,
            LinkTarget::Local {
                href: "T_Lib_Gadget.htm".to_string()
            }
        );
        let other = resolve(&context, &ReferenceMarker::new("T:Lib.Gadget"), Some("T:Other.Thing"));
        assert_eq!(
            other.target,
            LinkTarget::Index {
                keyword: "T:Lib.Gadget".to_string()
            }
        );
        let unknown_document = resolve(&context, &ReferenceMarker::new("T:Lib.Gadget"), None);
        assert_eq!(unknown_document.target.kind(), LinkKind::Index);
    }

    #[test]
    fn prefer_overload_redirects_and_hides_parameters() {
        let context = ResolverContext::default();
        let mut marker = ReferenceMarker::new("M:Lib.Money.Add(Lib.Money)");
        marker.prefer_overload = true;
        let link = resolve(&context, &marker, Some("T:Other.Thing"));
        assert_eq!(
            link.target,
            LinkTarget::Local {
                href: "Overloads_Lib_Money_Add.htm".to_string()
            }
        );
        assert_eq!(link.text, LinkText::Plain("Add".to_string()));

        marker.prefer_overload = false;
        let direct = resolve(&context, &marker, Some("T:Other.Thing"));
        assert_eq!(direct.text, LinkText::Plain("Add(Money)".to_string()));
    }

    #[test]
    fn conversion_operators_keep_parameters() {
        let context = ResolverContext::default();
        let mut marker = ReferenceMarker::new("M:Lib.Money.op_Explicit(Lib.Money)~System.Decimal");
        marker.prefer_overload = true;
        marker.options = DisplayOptions::empty();
        let link = resolve(&context, &marker, None);
        assert_eq!(link.text, LinkText::Plain("Explicit(Money)".to_string()));
        assert_eq!(link.target.kind(), LinkKind::Local);
    }

    #[test]
    fn unknown_targets_render_the_raw_reference() {
        let context = ResolverContext::default();
        let link = resolve(&context, &ReferenceMarker::new("T:Nowhere.Missing"), None);
        assert_eq!(link.target, LinkTarget::None);
        assert_eq!(link.text, LinkText::Plain("Missing".to_string()));
    }

    #[test]
    fn external_without_endpoints_downgrades_to_none() {
        let context = ResolverContext::default();
        let link = resolve(&context, &ReferenceMarker::new("T:Lib.Ext"), None);
        assert_eq!(link.target, LinkTarget::None);
    }

    #[test]
    fn external_with_endpoints_links_out() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("endpoints.json");
        std::fs::write(&json, r#"{"T:Lib.Ext": "lib.ext"}"#).unwrap();
        let context = ResolverContext::new(
            IndexSettings::default(),
            ExternalConfig {
                endpoints: Some(json),
                settings: ExternalSettings::default(),
            },
            10,
        );
        let link = resolve(&context, &ReferenceMarker::new("T:Lib.Ext"), None);
        assert_eq!(
            link.target,
            LinkTarget::External {
                frame: "_blank".to_string(),
                url: "https://learn.microsoft.com/en-us/library/lib.ext".to_string(),
            }
        );
    }

    #[test]
    fn synthetic_ids_use_the_configured_format() {
        let context = ResolverContext::default();
        let link = resolve(&context, &ReferenceMarker::new("T:Lib.Id"), None);
        assert_eq!(
            link.target,
            LinkTarget::SyntheticId {
                uri: "ms-xhelp://?Id=T:Lib.Id".to_string()
            }
        );
        let resolver = LinkResolver::new(
            &context,
            collection(),
            ReferenceOptions {
                id_uri_format: "scheme://{0}#x".to_string(),
                ..ReferenceOptions::default()
            },
        );
        let link = resolver.resolve(&ReferenceMarker::new("T:Lib.Id"), None).unwrap();
        assert_eq!(
            link.target,
            LinkTarget::SyntheticId {
                uri: "scheme://T:Lib.Id#x".to_string()
            }
        );
    }

    #[test]
    fn synthetic_ids_escape_only_the_id() {
        let context = ResolverContext::default();
        let targets = TargetCollection::from_targets(vec![target(
            "T:Lib.Id#Part",
            "T_Lib_Id_Part",
            "Lib",
            LinkKind::SyntheticId,
        )]);
        let resolver = LinkResolver::new(
            &context,
            targets,
            ReferenceOptions {
                id_uri_format: "ms-xhelp://?Id={0}#content".to_string(),
                ..ReferenceOptions::default()
            },
        );
        let link = resolver.resolve(&ReferenceMarker::new("T:Lib.Id#Part"), None).unwrap();
        assert_eq!(
            link.target,
            LinkTarget::SyntheticId {
                uri: "ms-xhelp://?Id=T:Lib.Id%23Part#content".to_string()
            }
        );
    }

    #[test]
    fn base_url_makes_hrefs_relative() {
        let context = ResolverContext::default();
        let resolver = LinkResolver::new(
            &context,
            collection(),
            ReferenceOptions {
                base_url: Some("html/sub/{file}.htm".to_string()),
                href_format: "html/{0}.htm".to_string(),
                ..ReferenceOptions::default()
            },
        );
        let link = resolver.resolve(&ReferenceMarker::new("T:Lib.Gadget"), Some("T:Lib.Widget")).unwrap();
        assert_eq!(
            link.target,
            LinkTarget::Local {
                href: "../T_Lib_Gadget.htm".to_string()
            }
        );
    }

    #[test]
    fn text_precedence() {
        let context = ResolverContext::default();
        let mut marker = ReferenceMarker::new("T:Lib.Gadget");
        marker.contents = Some("<b>the gadget</b>".to_string());
        assert_eq!(
            resolve(&context, &marker, None).text,
            LinkText::Markup("<b>the gadget</b>".to_string())
        );

        marker.contents = Some("See {0} here".to_string());
        marker.display_target = Some(DisplayTarget::Format);
        assert_eq!(
            resolve(&context, &marker, None).text,
            LinkText::Markup("See Gadget here".to_string())
        );

        marker.contents = Some(r#"<type api="T:Lib.Widget"/>"#.to_string());
        marker.display_target = Some(DisplayTarget::Content);
        assert_eq!(resolve(&context, &marker, None).text, LinkText::Plain("Widget".to_string()));

        marker.contents = Some("M:Lib.Ext.Shout(System.String,System.Int32)".to_string());
        marker.display_target = Some(DisplayTarget::Extension);
        assert_eq!(resolve(&context, &marker, None).text, LinkText::Plain("Shout(Int32)".to_string()));

        marker.display_target = Some(DisplayTarget::Cer("T:Other.Thing".to_string()));
        assert_eq!(resolve(&context, &marker, None).text, LinkText::Plain("Thing".to_string()));
    }

    #[test]
    fn failures_are_dropped_per_marker() {
        let context = ResolverContext::default();
        let resolver = LinkResolver::new(&context, collection(), ReferenceOptions::default());
        let mut marker = ReferenceMarker::new("T:Lib.Gadget");
        marker.display_target = Some(DisplayTarget::Format);
        assert!(resolver.resolve(&marker, None).is_err());
        assert!(resolver.resolve_or_drop(&marker, None).is_none());
        assert!(resolver.resolve_or_drop(&ReferenceMarker::new("T:Lib.Gadget"), None).is_some());
        assert!(resolver.resolve(&ReferenceMarker::new(" "), None).is_err());
    }

    #[test]
    fn conceptual_fallback_and_anchors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(format!("{TOPIC}.cmp.xml")),
            format!(r#"<metadata><topic id="{TOPIC}"><title>Foo</title></topic></metadata>"#),
        )
        .unwrap();
        let context = ResolverContext::default();
        let cache = context.conceptual_cache(crate::context::BuilderKind::Reference);
        cache.register_directory(TargetDirectory::new(dir.path(), ConceptualLinkKind::Local));
        let resolver = LinkResolver::new(&context, collection(), ReferenceOptions::default())
            .with_conceptual(cache, ConceptualOptions::default());

        let anchored = resolver.resolve(&ReferenceMarker::new(format!("{TOPIC}#Section")), None).unwrap();
        assert_eq!(
            anchored.target,
            LinkTarget::Local {
                href: format!("{TOPIC}.htm#Section")
            }
        );
        assert_eq!(anchored.text, LinkText::Plain("Foo".to_string()));

        let bare = resolver.resolve_conceptual(TOPIC, None);
        assert_eq!(bare.target, LinkTarget::Local { href: format!("{TOPIC}.htm") });
    }

    #[test]
    fn broken_conceptual_links() {
        let context = ResolverContext::default();
        let cache = context.conceptual_cache(crate::context::BuilderKind::Conceptual);
        let resolver = LinkResolver::new(&context, collection(), ReferenceOptions::default())
            .with_conceptual(Arc::clone(&cache), ConceptualOptions::default());
        let invalid = resolver.resolve_conceptual("not-a-guid", Some("text"));
        assert_eq!(invalid.target, LinkTarget::None);
        assert_eq!(invalid.text, LinkText::Plain("[not-a-guid]".to_string()));

        let shown = LinkResolver::new(&context, collection(), ReferenceOptions::default()).with_conceptual(
            cache,
            ConceptualOptions {
                show_broken_link_text: true,
                ..ConceptualOptions::default()
            },
        );
        let unknown = shown.resolve_conceptual("00000000-0000-0000-0000-000000000000", Some("fallback"));
        assert_eq!(unknown.target, LinkTarget::None);
        assert_eq!(unknown.text, LinkText::Plain("fallback".to_string()));
    }

    #[test]
    fn conceptual_base_kind_and_show_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(format!("{TOPIC}.cmp.xml")),
            format!(r#"<metadata><topic id="{TOPIC}"><title>Foo</title></topic></metadata>"#),
        )
        .unwrap();
        let context = ResolverContext::default();
        let cache = context.conceptual_cache(crate::context::BuilderKind::Conceptual);
        cache.register_directory(TargetDirectory::new(dir.path(), ConceptualLinkKind::Local));
        let resolver = LinkResolver::new(&context, collection(), ReferenceOptions::default()).with_conceptual(
            cache,
            ConceptualOptions {
                base_kind: Some(ConceptualLinkKind::Index),
                show_text: true,
                ..ConceptualOptions::default()
            },
        );
        let link = resolver.resolve_conceptual(&TOPIC.to_uppercase(), Some("Custom"));
        assert_eq!(
            link.target,
            LinkTarget::Index {
                keyword: TOPIC.to_string()
            }
        );
        assert_eq!(link.text, LinkText::Plain("Custom".to_string()));
    }
}
