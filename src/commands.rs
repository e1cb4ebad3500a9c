//! CLI commands for reflink: index, resolve, topic, render.

use std::path::Path;
use std::process::ExitCode;

use tracing::info;

use crate::config::Config;
use crate::conceptual::{ConceptualLookup, split_anchor};
use crate::context::ResolverContext;
use crate::error::Error;
use crate::external::import_endpoints;
use crate::markup;
use crate::resolver::LinkResolver;
use crate::scanner;
use crate::types::{DisplayOptions, DisplayTarget, ReferenceMarker};

/// Marker settings for `reflink resolve`.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Literal marker contents.
    pub contents: Option<String>,
    /// `display-target` attribute value.
    pub display_target: Option<String>,
    /// Id of the referencing document.
    pub from: Option<String>,
    /// Rendering flags.
    pub options: DisplayOptions,
    /// Redirect members to their overload topic.
    pub prefer_overload: bool,
    /// Requested target id.
    pub target: String,
}

/// Load every configured source, importing external endpoints into the
/// persisted store when both are configured.
///
/// # Errors
///
/// Returns `Error::Io`, `Error::Json` or `Error::Store` if the endpoint
/// import fails. Source errors are logged and skipped.
pub fn cmd_index(config: &Config) -> Result<ExitCode, Error> {
    let context = config.context();
    let targets = context.index().load(&config.sources);

    if let (Some(store), Some(endpoints)) = (targets.persisted(), &config.external.endpoints) {
        let count = import_endpoints(store, endpoints)?;
        info!(count, path = %endpoints.display(), "imported external endpoints");
    }

    println!("Indexed {} targets", targets.len());
    return Ok(ExitCode::SUCCESS);
}

/// Resolve one reference and print its markup.
/// Exits 1 when the marker cannot be rendered.
///
/// # Errors
///
/// Returns `Error::InvalidTarget` for an empty id.
pub fn cmd_resolve(config: &Config, request: ResolveRequest) -> Result<ExitCode, Error> {
    let context = config.context();
    let resolver = resolver_for(config, &context);

    let mut marker = ReferenceMarker::new(request.target);
    marker.contents = request.contents;
    marker.display_target = request.display_target.as_deref().and_then(DisplayTarget::parse);
    marker.options = request.options;
    marker.prefer_overload = request.prefer_overload;

    let link = match resolver.resolve(&marker, request.from.as_deref()) {
        Ok(link) => link,
        Err(e @ Error::InvalidTarget { .. }) => return Err(e),
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        },
    };
    println!("{}", markup::render(&link));
    return Ok(ExitCode::SUCCESS);
}

/// Resolve a conceptual topic id (with optional `#anchor`) and print its
/// markup. Exits 1 when the topic is unknown or the id malformed.
///
/// # Errors
///
/// Returns `Error::UnknownTarget` when no directories are configured.
pub fn cmd_topic(config: &Config, target: &str, text: Option<&str>) -> Result<ExitCode, Error> {
    if config.conceptual.directories.is_empty() {
        return Err(Error::UnknownTarget { id: target.to_string() });
    }
    let context = config.context();
    let resolver = resolver_for(config, &context);
    let cache = context.conceptual_cache(config.conceptual.builder);

    let found = matches!(cache.resolve(split_anchor(target).0), ConceptualLookup::Found(_));
    println!("{}", markup::render(&resolver.resolve_conceptual(target, text)));
    return Ok(if found { ExitCode::SUCCESS } else { ExitCode::FAILURE });
}

/// Rewrite the markers in one page, printing the result or writing it to
/// `output`.
///
/// # Errors
///
/// Returns `Error::Io` if the page cannot be read or the output written.
pub fn cmd_render(config: &Config, page: &Path, key: Option<&str>, output: Option<&Path>) -> Result<ExitCode, Error> {
    let content = std::fs::read_to_string(page)?;
    let context = config.context();
    let resolver = resolver_for(config, &context);

    let rendered = scanner::render_page(&content, &resolver, key);
    match output {
        Some(path) => std::fs::write(path, rendered)?,
        None => print!("{rendered}"),
    }
    return Ok(ExitCode::SUCCESS);
}

/// A resolver over the loaded targets with the configured conceptual fallback.
fn resolver_for<'ctx>(config: &Config, context: &'ctx ResolverContext) -> LinkResolver<'ctx> {
    let targets = context.index().load(&config.sources);
    return LinkResolver::new(context, targets, config.reference.clone()).with_conceptual(
        context.conceptual_cache(config.conceptual.builder),
        config.conceptual.options.clone(),
    );
}
