//! Per-build resolver context: one target index, one lazily built external
//! url resolver, and one conceptual cache per builder kind.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use tracing::{error, info};

use crate::conceptual::ConceptualTargetCache;
use crate::error::Error;
use crate::external::{Endpoints, ExternalSettings, ExternalUrlResolver};
use crate::index::{IndexSettings, TargetCollection, TargetIndex};

/// Build flavor keying the shared conceptual caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderKind {
    /// Narrative topic builds.
    Conceptual,
    /// API reference builds.
    Reference,
}

impl FromStr for BuilderKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        return match value.trim().to_ascii_lowercase().as_str() {
            "conceptual" => Ok(Self::Conceptual),
            "reference" => Ok(Self::Reference),
            _ => Err(Error::InvalidConfig {
                reason: format!("`{value}` is not a builder kind (expected conceptual or reference)"),
            }),
        };
    }
}

impl fmt::Display for BuilderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(match self {
            Self::Conceptual => "conceptual",
            Self::Reference => "reference",
        });
    }
}

/// How to build the external url resolver when it is first needed.
#[derive(Debug, Clone, Default)]
pub struct ExternalConfig {
    /// JSON endpoint map; when absent the persisted store's endpoints are used.
    pub endpoints: Option<PathBuf>,
    /// Url formatting settings.
    pub settings: ExternalSettings,
}

/// Shared state for one build, passed explicitly to every stage.
#[derive(Debug)]
pub struct ResolverContext {
    /// One cache per builder kind.
    conceptual: HashMap<BuilderKind, Arc<ConceptualTargetCache>>,
    /// Built on first use.
    external: OnceLock<Arc<ExternalUrlResolver>>,
    /// Inputs for building `external`.
    external_config: ExternalConfig,
    /// The target index.
    index: TargetIndex,
}

impl ResolverContext {
    /// A context with empty caches of the given capacity.
    pub fn new(index: IndexSettings, external: ExternalConfig, cache_capacity: usize) -> Self {
        let conceptual = [BuilderKind::Conceptual, BuilderKind::Reference]
            .into_iter()
            .map(|kind| return (kind, Arc::new(ConceptualTargetCache::new(cache_capacity))))
            .collect();
        return Self {
            conceptual,
            external: OnceLock::new(),
            external_config: external,
            index: TargetIndex::new(index),
        };
    }

    /// The target index.
    pub fn index(&self) -> &TargetIndex {
        return &self.index;
    }

    /// The conceptual cache shared by every stage of `kind`.
    pub fn conceptual_cache(&self, kind: BuilderKind) -> Arc<ConceptualTargetCache> {
        return self
            .conceptual
            .get(&kind)
            .map_or_else(|| return Arc::new(ConceptualTargetCache::default()), Arc::clone);
    }

    /// The external url resolver, built on the first call.
    pub fn external(&self, targets: &TargetCollection) -> Arc<ExternalUrlResolver> {
        return Arc::clone(self.external.get_or_init(|| {
            info!("creating external url resolver");
            return Arc::new(self.build_external(targets));
        }));
    }

    /// Pick the endpoint source: explicit JSON file, then the persisted store.
    fn build_external(&self, targets: &TargetCollection) -> ExternalUrlResolver {
        let config = &self.external_config;
        if !config.settings.enabled {
            return ExternalUrlResolver::disabled();
        }
        let endpoints = if let Some(path) = &config.endpoints {
            Endpoints::from_json_file(path).unwrap_or_else(|e| {
                error!(path = %path.display(), error = %e, "cannot load external endpoints");
                return Endpoints::Absent;
            })
        } else {
            match targets.persisted() {
                Some(store) if store.has_endpoints().unwrap_or(false) => Endpoints::Store(Arc::clone(store)),
                _ => Endpoints::Absent,
            }
        };
        return ExternalUrlResolver::new(config.settings.clone(), endpoints);
    }
}

impl Default for ResolverContext {
    fn default() -> Self {
        return Self::new(
            IndexSettings::default(),
            ExternalConfig::default(),
            crate::conceptual::DEFAULT_CAPACITY,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conceptual::TargetDirectory;
    use crate::types::ConceptualLinkKind;

    #[test]
    fn builder_kinds_share_one_cache_each() {
        let context = ResolverContext::default();
        let first = context.conceptual_cache(BuilderKind::Conceptual);
        first.register_directory(TargetDirectory::new("/topics", ConceptualLinkKind::Local));
        assert_eq!(context.conceptual_cache(BuilderKind::Conceptual).directory_count(), 1);
        assert_eq!(context.conceptual_cache(BuilderKind::Reference).directory_count(), 0);
    }

    #[test]
    fn builder_kind_parses() {
        assert_eq!("Reference".parse::<BuilderKind>().unwrap(), BuilderKind::Reference);
        assert!("plugin".parse::<BuilderKind>().is_err());
    }

    #[test]
    fn external_resolver_is_built_once() {
        let context = ResolverContext::default();
        let targets = context.index().load(&[]);
        let first = context.external(&targets);
        let second = context.external(&targets);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.is_enabled());
    }
}
