//! Name and tag filtering applied to fetched server sets.
//!
//! Filtering is a pure function of the input set and the filter config:
//! the same inputs always yield a byte-identical output registry. Name
//! patterns are path-style globs (`*`, `?`), tag patterns are exact
//! matches. Exclusion always wins over inclusion.

use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::types::{ServerJson, UpstreamRegistry};
use glob::Pattern;
use sha2::{Digest, Sha256};

/// A filter with all glob patterns pre-compiled. Compilation fails up front
/// so a malformed pattern rejects the whole filter instead of silently
/// including or excluding servers.
pub struct CompiledFilter {
    name_include: Vec<Pattern>,
    name_exclude: Vec<Pattern>,
    tag_include: Vec<String>,
    tag_exclude: Vec<String>,
}

impl CompiledFilter {
    pub fn compile(filter: &FilterConfig) -> Result<Self> {
        Ok(Self {
            name_include: compile_patterns(&filter.names.include)?,
            name_exclude: compile_patterns(&filter.names.exclude)?,
            tag_include: filter.tags.include.clone(),
            tag_exclude: filter.tags.exclude.clone(),
        })
    }

    /// Whether a server survives the filter.
    fn matches(&self, server: &ServerJson) -> bool {
        if self.name_exclude.iter().any(|p| p.matches(&server.name)) {
            return false;
        }
        if !self.name_include.is_empty()
            && !self.name_include.iter().any(|p| p.matches(&server.name))
        {
            return false;
        }
        if server
            .tags
            .iter()
            .any(|tag| self.tag_exclude.iter().any(|ex| ex == tag))
        {
            return false;
        }
        if !self.tag_include.is_empty()
            && !server
                .tags
                .iter()
                .any(|tag| self.tag_include.iter().any(|inc| inc == tag))
        {
            return false;
        }
        true
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw)
                .map_err(|e| Error::FilterInvalid(format!("bad glob {:?}: {}", raw, e)))
        })
        .collect()
}

/// Apply a filter to a fetched registry, dropping failed servers from the
/// server sequence. A `None` filter passes everything through unchanged.
pub fn apply_filters(
    mut registry: UpstreamRegistry,
    filter: Option<&FilterConfig>,
) -> Result<UpstreamRegistry> {
    let Some(filter) = filter else {
        return Ok(registry);
    };

    let compiled = CompiledFilter::compile(filter)?;
    let before = registry.servers.len();
    registry.servers.retain(|server| compiled.matches(server));

    if registry.servers.len() != before {
        tracing::debug!(
            dropped = before - registry.servers.len(),
            kept = registry.servers.len(),
            "filter removed servers"
        );
    }

    Ok(registry)
}

/// Hash of the canonical filter encoding, used to detect filter changes
/// between syncs. Glob and tag lists are sorted first so equivalent filters
/// compare equal regardless of declaration order.
pub fn canonical_filter_hash(filter: Option<&FilterConfig>) -> String {
    let mut canonical = filter.cloned().unwrap_or_default();
    canonical.names.include.sort();
    canonical.names.exclude.sort();
    canonical.tags.include.sort();
    canonical.tags.exclude.sort();

    // serialization of a plain struct of string vectors cannot fail
    let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
    format!("{:x}", Sha256::digest(&encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NameFilter, TagFilter};

    fn server(name: &str, tags: &[&str]) -> ServerJson {
        ServerJson {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn registry(servers: Vec<ServerJson>) -> UpstreamRegistry {
        UpstreamRegistry {
            servers,
            ..Default::default()
        }
    }

    #[test]
    fn include_and_exclude_combine() {
        let filter = FilterConfig {
            names: NameFilter {
                include: vec!["prod-*".to_string()],
                exclude: vec![],
            },
            tags: TagFilter {
                include: vec![],
                exclude: vec!["experimental".to_string()],
            },
        };
        let input = registry(vec![
            server("prod-db", &["prod"]),
            server("prod-exp", &["prod", "experimental"]),
            server("dev-db", &["dev"]),
        ]);

        let out = apply_filters(input, Some(&filter)).unwrap();
        let names: Vec<_> = out.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["prod-db"]);
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = FilterConfig {
            names: NameFilter {
                include: vec!["prod-*".to_string()],
                exclude: vec!["prod-db".to_string()],
            },
            tags: TagFilter::default(),
        };
        let out = apply_filters(
            registry(vec![server("prod-db", &[]), server("prod-web", &[])]),
            Some(&filter),
        )
        .unwrap();
        assert_eq!(out.servers.len(), 1);
        assert_eq!(out.servers[0].name, "prod-web");
    }

    #[test]
    fn tag_include_requires_any_match() {
        let filter = FilterConfig {
            names: NameFilter::default(),
            tags: TagFilter {
                include: vec!["prod".to_string()],
                exclude: vec![],
            },
        };
        let out = apply_filters(
            registry(vec![server("a", &["prod", "db"]), server("b", &["dev"])]),
            Some(&filter),
        )
        .unwrap();
        assert_eq!(out.servers.len(), 1);
        assert_eq!(out.servers[0].name, "a");
    }

    #[test]
    fn malformed_glob_rejects_whole_filter() {
        let filter = FilterConfig {
            names: NameFilter {
                include: vec!["[invalid".to_string()],
                exclude: vec![],
            },
            tags: TagFilter::default(),
        };
        let result = apply_filters(registry(vec![server("a", &[])]), Some(&filter));
        assert!(matches!(result, Err(Error::FilterInvalid(_))));
    }

    #[test]
    fn no_filter_passes_everything() {
        let input = registry(vec![server("a", &[]), server("b", &[])]);
        let out = apply_filters(input.clone(), None).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn filtering_is_deterministic() {
        let filter = FilterConfig {
            names: NameFilter {
                include: vec!["*".to_string()],
                exclude: vec!["b".to_string()],
            },
            tags: TagFilter::default(),
        };
        let input = registry(vec![server("a", &[]), server("b", &[]), server("c", &[])]);
        let first = apply_filters(input.clone(), Some(&filter)).unwrap();
        let second = apply_filters(input, Some(&filter)).unwrap();
        assert_eq!(
            first.content_hash().unwrap(),
            second.content_hash().unwrap()
        );
    }

    #[test]
    fn equivalent_filters_hash_equal() {
        let a = FilterConfig {
            names: NameFilter {
                include: vec!["x".to_string(), "y".to_string()],
                exclude: vec![],
            },
            tags: TagFilter::default(),
        };
        let b = FilterConfig {
            names: NameFilter {
                include: vec!["y".to_string(), "x".to_string()],
                exclude: vec![],
            },
            tags: TagFilter::default(),
        };
        assert_eq!(
            canonical_filter_hash(Some(&a)),
            canonical_filter_hash(Some(&b))
        );
    }

    #[test]
    fn none_and_default_filter_hash_equal() {
        assert_eq!(
            canonical_filter_hash(None),
            canonical_filter_hash(Some(&FilterConfig::default()))
        );
    }
}
