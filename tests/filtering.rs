//! Filter pipeline integration: normalized ToolHive documents (container
//! and remote collections) flowing through name and tag filters.

mod common;

use mcpsync::config::{FilterConfig, NameFilter, TagFilter};
use mcpsync::filter::{apply_filters, canonical_filter_hash};
use mcpsync::types::toolhive::ToolhiveRegistry;

fn normalized() -> mcpsync::types::UpstreamRegistry {
    let document: ToolhiveRegistry =
        serde_json::from_value(common::toolhive_document()).unwrap();
    document.into_upstream()
}

#[test]
fn name_include_and_tag_exclude_compose() {
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

    let result = apply_filters(normalized(), Some(&filter)).unwrap();
    let names: Vec<_> = result.servers.iter().map(|s| s.name.as_str()).collect();

    // dev-db dropped by name, prod-exp dropped by tag; the remote-backed
    // prod-search passes both
    assert_eq!(names, vec!["prod-db", "prod-search"]);
}

#[test]
fn filters_apply_to_remote_backed_servers_too() {
    let filter = FilterConfig {
        names: NameFilter {
            include: vec![],
            exclude: vec!["prod-search".to_string()],
        },
        tags: TagFilter::default(),
    };

    let result = apply_filters(normalized(), Some(&filter)).unwrap();
    assert!(result.servers.iter().all(|s| s.name != "prod-search"));
    assert_eq!(result.servers.len(), 3);
}

#[test]
fn filtered_output_is_byte_identical_across_runs() {
    let filter = FilterConfig {
        names: NameFilter {
            include: vec!["prod-*".to_string()],
            exclude: vec![],
        },
        tags: TagFilter::default(),
    };

    let first = apply_filters(normalized(), Some(&filter)).unwrap();
    let second = apply_filters(normalized(), Some(&filter)).unwrap();
    assert_eq!(
        first.canonical_json().unwrap(),
        second.canonical_json().unwrap()
    );
}

#[test]
fn filter_hash_is_order_insensitive_but_content_sensitive() {
    let mut filter = FilterConfig {
        names: NameFilter {
            include: vec!["b".to_string(), "a".to_string()],
            exclude: vec![],
        },
        tags: TagFilter::default(),
    };
    let hash = canonical_filter_hash(Some(&filter));

    filter.names.include.reverse();
    assert_eq!(hash, canonical_filter_hash(Some(&filter)));

    filter.names.include.push("c".to_string());
    assert_ne!(hash, canonical_filter_hash(Some(&filter)));
}
