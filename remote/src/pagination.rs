//! `Link` header handling for paginated endpoints.
//!
//! GitHub advertises further pages as `<url>; rel="next", <url>; rel="last"`. Segments that do
//! not follow that shape are dropped, so a malformed header reads as "no further pages" and a
//! pagination loop terminates instead of spinning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Relation name to URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRelations(BTreeMap<String, String>);

impl LinkRelations {
    pub fn get(&self, rel: &str) -> Option<&str> {
        self.0.get(rel).map(String::as_str)
    }

    pub fn next(&self) -> Option<&str> {
        self.get("next")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

pub fn parse_link_header(value: &str) -> LinkRelations {
    let mut relations = BTreeMap::new();

    for segment in value.split(',') {
        match parse_segment(segment) {
            Some((url, rels)) => {
                for rel in rels {
                    relations.insert(rel, url.clone());
                }
            }
            None => debug!("Ignoring malformed link header segment: {:?}", segment),
        }
    }

    LinkRelations(relations)
}

fn parse_segment(segment: &str) -> Option<(String, Vec<String>)> {
    let mut parts = segment.split(';');

    let target = parts.next()?.trim();
    let url = target.strip_prefix('<')?.strip_suffix('>')?.trim();
    if url.is_empty() {
        return None;
    }

    let mut rels = Vec::new();
    for param in parts {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("rel") {
            continue;
        }
        let raw = raw.trim().trim_matches('"');
        // rel may carry several space separated relation types
        rels.extend(raw.split_whitespace().map(str::to_string));
    }

    if rels.is_empty() {
        None
    } else {
        Some((url.to_string(), rels))
    }
}
