use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::collection::Entity;
use crate::query::error::QueryError;
use crate::query::predicate;
use crate::query::sort::{self, SortSpec};
use crate::schema::SchemaRegistry;

/// One page of query results plus the authoritative totals.
#[derive(Debug, Clone, PartialEq)]
pub struct FindResult {
    pub entities: Vec<Value>,
    pub total: u64,
    pub pages: u64,
}

impl FindResult {
    /// First match, the `find_one` convenience.
    pub fn first(&self) -> Option<&Value> {
        self.entities.first()
    }
}

/// Orchestrates "find/count" requests: decides when a server search
/// round-trip is needed and computes the local page either way.
///
/// Remote-sourced collections (those with a registered schema) are searched
/// server-side first so the local data is a confirmed superset; the page
/// itself is always computed locally. A content hash of `(collection, query)`
/// short-circuits repeated identical searches within a session.
pub struct LocalQueryExecutor {
    schemas: Option<Rc<SchemaRegistry>>,
    search_hashes: HashSet<u64>,
    primed: HashSet<String>,
}

impl LocalQueryExecutor {
    pub fn new(schemas: Option<Rc<SchemaRegistry>>) -> Self {
        Self {
            schemas,
            search_hashes: HashSet::new(),
            primed: HashSet::new(),
        }
    }

    /// Whether this collection lives in the remote store at all.
    pub fn is_remote_sourced(&self, collection: &str) -> bool {
        self.schemas
            .as_ref()
            .map(|registry| registry.has(collection))
            .unwrap_or(false)
    }

    pub fn should_search(&self, collection: &str, query: &Value) -> bool {
        !self.search_hashes.contains(&query_hash(collection, query))
    }

    pub fn record_search(&mut self, collection: &str, query: &Value) {
        self.search_hashes.insert(query_hash(collection, query));
    }

    /// Whole-collection fetches are only worth doing once per session.
    pub fn should_load_all(&self, collection: &str) -> bool {
        !self.primed.contains(collection)
    }

    pub fn record_load_all(&mut self, collection: &str) {
        self.primed.insert(collection.to_string());
    }

    /// Filter, sort and page the local data. `server_total` is the count the
    /// store reported for the query; without it the local match count is the
    /// total.
    pub fn run_local(
        &self,
        entities: &[Entity],
        query: &Value,
        limit: u64,
        skip: u64,
        sort_spec: Option<&SortSpec>,
        server_total: Option<u64>,
    ) -> Result<FindResult, QueryError> {
        let refs: Vec<&Value> = entities.iter().map(Entity::value).collect();
        let mut matched = predicate::evaluate(query, refs)?;
        if let Some(spec) = sort_spec {
            sort::sort_values(&mut matched, spec);
        }

        let total = server_total.unwrap_or(matched.len() as u64);
        let pages = if limit > 0 { total.div_ceil(limit) } else { 0 };

        let page: Vec<Value> = if limit > 0 {
            matched
                .into_iter()
                .skip(skip as usize)
                .take(limit as usize)
                .cloned()
                .collect()
        } else {
            matched.into_iter().cloned().collect()
        };

        Ok(FindResult {
            entities: page,
            total,
            pages,
        })
    }
}

/// Content hash of a (collection, query) pair. Object keys serialize in
/// sorted order, so structurally-identical queries hash identically.
fn query_hash(collection: &str, query: &Value) -> u64 {
    let canonical = serde_json::to_string(query).unwrap_or_default();
    xxh3_64(format!("{collection}{canonical}").as_bytes())
}
