use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::{analyze, DocumentAnalysis};

/// Per-document analysis cache, keyed by document identity and version. An
/// edit bumps the version and replaces the whole entry; a stale tree is never
/// mutated in place or served for a newer version. Constructor-injected by
/// the host, never a module-level singleton.
#[derive(Default)]
pub struct AnalysisCache {
    entries: DashMap<String, CacheEntry>,
}

struct CacheEntry {
    version: i32,
    analysis: Arc<DocumentAnalysis>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Cached analysis, only on an exact version match.
    pub fn get(&self, id: &str, version: i32) -> Option<Arc<DocumentAnalysis>> {
        self.entries
            .get(id)
            .filter(|e| e.version == version)
            .map(|e| Arc::clone(&e.analysis))
    }

    /// Replace the cached entry for this document unless it already holds a
    /// newer version; a late-arriving insert for an old version is dropped.
    pub fn insert(&self, id: &str, version: i32, analysis: Arc<DocumentAnalysis>) {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let have = occupied.get().version;
                if version < have {
                    debug!(id, have, stale = version, "ignoring stale analysis insert");
                    return;
                }
                occupied.insert(CacheEntry { version, analysis });
                debug!(id, old = have, new = version, "replaced cached analysis");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry { version, analysis });
            }
        }
    }

    /// Cached result for (id, version), or run the pipeline and cache it.
    pub fn get_or_analyze(&self, id: &str, version: i32, text: &str) -> Arc<DocumentAnalysis> {
        if let Some(hit) = self.get(id, version) {
            return hit;
        }
        let analysis = Arc::new(analyze(text));
        self.insert(id, version, Arc::clone(&analysis));
        analysis
    }

    pub fn evict(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
