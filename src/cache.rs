//! Memoization of ranked candidate lists.
//!
//! Binding plans are purely type-level, so a ranked candidate list is valid
//! for every request with the same target and argument type signature. Hot
//! call sites (iterative pipelines resolving the same op per frame) skip the
//! registry scan entirely. Entries are invalidated only by registry rebuild
//! — an environment owns its cache and dies with it — never by individual
//! calls.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::matcher::{MatchCandidate, OpRequest, RequestTarget};
use crate::types::TypeKey;

/// Cache key: request target plus argument type signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    target: TargetKey,
    signature: Vec<TypeKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TargetKey {
    Name(String),
    Capability(TypeKey),
}

impl CacheKey {
    pub(crate) fn for_request(request: &OpRequest) -> Self {
        let target = match request.target() {
            RequestTarget::Name(name) => TargetKey::Name(name.clone()),
            RequestTarget::Capability(key) => TargetKey::Capability(*key),
        };
        Self {
            target,
            signature: request.type_signature(),
        }
    }
}

/// Thread-safe memo of ranked candidate lists.
///
/// Reads are shared; a write never blocks unrelated resolutions for longer
/// than the map insert.
#[derive(Debug, Default)]
pub(crate) struct ResolutionCache {
    entries: RwLock<HashMap<CacheKey, Arc<Vec<MatchCandidate>>>>,
}

impl ResolutionCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<Arc<Vec<MatchCandidate>>> {
        self.entries.read().get(key).cloned()
    }

    pub(crate) fn put(&self, key: CacheKey, candidates: Arc<Vec<MatchCandidate>>) {
        self.entries.write().insert(key, candidates);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
