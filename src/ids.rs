//! Identifier formats used across the gateway and memory engine.
//!
//! Request IDs are time-sortable (UUIDv7) for log correlation. Context-memory
//! IDs are content-derived so re-ingesting identical material converges
//! without duplication (spec §4.7).

use http::Request;
use std::fmt;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};
use uuid::Uuid;

/// A time-sortable request identifier, prefixed `req_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(format!("req_{}", Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// `MakeRequestId` adapter so `tower_http::request_id` generates `RequestId`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let id = RequestId::new();
        let header_value = http::HeaderValue::from_str(id.as_str()).ok()?;
        Some(TowerRequestId::new(header_value))
    }
}

/// The first 6 bytes (12 hex chars) of `sha256(content)`, used as the suffix
/// for semantic and episodic item IDs.
fn content_hash12(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..6])
}

/// Semantic item ID: `S<12-hex>`, derived from `(kind, normalised title)`.
pub fn semantic_id(kind: &str, normalised_title: &str) -> String {
    format!("S{}", content_hash12(&format!("{kind}\u{1}{normalised_title}")))
}

/// Episodic item ID: `E<12-hex>`, derived from the chunk's own content.
pub fn episodic_id(content: &str) -> String {
    format!("E{}", content_hash12(content))
}

/// Artifact reference: `CODE:<path>#L<start>-L<end>`.
///
/// `path` must be POSIX-like and must not contain `..` segments; callers are
/// expected to have validated this already (see `memory::extractor`).
pub fn artifact_ref(path: &str, start: u32, end: u32) -> String {
    format!("CODE:{path}#L{start}-L{end}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_has_prefix() {
        let id = RequestId::new();
        assert!(id.as_str().starts_with("req_"));
    }

    #[test]
    fn semantic_id_is_deterministic() {
        let a = semantic_id("decision", "use postgres");
        let b = semantic_id("decision", "use postgres");
        assert_eq!(a, b);
        assert!(a.starts_with('S'));
    }

    #[test]
    fn episodic_id_changes_with_content() {
        let a = episodic_id("turn one");
        let b = episodic_id("turn two");
        assert_ne!(a, b);
        assert!(a.starts_with('E'));
    }

    #[test]
    fn artifact_ref_format() {
        assert_eq!(artifact_ref("src/lib.rs", 10, 20), "CODE:src/lib.rs#L10-L20");
    }
}
