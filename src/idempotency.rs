//! Idempotency cache (spec §4.6): keyed response memoisation with
//! request-fingerprint conflict detection, covering non-streaming requests
//! that carry an `Idempotency-Key` header.

use sha2::{Digest, Sha256};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    repository::IdempotencyRepository,
    state::AppState,
};

/// A stored response replayed verbatim, headers included.
pub struct Replayed {
    pub body: Value,
    pub headers: Value,
}

pub enum Lookup {
    /// No record: the caller should proceed with the upstream call.
    Miss,
    /// A prior response for an identical request: replay it verbatim.
    Replay(Replayed),
}

/// `sha256(canonical_json(body \ {metadata, stream}))` (spec §4.6). Field
/// order is normalised by re-serializing through a `BTreeMap`, so two
/// requests that differ only in key order hash identically.
pub fn request_hash(body: &Value) -> String {
    let canonical = canonicalize(body);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize(body: &Value) -> String {
    let mut trimmed = body.clone();
    if let Some(obj) = trimmed.as_object_mut() {
        obj.remove("metadata");
        obj.remove("stream");
    }
    let ordered: std::collections::BTreeMap<String, Value> = trimmed
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    serde_json::to_string(&ordered).unwrap_or_default()
}

/// Looks up an idempotency key against the stored fingerprint. Returns
/// `Err(Error::Conflict)` when the same key was reused with a different
/// request body or a different caller.
pub async fn lookup(
    state: &AppState,
    idempotency_key: &str,
    api_key_hash: &str,
    body: &Value,
) -> Result<Lookup> {
    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let repo = IdempotencyRepository::new(&db);

    let Some(record) = repo.find(idempotency_key).await? else {
        return Ok(Lookup::Miss);
    };

    let hash = request_hash(body);
    if record.api_key_hash != api_key_hash {
        return Err(Error::Conflict {
            message: "idempotency key reused with a different request".to_string(),
            details: Some(serde_json::json!({"field": "api_key_hash"})),
        });
    }
    if record.request_hash != hash {
        return Err(Error::Conflict {
            message: "idempotency key reused with a different request".to_string(),
            details: Some(serde_json::json!({"field": "request_hash"})),
        });
    }

    Ok(Lookup::Replay(Replayed { body: record.response_body, headers: record.headers }))
}

/// Stores the response on success. A crash before this runs just means a
/// retry triggers a fresh upstream call (spec §5 ordering guarantees).
pub async fn store(
    state: &AppState,
    idempotency_key: &str,
    api_key_hash: &str,
    body: &Value,
    response_body: &Value,
    headers: &Value,
) -> Result<()> {
    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let repo = IdempotencyRepository::new(&db);
    let hash = request_hash(body);
    repo.store(idempotency_key, api_key_hash, &hash, response_body, headers).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({"model": "gpt-4o", "messages": []});
        let b = json!({"messages": [], "model": "gpt-4o"});
        assert_eq!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn hash_ignores_metadata_and_stream() {
        let a = json!({"model": "gpt-4o"});
        let b = json!({"model": "gpt-4o", "metadata": {"trace": "x"}, "stream": true});
        assert_eq!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn hash_differs_on_substantive_change() {
        let a = json!({"model": "gpt-4o"});
        let b = json!({"model": "gpt-4o-mini"});
        assert_ne!(request_hash(&a), request_hash(&b));
    }
}
