//! Tenant authentication: API key generation/verification and the
//! redaction helper used before sensitive payloads reach logs (spec §4.3).

pub mod api_keys;
pub mod redact;

pub use api_keys::{ApiKey, ApiKeyGenerator, AuthenticatedTenant};
