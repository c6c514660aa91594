//! Gateway middleware stack, outer to inner (spec §4.13): correlation id,
//! security headers, IP rate limit, auth, key rate limit, quota,
//! idempotency lookup, handler, response envelope, metrics.

pub mod auth;
pub mod envelope;
pub mod idempotency;
pub mod metrics;
pub mod quota;
pub mod rate_limit;
pub mod request_tracking;
pub mod security_headers;

pub use auth::auth_middleware;
pub use envelope::envelope_middleware;
pub use idempotency::idempotency_middleware;
pub use metrics::metrics_middleware;
pub use quota::quota_middleware;
pub use rate_limit::{ip_rate_limit_middleware, key_rate_limit_middleware, key_rph_rate_limit_middleware};
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
pub use security_headers::apply_security_headers;
