//! Stamps the generated request id into the envelope body's `meta.request_id`
//! (spec §4.13). Handlers build `Envelope<T>` with `Meta::placeholder()`,
//! which leaves `request_id` empty since the id is only known to
//! `request_tracking`'s tower layer; this middleware closes that gap.
//!
//! Streaming responses (`text/event-stream`) are exempt from envelope
//! wrapping (spec §4.13) and pass through untouched.

use axum::{
    body::Body,
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;

pub async fn envelope_middleware(request: Request<Body>, next: Next) -> Response {
    let response = next.run(request).await;

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if !is_json {
        return response;
    }

    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(request_id) = request_id else { return response };

    let (parts, body) = response.into_parts();
    let Ok(collected) = body.collect().await else {
        return Response::from_parts(parts, Body::empty());
    };
    let bytes = collected.to_bytes();

    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    if let Some(meta) = value.get_mut("meta").and_then(|m| m.as_object_mut()) {
        meta.insert("request_id".to_string(), serde_json::Value::String(request_id));
    }

    let Ok(patched) = serde_json::to_vec(&value) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    Response::from_parts(parts, Body::from(patched))
}
