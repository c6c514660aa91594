//! Outbound calls to the upstream model provider (spec §4.5).

pub mod client;
pub mod streaming;

pub use client::{call_upstream, UnaryResponse};
pub use streaming::{estimate_tokens, relay_stream, StreamOutcome};
