//! Server-sent events support, used by `upstream::streaming` to relay
//! provider chat-completion chunks to clients.

pub use axum::response::sse::{Event, KeepAlive, Sse};
