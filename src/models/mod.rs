//! Model resolution and provider catalogue synchronisation (spec §4.4, §4.12).

pub mod catalogue_sync;
pub mod resolver;

pub use catalogue_sync::{sync_catalogue, SyncReport};
pub use resolver::{resolve_model, Purpose};
