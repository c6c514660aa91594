//! Concrete repositories backing the gateway's Postgres-resident state:
//! tenants, API keys, model catalogue, context-memory items, idempotency
//! records, and the usage ledger.

pub mod api_keys;
pub mod catalogue;
pub mod context_items;
pub mod idempotency;
pub mod tenants;
pub mod usage;

pub use api_keys::{ApiKeyRecord, ApiKeyRepository};
pub use catalogue::{CatalogueEntry, CatalogueRepository, ModelStatus};
pub use context_items::{ContextItemRepository, UsageField};
pub use idempotency::{IdempotencyRecord, IdempotencyRepository};
pub use tenants::TenantRepository;
pub use usage::{Direction, UsageRepository};
