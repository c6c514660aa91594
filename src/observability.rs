//! `tracing` initialization (ambient stack, SPEC_FULL §2).

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initialize the global tracing subscriber. Safe to call multiple times;
/// later calls are no-ops, guarded by `std::sync::Once`.
pub fn init_tracing(config: &Config) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();

        tracing::info!(
            environment = %config.server.environment,
            "tracing initialized for cmg-gateway"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic() {
        let config = Config::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}
