//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::SagaConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.log_level` when set. Output is JSON when
/// `config.log_json` is set, plain text otherwise. Returns false if a
/// subscriber was already installed, so repeated calls are harmless.
pub fn init(config: &SagaConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (json, plain) = if config.log_json {
        (Some(fmt::layer().json().with_current_span(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(false)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
        .is_ok()
}
