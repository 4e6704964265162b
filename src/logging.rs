//! Log output for the server binary.

use crate::Env;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_directive(env: Env) -> &'static str {
    match env {
        Env::Local | Env::Dev => "tcpchat=debug,info",
        Env::Prod => "info",
    }
}

/// Install the global subscriber. Local and dev deployments get human
/// readable output at debug level, prod gets JSON lines at info level.
/// `RUST_LOG` overrides the level in every environment.
pub fn init(env: Env) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(env)));

    let (pretty, json) = match env {
        Env::Local | Env::Dev => (Some(tracing_subscriber::fmt::layer().pretty()), None),
        Env::Prod => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
}
