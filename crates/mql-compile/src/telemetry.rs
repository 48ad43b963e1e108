//! Tracing initialisation for the `mql-compile` binary.
//!
//! Log lines go to stderr so stdout stays free for CI workflow commands.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "MQL_COMPILE_LOG";

/// Initialise the global tracing subscriber.
///
/// `MQL_COMPILE_LOG` (then `RUST_LOG`) overrides the default level, which is
/// DEBUG when `verbose` is set and INFO otherwise. `json` switches to
/// newline-delimited JSON. Only the first call takes effect.
pub fn init_tracing(json: bool, verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
