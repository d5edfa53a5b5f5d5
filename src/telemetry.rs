// src/telemetry.rs
// =============================================================================
// Log setup for the binary.
//
// Everything inside the library logs through `tracing`. This installs the
// subscriber: RUST_LOG if set, otherwise "info,sitewarden=debug". Output
// goes to stderr so stdout stays clean for --json.
// =============================================================================

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,sitewarden=debug";

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second init (tests, embedding) is not an error worth surfacing.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
