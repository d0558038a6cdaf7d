use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber for the relay binary.
///
/// An unparsable filter falls back to `info`. Returns false when another
/// subscriber was already installed.
pub fn init_tracing(filter: &str) -> bool {
    let env_filter = match EnvFilter::try_new(filter) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("invalid log filter {filter:?} ({err}), using info");
            EnvFilter::new("info")
        }
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().compact())
        .try_init()
        .is_ok()
}
