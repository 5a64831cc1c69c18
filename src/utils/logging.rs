use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when nothing else is configured.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Pick the tracing filter directive.
///
/// Precedence: explicit command-line flag, then `RUST_LOG`, then the config
/// file, then [`DEFAULT_LOG_FILTER`]. Blank values are skipped.
pub fn resolve_log_filter(
    flag: Option<&str>,
    env: Option<&str>,
    config: Option<&str>,
) -> String {
    [flag, env, config]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(DEFAULT_LOG_FILTER)
        .to_string()
}

/// Install the global stderr subscriber for the binary.
///
/// Library code only emits events; installing the subscriber is left to the
/// entry point so embedding applications keep control over it.
pub fn init_tracing(flag: Option<&str>, config: Option<&str>) -> Result<(), Box<dyn Error>> {
    let env = std::env::var("RUST_LOG").ok();
    let directive = resolve_log_filter(flag, env.as_deref(), config);
    let filter = EnvFilter::try_new(&directive)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| -> Box<dyn Error> { err })
}
