use tracing_subscriber::EnvFilter;

use crate::error::SwapError;

/// Install a global `tracing` subscriber printing to stderr.
///
/// `level` is an `EnvFilter` directive such as `"info"` or
/// `"chain_btc=debug,swap_core=info"`; when it does not parse, `RUST_LOG`
/// is used instead. A second call leaves the installed subscriber in place
/// and returns [`SwapError::Config`].
pub fn init_logging(level: &str) -> Result<(), SwapError> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .map_err(|e| SwapError::Config(format!("invalid log filter: {e}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| SwapError::Config(format!("logging already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_an_error() {
        let _ = init_logging("swap_core=debug");
        let again = init_logging("info");
        assert!(matches!(again, Err(SwapError::Config(msg)) if msg.contains("already initialised")));
        tracing::info!("still logging");
    }
}
