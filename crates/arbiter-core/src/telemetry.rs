//! Tracing setup for the arbiter daemon.
//!
//! Filter directives come from, in order: `RUST_LOG`, the configured
//! `log_filter`, then a default that logs at the requested level and keeps
//! the ledger backend crates at `warn`. Only the first call to
//! [`init_tracing`] installs a subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Name the daemon reports itself under in log output.
pub const SERVICE_NAME: &str = "arbiterd";

/// Storage crates that are chatty at debug level.
const QUIET_DEPENDENCIES: &[&str] = &["surrealdb=warn", "surrealkv=warn"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    /// Newline-delimited JSON instead of human-readable lines.
    pub json: bool,
    pub level: Level,
    /// `EnvFilter` directives from configuration.
    pub filter: Option<String>,
}

impl TracingOptions {
    pub fn new(json: bool, level: Level) -> Self {
        Self {
            json,
            level,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }
}

/// Directives used when nothing else is configured.
pub fn default_directives(level: Level) -> String {
    let mut parts = vec![level.as_str().to_ascii_lowercase()];
    parts.extend(QUIET_DEPENDENCIES.iter().map(|d| (*d).to_string()));
    parts.join(",")
}

/// Pick the directives to install. Blank values count as unset.
pub fn resolve_directives(env: Option<&str>, configured: Option<&str>, level: Level) -> String {
    let set = |v: &&str| !v.trim().is_empty();
    env.filter(set)
        .or_else(|| configured.filter(set))
        .map(str::to_string)
        .unwrap_or_else(|| default_directives(level))
}

/// Install the global subscriber.
pub fn init_tracing(options: &TracingOptions) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = resolve_directives(env.as_deref(), options.filter.as_deref(), options.level);
    let env_filter = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(options.level)));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if options.json {
        registry
            .with(fmt::layer().with_target(false).json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    if installed.is_ok() {
        tracing::debug!(service = SERVICE_NAME, filter = %directives, "tracing initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_wins_over_configured_filter() {
        let d = resolve_directives(Some("arbiter_core=trace"), Some("info"), Level::WARN);
        assert_eq!(d, "arbiter_core=trace");
    }

    #[test]
    fn test_configured_filter_used_without_env() {
        assert_eq!(
            resolve_directives(None, Some("arbiter_core=debug"), Level::WARN),
            "arbiter_core=debug"
        );
        assert_eq!(
            resolve_directives(Some("  "), Some("info"), Level::WARN),
            "info"
        );
    }

    #[test]
    fn test_default_quiets_storage_crates() {
        let d = resolve_directives(None, None, Level::DEBUG);
        assert_eq!(d, "debug,surrealdb=warn,surrealkv=warn");
        assert!(EnvFilter::try_new(&d).is_ok());
    }

    #[test]
    fn test_options_carry_filter() {
        let opts = TracingOptions::new(true, Level::INFO).with_filter(Some("info".into()));
        assert!(opts.json);
        assert_eq!(opts.filter.as_deref(), Some("info"));
    }
}
