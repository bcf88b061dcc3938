use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "scanflow=info";

/// Filter directive with precedence: explicit `log_filter`, then `RUST_LOG`,
/// then `scanflow=info`.
pub fn filter_spec(log_filter: Option<&str>, rust_log: Option<&str>) -> String {
    [log_filter, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|spec| !spec.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(log_filter: Option<&str>) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let spec = filter_spec(log_filter, rust_log.as_deref());
    let filter = EnvFilter::try_new(&spec).unwrap_or_else(|err| {
        eprintln!("invalid log filter {spec:?} ({err}); falling back to {DEFAULT_FILTER}");
        EnvFilter::new(DEFAULT_FILTER)
    });
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins_over_env() {
        assert_eq!(
            filter_spec(Some("scanflow=trace"), Some("warn")),
            "scanflow=trace"
        );
    }

    #[test]
    fn env_used_when_no_explicit_filter() {
        assert_eq!(filter_spec(None, Some("scanflow::capture=debug")), "scanflow::capture=debug");
    }

    #[test]
    fn blank_or_missing_filters_fall_back_to_default() {
        assert_eq!(filter_spec(None, None), DEFAULT_FILTER);
        assert_eq!(filter_spec(Some("  "), None), DEFAULT_FILTER);
        assert_eq!(filter_spec(Some(""), Some("warn")), "warn");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(Some("scanflow=debug"));
        init(None);
    }
}
