//! Tracing setup for the runner and tools.
//!
//! Console output always; with a log directory, an additional plain-text
//! file rotated daily (`<dir>/<module>.<date>`). `RUST_LOG` wins over the
//! level passed in.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// HTTP stack crates that are chatty at `debug`.
const QUIET_TARGETS: &[&str] = &["hyper=info", "hyper_util=info", "reqwest=info", "h2=info"];

/// Build the filter used when `RUST_LOG` is unset.
pub fn default_filter(log_level: &str) -> EnvFilter {
    let mut directives = vec![log_level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|d| d.to_string()));
    EnvFilter::new(directives.join(","))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when `log_dir` is set; keep it alive until
/// exit or buffered lines are lost. A second call is a no-op.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level));
    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let Some(dir) = log_dir else {
        let _ = tracing_subscriber::registry().with(env_filter).with(console_layer).try_init();
        return None;
    };

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, module_name));
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true).with_thread_ids(true);
    let _ = tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).try_init();
    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_keeps_level_and_quiets_http() {
        let f = default_filter("debug").to_string();
        assert!(f.contains("debug"));
        assert!(f.contains("reqwest=info"));
    }

    #[test]
    fn repeated_init_is_harmless() {
        assert!(init_logging("info", None, "test").is_none());
        assert!(init_logging("info", None, "test").is_none());
    }
}
