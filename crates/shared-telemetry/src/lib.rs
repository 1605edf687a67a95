//! Structured logging bootstrap for the workspace's binaries and
//! integration tests. Dev builds get a compact, human-readable layer;
//! anything else gets flattened JSON so a log shipper can parse it
//! without a custom grammar.

use std::panic;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber for `service_name`. Safe
/// to call once at process startup; calling it twice panics (tracing's
/// own guard against double-init), which is the correct failure mode —
/// a caller that does this has a startup-ordering bug worth surfacing
/// loudly rather than silently ignoring.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let registry = tracing_subscriber::registry().with(filter);

    if is_production() {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_target(false))
            .init();
    }

    install_panic_hook(service_name.to_string());
    tracing::info!(service = service_name, "telemetry initialized");
}

fn default_filter() -> EnvFilter {
    if cfg!(debug_assertions) {
        EnvFilter::new("debug,hyper=warn,reqwest=warn")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    }
}

fn is_production() -> bool {
    std::env::var("APP_ENV").map(|v| v == "production").unwrap_or(false)
}

fn install_panic_hook(service_name: String) {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(
            service = %service_name,
            location = %location,
            "panic: {info}"
        );
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_nonempty() {
        assert!(!default_filter().to_string().is_empty());
    }
}
