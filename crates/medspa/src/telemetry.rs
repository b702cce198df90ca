// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide tracing and metrics installation.

use medspa_config::model::ObservabilityConfig;
use medspa_core::MedspaError;
use tracing::{debug, info};

/// Installs the fmt subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

fn default_directive(log_level: &str) -> String {
    format!("medspa={log_level},warn")
}

/// Installs the Prometheus recorder and HTTP listener when
/// `observability.metrics_addr` is set. Metric descriptions are registered
/// either way so a later recorder sees them.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<(), MedspaError> {
    match config.metrics_addr.as_deref() {
        Some(addr) => install_exporter(addr)?,
        None => debug!("metrics exporter disabled"),
    }
    medspa_pipeline::metrics::register_metrics();
    medspa_messaging::metrics::register_metrics();
    Ok(())
}

#[cfg(feature = "prometheus")]
fn install_exporter(addr: &str) -> Result<(), MedspaError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let socket: std::net::SocketAddr = addr.parse().map_err(|e| {
        MedspaError::Config(format!("observability.metrics_addr `{addr}` is invalid: {e}"))
    })?;
    PrometheusBuilder::new()
        .with_http_listener(socket)
        .install()
        .map_err(|e| MedspaError::Internal(format!("failed to install Prometheus exporter: {e}")))?;
    info!(addr = %socket, "prometheus exporter listening");
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_exporter(addr: &str) -> Result<(), MedspaError> {
    tracing::warn!(addr, "metrics_addr set but the prometheus feature is disabled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_scopes_level_to_medspa_crates() {
        assert_eq!(default_directive("debug"), "medspa=debug,warn");
    }

    #[test]
    fn unset_metrics_addr_is_a_no_op() {
        let config = ObservabilityConfig {
            log_level: "info".into(),
            metrics_addr: None,
        };
        assert!(init_metrics(&config).is_ok());
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn invalid_metrics_addr_is_a_config_error() {
        let config = ObservabilityConfig {
            log_level: "info".into(),
            metrics_addr: Some("not-an-addr".into()),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(MedspaError::Config(_))
        ));
    }
}
