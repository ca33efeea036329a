//! Prometheus metrics for the daemon.
//!
//! The registry carries every core sync metric plus gauges describing what
//! the daemon has registered. A text-format snapshot can be written for the
//! node exporter textfile collector.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{self, Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use mediaimport_core::{GroupedMediaTypes, ImportRegistry};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Sources known to each registry.
pub static REGISTERED_SOURCES: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "mediaimport_registered_sources",
            "Sources registered per media domain",
        ),
        &["domain"],
    )
    .unwrap()
});

/// Imports known to each registry.
pub static REGISTERED_IMPORTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "mediaimport_registered_imports",
            "Imports registered per media domain",
        ),
        &["domain"],
    )
    .unwrap()
});

/// Whether the periodic sync loop is running (1) or not (0).
pub static SYNC_LOOP_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediaimport_sync_loop_running",
        "Whether the periodic sync loop is running",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    mediaimport_core::metrics::register_metrics(registry).unwrap();

    registry
        .register(Box::new(REGISTERED_SOURCES.clone()))
        .unwrap();
    registry
        .register(Box::new(REGISTERED_IMPORTS.clone()))
        .unwrap();
    registry
        .register(Box::new(SYNC_LOOP_RUNNING.clone()))
        .unwrap();
}

/// Refresh the registry gauges from the current registry contents.
pub fn collect_registry_metrics(registries: &[std::sync::Arc<ImportRegistry>]) {
    for registry in registries {
        let domain = registry.domain().as_str();
        if let Ok(sources) = registry.get_sources(&GroupedMediaTypes::default()) {
            REGISTERED_SOURCES
                .with_label_values(&[domain])
                .set(sources.len() as i64);
        }
        if let Ok(imports) = registry.get_imports() {
            REGISTERED_IMPORTS
                .with_label_values(&[domain])
                .set(imports.len() as i64);
        }
    }
}

/// Encode all metrics in Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Write a snapshot atomically: to a sibling temp file, then rename.
pub fn write_snapshot(path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, encode_metrics())?;
    std::fs::rename(&tmp, path)
}
