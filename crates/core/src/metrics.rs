//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Synchronization passes (results, durations)
//! - Changesets (verdicts per media type)
//! - Handlers (failures per media type and phase, cleanup)
//! - Retrieval and updates pushed to sources

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Synchronization passes
// =============================================================================

/// Synchronization passes by result.
pub static SYNC_PASSES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediaimport_sync_passes_total", "Total synchronization passes"),
        &["result"], // "success", "partial", "failed", "cancelled"
    )
    .unwrap()
});

/// Duration of a synchronization pass in seconds, retrieval excluded.
pub static SYNC_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediaimport_sync_duration_seconds",
            "Duration of synchronization passes",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Changesets and handlers
// =============================================================================

/// Changeset verdicts by media type.
pub static CHANGESET_VERDICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaimport_changeset_verdicts_total",
            "Changeset verdicts applied to the catalog",
        ),
        &["media_type", "verdict"], // verdict: "added", "changed", "none", "removed"
    )
    .unwrap()
});

/// Handler failures by media type and task phase.
pub static HANDLER_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaimport_handler_failures_total",
            "Media types that failed during a pass",
        ),
        &["media_type", "phase"],
    )
    .unwrap()
});

/// Empty containers removed during cleanup.
pub static ITEMS_CLEANED_UP: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaimport_items_cleaned_up_total",
            "Containers removed because no children were left",
        ),
        &["media_type"],
    )
    .unwrap()
});

// =============================================================================
// Sources
// =============================================================================

/// Remote items retrieved by media type.
pub static ITEMS_RETRIEVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaimport_items_retrieved_total",
            "Remote items handed over by importers",
        ),
        &["media_type"],
    )
    .unwrap()
});

/// Item updates pushed back to sources by result.
pub static SOURCE_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaimport_source_updates_total",
            "Local item changes pushed to sources",
        ),
        &["result"], // "success", "unsupported", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SYNC_PASSES.clone()),
        Box::new(SYNC_DURATION.clone()),
        Box::new(CHANGESET_VERDICTS.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(ITEMS_CLEANED_UP.clone()),
        Box::new(ITEMS_RETRIEVED.clone()),
        Box::new(SOURCE_UPDATES.clone()),
    ]
}

/// Register every core metric in `registry`.
pub fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_once() {
        let registry = prometheus::Registry::new();
        register_metrics(&registry).unwrap();

        CHANGESET_VERDICTS
            .with_label_values(&["movie", "added"])
            .inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "mediaimport_changeset_verdicts_total"));

        assert!(register_metrics(&registry).is_err());
    }
}
