//! Metrics for cache and timeline monitoring.
//!
//! Counters are emitted through the `metrics` facade; without an installed
//! recorder they are no-ops.

use metrics::{counter, describe_counter};

/// Metric names for the cache engine.
pub mod names {
    /// Cache reads that found a value.
    pub const CACHE_HITS_TOTAL: &str = "hydra_cache_hits_total";
    /// Cache reads that found nothing.
    pub const CACHE_MISSES_TOTAL: &str = "hydra_cache_misses_total";
    /// Backend failures converted into a miss/false/empty outcome.
    pub const FAIL_OPEN_TOTAL: &str = "hydra_cache_fail_open_total";
    /// Source-of-record loads triggered by misses.
    pub const SOURCE_LOADS_TOTAL: &str = "hydra_source_loads_total";
    /// Dead references removed from timelines.
    pub const TIMELINE_PRUNED_TOTAL: &str = "hydra_timeline_pruned_total";
    /// Dead references rehydrated by a fallback loader.
    pub const TIMELINE_HEALED_TOTAL: &str = "hydra_timeline_healed_total";
    /// Timelines visited by the maintenance sweep.
    pub const SWEEP_TIMELINES_TOTAL: &str = "hydra_sweep_timelines_total";
    /// Failed after-save hooks.
    pub const AFTER_SAVE_FAILURES_TOTAL: &str = "hydra_after_save_failures_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Total number of cache hits");
    describe_counter!(names::CACHE_MISSES_TOTAL, "Total number of cache misses");
    describe_counter!(
        names::FAIL_OPEN_TOTAL,
        "Total number of store failures absorbed by the fail-open policy"
    );
    describe_counter!(
        names::SOURCE_LOADS_TOTAL,
        "Total number of source-of-record loads after a miss"
    );
    describe_counter!(
        names::TIMELINE_PRUNED_TOTAL,
        "Total number of dead references pruned from timelines"
    );
    describe_counter!(
        names::TIMELINE_HEALED_TOTAL,
        "Total number of dead references rehydrated during resolve"
    );
    describe_counter!(
        names::SWEEP_TIMELINES_TOTAL,
        "Total number of timelines visited by the maintenance sweep"
    );
    describe_counter!(
        names::AFTER_SAVE_FAILURES_TOTAL,
        "Total number of after-save hook failures swallowed"
    );
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a hit.
    pub fn hit(entity: &str) {
        counter!(names::CACHE_HITS_TOTAL, "entity" => entity.to_string()).increment(1);
    }

    /// Record a miss.
    pub fn miss(entity: &str) {
        counter!(names::CACHE_MISSES_TOTAL, "entity" => entity.to_string()).increment(1);
    }

    /// Record a failure absorbed at the fail-open boundary.
    pub fn fail_open(operation: &'static str, error_code: &'static str) {
        counter!(
            names::FAIL_OPEN_TOTAL,
            "operation" => operation,
            "error" => error_code
        )
        .increment(1);
    }

    /// Record a source load.
    pub fn source_load(entity: &str, found: bool) {
        counter!(
            names::SOURCE_LOADS_TOTAL,
            "entity" => entity.to_string(),
            "found" => if found { "true" } else { "false" }
        )
        .increment(1);
    }

    /// Record an after-save hook failure.
    pub fn after_save_failed(entity: &str) {
        counter!(names::AFTER_SAVE_FAILURES_TOTAL, "entity" => entity.to_string()).increment(1);
    }
}

/// Timeline metrics recorder.
#[derive(Clone)]
pub struct TimelineMetrics;

impl TimelineMetrics {
    /// Record pruned references.
    pub fn pruned(count: u64) {
        if count > 0 {
            counter!(names::TIMELINE_PRUNED_TOTAL).increment(count);
        }
    }

    /// Record healed references.
    pub fn healed(count: u64) {
        if count > 0 {
            counter!(names::TIMELINE_HEALED_TOTAL).increment(count);
        }
    }

    /// Record one sweep pass.
    pub fn swept(timelines: u64) {
        counter!(names::SWEEP_TIMELINES_TOTAL).increment(timelines);
    }
}
