//! Key-registry metrics emitted through the `metrics` facade.
//!
//! # Metrics
//! - `gatesync_keys_cache_size` (gauge): cached key entries across all sources
//! - `gatesync_keys_sources` (gauge): configured source count
//! - `gatesync_keys_refresh_total` (counter): per-source successful refreshes, by `source`
//! - `gatesync_keys_refresh_failures_total` (counter): per-source failed refreshes, by `source`
//! - `gatesync_keys_full_refresh_total` (counter): full-registry sweeps
//! - `gatesync_keys_lookup_misses_total` (counter): lookups that found no key

#[allow(clippy::cast_precision_loss)]
pub fn record_cache_size(size: usize) {
    metrics::gauge!("gatesync_keys_cache_size").set(size as f64);
}

#[allow(clippy::cast_precision_loss)]
pub fn record_source_count(count: usize) {
    metrics::gauge!("gatesync_keys_sources").set(count as f64);
}

pub fn record_source_refresh(source_id: &str, success: bool) {
    if success {
        metrics::counter!("gatesync_keys_refresh_total", "source" => source_id.to_string())
            .increment(1);
    } else {
        metrics::counter!(
            "gatesync_keys_refresh_failures_total",
            "source" => source_id.to_string()
        )
        .increment(1);
    }
}

pub fn record_full_refresh() {
    metrics::counter!("gatesync_keys_full_refresh_total").increment(1);
}

pub fn record_lookup_miss() {
    metrics::counter!("gatesync_keys_lookup_misses_total").increment(1);
}
