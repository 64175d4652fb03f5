//! Metrics infrastructure for the footprint pipeline.
//!
//! This crate declares every metric the pipeline records as a structured
//! [`Metric`] constant so names are not repeated as string literals across
//! crates. It re-exports the `metrics` crate for convenience.
//!
//! # Example
//!
//! ```rust
//! use footprint_metrics::{metric_defs, describe_metrics};
//!
//! // Register descriptions once at startup
//! describe_metrics();
//!
//! metrics::counter!(metric_defs::TILES_EXTRACTED.name).increment(1);
//! metrics::histogram!(metric_defs::STAGE_DURATION.name, "stage" => "sieve").record(0.25);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_histogram, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use footprint_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const TILES: Metric = Metric::counter("footprint.example.tiles")
///     .with_description("Tiles seen")
///     .with_unit(Unit::Count);
///
/// assert_eq!(TILES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "footprint.tiles.extracted").
    pub name: &'static str,
    /// The kind of metric (counter or histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the pipeline.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Tile Extraction
    // ========================================================================

    /// Tiles vectorized and written to the tile cache.
    pub const TILES_EXTRACTED: Metric = Metric::counter("footprint.tiles.extracted")
        .with_description("Tiles vectorized and written to the tile cache")
        .with_unit(Unit::Count);

    /// Tiles whose mask held no labelled cells.
    pub const TILES_EMPTY: Metric = Metric::counter("footprint.tiles.empty")
        .with_description("Tiles whose mask held no labelled cells")
        .with_unit(Unit::Count);

    /// Features produced by raster-to-vector extraction.
    ///
    /// Labels: class
    pub const FEATURES_EXTRACTED: Metric = Metric::counter("footprint.features.extracted")
        .with_description("Features produced by raster-to-vector extraction")
        .with_unit(Unit::Count)
        .with_labels(&["class"]);

    // ========================================================================
    // Merge and Cleaning
    // ========================================================================

    /// Tile datasets concatenated by the merger.
    pub const MERGE_TILES: Metric = Metric::counter("footprint.merge.tiles")
        .with_description("Tile datasets concatenated by the merger")
        .with_unit(Unit::Count);

    /// Features absorbed into a neighbour across a tile seam.
    pub const DISSOLVE_MERGED: Metric = Metric::counter("footprint.dissolve.features_merged")
        .with_description("Features absorbed into a neighbour across a tile seam")
        .with_unit(Unit::Count);

    /// Features removed by the area sieve.
    pub const SIEVE_REMOVED: Metric = Metric::counter("footprint.sieve.removed")
        .with_description("Features removed by the area sieve")
        .with_unit(Unit::Count);

    /// Interior rings removed by hole filling.
    pub const HOLES_FILLED: Metric = Metric::counter("footprint.holes.filled")
        .with_description("Interior rings removed by hole filling")
        .with_unit(Unit::Count);

    // ========================================================================
    // Simplification and Clipping
    // ========================================================================

    /// Shared arcs simplified.
    pub const SIMPLIFY_ARCS: Metric = Metric::counter("footprint.simplify.arcs")
        .with_description("Shared arcs simplified")
        .with_unit(Unit::Count);

    /// Arcs restored to their original vertices to keep rings valid.
    pub const SIMPLIFY_ARCS_REVERTED: Metric = Metric::counter("footprint.simplify.arcs_reverted")
        .with_description("Arcs restored to their original vertices to keep rings valid")
        .with_unit(Unit::Count);

    /// Features dropped because nothing areal was left after clipping.
    pub const CLIP_DROPPED: Metric = Metric::counter("footprint.clip.dropped")
        .with_description("Features dropped because nothing areal was left after clipping")
        .with_unit(Unit::Count);

    /// Wall-clock duration of a pipeline stage.
    ///
    /// Labels: stage
    pub const STAGE_DURATION: Metric = Metric::histogram("footprint.stage.duration")
        .with_description("Wall-clock duration of a pipeline stage")
        .with_unit(Unit::Seconds)
        .with_labels(&["stage"]);

    /// Every metric declared above.
    pub const ALL: &[Metric] = &[
        TILES_EXTRACTED,
        TILES_EMPTY,
        FEATURES_EXTRACTED,
        MERGE_TILES,
        DISSOLVE_MERGED,
        SIEVE_REMOVED,
        HOLES_FILLED,
        SIMPLIFY_ARCS,
        SIMPLIFY_ARCS_REVERTED,
        CLIP_DROPPED,
        STAGE_DURATION,
    ];
}

/// Register the description of every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install a Prometheus exporter listening on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}
