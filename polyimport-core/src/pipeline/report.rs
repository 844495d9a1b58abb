//! Final import diagnostics.

use log::{info, warn};

use super::RunContext;
use super::assign::AreaTally;
use super::clean::CleanSummary;
use crate::{ImportOptions, PrimitiveKind, TopologyEngine};

/// Mantissa bits of a double.
const DOUBLE_MANTISSA_BITS: i32 = 52;

/// Mantissa bits of a single-precision float.
const SINGLE_MANTISSA_BITS: i32 = 23;

/// Per-layer counts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LayerReport {
    /// Layer name.
    pub name: String,
    /// Attribute table, `None` when tables are disabled.
    pub table: Option<String>,
    /// Features read after filtering.
    pub features: usize,
    /// Features without geometry.
    pub skipped: usize,
}

/// Cleaning and centroid assignment results.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CleanReport {
    /// Rounds of the break, dedupe and small-angle loop.
    pub iterations: usize,
    /// Whether the loop reached a fixed point.
    pub converged: bool,
    /// Areas built.
    pub areas: usize,
    /// Summed size of all areas.
    pub total_area: f64,
    /// Areas linked to more than one input polygon.
    pub n_overlaps: usize,
    /// Summed size of overlapping areas.
    pub overlap_area: f64,
    /// Areas linked to no input polygon.
    pub n_nocat: usize,
    /// Summed size of uncategorised areas.
    pub nocat_area: f64,
}

impl CleanReport {
    /// Combine the cleaning summary with the centroid tally.
    #[must_use]
    pub const fn new(summary: CleanSummary, tally: AreaTally) -> Self {
        Self {
            iterations: summary.iterations,
            converged: summary.converged,
            areas: tally.n_areas,
            total_area: tally.total_area,
            n_overlaps: tally.n_overlaps,
            overlap_area: tally.overlap_area,
            n_nocat: tally.n_nocat,
            nocat_area: tally.nocat_area,
        }
    }
}

/// Suggested next step when the imported areas look wrong.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SnapRecommendation {
    /// Import again snapping with this threshold.
    SnapWith(f64),
    /// Snapping cannot help; the input needs manual cleaning.
    ManualCleaning,
    /// The threshold used may have merged polygons.
    ThresholdTooLarge(f64),
    /// Import again with a threshold from the estimated range.
    TrySnapping,
}

/// Snapping advice for single-layer imports with suspicious areas.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SnapAdvice {
    /// Lower bound of the estimated threshold range.
    pub min_snap: f64,
    /// Upper bound of the estimated threshold range.
    pub max_snap: f64,
    /// Whether overlapping polygons were found.
    pub overlapping: bool,
    /// Centroids written minus input polygons.
    pub centroid_delta: i64,
    /// Suggested next step.
    pub recommendation: SnapRecommendation,
}

/// `magnitude * 2^-bits` rounded away from one to a power of ten.
fn readable_ulp(magnitude: f64, bits: i32) -> f64 {
    let exponent = (magnitude / 2.0_f64.powi(bits)).log10();
    let rounded = if exponent < 0.0 {
        exponent.trunc()
    } else {
        exponent.trunc() + 1.0
    };
    10.0_f64.powf(rounded)
}

impl SnapAdvice {
    /// Derive advice from the largest absolute coordinate of the output.
    ///
    /// `snap` is the threshold used for the run, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use polyimport_core::{SnapAdvice, pipeline::SnapRecommendation};
    ///
    /// let advice = SnapAdvice::estimate(1000.0, None, true, 0);
    /// assert!((advice.min_snap - 1e-12).abs() < 1e-24);
    /// assert!((advice.max_snap - 1e-3).abs() < 1e-15);
    /// assert!(matches!(advice.recommendation, SnapRecommendation::SnapWith(_)));
    /// ```
    #[must_use]
    pub fn estimate(
        max_coordinate: f64,
        snap: Option<f64>,
        overlapping: bool,
        centroid_delta: i64,
    ) -> Self {
        let min_snap = readable_ulp(max_coordinate, DOUBLE_MANTISSA_BITS);
        let max_snap = readable_ulp(max_coordinate, SINGLE_MANTISSA_BITS);
        let threshold = snap.unwrap_or(-1.0);
        let recommendation = match (overlapping, threshold) {
            (true, t) if t < min_snap => SnapRecommendation::SnapWith(min_snap),
            (true, t) if t < max_snap => SnapRecommendation::SnapWith(t * 10.0),
            (true, _) => SnapRecommendation::ManualCleaning,
            (false, t) if t > 0.0 => SnapRecommendation::ThresholdTooLarge(t),
            (false, _) => SnapRecommendation::TrySnapping,
        };
        Self {
            min_snap,
            max_snap,
            overlapping,
            centroid_delta,
            recommendation,
        }
    }

    fn log(&self) {
        let range = format!("[{}, {}]", self.min_snap, self.max_snap);
        if self.overlapping {
            warn!("Some input polygons are overlapping each other");
            warn!("If overlapping is not desired, the data need to be cleaned");
        } else if self.centroid_delta < 0 {
            warn!("{} input polygons got lost during import", -self.centroid_delta);
        } else if self.centroid_delta > 0 {
            warn!("{} additional areas were created during import", self.centroid_delta);
        }
        match self.recommendation {
            SnapRecommendation::SnapWith(threshold) => {
                warn!("The input could be cleaned by snapping vertices to each other");
                warn!("Estimated range of snapping threshold: {range}");
                warn!("Try to import again, snapping with {threshold}: 'snap={threshold}'");
            }
            SnapRecommendation::ManualCleaning => warn!("Manual cleaning may be needed"),
            SnapRecommendation::ThresholdTooLarge(threshold) => {
                warn!("The snapping threshold {threshold} might be too large");
                warn!("Estimated range of snapping threshold: {range}");
                warn!("Manual cleaning may be needed");
            }
            SnapRecommendation::TrySnapping => {
                warn!("The input could be cleaned by snapping vertices to each other");
                warn!("Estimated range of snapping threshold: {range}");
            }
        }
    }
}

/// Everything a completed import reports.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportReport {
    /// Per-layer counts in import order.
    pub layers: Vec<LayerReport>,
    /// Input polygons found by the survey.
    pub n_polygons: usize,
    /// Polygon rings written as boundaries.
    pub n_polygon_boundaries: usize,
    /// Whether any input geometry had Z values.
    pub is_3d: bool,
    /// Boundary splitting distance, if splitting was enabled.
    pub split_distance: Option<f64>,
    /// Cleaning results, `None` when cleaning did not run.
    pub cleaning: Option<CleanReport>,
    /// Snapping advice, `None` when the output looks consistent.
    pub snapping: Option<SnapAdvice>,
}

impl ImportReport {
    pub(crate) fn assemble<T: TopologyEngine + ?Sized>(
        ctx: RunContext,
        cleaning: Option<CleanReport>,
        topology: &T,
        options: &ImportOptions,
    ) -> Self {
        let n_overlaps = cleaning.map_or(0, |clean| clean.n_overlaps);
        let n_centroids = topology.primitive_count(PrimitiveKind::Centroid);
        let suspicious = n_centroids != ctx.n_polygons || n_overlaps > 0;
        let snapping = (ctx.n_polygons > 0 && ctx.layers.len() == 1 && suspicious).then(|| {
            let delta = i64::try_from(n_centroids).unwrap_or(i64::MAX)
                - i64::try_from(ctx.n_polygons).unwrap_or(i64::MAX);
            SnapAdvice::estimate(max_abs_coordinate(topology), options.snap, n_overlaps > 0, delta)
        });
        Self {
            layers: ctx.layers,
            n_polygons: ctx.n_polygons,
            n_polygon_boundaries: ctx.n_polygon_boundaries,
            is_3d: ctx.is_3d,
            split_distance: ctx.split_distance,
            cleaning,
            snapping,
        }
    }

    /// Total features read across layers.
    #[must_use]
    pub fn features(&self) -> usize {
        self.layers.iter().map(|layer| layer.features).sum()
    }

    /// Emit the report through the `log` facade.
    pub fn log(&self) {
        for layer in &self.layers {
            info!(
                "Layer <{}>: {} features, {} without geometry",
                layer.name, layer.features, layer.skipped
            );
        }
        if let Some(clean) = &self.cleaning {
            info!("{} input polygons", self.n_polygons);
            info!("Total area: {} ({} areas)", clean.total_area, clean.areas);
            if clean.n_overlaps > 0 {
                info!(
                    "Overlapping area: {} ({} areas)",
                    clean.overlap_area, clean.n_overlaps
                );
            }
            if clean.n_nocat > 0 {
                info!(
                    "Area without category: {} ({} areas)",
                    clean.nocat_area, clean.n_nocat
                );
            }
        }
        if let Some(advice) = &self.snapping {
            advice.log();
        }
    }
}

fn max_abs_coordinate<T: TopologyEngine + ?Sized>(topology: &T) -> f64 {
    topology
        .primitives()
        .iter()
        .flat_map(|primitive| primitive.coords.coords())
        .map(|coord| coord.x.abs().max(coord.y.abs()))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTopology;
    use geo::LineString;
    use rstest::{fixture, rstest};

    #[fixture]
    fn ctx() -> RunContext {
        RunContext {
            n_polygons: 2,
            n_polygon_boundaries: 2,
            layers: vec![LayerReport {
                name: "parcels".into(),
                table: Some("parcels".into()),
                features: 2,
                skipped: 0,
            }],
            ..RunContext::default()
        }
    }

    fn tally(n_areas: usize, n_overlaps: usize) -> AreaTally {
        AreaTally {
            n_areas,
            total_area: 1.0,
            n_overlaps,
            overlap_area: if n_overlaps > 0 { 1.0 } else { 0.0 },
            ..AreaTally::default()
        }
    }

    fn summary() -> CleanSummary {
        CleanSummary {
            iterations: 1,
            converged: true,
            areas: 1,
        }
    }

    #[rstest]
    #[case(1000.0, 1e-12, 1e-3)]
    #[case(0.5, 1e-15, 1e-7)]
    #[case(5_000_000.0, 1e-8, 1.0)]
    fn rounds_unit_in_last_place(#[case] magnitude: f64, #[case] min: f64, #[case] max: f64) {
        let advice = SnapAdvice::estimate(magnitude, None, false, 0);
        assert!((advice.min_snap / min - 1.0).abs() < 1e-9, "{}", advice.min_snap);
        assert!((advice.max_snap / max - 1.0).abs() < 1e-9, "{}", advice.max_snap);
    }

    #[rstest]
    #[case(true, None, SnapRecommendation::SnapWith(1e-12))]
    #[case(true, Some(1e-6), SnapRecommendation::SnapWith(1e-5))]
    #[case(true, Some(0.01), SnapRecommendation::ManualCleaning)]
    #[case(false, Some(0.5), SnapRecommendation::ThresholdTooLarge(0.5))]
    #[case(false, None, SnapRecommendation::TrySnapping)]
    #[case(false, Some(0.0), SnapRecommendation::TrySnapping)]
    fn recommends_next_step(
        #[case] overlapping: bool,
        #[case] snap: Option<f64>,
        #[case] expected: SnapRecommendation,
    ) {
        let advice = SnapAdvice::estimate(1000.0, snap, overlapping, 0);
        match (advice.recommendation, expected) {
            (SnapRecommendation::SnapWith(found), SnapRecommendation::SnapWith(wanted)) => {
                assert!((found / wanted - 1.0).abs() < 1e-9, "{found}");
            }
            (found, wanted) => assert_eq!(found, wanted),
        }
    }

    #[rstest]
    fn overlaps_trigger_advice(ctx: RunContext) {
        let mut topology = ScriptedTopology::default();
        for _ in 0..2 {
            topology.write_primitive(
                PrimitiveKind::Centroid,
                LineString::from(vec![(1000.0, -20.0)]),
                Vec::new(),
            );
        }
        let cleaning = Some(CleanReport::new(summary(), tally(1, 1)));
        let report = ImportReport::assemble(ctx, cleaning, &topology, &ImportOptions::new("p"));
        let advice = report.snapping.expect("advice");
        assert!(advice.overlapping);
        assert!((advice.max_snap / 1e-3 - 1.0).abs() < 1e-9);
    }

    #[rstest]
    fn consistent_output_gets_no_advice(ctx: RunContext) {
        let mut topology = ScriptedTopology::default();
        for x in [1.0, 2.0] {
            topology.write_primitive(
                PrimitiveKind::Centroid,
                LineString::from(vec![(x, 0.0)]),
                Vec::new(),
            );
        }
        let cleaning = Some(CleanReport::new(summary(), tally(2, 0)));
        let report = ImportReport::assemble(ctx, cleaning, &topology, &ImportOptions::new("p"));
        assert_eq!(report.snapping, None);
        assert_eq!(report.features(), 2);
    }

    #[rstest]
    fn lost_polygons_report_negative_delta(ctx: RunContext) {
        let mut topology = ScriptedTopology::default();
        topology.write_primitive(
            PrimitiveKind::Centroid,
            LineString::from(vec![(3.0, 4.0)]),
            Vec::new(),
        );
        let report = ImportReport::assemble(ctx, None, &topology, &ImportOptions::new("p"));
        let advice = report.snapping.expect("advice");
        assert_eq!(advice.centroid_delta, -1);
        assert_eq!(advice.recommendation, SnapRecommendation::TrySnapping);
    }

    #[rstest]
    fn multi_layer_imports_get_no_advice(mut ctx: RunContext) {
        ctx.layers.push(LayerReport {
            name: "roads".into(),
            table: None,
            features: 0,
            skipped: 0,
        });
        let report =
            ImportReport::assemble(ctx, None, &ScriptedTopology::default(), &ImportOptions::new("p"));
        assert_eq!(report.snapping, None);
    }
}
