//! First traversal: polygon structure, 3D detection and split distance.

use log::{debug, info};

use super::{RunContext, Traversal};
use crate::geometry::count_rings;
use crate::{FeatureSource, FeatureStream, LayerReport, SourceError};

/// Boundary count above which long boundaries are split.
const SPLIT_THRESHOLD: usize = 50;

/// Empirical divisor applied to the split distance.
const SPLIT_DIVISOR: f64 = 16.0;

/// Length of boundary pieces for a dataset, `None` when splitting is off.
///
/// Splitting needs more than 50 boundaries and an extent with positive
/// area: `sqrt(extent_area) / ln(n_boundaries) / 16`.
///
/// # Examples
///
/// ```
/// use polyimport_core::pipeline::split_distance;
///
/// let distance = split_distance(200, 100.0).expect("splitting enabled");
/// assert!((distance - 0.1179).abs() < 1e-3);
/// assert_eq!(split_distance(10, 100.0), None);
/// ```
#[must_use]
pub fn split_distance(n_boundaries: usize, extent_area: f64) -> Option<f64> {
    if n_boundaries <= SPLIT_THRESHOLD || !(extent_area > 0.0) {
        return None;
    }
    let boundaries = n_boundaries as f64;
    Some(extent_area.sqrt() / boundaries.ln() / SPLIT_DIVISOR)
}

pub(crate) fn run<S: FeatureSource>(
    traversal: &Traversal<'_>,
    stream: &mut FeatureStream<S>,
    ctx: &mut RunContext,
) -> Result<(), SourceError> {
    let options = traversal.options;
    stream.reset();
    ctx.layers.clear();
    for plan in traversal.plans {
        info!("Check if layer <{}> contains polygons...", plan.name);
        let mut features = 0;
        while let Some(feature) = traversal.next(stream, plan)? {
            features += 1;
            for geometry in plan.geometries(&feature).flatten() {
                let count = count_rings(&geometry.geometry, options.types.lines_as_boundaries);
                ctx.n_polygons += count.polygons;
                if !options.no_clean {
                    ctx.n_polygon_boundaries += count.boundaries;
                }
                ctx.is_3d |= geometry.is_3d;
            }
        }
        ctx.layers.push(LayerReport {
            name: plan.name.clone(),
            table: (!options.no_table).then(|| plan.table.clone()),
            features,
            skipped: 0,
        });
    }
    if traversal.plans.len() > 1 {
        let total: usize = ctx.layers.iter().map(|layer| layer.features).sum();
        info!("Importing {total} features");
    }

    debug!("n polygon boundaries: {}", ctx.n_polygon_boundaries);
    ctx.split_distance = if options.no_clean {
        None
    } else {
        split_distance(ctx.n_polygon_boundaries, traversal.filters.global.area())
    };
    if let Some(distance) = ctx.split_distance {
        info!("Boundary splitting distance in map units: {distance}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, 100.0, Some(0.117_97))]
    #[case(51, 4.0, Some(0.031_79))]
    #[case(50, 100.0, None)]
    #[case(10, 100.0, None)]
    #[case(200, 0.0, None)]
    #[case(200, f64::NAN, None)]
    fn derives_split_distance(
        #[case] boundaries: usize,
        #[case] area: f64,
        #[case] expected: Option<f64>,
    ) {
        match (split_distance(boundaries, area), expected) {
            (Some(found), Some(wanted)) => assert!((found - wanted).abs() < 1e-4, "{found}"),
            (None, None) => {}
            (found, wanted) => panic!("expected {wanted:?}, got {found:?}"),
        }
    }
}
