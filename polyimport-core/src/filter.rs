//! Per-layer spatial filters and the reconciled import extent.

use geo::Polygon;
use log::{debug, warn};
use thiserror::Error;

use crate::{Extent, ImportOptions};

/// A layer name paired with the extent its source reported, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerExtent {
    /// Layer name, used in diagnostics.
    pub name: String,
    /// Reported extent.
    pub extent: Option<Extent>,
}

/// Invalid spatial restriction.
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    /// Viewport and explicit rectangle were both requested.
    #[error("select either the current viewport or an explicit rectangle, not both")]
    ConflictingRestriction,
    /// Viewport restriction requested but no viewport is known.
    #[error("viewport restriction requested but no viewport extent is available")]
    MissingViewport,
    /// `xmin` exceeds `xmax`.
    #[error("xmin ({xmin}) is larger than xmax ({xmax}) in the spatial rectangle")]
    InvertedX {
        /// Western bound.
        xmin: f64,
        /// Eastern bound.
        xmax: f64,
    },
    /// `ymin` exceeds `ymax`.
    #[error("ymin ({ymin}) is larger than ymax ({ymax}) in the spatial rectangle")]
    InvertedY {
        /// Southern bound.
        ymin: f64,
        /// Northern bound.
        ymax: f64,
    },
}

/// Filters built for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFilters {
    /// One filter per requested layer; `None` means unrestricted.
    pub per_layer: Vec<Option<Polygon<f64>>>,
    /// Union of the requested rectangle and every extent in use.
    pub global: Extent,
    /// Whether any layer carries a filter.
    pub any_active: bool,
}

impl SpatialFilters {
    /// Filter for the layer at position `index` of the selection.
    #[must_use]
    pub fn layer(&self, index: usize) -> Option<&Polygon<f64>> {
        self.per_layer.get(index).and_then(Option::as_ref)
    }
}

fn requested_rectangle(options: &ImportOptions) -> Result<Option<Extent>, FilterError> {
    let rectangle = match (options.use_viewport, options.spatial) {
        (true, Some(_)) => return Err(FilterError::ConflictingRestriction),
        (true, None) => Some(options.viewport.ok_or(FilterError::MissingViewport)?),
        (false, spatial) => spatial,
    };
    if let Some(rect) = rectangle {
        if rect.xmin > rect.xmax {
            return Err(FilterError::InvertedX {
                xmin: rect.xmin,
                xmax: rect.xmax,
            });
        }
        if rect.ymin > rect.ymax {
            return Err(FilterError::InvertedY {
                ymin: rect.ymin,
                ymax: rect.ymax,
            });
        }
        debug!(
            "cut out with boundaries: xmin:{} ymin:{} xmax:{} ymax:{}",
            rect.xmin, rect.ymin, rect.xmax, rect.ymax
        );
    }
    Ok(rectangle)
}

/// Derive one spatial filter per layer and the global extent.
///
/// A layer with a known extent is filtered by that extent, shrunk to the
/// requested rectangle. A layer that misses the rectangle entirely is
/// filtered by the rectangle itself and a warning is logged. A layer
/// without a known extent is filtered by the rectangle, or not at all.
pub fn build_spatial_filters(
    layers: &[LayerExtent],
    options: &ImportOptions,
) -> Result<SpatialFilters, FilterError> {
    let rectangle = requested_rectangle(options)?;
    let mut global = rectangle.unwrap_or_else(Extent::empty);
    let mut per_layer = Vec::with_capacity(layers.len());

    for layer in layers {
        let used = match (layer.extent, rectangle) {
            (Some(extent), Some(rect)) if !extent.overlaps(&rect) => {
                warn!(
                    "The spatial filter does not overlap with layer <{}>. Nothing to import.",
                    layer.name
                );
                Some(rect)
            }
            (Some(extent), Some(rect)) => Some(extent.intersection(&rect)),
            (Some(extent), None) => Some(extent),
            (None, rect) => rect,
        };
        if let (Some(used), Some(_)) = (used, layer.extent) {
            global = global.union(&used);
        }
        if let Some(used) = used {
            debug!(
                "spatial filter for layer <{}>: xmin:{} ymin:{} xmax:{} ymax:{}",
                layer.name, used.xmin, used.ymin, used.xmax, used.ymax
            );
        }
        per_layer.push(used.map(|extent| extent.to_polygon()));
    }

    let any_active = per_layer.iter().any(Option::is_some);
    Ok(SpatialFilters {
        per_layer,
        global,
        any_active,
    })
}
