//! Multi-pass import orchestration.
//!
//! [`run_import`] drives the passes strictly forward: layer planning and the
//! projection check, spatial filters, survey, schema, ingestion and, when
//! polygon boundaries were written, cleaning and centroid assignment. Each
//! pass rewinds the [`FeatureStream`] and reads it to the end.

mod assign;
mod clean;
mod ingest;
mod layers;
mod report;
mod schema;
mod survey;

use log::{info, warn};
use thiserror::Error;

use crate::{
    AttributeStore, Feature, FeatureSource, FeatureStream, FilterError, ImportOptions,
    LayerExtent, ProjectionError, ProjectionVerdict, SourceError, SourceGeometry, SpatialFilters,
    StoreError, StreamItem, TopologyEngine, build_spatial_filters,
};

pub use assign::{AreaTally, Centroid, CentroidSet};
pub use clean::{CleanSummary, clean_boundaries};
pub use report::{CleanReport, ImportReport, LayerReport, SnapAdvice, SnapRecommendation};
pub use schema::{column_type_for, sanitize_column_name};
pub use survey::split_distance;

/// Invalid run configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The source has no layers.
    #[error("no layers available in the input")]
    NoLayers,
    /// A requested layer does not exist.
    #[error("layer <{name}> not available")]
    UnknownLayer {
        /// Requested name.
        name: String,
    },
    /// The output name is not a legal identifier.
    #[error("<{name}> is not a legal output name")]
    IllegalName {
        /// Offending name.
        name: String,
    },
    /// The requested geometry field is missing from a layer.
    #[error("geometry column <{column}> not found in layer <{layer}>")]
    MissingGeometryColumn {
        /// Layer name.
        layer: String,
        /// Requested geometry field.
        column: String,
    },
    /// The key column is missing from a layer.
    #[error("key column <{column}> not found in layer <{layer}>")]
    KeyColumnNotFound {
        /// Layer name.
        layer: String,
        /// Requested key column.
        column: String,
    },
    /// The key column does not hold integers.
    #[error("key column <{column}> in layer <{layer}> is not integer")]
    KeyColumnNotInteger {
        /// Layer name.
        layer: String,
        /// Requested key column.
        column: String,
    },
    /// A feature produced a category below 1.
    #[error("invalid category {value:?} for feature {fid} in layer <{layer}>")]
    InvalidCategory {
        /// Layer name.
        layer: String,
        /// Feature id.
        fid: i64,
        /// Value read from the key column, if any.
        value: Option<i64>,
    },
    /// The spatial restriction is invalid.
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Fatal import failure.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Invalid configuration, reported before side effects where possible.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Projection incompatibility without override.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    /// The feature source failed or rejected a filter.
    #[error("feature source error: {0}")]
    Source(#[from] SourceError),
    /// The attribute store failed.
    #[error("attribute store error: {0}")]
    Store(#[from] StoreError),
}

impl From<FilterError> for ImportError {
    fn from(value: FilterError) -> Self {
        Self::Config(ConfigError::Filter(value))
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// Only the projection check ran.
    ProjectionChecked(ProjectionVerdict),
    /// The full import ran.
    Imported(ImportReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeySource {
    Sequential,
    Fid,
    Field(usize),
}

/// How one selected layer is read and stored.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayerPlan {
    pub(crate) index: usize,
    pub(crate) position: usize,
    pub(crate) name: String,
    pub(crate) field: u32,
    pub(crate) table: String,
    pub(crate) geometry: Option<usize>,
    pub(crate) key: KeySource,
    pub(crate) key_column: String,
}

impl LayerPlan {
    /// Geometries of the used geometry fields, `None` where unset.
    pub(crate) fn geometries<'f>(
        &self,
        feature: &'f Feature,
    ) -> impl Iterator<Item = Option<&'f SourceGeometry>> + 'f {
        let only = self.geometry;
        feature
            .geometries
            .iter()
            .enumerate()
            .filter(move |(index, _)| only.is_none_or(|wanted| wanted == *index))
            .map(|(_, geometry)| geometry.as_ref())
    }

    /// Category of `feature`, the `ordinal`-th feature read in this pass.
    pub(crate) fn category(&self, feature: &Feature, ordinal: i64) -> Result<i64, ConfigError> {
        let value = match self.key {
            KeySource::Sequential => Some(ordinal),
            KeySource::Fid => Some(feature.fid),
            KeySource::Field(index) => feature.value(index).as_integer(),
        };
        match value {
            Some(cat) if cat > 0 => Ok(cat),
            _ => Err(ConfigError::InvalidCategory {
                layer: self.name.clone(),
                fid: feature.fid,
                value,
            }),
        }
    }
}

/// Counters shared by the passes of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RunContext {
    pub(crate) n_polygons: usize,
    pub(crate) n_polygon_boundaries: usize,
    pub(crate) is_3d: bool,
    pub(crate) split_distance: Option<f64>,
    pub(crate) layers: Vec<LayerReport>,
}

/// Read-only inputs every pass needs to traverse the selected layers.
pub(crate) struct Traversal<'a> {
    pub(crate) plans: &'a [LayerPlan],
    pub(crate) filters: &'a SpatialFilters,
    pub(crate) options: &'a ImportOptions,
}

impl Traversal<'_> {
    pub(crate) fn next<S: FeatureSource>(
        &self,
        stream: &mut FeatureStream<S>,
        plan: &LayerPlan,
    ) -> Result<Option<Feature>, SourceError> {
        let item = stream.next(
            plan.index,
            &plan.name,
            self.filters.layer(plan.position),
            self.options.attribute_filter.as_deref(),
        )?;
        Ok(match item {
            StreamItem::Feature(feature) => Some(feature),
            StreamItem::EndOfLayer => None,
        })
    }
}

/// Import every selected layer of `source`.
///
/// Primitives are written into `topology` and attribute rows into `store`.
/// Data-quality conditions such as missing geometries, overlaps and gaps are
/// counted in the returned report; everything else that goes wrong aborts
/// the run. Partial output is left in place.
pub fn run_import<S, T, A>(
    source: S,
    topology: &mut T,
    store: &mut A,
    options: &ImportOptions,
) -> Result<ImportOutcome, ImportError>
where
    S: FeatureSource,
    T: TopologyEngine + ?Sized,
    A: AttributeStore + ?Sized,
{
    let plans = layers::plan_layers(&source, options)?;
    let verdict = layers::check_projections(&source, &plans, options)?;
    if options.check_projection_only {
        return Ok(ImportOutcome::ProjectionChecked(verdict));
    }

    let extents: Vec<LayerExtent> = plans
        .iter()
        .map(|plan| LayerExtent {
            name: plan.name.clone(),
            extent: source.extent(plan.index),
        })
        .collect();
    let filters = build_spatial_filters(&extents, options)?;
    let tables = if options.no_table {
        None
    } else {
        Some(schema::plan_tables(&source, &plans, options))
    };

    let mut stream = FeatureStream::new(source);
    let traversal = Traversal {
        plans: &plans,
        filters: &filters,
        options,
    };
    let mut ctx = RunContext::default();

    survey::run(&traversal, &mut stream, &mut ctx)?;
    if let Some(tables) = &tables {
        schema::create_tables(store, tables)?;
    }
    ingest::run(&traversal, &mut stream, topology, store, tables.as_deref(), &mut ctx)?;
    if ctx.is_3d && options.force_2d {
        warn!("Input contains 3D features; the third dimension is dropped");
    }

    let cleaning = if clean::should_clean(topology, &ctx, options) {
        let summary = clean_boundaries(topology, options);
        let tally = assign::run(&traversal, &mut stream, topology)?;
        Some(CleanReport::new(summary, tally))
    } else {
        info!("Skipping topology cleaning");
        None
    };

    let report = ImportReport::assemble(ctx, cleaning, topology, options);
    report.log();
    Ok(ImportOutcome::Imported(report))
}
