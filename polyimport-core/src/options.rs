//! Run configuration for an import.

use crate::{Extent, ProjectionInfo};

/// Default minimum ring area in square map units.
pub const DEFAULT_MIN_AREA: f64 = 0.0001;

/// Output type conversions requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeOverrides {
    /// Write area centroids as points.
    pub centroids_as_points: bool,
    /// Write polygon rings as lines instead of boundaries.
    pub boundaries_as_lines: bool,
    /// Write input lines as boundaries.
    pub lines_as_boundaries: bool,
    /// Write input points as centroids.
    pub points_as_centroids: bool,
}

impl TypeOverrides {
    /// Whether any boundary primitives may be written.
    #[must_use]
    pub const fn writes_boundaries(&self) -> bool {
        !self.boundaries_as_lines
    }
}

/// Configuration of a single import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// Layers to import by name; empty selects every layer.
    pub layers: Vec<String>,
    /// Output name, used as the attribute table stem.
    pub output: String,
    /// Explicit restricting rectangle.
    pub spatial: Option<Extent>,
    /// Restrict to the current viewport.
    pub use_viewport: bool,
    /// Extent of the current viewport.
    pub viewport: Option<Extent>,
    /// Attribute filter applied to every layer.
    pub attribute_filter: Option<String>,
    /// Rings below this area are dropped.
    pub min_area: f64,
    /// Snapping threshold for boundaries; `None` disables snapping.
    pub snap: Option<f64>,
    /// Output type conversions.
    pub types: TypeOverrides,
    /// Integer column or FID column providing categories.
    pub key_column: Option<String>,
    /// Replacement column names; the first renames the key column.
    pub column_names: Vec<String>,
    /// Lower-case every column name.
    pub lowercase_columns: bool,
    /// Use only this geometry field.
    pub geometry_column: Option<String>,
    /// Skip topology cleaning.
    pub no_clean: bool,
    /// Drop the third dimension.
    pub force_2d: bool,
    /// Write no attribute tables.
    pub no_table: bool,
    /// Downgrade projection problems to warnings.
    pub override_projection: bool,
    /// Stop after the projection check.
    pub check_projection_only: bool,
    /// Projection of the target; `None` means unreferenced.
    pub target_projection: Option<ProjectionInfo>,
    /// Cap on the break/dedupe/small-angle loop; `None` runs to a fixed point.
    pub max_clean_iterations: Option<usize>,
}

impl ImportOptions {
    /// Options for importing every layer into `output`.
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            layers: Vec::new(),
            output: output.into(),
            spatial: None,
            use_viewport: false,
            viewport: None,
            attribute_filter: None,
            min_area: DEFAULT_MIN_AREA,
            snap: None,
            types: TypeOverrides::default(),
            key_column: None,
            column_names: Vec::new(),
            lowercase_columns: false,
            geometry_column: None,
            no_clean: false,
            force_2d: false,
            no_table: false,
            override_projection: false,
            check_projection_only: false,
            target_projection: None,
            max_clean_iterations: None,
        }
    }
}

/// Whether `name` is usable as an output name.
///
/// Names start with an ASCII letter followed by letters, digits or `_`.
#[must_use]
pub fn is_legal_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
