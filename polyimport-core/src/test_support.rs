//! In-memory collaborators used by unit and behaviour tests.
//!
//! [`MemorySource`] serves features from vectors in either access mode,
//! [`MemoryAttributeStore`] keeps rows in maps and enforces unique category
//! indices, and [`ScriptedTopology`] records calls and returns preset areas.

use std::collections::{BTreeMap, VecDeque};

use geo::{BoundingRect, Coord, Geometry, Intersects, LineString, Polygon};
use thiserror::Error;

use crate::{
    AccessMode, AttributeStore, AttributeValue, CategoryPair, Extent, Feature, FeatureSource,
    FieldDefn, FieldValue, LayerCrs, LayerInfo, Primitive, PrimitiveKind, SourceError,
    SourceGeometry, SourceRecord, StoreError, TableSchema, TopologyEngine,
};

/// Error raised by the in-memory collaborators.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Filter expression not understood.
    #[error("unsupported filter expression <{0}>")]
    UnsupportedFilter(String),
    /// Table name not known.
    #[error("no such table <{0}>")]
    NoSuchTable(String),
    /// Table created twice.
    #[error("table <{0}> already exists")]
    TableExists(String),
    /// Two rows share a category.
    #[error("duplicate category {0}")]
    DuplicateCategory(i64),
    /// Insert outside a transaction.
    #[error("no open transaction")]
    NoTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FidFilter {
    text: String,
    op: Comparison,
    value: i64,
}

impl FidFilter {
    fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let (Some("fid"), Some(op), Some(value), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        let op = match op {
            "=" => Comparison::Eq,
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            _ => return None,
        };
        Some(Self {
            text: text.to_owned(),
            op,
            value: value.parse().ok()?,
        })
    }

    fn accepts(&self, fid: i64) -> bool {
        match self.op {
            Comparison::Eq => fid == self.value,
            Comparison::Lt => fid < self.value,
            Comparison::Le => fid <= self.value,
            Comparison::Gt => fid > self.value,
            Comparison::Ge => fid >= self.value,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryLayer {
    info: LayerInfo,
    features: Vec<Feature>,
    extent: Option<Extent>,
    crs: LayerCrs,
    spatial: Option<Polygon<f64>>,
    attribute: Option<FidFilter>,
    cursor: usize,
}

impl MemoryLayer {
    fn accepts(&self, feature: &Feature) -> bool {
        let spatial = self.spatial.as_ref().is_none_or(|filter| {
            let mut envelopes = feature
                .geometries
                .iter()
                .flatten()
                .filter_map(|geometry| geometry.geometry.bounding_rect())
                .peekable();
            envelopes.peek().is_none() || envelopes.any(|rect| rect.intersects(filter))
        });
        let attribute = self
            .attribute
            .as_ref()
            .is_none_or(|filter| filter.accepts(feature.fid));
        spatial && attribute
    }
}

/// Feature source backed by vectors.
///
/// Attribute filters of the form `fid <op> <integer>` are understood; any
/// other expression is rejected.
#[derive(Debug, Clone)]
pub struct MemorySource {
    layers: Vec<MemoryLayer>,
    access: AccessMode,
    shared_order: Vec<(usize, usize)>,
    shared_cursor: usize,
    source_resets: usize,
}

impl MemorySource {
    /// Start describing a source.
    #[must_use]
    pub fn builder() -> MemorySourceBuilder {
        MemorySourceBuilder::default()
    }

    /// Switch the access mode the source reports.
    #[must_use]
    pub fn with_access_mode(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Attribute filter currently installed on `layer`.
    #[must_use]
    pub fn attribute_filter(&self, layer: usize) -> Option<&str> {
        self.layers
            .get(layer)
            .and_then(|l| l.attribute.as_ref())
            .map(|f| f.text.as_str())
    }

    /// Spatial filter currently installed on `layer`.
    #[must_use]
    pub fn spatial_filter(&self, layer: usize) -> Option<&Polygon<f64>> {
        self.layers.get(layer).and_then(|l| l.spatial.as_ref())
    }

    /// Number of times the shared cursor was restarted.
    #[must_use]
    pub fn source_resets(&self) -> usize {
        self.source_resets
    }

    fn layer_mut(&mut self, index: usize) -> Result<&mut MemoryLayer, SourceError> {
        self.layers
            .get_mut(index)
            .ok_or(SourceError::NoSuchLayer { index })
    }
}

impl FeatureSource for MemorySource {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer(&self, index: usize) -> Option<&LayerInfo> {
        self.layers.get(index).map(|l| &l.info)
    }

    fn access_mode(&self) -> AccessMode {
        self.access
    }

    fn set_spatial_filter(
        &mut self,
        layer: usize,
        filter: Option<&Polygon<f64>>,
    ) -> Result<(), SourceError> {
        self.layer_mut(layer)?.spatial = filter.cloned();
        Ok(())
    }

    fn set_attribute_filter(
        &mut self,
        layer: usize,
        filter: Option<&str>,
    ) -> Result<(), SourceError> {
        let target = self.layer_mut(layer)?;
        let parsed = match filter {
            None => None,
            Some(text) => Some(FidFilter::parse(text).ok_or_else(|| {
                SourceError::FilterRejected {
                    layer: target.info.name.clone(),
                    filter: text.to_owned(),
                    source: Box::new(MemoryError::UnsupportedFilter(text.to_owned())),
                }
            })?),
        };
        target.attribute = parsed;
        Ok(())
    }

    fn reset_layer(&mut self, layer: usize) -> Result<(), SourceError> {
        self.layer_mut(layer)?.cursor = 0;
        Ok(())
    }

    fn next_layer_feature(&mut self, layer: usize) -> Result<Option<Feature>, SourceError> {
        let target = self.layer_mut(layer)?;
        while let Some(feature) = target.features.get(target.cursor) {
            target.cursor += 1;
            if target.accepts(feature) {
                return Ok(Some(feature.clone()));
            }
        }
        Ok(None)
    }

    fn reset_source(&mut self) -> Result<(), SourceError> {
        self.shared_cursor = 0;
        self.source_resets += 1;
        Ok(())
    }

    fn next_source_feature(&mut self) -> Result<Option<SourceRecord>, SourceError> {
        while let Some(&(layer, index)) = self.shared_order.get(self.shared_cursor) {
            self.shared_cursor += 1;
            let Some(owner) = self.layers.get(layer) else {
                continue;
            };
            let Some(feature) = owner.features.get(index) else {
                continue;
            };
            if owner.accepts(feature) {
                return Ok(Some(SourceRecord {
                    layer: owner.info.name.clone(),
                    feature: feature.clone(),
                }));
            }
        }
        Ok(None)
    }

    fn feature_count(&self, layer: usize) -> Option<u64> {
        let layer = self.layers.get(layer)?;
        let count = layer.features.iter().filter(|f| layer.accepts(f)).count();
        u64::try_from(count).ok()
    }

    fn extent(&self, layer: usize) -> Option<Extent> {
        self.layers.get(layer).and_then(|l| l.extent)
    }

    fn spatial_reference(&self, layer: usize) -> LayerCrs {
        self.layers
            .get(layer)
            .map(|l| l.crs.clone())
            .unwrap_or_default()
    }
}

/// Builder for [`MemorySource`].
#[derive(Debug, Default)]
pub struct MemorySourceBuilder {
    layers: Vec<MemoryLayer>,
    access: Option<AccessMode>,
}

impl MemorySourceBuilder {
    /// Begin a new layer with a single geometry field.
    #[must_use]
    pub fn layer(mut self, name: &str) -> Self {
        self.layers.push(MemoryLayer {
            info: LayerInfo {
                name: name.to_owned(),
                fields: Vec::new(),
                geometry_fields: vec!["geometry".to_owned()],
                fid_column: None,
            },
            features: Vec::new(),
            extent: None,
            crs: LayerCrs::Missing,
            spatial: None,
            attribute: None,
            cursor: 0,
        });
        self
    }

    fn current(&mut self) -> &mut MemoryLayer {
        if self.layers.is_empty() {
            *self = std::mem::take(self).layer("default");
        }
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// Add an attribute field to the current layer.
    #[must_use]
    pub fn field(mut self, field: FieldDefn) -> Self {
        self.current().info.fields.push(field);
        self
    }

    /// Name the FID column of the current layer.
    #[must_use]
    pub fn fid_column(mut self, name: &str) -> Self {
        self.current().info.fid_column = Some(name.to_owned());
        self
    }

    /// Replace the geometry field names of the current layer.
    #[must_use]
    pub fn geometry_fields(mut self, names: &[&str]) -> Self {
        self.current().info.geometry_fields = names.iter().map(|n| (*n).to_owned()).collect();
        self
    }

    /// Set the projection of the current layer.
    #[must_use]
    pub fn crs(mut self, crs: LayerCrs) -> Self {
        self.current().crs = crs;
        self
    }

    /// Report an extent for the current layer.
    #[must_use]
    pub fn extent(mut self, extent: Extent) -> Self {
        self.current().extent = Some(extent);
        self
    }

    /// Add a feature without attributes or geometry.
    #[must_use]
    pub fn feature(self, fid: i64) -> Self {
        self.record(fid, Vec::new(), None)
    }

    /// Add a feature carrying `geometry` and unset attributes.
    #[must_use]
    pub fn geometry(self, fid: i64, geometry: impl Into<Geometry<f64>>) -> Self {
        self.record(fid, Vec::new(), Some(geometry.into()))
    }

    /// Add a feature with explicit values and an optional geometry.
    #[must_use]
    pub fn record(
        mut self,
        fid: i64,
        mut values: Vec<FieldValue>,
        geometry: Option<Geometry<f64>>,
    ) -> Self {
        let layer = self.current();
        values.resize(layer.info.fields.len().max(values.len()), FieldValue::Null);
        let mut geometries = vec![None; layer.info.geometry_fields.len().max(1)];
        if let Some(first) = geometries.first_mut() {
            *first = geometry.map(SourceGeometry::planar);
        }
        layer.features.push(Feature {
            fid,
            values,
            geometries,
        });
        self
    }

    /// Add a fully specified feature.
    #[must_use]
    pub fn raw(mut self, feature: Feature) -> Self {
        self.current().features.push(feature);
        self
    }

    /// Report the given access mode.
    #[must_use]
    pub fn access_mode(mut self, access: AccessMode) -> Self {
        self.access = Some(access);
        self
    }

    /// Finish the source. The shared cursor visits layers round-robin.
    #[must_use]
    pub fn build(self) -> MemorySource {
        let longest = self.layers.iter().map(|l| l.features.len()).max().unwrap_or(0);
        let mut shared_order = Vec::new();
        for index in 0..longest {
            for (layer, content) in self.layers.iter().enumerate() {
                if index < content.features.len() {
                    shared_order.push((layer, index));
                }
            }
        }
        MemorySource {
            layers: self.layers,
            access: self.access.unwrap_or(AccessMode::Sequential),
            shared_order,
            shared_cursor: 0,
            source_resets: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    schema: Option<TableSchema>,
    rows: Vec<(i64, Vec<AttributeValue>)>,
    open: bool,
    commits: usize,
    indexed: bool,
}

/// Attribute store keeping rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAttributeStore {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryAttributeStore {
    /// Names of the created tables.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Schema of a table.
    #[must_use]
    pub fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table).and_then(|t| t.schema.as_ref())
    }

    /// Rows of a table in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> &[(i64, Vec<AttributeValue>)] {
        self.tables.get(table).map_or(&[], |t| t.rows.as_slice())
    }

    /// Categories of a table in insertion order.
    #[must_use]
    pub fn categories(&self, table: &str) -> Vec<i64> {
        self.rows(table).iter().map(|(cat, _)| *cat).collect()
    }

    /// Number of committed transactions on a table.
    #[must_use]
    pub fn commits(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.commits)
    }

    /// Whether a unique category index exists on a table.
    #[must_use]
    pub fn is_indexed(&self, table: &str) -> bool {
        self.tables.get(table).is_some_and(|t| t.indexed)
    }

    fn table_mut(
        &mut self,
        operation: &'static str,
        table: &str,
    ) -> Result<&mut MemoryTable, StoreError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::new(operation, table, MemoryError::NoSuchTable(table.into())))
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn create_table(&mut self, schema: &TableSchema) -> Result<(), StoreError> {
        if self.tables.contains_key(&schema.name) {
            return Err(StoreError::new(
                "create table",
                &schema.name,
                MemoryError::TableExists(schema.name.clone()),
            ));
        }
        self.tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema: Some(schema.clone()),
                ..MemoryTable::default()
            },
        );
        Ok(())
    }

    fn begin(&mut self, table: &str) -> Result<(), StoreError> {
        self.table_mut("begin transaction", table)?.open = true;
        Ok(())
    }

    fn insert_row(
        &mut self,
        table: &str,
        cat: i64,
        values: &[AttributeValue],
    ) -> Result<(), StoreError> {
        let target = self.table_mut("insert row", table)?;
        if !target.open {
            return Err(StoreError::new("insert row", table, MemoryError::NoTransaction));
        }
        target.rows.push((cat, values.to_vec()));
        Ok(())
    }

    fn commit(&mut self, table: &str) -> Result<(), StoreError> {
        let target = self.table_mut("commit transaction", table)?;
        if !target.open {
            return Err(StoreError::new("commit transaction", table, MemoryError::NoTransaction));
        }
        target.open = false;
        target.commits += 1;
        Ok(())
    }

    fn create_category_index(&mut self, table: &str, _key_column: &str) -> Result<(), StoreError> {
        let target = self.table_mut("create index", table)?;
        let mut seen = std::collections::BTreeSet::new();
        if let Some(duplicate) = target.rows.iter().map(|(cat, _)| *cat).find(|cat| !seen.insert(*cat)) {
            return Err(StoreError::new(
                "create index",
                table,
                MemoryError::DuplicateCategory(duplicate),
            ));
        }
        target.indexed = true;
        Ok(())
    }
}

/// An area the scripted engine reports after building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedArea {
    /// Interior point; `None` simulates a failed computation.
    pub interior: Option<Coord<f64>>,
    /// Area size.
    pub size: f64,
}

/// Topology engine that records calls and serves preset areas.
///
/// Cleaning operations modify nothing and report zero, except
/// `clean_small_angles`, which pops its results from a script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTopology {
    primitives: Vec<Primitive>,
    areas: Vec<ScriptedArea>,
    built: usize,
    small_angle_script: VecDeque<usize>,
    calls: Vec<&'static str>,
}

impl ScriptedTopology {
    /// Engine that reports `areas` when asked to build.
    #[must_use]
    pub fn with_areas(areas: Vec<ScriptedArea>) -> Self {
        Self {
            areas,
            ..Self::default()
        }
    }

    /// Queue modification counts returned by successive small-angle passes.
    #[must_use]
    pub fn with_small_angle_script(mut self, script: impl IntoIterator<Item = usize>) -> Self {
        self.small_angle_script = script.into_iter().collect();
        self
    }

    /// Names of the operations invoked so far.
    #[must_use]
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    fn record(&mut self, call: &'static str) -> usize {
        self.calls.push(call);
        0
    }
}

impl TopologyEngine for ScriptedTopology {
    fn write_primitive(
        &mut self,
        kind: PrimitiveKind,
        coords: LineString<f64>,
        cats: Vec<CategoryPair>,
    ) -> usize {
        self.primitives.push(Primitive { kind, coords, cats });
        self.primitives.len() - 1
    }

    fn primitive_count(&self, kind: PrimitiveKind) -> usize {
        self.primitives.iter().filter(|p| p.kind == kind).count()
    }

    fn snap(&mut self, _threshold: f64) -> usize {
        self.record("snap")
    }

    fn break_polygons(&mut self) -> usize {
        self.record("break_polygons")
    }

    fn remove_duplicates(&mut self) -> usize {
        self.record("remove_duplicates")
    }

    fn break_lines(&mut self) -> usize {
        self.record("break_lines")
    }

    fn clean_small_angles(&mut self) -> usize {
        self.calls.push("clean_small_angles");
        self.small_angle_script.pop_front().unwrap_or(0)
    }

    fn merge_boundaries(&mut self) -> usize {
        self.record("merge_boundaries")
    }

    fn change_dangles_to_lines(&mut self) -> usize {
        self.record("change_dangles_to_lines")
    }

    fn remove_dangles(&mut self) -> usize {
        self.record("remove_dangles")
    }

    fn change_bridges_to_lines(&mut self) -> usize {
        self.record("change_bridges_to_lines")
    }

    fn remove_bridges(&mut self) -> usize {
        self.record("remove_bridges")
    }

    fn build_areas(&mut self) -> usize {
        self.calls.push("build_areas");
        self.built = self.areas.len();
        self.built
    }

    fn area_count(&self) -> usize {
        self.built
    }

    fn point_in_area(&self, area: usize) -> Option<Coord<f64>> {
        self.areas.get(area).and_then(|a| a.interior)
    }

    fn area_size(&self, area: usize) -> f64 {
        self.areas.get(area).map_or(0.0, |a| a.size)
    }

    fn primitives(&self) -> Vec<Primitive> {
        self.primitives.clone()
    }
}
