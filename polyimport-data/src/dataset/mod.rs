//! Layered vector datasets stored as JSON documents.
//!
//! A document lists layers; each layer declares its attribute fields,
//! geometry fields, optional id column, projection and features. Feature
//! geometries are GeoJSON geometry objects:
//!
//! ```json
//! {
//!   "layers": [{
//!     "name": "parcels",
//!     "crs": { "info": { "proj": "utm", "zone": "32" }, "units": { "unit": "meter" } },
//!     "fields": [{ "name": "zone", "type": "string", "width": 8 }],
//!     "features": [{
//!       "id": 1,
//!       "properties": { "zone": "R1" },
//!       "geometry": { "type": "Point", "coordinates": [10.0, 20.0] }
//!     }]
//!   }]
//! }
//! ```
//!
//! A layer `crs` of `"unreadable"` models a projection that is present but
//! cannot be interpreted. Documents with `"interleaved": true` serve every
//! layer through one shared cursor that visits features round-robin across
//! layers, the way streaming formats deliver mixed records.

mod document;
mod geojson;
mod where_clause;

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use geo::{BoundingRect, Intersects, Polygon};
use log::debug;
use polyimport_core::{
    AccessMode, Extent, Feature, FeatureSource, LayerCrs, LayerInfo, SourceError, SourceRecord,
};
use thiserror::Error;

use document::{DatasetDocument, DecodedLayer};
pub use geojson::GeometryError;
pub use where_clause::{WhereClause, WhereError};

/// Errors raised while loading a dataset document.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The document could not be read from disk.
    #[error("failed to read dataset {path}")]
    Read {
        /// Document path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The document is not valid JSON or does not follow the layout.
    #[error("malformed dataset document")]
    Parse {
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// A feature without an explicit id sits beyond the representable range.
    #[error("feature {position} of layer <{layer}> has no representable id")]
    FeatureId {
        /// Layer name.
        layer: String,
        /// Zero-based position of the feature in the layer.
        position: usize,
    },
    /// A property does not fit the declared field type.
    #[error("value of field <{field}> in feature {fid} of layer <{layer}> does not match its type")]
    FieldValue {
        /// Layer name.
        layer: String,
        /// Feature id.
        fid: i64,
        /// Field name.
        field: String,
    },
    /// A geometry object could not be decoded.
    #[error("invalid geometry in feature {fid} of layer <{layer}>")]
    Geometry {
        /// Layer name.
        layer: String,
        /// Feature id.
        fid: i64,
        /// Decoding failure.
        #[source]
        source: GeometryError,
    },
}

#[derive(Debug)]
struct DatasetLayer {
    decoded: DecodedLayer,
    spatial: Option<Polygon<f64>>,
    attribute: Option<WhereClause>,
    cursor: usize,
}

impl DatasetLayer {
    fn new(decoded: DecodedLayer) -> Self {
        Self {
            decoded,
            spatial: None,
            attribute: None,
            cursor: 0,
        }
    }

    /// Features without geometry pass the spatial filter.
    fn accepts(&self, feature: &Feature) -> bool {
        let inside = self.spatial.as_ref().is_none_or(|filter| {
            let mut rects = feature
                .geometries
                .iter()
                .flatten()
                .filter_map(|g| g.geometry.bounding_rect())
                .peekable();
            rects.peek().is_none() || rects.any(|rect| rect.intersects(filter))
        });
        inside
            && self
                .attribute
                .as_ref()
                .is_none_or(|clause| clause.matches(feature))
    }
}

/// A [`FeatureSource`] backed by an in-memory JSON dataset document.
///
/// Spatial filters compare feature bounding boxes with the filter polygon.
/// Attribute filters use the [`WhereClause`] dialect.
#[derive(Debug)]
pub struct JsonDataset {
    layers: Vec<DatasetLayer>,
    access: AccessMode,
    shared_order: Vec<(usize, usize)>,
    shared_cursor: usize,
}

impl JsonDataset {
    /// Load a dataset document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Read`] when the file cannot be read and the
    /// errors of [`Self::from_json_str`] otherwise.
    pub fn open(path: &Utf8Path) -> Result<Self, DatasetError> {
        let text = polyimport_fs::read_text(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_json_str(&text)?;
        debug!("Opened dataset {path} with {} layers", dataset.layers.len());
        Ok(dataset)
    }

    /// Parse a dataset document.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Parse`] for malformed JSON and the decoding
    /// errors for mistyped properties or geometries.
    pub fn from_json_str(text: &str) -> Result<Self, DatasetError> {
        let document: DatasetDocument =
            serde_json::from_str(text).map_err(|source| DatasetError::Parse { source })?;
        let layers = document
            .layers
            .into_iter()
            .map(|layer| layer.decode().map(DatasetLayer::new))
            .collect::<Result<Vec<_>, _>>()?;
        let access = if document.interleaved {
            AccessMode::Interleaved
        } else {
            AccessMode::Sequential
        };
        let shared_order = round_robin(&layers);
        Ok(Self {
            layers,
            access,
            shared_order,
            shared_cursor: 0,
        })
    }

    fn layer_mut(&mut self, index: usize) -> Result<&mut DatasetLayer, SourceError> {
        self.layers
            .get_mut(index)
            .ok_or(SourceError::NoSuchLayer { index })
    }
}

fn round_robin(layers: &[DatasetLayer]) -> Vec<(usize, usize)> {
    let longest = layers
        .iter()
        .map(|layer| layer.decoded.features.len())
        .max()
        .unwrap_or(0);
    (0..longest)
        .flat_map(|position| {
            layers
                .iter()
                .enumerate()
                .filter(move |(_, layer)| position < layer.decoded.features.len())
                .map(move |(index, _)| (index, position))
        })
        .collect()
}

impl FeatureSource for JsonDataset {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer(&self, index: usize) -> Option<&LayerInfo> {
        self.layers.get(index).map(|layer| &layer.decoded.info)
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
        target.attribute = match filter {
            None => None,
            Some(text) => Some(WhereClause::parse(text, &target.decoded.info).map_err(
                |source| SourceError::FilterRejected {
                    layer: target.decoded.info.name.clone(),
                    filter: text.to_owned(),
                    source: Box::new(source),
                },
            )?),
        };
        Ok(())
    }

    fn reset_layer(&mut self, layer: usize) -> Result<(), SourceError> {
        self.layer_mut(layer)?.cursor = 0;
        Ok(())
    }

    fn next_layer_feature(&mut self, layer: usize) -> Result<Option<Feature>, SourceError> {
        if self.access == AccessMode::Interleaved {
            return Ok(None);
        }
        let target = self.layer_mut(layer)?;
        while let Some(feature) = target.decoded.features.get(target.cursor) {
            target.cursor += 1;
            if target.accepts(feature) {
                return Ok(Some(feature.clone()));
            }
        }
        Ok(None)
    }

    fn reset_source(&mut self) -> Result<(), SourceError> {
        self.shared_cursor = 0;
        Ok(())
    }

    fn next_source_feature(&mut self) -> Result<Option<SourceRecord>, SourceError> {
        if self.access == AccessMode::Sequential {
            return Ok(None);
        }
        while let Some(&(layer, position)) = self.shared_order.get(self.shared_cursor) {
            self.shared_cursor += 1;
            let Some(owner) = self.layers.get(layer) else {
                continue;
            };
            let Some(feature) = owner.decoded.features.get(position) else {
                continue;
            };
            if owner.accepts(feature) {
                return Ok(Some(SourceRecord {
                    layer: owner.decoded.info.name.clone(),
                    feature: feature.clone(),
                }));
            }
        }
        Ok(None)
    }

    fn feature_count(&self, layer: usize) -> Option<u64> {
        let layer = self.layers.get(layer)?;
        let count = layer
            .decoded
            .features
            .iter()
            .filter(|feature| layer.accepts(feature))
            .count();
        u64::try_from(count).ok()
    }

    fn extent(&self, layer: usize) -> Option<Extent> {
        self.layers.get(layer).and_then(|layer| layer.decoded.extent)
    }

    fn spatial_reference(&self, layer: usize) -> LayerCrs {
        self.layers
            .get(layer)
            .map(|layer| layer.decoded.crs.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const PARCELS: &str = r#"{
        "layers": [
            {
                "name": "parcels",
                "fields": [{ "name": "zone", "type": "string", "width": 4 }],
                "features": [
                    { "id": 1, "properties": { "zone": "R1" },
                      "geometry": { "type": "Point", "coordinates": [1.0, 1.0] } },
                    { "id": 2, "properties": { "zone": "C2" },
                      "geometry": { "type": "Point", "coordinates": [50.0, 50.0] } },
                    { "id": 3, "properties": { "zone": "R1" } }
                ]
            },
            {
                "name": "roads",
                "crs": "unreadable",
                "features": [
                    { "id": 7, "geometry": { "type": "LineString",
                      "coordinates": [[0.0, 0.0], [5.0, 0.0]] } }
                ]
            }
        ]
    }"#;

    #[fixture]
    fn dataset() -> JsonDataset {
        JsonDataset::from_json_str(PARCELS).expect("dataset")
    }

    fn drain(dataset: &mut JsonDataset, layer: usize) -> Vec<i64> {
        dataset.reset_layer(layer).expect("reset");
        std::iter::from_fn(|| dataset.next_layer_feature(layer).expect("read"))
            .map(|feature| feature.fid)
            .collect()
    }

    #[rstest]
    fn reads_layers_sequentially(mut dataset: JsonDataset) {
        assert_eq!(dataset.access_mode(), AccessMode::Sequential);
        assert_eq!(dataset.layer_index("roads"), Some(1));
        assert_eq!(drain(&mut dataset, 0), vec![1, 2, 3]);
        assert_eq!(drain(&mut dataset, 1), vec![7]);
        assert_eq!(dataset.spatial_reference(1), LayerCrs::Unreadable);
        assert_eq!(dataset.spatial_reference(0), LayerCrs::Missing);
        assert_eq!(dataset.extent(0), Some(Extent::new(1.0, 1.0, 50.0, 50.0)));
    }

    #[rstest]
    fn spatial_filter_keeps_features_without_geometry(mut dataset: JsonDataset) {
        let window = Extent::new(0.0, 0.0, 10.0, 10.0).to_polygon();
        dataset.set_spatial_filter(0, Some(&window)).expect("filter");
        assert_eq!(drain(&mut dataset, 0), vec![1, 3]);
        assert_eq!(dataset.feature_count(0), Some(2));
        dataset.set_spatial_filter(0, None).expect("clear");
        assert_eq!(dataset.feature_count(0), Some(3));
    }

    #[rstest]
    fn attribute_filter_combines_with_spatial(mut dataset: JsonDataset) {
        let window = Extent::new(0.0, 0.0, 10.0, 10.0).to_polygon();
        dataset.set_spatial_filter(0, Some(&window)).expect("filter");
        dataset
            .set_attribute_filter(0, Some("zone = 'R1' AND fid > 1"))
            .expect("where");
        assert_eq!(drain(&mut dataset, 0), vec![3]);
    }

    #[rstest]
    fn unparsable_filters_are_rejected(mut dataset: JsonDataset) {
        let error = dataset
            .set_attribute_filter(0, Some("zone LIKE 'R%'"))
            .expect_err("rejected");
        assert!(matches!(error, SourceError::FilterRejected { ref layer, .. } if layer == "parcels"));
        assert!(matches!(
            dataset.set_attribute_filter(5, None),
            Err(SourceError::NoSuchLayer { index: 5 })
        ));
    }

    #[rstest]
    fn interleaved_documents_share_one_cursor() {
        let text = PARCELS.replacen('{', r#"{ "interleaved": true,"#, 1);
        let mut dataset = JsonDataset::from_json_str(&text).expect("dataset");
        assert_eq!(dataset.access_mode(), AccessMode::Interleaved);
        assert_eq!(dataset.next_layer_feature(0).expect("read"), None);
        dataset.reset_source().expect("reset");
        let order: Vec<(String, i64)> =
            std::iter::from_fn(|| dataset.next_source_feature().expect("read"))
                .map(|record| (record.layer, record.feature.fid))
                .collect();
        assert_eq!(
            order,
            vec![
                ("parcels".to_owned(), 1),
                ("roads".to_owned(), 7),
                ("parcels".to_owned(), 2),
                ("parcels".to_owned(), 3),
            ]
        );
    }

    #[rstest]
    fn reports_malformed_documents() {
        assert!(matches!(
            JsonDataset::from_json_str("{ \"layers\": 3 }"),
            Err(DatasetError::Parse { .. })
        ));
        let bad_geometry = r#"{ "layers": [{ "name": "a", "features": [
            { "id": 9, "geometry": { "type": "Circle", "coordinates": [] } }
        ] }] }"#;
        assert!(matches!(
            JsonDataset::from_json_str(bad_geometry),
            Err(DatasetError::Geometry { fid: 9, .. })
        ));
    }
}
