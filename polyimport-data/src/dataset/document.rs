//! Serde model of a dataset document and its conversion into features.

use std::collections::BTreeMap;

use geo::BoundingRect;
use polyimport_core::{
    Extent, Feature, FieldDefn, FieldType, FieldValue, LayerCrs, LayerInfo, ProjectionInfo,
    SourceGeometry,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::DatasetError;
use super::geojson::parse_geometry;

const DEFAULT_GEOMETRY_FIELD: &str = "geometry";

/// Top-level dataset document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct DatasetDocument {
    /// Serve records through one shared cursor in document order.
    #[serde(default)]
    pub(super) interleaved: bool,
    pub(super) layers: Vec<LayerDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CrsDocument {
    Marker(CrsMarker),
    Defined(ProjectionInfo),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CrsMarker {
    Unreadable,
}

fn layer_crs(value: Option<CrsDocument>) -> LayerCrs {
    match value {
        None => LayerCrs::Missing,
        Some(CrsDocument::Marker(CrsMarker::Unreadable)) => LayerCrs::Unreadable,
        Some(CrsDocument::Defined(info)) => LayerCrs::Defined(info),
    }
}

fn default_geometry_fields() -> Vec<String> {
    vec![DEFAULT_GEOMETRY_FIELD.to_owned()]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct LayerDocument {
    name: String,
    #[serde(default)]
    fid_column: Option<String>,
    #[serde(default)]
    crs: Option<CrsDocument>,
    #[serde(default)]
    fields: Vec<FieldDefn>,
    #[serde(default = "default_geometry_fields")]
    geometry_fields: Vec<String>,
    /// `[xmin, ymin, xmax, ymax]`; computed from the features when absent.
    #[serde(default)]
    extent: Option<[f64; 4]>,
    #[serde(default)]
    features: Vec<FeatureDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeatureDocument {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    properties: Map<String, Value>,
    /// Geometry of the first geometry field.
    #[serde(default)]
    geometry: Option<Value>,
    /// Geometries keyed by geometry field name.
    #[serde(default)]
    geometries: BTreeMap<String, Value>,
}

/// A decoded layer ready to serve features.
#[derive(Debug)]
pub(super) struct DecodedLayer {
    pub(super) info: LayerInfo,
    pub(super) crs: LayerCrs,
    pub(super) extent: Option<Extent>,
    pub(super) features: Vec<Feature>,
}

impl LayerDocument {
    pub(super) fn decode(self) -> Result<DecodedLayer, DatasetError> {
        let info = LayerInfo {
            name: self.name,
            fields: self.fields,
            geometry_fields: self.geometry_fields,
            fid_column: self.fid_column,
        };
        let features = self
            .features
            .into_iter()
            .enumerate()
            .map(|(position, feature)| feature.decode(&info, position))
            .collect::<Result<Vec<_>, _>>()?;
        let extent = match self.extent {
            Some([xmin, ymin, xmax, ymax]) => Some(Extent::new(xmin, ymin, xmax, ymax)),
            None => computed_extent(&features),
        };
        Ok(DecodedLayer {
            info,
            crs: layer_crs(self.crs),
            extent,
            features,
        })
    }
}

fn computed_extent(features: &[Feature]) -> Option<Extent> {
    features
        .iter()
        .flat_map(|feature| feature.geometries.iter().flatten())
        .filter_map(|geometry| geometry.geometry.bounding_rect())
        .map(|rect| Extent::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
        .reduce(|lhs, rhs| lhs.union(&rhs))
}

impl FeatureDocument {
    fn decode(mut self, layer: &LayerInfo, position: usize) -> Result<Feature, DatasetError> {
        let fid = match self.id {
            Some(id) => id,
            None => i64::try_from(position).map_err(|_| DatasetError::FeatureId {
                layer: layer.name.clone(),
                position,
            })?,
        };
        let values = layer
            .fields
            .iter()
            .map(|field| {
                let value = self.properties.remove(&field.name).unwrap_or(Value::Null);
                field_value(field, value).ok_or_else(|| DatasetError::FieldValue {
                    layer: layer.name.clone(),
                    fid,
                    field: field.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut primary = self.geometry.take();
        let geometries = layer
            .geometry_fields
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let value = self
                    .geometries
                    .remove(name)
                    .or_else(|| if index == 0 { primary.take() } else { None });
                decode_geometry(layer, fid, value)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Feature {
            fid,
            values,
            geometries,
        })
    }
}

fn decode_geometry(
    layer: &LayerInfo,
    fid: i64,
    value: Option<Value>,
) -> Result<Option<SourceGeometry>, DatasetError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            parse_geometry(&value)
                .map(Some)
                .map_err(|source| DatasetError::Geometry {
                    layer: layer.name.clone(),
                    fid,
                    source,
                })
        }
    }
}

/// Convert a JSON property into the value of a declared field.
///
/// Returns `None` when the JSON type cannot represent the field type.
fn field_value(field: &FieldDefn, value: Value) -> Option<FieldValue> {
    Some(match (field.field_type, value) {
        (_, Value::Null) => FieldValue::Null,
        (FieldType::Integer | FieldType::Integer64, Value::Number(number)) => {
            FieldValue::Integer(number.as_i64()?)
        }
        (FieldType::Integer | FieldType::Integer64, Value::Bool(flag)) => {
            FieldValue::Integer(i64::from(flag))
        }
        (FieldType::Real, Value::Number(number)) => FieldValue::Real(number.as_f64()?),
        (FieldType::IntegerList | FieldType::Integer64List, Value::Array(items)) => {
            FieldValue::IntegerList(items.iter().map(Value::as_i64).collect::<Option<_>>()?)
        }
        (FieldType::RealList, Value::Array(items)) => {
            FieldValue::RealList(items.iter().map(Value::as_f64).collect::<Option<_>>()?)
        }
        (FieldType::StringList, Value::Array(items)) => {
            FieldValue::TextList(items.into_iter().map(scalar_text).collect::<Option<_>>()?)
        }
        (_, Value::Array(_) | Value::Object(_)) => return None,
        (_, scalar) => FieldValue::Text(scalar_text(scalar)?),
    })
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
