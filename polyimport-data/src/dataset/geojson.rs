//! GeoJSON geometry objects decoded into `geo` geometries.
//!
//! Positions may carry a third ordinate. It is dropped from the planar
//! geometry, but a value further than [`Z_TOLERANCE`] from zero marks the
//! geometry as 3D so the pipeline can report it.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use polyimport_core::SourceGeometry;
use polyimport_core::geometry::Z_TOLERANCE;
use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons a GeoJSON geometry object cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// The value is not a JSON object with a string `type`.
    #[error("geometry object has no type")]
    MissingType,
    /// The `type` member names no GeoJSON geometry.
    #[error("unknown geometry type <{0}>")]
    UnknownType(String),
    /// Coordinates are absent or not nested as the type requires.
    #[error("malformed coordinates for {0}")]
    Coordinates(&'static str),
}

#[derive(Default)]
struct Decoder {
    is_3d: bool,
}

/// Decode one GeoJSON geometry object.
pub(crate) fn parse_geometry(value: &Value) -> Result<SourceGeometry, GeometryError> {
    let mut decoder = Decoder::default();
    let geometry = decoder.geometry(value)?;
    Ok(SourceGeometry {
        geometry,
        is_3d: decoder.is_3d,
    })
}

impl Decoder {
    fn geometry(&mut self, value: &Value) -> Result<Geometry<f64>, GeometryError> {
        let object = value.as_object().ok_or(GeometryError::MissingType)?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(GeometryError::MissingType)?;
        Ok(match kind {
            "Point" => Point(self.position(coordinates(object, "Point")?, "Point")?).into(),
            "MultiPoint" => MultiPoint(
                self.positions(coordinates(object, "MultiPoint")?, "MultiPoint")?
                    .into_iter()
                    .map(Point)
                    .collect(),
            )
            .into(),
            "LineString" => self.line(coordinates(object, "LineString")?, "LineString")?.into(),
            "MultiLineString" => MultiLineString(self.lines(
                coordinates(object, "MultiLineString")?,
                "MultiLineString",
            )?)
            .into(),
            "Polygon" => self.polygon(coordinates(object, "Polygon")?, "Polygon")?.into(),
            "MultiPolygon" => {
                let members = array(coordinates(object, "MultiPolygon")?, "MultiPolygon")?;
                let polygons = members
                    .iter()
                    .map(|member| self.polygon(member, "MultiPolygon"))
                    .collect::<Result<_, _>>()?;
                MultiPolygon(polygons).into()
            }
            "GeometryCollection" => {
                let members = object
                    .get("geometries")
                    .and_then(Value::as_array)
                    .ok_or(GeometryError::Coordinates("GeometryCollection"))?;
                let geometries = members
                    .iter()
                    .map(|member| self.geometry(member))
                    .collect::<Result<Vec<_>, _>>()?;
                Geometry::GeometryCollection(GeometryCollection(geometries))
            }
            other => return Err(GeometryError::UnknownType(other.to_owned())),
        })
    }

    fn position(&mut self, value: &Value, kind: &'static str) -> Result<Coord<f64>, GeometryError> {
        let ordinates = array(value, kind)?;
        let mut numbers = ordinates.iter().map(Value::as_f64);
        let (Some(Some(x)), Some(Some(y))) = (numbers.next(), numbers.next()) else {
            return Err(GeometryError::Coordinates(kind));
        };
        if let Some(z) = numbers.next() {
            let z = z.ok_or(GeometryError::Coordinates(kind))?;
            if z.abs() > Z_TOLERANCE {
                self.is_3d = true;
            }
        }
        Ok(Coord { x, y })
    }

    fn positions(
        &mut self,
        value: &Value,
        kind: &'static str,
    ) -> Result<Vec<Coord<f64>>, GeometryError> {
        array(value, kind)?
            .iter()
            .map(|position| self.position(position, kind))
            .collect()
    }

    fn line(&mut self, value: &Value, kind: &'static str) -> Result<LineString<f64>, GeometryError> {
        self.positions(value, kind).map(LineString::new)
    }

    fn lines(
        &mut self,
        value: &Value,
        kind: &'static str,
    ) -> Result<Vec<LineString<f64>>, GeometryError> {
        array(value, kind)?
            .iter()
            .map(|line| self.line(line, kind))
            .collect()
    }

    fn polygon(&mut self, value: &Value, kind: &'static str) -> Result<Polygon<f64>, GeometryError> {
        let mut rings = self.lines(value, kind)?.into_iter();
        let exterior = rings.next().ok_or(GeometryError::Coordinates(kind))?;
        Ok(Polygon::new(exterior, rings.collect()))
    }
}

fn coordinates<'a>(
    object: &'a Map<String, Value>,
    kind: &'static str,
) -> Result<&'a Value, GeometryError> {
    object
        .get("coordinates")
        .ok_or(GeometryError::Coordinates(kind))
}

fn array<'a>(value: &'a Value, kind: &'static str) -> Result<&'a [Value], GeometryError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or(GeometryError::Coordinates(kind))
}
