//! Layer schemas and the features read from them.
//!
//! A source is an ordered collection of [`LayerInfo`] descriptions. Each
//! layer yields [`Feature`] records: typed attribute values, one optional
//! geometry per geometry field, and a source-assigned feature id.

use geo::Geometry;

/// Attribute column types a source may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Integer64,
    /// Double precision floating point.
    Real,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
    /// Character string.
    String,
    /// List of 32-bit integers.
    IntegerList,
    /// List of 64-bit integers.
    Integer64List,
    /// List of doubles.
    RealList,
    /// List of strings.
    StringList,
    /// Double byte string.
    WideString,
    /// Raw binary payload.
    Binary,
}

impl FieldType {
    /// Whether the type can carry category values.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Integer | Self::Integer64)
    }

    /// Whether the type is one of the list variants.
    #[must_use]
    pub const fn is_list(self) -> bool {
        matches!(
            self,
            Self::IntegerList | Self::Integer64List | Self::RealList | Self::StringList
        )
    }
}

/// Definition of one attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDefn {
    /// Column name as reported by the source.
    pub name: String,
    /// Column type.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub field_type: FieldType,
    /// Declared width for string columns, when known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub width: Option<u32>,
}

impl FieldDefn {
    /// Construct a field definition without a declared width.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            width: None,
        }
    }

    /// Attach a declared width.
    #[must_use]
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }
}

/// Schema of one source layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Layer name; interleaved reading matches records by this name.
    pub name: String,
    /// Attribute columns in source order.
    pub fields: Vec<FieldDefn>,
    /// Geometry field names in source order.
    pub geometry_fields: Vec<String>,
    /// Name of the column holding the feature id, if the source exposes one.
    pub fid_column: Option<String>,
}

impl LayerInfo {
    /// Index of the named attribute field.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Index of the named geometry field.
    #[must_use]
    pub fn geometry_field_index(&self, name: &str) -> Option<usize> {
        self.geometry_fields.iter().position(|field| field == name)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The field is unset.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text, including dates and times in their textual form.
    Text(String),
    /// List of integers.
    IntegerList(Vec<i64>),
    /// List of doubles.
    RealList(Vec<f64>),
    /// List of strings.
    TextList(Vec<String>),
}

impl FieldValue {
    /// Interpret the value as an integer, truncating reals.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.is_finite() => Some(value.trunc() as i64),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render the value as text, `None` when unset or empty.
    ///
    /// Lists use the `(count:item,item)` notation.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        let rendered = match self {
            Self::Null => return None,
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::IntegerList(items) => render_list(items),
            Self::RealList(items) => render_list(items),
            Self::TextList(items) => render_list(items),
        };
        (!rendered.is_empty()).then_some(rendered)
    }
}

fn render_list<T: ToString>(items: &[T]) -> String {
    let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("({}:{})", items.len(), joined.join(","))
}

/// A geometry as read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceGeometry {
    /// Planar geometry.
    pub geometry: Geometry<f64>,
    /// Whether any coordinate carried a significant third dimension.
    pub is_3d: bool,
}

impl SourceGeometry {
    /// Wrap a 2D geometry.
    #[must_use]
    pub const fn planar(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            is_3d: false,
        }
    }
}

/// One record from a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Source-assigned feature id.
    pub fid: i64,
    /// Attribute values, aligned with [`LayerInfo::fields`].
    pub values: Vec<FieldValue>,
    /// Geometries, aligned with [`LayerInfo::geometry_fields`].
    pub geometries: Vec<Option<SourceGeometry>>,
}

impl Feature {
    /// Value of the field at `index`, `Null` when out of range.
    #[must_use]
    pub fn value(&self, index: usize) -> &FieldValue {
        self.values.get(index).unwrap_or(&FieldValue::Null)
    }

    /// Geometry of the geometry field at `index`.
    #[must_use]
    pub fn geometry(&self, index: usize) -> Option<&SourceGeometry> {
        self.geometries.get(index).and_then(Option::as_ref)
    }
}
