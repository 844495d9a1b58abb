//! Attribute table layout derived from source field definitions.

use log::{info, warn};

use super::{KeySource, LayerPlan};
use crate::{
    AttributeStore, AttributeValue, ColumnDefn, ColumnType, FeatureSource, FieldDefn, FieldType,
    FieldValue, ImportOptions, StoreError, TableSchema,
};

/// Width of columns holding rendered lists and strings of unknown width.
const DEFAULT_VARCHAR_WIDTH: u32 = 255;

/// Column type for a source field type, `None` when unsupported.
///
/// `width` is the declared string width; zero or absent falls back to 255.
#[must_use]
pub fn column_type_for(field_type: FieldType, width: Option<u32>) -> Option<ColumnType> {
    Some(match field_type {
        FieldType::Integer => ColumnType::Integer,
        FieldType::Integer64 => ColumnType::BigInteger,
        FieldType::Real => ColumnType::DoublePrecision,
        FieldType::Date => ColumnType::Date,
        FieldType::Time => ColumnType::Time,
        FieldType::DateTime => ColumnType::DateTime,
        FieldType::String => {
            ColumnType::Varchar(width.filter(|w| *w > 0).unwrap_or(DEFAULT_VARCHAR_WIDTH))
        }
        FieldType::IntegerList
        | FieldType::Integer64List
        | FieldType::RealList
        | FieldType::StringList => ColumnType::Varchar(DEFAULT_VARCHAR_WIDTH),
        FieldType::WideString | FieldType::Binary => return None,
    })
}

/// Rewrite `name` to `[A-Za-z][A-Za-z0-9_]*`.
///
/// Disallowed characters become `_`; a leading non-letter becomes `x`.
///
/// ```
/// use polyimport_core::pipeline::sanitize_column_name;
///
/// assert_eq!(sanitize_column_name("Road Name"), "Road_Name");
/// assert_eq!(sanitize_column_name("1st"), "xst");
/// ```
#[must_use]
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(position, c)| match (position, c) {
            (0, c) if !c.is_ascii_alphabetic() => 'x',
            (_, c) if c.is_ascii_alphanumeric() || c == '_' => c,
            _ => '_',
        })
        .collect()
}

/// One source field feeding one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnPlan {
    pub(crate) field: usize,
    pub(crate) field_type: FieldType,
}

/// Table layout of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TablePlan {
    pub(crate) schema: TableSchema,
    pub(crate) columns: Vec<ColumnPlan>,
}

impl TablePlan {
    /// Values of one row in column order.
    pub(crate) fn row(&self, values: &[FieldValue]) -> Vec<AttributeValue> {
        self.columns
            .iter()
            .map(|column| {
                let value = values.get(column.field).unwrap_or(&FieldValue::Null);
                attribute_value(column.field_type, value)
            })
            .collect()
    }
}

fn attribute_value(field_type: FieldType, value: &FieldValue) -> AttributeValue {
    match (field_type, value) {
        (_, FieldValue::Null) => AttributeValue::Null,
        (FieldType::Integer | FieldType::Integer64, value) => value
            .as_integer()
            .map_or(AttributeValue::Null, AttributeValue::Integer),
        (FieldType::Real, FieldValue::Real(real)) => AttributeValue::Real(*real),
        (FieldType::Real, value) => value
            .as_integer()
            .map_or(AttributeValue::Null, |int| AttributeValue::Real(int as f64)),
        (FieldType::Date | FieldType::Time | FieldType::DateTime, value) => value
            .to_text()
            .map_or(AttributeValue::Null, |text| {
                AttributeValue::Text(text.replace('/', "-"))
            }),
        (_, value) => value
            .to_text()
            .map_or(AttributeValue::Null, AttributeValue::Text),
    }
}

fn column_name(
    field: &FieldDefn,
    index: usize,
    key_column: &str,
    options: &ImportOptions,
) -> String {
    let mut name = options
        .column_names
        .get(index + 1)
        .cloned()
        .unwrap_or_else(|| sanitize_column_name(&field.name));
    if name.eq_ignore_ascii_case(key_column) {
        name.push('_');
    }
    if options.lowercase_columns {
        name = name.to_ascii_lowercase();
    }
    if name != field.name {
        info!("Column name <{}> renamed to <{name}>", field.name);
    }
    name
}

fn table_plan(fields: &[FieldDefn], plan: &LayerPlan, options: &ImportOptions) -> TablePlan {
    let mut columns = Vec::new();
    let mut defns = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        if plan.key == KeySource::Field(index) {
            continue;
        }
        let name = column_name(field, index, &plan.key_column, options);
        let Some(column_type) = column_type_for(field.field_type, field.width) else {
            warn!(
                "Column type {:?} not supported (column <{name}>)",
                field.field_type
            );
            continue;
        };
        if field.field_type == FieldType::String && field.width.is_none_or(|w| w == 0) {
            warn!(
                "Width for column <{name}> set to {DEFAULT_VARCHAR_WIDTH} (was not specified), \
                 some strings may be truncated"
            );
        }
        if field.field_type.is_list() {
            warn!(
                "Writing column <{name}> with fixed length {DEFAULT_VARCHAR_WIDTH} chars \
                 (may be truncated)"
            );
        }
        defns.push(ColumnDefn { name, column_type });
        columns.push(ColumnPlan {
            field: index,
            field_type: field.field_type,
        });
    }
    TablePlan {
        schema: TableSchema {
            name: plan.table.clone(),
            key_column: plan.key_column.clone(),
            columns: defns,
        },
        columns,
    }
}

pub(crate) fn plan_tables<S: FeatureSource>(
    source: &S,
    plans: &[LayerPlan],
    options: &ImportOptions,
) -> Vec<TablePlan> {
    plans
        .iter()
        .map(|plan| {
            let fields = source
                .layer(plan.index)
                .map_or(&[][..], |info| info.fields.as_slice());
            table_plan(fields, plan, options)
        })
        .collect()
}

pub(crate) fn create_tables<A: AttributeStore + ?Sized>(
    store: &mut A,
    tables: &[TablePlan],
) -> Result<(), StoreError> {
    for table in tables {
        info!("Creating attribute table <{}>", table.schema.name);
        store.create_table(&table.schema)?;
    }
    Ok(())
}
