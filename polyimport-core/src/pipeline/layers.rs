//! Layer selection, key column resolution and projection checks.

use log::warn;

use super::{ConfigError, KeySource, LayerPlan};
use crate::{
    FeatureSource, ImportOptions, LayerInfo, ProjectionError, ProjectionVerdict,
    check_layer_projections, check_target_projection, is_legal_name,
};

/// Default name of the category column.
pub(crate) const DEFAULT_KEY_COLUMN: &str = "cat";

pub(crate) fn plan_layers<S: FeatureSource>(
    source: &S,
    options: &ImportOptions,
) -> Result<Vec<LayerPlan>, ConfigError> {
    if source.layer_count() == 0 {
        return Err(ConfigError::NoLayers);
    }
    if !is_legal_name(&options.output) {
        return Err(ConfigError::IllegalName {
            name: options.output.clone(),
        });
    }

    let indices: Vec<usize> = if options.layers.is_empty() {
        (0..source.layer_count()).collect()
    } else {
        options
            .layers
            .iter()
            .map(|name| {
                source
                    .layer_index(name)
                    .ok_or_else(|| ConfigError::UnknownLayer { name: name.clone() })
            })
            .collect::<Result<_, _>>()?
    };
    if options.layers.is_empty() && indices.len() > 1 {
        warn!(
            "All available layers will be imported into output <{}>",
            options.output
        );
    }

    let single = indices.len() == 1;
    indices
        .into_iter()
        .enumerate()
        .map(|(position, index)| {
            let info = source
                .layer(index)
                .ok_or(ConfigError::NoLayers)?;
            plan_layer(info, index, position, single, options)
        })
        .collect()
}

fn plan_layer(
    info: &LayerInfo,
    index: usize,
    position: usize,
    single: bool,
    options: &ImportOptions,
) -> Result<LayerPlan, ConfigError> {
    let field = u32::try_from(position + 1).unwrap_or(u32::MAX);
    let geometry = options
        .geometry_column
        .as_ref()
        .map(|column| {
            info.geometry_field_index(column)
                .ok_or_else(|| ConfigError::MissingGeometryColumn {
                    layer: info.name.clone(),
                    column: column.clone(),
                })
        })
        .transpose()?;
    let (key, mut key_column) = resolve_key(info, options.key_column.as_deref())?;
    if let Some(rename) = options.column_names.first() {
        key_column = rename.clone();
    }
    let table = if single {
        options.output.clone()
    } else {
        format!("{}_{field}", options.output)
    };
    Ok(LayerPlan {
        index,
        position,
        name: info.name.clone(),
        field,
        table,
        geometry,
        key,
        key_column,
    })
}

fn resolve_key(info: &LayerInfo, key: Option<&str>) -> Result<(KeySource, String), ConfigError> {
    let Some(key) = key else {
        return Ok((KeySource::Sequential, DEFAULT_KEY_COLUMN.to_owned()));
    };
    if info.fid_column.as_deref() == Some(key) {
        return Ok((KeySource::Fid, key.to_owned()));
    }
    let index = info
        .field_index(key)
        .ok_or_else(|| ConfigError::KeyColumnNotFound {
            layer: info.name.clone(),
            column: key.to_owned(),
        })?;
    let is_integer = info
        .fields
        .get(index)
        .is_some_and(|field| field.field_type.is_integer());
    if !is_integer {
        return Err(ConfigError::KeyColumnNotInteger {
            layer: info.name.clone(),
            column: key.to_owned(),
        });
    }
    Ok((KeySource::Field(index), key.to_owned()))
}

pub(crate) fn check_projections<S: FeatureSource>(
    source: &S,
    plans: &[LayerPlan],
    options: &ImportOptions,
) -> Result<ProjectionVerdict, ProjectionError> {
    let layers: Vec<_> = plans
        .iter()
        .map(|plan| (plan.name.clone(), source.spatial_reference(plan.index)))
        .collect();
    match check_layer_projections(&layers) {
        Err(err) if options.override_projection => warn!("{err}"),
        other => other?,
    }
    let Some((name, crs)) = layers.first() else {
        return Ok(ProjectionVerdict::Matches);
    };
    check_target_projection(
        name,
        crs,
        options.target_projection.as_ref(),
        options.override_projection,
    )
}
