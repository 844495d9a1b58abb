//! Projection compatibility checks.
//!
//! Projections are opaque key/value metadata. Two definitions are compatible
//! when their keys and values agree, ignoring the descriptive `name` entry.
//! The full listings are kept so that a mismatch can be reported verbatim.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use log::{info, warn};
use thiserror::Error;

const IGNORED_KEYS: [&str; 1] = ["name"];

/// Key/value description of a coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectionInfo {
    /// Projection parameters (`proj`, `zone`, `datum`, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub info: BTreeMap<String, String>,
    /// Unit parameters (`unit`, `meters`, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub units: BTreeMap<String, String>,
}

impl ProjectionInfo {
    /// Whether both definitions describe the same system.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        significant(&self.info).eq(significant(&other.info)) && self.units == other.units
    }

    fn describe(&self, heading: &str, out: &mut String) {
        let _ = writeln!(out, "{heading} projection:");
        for (key, value) in &self.info {
            let _ = writeln!(out, "  {key}: {value}");
        }
        for (key, value) in &self.units {
            let _ = writeln!(out, "  units.{key}: {value}");
        }
    }
}

fn significant(map: &BTreeMap<String, String>) -> impl Iterator<Item = (&String, &String)> {
    map.iter()
        .filter(|(key, _)| !IGNORED_KEYS.contains(&key.as_str()))
}

/// Projection of one layer as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LayerCrs {
    /// The layer carries no projection.
    #[default]
    Missing,
    /// A projection is present but cannot be interpreted.
    Unreadable,
    /// A usable projection definition.
    Defined(ProjectionInfo),
}

impl LayerCrs {
    fn definition(&self) -> Option<&ProjectionInfo> {
        match self {
            Self::Defined(info) => Some(info),
            Self::Missing | Self::Unreadable => None,
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Missing, Self::Missing) => true,
            (Self::Defined(lhs), Self::Defined(rhs)) => lhs.matches(rhs),
            _ => false,
        }
    }
}

/// Errors raised while comparing projections.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    /// Input layers disagree; they must be imported separately.
    #[error(
        "projection of layer <{layer}> differs from layer <{reference}>; \
         input layers must be imported separately"
    )]
    LayersDiffer {
        /// Layer whose projection differs.
        layer: String,
        /// Layer it was compared against.
        reference: String,
    },
    /// Projection of the input cannot be interpreted.
    #[error("unable to interpret the projection of layer <{layer}>")]
    Unreadable {
        /// Offending layer.
        layer: String,
    },
    /// Input projection does not match the target projection.
    #[error(
        "projection of dataset does not appear to match the target projection\n{details}\
         Use the projection override to ignore the differences."
    )]
    Mismatch {
        /// Both projection listings.
        details: String,
    },
}

/// Outcome of comparing the input with the target projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionVerdict {
    /// Input and target agree.
    Matches,
    /// A difference was ignored because the override was requested.
    Overridden,
}

/// Verify that all selected layers share one projection.
///
/// `layers` pairs each layer name with its projection. A set where every
/// projection is unreadable is accepted with a warning.
pub fn check_layer_projections(layers: &[(String, LayerCrs)]) -> Result<(), ProjectionError> {
    if layers.len() < 2 {
        return Ok(());
    }
    let Some(first_readable) = layers
        .iter()
        .position(|(_, crs)| !matches!(crs, LayerCrs::Unreadable))
    else {
        warn!("Layer projections are unreadable");
        return Ok(());
    };
    if let Some((name, _)) = layers.get(..first_readable).and_then(<[_]>::first) {
        warn!("Projection for layer <{name}> is unreadable");
        return Err(ProjectionError::LayersDiffer {
            layer: name.clone(),
            reference: layers
                .get(first_readable)
                .map(|(reference, _)| reference.clone())
                .unwrap_or_default(),
        });
    }
    for pair in layers.windows(2) {
        let [(reference, lhs), (layer, rhs)] = pair else {
            continue;
        };
        if !lhs.same_as(rhs) {
            warn!("Projection of layer <{layer}> is different from projection of layer <{reference}>");
            return Err(ProjectionError::LayersDiffer {
                layer: layer.clone(),
                reference: reference.clone(),
            });
        }
    }
    Ok(())
}

/// Compare the input projection with the target projection.
///
/// `target` of `None` denotes an unreferenced target, which matches a layer
/// without projection. With `override_check` every problem downgrades to a
/// warning.
pub fn check_target_projection(
    layer: &str,
    input: &LayerCrs,
    target: Option<&ProjectionInfo>,
    override_check: bool,
) -> Result<ProjectionVerdict, ProjectionError> {
    if matches!(input, LayerCrs::Unreadable) {
        if !override_check {
            return Err(ProjectionError::Unreadable {
                layer: layer.to_owned(),
            });
        }
        warn!("Unable to interpret the projection of layer <{layer}>");
    }
    if override_check {
        info!("Over-riding projection check");
        return Ok(ProjectionVerdict::Overridden);
    }
    let agrees = match (input.definition(), target) {
        (None, None) => matches!(input, LayerCrs::Missing),
        (Some(lhs), Some(rhs)) => lhs.matches(rhs),
        _ => false,
    };
    if agrees {
        info!("Projection of input dataset and target appear to match");
        return Ok(ProjectionVerdict::Matches);
    }
    let mut details = String::new();
    match target {
        Some(target) => target.describe("Target", &mut details),
        None => details.push_str("Target projection: unreferenced\n"),
    }
    match input.definition() {
        Some(input) => input.describe("Dataset", &mut details),
        None => details.push_str("Dataset projection: unreferenced/unknown\n"),
    }
    Err(ProjectionError::Mismatch { details })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn projection(pairs: &[(&str, &str)]) -> ProjectionInfo {
        ProjectionInfo {
            info: pairs
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                .collect(),
            units: BTreeMap::from([("unit".to_owned(), "meter".to_owned())]),
        }
    }

    #[fixture]
    fn utm32() -> ProjectionInfo {
        projection(&[("name", "UTM 32"), ("proj", "utm"), ("zone", "32")])
    }

    #[rstest]
    fn names_are_not_significant(utm32: ProjectionInfo) {
        let renamed = projection(&[("name", "other"), ("proj", "utm"), ("zone", "32")]);
        assert!(utm32.matches(&renamed));
    }

    #[rstest]
    fn differing_layers_are_rejected(utm32: ProjectionInfo) {
        let layers = vec![
            ("a".to_owned(), LayerCrs::Defined(utm32)),
            (
                "b".to_owned(),
                LayerCrs::Defined(projection(&[("proj", "utm"), ("zone", "33")])),
            ),
        ];
        let err = check_layer_projections(&layers).expect_err("zones differ");
        assert!(matches!(err, ProjectionError::LayersDiffer { layer, .. } if layer == "b"));
    }

    #[rstest]
    fn all_unreadable_layers_are_accepted() {
        let layers = vec![
            ("a".to_owned(), LayerCrs::Unreadable),
            ("b".to_owned(), LayerCrs::Unreadable),
        ];
        assert!(check_layer_projections(&layers).is_ok());
    }

    #[rstest]
    fn leading_unreadable_layer_is_rejected(utm32: ProjectionInfo) {
        let layers = vec![
            ("a".to_owned(), LayerCrs::Unreadable),
            ("b".to_owned(), LayerCrs::Defined(utm32)),
        ];
        assert!(check_layer_projections(&layers).is_err());
    }

    #[rstest]
    fn mismatch_lists_both_definitions(utm32: ProjectionInfo) {
        let target = projection(&[("proj", "ll")]);
        let err = check_target_projection("a", &LayerCrs::Defined(utm32), Some(&target), false)
            .expect_err("mismatch");
        let ProjectionError::Mismatch { details } = err else {
            panic!("expected mismatch");
        };
        assert!(details.contains("zone: 32"));
        assert!(details.contains("proj: ll"));
    }

    #[rstest]
    fn override_downgrades_problems(utm32: ProjectionInfo) {
        let verdict = check_target_projection("a", &LayerCrs::Unreadable, Some(&utm32), true)
            .expect("override accepts");
        assert_eq!(verdict, ProjectionVerdict::Overridden);
    }

    #[rstest]
    fn unreferenced_input_matches_unreferenced_target() {
        let verdict =
            check_target_projection("a", &LayerCrs::Missing, None, false).expect("both unset");
        assert_eq!(verdict, ProjectionVerdict::Matches);
    }
}
