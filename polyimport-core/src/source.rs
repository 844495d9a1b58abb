//! Read access to a multi-layer feature source.
//!
//! The [`FeatureSource`] trait is the narrow contract the pipeline consumes.
//! Sources expose either one cursor per layer or a single cursor shared by
//! every layer; [`AccessMode`] tells the stream which of the two families of
//! cursor methods is meaningful.

use std::error::Error as StdError;

use geo::Polygon;
use thiserror::Error;

use crate::{Extent, Feature, LayerCrs, LayerInfo};

/// How the source positions its read cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Every layer owns an independent cursor.
    Sequential,
    /// One cursor multiplexes the records of all layers.
    Interleaved,
}

/// A record read from the shared cursor together with its owning layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Name of the layer that produced the feature.
    pub layer: String,
    /// The feature itself.
    pub feature: Feature,
}

/// Errors reported by a [`FeatureSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The attribute filter could not be applied.
    #[error("attribute filter <{filter}> rejected for layer <{layer}>")]
    FilterRejected {
        /// Layer the filter was applied to.
        layer: String,
        /// The filter expression.
        filter: String,
        /// Parser or driver failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The layer index is out of range.
    #[error("layer {index} does not exist")]
    NoSuchLayer {
        /// Offending index.
        index: usize,
    },
    /// Reading the next record failed.
    #[error("failed to read from layer <{layer}>")]
    Read {
        /// Layer being read.
        layer: String,
        /// Driver failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Layered feature source consumed by the import pipeline.
///
/// Sources with [`AccessMode::Sequential`] must implement
/// [`reset_layer`](Self::reset_layer) and
/// [`next_layer_feature`](Self::next_layer_feature); interleaved sources
/// must implement [`reset_source`](Self::reset_source) and
/// [`next_source_feature`](Self::next_source_feature). The other pair may
/// return `Ok(None)`.
pub trait FeatureSource {
    /// Number of layers.
    fn layer_count(&self) -> usize;

    /// Schema of the layer at `index`.
    fn layer(&self, index: usize) -> Option<&LayerInfo>;

    /// Cursor model of the source. Must not change over the source's life.
    fn access_mode(&self) -> AccessMode;

    /// Replace the spatial filter of a layer; `None` clears it.
    fn set_spatial_filter(
        &mut self,
        layer: usize,
        filter: Option<&Polygon<f64>>,
    ) -> Result<(), SourceError>;

    /// Replace the attribute filter of a layer; `None` clears it.
    fn set_attribute_filter(&mut self, layer: usize, filter: Option<&str>)
    -> Result<(), SourceError>;

    /// Rewind the cursor of one layer.
    fn reset_layer(&mut self, layer: usize) -> Result<(), SourceError>;

    /// Next feature from one layer's cursor.
    fn next_layer_feature(&mut self, layer: usize) -> Result<Option<Feature>, SourceError>;

    /// Rewind the shared cursor.
    fn reset_source(&mut self) -> Result<(), SourceError>;

    /// Next record from the shared cursor.
    fn next_source_feature(&mut self) -> Result<Option<SourceRecord>, SourceError>;

    /// Number of features passing the current filters, when cheap to know.
    fn feature_count(&self, layer: usize) -> Option<u64>;

    /// Extent of a layer, when the source can report it.
    fn extent(&self, layer: usize) -> Option<Extent>;

    /// Projection of a layer.
    fn spatial_reference(&self, layer: usize) -> LayerCrs;

    /// Index of the layer with the given name.
    fn layer_index(&self, name: &str) -> Option<usize> {
        (0..self.layer_count()).find(|&index| self.layer(index).is_some_and(|l| l.name == name))
    }
}
