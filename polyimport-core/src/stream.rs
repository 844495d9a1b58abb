//! Uniform per-layer cursor over sequential and interleaved sources.
//!
//! [`FeatureStream`] owns the source and is the only component that moves
//! its cursor or touches its filters. The binding mode is captured once at
//! construction and never changes.
//!
//! Sequential sources are rebound by applying the requested layer's filters
//! and rewinding that layer. Interleaved sources cannot reposition a shared
//! cursor without losing filters, so a rebind clears the filters on every
//! layer, installs them on the requested layer and restarts the shared
//! cursor. Reads then skip every record whose owning layer has a different
//! name.

use geo::Polygon;
use log::debug;

use crate::{AccessMode, Feature, FeatureSource, SourceError};

/// Result of advancing a [`FeatureStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// The next feature of the requested layer.
    Feature(Feature),
    /// The requested layer has no further features.
    EndOfLayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Unbound,
    Reading { layer: usize },
    Exhausted { layer: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sequential(Binding),
    Interleaved(Binding),
}

impl Mode {
    fn from_access(access: AccessMode) -> Self {
        match access {
            AccessMode::Sequential => Self::Sequential(Binding::Unbound),
            AccessMode::Interleaved => Self::Interleaved(Binding::Unbound),
        }
    }

    fn binding(self) -> Binding {
        match self {
            Self::Sequential(binding) | Self::Interleaved(binding) => binding,
        }
    }

    fn with_binding(self, binding: Binding) -> Self {
        match self {
            Self::Sequential(_) => Self::Sequential(binding),
            Self::Interleaved(_) => Self::Interleaved(binding),
        }
    }
}

/// Cursor exposing one logical layer at a time.
///
/// # Examples
///
/// ```
/// use polyimport_core::{FeatureStream, StreamItem, test_support::MemorySource};
///
/// # fn main() -> Result<(), polyimport_core::SourceError> {
/// let source = MemorySource::builder().layer("roads").feature(1).build();
/// let mut stream = FeatureStream::new(source);
/// assert!(matches!(stream.next(0, "roads", None, None)?, StreamItem::Feature(_)));
/// assert_eq!(stream.next(0, "roads", None, None)?, StreamItem::EndOfLayer);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FeatureStream<S> {
    source: S,
    access: AccessMode,
    mode: Mode,
}

impl<S: FeatureSource> FeatureStream<S> {
    /// Take ownership of `source` and derive the binding mode from it.
    pub fn new(source: S) -> Self {
        let access = source.access_mode();
        Self {
            source,
            access,
            mode: Mode::from_access(access),
        }
    }

    /// Cursor model the stream was built for.
    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        self.access
    }

    /// Shared view of the wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Release the wrapped source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Forget the current binding so the next read starts from the top.
    pub fn reset(&mut self) {
        self.mode = Mode::from_access(self.access);
    }

    /// Advance the cursor for `layer_id`.
    ///
    /// Requesting a layer other than the bound one rebinds the cursor and
    /// installs `spatial_filter` and `attribute_filter` for it. A rejected
    /// attribute filter is returned as an error and must abort the run.
    pub fn next(
        &mut self,
        layer_id: usize,
        layer_name: &str,
        spatial_filter: Option<&Polygon<f64>>,
        attribute_filter: Option<&str>,
    ) -> Result<StreamItem, SourceError> {
        let bound = match self.mode.binding() {
            Binding::Reading { layer } | Binding::Exhausted { layer } => layer == layer_id,
            Binding::Unbound => false,
        };
        if !bound {
            self.rebind(layer_id, spatial_filter, attribute_filter)?;
        }
        if matches!(self.mode.binding(), Binding::Exhausted { .. }) {
            return Ok(StreamItem::EndOfLayer);
        }
        let next = match self.mode {
            Mode::Sequential(_) => self.source.next_layer_feature(layer_id)?,
            Mode::Interleaved(_) => self.next_interleaved(layer_name)?,
        };
        match next {
            Some(feature) => Ok(StreamItem::Feature(feature)),
            None => {
                self.mode = self.mode.with_binding(Binding::Exhausted { layer: layer_id });
                Ok(StreamItem::EndOfLayer)
            }
        }
    }

    fn rebind(
        &mut self,
        layer_id: usize,
        spatial_filter: Option<&Polygon<f64>>,
        attribute_filter: Option<&str>,
    ) -> Result<(), SourceError> {
        match self.mode {
            Mode::Sequential(_) => {
                debug!("binding layer {layer_id} cursor");
                self.source.set_spatial_filter(layer_id, spatial_filter)?;
                self.source.set_attribute_filter(layer_id, attribute_filter)?;
                self.source.reset_layer(layer_id)?;
            }
            Mode::Interleaved(_) => {
                debug!("restarting shared cursor for layer {layer_id}");
                for layer in 0..self.source.layer_count() {
                    self.source.set_spatial_filter(layer, None)?;
                    self.source.set_attribute_filter(layer, None)?;
                }
                self.source.set_spatial_filter(layer_id, spatial_filter)?;
                self.source.set_attribute_filter(layer_id, attribute_filter)?;
                self.source.reset_source()?;
            }
        }
        self.mode = self.mode.with_binding(Binding::Reading { layer: layer_id });
        Ok(())
    }

    fn next_interleaved(&mut self, layer_name: &str) -> Result<Option<Feature>, SourceError> {
        while let Some(record) = self.source.next_source_feature()? {
            if record.layer == layer_name {
                return Ok(Some(record.feature));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemorySource;
    use rstest::{fixture, rstest};

    fn drain<S: FeatureSource>(stream: &mut FeatureStream<S>, layer: usize, name: &str) -> Vec<i64> {
        let mut fids = Vec::new();
        while let StreamItem::Feature(feature) = stream.next(layer, name, None, None).expect("read")
        {
            fids.push(feature.fid);
        }
        fids
    }

    #[fixture]
    fn two_layers() -> MemorySource {
        MemorySource::builder()
            .layer("a")
            .feature(1)
            .feature(2)
            .layer("b")
            .feature(10)
            .feature(11)
            .feature(12)
            .build()
    }

    #[rstest]
    #[case(AccessMode::Sequential)]
    #[case(AccessMode::Interleaved)]
    fn reads_each_layer_in_turn(two_layers: MemorySource, #[case] mode: AccessMode) {
        let mut stream = FeatureStream::new(two_layers.with_access_mode(mode));
        assert_eq!(drain(&mut stream, 0, "a"), vec![1, 2]);
        assert_eq!(drain(&mut stream, 1, "b"), vec![10, 11, 12]);
    }

    #[rstest]
    #[case(AccessMode::Sequential)]
    #[case(AccessMode::Interleaved)]
    fn end_of_layer_is_sticky_until_reset(two_layers: MemorySource, #[case] mode: AccessMode) {
        let mut stream = FeatureStream::new(two_layers.with_access_mode(mode));
        assert_eq!(drain(&mut stream, 0, "a").len(), 2);
        assert_eq!(stream.next(0, "a", None, None).expect("read"), StreamItem::EndOfLayer);
        stream.reset();
        assert_eq!(drain(&mut stream, 0, "a").len(), 2);
    }

    #[rstest]
    fn interleaved_reads_skip_other_layers(two_layers: MemorySource) {
        let mut stream = FeatureStream::new(two_layers.with_access_mode(AccessMode::Interleaved));
        assert_eq!(drain(&mut stream, 1, "b"), vec![10, 11, 12]);
        assert_eq!(drain(&mut stream, 0, "a"), vec![1, 2]);
    }

    #[rstest]
    fn interleaved_rebind_clears_other_filters(two_layers: MemorySource) {
        let mut stream = FeatureStream::new(two_layers.with_access_mode(AccessMode::Interleaved));
        let _ = stream.next(0, "a", None, Some("fid > 1")).expect("read");
        let _ = stream.next(1, "b", None, None).expect("read");
        assert_eq!(stream.source().attribute_filter(0), None);
    }

    #[rstest]
    fn rejected_attribute_filter_is_fatal(two_layers: MemorySource) {
        let mut stream = FeatureStream::new(two_layers);
        let err = stream
            .next(0, "a", None, Some("not a filter"))
            .expect_err("filter rejected");
        assert!(matches!(err, SourceError::FilterRejected { .. }));
    }
}
