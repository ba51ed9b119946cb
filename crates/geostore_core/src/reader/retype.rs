//! Attribute projection and CRS retagging.

use std::sync::Arc;

use geostore_feature::{Feature, FeatureType, SchemaError};

use crate::backend::FeatureReader;
use crate::error::{CoreError, CoreResult};

/// Reshapes features from a source schema into a target schema.
///
/// The target must be derivable from the source: every target attribute
/// resolves by name against the source schema at construction, so a bad
/// projection fails before any feature is read. Attribute values are
/// copied by position through the precomputed mapping; the fid is kept.
pub struct RetypeReader {
    inner: Box<dyn FeatureReader>,
    target: Arc<FeatureType>,
    mapping: Vec<usize>,
    closed: bool,
}

impl RetypeReader {
    /// Wraps `inner`, reshaping its features into `target`.
    ///
    /// # Errors
    ///
    /// Returns a schema error when a target attribute does not exist in
    /// the source schema.
    pub fn new(inner: Box<dyn FeatureReader>, target: Arc<FeatureType>) -> CoreResult<Self> {
        let source = inner.feature_type();
        let mut mapping = Vec::with_capacity(target.attributes().len());
        for descriptor in target.attributes() {
            let index = source
                .index_of(descriptor.name())
                .ok_or_else(|| SchemaError::unknown_attribute(descriptor.name()))?;
            mapping.push(index);
        }
        Ok(Self {
            inner,
            target,
            mapping,
            closed: false,
        })
    }
}

impl FeatureReader for RetypeReader {
    fn feature_type(&self) -> &FeatureType {
        &self.target
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        self.inner.has_next()
    }

    fn next(&mut self) -> CoreResult<Feature> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        let source = self.inner.next()?;
        let attributes = self
            .mapping
            .iter()
            .map(|&index| source.attributes()[index].clone())
            .collect();
        let feature = Feature::new(Arc::clone(&self.target), source.fid().clone(), attributes)?;
        Ok(feature)
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}
