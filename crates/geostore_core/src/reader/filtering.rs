//! Engine-side filter evaluation.

use geostore_feature::{Feature, FeatureType, Filter};

use crate::backend::FeatureReader;
use crate::error::{CoreError, CoreResult};

/// Applies the filter remainder the backing store could not evaluate.
///
/// `has_next` looks ahead through the wrapped reader until a match is
/// found, so skipped features are consumed but never surfaced.
pub struct FilteringReader {
    inner: Box<dyn FeatureReader>,
    filter: Filter,
    pending: Option<Feature>,
    closed: bool,
}

impl FilteringReader {
    /// Wraps a reader with an engine-evaluated filter.
    #[must_use]
    pub fn new(inner: Box<dyn FeatureReader>, filter: Filter) -> Self {
        Self {
            inner,
            filter,
            pending: None,
            closed: false,
        }
    }
}

impl FeatureReader for FilteringReader {
    fn feature_type(&self) -> &FeatureType {
        self.inner.feature_type()
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        if self.pending.is_some() {
            return Ok(true);
        }
        while self.inner.has_next()? {
            let feature = self.inner.next()?;
            if self.filter.matches(&feature) {
                self.pending = Some(feature);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next(&mut self) -> CoreResult<Feature> {
        if !self.has_next()? {
            return Err(CoreError::illegal_state("no more features"));
        }
        self.pending
            .take()
            .ok_or_else(|| CoreError::illegal_state("no more features"))
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending = None;
        self.inner.close()
    }
}
