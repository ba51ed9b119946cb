//! The reader over nothing.

use std::sync::Arc;

use geostore_feature::{Feature, FeatureType};

use crate::backend::FeatureReader;
use crate::error::{CoreError, CoreResult};

/// A reader that yields no features but still carries a schema.
///
/// Used when a query's filter excludes everything, so the rest of the
/// pipeline never opens backend resources.
pub struct EmptyReader {
    feature_type: Arc<FeatureType>,
    closed: bool,
}

impl EmptyReader {
    /// Creates an empty reader over the given schema.
    #[must_use]
    pub fn new(feature_type: Arc<FeatureType>) -> Self {
        Self {
            feature_type,
            closed: false,
        }
    }
}

impl FeatureReader for EmptyReader {
    fn feature_type(&self) -> &FeatureType {
        &self.feature_type
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        Ok(false)
    }

    fn next(&mut self) -> CoreResult<Feature> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        Err(CoreError::illegal_state("no more features"))
    }

    fn close(&mut self) -> CoreResult<()> {
        self.closed = true;
        Ok(())
    }
}
