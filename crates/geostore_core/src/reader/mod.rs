//! Reader pipeline stages.
//!
//! A query is answered by a stack of lazy decorators over a raw backend
//! reader, assembled in a fixed order: native filter pushdown, engine-side
//! filtering, transaction diff overlay, schema retyping, then the
//! max-features limit. Every stage is forward-only and single-pass, and
//! propagates `close` to the stage below exactly once.

mod diff;
mod empty;
mod filtering;
mod limit;
mod retype;

pub use diff::DiffReader;
pub use empty::EmptyReader;
pub use filtering::FilteringReader;
pub use limit::LimitReader;
pub use retype::RetypeReader;

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use geostore_feature::{Feature, FeatureType};

    use crate::backend::FeatureReader;
    use crate::error::{CoreError, CoreResult};

    /// Reader over a fixed feature list, for exercising decorators in
    /// isolation.
    pub struct VecReader {
        feature_type: Arc<FeatureType>,
        features: std::vec::IntoIter<Feature>,
        closed: bool,
        close_count: Arc<AtomicUsize>,
    }

    impl VecReader {
        pub fn new(feature_type: Arc<FeatureType>, features: Vec<Feature>) -> Self {
            Self {
                feature_type,
                features: features.into_iter(),
                closed: false,
                close_count: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Handle observing how many times `close` reached this reader.
        pub fn close_probe(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.close_count)
        }
    }

    impl FeatureReader for VecReader {
        fn feature_type(&self) -> &FeatureType {
            &self.feature_type
        }

        fn has_next(&mut self) -> CoreResult<bool> {
            if self.closed {
                return Err(CoreError::illegal_state("reader is closed"));
            }
            Ok(self.features.as_slice().first().is_some())
        }

        fn next(&mut self) -> CoreResult<Feature> {
            if self.closed {
                return Err(CoreError::illegal_state("reader is closed"));
            }
            self.features
                .next()
                .ok_or_else(|| CoreError::illegal_state("no more features"))
        }

        fn close(&mut self) -> CoreResult<()> {
            if !self.closed {
                self.closed = true;
                self.close_count.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }
}
