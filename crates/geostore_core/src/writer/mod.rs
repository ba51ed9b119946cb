//! Lazy feature writer pipeline.
//!
//! Writers are assembled the same way readers are: a base stage that
//! persists changes, wrapped by decorators. Auto-commit writes go through
//! [`EventWriter`] straight to the backing store; transactional writes go
//! through [`DiffWriter`], which stages them in the transaction's diff
//! instead. [`FilteringWriter`] narrows a writer to the features matching
//! a filter, and the lock-checking stage from [`crate::locking`] sits
//! outermost so every mutation is authorized before it takes effect.

mod diff;
mod event;
mod filtering;

pub use diff::DiffWriter;
pub use event::EventWriter;
pub use filtering::FilteringWriter;

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use geostore_feature::{Feature, FeatureType, Fid};
    use parking_lot::Mutex;

    use crate::backend::FeatureWriter;
    use crate::error::{CoreError, CoreResult};

    /// In-memory raw writer over a fixed feature list.
    ///
    /// Mirrors the backend writer protocol: existing features come out of
    /// `next` one by one, past the end it serves blanks with generated
    /// fids, and everything retained or written lands in a shared sink
    /// that tests inspect after closing.
    pub(crate) struct VecWriter {
        feature_type: Arc<FeatureType>,
        source: VecDeque<Feature>,
        current: Option<Feature>,
        appending: bool,
        next_append: u64,
        sink: Arc<Mutex<Vec<Feature>>>,
        close_count: Arc<AtomicUsize>,
        closed: bool,
    }

    impl VecWriter {
        pub(crate) fn new(feature_type: Arc<FeatureType>, features: Vec<Feature>) -> Self {
            Self {
                feature_type,
                source: features.into(),
                current: None,
                appending: false,
                next_append: 0,
                sink: Arc::new(Mutex::new(Vec::new())),
                close_count: Arc::new(AtomicUsize::new(0)),
                closed: false,
            }
        }

        /// Shared handle to the retained features.
        pub(crate) fn sink(&self) -> Arc<Mutex<Vec<Feature>>> {
            Arc::clone(&self.sink)
        }

        pub(crate) fn close_probe(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.close_count)
        }

        fn retain_current(&mut self) {
            if let Some(feature) = self.current.take() {
                if !self.appending {
                    self.sink.lock().push(feature);
                }
            }
        }
    }

    impl FeatureWriter for VecWriter {
        fn feature_type(&self) -> &FeatureType {
            &self.feature_type
        }

        fn has_next(&mut self) -> CoreResult<bool> {
            if self.closed {
                return Err(CoreError::illegal_state("writer is closed"));
            }
            Ok(!self.source.is_empty())
        }

        fn next(&mut self) -> CoreResult<Feature> {
            if self.closed {
                return Err(CoreError::illegal_state("writer is closed"));
            }
            self.retain_current();
            if let Some(feature) = self.source.pop_front() {
                self.appending = false;
                self.current = Some(feature.clone());
                Ok(feature)
            } else {
                let fid = Fid::new(format!(
                    "{}.{}",
                    self.feature_type.name(),
                    self.next_append
                ));
                self.next_append += 1;
                let blank = Feature::blank(Arc::clone(&self.feature_type), fid);
                self.appending = true;
                self.current = Some(blank.clone());
                Ok(blank)
            }
        }

        fn write(&mut self, feature: Feature) -> CoreResult<()> {
            let current = self
                .current
                .take()
                .ok_or_else(|| CoreError::illegal_state("write without a current feature"))?;
            if feature.fid() != current.fid() {
                return Err(CoreError::illegal_state("feature id mismatch"));
            }
            self.sink.lock().push(feature);
            Ok(())
        }

        fn remove(&mut self) -> CoreResult<()> {
            self.current
                .take()
                .map(drop)
                .ok_or_else(|| CoreError::illegal_state("remove without a current feature"))
        }

        fn close(&mut self) -> CoreResult<()> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            self.retain_current();
            let mut sink = self.sink.lock();
            sink.extend(self.source.drain(..));
            drop(sink);
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
