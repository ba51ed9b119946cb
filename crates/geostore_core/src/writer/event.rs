//! Auto-commit write stage.

use geostore_feature::{Feature, FeatureType};

use crate::backend::FeatureWriter;
use crate::error::{CoreError, CoreResult};
use crate::events::FeatureListenerManager;

/// Writes straight through to the backing store and notifies listeners.
///
/// This is the base stage for auto-commit writers. Every mutation is
/// immediately durable, so each one fires right away to the auto-commit
/// audience: an added event when a blank is written, a changed event when
/// an existing feature is written back different from what was served,
/// and a removed event on remove. Writing a feature back unchanged
/// persists it but stays silent. Changed events carry the union of the
/// bounds before and after, so a listener knows the full dirty region.
pub struct EventWriter {
    inner: Box<dyn FeatureWriter>,
    listeners: FeatureListenerManager,
    type_name: String,
    current: Option<Feature>,
    appending: bool,
    closed: bool,
}

impl EventWriter {
    /// Wraps a backend writer, firing events through `listeners`.
    #[must_use]
    pub fn new(inner: Box<dyn FeatureWriter>, listeners: FeatureListenerManager) -> Self {
        let type_name = inner.feature_type().name().to_owned();
        Self {
            inner,
            listeners,
            type_name,
            current: None,
            appending: false,
            closed: false,
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        Ok(())
    }
}

impl FeatureWriter for EventWriter {
    fn feature_type(&self) -> &FeatureType {
        self.inner.feature_type()
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        self.ensure_open()?;
        self.inner.has_next()
    }

    fn next(&mut self) -> CoreResult<Feature> {
        self.ensure_open()?;
        self.appending = !self.inner.has_next()?;
        let feature = self.inner.next()?;
        self.current = Some(feature.clone());
        Ok(feature)
    }

    fn write(&mut self, feature: Feature) -> CoreResult<()> {
        self.ensure_open()?;
        let original = self
            .current
            .take()
            .ok_or_else(|| CoreError::illegal_state("write without a current feature"))?;
        if feature.fid() != original.fid() {
            self.current = Some(original);
            return Err(CoreError::illegal_state("feature id mismatch"));
        }
        if self.appending {
            let bounds = feature.bounds();
            self.inner.write(feature)?;
            self.listeners
                .fire_added(&self.type_name, None, Some(bounds), false);
        } else {
            let changed = feature != original;
            let bounds = original.bounds().union(&feature.bounds());
            self.inner.write(feature)?;
            if changed {
                self.listeners
                    .fire_changed(&self.type_name, None, Some(bounds), false);
            }
        }
        Ok(())
    }

    fn remove(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        let original = self
            .current
            .take()
            .ok_or_else(|| CoreError::illegal_state("remove without a current feature"))?;
        self.inner.remove()?;
        if !self.appending {
            self.listeners
                .fire_removed(&self.type_name, None, Some(original.bounds()), false);
        }
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = None;
        self.inner.close()
    }
}
