//! Filtered write stage.

use geostore_feature::{Feature, FeatureType, Filter};

use crate::backend::FeatureWriter;
use crate::error::{CoreError, CoreResult};

/// Narrows a writer's iteration to features matching a filter.
///
/// Only iteration is narrowed: features that fail the filter are skipped
/// and retained untouched, while appends past the end go through
/// unchecked. The lookahead in `has_next` leaves the matched feature as
/// the wrapped writer's current feature, so a later `write` or `remove`
/// lands on the right one.
pub struct FilteringWriter {
    inner: Box<dyn FeatureWriter>,
    filter: Filter,
    pending: Option<Feature>,
    closed: bool,
}

impl FilteringWriter {
    /// Wraps `inner`, iterating only features matching `filter`.
    #[must_use]
    pub fn new(inner: Box<dyn FeatureWriter>, filter: Filter) -> Self {
        Self {
            inner,
            filter,
            pending: None,
            closed: false,
        }
    }
}

impl FeatureWriter for FilteringWriter {
    fn feature_type(&self) -> &FeatureType {
        self.inner.feature_type()
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
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
        if self.has_next()? {
            return self
                .pending
                .take()
                .ok_or_else(|| CoreError::illegal_state("no more features"));
        }
        self.inner.next()
    }

    fn write(&mut self, feature: Feature) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        self.inner.write(feature)
    }

    fn remove(&mut self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        self.inner.remove()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::testutil::VecWriter;
    use geostore_feature::{Fid, Value, ValueType};
    use std::sync::Arc;

    fn schema() -> Arc<FeatureType> {
        Arc::new(
            FeatureType::builder("roads")
                .attribute("lanes", ValueType::Int)
                .build()
                .unwrap(),
        )
    }

    fn road(fid: &str, lanes: i64) -> Feature {
        Feature::new(schema(), Fid::new(fid), vec![Value::Int(lanes)]).unwrap()
    }

    #[test]
    fn iterates_only_matching_features() {
        let raw = VecWriter::new(
            schema(),
            vec![road("roads.1", 2), road("roads.2", 4), road("roads.3", 2)],
        );
        let sink = raw.sink();
        let mut writer = FilteringWriter::new(Box::new(raw), Filter::eq("lanes", Value::Int(2)));

        let mut served = Vec::new();
        while writer.has_next().unwrap() {
            let mut feature = writer.next().unwrap();
            served.push(feature.fid().clone());
            feature.set_attribute("lanes", Value::Int(12)).unwrap();
            writer.write(feature).unwrap();
        }
        writer.close().unwrap();

        assert_eq!(served, vec![Fid::new("roads.1"), Fid::new("roads.3")]);
        let sink = sink.lock();
        assert_eq!(sink.len(), 3);
        assert_eq!(sink[0].attribute("lanes"), Some(&Value::Int(12)));
        assert_eq!(sink[1].attribute("lanes"), Some(&Value::Int(4)));
        assert_eq!(sink[2].attribute("lanes"), Some(&Value::Int(12)));
    }

    #[test]
    fn repeated_has_next_serves_one_feature() {
        let raw = VecWriter::new(schema(), vec![road("roads.1", 2)]);
        let mut writer = FilteringWriter::new(Box::new(raw), Filter::Include);

        assert!(writer.has_next().unwrap());
        assert!(writer.has_next().unwrap());
        assert_eq!(writer.next().unwrap().fid(), &Fid::new("roads.1"));
        assert!(!writer.has_next().unwrap());
    }

    #[test]
    fn appends_bypass_the_filter() {
        let raw = VecWriter::new(schema(), vec![road("roads.1", 2)]);
        let sink = raw.sink();
        let mut writer = FilteringWriter::new(Box::new(raw), Filter::eq("lanes", Value::Int(99)));

        assert!(!writer.has_next().unwrap());
        let mut blank = writer.next().unwrap();
        blank.set_attributes(vec![Value::Int(7)]).unwrap();
        writer.write(blank).unwrap();
        writer.close().unwrap();

        let sink = sink.lock();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].fid(), &Fid::new("roads.1"));
        assert_eq!(sink[1].attribute("lanes"), Some(&Value::Int(7)));
    }

    #[test]
    fn removal_hits_the_matched_feature() {
        let raw = VecWriter::new(schema(), vec![road("roads.1", 2), road("roads.2", 4)]);
        let sink = raw.sink();
        let mut writer = FilteringWriter::new(Box::new(raw), Filter::eq("lanes", Value::Int(4)));

        assert!(writer.has_next().unwrap());
        writer.next().unwrap();
        writer.remove().unwrap();
        writer.close().unwrap();

        let sink = sink.lock();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].fid(), &Fid::new("roads.1"));
    }
}
