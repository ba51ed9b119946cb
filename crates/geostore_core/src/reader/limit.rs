//! Feature count cap.

use geostore_feature::{Feature, FeatureType};

use crate::backend::FeatureReader;
use crate::error::{CoreError, CoreResult};

/// Stops a reader after a fixed number of features.
///
/// Once the cap is reached the wrapped reader is closed immediately so
/// backing resources are released even while this reader stays open.
/// Closing here closes the wrapped reader at most once.
pub struct LimitReader {
    inner: Box<dyn FeatureReader>,
    remaining: usize,
    inner_closed: bool,
    closed: bool,
}

impl LimitReader {
    /// Wraps `inner`, yielding at most `max_features` features.
    #[must_use]
    pub fn new(inner: Box<dyn FeatureReader>, max_features: usize) -> Self {
        Self {
            inner,
            remaining: max_features,
            inner_closed: false,
            closed: false,
        }
    }

    fn close_inner(&mut self) -> CoreResult<()> {
        if self.inner_closed {
            return Ok(());
        }
        self.inner_closed = true;
        self.inner.close()
    }
}

impl FeatureReader for LimitReader {
    fn feature_type(&self) -> &FeatureType {
        self.inner.feature_type()
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        if self.remaining == 0 {
            return Ok(false);
        }
        self.inner.has_next()
    }

    fn next(&mut self) -> CoreResult<Feature> {
        if !self.has_next()? {
            return Err(CoreError::illegal_state("no more features"));
        }
        let feature = self.inner.next()?;
        self.remaining -= 1;
        if self.remaining == 0 {
            self.close_inner()?;
        }
        Ok(feature)
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.close_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::testutil::VecReader;
    use geostore_feature::{Fid, Value, ValueType};
    use std::sync::atomic::Ordering;
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

    fn roads(count: usize) -> Vec<Feature> {
        (0..count)
            .map(|n| road(&format!("roads.{n}"), n as i64))
            .collect()
    }

    #[test]
    fn caps_feature_count() {
        let inner = VecReader::new(schema(), roads(3));
        let mut reader = LimitReader::new(Box::new(inner), 2);

        assert!(reader.has_next().unwrap());
        reader.next().unwrap();
        reader.next().unwrap();
        assert!(!reader.has_next().unwrap());
        assert!(reader.next().is_err());
    }

    #[test]
    fn cap_larger_than_input_passes_everything() {
        let inner = VecReader::new(schema(), roads(2));
        let mut reader = LimitReader::new(Box::new(inner), 10);

        let mut served = 0;
        while reader.has_next().unwrap() {
            reader.next().unwrap();
            served += 1;
        }
        assert_eq!(served, 2);
    }

    #[test]
    fn zero_cap_serves_nothing() {
        let inner = VecReader::new(schema(), roads(2));
        let mut reader = LimitReader::new(Box::new(inner), 0);
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn hitting_cap_closes_wrapped_reader_early() {
        let inner = VecReader::new(schema(), roads(3));
        let probe = inner.close_probe();
        let mut reader = LimitReader::new(Box::new(inner), 1);

        reader.next().unwrap();
        assert_eq!(probe.load(Ordering::SeqCst), 1);

        reader.close().unwrap();
        reader.close().unwrap();
        assert_eq!(probe.load(Ordering::SeqCst), 1);
    }
}
