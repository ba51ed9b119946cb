//! Transactional write stage.

use std::sync::Arc;

use geostore_feature::{Feature, FeatureType};

use crate::backend::{FeatureReader, FeatureWriter};
use crate::diff::Diff;
use crate::error::{CoreError, CoreResult};
use crate::events::FeatureListenerManager;
use crate::reader::DiffReader;
use crate::transaction::TransactionId;

/// Stages mutations in a transaction's diff instead of the backing store.
///
/// The writer iterates the transaction's view of the type through a
/// [`DiffReader`] fixed at construction, so it serves base features with
/// earlier staged changes already applied. Written features become
/// replacement entries, removed ones tombstones, and blanks written past
/// the end additions under synthetic fids. Nothing reaches the backing
/// store until the transaction commits.
///
/// Every mutation fires immediately to listeners bound to the same
/// transaction; the rest of the world hears about it at commit.
pub struct DiffWriter {
    reader: DiffReader,
    diff: Diff,
    schema: Arc<FeatureType>,
    listeners: FeatureListenerManager,
    transaction: TransactionId,
    current: Option<Feature>,
    appending: bool,
    closed: bool,
}

impl DiffWriter {
    /// Wraps the transaction's view of a type with staging semantics.
    #[must_use]
    pub fn new(
        reader: DiffReader,
        diff: Diff,
        schema: Arc<FeatureType>,
        listeners: FeatureListenerManager,
        transaction: TransactionId,
    ) -> Self {
        Self {
            reader,
            diff,
            schema,
            listeners,
            transaction,
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

impl FeatureWriter for DiffWriter {
    fn feature_type(&self) -> &FeatureType {
        &self.schema
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        self.ensure_open()?;
        self.reader.has_next()
    }

    fn next(&mut self) -> CoreResult<Feature> {
        self.ensure_open()?;
        if self.reader.has_next()? {
            let feature = self.reader.next()?;
            self.appending = false;
            self.current = Some(feature.clone());
            Ok(feature)
        } else {
            let blank = Feature::blank(Arc::clone(&self.schema), self.diff.allocate_fid());
            self.appending = true;
            self.current = Some(blank.clone());
            Ok(blank)
        }
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
        let type_name = self.schema.name();
        if self.appending {
            let bounds = feature.bounds();
            self.diff.add(feature);
            self.listeners
                .fire_added(type_name, Some(self.transaction), Some(bounds), false);
        } else if feature != original {
            let bounds = original.bounds().union(&feature.bounds());
            self.diff.modify(original.fid().clone(), feature);
            self.listeners
                .fire_changed(type_name, Some(self.transaction), Some(bounds), false);
        }
        Ok(())
    }

    fn remove(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        let original = self
            .current
            .take()
            .ok_or_else(|| CoreError::illegal_state("remove without a current feature"))?;
        if !self.appending {
            let bounds = original.bounds();
            self.diff.remove(original.fid());
            self.listeners.fire_removed(
                self.schema.name(),
                Some(self.transaction),
                Some(bounds),
                false,
            );
        }
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = None;
        self.reader.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffEntry;
    use crate::events::{FeatureEvent, FeatureEventKind};
    use crate::reader::testutil::VecReader;
    use geostore_feature::{Fid, Filter, Value, ValueType};
    use parking_lot::Mutex;
    use uuid::Uuid;

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

    fn writer_over(base: Vec<Feature>, diff: &Diff) -> (DiffWriter, TransactionId) {
        let transaction = TransactionId::from_uuid(Uuid::new_v4());
        let reader = DiffReader::new(
            Box::new(VecReader::new(schema(), base)),
            diff.snapshot(),
            Filter::Include,
        );
        let writer = DiffWriter::new(
            reader,
            diff.clone(),
            schema(),
            FeatureListenerManager::new(),
            transaction,
        );
        (writer, transaction)
    }

    #[test]
    fn write_back_stages_replacement() {
        let diff = Diff::new();
        let (mut writer, _) = writer_over(vec![road("roads.1", 2)], &diff);

        let mut feature = writer.next().unwrap();
        feature.set_attribute("lanes", Value::Int(6)).unwrap();
        writer.write(feature).unwrap();
        writer.close().unwrap();

        let snapshot = diff.snapshot();
        match snapshot.entry(&Fid::new("roads.1")) {
            Some(DiffEntry::Replacement(staged)) => {
                assert_eq!(staged.attribute("lanes"), Some(&Value::Int(6)));
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_write_back_stages_nothing() {
        let diff = Diff::new();
        let (mut writer, _) = writer_over(vec![road("roads.1", 2)], &diff);

        let feature = writer.next().unwrap();
        writer.write(feature).unwrap();
        writer.close().unwrap();

        assert!(diff.is_empty());
    }

    #[test]
    fn append_stages_addition_under_synthetic_fid() {
        let diff = Diff::new();
        let (mut writer, _) = writer_over(Vec::new(), &diff);

        assert!(!writer.has_next().unwrap());
        let mut blank = writer.next().unwrap();
        assert_eq!(blank.fid(), &Fid::new("new0"));
        blank.set_attributes(vec![Value::Int(4)]).unwrap();
        writer.write(blank).unwrap();
        writer.close().unwrap();

        assert!(matches!(
            diff.snapshot().entry(&Fid::new("new0")),
            Some(DiffEntry::Added(_))
        ));
    }

    #[test]
    fn remove_stages_tombstone() {
        let diff = Diff::new();
        let (mut writer, _) = writer_over(vec![road("roads.1", 2)], &diff);

        writer.next().unwrap();
        writer.remove().unwrap();
        writer.close().unwrap();

        assert!(matches!(
            diff.snapshot().entry(&Fid::new("roads.1")),
            Some(DiffEntry::Tombstone)
        ));
    }

    #[test]
    fn removing_staged_addition_unstages_it() {
        let diff = Diff::new();
        diff.add(road("new0", 4));
        let (mut writer, _) = writer_over(Vec::new(), &diff);

        assert!(writer.has_next().unwrap());
        writer.next().unwrap();
        writer.remove().unwrap();
        writer.close().unwrap();

        assert!(diff.is_empty());
    }

    #[test]
    fn abandoned_blank_stages_nothing() {
        let diff = Diff::new();
        let (mut writer, _) = writer_over(Vec::new(), &diff);

        writer.next().unwrap();
        writer.close().unwrap();

        assert!(diff.is_empty());
    }

    #[test]
    fn events_reach_only_the_writing_transaction() {
        let diff = Diff::new();
        let transaction = TransactionId::from_uuid(Uuid::new_v4());
        let listeners = FeatureListenerManager::new();

        let seen_tx: Arc<Mutex<Vec<FeatureEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_auto: Arc<Mutex<Vec<FeatureEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let bound = listeners.register_source("roads", Some(transaction));
        let auto = listeners.register_source("roads", None);
        let sink = Arc::clone(&seen_tx);
        listeners.add_listener(
            bound,
            Arc::new(move |event: &FeatureEvent| sink.lock().push(event.clone())),
        );
        let sink = Arc::clone(&seen_auto);
        listeners.add_listener(
            auto,
            Arc::new(move |event: &FeatureEvent| sink.lock().push(event.clone())),
        );

        let reader = DiffReader::new(
            Box::new(VecReader::new(schema(), vec![road("roads.1", 2)])),
            diff.snapshot(),
            Filter::Include,
        );
        let mut writer = DiffWriter::new(reader, diff, schema(), listeners, transaction);

        let mut feature = writer.next().unwrap();
        feature.set_attribute("lanes", Value::Int(6)).unwrap();
        writer.write(feature).unwrap();
        writer.close().unwrap();

        let events = seen_tx.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), FeatureEventKind::Changed);
        assert!(seen_auto.lock().is_empty());
    }

    #[test]
    fn fid_mismatch_is_rejected() {
        let diff = Diff::new();
        let (mut writer, _) = writer_over(vec![road("roads.1", 2)], &diff);

        writer.next().unwrap();
        assert!(writer.write(road("roads.2", 4)).is_err());
        assert!(diff.is_empty());
    }
}
