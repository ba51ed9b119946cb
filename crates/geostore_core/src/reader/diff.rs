//! Transaction diff overlay.

use std::collections::{HashSet, VecDeque};

use geostore_feature::{Feature, FeatureType, Fid, Filter};

use crate::backend::FeatureReader;
use crate::diff::{DiffEntry, DiffSnapshot};
use crate::error::{CoreError, CoreResult};

/// Overlays a transaction's pending changes onto a base reader.
///
/// The snapshot is fixed at construction: staging through the live diff
/// after the reader opens does not change what it yields. Base features
/// consult the snapshot first; tombstoned ones are skipped and replaced
/// ones are substituted when the replacement passes the filter. Once the
/// base is exhausted, pending additions not already surfaced come out in
/// insertion order, filter-checked.
///
/// The filter here guards only the snapshot side. Unchanged base features
/// pass through untouched; the stage below has already filtered them.
/// A pure fid filter resolves directly against the snapshot instead of
/// scanning it.
pub struct DiffReader {
    inner: Box<dyn FeatureReader>,
    snapshot: DiffSnapshot,
    filter: Filter,
    encountered: HashSet<Fid>,
    staged_queue: VecDeque<Fid>,
    fid_lookup: bool,
    pending: Option<Feature>,
    closed: bool,
}

impl DiffReader {
    /// Wraps a base reader with a diff snapshot and the query filter.
    #[must_use]
    pub fn new(inner: Box<dyn FeatureReader>, snapshot: DiffSnapshot, filter: Filter) -> Self {
        let (staged_queue, fid_lookup) = match &filter {
            Filter::Fids(fids) => (fids.iter().cloned().collect(), true),
            _ => (snapshot.added_fids().to_vec().into(), false),
        };
        Self {
            inner,
            snapshot,
            filter,
            encountered: HashSet::new(),
            staged_queue,
            fid_lookup,
            pending: None,
            closed: false,
        }
    }

    fn advance_base(&mut self) -> CoreResult<bool> {
        while self.inner.has_next()? {
            let feature = self.inner.next()?;
            let fid = feature.fid().clone();
            self.encountered.insert(fid.clone());
            match self.snapshot.entry(&fid) {
                Some(DiffEntry::Tombstone) => {}
                Some(DiffEntry::Replacement(replacement)) => {
                    if self.filter.matches(replacement) {
                        let replacement = replacement.clone();
                        self.pending = Some(replacement);
                        return Ok(true);
                    }
                }
                Some(DiffEntry::Added(_)) | None => {
                    self.pending = Some(feature);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn advance_staged(&mut self) -> bool {
        while let Some(fid) = self.staged_queue.pop_front() {
            if self.encountered.contains(&fid) {
                continue;
            }
            let candidate = match self.snapshot.entry(&fid) {
                Some(DiffEntry::Added(feature)) => Some(feature),
                Some(DiffEntry::Replacement(feature)) if self.fid_lookup => Some(feature),
                _ => None,
            };
            if let Some(feature) = candidate {
                if self.fid_lookup || self.filter.matches(feature) {
                    let feature = feature.clone();
                    self.encountered.insert(fid);
                    self.pending = Some(feature);
                    return true;
                }
            }
        }
        false
    }
}

impl FeatureReader for DiffReader {
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
        if self.advance_base()? {
            return Ok(true);
        }
        Ok(self.advance_staged())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Diff;
    use crate::reader::testutil::VecReader;
    use geostore_feature::{Value, ValueType};
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

    fn base(features: Vec<Feature>) -> Box<dyn FeatureReader> {
        Box::new(VecReader::new(schema(), features))
    }

    fn drain(reader: &mut DiffReader) -> Vec<Feature> {
        let mut out = Vec::new();
        while reader.has_next().unwrap() {
            out.push(reader.next().unwrap());
        }
        out
    }

    #[test]
    fn empty_diff_passes_base_through() {
        let diff = Diff::new();
        let mut reader = DiffReader::new(
            base(vec![road("roads.1", 2), road("roads.2", 4)]),
            diff.snapshot(),
            Filter::Include,
        );
        let fids: Vec<_> = drain(&mut reader)
            .iter()
            .map(|f| f.fid().clone())
            .collect();
        assert_eq!(fids, vec![Fid::new("roads.1"), Fid::new("roads.2")]);
    }

    #[test]
    fn tombstone_hides_base_feature() {
        let diff = Diff::new();
        diff.remove(&Fid::new("roads.1"));
        let mut reader = DiffReader::new(
            base(vec![road("roads.1", 2), road("roads.2", 4)]),
            diff.snapshot(),
            Filter::Include,
        );
        let fids: Vec<_> = drain(&mut reader)
            .iter()
            .map(|f| f.fid().clone())
            .collect();
        assert_eq!(fids, vec![Fid::new("roads.2")]);
    }

    #[test]
    fn replacement_substitutes_base_feature() {
        let diff = Diff::new();
        diff.modify(Fid::new("roads.1"), road("roads.1", 6));
        let mut reader = DiffReader::new(
            base(vec![road("roads.1", 2)]),
            diff.snapshot(),
            Filter::Include,
        );
        let features = drain(&mut reader);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].attribute("lanes"), Some(&Value::Int(6)));
    }

    #[test]
    fn replacement_failing_filter_is_dropped() {
        let diff = Diff::new();
        diff.modify(Fid::new("roads.1"), road("roads.1", 6));
        let mut reader = DiffReader::new(
            base(vec![road("roads.1", 2)]),
            diff.snapshot(),
            Filter::eq("lanes", Value::Int(2)),
        );
        assert!(drain(&mut reader).is_empty());
    }

    #[test]
    fn additions_follow_base_in_insertion_order() {
        let diff = Diff::new();
        diff.add(road("new0", 1));
        diff.add(road("new1", 3));
        let mut reader = DiffReader::new(
            base(vec![road("roads.1", 2)]),
            diff.snapshot(),
            Filter::Include,
        );
        let fids: Vec<_> = drain(&mut reader)
            .iter()
            .map(|f| f.fid().clone())
            .collect();
        assert_eq!(
            fids,
            vec![Fid::new("roads.1"), Fid::new("new0"), Fid::new("new1")]
        );
    }

    #[test]
    fn additions_are_filter_checked() {
        let diff = Diff::new();
        diff.add(road("new0", 1));
        diff.add(road("new1", 3));
        let mut reader = DiffReader::new(
            base(Vec::new()),
            diff.snapshot(),
            Filter::eq("lanes", Value::Int(3)),
        );
        let features = drain(&mut reader);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].fid(), &Fid::new("new1"));
    }

    #[test]
    fn fid_filter_resolves_against_snapshot() {
        let diff = Diff::new();
        diff.add(road("new0", 1));
        diff.modify(Fid::new("roads.9"), road("roads.9", 8));
        let mut reader = DiffReader::new(
            base(Vec::new()),
            diff.snapshot(),
            Filter::fids(["new0", "roads.9", "roads.404"]),
        );
        let mut fids: Vec<_> = drain(&mut reader)
            .iter()
            .map(|f| f.fid().clone())
            .collect();
        fids.sort();
        assert_eq!(fids, vec![Fid::new("new0"), Fid::new("roads.9")]);
    }

    #[test]
    fn fid_filter_does_not_duplicate_base_hits() {
        let diff = Diff::new();
        diff.modify(Fid::new("roads.1"), road("roads.1", 6));
        let mut reader = DiffReader::new(
            base(vec![road("roads.1", 2)]),
            diff.snapshot(),
            Filter::fids(["roads.1"]),
        );
        let features = drain(&mut reader);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].attribute("lanes"), Some(&Value::Int(6)));
    }

    #[test]
    fn snapshot_ignores_later_staging() {
        let diff = Diff::new();
        diff.add(road("new0", 1));
        let mut reader = DiffReader::new(base(Vec::new()), diff.snapshot(), Filter::Include);

        diff.add(road("new1", 2));
        diff.remove(&Fid::new("new0"));

        let fids: Vec<_> = drain(&mut reader)
            .iter()
            .map(|f| f.fid().clone())
            .collect();
        assert_eq!(fids, vec![Fid::new("new0")]);
    }

    #[test]
    fn close_propagates_once() {
        let inner = VecReader::new(schema(), vec![road("roads.1", 2)]);
        let probe = inner.close_probe();
        let mut reader =
            DiffReader::new(Box::new(inner), Diff::new().snapshot(), Filter::Include);

        reader.close().unwrap();
        reader.close().unwrap();
        assert_eq!(probe.load(Ordering::SeqCst), 1);
        assert!(reader.next().is_err());
    }
}
