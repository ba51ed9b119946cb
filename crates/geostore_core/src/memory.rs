//! In-memory backend.
//!
//! The reference [`Backend`] implementation: feature types live in a
//! map of ordered tables, readers snapshot a table at open, and writers
//! edit the live table one operation at a time. Useful on its own for
//! small working sets and as the backend the engine's tests run against.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use geostore_feature::{BoundingBox, Feature, FeatureType, Fid, Filter};

use crate::backend::{Backend, FeatureReader, FeatureWriter};
use crate::error::{CoreError, CoreResult};

struct MemoryTable {
    schema: Arc<FeatureType>,
    features: BTreeMap<Fid, Feature>,
    next_id: u64,
}

impl MemoryTable {
    /// Allocates a fid no stored feature uses.
    fn allocate_fid(&mut self) -> Fid {
        loop {
            let candidate = Fid::new(format!("{}.{}", self.schema.name(), self.next_id));
            self.next_id += 1;
            if !self.features.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// A backing store holding every feature in memory.
///
/// Fids for appended features are assigned as `"<type>.<n>"`. Iteration
/// order is the fid order of the table.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Arc<RwLock<MemoryTable>>>>,
}

impl MemoryBackend {
    /// Creates an empty store with no feature types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a feature under its own fid, replacing any previous one.
    ///
    /// A seeding shortcut that bypasses the writer protocol.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotFound`] when the feature's type is not
    /// in the store, or [`CoreError::IllegalState`] when its schema does
    /// not match the table's.
    pub fn insert(&self, feature: Feature) -> CoreResult<()> {
        let table = self.table(feature.feature_type().name())?;
        let mut table = table.write();
        if feature.feature_type().as_ref() != table.schema.as_ref() {
            return Err(CoreError::illegal_state(
                "feature schema does not match the stored type",
            ));
        }
        table.features.insert(feature.fid().clone(), feature);
        Ok(())
    }

    fn table(&self, type_name: &str) -> CoreResult<Arc<RwLock<MemoryTable>>> {
        self.tables
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| CoreError::type_not_found(type_name))
    }
}

impl Backend for MemoryBackend {
    fn type_names(&self) -> CoreResult<Vec<String>> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn schema(&self, type_name: &str) -> CoreResult<FeatureType> {
        let table = self.table(type_name)?;
        let schema = table.read().schema.as_ref().clone();
        Ok(schema)
    }

    fn raw_reader(&self, type_name: &str, _filter: &Filter) -> CoreResult<Box<dyn FeatureReader>> {
        let table = self.table(type_name)?;
        let table = table.read();
        Ok(Box::new(MemoryReader {
            schema: Arc::clone(&table.schema),
            features: table.features.values().cloned().collect(),
            closed: false,
        }))
    }

    fn raw_writer(&self, type_name: &str) -> CoreResult<Box<dyn FeatureWriter>> {
        let table = self.table(type_name)?;
        let (order, schema) = {
            let table = table.read();
            (
                table.features.keys().cloned().collect(),
                Arc::clone(&table.schema),
            )
        };
        Ok(Box::new(MemoryWriter {
            table,
            schema,
            order,
            current: None,
            appending: false,
            closed: false,
        }))
    }

    fn create_schema(&self, schema: FeatureType) -> CoreResult<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(schema.name()) {
            return Err(CoreError::illegal_state(format!(
                "feature type already exists: {}",
                schema.name()
            )));
        }
        tables.insert(
            schema.name().to_owned(),
            Arc::new(RwLock::new(MemoryTable {
                schema: Arc::new(schema),
                features: BTreeMap::new(),
                next_id: 0,
            })),
        );
        Ok(())
    }

    fn bounds(&self, type_name: &str) -> CoreResult<Option<BoundingBox>> {
        let table = self.table(type_name)?;
        let table = table.read();
        let mut bounds = BoundingBox::EMPTY;
        for feature in table.features.values() {
            bounds = bounds.union(&feature.bounds());
        }
        Ok(Some(bounds))
    }

    fn count(&self, type_name: &str, filter: &Filter) -> CoreResult<Option<usize>> {
        let table = self.table(type_name)?;
        let table = table.read();
        match filter {
            Filter::Include => Ok(Some(table.features.len())),
            Filter::Exclude => Ok(Some(0)),
            Filter::Fids(fids) => Ok(Some(
                fids.iter()
                    .filter(|fid| table.features.contains_key(*fid))
                    .count(),
            )),
            _ => Ok(None),
        }
    }
}

/// Snapshot reader over one table.
struct MemoryReader {
    schema: Arc<FeatureType>,
    features: VecDeque<Feature>,
    closed: bool,
}

impl FeatureReader for MemoryReader {
    fn feature_type(&self) -> &FeatureType {
        &self.schema
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        Ok(!self.features.is_empty())
    }

    fn next(&mut self) -> CoreResult<Feature> {
        if self.closed {
            return Err(CoreError::illegal_state("reader is closed"));
        }
        self.features
            .pop_front()
            .ok_or_else(|| CoreError::illegal_state("no more features"))
    }

    fn close(&mut self) -> CoreResult<()> {
        self.closed = true;
        self.features.clear();
        Ok(())
    }
}

/// Cursor over one table; every mutation lands immediately.
struct MemoryWriter {
    table: Arc<RwLock<MemoryTable>>,
    schema: Arc<FeatureType>,
    order: VecDeque<Fid>,
    current: Option<Fid>,
    appending: bool,
    closed: bool,
}

impl FeatureWriter for MemoryWriter {
    fn feature_type(&self) -> &FeatureType {
        &self.schema
    }

    fn has_next(&mut self) -> CoreResult<bool> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        // Skip fids deleted since the cursor opened.
        loop {
            let Some(fid) = self.order.front() else {
                return Ok(false);
            };
            if self.table.read().features.contains_key(fid) {
                return Ok(true);
            }
            self.order.pop_front();
        }
    }

    fn next(&mut self) -> CoreResult<Feature> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        while let Some(fid) = self.order.pop_front() {
            if let Some(feature) = self.table.read().features.get(&fid) {
                self.current = Some(fid);
                self.appending = false;
                return Ok(feature.clone());
            }
        }
        let fid = self.table.write().allocate_fid();
        let blank = Feature::blank(Arc::clone(&self.schema), fid.clone());
        self.current = Some(fid);
        self.appending = true;
        Ok(blank)
    }

    fn write(&mut self, feature: Feature) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        let fid = self
            .current
            .take()
            .ok_or_else(|| CoreError::illegal_state("write without a current feature"))?;
        if feature.fid() != &fid {
            self.current = Some(fid);
            return Err(CoreError::illegal_state("feature id mismatch"));
        }
        if feature.feature_type().as_ref() != self.schema.as_ref() {
            self.current = Some(fid);
            return Err(CoreError::illegal_state(
                "feature schema does not match the stored type",
            ));
        }
        self.table.write().features.insert(fid, feature);
        Ok(())
    }

    fn remove(&mut self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::illegal_state("writer is closed"));
        }
        let fid = self
            .current
            .take()
            .ok_or_else(|| CoreError::illegal_state("remove without a current feature"))?;
        if !self.appending {
            self.table.write().features.remove(&fid);
        }
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        self.closed = true;
        self.current = None;
        self.order.clear();
        Ok(())
    }
}
