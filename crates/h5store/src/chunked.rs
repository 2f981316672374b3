//! Growable record datasets.
//!
//! A [`ChunkedAppendStore`] owns one dataset of `R` records. The first
//! non-empty batch creates it with an unlimited maximum extent and a chunk
//! size picked by [`chunk_size_for`]; later batches extend the extent and
//! write only the new rows through a hyperslab selection.

use std::marker::PhantomData;

use h5store_format::{Container, DatasetCreateProps, Dataspace, SlotKind, UNLIMITED};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::groups::{create_group_recursively, open_group_path};
use crate::handle::HandleGuard;
use crate::naming::normalize;
use crate::record::{H5Record, RecordLayout};
use crate::settings::Settings;

/// Largest chunk, in records.
pub const MAX_CHUNK_RECORDS: u64 = 1000;

/// Chunk size for a dataset whose first batch holds `records` records:
/// the largest power of ten not above `records`, capped at
/// [`MAX_CHUNK_RECORDS`].
pub fn chunk_size_for(records: u64) -> u64 {
    10u64.pow(records.max(1).ilog10()).min(MAX_CHUNK_RECORDS)
}

/// Lifecycle of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No dataset yet.
    Unopened,
    /// Created from the first batch.
    Sized,
    /// Extended at least once.
    Growing,
    /// Handles released; data stays on disk.
    Disposed,
}

/// Appends batches of `R` to one growable dataset.
pub struct ChunkedAppendStore<'c, R> {
    container: &'c Container,
    settings: Settings,
    group_path: String,
    name: String,
    layout: RecordLayout,
    dataset: Option<HandleGuard<'c>>,
    record_count: u64,
    chunk_size: u64,
    state: StoreState,
    _records: PhantomData<fn() -> R>,
}

impl<R> std::fmt::Debug for ChunkedAppendStore<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedAppendStore")
            .field("group_path", &self.group_path)
            .field("name", &self.name)
            .field("record_count", &self.record_count)
            .field("chunk_size", &self.chunk_size)
            .field("state", &self.state)
            .finish()
    }
}

impl<'c, R: H5Record> ChunkedAppendStore<'c, R> {
    /// A store for the dataset `name` in the group at `group_path`.
    /// Nothing is created until the first batch arrives.
    pub fn new(
        container: &'c Container,
        settings: &Settings,
        group_path: &str,
        name: &str,
    ) -> Result<Self> {
        Ok(ChunkedAppendStore {
            container,
            layout: RecordLayout::of::<R>(settings)?,
            name: normalize(name, settings).into_owned(),
            group_path: group_path.to_string(),
            settings: settings.clone(),
            dataset: None,
            record_count: 0,
            chunk_size: 0,
            state: StoreState::Unopened,
            _records: PhantomData,
        })
    }

    /// Attach to a growable dataset written earlier, continuing after its
    /// last record.
    pub fn open_existing(
        container: &'c Container,
        settings: &Settings,
        group_path: &str,
        name: &str,
    ) -> Result<Self> {
        let mut store = Self::new(container, settings, group_path, name)?;
        let root = HandleGuard::wrap(container, container.open_root())?;
        let not_found = || Error::SlotNotFound {
            name: format!("{}/{}", group_path.trim_end_matches('/'), store.name),
            fallback: None,
        };
        let group = open_group_path(container, settings, root.hid(), group_path)?.ok_or_else(not_found)?;
        if !container.exists(group.hid(), &store.name, SlotKind::Dataset)? {
            return Err(not_found());
        }
        let dataset = HandleGuard::wrap(container, container.open_dataset(group.hid(), &store.name))?;

        let chunk = container
            .chunk_dims(dataset.hid())?
            .and_then(|dims| dims.first().copied())
            .ok_or_else(|| store.append_error("dataset is not chunked"))?;
        let stored = container.datatype(dataset.hid())?;
        if !stored.is_compatible_with(store.layout.datatype()) {
            return Err(Error::Conversion {
                name: store.name.clone(),
                reason: "stored record layout differs".into(),
            });
        }
        let space = container.dataspace(dataset.hid())?;
        let rows = space.dimensions.first().copied().unwrap_or(0);

        store.record_count = rows;
        store.chunk_size = chunk;
        store.state = if rows == 0 { StoreState::Sized } else { StoreState::Growing };
        store.dataset = Some(dataset);
        debug!(dataset = %store.name, rows, chunk, "resumed append store");
        Ok(store)
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Chunk size in records; zero before the first batch.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    fn append_error(&self, reason: impl ToString) -> Error {
        Error::Append {
            dataset: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Append a batch.
    ///
    /// Returns `Ok(true)` when the batch was written and `Ok(false)` when
    /// it was an ignored empty batch or a failure swallowed by the error
    /// policy. A failed batch leaves [`record_count`](Self::record_count)
    /// unchanged.
    pub fn append_batch(&mut self, records: &[R]) -> Result<bool> {
        let result = match self.state {
            StoreState::Disposed => Err(self.append_error("store is disposed")),
            StoreState::Unopened => self.create_with(records),
            StoreState::Sized | StoreState::Growing => self.extend_with(records),
        };
        Ok(self.settings.settle("append_batch", result)?.value)
    }

    fn create_with(&mut self, records: &[R]) -> Result<bool> {
        let c = self.container;
        if records.is_empty() {
            error!(dataset = %self.name, "cannot create a dataset from an empty batch");
            return Err(self.append_error("first batch is empty"));
        }
        let bytes = self.layout.encode(records)?;
        let rows = records.len() as u64;
        let chunk = chunk_size_for(rows);

        let root = HandleGuard::wrap(c, c.open_root())?;
        let group = create_group_recursively(c, &self.settings, root.hid(), &self.group_path)?;
        if c.exists(group.hid(), &self.name, SlotKind::Dataset)? {
            debug!(dataset = %self.name, "dataset already exists");
            if !self.settings.override_existing {
                error!(dataset = %self.name, "dataset exists and overriding is disabled");
                return Err(Error::Creation {
                    name: self.name.clone(),
                    kind: "dataset",
                    reason: "already exists".into(),
                });
            }
            c.delete_link(group.hid(), &self.name)?;
        }

        let space = Dataspace::simple_with_max(&[rows], &[UNLIMITED]);
        let props = DatasetCreateProps::new().chunk(&[chunk]);
        let hid = c
            .create_dataset(group.hid(), &self.name, self.layout.datatype(), &space, &props)
            .map_err(|e| {
                error!(dataset = %self.name, error = %e, "cannot create dataset");
                Error::Creation {
                    name: self.name.clone(),
                    kind: "dataset",
                    reason: e.to_string(),
                }
            })?;
        let dataset = HandleGuard::new(c, hid);
        if let Err(e) = c.write_raw(dataset.hid(), None, &bytes) {
            error!(dataset = %self.name, error = %e, "first batch write failed");
            drop(dataset);
            let _ = c.delete_link(group.hid(), &self.name);
            return Err(self.append_error(e));
        }

        debug!(dataset = %self.name, rows, chunk, "created growable dataset");
        self.dataset = Some(dataset);
        self.record_count = rows;
        self.chunk_size = chunk;
        self.state = StoreState::Sized;
        Ok(true)
    }

    fn extend_with(&mut self, records: &[R]) -> Result<bool> {
        if records.is_empty() {
            warn!(dataset = %self.name, "ignoring empty batch");
            return Ok(false);
        }
        let bytes = self.layout.encode(records)?;
        let c = self.container;
        let hid = match &self.dataset {
            Some(dataset) => dataset.hid(),
            None => return Err(self.append_error("dataset handle is not open")),
        };
        let old = self.record_count;
        let added = records.len() as u64;

        if let Err(e) = c.set_extent(hid, &[old + added]) {
            error!(dataset = %self.name, error = %e, "cannot extend dataset");
            return Err(self.append_error(e));
        }
        let written = HandleGuard::wrap(c, c.space_of(hid)).and_then(|space| {
            c.select_hyperslab(space.hid(), &[old], &[added])?;
            c.write_raw(hid, Some(space.hid()), &bytes)
        });
        if let Err(e) = written {
            error!(dataset = %self.name, error = %e, "cannot write appended rows");
            let _ = c.set_extent(hid, &[old]);
            return Err(self.append_error(e));
        }

        self.record_count = old + added;
        self.state = StoreState::Growing;
        Ok(true)
    }

    /// Every record written so far.
    pub fn read_records(&self) -> Result<Vec<R>> {
        match &self.dataset {
            Some(dataset) => {
                let raw = self.container.read_raw(dataset.hid(), None)?;
                self.layout.decode(&raw)
            }
            None => Ok(Vec::new()),
        }
    }

    /// `count` records starting at `start`.
    pub fn read_record_range(&self, start: u64, count: u64) -> Result<Vec<R>> {
        let Some(dataset) = &self.dataset else {
            return Err(self.append_error("nothing has been written"));
        };
        let c = self.container;
        let space = HandleGuard::wrap(c, c.space_of(dataset.hid()))?;
        c.select_hyperslab(space.hid(), &[start], &[count])?;
        let raw = c.read_raw(dataset.hid(), Some(space.hid()))?;
        self.layout.decode(&raw)
    }

    /// Persist everything appended so far.
    ///
    /// Each flush writes the dirty chunks and a new metadata block at the
    /// end of the file; earlier copies stay behind until the file is closed,
    /// which compacts it once more than half is unreferenced. Flushing after
    /// every small batch grows the file faster than the data.
    pub fn flush(&self) -> Result<()> {
        Ok(self.container.flush()?)
    }

    /// Flush, then release the dataset handle. The data stays on disk.
    pub fn dispose(&mut self) -> Result<()> {
        if self.state == StoreState::Disposed {
            return Ok(());
        }
        let flushed = self.flush();
        self.dataset = None;
        self.state = StoreState::Disposed;
        flushed
    }
}

impl<R> Drop for ChunkedAppendStore<'_, R> {
    fn drop(&mut self) {
        if self.state != StoreState::Disposed && self.dataset.is_some() {
            let _ = self.container.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5store_format::FormatError;

    use crate::layout::SemanticType;
    use crate::record::{FieldShape, RecordDecoder, RecordEncoder, RecordField};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Tick {
        index: u32,
        value: f64,
    }

    static TICK_FIELDS: [RecordField; 2] = [
        RecordField {
            name: "index",
            semantic: SemanticType::U32,
            shape: FieldShape::Scalar,
        },
        RecordField {
            name: "value",
            semantic: SemanticType::F64,
            shape: FieldShape::Scalar,
        },
    ];

    impl H5Record for Tick {
        fn fields() -> &'static [RecordField] {
            &TICK_FIELDS
        }

        fn encode_fields(&self, e: &mut RecordEncoder<'_>) -> Result<()> {
            e.scalar(&self.index)?;
            e.scalar(&self.value)
        }

        fn decode_fields(d: &mut RecordDecoder<'_>) -> Result<Self> {
            Ok(Tick {
                index: d.scalar()?,
                value: d.scalar()?,
            })
        }
    }

    fn ticks(range: std::ops::Range<u32>) -> Vec<Tick> {
        range
            .map(|i| Tick {
                index: i,
                value: f64::from(i) * 0.5,
            })
            .collect()
    }

    #[test]
    fn chunk_size_heuristic() {
        assert_eq!(chunk_size_for(1), 1);
        assert_eq!(chunk_size_for(9), 1);
        assert_eq!(chunk_size_for(10), 10);
        assert_eq!(chunk_size_for(999), 100);
        assert_eq!(chunk_size_for(1000), 1000);
        assert_eq!(chunk_size_for(10_000), 1000);
        assert_eq!(chunk_size_for(0), 1);
    }

    #[test]
    fn range_reads_at_the_edges() {
        let c = Container::in_memory();
        let s = Settings::default();
        let mut store = ChunkedAppendStore::<Tick>::new(&c, &s, "", "ticks").unwrap();
        store.append_batch(&ticks(0..2)).unwrap();

        assert!(store.read_record_range(2, 0).unwrap().is_empty());
        assert!(store.read_record_range(0, 0).unwrap().is_empty());
        assert_eq!(store.read_record_range(1, 1).unwrap(), ticks(1..2));
        assert!(store.read_record_range(2, 1).is_err());
        assert!(store.read_record_range(1, 2).is_err());
        assert!(matches!(
            store.read_record_range(u64::MAX, 2),
            Err(Error::Format(FormatError::InvalidSelection(_)))
        ));
        assert!(store.read_record_range(1, u64::MAX).is_err());
        assert_eq!(store.record_count(), 2);
        store.dispose().unwrap();
        assert_eq!(c.open_handle_count(), 0);
    }

    #[test]
    fn lifecycle() {
        let c = Container::in_memory();
        let s = Settings::default();
        {
            let mut store = ChunkedAppendStore::<Tick>::new(&c, &s, "/streams", "ticks").unwrap();
            assert_eq!(store.state(), StoreState::Unopened);
            assert!(store.append_batch(&ticks(0..5)).unwrap());
            assert_eq!(store.state(), StoreState::Sized);
            assert_eq!(store.chunk_size(), 1);
            assert!(store.append_batch(&ticks(5..12)).unwrap());
            assert_eq!(store.state(), StoreState::Growing);
            assert_eq!(store.record_count(), 12);
            assert_eq!(store.read_records().unwrap(), ticks(0..12));
            assert_eq!(store.read_record_range(5, 7).unwrap(), ticks(5..12));
            store.dispose().unwrap();
            assert_eq!(store.state(), StoreState::Disposed);
            assert!(store.append_batch(&ticks(0..1)).is_err());
        }
        assert_eq!(c.open_handle_count(), 0);
    }

    #[test]
    fn empty_first_batch_is_rejected() {
        let c = Container::in_memory();
        let s = Settings::default();
        let mut store = ChunkedAppendStore::<Tick>::new(&c, &s, "", "ticks").unwrap();
        assert!(matches!(store.append_batch(&[]), Err(Error::Append { .. })));
        assert_eq!(store.state(), StoreState::Unopened);
    }

    #[test]
    fn empty_first_batch_without_throwing() {
        let c = Container::in_memory();
        let s = Settings::default().throw_on_error(false);
        let mut store = ChunkedAppendStore::<Tick>::new(&c, &s, "", "ticks").unwrap();
        assert!(!store.append_batch(&[]).unwrap());
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn empty_later_batch_is_ignored() {
        let c = Container::in_memory();
        let s = Settings::default();
        let mut store = ChunkedAppendStore::<Tick>::new(&c, &s, "", "ticks").unwrap();
        store.append_batch(&ticks(0..3)).unwrap();
        assert!(!store.append_batch(&[]).unwrap());
        assert_eq!(store.record_count(), 3);
    }

    #[test]
    fn resume_existing() {
        let c = Container::in_memory();
        let s = Settings::default();
        {
            let mut store = ChunkedAppendStore::<Tick>::new(&c, &s, "a/b", "ticks").unwrap();
            store.append_batch(&ticks(0..20)).unwrap();
            store.dispose().unwrap();
        }
        let mut store = ChunkedAppendStore::<Tick>::open_existing(&c, &s, "a/b", "ticks").unwrap();
        assert_eq!(store.record_count(), 20);
        assert_eq!(store.chunk_size(), 10);
        store.append_batch(&ticks(20..25)).unwrap();
        assert_eq!(store.read_records().unwrap(), ticks(0..25));
    }

    #[test]
    fn resume_missing_is_slot_not_found() {
        let c = Container::in_memory();
        let s = Settings::default();
        let err = ChunkedAppendStore::<Tick>::open_existing(&c, &s, "nowhere", "ticks").unwrap_err();
        assert!(matches!(err, Error::SlotNotFound { .. }));
        assert_eq!(c.open_handle_count(), 0);
    }

    #[test]
    fn first_batch_respects_override_policy() {
        let c = Container::in_memory();
        let strict = Settings::default().override_existing(false);
        {
            let mut store = ChunkedAppendStore::<Tick>::new(&c, &strict, "", "ticks").unwrap();
            store.append_batch(&ticks(0..2)).unwrap();
            store.dispose().unwrap();
        }
        let mut again = ChunkedAppendStore::<Tick>::new(&c, &strict, "", "ticks").unwrap();
        assert!(matches!(again.append_batch(&ticks(0..2)), Err(Error::Creation { .. })));

        let mut replaced = ChunkedAppendStore::<Tick>::new(&c, &Settings::default(), "", "ticks").unwrap();
        replaced.append_batch(&ticks(7..8)).unwrap();
        assert_eq!(replaced.read_records().unwrap(), ticks(7..8));
    }

    #[test]
    fn failed_append_keeps_count() {
        let c = Container::in_memory();
        let s = Settings::default();
        let mut store = ChunkedAppendStore::<Tick>::new(&c, &s, "", "ticks").unwrap();
        store.append_batch(&ticks(0..4)).unwrap();
        // Deleting the dataset underneath the store makes the next extent fail.
        let root = HandleGuard::wrap(&c, c.open_root()).unwrap();
        c.delete_link(root.hid(), "ticks").unwrap();
        assert!(matches!(store.append_batch(&ticks(4..6)), Err(Error::Append { .. })));
        assert_eq!(store.record_count(), 4);
    }
}
