//! Growable record datasets end to end.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use h5store::{chunk_size_for, Error, H5File, H5Record, Settings, StoreState};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Default, PartialEq, H5Record)]
struct LogRecord {
    index: i64,
    timestamp: DateTime<Utc>,
    #[h5(len = 32)]
    data: String,
}

#[derive(Debug, Clone, Default, PartialEq, H5Record)]
struct Frame {
    #[h5(name = "Seq")]
    seq: u32,
    levels: [f32; 4],
    valid: bool,
}

fn log_records(range: std::ops::Range<i64>) -> Vec<LogRecord> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    range
        .map(|i| LogRecord {
            index: i + 1,
            timestamp: base + chrono::Duration::milliseconds(i * 250),
            data: format!("payload {i}"),
        })
        .collect()
}

fn frames(range: std::ops::Range<u32>) -> Vec<Frame> {
    range
        .map(|i| Frame {
            seq: i,
            levels: [i as f32, 0.5, -1.0, 2.0 * i as f32],
            valid: i % 2 == 0,
        })
        .collect()
}

#[test]
fn chunk_size_table() {
    let sizes: Vec<u64> = [1, 10, 999, 1000, 10_000].iter().map(|&n| chunk_size_for(n)).collect();
    assert_eq!(sizes, vec![1, 10, 100, 1000, 1000]);
}

#[test]
fn thousand_records_in_three_batches() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.h5s");
    let all = log_records(0..1000);
    {
        let h5 = H5File::create(&path, Settings::default()).unwrap();
        let mut store = h5.append_store::<LogRecord>("/logs", "entries").unwrap();
        assert!(store.append_batch(&all[..10]).unwrap());
        assert_eq!(store.chunk_size(), 10);
        thread::sleep(Duration::from_millis(5));
        assert!(store.append_batch(&all[10..20]).unwrap());
        thread::sleep(Duration::from_millis(5));
        assert!(store.append_batch(&all[20..]).unwrap());
        assert_eq!(store.record_count(), 1000);
        store.dispose().unwrap();
        drop(store);
        assert_eq!(h5.container().open_handle_count(), 0);
        h5.close().unwrap();
    }

    let h5 = H5File::open(&path, true, Settings::default()).unwrap();
    let store = h5.open_append_store::<LogRecord>("/logs", "entries").unwrap();
    let back = store.read_records().unwrap();
    assert_eq!(back.len(), 1000);
    for (i, record) in back.iter().enumerate() {
        assert_eq!(record.index, i as i64 + 1);
        assert_eq!(record.data, all[i].data);
        assert_eq!(record.timestamp, all[i].timestamp);
    }
}

#[test]
fn prior_batches_are_unchanged() {
    let h5 = H5File::in_memory(Settings::default());
    let mut store = h5.append_store::<Frame>("", "frames").unwrap();
    let b1 = frames(0..7);
    let b2 = frames(100..113);
    store.append_batch(&b1).unwrap();
    store.append_batch(&b2).unwrap();
    assert_eq!(store.read_record_range(0, 7).unwrap(), b1);
    assert_eq!(store.read_record_range(7, 13).unwrap(), b2);
    assert!(store.read_record_range(10, 20).is_err());
}

#[test]
fn range_reads_past_the_end_fail() {
    let h5 = H5File::in_memory(Settings::default());
    let mut store = h5.append_store::<LogRecord>("logs", "entries").unwrap();
    assert!(store.read_record_range(0, 1).is_err());
    store.append_batch(&log_records(0..10)).unwrap();

    assert!(store.read_record_range(10, 0).unwrap().is_empty());
    assert_eq!(store.read_record_range(9, 1).unwrap(), log_records(9..10));
    assert!(store.read_record_range(10, 1).is_err());
    assert!(store.read_record_range(5, 6).is_err());
    assert!(store.read_record_range(u64::MAX, 2).is_err());
    assert!(store.read_record_range(u64::MAX - 1, u64::MAX).is_err());

    store.append_batch(&log_records(10..12)).unwrap();
    assert_eq!(store.read_record_range(10, 2).unwrap(), log_records(10..12));
}

#[test]
fn resume_in_a_later_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.h5s");
    {
        let h5 = H5File::create(&path, Settings::default()).unwrap();
        let mut store = h5.append_store::<Frame>("run/1", "frames").unwrap();
        store.append_batch(&frames(0..30)).unwrap();
        store.dispose().unwrap();
        drop(store);
        h5.close().unwrap();
    }
    {
        let h5 = H5File::open(&path, false, Settings::default()).unwrap();
        let mut store = h5.open_append_store::<Frame>("run/1", "frames").unwrap();
        assert_eq!(store.state(), StoreState::Growing);
        assert_eq!(store.record_count(), 30);
        store.append_batch(&frames(30..45)).unwrap();
        store.dispose().unwrap();
        drop(store);
        h5.close().unwrap();
    }
    let h5 = H5File::open(&path, true, Settings::default()).unwrap();
    let store = h5.open_append_store::<Frame>("run/1", "frames").unwrap();
    assert_eq!(store.read_records().unwrap(), frames(0..45));
}

#[test]
fn resume_with_different_layout_fails() {
    let h5 = H5File::in_memory(Settings::default());
    let mut store = h5.append_store::<Frame>("", "frames").unwrap();
    store.append_batch(&frames(0..2)).unwrap();
    store.dispose().unwrap();
    assert!(matches!(
        h5.open_append_store::<LogRecord>("", "frames"),
        Err(Error::Conversion { .. })
    ));
}

#[test]
fn read_only_append_fails_without_advancing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.h5s");
    {
        let h5 = H5File::create(&path, Settings::default()).unwrap();
        let mut store = h5.append_store::<Frame>("", "frames").unwrap();
        store.append_batch(&frames(0..3)).unwrap();
        store.dispose().unwrap();
        drop(store);
        h5.close().unwrap();
    }
    let h5 = H5File::open(&path, true, Settings::default().throw_on_error(false)).unwrap();
    let mut store = h5.open_append_store::<Frame>("", "frames").unwrap();
    assert!(!store.append_batch(&frames(3..5)).unwrap());
    assert_eq!(store.record_count(), 3);
    assert_eq!(store.read_records().unwrap(), frames(0..3));
}

#[test]
fn record_members_use_declared_names() {
    let h5 = H5File::in_memory(Settings::default());
    let mut store = h5.append_store::<Frame>("", "frames").unwrap();
    store.append_batch(&frames(0..1)).unwrap();
    let h5store_format::Datatype::Compound { members, .. } = store.layout().datatype() else {
        panic!("records are compounds");
    };
    let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Seq", "levels", "valid"]);
}
