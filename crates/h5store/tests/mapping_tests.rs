//! Object mapping end to end: directions, renames, nested groups, naming
//! policy, missing members and persistence across reopen.

use chrono::{DateTime, TimeZone, Utc};
use h5store::{Error, H5File, H5Object, Settings, SlotKind};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default, PartialEq, H5Object)]
struct Channel {
    index: u16,
    #[h5(name = "Unit")]
    unit: String,
}

#[derive(Debug, Default, PartialEq, H5Object)]
struct Reading {
    #[h5(name = "IntReadWrite")]
    int_read_write: i32,
    #[h5(write_only, name = "shared")]
    int_write_only: i32,
    #[h5(read_only, name = "shared")]
    int_read_only: i32,
    #[h5(skip)]
    int_skip: i32,
    label: String,
    gains: Vec<f64>,
    tags: Vec<String>,
    #[h5(dataset)]
    series: Vec<u32>,
    enabled: bool,
    stamp: DateTime<Utc>,
    #[h5(group)]
    channel: Channel,
}

fn sample() -> Reading {
    Reading {
        int_read_write: 7,
        int_write_only: 11,
        int_read_only: 13,
        int_skip: 17,
        label: "sensor A".into(),
        gains: vec![0.5, 1.0, 2.0],
        tags: vec!["left".into(), "front".into()],
        series: (0..50).collect(),
        enabled: true,
        stamp: Utc.with_ymd_and_hms(2023, 5, 6, 7, 8, 9).unwrap(),
        channel: Channel {
            index: 3,
            unit: "mV".into(),
        },
    }
}

#[test]
fn directions_round_trip() {
    init_tracing();
    let h5 = H5File::in_memory(Settings::default());
    let written = sample();
    h5.write_object("/readings/r1", &written).unwrap();
    let back: Reading = h5.read_object("/readings/r1").unwrap();

    assert_eq!(back.int_read_write, 7);
    assert_eq!(back.int_write_only, 0);
    assert_eq!(back.int_read_only, 11);
    assert_eq!(back.int_skip, 0);
    assert_eq!(back.label, written.label);
    assert_eq!(back.gains, written.gains);
    assert_eq!(back.tags, written.tags);
    assert_eq!(back.series, written.series);
    assert!(back.enabled);
    assert_eq!(back.stamp, written.stamp);
    assert_eq!(back.channel, written.channel);
    assert_eq!(h5.container().open_handle_count(), 0);
}

#[test]
fn skipped_members_leave_no_slot() {
    let h5 = H5File::in_memory(Settings::default());
    h5.write_object("obj", &sample()).unwrap();
    assert!(!h5.item_exists("obj/int_skip", SlotKind::Attribute).unwrap());
    assert!(h5.item_exists("obj/shared", SlotKind::Attribute).unwrap());
    assert!(h5.item_exists("obj/series", SlotKind::Dataset).unwrap());
    assert!(h5.item_exists("obj/channel", SlotKind::Group).unwrap());
    assert!(h5.item_exists("obj/channel/Unit", SlotKind::Attribute).unwrap());
}

#[test]
fn shared_slot_reads_into_other_instance() {
    let h5 = H5File::in_memory(Settings::default());
    let first = Reading {
        int_write_only: 99,
        ..Reading::default()
    };
    h5.write_object("pair", &first).unwrap();
    let mut other = Reading {
        int_write_only: 5,
        ..Reading::default()
    };
    let root = h5.root().unwrap();
    h5store::read_object_into(h5.container(), h5.settings(), root.hid(), "pair", &mut other).unwrap();
    assert_eq!(other.int_read_only, 99);
    assert_eq!(other.int_write_only, 5);
}

#[test]
fn lower_case_naming_applies_to_members_and_groups() {
    let h5 = H5File::in_memory(Settings::default().lower_case_naming(true));
    h5.write_object("/Readings/R1", &sample()).unwrap();
    let c = h5.container();
    {
        let root = h5.root().unwrap();
        assert!(c.exists(root.hid(), "readings", SlotKind::Group).unwrap());
        assert!(!c.exists(root.hid(), "Readings", SlotKind::Group).unwrap());
        let group = h5.open_group("readings/r1").unwrap();
        assert!(c.exists(group.hid(), "intreadwrite", SlotKind::Attribute).unwrap());
        assert!(!c.exists(group.hid(), "IntReadWrite", SlotKind::Attribute).unwrap());
    }
    let back: Reading = h5.read_object("/Readings/R1").unwrap();
    assert_eq!(back.int_read_write, 7);
}

#[derive(Debug, Default, H5Object)]
struct Clash {
    #[h5(name = "dup")]
    first: i32,
    #[h5(name = "dup")]
    second: f64,
}

#[test]
fn same_direction_collision_is_rejected() {
    let h5 = H5File::in_memory(Settings::default());
    let err = h5.write_object("clash", &Clash::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::MemberCollision { type_name: "Clash", first: "first", second: "second", .. }
    ));
    assert!(h5.read_object::<Clash>("/").is_err());
}

#[derive(Debug, Default, H5Object)]
struct Needs {
    #[h5(mandatory)]
    serial: u64,
    note: String,
}

#[derive(Debug, Default, H5Object)]
struct Optional {
    serial: u64,
    #[h5(fallback = "comment")]
    note: String,
}

#[test]
fn missing_members() {
    let h5 = H5File::in_memory(Settings::default());
    drop(h5.create_group_recursively("empty").unwrap());

    let err = h5.read_object::<Needs>("empty").unwrap_err();
    assert!(matches!(err, Error::SlotNotFound { ref name, .. } if name == "serial"));

    let back: Optional = h5.read_object("empty").unwrap();
    assert_eq!(back.serial, 0);
    assert!(back.note.is_empty());

    let strict = H5File::in_memory(Settings::default().throw_on_missing_name(true));
    drop(strict.create_group_recursively("empty").unwrap());
    assert!(strict.read_object::<Optional>("empty").is_err());
}

#[test]
fn fallback_member_name() {
    let h5 = H5File::in_memory(Settings::default());
    let group = h5.create_group_recursively("old").unwrap();
    h5.attributes().write_string(group.hid(), "comment", "from v1").unwrap();
    drop(group);
    let back: Optional = h5.read_object("old").unwrap();
    assert_eq!(back.note, "from v1");
}

#[test]
fn scalar_reads_on_fresh_group() {
    let h5 = H5File::in_memory(Settings::default());
    let group = h5.create_group_recursively("fresh").unwrap();
    let codec = h5.attributes();
    assert!(matches!(
        codec.read_scalar::<i32>(group.hid(), "absent", None, true),
        Err(Error::SlotNotFound { .. })
    ));
    let soft = codec.read_scalar::<i32>(group.hid(), "absent", None, false).unwrap();
    assert!(!soft.success);
    assert_eq!(soft.value, 0);
    drop(group);
    assert_eq!(h5.container().open_handle_count(), 0);
}

#[test]
fn error_policy_degrades_to_outcome() {
    let settings = Settings::default().throw_on_error(false);
    let h5 = H5File::in_memory(settings.clone());
    let outcome = settings.settle("read_object", h5.read_object::<Needs>("missing")).unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.value.serial, 0);
}

#[test]
fn unsupported_member_type_fails() {
    #[derive(Debug, Default, H5Object)]
    struct Odd {
        letter: char,
    }
    let h5 = H5File::in_memory(Settings::default());
    let err = h5.write_object("odd", &Odd { letter: 'q' }).unwrap_err();
    assert!(matches!(err, Error::UnsupportedType(ref t) if t == "char"));
    assert!(h5.read_object::<Odd>("odd").is_err());
}

#[test]
fn objects_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("objects.h5s");
    let written = sample();
    {
        let h5 = H5File::create(&path, Settings::default()).unwrap();
        h5.write_object("/a/b", &written).unwrap();
        h5.close().unwrap();
    }
    let h5 = H5File::open(&path, true, Settings::default()).unwrap();
    let back: Reading = h5.read_object("/a/b").unwrap();
    assert_eq!(back.series, written.series);
    assert_eq!(back.channel, written.channel);
    assert!(matches!(
        h5.write_object("/a/c", &written),
        Err(Error::Creation { .. }) | Err(Error::Format(_))
    ));
}

#[test]
fn override_policy_on_rewrite() {
    let h5 = H5File::in_memory(Settings::default());
    h5.write_object("x", &Channel { index: 1, unit: "V".into() }).unwrap();
    h5.write_object("x", &Channel { index: 2, unit: "A".into() }).unwrap();
    assert_eq!(h5.read_object::<Channel>("x").unwrap().index, 2);

    let strict = H5File::in_memory(Settings::default().override_existing(false));
    strict.write_object("x", &Channel::default()).unwrap();
    assert!(matches!(
        strict.write_object("x", &Channel::default()),
        Err(Error::Creation { .. })
    ));
}
