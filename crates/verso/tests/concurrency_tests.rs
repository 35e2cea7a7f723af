//! Writers on separate connections to one database file.

mod common;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use verso::{Clock, ReadingMode, Record, Schema, SqliteStorage, Stage, Timestamp, Versioned, VersionedConfig};

const WRITERS: usize = 4;
const WRITES_PER_WRITER: usize = 10;

/// Clock that parks the first caller after [`GateClock::arm`] until the
/// test has looked around. Later callers pass straight through.
#[derive(Clone)]
struct GateClock {
    armed: Arc<AtomicBool>,
    entered: Arc<Barrier>,
    released: Arc<Barrier>,
}

impl GateClock {
    fn new() -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(false)),
            entered: Arc::new(Barrier::new(2)),
            released: Arc::new(Barrier::new(2)),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl Clock for GateClock {
    fn now(&self) -> Timestamp {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.released.wait();
        }
        ts("2024-01-01 09:00:00")
    }
}

fn open_session(path: &Path) -> Versioned<SqliteStorage> {
    let config = VersionedConfig::default();
    let schema = Schema::build(&schema_spec(), &config, &[]).expect("fixture schema");
    let storage = SqliteStorage::open(path).expect("open database file");
    Versioned::new(schema, config, storage).expect("session")
}

#[test]
fn concurrent_writers_never_share_a_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Arc::new(dir.path().join("site.db"));

    let setup = open_session(&path);
    create_tables(setup.storage());
    let page = new_page(&setup, "seed", Stage::Draft);
    let id = page.id.expect("id");

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = Arc::clone(&path);
            thread::spawn(move || {
                let session = open_session(&path);
                for n in 0..WRITES_PER_WRITER {
                    let mut record = Record::new("Page").with("Title", format!("writer {writer} edit {n}"));
                    record.id = Some(id);
                    session
                        .write_to_stage(&mut record, Stage::Draft)
                        .expect("concurrent write");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let versions = versions_of(&history_rows(&setup, "Page_Versions", id));
    let expected = 1 + WRITERS * WRITES_PER_WRITER;
    assert_eq!(versions.len(), expected);
    let unique: BTreeSet<i64> = versions.iter().copied().collect();
    assert_eq!(unique.len(), expected);
    assert_eq!(unique.iter().next_back().copied(), i64::try_from(expected).ok());

    let draft = stage_row(&setup, "Page", id).expect("draft row");
    assert_eq!(draft.get_i64("Version"), i64::try_from(expected).ok());
}

#[test]
fn threads_sharing_one_connection_are_serialized() {
    let (session, _) = session();
    let page = new_page(&session, "seed", Stage::Draft);
    let id = page.id.expect("id");

    thread::scope(|scope| {
        for writer in 0..WRITERS {
            let session = &session;
            scope.spawn(move || {
                for n in 0..WRITES_PER_WRITER {
                    let mut record = Record::new("Page").with("Title", format!("{writer}/{n}"));
                    record.id = Some(id);
                    session
                        .write_to_stage(&mut record, Stage::Live)
                        .expect("shared write");
                }
            });
        }
    });

    let versions = versions_of(&history_rows(&session, "Page_Versions", id));
    let expected = 1 + WRITERS * WRITES_PER_WRITER;
    let unique: BTreeSet<i64> = versions.iter().copied().collect();
    assert_eq!(unique.len(), expected);
    assert_eq!(
        session
            .version_number_by_stage("Page", Stage::Live, id, false)
            .expect("lookup")
            .map(verso::Version::get),
        i64::try_from(expected).ok()
    );
}

#[test]
fn explicit_stage_writes_leave_the_shared_reading_mode_alone() {
    let (session, _) = session();
    let gate = GateClock::new();
    let session = session.with_clock(gate.clone());
    session.set_stage(Stage::Draft);
    let page = new_page(&session, "seed", Stage::Draft);
    let id = page.id.expect("id");

    gate.arm();
    thread::scope(|scope| {
        let writer = scope.spawn(|| {
            let mut record = Record::new("Page").with("Title", "published");
            record.id = Some(id);
            session
                .write_to_stage(&mut record, Stage::Live)
                .expect("live write");
        });

        gate.entered.wait();
        assert_eq!(session.reading_mode(), ReadingMode::Stage(Stage::Draft));
        let mut other = Record::new("Page").with("Title", "draft only");
        session.write(&mut other).expect("plain write");
        let other_id = other.id.expect("id");
        assert!(stage_row(&session, "Page_Live", other_id).is_none());
        gate.released.wait();

        writer.join().expect("writer thread");
    });

    assert_eq!(session.reading_mode(), ReadingMode::Stage(Stage::Draft));
    let live = stage_row(&session, "Page_Live", id).expect("live row");
    assert_eq!(live.get_text("Title"), Some("published"));
}
