//! Shared fixtures for the verso integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use verso::{
    ClassSpec, Clock, Record, RecordId, Row, Schema, SchemaSpec, SqliteStorage, Stage, Storage,
    Timestamp, Versioned, VersionedConfig,
};
use verso_ast::{Expr, OrderingTerm, SelectQuery};

/// `Page` (staged base) with `BlogPost` (own table) and `RedirectPage` (no
/// table) below it, plus an unstaged `Note`.
pub fn schema_spec() -> SchemaSpec {
    SchemaSpec {
        classes: vec![
            ClassSpec::base("Page", &["Title", "Content"]),
            ClassSpec::subclass("BlogPost", "Page", &["Author", "Summary"]),
            ClassSpec::subclass("RedirectPage", "Page", &[]),
            ClassSpec::base("Note", &["Body"]).unstaged(),
        ],
    }
}

pub const DDL: &str = r#"
CREATE TABLE "Page" (
    "ID" INTEGER PRIMARY KEY,
    "ClassName" TEXT,
    "Created" TEXT,
    "LastEdited" TEXT,
    "Version" INTEGER NOT NULL DEFAULT 0,
    "Title" TEXT,
    "Content" TEXT
);
CREATE TABLE "Page_Live" (
    "ID" INTEGER PRIMARY KEY,
    "ClassName" TEXT,
    "Created" TEXT,
    "LastEdited" TEXT,
    "Version" INTEGER NOT NULL DEFAULT 0,
    "Title" TEXT,
    "Content" TEXT
);
CREATE TABLE "Page_Versions" (
    "ID" INTEGER PRIMARY KEY,
    "RecordID" INTEGER NOT NULL,
    "Version" INTEGER NOT NULL,
    "WasPublished" INTEGER NOT NULL DEFAULT 0,
    "WasDeleted" INTEGER NOT NULL DEFAULT 0,
    "WasDraft" INTEGER NOT NULL DEFAULT 1,
    "AuthorID" INTEGER NOT NULL DEFAULT 0,
    "PublisherID" INTEGER NOT NULL DEFAULT 0,
    "ClassName" TEXT,
    "Created" TEXT,
    "LastEdited" TEXT,
    "Title" TEXT,
    "Content" TEXT
);
CREATE UNIQUE INDEX "Page_Versions_RecordID_Version" ON "Page_Versions" ("RecordID", "Version");

CREATE TABLE "BlogPost" ("ID" INTEGER PRIMARY KEY, "Author" TEXT, "Summary" TEXT);
CREATE TABLE "BlogPost_Live" ("ID" INTEGER PRIMARY KEY, "Author" TEXT, "Summary" TEXT);
CREATE TABLE "BlogPost_Versions" (
    "ID" INTEGER PRIMARY KEY,
    "RecordID" INTEGER NOT NULL,
    "Version" INTEGER NOT NULL,
    "Author" TEXT,
    "Summary" TEXT
);
CREATE UNIQUE INDEX "BlogPost_Versions_RecordID_Version" ON "BlogPost_Versions" ("RecordID", "Version");

CREATE TABLE "Note" (
    "ID" INTEGER PRIMARY KEY,
    "ClassName" TEXT,
    "Created" TEXT,
    "LastEdited" TEXT,
    "Version" INTEGER NOT NULL DEFAULT 0,
    "Body" TEXT
);
CREATE TABLE "Note_Versions" (
    "ID" INTEGER PRIMARY KEY,
    "RecordID" INTEGER NOT NULL,
    "Version" INTEGER NOT NULL,
    "WasPublished" INTEGER NOT NULL DEFAULT 0,
    "WasDeleted" INTEGER NOT NULL DEFAULT 0,
    "WasDraft" INTEGER NOT NULL DEFAULT 1,
    "AuthorID" INTEGER NOT NULL DEFAULT 0,
    "PublisherID" INTEGER NOT NULL DEFAULT 0,
    "ClassName" TEXT,
    "Created" TEXT,
    "LastEdited" TEXT,
    "Body" TEXT
);
CREATE UNIQUE INDEX "Note_Versions_RecordID_Version" ON "Note_Versions" ("RecordID", "Version");
"#;

/// Clock the test moves by hand. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn at(start: &str) -> Self {
        Self {
            now: Arc::new(Mutex::new(ts(start))),
        }
    }

    pub fn set(&self, at: &str) {
        *self.now.lock() = ts(at);
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock();
        *now = now.plus_seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

pub fn ts(input: &str) -> Timestamp {
    Timestamp::parse(input).expect("valid timestamp")
}

pub fn id(raw: i64) -> RecordId {
    RecordId::new(raw).expect("positive id")
}

pub fn create_tables(storage: &SqliteStorage) {
    storage.execute_batch(DDL).expect("create fixture tables");
}

/// In-memory session with the fixture tables and a manual clock.
pub fn session_with(config: VersionedConfig) -> (Versioned<SqliteStorage>, ManualClock) {
    let storage = SqliteStorage::open_in_memory().expect("open in-memory database");
    create_tables(&storage);
    let schema = Schema::build(&schema_spec(), &config, &[]).expect("fixture schema");
    let clock = ManualClock::at("2024-01-01 09:00:00");
    let session = Versioned::new(schema, config, storage)
        .expect("session")
        .with_clock(clock.clone());
    (session, clock)
}

pub fn session() -> (Versioned<SqliteStorage>, ManualClock) {
    session_with(VersionedConfig::default())
}

/// Write a new `Page` on `stage` and return it.
pub fn new_page(session: &Versioned<SqliteStorage>, title: &str, stage: Stage) -> Record {
    let mut page = Record::new("Page").with("Title", title);
    session
        .write_to_stage(&mut page, stage)
        .expect("write page");
    page
}

/// Raw rows of `table` for `record_id`, in insertion order.
pub fn history_rows(session: &Versioned<SqliteStorage>, table: &str, record_id: RecordId) -> Vec<Row> {
    let mut query = SelectQuery::from_table(table);
    query.add_where(Expr::bare("RecordID").equals(record_id));
    query.set_order_by(vec![OrderingTerm::asc(Expr::bare("ID"))]);
    session.storage().select(&query).expect("read history")
}

/// Raw row of a stage table.
pub fn stage_row(session: &Versioned<SqliteStorage>, table: &str, record_id: RecordId) -> Option<Row> {
    let mut query = SelectQuery::from_table(table);
    query.add_where(Expr::bare("ID").equals(record_id));
    session.storage().select_one(&query).expect("read stage row")
}

pub fn versions_of(rows: &[Row]) -> Vec<i64> {
    rows.iter().filter_map(|row| row.get_i64("Version")).collect()
}

pub fn titles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get_text("Title").map(str::to_owned))
        .collect()
}
