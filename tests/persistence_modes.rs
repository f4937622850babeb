use std::sync::Arc;

use insightdb::construct::{Database, DatasetInfo, DatasetSource};
use insightdb::interface::InsightFacade;
use insightdb::persist::PersistenceMode;
use insightdb::record::{DatasetKind, Record, Room, Section};
use insightdb::InsightError;
use serde_json::json;

fn sections() -> Vec<Record> {
    ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, uuid)| {
            Record::from(Section {
                uuid: uuid.to_string(),
                id: "310".to_string(),
                title: "software engineering".to_string(),
                instructor: "smith".to_string(),
                dept: "cpsc".to_string(),
                year: 2015.0,
                avg: 70.0 + 10.0 * i as f64,
                pass: 12.0,
                fail: 1.0,
                audit: 0.0,
            })
        })
        .collect()
}

fn rooms() -> Vec<Record> {
    vec![Record::from(Room::new(
        "Hugh Dempster Pavilion",
        "DMP",
        "110",
        "6245 Agronomy Road V6T 1Z4",
        49.26125,
        -123.24807,
        120.0,
        "Tiered Large Group",
        "Classroom-Fixed Tablets",
        "http://students.ubc.ca/campus/discover/buildings-and-classrooms/room/DMP-110",
    ))]
}

fn temp_path(name: &str) -> String {
    let path = std::env::temp_dir().join(format!("insightdb_{name}_{}.sqlite", std::process::id()));
    let path = path.to_string_lossy().to_string();
    // Ensure clean start
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn in_memory_mode_allows_basic_operations() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let ids = db.add_dataset("courses", DatasetKind::Sections, sections()).expect("add");
    assert_eq!(ids, vec!["courses"]);
    assert!(db.persistor().lock().unwrap().contains_dataset("courses").unwrap());
    assert_eq!(db.dataset_keeper().lock().unwrap().len(), 1);
}

#[test]
fn file_mode_rehydrates_after_restart() {
    let path = temp_path("rehydrate");
    {
        let db = Database::new(PersistenceMode::File(path.clone())).expect("db");
        db.add_dataset("courses", DatasetKind::Sections, sections()).expect("add");
        db.add_dataset("rooms", DatasetKind::Rooms, rooms()).expect("add");
    }
    let db = Arc::new(Database::new(PersistenceMode::File(path.clone())).expect("reopen"));
    assert!(db.dataset_keeper.lock().unwrap().is_empty(), "nothing is loaded eagerly");

    // listing sees persisted datasets without loading them
    let listed = db.list_datasets().expect("list");
    assert_eq!(
        listed,
        vec![
            DatasetInfo { id: "courses".into(), kind: DatasetKind::Sections, num_rows: 3 },
            DatasetInfo { id: "rooms".into(), kind: DatasetKind::Rooms, num_rows: 1 },
        ]
    );
    assert!(db.dataset_keeper.lock().unwrap().is_empty());

    let facade = InsightFacade::new(Arc::clone(&db));
    let rows = facade
        .perform_query(&json!({
            "WHERE": { "GT": { "courses_avg": 75 } },
            "OPTIONS": { "COLUMNS": ["courses_uuid", "courses_avg"], "ORDER": "courses_uuid" }
        }))
        .expect("query ok");
    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        json!([ { "courses_uuid": "b", "courses_avg": 80 }, { "courses_uuid": "c", "courses_avg": 90 } ])
    );
    assert_eq!(db.dataset_keeper.lock().unwrap().len(), 1, "only the queried dataset is loaded");

    // the derived room name survives the round trip through storage
    let room = db.resolve_dataset("rooms").expect("resolve").expect("present");
    assert_eq!(room.records()[0].field("name").unwrap().as_text(), "DMP_110");

    drop(facade);
    drop(room);
    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn duplicate_ids_are_rejected_even_when_only_persisted() {
    let path = temp_path("duplicate");
    {
        let db = Database::new(PersistenceMode::File(path.clone())).expect("db");
        db.add_dataset("courses", DatasetKind::Sections, sections()).expect("add");
        let err = db
            .add_dataset("courses", DatasetKind::Sections, sections())
            .expect_err("duplicate in memory");
        assert!(matches!(err, InsightError::Validation(_)));
    }
    let db = Database::new(PersistenceMode::File(path.clone())).expect("reopen");
    let err = db
        .add_dataset("courses", DatasetKind::Sections, sections())
        .expect_err("duplicate in storage");
    assert!(matches!(err, InsightError::Validation(_)));
    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn remove_deletes_from_memory_and_storage() {
    let path = temp_path("remove");
    {
        let db = Database::new(PersistenceMode::File(path.clone())).expect("db");
        db.add_dataset("courses", DatasetKind::Sections, sections()).expect("add");
        assert_eq!(db.remove_dataset("courses").expect("remove"), "courses");
        assert!(db.list_datasets().expect("list").is_empty());
        db.add_dataset("rooms", DatasetKind::Rooms, rooms()).expect("add");
    }
    let db = Database::new(PersistenceMode::File(path.clone())).expect("reopen");
    // removal of a dataset that was never loaded in this process
    assert_eq!(db.remove_dataset("rooms").expect("remove persisted"), "rooms");
    assert!(db.resolve_dataset("rooms").expect("resolve").is_none());
    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn remove_errors() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    assert!(matches!(db.remove_dataset("ghost"), Err(InsightError::NotFound(_))));
    for bad in ["", "   ", "has_underscore"] {
        assert!(
            matches!(db.remove_dataset(bad), Err(InsightError::Validation(_))),
            "id {bad:?} should be invalid"
        );
    }
}

#[test]
fn add_errors() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    for bad in ["", " \t", "a_b"] {
        let err = db.add_dataset(bad, DatasetKind::Sections, sections()).expect_err("bad id");
        assert!(matches!(err, InsightError::Validation(_)), "id {bad:?}");
    }
    let err = db.add_dataset("empty", DatasetKind::Sections, Vec::new()).expect_err("no records");
    assert!(matches!(err, InsightError::Validation(_)));
    let err = db.add_dataset("mixed", DatasetKind::Sections, rooms()).expect_err("wrong kind");
    assert!(matches!(err, InsightError::Validation(_)));
    assert!(db.list_datasets().expect("list").is_empty());
}

// rewrites the stored checksum behind the database's back
fn tamper_checksum(path: &str, id: &str) {
    let connection = rusqlite::Connection::open(path).expect("open");
    let changed = connection
        .execute(
            "update Dataset set Checksum = ? where Dataset_Identity = ?",
            rusqlite::params!["0000", id],
        )
        .expect("update");
    assert_eq!(changed, 1);
}

#[test]
fn tampered_records_are_detected_on_restore() {
    let path = temp_path("tamper");
    {
        let db = Database::new(PersistenceMode::File(path.clone())).expect("db");
        db.add_dataset("courses", DatasetKind::Sections, sections()).expect("add");
    }
    tamper_checksum(&path, "courses");
    let db = Database::new(PersistenceMode::File(path.clone())).expect("reopen");
    match db.resolve_dataset("courses") {
        Err(InsightError::DataCorruption { .. }) => {}
        other => panic!("expected DataCorruption, got {other:?}"),
    }
    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn query_on_tampered_dataset_is_a_validation_error() {
    let path = temp_path("tamper_query");
    {
        let db = Database::new(PersistenceMode::File(path.clone())).expect("db");
        db.add_dataset("courses", DatasetKind::Sections, sections()).expect("add");
    }
    tamper_checksum(&path, "courses");
    let db = Database::new(PersistenceMode::File(path.clone())).expect("reopen");
    let facade = InsightFacade::new(Arc::new(db));
    let result = facade.perform_query(&json!({
        "WHERE": {},
        "OPTIONS": { "COLUMNS": ["courses_dept"] }
    }));
    match result {
        Err(InsightError::Validation(message)) => {
            assert!(message.contains("checksum mismatch"), "message was {message}")
        }
        other => panic!("expected Validation, got {other:?}"),
    }
    drop(facade);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn concurrent_adds_of_one_id_register_once() {
    let path = temp_path("concurrent");
    let db = Arc::new(Database::new(PersistenceMode::File(path.clone())).expect("db"));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || db.add_dataset("courses", DatasetKind::Sections, sections()).is_ok())
        })
        .collect();
    let added = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(added, 1, "exactly one add should win");
    assert_eq!(db.dataset_keeper().lock().unwrap().len(), 1);
    drop(db);
    let _ = std::fs::remove_file(&path);
}
