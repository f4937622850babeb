use std::sync::Arc;

use insightdb::config::Settings;
use insightdb::construct::Database;
use insightdb::interface::InsightFacade;
use insightdb::persist::PersistenceMode;
use insightdb::record::DatasetKind;
use insightdb::InsightError;
use serde_json::{json, Value};

fn courses() -> Value {
    json!([
        { "uuid": "1", "id": "310", "title": "sw eng", "instructor": "smith", "dept": "cpsc",
          "year": 2015, "avg": 80, "pass": 40, "fail": 2, "audit": 0 },
        { "uuid": "2", "id": "310", "title": "sw eng", "instructor": "jones", "dept": "cpsc",
          "year": 2016, "avg": 90, "pass": 50, "fail": 1, "audit": 1 },
        { "uuid": "3", "id": "110", "title": "intro", "instructor": "smith", "dept": "cpsc",
          "year": 2015, "avg": 70, "pass": 100, "fail": 9, "audit": 2 },
        { "uuid": "4", "id": "100", "title": "calc", "instructor": "lee", "dept": "math",
          "year": 2014, "avg": 60.25, "pass": 80, "fail": 20, "audit": 0 }
    ])
}

fn setup() -> InsightFacade {
    let db = Database::new(PersistenceMode::InMemory).unwrap();
    let facade = InsightFacade::new(Arc::new(db));
    let ids = facade
        .add_dataset_json("courses", DatasetKind::Sections, &courses())
        .expect("dataset added");
    assert_eq!(ids, vec!["courses"]);
    facade
}

#[test]
fn minimal_courses_scenario() {
    let db = Database::new(PersistenceMode::InMemory).unwrap();
    let facade = InsightFacade::new(Arc::new(db));
    let content = json!([
        { "uuid": "a", "id": "1", "title": "t", "instructor": "i", "dept": "cpsc",
          "year": 2020, "avg": 90, "pass": 1, "fail": 0, "audit": 0 },
        { "uuid": "b", "id": "2", "title": "t", "instructor": "i", "dept": "math",
          "year": 2020, "avg": 80, "pass": 1, "fail": 0, "audit": 0 }
    ]);
    facade
        .add_dataset_json("courses", DatasetKind::Sections, &content)
        .expect("dataset added");
    let rows = facade
        .perform_query(&json!({
            "WHERE": { "GT": { "courses_avg": 85 } },
            "OPTIONS": { "COLUMNS": ["courses_dept", "courses_avg"] }
        }))
        .expect("query ok");
    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        json!([ { "courses_dept": "cpsc", "courses_avg": 90 } ])
    );
}

#[test]
fn filter_then_project_and_order() {
    let facade = setup();
    let query = json!({
        "WHERE": { "AND": [ { "IS": { "courses_dept": "cpsc" } }, { "GT": { "courses_avg": 75 } } ] },
        "OPTIONS": { "COLUMNS": ["courses_dept", "courses_id", "courses_avg"], "ORDER": "courses_avg" }
    });
    let rows = facade.perform_query(&query).expect("query ok");
    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        json!([
            { "courses_dept": "cpsc", "courses_id": "310", "courses_avg": 80 },
            { "courses_dept": "cpsc", "courses_id": "310", "courses_avg": 90 }
        ])
    );
}

#[test]
fn grouped_averages_per_department() {
    let facade = setup();
    let query = json!({
        "WHERE": {},
        "OPTIONS": {
            "COLUMNS": ["courses_dept", "overall"],
            "ORDER": { "dir": "DOWN", "keys": ["overall"] }
        },
        "TRANSFORMATIONS": {
            "GROUP": ["courses_dept"],
            "APPLY": [ { "overall": { "AVG": "courses_avg" } } ]
        }
    });
    let rows = facade.perform_query(&query).expect("query ok");
    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        json!([
            { "courses_dept": "cpsc", "overall": 80 },
            { "courses_dept": "math", "overall": 60.25 }
        ])
    );
}

#[test]
fn queries_are_idempotent() {
    let facade = setup();
    let query = json!({
        "WHERE": { "NOT": { "LT": { "courses_year": 2015 } } },
        "OPTIONS": { "COLUMNS": ["courses_uuid", "courses_instructor"] }
    });
    let first = facade.perform_query(&query).expect("query ok");
    let second = facade.perform_query(&query).expect("query ok");
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn json_content_must_be_records_of_the_kind() {
    let facade = setup();
    let not_an_array = facade.add_dataset_json("x", DatasetKind::Sections, &json!({ "uuid": "1" }));
    assert!(matches!(not_an_array, Err(InsightError::Validation(_))));
    let missing_fields = facade.add_dataset_json("y", DatasetKind::Rooms, &courses());
    assert!(matches!(missing_fields, Err(InsightError::Validation(_))));
    let ids: Vec<String> = facade.list_datasets().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["courses"]);
}

#[test]
fn rooms_from_json_derive_their_name() {
    let facade = setup();
    let content = json!([{
        "fullname": "Hugh Dempster Pavilion", "shortname": "DMP", "number": "110",
        "address": "6245 Agronomy Road V6T 1Z4", "lat": 49.26125, "lon": -123.24807,
        "seats": 120, "type": "Tiered Large Group", "furniture": "Classroom-Fixed Tablets",
        "href": "http://students.ubc.ca/campus/discover/buildings-and-classrooms/room/DMP-110"
    }]);
    let ids = facade
        .add_dataset_json("rooms", DatasetKind::Rooms, &content)
        .expect("rooms added");
    assert_eq!(ids, vec!["courses", "rooms"]);
    let rows = facade
        .perform_query(&json!({
            "WHERE": { "GT": { "rooms_seats": 100 } },
            "OPTIONS": { "COLUMNS": ["rooms_name", "rooms_type", "rooms_lat"] }
        }))
        .expect("query ok");
    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        json!([ { "rooms_name": "DMP_110", "rooms_type": "Tiered Large Group", "rooms_lat": 49.26125 } ])
    );
}

#[test]
fn settings_fall_back_to_defaults() {
    let settings = Settings::load_from("no-such-insightdb-settings").expect("settings");
    assert_eq!(settings.bind_address, "127.0.0.1:4321");
    assert_eq!(settings.log_filter, "info");
    assert_eq!(
        settings.persistence_mode(),
        PersistenceMode::File("insightdb.sqlite".to_string())
    );
}
