use std::sync::Arc;

use insightdb::construct::Database;
use insightdb::interface::InsightFacade;
use insightdb::persist::PersistenceMode;
use insightdb::record::{DatasetKind, Record, Row, Section};
use serde_json::{json, Value};

fn section(uuid: &str, dept: &str, id: &str, instructor: &str, avg: f64, year: f64) -> Record {
    Record::from(Section {
        uuid: uuid.to_string(),
        id: id.to_string(),
        title: format!("{dept} {id}"),
        instructor: instructor.to_string(),
        dept: dept.to_string(),
        year,
        avg,
        pass: 30.0,
        fail: 3.0,
        audit: 1.0,
    })
}

fn setup() -> InsightFacade {
    let db = Database::new(PersistenceMode::InMemory).unwrap();
    let facade = InsightFacade::new(Arc::new(db));
    let records = vec![
        section("1", "cpsc", "310", "smith, john", 80.0, 2015.0),
        section("2", "cpsc", "310", "jones, ann", 90.0, 2016.0),
        section("3", "cpsc", "110", "smith, john", 70.0, 2015.0),
        section("4", "math", "100", "lee, kim", 60.0, 2014.0),
        section("5", "mathx", "200", "", 95.5, 1900.0),
    ];
    facade
        .add_dataset("courses", DatasetKind::Sections, records)
        .expect("dataset added");
    facade
}

fn uuids(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .map(|r| r.get("courses_uuid").expect("uuid column").as_text())
        .collect()
}

fn run(facade: &InsightFacade, filter: Value) -> Vec<String> {
    let query = json!({
        "WHERE": filter,
        "OPTIONS": { "COLUMNS": ["courses_uuid"], "ORDER": "courses_uuid" }
    });
    let rows = facade.perform_query(&query).expect("query ok");
    uuids(&rows)
}

#[test]
fn empty_where_returns_every_row() {
    let facade = setup();
    assert_eq!(run(&facade, json!({})), vec!["1", "2", "3", "4", "5"]);
}

#[test]
fn numeric_comparisons() {
    let facade = setup();
    assert_eq!(run(&facade, json!({ "GT": { "courses_avg": 80 } })), vec!["2", "5"]);
    assert_eq!(run(&facade, json!({ "LT": { "courses_avg": 70 } })), vec!["4"]);
    assert_eq!(run(&facade, json!({ "EQ": { "courses_avg": 95.5 } })), vec!["5"]);
    assert!(run(&facade, json!({ "EQ": { "courses_avg": 81 } })).is_empty());
}

#[test]
fn raising_a_gt_bound_never_adds_rows() {
    let facade = setup();
    let mut previous = run(&facade, json!({ "GT": { "courses_avg": 0 } }));
    for bound in [50, 65, 75, 85, 95, 100] {
        let current = run(&facade, json!({ "GT": { "courses_avg": bound } }));
        assert!(
            current.iter().all(|u| previous.contains(u)),
            "GT {bound} returned rows not matched by a lower bound"
        );
        previous = current;
    }
    assert!(previous.is_empty());
}

#[test]
fn wildcard_patterns() {
    let facade = setup();
    assert_eq!(run(&facade, json!({ "IS": { "courses_dept": "math" } })), vec!["4"]);
    assert_eq!(run(&facade, json!({ "IS": { "courses_dept": "math*" } })), vec!["4", "5"]);
    assert_eq!(run(&facade, json!({ "IS": { "courses_dept": "*sc" } })), vec!["1", "2", "3"]);
    assert_eq!(run(&facade, json!({ "IS": { "courses_instructor": "*john*" } })), vec!["1", "3"]);
    assert_eq!(run(&facade, json!({ "IS": { "courses_dept": "*" } })).len(), 5);
    // an empty pattern only matches an empty value
    assert_eq!(run(&facade, json!({ "IS": { "courses_instructor": "" } })), vec!["5"]);
}

#[test]
fn wildcards_inside_a_pattern_are_rejected() {
    let facade = setup();
    for pattern in ["ma*th", "***", "*a*b*"] {
        let query = json!({
            "WHERE": { "IS": { "courses_dept": pattern } },
            "OPTIONS": { "COLUMNS": ["courses_dept"] }
        });
        let err = facade.perform_query(&query).expect_err("pattern should be invalid");
        assert!(matches!(err, insightdb::InsightError::Validation(_)), "pattern {pattern}: {err}");
    }
}

#[test]
fn logical_combinations() {
    let facade = setup();
    let and = run(
        &facade,
        json!({ "AND": [ { "IS": { "courses_dept": "cpsc" } }, { "GT": { "courses_avg": 75 } } ] }),
    );
    assert_eq!(and, vec!["1", "2"]);
    let or = run(
        &facade,
        json!({ "OR": [ { "IS": { "courses_dept": "math" } }, { "EQ": { "courses_year": 2016 } } ] }),
    );
    assert_eq!(or, vec!["2", "4"]);
    let not = run(&facade, json!({ "NOT": { "IS": { "courses_dept": "cpsc" } } }));
    assert_eq!(not, vec!["4", "5"]);
    let double_not = run(&facade, json!({ "NOT": { "NOT": { "IS": { "courses_dept": "cpsc" } } } }));
    assert_eq!(double_not, vec!["1", "2", "3"]);
}

#[test]
fn and_is_a_subset_of_each_child() {
    let facade = setup();
    let left = json!({ "IS": { "courses_instructor": "smith*" } });
    let right = json!({ "LT": { "courses_year": 2016 } });
    let both = run(&facade, json!({ "AND": [left.clone(), right.clone()] }));
    let only_left = run(&facade, left);
    let only_right = run(&facade, right);
    assert_eq!(both, vec!["1", "3"]);
    assert!(both.iter().all(|u| only_left.contains(u) && only_right.contains(u)));
}

#[test]
fn single_child_and_or_behave_like_the_child() {
    let facade = setup();
    let child = json!({ "GT": { "courses_avg": 85 } });
    let plain = run(&facade, child.clone());
    assert_eq!(run(&facade, json!({ "AND": [child.clone()] })), plain);
    assert_eq!(run(&facade, json!({ "OR": [child] })), plain);
}
