//! End to end runs of the fixture sets under `tests/fixtures`

use chrono::{TimeDelta, Utc};
use qset_core::config::ExecutionSettings;
use qset_core::template::ResolveKind;
use qset_core::{
    Document, Engine, ExecError, MemorySetStore, MemoryStore, Query, Set, SetStore,
    SetStoreError, Value, VariableError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn engine() -> Engine<MemorySetStore, MemoryStore> {
    let sets = MemorySetStore::new(32);
    sets.load_dir(fixtures().join("sets")).unwrap();

    let store = MemoryStore::new();
    store.load_dir(fixtures().join("data")).unwrap();

    Engine::new(sets, store)
}

fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn strings(docs: &[Document], field: &str) -> Vec<String> {
    docs.iter()
        .map(|d| d.get(field).and_then(Value::as_str).unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_fixture_sets_load() {
    let engine = engine();
    assert_eq!(
        engine.sets().get_set_names().unwrap(),
        vec!["retired", "reversed", "station_conditions", "windy"]
    );
    assert_eq!(
        engine.store().collection_names(),
        vec!["conditions", "stations"]
    );
}

#[test]
fn test_station_conditions_defaults() {
    let engine = engine();
    let results = engine.run("station_conditions", &HashMap::new()).unwrap();

    assert_eq!(results.len(), 3);

    let list = &results["list"];
    assert_eq!(strings(list, "station_id"), vec!["42001", "42002"]);
    assert_eq!(strings(list, "name"), vec!["Mid Gulf", "West Gulf"]);
    assert!(list.iter().all(|d| !d.contains_key("_id") && !d.contains_key("depth")));

    let conditions = &results["conditions"];
    assert_eq!(strings(conditions, "station_id"), vec!["42001", "42002"]);

    let first = &results["first"];
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].get("observations").and_then(Value::as_i64), Some(2));
}

#[test]
fn test_station_conditions_with_args() {
    let engine = engine();

    let results = engine
        .run("station_conditions", &args(&[("region", "pacific")]))
        .unwrap();
    assert_eq!(strings(&results["list"], "station_id"), vec!["46026"]);
    assert_eq!(strings(&results["conditions"], "station_id"), vec!["46026"]);

    let results = engine
        .run("station_conditions", &args(&[("since", "2024-02-01")]))
        .unwrap();
    assert_eq!(
        strings(&results["conditions"], "station_id"),
        vec!["42001", "42001", "42002"]
    );

    let results = engine
        .run("station_conditions", &args(&[("since", "2024-03-01T12:30:00.000Z")]))
        .unwrap();
    assert!(results["conditions"].is_empty());
}

#[test]
fn test_region_without_stations() {
    let engine = engine();
    let err = engine
        .run("station_conditions", &args(&[("region", "arctic")]))
        .unwrap_err();

    // The wildcard over no stations matches nothing, the indexed lookup fails
    match err {
        ExecError::Substitution { stage, source } => {
            assert_eq!(stage, "first");
            assert!(matches!(
                source,
                VariableError::IndexOutOfRange { index: 0, len: 0, .. }
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_stage_order_matters() {
    let engine = engine();
    let err = engine.run("reversed", &HashMap::new()).unwrap_err();

    assert_eq!(err.stage(), Some("conditions"));
    assert!(matches!(
        err,
        ExecError::Substitution { source: VariableError::UnknownStage(ref s), .. } if s == "list"
    ));
    assert_eq!(engine.store().executions(), 0);
}

#[test]
fn test_disabled_set_never_reaches_store() {
    let engine = engine();
    let err = engine.run("retired", &HashMap::new()).unwrap_err();

    assert!(matches!(err, ExecError::SetDisabled(ref name) if name == "retired"));
    assert_eq!(engine.store().executions(), 0);
}

#[test]
fn test_unknown_set() {
    let engine = engine();
    assert!(matches!(
        engine.run("missing", &HashMap::new()),
        Err(ExecError::SetStore(SetStoreError::NotFound(_)))
    ));
}

#[test]
fn test_field_variables() {
    let engine = engine();

    let results = engine.run("windy", &HashMap::new()).unwrap();
    let speeds: Vec<_> = results["windy"]
        .iter()
        .filter_map(|d| d.get("wind_speed").and_then(Value::as_i64))
        .collect();
    assert_eq!(speeds, vec![20, 12]);

    let results = engine.run("windy", &args(&[("min", "15")])).unwrap();
    assert_eq!(strings(&results["windy"], "station_id"), vec!["46026"]);

    let results = engine.run("windy", &args(&[("field", "gust")])).unwrap();
    assert!(results["windy"].is_empty());
}

#[test]
fn test_bad_number_argument() {
    let engine = engine();
    let err = engine.run("windy", &args(&[("min", "ten")])).unwrap_err();

    match err {
        ExecError::Substitution { stage, source } => {
            assert_eq!(stage, "windy");
            assert_eq!(
                source,
                VariableError::Resolution {
                    kind: ResolveKind::Number,
                    value: "ten".to_string()
                }
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_runs_are_repeatable() {
    let engine = engine();
    let before = engine.sets().get_set_by_name("station_conditions").unwrap();

    let first = engine.run("station_conditions", &HashMap::new()).unwrap();
    let second = engine.run("station_conditions", &HashMap::new()).unwrap();
    assert_eq!(first, second);

    let after = engine.sets().get_set_by_name("station_conditions").unwrap();
    assert_eq!(*before, *after);
    assert_eq!(
        after.queries[1].commands[0]
            .get_by_path("$match.station_id.$in")
            .and_then(Value::as_str),
        Some("#data.*:list.station_id")
    );
}

#[test]
fn test_relative_time() {
    let store = MemoryStore::new();
    let now = Utc::now();
    store.insert_many(
        "events",
        vec![
            Document::new().with("name", "recent").with("at", now - TimeDelta::hours(1)),
            Document::new().with("name", "old").with("at", now - TimeDelta::hours(48)),
            Document::new().with("name", "future").with("at", now + TimeDelta::hours(3)),
        ],
    );

    let set = Set::new("recent").param("window", "-24h").query(
        Query::pipeline("events", "events").returning().command(
            Document::new().with(
                "$match",
                Document::new().with(
                    "at",
                    Document::new()
                        .with("$gte", "#time:window")
                        .with("$lt", "#time:1h"),
                ),
            ),
        ),
    );

    let sets = Arc::new(MemorySetStore::new(8));
    sets.upsert(set).unwrap();
    let engine = Engine::new(Arc::clone(&sets), store);

    let results = engine.run("recent", &HashMap::new()).unwrap();
    assert_eq!(strings(&results["events"], "name"), vec!["recent"]);

    let results = engine.run("recent", &args(&[("window", "-72h")])).unwrap();
    assert_eq!(strings(&results["events"], "name"), vec!["recent", "old"]);
}

#[test]
fn test_literal_arguments() {
    let store = MemoryStore::new();
    store.insert_many(
        "items",
        (0..5).map(|i| Document::new().with("n", i as i64)),
    );

    // Arguments that are not bound params are used as written
    let set = Set::new("literal").query(
        Query::pipeline("items", "items")
            .returning()
            .command(Document::new().with(
                "$match",
                Document::new().with("n", Document::new().with("$gte", "#number:2")),
            ))
            .command(Document::new().with("$limit", "#number:2")),
    );

    let sets = MemorySetStore::new(8);
    sets.upsert(set).unwrap();
    let engine = Engine::with_settings(sets, store, &ExecutionSettings::default());

    let results = engine.run("literal", &HashMap::new()).unwrap();
    let ns: Vec<_> = results["items"]
        .iter()
        .filter_map(|d| d.get("n").and_then(Value::as_i64))
        .collect();
    assert_eq!(ns, vec![2, 3]);
}

#[test]
fn test_regex_operator_with_variable() {
    let engine = engine();
    let set = Set::from_json(
        r##"{
            "name": "by_prefix",
            "enabled": true,
            "params": [{"name": "prefix", "default": "^Mid"}],
            "queries": [{
                "name": "stations",
                "type": "pipeline",
                "collection": "stations",
                "return": true,
                "commands": [{"$match": {"name": {"$regex": "#string:prefix"}}}]
            }]
        }"##,
    )
    .unwrap();
    engine.sets().upsert(set).unwrap();

    let results = engine.run("by_prefix", &HashMap::new()).unwrap();
    assert_eq!(strings(&results["stations"], "name"), vec!["Mid Gulf"]);

    let results = engine.run("by_prefix", &args(&[("prefix", "Gulf$")])).unwrap();
    assert_eq!(
        strings(&results["stations"], "name"),
        vec!["Mid Gulf", "West Gulf"]
    );
}
