//! Collection Tests
//!
//! Row preparation, lifecycle events, lookup and nesting inside records.

use std::sync::{Arc, Mutex};

use familiar_models::{
    fields, Collection, CollectionType, Description, Model, ModelError, ModelType, Value,
};
use serde_json::json;

fn task_type() -> ModelType {
    ModelType::builder("Task")
        .data(|| {
            fields([
                ("id", Description::tag("number").primary()),
                ("title", Description::tag("string").required()),
                ("priority", Description::tag("number").default(0)),
            ])
        })
        .build()
}

fn record_events(collection: &Collection) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for event in ["add", "remove"] {
        let sink = Arc::clone(&log);
        collection.on(event, move |e| {
            sink.lock()
                .unwrap()
                .push(format!("{} {} @{}", event, e.model.get("title"), e.index));
        });
    }
    log
}

// =============================================================================
// Lifecycle Events
// =============================================================================

#[test]
fn test_push_emits_one_add_per_element() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(&tasks, Vec::<Value>::new()).unwrap();
    let log = record_events(&list);

    let a = Model::new(tasks.model_type(), json!({"id": 1, "title": "a"})).unwrap();
    let len = list
        .push([Value::from(&a), Value::from(json!({"id": 2, "title": "b"}))])
        .unwrap();

    assert_eq!(len, 2);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["add \"a\" @0".to_string(), "add \"b\" @1".to_string()]
    );

    let removed = list.remove(&a).unwrap();
    assert!(removed.ptr_eq(&a));
    assert_eq!(list.len(), 1);
    assert_eq!(log.lock().unwrap().last().unwrap(), "remove \"a\" @0");
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[test]
fn test_length_is_updated_before_events() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(&tasks, [json!({"id": 1, "title": "a"})]).unwrap();
    let lengths = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lengths);
    list.on("add", move |e| sink.lock().unwrap().push(e.collection.len()));

    list.push([json!({"id": 2, "title": "b"}), json!({"id": 3, "title": "c"})])
        .unwrap();
    assert_eq!(*lengths.lock().unwrap(), vec![3, 3]);
}

#[test]
fn test_failed_push_adds_nothing() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(&tasks, [json!({"id": 1, "title": "a"})]).unwrap();
    let log = record_events(&list);

    let err = list
        .push([json!({"id": 2, "title": "b"}), json!({"id": 3})])
        .unwrap_err();
    assert!(matches!(err, ModelError::Required { .. }));
    assert_eq!(list.len(), 1);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_reset_and_fill_report_every_element() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(
        &tasks,
        [json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})],
    )
    .unwrap();
    let log = record_events(&list);

    list.fill(json!({"id": 9, "title": "z"}), 1, None).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["remove \"b\" @1".to_string(), "add \"z\" @1".to_string()]
    );

    log.lock().unwrap().clear();
    list.reset([json!({"id": 5, "title": "e"})]).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "remove \"a\" @0".to_string(),
            "remove \"z\" @1".to_string(),
            "add \"e\" @0".to_string(),
        ]
    );
    assert_eq!(list.len(), 1);
}

#[test]
fn test_reinserted_rows_keep_their_parent() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(
        &tasks,
        [json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})],
    )
    .unwrap();
    let first = list.at(0).unwrap();
    let second = list.at(1).unwrap();

    list.reset(list.models()).unwrap();
    assert!(list.includes(&first));
    assert!(first.in_collection());
    assert!(second.in_collection());

    list.set_at(0, &first).unwrap();
    assert!(first.in_collection());

    list.splice(0, 2, [Value::from(&second)]).unwrap();
    assert!(second.in_collection());
    assert!(!first.in_collection());
    assert!(first.parent_ref().is_none());

    list.push([Value::from(&first)]).unwrap();
    list.fill(&first, 0, None).unwrap();
    assert!(first.in_collection());
    assert!(second.parent_ref().is_none());
}

#[test]
fn test_pop_shift_unshift() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(&tasks, [json!({"id": 1, "title": "a"})]).unwrap();
    list.unshift([json!({"id": 0, "title": "first"})]).unwrap();

    assert_eq!(list.shift().unwrap().get("title"), Value::from("first"));
    assert_eq!(list.pop().unwrap().get("title"), Value::from("a"));
    assert!(list.pop().is_none());
    assert!(list.is_empty());
}

// =============================================================================
// Lookup and Queries
// =============================================================================

#[test]
fn test_get_by_primary_key() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = tasks
        .create([json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})])
        .unwrap();

    assert_eq!(list.get(2).unwrap().get("title"), Value::from("b"));
    assert_eq!(list.get("1").unwrap().get("title"), Value::from("a"));
    assert!(list.get(3).is_none());
}

#[test]
fn test_id_lookup_without_primary_key() {
    let note = ModelType::builder("Note")
        .data(|| fields([("text", "string")]))
        .build();
    let notes = CollectionType::new("Notes", &note);
    let list = Collection::new(&notes, [json!({"text": "x"})]).unwrap();

    assert!(list.get("x").is_none());
    assert!(list.remove("x").is_none());
    assert_eq!(list.len(), 1);
}

#[test]
fn test_queries() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(
        &tasks,
        [
            json!({"id": 1, "title": "a", "priority": 3}),
            json!({"id": 2, "title": "b", "priority": 1}),
            json!({"id": 3, "title": "c", "priority": 2}),
        ],
    )
    .unwrap();

    let total = list.reduce(0.0, |sum, task| sum + task.get("priority").as_f64().unwrap_or(0.0));
    assert_eq!(total, 6.0);
    assert_eq!(list.filter(|task| task.get("priority") != Value::from(1)).len(), 2);
    assert_eq!(list.find_index(|task| task.get("title") == Value::from("c")), Some(2));
    assert!(list.every(|task| task.has_value("title")));
    assert!(!list.some(|task| task.get("priority") == Value::from(9)));

    let last = list.at(-1).unwrap();
    assert!(list.includes(&last));
    assert_eq!(list.index_of(&last), Some(2));

    list.sort_by_keys(&["priority"]);
    let titles: Vec<Value> = list.map(|task, _| task.get("title"));
    assert_eq!(titles, vec![Value::from("b"), Value::from("c"), Value::from("a")]);

    list.reverse();
    assert_eq!(list.at(0).unwrap().get("title"), Value::from("a"));

    list.sort_by(|a, b| b.get("id").as_f64().partial_cmp(&a.get("id").as_f64()).unwrap());
    assert_eq!(list.at(0).unwrap().get("id"), Value::from(3));
}

#[test]
fn test_concat_leaves_original_untouched() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let list = Collection::new(&tasks, [json!({"id": 1, "title": "a"})]).unwrap();
    let more = list.concat([json!({"id": 2, "title": "b"})]).unwrap();

    assert_eq!(list.len(), 1);
    assert_eq!(more.len(), 2);
    assert!(more.at(0).unwrap().ptr_eq(&list.at(0).unwrap()));
    assert!(matches!(
        list.at(0).unwrap().parent_ref(),
        Some(familiar_models::Parent::Collection(owner)) if owner.ptr_eq(&list)
    ));
}

#[test]
fn test_rejects_foreign_rows() {
    let tasks = CollectionType::new("Tasks", &task_type());
    let other = ModelType::builder("Other")
        .data(|| fields([("title", "string")]))
        .build();
    let stranger = Model::new(&other, json!({"title": "x"})).unwrap();
    let list = Collection::new(&tasks, Vec::<Value>::new()).unwrap();

    let err = list.push([Value::from(stranger)]).unwrap_err();
    assert!(matches!(
        err,
        ModelError::InvalidCollectionElement { ref collection, .. } if collection == "Tasks"
    ));
    assert!(list.set_at(0, "text").is_err());
}

// =============================================================================
// Nesting
// =============================================================================

#[test]
fn test_collection_field_in_record() {
    let task = task_type();
    let tasks = CollectionType::new("Tasks", &task);
    let tasks_ref = tasks.clone();
    let project = ModelType::builder("Project")
        .data(move || {
            fields([
                ("name", Description::tag("string")),
                ("tasks", Description::collection(&tasks_ref)),
            ])
        })
        .build();

    let record = Model::new(
        &project,
        json!({"name": "p", "tasks": [{"id": 1, "title": "a"}, {"id": 2, "title": "b"}]}),
    )
    .unwrap();

    let list = record.get("tasks").as_collection().cloned().unwrap();
    assert_eq!(list.len(), 2);
    assert!(list.parent().unwrap().ptr_eq(&record));

    let first = list.at(0).unwrap();
    assert!(first.in_collection());
    assert!(first.parent().unwrap().ptr_eq(&record));
    assert!(first.find_parent_instance(&project).unwrap().ptr_eq(&record));
    assert_eq!(record.filter_children(|m| m.model_type().is_a(&task)).len(), 2);

    assert_eq!(
        record.to_json().unwrap(),
        json!({
            "name": "p",
            "tasks": [
                {"id": 1, "title": "a", "priority": 0},
                {"id": 2, "title": "b", "priority": 0}
            ]
        })
    );

    let copy = record.deep_clone().unwrap();
    let copied = copy.get("tasks").as_collection().cloned().unwrap();
    assert!(!copied.ptr_eq(&list));
    assert!(copied.parent().unwrap().ptr_eq(&copy));
    assert!(record.equal(&copy).unwrap());

    copied.at(0).unwrap().set_key("title", "changed").unwrap();
    assert_eq!(list.at(0).unwrap().get("title"), Value::from("a"));
    assert!(!record.equal(&copy).unwrap());
}
