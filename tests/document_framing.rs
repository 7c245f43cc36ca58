//! End-to-end document framing across all three dialects (§4.2).

use eventwire::{BinaryWire, Dictionary, JsonWire, Key, TextWire, Value, Wire};

fn round_trip_one_event(mut wire: impl Wire, key: &str, value: Value) -> Value {
    wire.acquire_writing_document(false, false).unwrap();
    wire.write_event_name(key).unwrap();
    wire.write_value(&value).unwrap();
    wire.commit_document().unwrap();

    assert!(wire.has_next_document().unwrap());
    wire.begin_reading_document().unwrap();
    assert_eq!(wire.read_event_key().unwrap(), Some(Key::Name(key.to_owned())));
    let out = wire.read_value().unwrap();
    wire.end_reading_document().unwrap();
    assert!(!wire.has_next_document().unwrap());
    out
}

#[test]
fn a_typed_mapping_round_trips_through_every_dialect() {
    let mut dict = Dictionary::new();
    dict.insert("electric", Value::Bool(true));
    dict.insert("cylinders", Value::from(6i64));
    let value = Value::Typed("Engine".to_owned(), Box::new(dict));

    assert_eq!(
        round_trip_one_event(TextWire::new(), "engine", value.clone()),
        value
    );
    assert_eq!(
        round_trip_one_event(JsonWire::new(), "engine", value.clone()),
        value
    );
    assert_eq!(round_trip_one_event(BinaryWire::new(), "engine", value.clone()), value);
}

#[test]
fn rollback_leaves_no_document_behind_on_any_dialect() {
    let dialects: Vec<Box<dyn Wire>> = vec![
        Box::new(TextWire::new()),
        Box::new(JsonWire::new()),
        Box::new(BinaryWire::new()),
    ];
    for mut wire in dialects {
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("abandoned").unwrap();
        wire.write_value(&Value::Null).unwrap();
        wire.rollback_document();
        assert!(!wire.has_next_document().unwrap());
    }
}

#[test]
fn chained_calls_share_one_document_then_commit_once() {
    let mut wire = JsonWire::new();
    wire.acquire_writing_document(false, true).unwrap();
    wire.write_event_name("a").unwrap();
    wire.write_value(&Value::from(1i64)).unwrap();

    // A nested call reuses the already-open document (chained = true).
    wire.acquire_writing_document(false, true).unwrap();
    wire.write_event_name("b").unwrap();
    wire.write_value(&Value::from(2i64)).unwrap();

    wire.commit_document().unwrap();

    wire.begin_reading_document().unwrap();
    let mut names = Vec::new();
    while let Some(key) = wire.read_event_key().unwrap() {
        names.push(key.to_string());
        wire.read_value().unwrap();
    }
    assert_eq!(names, vec!["a", "b"]);
    assert!(!wire.has_next_document().unwrap());
}

#[test]
fn multiple_documents_are_read_back_in_order() {
    let mut wire = TextWire::new();
    for i in 0..3i64 {
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("n").unwrap();
        wire.write_value(&Value::from(i)).unwrap();
        wire.commit_document().unwrap();
    }

    let mut seen = Vec::new();
    while wire.has_next_document().unwrap() {
        wire.begin_reading_document().unwrap();
        wire.read_event_key().unwrap();
        seen.push(wire.read_value().unwrap());
        wire.end_reading_document().unwrap();
    }
    assert_eq!(seen, vec![Value::from(0i64), Value::from(1i64), Value::from(2i64)]);
}
