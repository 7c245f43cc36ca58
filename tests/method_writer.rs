//! End-to-end method-call dispatch: writer → wire → parser (§4.5–4.6).

use std::sync::{Arc, Mutex};

use eventwire::{
    Bytes, Dictionary, JsonWire, MethodDescriptor, MethodWriter, MethodWriterConfig, ReturnKind,
    Value, Wire, WireParser,
};

fn reader_over(wire: &JsonWire) -> JsonWire {
    let mut bytes = wire.bytes().clone();
    bytes.set_read_position(0);
    JsonWire::from_bytes(bytes)
}

#[test]
fn a_written_call_dispatches_to_its_registered_handler() {
    let wire = Arc::new(Mutex::new(JsonWire::new()));
    let writer = MethodWriter::new(
        wire.clone(),
        vec![MethodDescriptor {
            name: "trade",
            event_id: None,
            return_kind: ReturnKind::Void,
        }],
        MethodWriterConfig::default(),
        "writer-under-test",
    )
    .unwrap();

    let mut dict = Dictionary::new();
    dict.insert("symbol", Value::Text("AAPL".to_owned()));
    dict.insert("quantity", Value::from(100i64));
    writer.call("trade", &[Value::Mapping(dict)]).unwrap();

    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let mut parser = WireParser::new();
    let sink = received.clone();
    parser.register(
        "trade",
        Box::new(move |value: &Value| {
            sink.lock().unwrap().push(value.clone());
            Ok(())
        }),
    );

    let w = wire.lock().unwrap();
    let mut reader = reader_over(&w);
    drop(w);
    reader.has_next_document().unwrap();
    reader.begin_reading_document().unwrap();
    parser.accept(&mut reader).unwrap();

    let events = received.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].as_mapping().unwrap().get("symbol").unwrap().as_text(),
        Some("AAPL")
    );
}

#[test]
fn unbound_events_fall_through_to_the_default_handler() {
    let wire = Arc::new(Mutex::new(JsonWire::new()));
    let writer = MethodWriter::new(
        wire.clone(),
        vec![MethodDescriptor {
            name: "heartbeat",
            event_id: None,
            return_kind: ReturnKind::Void,
        }],
        MethodWriterConfig::default(),
        "writer-under-test",
    )
    .unwrap();
    writer.call("heartbeat", &[]).unwrap();

    let default_hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let mut parser = WireParser::new();
    let sink = default_hits.clone();
    parser.set_default_handler(Box::new(move |name: &str, _value: &Value| {
        sink.lock().unwrap().push(name.to_owned());
        Ok(())
    }));

    let w = wire.lock().unwrap();
    let mut reader = reader_over(&w);
    drop(w);
    reader.has_next_document().unwrap();
    reader.begin_reading_document().unwrap();
    parser.accept(&mut reader).unwrap();

    assert_eq!(*default_hits.lock().unwrap(), vec!["heartbeat".to_owned()]);
}

#[test]
fn document_context_call_is_not_visible_until_the_caller_commits_it() {
    let wire = Arc::new(Mutex::new(JsonWire::new()));
    let writer = MethodWriter::new(
        wire.clone(),
        vec![MethodDescriptor {
            name: "writingDocument",
            event_id: None,
            return_kind: ReturnKind::DocumentContext,
        }],
        MethodWriterConfig::default(),
        "writer-under-test",
    )
    .unwrap();

    let handle = writer
        .call_document_context("writingDocument", &[Value::from(1i64)])
        .unwrap();
    assert!(wire.lock().unwrap().bytes().as_slice().is_empty());
    handle.write_event_name("note").unwrap();
    handle
        .write_value(&Value::Text("logged separately".to_owned()))
        .unwrap();
    handle.commit().unwrap();

    let w = wire.lock().unwrap();
    assert!(!w.bytes().as_slice().is_empty());
}

#[test]
fn an_interceptor_veto_leaves_the_wire_untouched() {
    let wire = Arc::new(Mutex::new(JsonWire::new()));
    let mut writer = MethodWriter::new(
        wire.clone(),
        vec![MethodDescriptor {
            name: "cancel",
            event_id: None,
            return_kind: ReturnKind::Void,
        }],
        MethodWriterConfig::default(),
        "writer-under-test",
    )
    .unwrap();
    writer.set_update_interceptor(Box::new(|_name, _arg| false));

    let outcome = writer.call("cancel", &[Value::from(1i64)]).unwrap();
    assert_eq!(outcome, eventwire::CallOutcome::Vetoed);
    assert!(wire.lock().unwrap().bytes().as_slice().is_empty());
}
