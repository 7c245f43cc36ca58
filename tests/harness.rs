//! The YAML fixture harness exercised end-to-end (§4.7, §6.6): a real
//! temp-directory corpus, read through `WireParser`, replayed into a fresh
//! `TextWire`, and checked back against `out.yaml`.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use eventwire::{Agitation, Corpus, Value, Wire, WireParser};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn scratch_dir(name: &str) -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("eventwire-harness-it-{}-{}", name, id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Drains `corpus`'s combined setup+input wire through a parser that mirrors
/// every event straight back out onto a fresh `TextWire`, the way a real
/// component under test reads events in and writes its own events out.
fn echo_through(corpus: &Corpus) -> String {
    let mut input = corpus.input_wire().unwrap();
    let mut output = eventwire::TextWire::new();

    while input.has_next_document().unwrap() {
        input.begin_reading_document().unwrap();

        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::<(String, Value)>::new()));
        let sink = events.clone();
        let mut parser = WireParser::new();
        parser.set_default_handler(Box::new(move |name, value| {
            sink.lock().unwrap().push((name.to_owned(), value.clone()));
            Ok(())
        }));
        parser.accept(&mut input).unwrap();
        input.end_reading_document().unwrap();

        output.acquire_writing_document(false, false).unwrap();
        for (name, value) in events.lock().unwrap().drain(..) {
            output.write_event_name(&name).unwrap();
            output.write_value(&value).unwrap();
        }
        output.commit_document().unwrap();
    }

    String::from_utf8(output.into_bytes().into_vec()).unwrap()
}

#[test]
fn a_corpus_round_trips_through_a_parser_and_passes_check() {
    let dir = scratch_dir("round-trip");
    fs::write(dir.join("in.yaml"), "--- !!data\ngreeting: hello\n...\n").unwrap();
    fs::write(dir.join("out.yaml"), "--- !!data\ngreeting: hello\n...\n").unwrap();

    let corpus = Corpus::open(&dir).unwrap();
    let actual = echo_through(&corpus);
    corpus.check(&actual).unwrap();

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn a_corpus_with_setup_concatenates_setup_before_input() {
    let dir = scratch_dir("with-setup");
    fs::write(dir.join("_setup.yaml"), "--- !!data\nprimed: true\n...\n").unwrap();
    fs::write(dir.join("in.yaml"), "--- !!data\nbark: woof\n...\n").unwrap();
    fs::write(
        dir.join("out.yaml"),
        "--- !!data\nprimed: true\n...\n--- !!data\nbark: woof\n...\n",
    )
    .unwrap();

    let corpus = Corpus::open(&dir).unwrap();
    let actual = echo_through(&corpus);
    corpus.check(&actual).unwrap();

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn a_mismatched_output_fails_check_with_a_line_level_diff() {
    let dir = scratch_dir("mismatch");
    fs::write(dir.join("in.yaml"), "--- !!data\nx: 1\n...\n").unwrap();
    fs::write(dir.join("out.yaml"), "--- !!data\nx: 2\n...\n").unwrap();

    let corpus = Corpus::open(&dir).unwrap();
    let actual = echo_through(&corpus);
    let err = corpus.check(&actual).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("x: 1"));
    assert!(message.contains("x: 2"));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn an_omit_field_agitation_drives_a_second_expectation() {
    let dir = scratch_dir("agitated");
    fs::write(
        dir.join("in.yaml"),
        "--- !!data\na: 1\nb: 2\n...\n",
    )
    .unwrap();
    fs::write(
        dir.join("out-omit-b.yaml"),
        "--- !!data\na: 1\n...\n",
    )
    .unwrap();

    let corpus = Corpus::open(&dir).unwrap();
    let agitations = [Agitation::omit_field("b")];
    let cases = corpus.agitated_cases(&agitations).unwrap();
    assert_eq!(cases.len(), 1);

    let case = &cases[0];
    assert_eq!(case.name, "omit-b");
    let mut wire = eventwire::TextWire::from_bytes(case_bytes(case));
    let mut output = eventwire::TextWire::new();
    wire.has_next_document().unwrap();
    wire.begin_reading_document().unwrap();
    output.acquire_writing_document(false, false).unwrap();
    while let Some(key) = wire.read_event_key().unwrap() {
        let value = wire.read_value().unwrap();
        output.write_event_name(&key.to_string()).unwrap();
        output.write_value(&value).unwrap();
    }
    output.commit_document().unwrap();

    let actual = String::from_utf8(output.into_bytes().into_vec()).unwrap();
    corpus.check_variant(&case.name, &actual).unwrap();

    fs::remove_dir_all(&dir).ok();
}

fn case_bytes(case: &eventwire::AgitatedCase) -> eventwire::BytesMut {
    eventwire::BytesMut::from_vec(case.wire.bytes().as_slice().to_vec())
}

#[test]
fn discover_corpora_finds_every_fixture_under_a_tree() {
    let root = scratch_dir("discover-tree");
    for case in ["alpha", "beta"] {
        let nested = root.join(case);
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("in.yaml"), "--- !!data\nx: 1\n...\n").unwrap();
    }

    let found = eventwire::harness::discover_corpora(&root).unwrap();
    assert_eq!(found.len(), 2);

    fs::remove_dir_all(&root).ok();
}

#[test]
fn a_deterministic_clock_stamps_reproducible_history() {
    let clock = eventwire::harness::deterministic_clock();
    let first = clock.now_nanos();
    let second = clock.now_nanos();
    assert_eq!(first, 0);
    assert_eq!(second, 1_000);
}
