//! # eventwire
//!
//! A polymorphic wire codec and method-event dispatch toolkit for
//! low-latency messaging.
//!
//! A document tree ([`Value`]) is read and written across three physical
//! encodings — a YAML-like text dialect ([`TextWire`]), canonical JSON
//! ([`JsonWire`]), and a compact self-describing binary form
//! ([`BinaryWire`]) — through one shared [`Wire`] trait. On top of that,
//! [`MethodWriter`] turns ordinary typed method calls into framed events,
//! and [`WireParser`] is its dual: it reads events back off a wire and
//! dispatches them to registered handlers. [`Marshallable`] bridges plain
//! Rust structs and the value tree without runtime reflection.
//!
//! ## Example
//!
//! ```
//! use eventwire::{JsonWire, Value, Wire};
//!
//! let mut wire = JsonWire::new();
//! wire.acquire_writing_document(false, false).unwrap();
//! wire.write_event_name("greeting").unwrap();
//! wire.write_value(&Value::Text("hello".to_owned())).unwrap();
//! wire.commit_document().unwrap();
//! ```

pub mod alias;
pub mod bytes;
pub mod config;
pub mod date;
pub mod dictionary;
pub mod document;
pub mod error;
pub mod event;
pub mod harness;
pub mod marshal;
pub mod method;
#[cfg(feature = "serde")]
pub mod serde;
pub mod value;
pub mod wire;

pub use alias::AliasRegistry;
pub use bytes::{Bytes, BytesMut};
pub use config::HarnessConfig;
pub use date::{Clock, SettableClock, SystemClock};
pub use dictionary::{Dictionary, Key};
pub use document::{DocumentWriter, Framer};
pub use error::{Error, ErrorKind, Result};
pub use event::{DefaultHandler, Handler, WireParser};
pub use harness::{AgitatedCase, Agitation, Corpus};
pub use marshal::{Annotation, Base36Conversion, Field, LongConversion, Marshallable};
pub use method::{
    CallOutcome, DocumentHandle, MessageHistory, MethodDescriptor, MethodWriter,
    MethodWriterConfig, ReturnKind, UpdateInterceptor,
};
pub use value::{Integer, TimeConversion, Timestamp, Value, Width};
pub use wire::{BinaryWire, DocumentInfo, JsonWire, TextWire, Wire};

/// Base64-encodes `bytes` for embedding in the text and JSON dialects,
/// where a blob has no native binary representation (§4.1).
pub(crate) fn base64_encode(bytes: &[u8]) -> String {
    base64::encode(bytes)
}

/// The inverse of [`base64_encode`].
pub(crate) fn base64_decode(text: &str) -> Result<Vec<u8>> {
    base64::decode(text).map_err(|e| Error::protocol_violation(format!("invalid base64 blob: {}", e)))
}
