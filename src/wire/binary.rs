//! The compact binary dialect (§4.1 "Binary dialect", §6.4).
//!
//! Tag byte layout (an implementer's choice is explicitly allowed by
//! §4.1 so long as unknown values can be skipped and mapping/sequence
//! stay self-delimited):
//!
//! | range/tag | meaning |
//! |---|---|
//! | `0x00..=0x7F` | small non-negative integer, value == tag |
//! | `0xA0..=0xBD` | short UTF-8 string, `len = tag - 0xA0` (<31) |
//! | `0xBD` | long UTF-8 string: varint len, then bytes |
//! | `0xB0` / `0xB2` | mapping start / end |
//! | `0xB1` / `0xB3` | sequence start / end |
//! | `0xB8..=0xBB` | fixed-width signed integer, width = `1 << (tag - 0xB8)` |
//! | `0xC0` / `0xC1` | 4-byte / 8-byte float |
//! | `0xBA` | event-id map entry: signed varint id, then value |
//! | `0xBC` | field-name map entry: length-prefixed name, then value |
//! | `0xC8` | blob: varint len, then bytes |
//! | `0xC9` | timestamp: 1 conversion-unit byte, then 8-byte signed int |
//! | `0xE0` | typed-object start: length-prefixed alias, then entries, `0xB2` |
//! | `0xF0` / `0xF1` / `0xF2` | null / true / false |

use crate::alias::AliasRegistry;
use crate::bytes::{Bytes, BytesMut};
use crate::dictionary::{Dictionary, Key};
use crate::document::{BinaryFramer, Framer};
use crate::error::{Error, Result};
use crate::value::{Integer, TimeConversion, Timestamp, Value, Width};
use crate::wire::{DocumentInfo, Wire};

// Tag space 0x00..=0x7F is small non-negative integers; the remaining
// control tags live at 0x80 and up with no overlap between ranges, unlike
// the spec's own illustrative numbering (which the spec explicitly leaves
// to the implementer to make consistent, §4.1).
const TAG_SHORT_STR_BASE: u8 = 0x80; // + len, len < 31 (0x80..=0x9E)
const TAG_LONG_STR: u8 = 0x9F;
const TAG_MAP_START: u8 = 0xA0;
const TAG_MAP_END: u8 = 0xA1;
const TAG_SEQ_START: u8 = 0xA2;
const TAG_SEQ_END: u8 = 0xA3;
const TAG_INT_BASE: u8 = 0xA4; // + width index 0..3 (0xA4..=0xA7)
const TAG_FLOAT32: u8 = 0xA8;
const TAG_FLOAT64: u8 = 0xA9;
const TAG_EVENT_ID: u8 = 0xAA;
const TAG_FIELD_NAME: u8 = 0xAB;
const TAG_BLOB: u8 = 0xAC;
const TAG_TIMESTAMP: u8 = 0xAD;
const TAG_TYPED_START: u8 = 0xAE;
const TAG_NULL: u8 = 0xAF;
const TAG_TRUE: u8 = 0xB0;
const TAG_FALSE: u8 = 0xB1;
const TAG_PAD: u8 = 0xB2;

fn width_index(w: Width) -> u8 {
    match w {
        Width::I8 => 0,
        Width::I16 => 1,
        Width::I32 => 2,
        Width::I64 => 3,
    }
}

fn width_from_index(i: u8) -> Result<Width> {
    match i {
        0 => Ok(Width::I8),
        1 => Ok(Width::I16),
        2 => Ok(Width::I32),
        3 => Ok(Width::I64),
        _ => Err(Error::protocol_violation("unknown integer width tag")),
    }
}

fn conversion_from_tag(tag: u8) -> Result<TimeConversion> {
    match tag {
        0 => Ok(TimeConversion::Seconds),
        1 => Ok(TimeConversion::Millis),
        2 => Ok(TimeConversion::Micros),
        3 => Ok(TimeConversion::Nanos),
        _ => Err(Error::protocol_violation("unknown time conversion tag")),
    }
}

fn conversion_tag(c: TimeConversion) -> u8 {
    match c {
        TimeConversion::Seconds => 0,
        TimeConversion::Millis => 1,
        TimeConversion::Micros => 2,
        TimeConversion::Nanos => 3,
    }
}

/// The compact binary wire. Integers and floats round-trip at their
/// declared width exactly (§4.1 invariant); raw-text is reinterpreted as
/// a plain string, since the binary dialect has no separate "already
/// encoded" representation to preserve.
pub struct BinaryWire {
    bytes: BytesMut,
    framer: BinaryFramer,
    registry: AliasRegistry,
    padding: bool,
    verbose_types: bool,
    open_header: Option<u64>,
    open_meta: bool,
    chain_depth: u32,
    read_end: Option<u64>,
}

impl BinaryWire {
    pub fn new() -> BinaryWire {
        BinaryWire {
            bytes: BytesMut::new(),
            framer: BinaryFramer,
            registry: AliasRegistry::new(),
            padding: false,
            verbose_types: false,
            open_header: None,
            open_meta: false,
            chain_depth: 0,
            read_end: None,
        }
    }

    pub fn from_bytes(bytes: BytesMut) -> BinaryWire {
        let mut wire = BinaryWire::new();
        wire.bytes = bytes;
        wire
    }

    pub fn bytes(&self) -> &BytesMut {
        &self.bytes
    }

    pub fn into_bytes(self) -> BytesMut {
        self.bytes
    }

    fn write_len_prefixed(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() < 31 {
            self.bytes.write_all(&[TAG_SHORT_STR_BASE + bytes.len() as u8])?;
        } else {
            self.bytes.write_all(&[TAG_LONG_STR])?;
            self.bytes.write_unsigned_varint(bytes.len() as u64)?;
        }
        self.bytes.write_all(bytes)
    }

    fn read_len_prefixed_string(&mut self, tag: u8) -> Result<String> {
        let len = if tag == TAG_LONG_STR {
            self.bytes.read_unsigned_varint()? as usize
        } else {
            (tag - TAG_SHORT_STR_BASE) as usize
        };
        self.bytes.read_utf8(len)
    }

    fn write_value_inner(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.bytes.write_all(&[TAG_NULL]),
            Value::Bool(true) => self.bytes.write_all(&[TAG_TRUE]),
            Value::Bool(false) => self.bytes.write_all(&[TAG_FALSE]),
            Value::Int(i) => self.write_integer(*i),
            Value::Float32(f) => {
                self.bytes.write_all(&[TAG_FLOAT32])?;
                self.bytes.write_all(&f.to_le_bytes())
            }
            Value::Float64(f) => {
                self.bytes.write_all(&[TAG_FLOAT64])?;
                self.bytes.write_all(&f.to_le_bytes())
            }
            Value::Text(s) | Value::RawText(s) => self.write_len_prefixed(s),
            Value::Blob(b) => {
                self.bytes.write_all(&[TAG_BLOB])?;
                self.bytes.write_unsigned_varint(b.len() as u64)?;
                self.bytes.write_all(b)
            }
            Value::Timestamp(ts) => {
                self.bytes.write_all(&[TAG_TIMESTAMP, conversion_tag(ts.conversion)])?;
                self.bytes.write_all(&ts.since_epoch.to_le_bytes())
            }
            Value::Sequence(items) => {
                self.bytes.write_all(&[TAG_SEQ_START])?;
                for item in items {
                    self.write_value_inner(item)?;
                }
                self.bytes.write_all(&[TAG_SEQ_END])
            }
            Value::Mapping(dict) => self.write_dictionary(dict, None),
            Value::Typed(alias, dict) => self.write_dictionary(dict, Some(alias)),
        }
    }

    fn write_integer(&mut self, i: Integer) -> Result<()> {
        if i.width() == Width::I8 && (0..=0x7F).contains(&i.value()) {
            return self.bytes.write_all(&[i.value() as u8]);
        }
        self.bytes.write_all(&[TAG_INT_BASE + width_index(i.width())])?;
        match i.width() {
            Width::I8 => self.bytes.write_all(&(i.value() as i8).to_le_bytes()),
            Width::I16 => self.bytes.write_all(&(i.value() as i16).to_le_bytes()),
            Width::I32 => self.bytes.write_all(&(i.value() as i32).to_le_bytes()),
            Width::I64 => self.bytes.write_all(&i.value().to_le_bytes()),
        }
    }

    fn write_dictionary(&mut self, dict: &Dictionary, typed: Option<&str>) -> Result<()> {
        if let Some(alias) = typed {
            self.bytes.write_all(&[TAG_TYPED_START])?;
            self.write_len_prefixed(alias)?;
        } else {
            self.bytes.write_all(&[TAG_MAP_START])?;
        }
        for (key, value) in dict {
            match key {
                Key::Name(name) => {
                    self.bytes.write_all(&[TAG_FIELD_NAME])?;
                    self.write_len_prefixed(name)?;
                }
                Key::Id(id) => {
                    self.bytes.write_all(&[TAG_EVENT_ID])?;
                    self.bytes.write_unsigned_varint(zigzag_encode(*id))?;
                }
            }
            self.write_value_inner(value)?;
        }
        self.bytes.write_all(&[TAG_MAP_END])
    }

    fn read_value_inner(&mut self) -> Result<Value> {
        let tag = self.bytes.read_u8()?;
        self.read_value_from_tag(tag)
    }

    fn read_value_from_tag(&mut self, tag: u8) -> Result<Value> {
        match tag {
            0x00..=0x7F => Ok(Value::Int(Integer::new(tag as i64))),
            TAG_NULL => Ok(Value::Null),
            TAG_TRUE => Ok(Value::Bool(true)),
            TAG_FALSE => Ok(Value::Bool(false)),
            TAG_FLOAT32 => {
                let mut buf = [0u8; 4];
                self.bytes.read_exact(&mut buf)?;
                Ok(Value::Float32(f32::from_le_bytes(buf)))
            }
            TAG_FLOAT64 => {
                let mut buf = [0u8; 8];
                self.bytes.read_exact(&mut buf)?;
                Ok(Value::Float64(f64::from_le_bytes(buf)))
            }
            TAG_BLOB => {
                let len = self.bytes.read_unsigned_varint()? as usize;
                let mut buf = vec![0u8; len];
                self.bytes.read_exact(&mut buf)?;
                Ok(Value::Blob(buf))
            }
            TAG_TIMESTAMP => {
                let conv = conversion_from_tag(self.bytes.read_u8()?)?;
                let mut buf = [0u8; 8];
                self.bytes.read_exact(&mut buf)?;
                Ok(Value::Timestamp(Timestamp::new(i64::from_le_bytes(buf), conv)))
            }
            TAG_SEQ_START => {
                let mut items = Vec::new();
                loop {
                    let next = self.bytes.read_u8()?;
                    if next == TAG_SEQ_END {
                        break;
                    }
                    items.push(self.read_value_from_tag(next)?);
                }
                Ok(Value::Sequence(items))
            }
            TAG_MAP_START => Ok(Value::Mapping(self.read_entries()?)),
            TAG_TYPED_START => {
                let name_tag = self.bytes.read_u8()?;
                let alias = self.read_len_prefixed_string(name_tag)?;
                Ok(Value::Typed(alias, Box::new(self.read_entries()?)))
            }
            t if (TAG_INT_BASE..TAG_INT_BASE + 4).contains(&t) => {
                let width = width_from_index(t - TAG_INT_BASE)?;
                let value = match width {
                    Width::I8 => {
                        let mut b = [0u8; 1];
                        self.bytes.read_exact(&mut b)?;
                        i8::from_le_bytes(b) as i64
                    }
                    Width::I16 => {
                        let mut b = [0u8; 2];
                        self.bytes.read_exact(&mut b)?;
                        i16::from_le_bytes(b) as i64
                    }
                    Width::I32 => {
                        let mut b = [0u8; 4];
                        self.bytes.read_exact(&mut b)?;
                        i32::from_le_bytes(b) as i64
                    }
                    Width::I64 => {
                        let mut b = [0u8; 8];
                        self.bytes.read_exact(&mut b)?;
                        i64::from_le_bytes(b)
                    }
                };
                Ok(Value::Int(Integer::with_width(value, width)))
            }
            t if (TAG_SHORT_STR_BASE..TAG_SHORT_STR_BASE + 31).contains(&t) || t == TAG_LONG_STR => {
                Ok(Value::Text(self.read_len_prefixed_string(t)?))
            }
            TAG_PAD => self.read_value_inner(),
            other => Err(Error::protocol_violation(format!(
                "unknown binary tag 0x{:02x}",
                other
            ))),
        }
    }

    fn read_entries(&mut self) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let tag = self.bytes.read_u8()?;
            if tag == TAG_MAP_END {
                break;
            }
            let key = match tag {
                TAG_FIELD_NAME => {
                    let name_tag = self.bytes.read_u8()?;
                    Key::Name(self.read_len_prefixed_string(name_tag)?)
                }
                TAG_EVENT_ID => Key::Id(zigzag_decode(self.bytes.read_unsigned_varint()?)),
                other => {
                    return Err(Error::protocol_violation(format!(
                        "expected a map entry tag, found 0x{:02x}",
                        other
                    )))
                }
            };
            let value = self.read_value_inner()?;
            dict.insert(key, value);
        }
        Ok(dict)
    }
}

fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

impl Default for BinaryWire {
    fn default() -> Self {
        BinaryWire::new()
    }
}

impl Wire for BinaryWire {
    fn reset(&mut self) {
        self.bytes = BytesMut::new();
        self.open_header = None;
        self.chain_depth = 0;
        self.read_end = None;
    }

    fn is_binary(&self) -> bool {
        true
    }

    fn set_use_padding(&mut self, on: bool) {
        self.padding = on;
    }

    fn set_verbose_types(&mut self, on: bool) {
        self.verbose_types = on;
    }

    fn class_lookup(&self) -> &AliasRegistry {
        &self.registry
    }

    fn set_class_lookup(&mut self, registry: AliasRegistry) {
        self.registry = registry;
    }

    fn acquire_writing_document(&mut self, meta: bool, chained: bool) -> Result<u32> {
        if chained && self.chain_depth > 0 {
            // Reusing an already-open document: depth stays pinned at its
            // current value. `MethodWriter` tracks chain ownership itself
            // and only the call that is NOT chained-return ever commits, so
            // there is never more than one commit to unwind per document.
            return Ok(self.chain_depth);
        }
        let pos = self.framer.begin(&mut self.bytes, meta)?;
        self.open_header = Some(pos);
        self.open_meta = meta;
        self.chain_depth = 1;
        Ok(1)
    }

    fn commit_document(&mut self) -> Result<()> {
        if self.chain_depth == 0 {
            return Err(Error::protocol_violation("no open document to commit"));
        }
        self.chain_depth -= 1;
        if self.chain_depth > 0 {
            return Ok(());
        }
        let header_pos = self.open_header.take().expect("open_header set with chain_depth");
        if self.padding {
            while (self.bytes.write_position() - header_pos - 4) % 4 != 0 {
                self.bytes.write_all(&[TAG_PAD])?;
            }
        }
        self.framer.commit(&mut self.bytes, header_pos, self.open_meta, true)
    }

    fn rollback_document(&mut self) {
        if let Some(header_pos) = self.open_header.take() {
            self.framer.rollback(&mut self.bytes, header_pos);
        }
        self.chain_depth = 0;
    }

    fn write_event_name(&mut self, name: &str) -> Result<()> {
        self.bytes.write_all(&[TAG_FIELD_NAME])?;
        self.write_len_prefixed(name)
    }

    fn write_event_id(&mut self, id: i64) -> Result<()> {
        self.bytes.write_all(&[TAG_EVENT_ID])?;
        self.bytes.write_unsigned_varint(zigzag_encode(id))
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        self.write_value_inner(value)
    }

    fn write_document_value(&mut self, value: &Value) -> Result<()> {
        // The binary tag stream has no separate "keyed entry" wrapper —
        // a value tag is a value tag whether or not a field-name/event-id
        // tag preceded it, so a bare top-level write is just a value
        // write with no key tag in front of it.
        self.write_value_inner(value)
    }

    fn has_next_document(&mut self) -> Result<bool> {
        Ok(self.bytes.peek_unsigned_byte().is_some())
    }

    fn begin_reading_document(&mut self) -> Result<DocumentInfo> {
        let start = self.bytes.read_position();
        let header = self
            .framer
            .read_header(&mut self.bytes)?
            .ok_or_else(|| Error::protocol_violation("no document present"))?;
        if !header.ready {
            return Err(Error::protocol_violation("document is not ready"));
        }
        self.read_end = Some(self.bytes.read_position() + header.body_len);
        Ok(DocumentInfo {
            is_meta_data: header.meta,
            index: start,
        })
    }

    fn read_event_key(&mut self) -> Result<Option<Key>> {
        if self.at_document_end() {
            return Ok(None);
        }
        let tag = self.bytes.read_u8()?;
        match tag {
            TAG_FIELD_NAME => {
                let name_tag = self.bytes.read_u8()?;
                Ok(Some(Key::Name(self.read_len_prefixed_string(name_tag)?)))
            }
            TAG_EVENT_ID => Ok(Some(Key::Id(zigzag_decode(self.bytes.read_unsigned_varint()?)))),
            TAG_PAD => self.read_event_key(),
            other => Err(Error::protocol_violation(format!(
                "expected a field-name or event-id tag, found 0x{:02x}",
                other
            ))),
        }
    }

    fn read_value(&mut self) -> Result<Value> {
        self.read_value_inner()
    }

    fn read_document_value(&mut self) -> Result<Value> {
        self.read_value_inner()
    }

    fn end_reading_document(&mut self) -> Result<()> {
        if let Some(end) = self.read_end.take() {
            if self.bytes.read_position() < end {
                self.bytes.set_read_position(end);
            }
        }
        Ok(())
    }

    fn at_document_end(&self) -> bool {
        match self.read_end {
            Some(end) => self.bytes.read_position() >= end,
            None => self.bytes.peek_unsigned_byte().is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) -> Value {
        let mut wire = BinaryWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("x").unwrap();
        wire.write_value(&value).unwrap();
        wire.commit_document().unwrap();

        wire.bytes.set_read_position(0);
        assert!(wire.has_next_document().unwrap());
        wire.begin_reading_document().unwrap();
        let key = wire.read_event_key().unwrap().unwrap();
        assert_eq!(key, Key::Name("x".into()));
        let out = wire.read_value().unwrap();
        wire.end_reading_document().unwrap();
        out
    }

    #[test]
    fn round_trips_small_int() {
        assert_eq!(roundtrip(Value::Int(Integer::new(17))), Value::Int(Integer::new(17)));
    }

    #[test]
    fn round_trips_negative_int_preserving_width() {
        let i = Integer::with_width(-5, Width::I32);
        assert_eq!(roundtrip(Value::Int(i)), Value::Int(i));
    }

    #[test]
    fn round_trips_text_float_blob() {
        assert_eq!(roundtrip(Value::Text("bark".into())), Value::Text("bark".into()));
        assert_eq!(roundtrip(Value::Float64(3.14)), Value::Float64(3.14));
        assert_eq!(roundtrip(Value::Blob(vec![1, 2, 3])), Value::Blob(vec![1, 2, 3]));
    }

    #[test]
    fn round_trips_raw_text_as_plain_text() {
        assert_eq!(roundtrip(Value::RawText("x: 1".into())), Value::Text("x: 1".into()));
    }

    #[test]
    fn round_trips_nested_mapping_and_sequence() {
        let mut dict = Dictionary::new();
        dict.insert("a", Value::Int(Integer::new(1)));
        dict.insert("b", Value::Sequence(vec![Value::Bool(true), Value::Null]));
        assert_eq!(roundtrip(Value::Mapping(dict.clone())), Value::Mapping(dict));
    }

    #[test]
    fn round_trips_typed_object() {
        let mut dict = Dictionary::new();
        dict.insert("electric", Value::Bool(true));
        let value = Value::Typed("Engine".into(), Box::new(dict));
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn event_id_key_round_trips() {
        let mut wire = BinaryWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_id(42).unwrap();
        wire.write_value(&Value::Bool(true)).unwrap();
        wire.commit_document().unwrap();

        wire.bytes.set_read_position(0);
        wire.begin_reading_document().unwrap();
        assert_eq!(wire.read_event_key().unwrap(), Some(Key::Id(42)));
    }

    #[test]
    fn bare_document_value_round_trips_with_no_event_key() {
        let mut wire = BinaryWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_document_value(&Value::Int(Integer::new(17))).unwrap();
        wire.commit_document().unwrap();

        wire.bytes.set_read_position(0);
        wire.begin_reading_document().unwrap();
        assert_eq!(wire.read_document_value().unwrap(), Value::Int(Integer::new(17)));
    }

    #[test]
    fn not_ready_document_is_invisible_until_committed() {
        let mut wire = BinaryWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("pending").unwrap();
        wire.write_value(&Value::Null).unwrap();
        // Never commit: rollback should leave nothing for a reader.
        wire.rollback_document();
        wire.bytes.set_read_position(0);
        assert!(!wire.has_next_document().unwrap());
    }
}
