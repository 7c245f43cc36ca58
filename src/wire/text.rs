//! The human-readable text-YAML dialect (§4.1 "Text-YAML dialect", §6.2).
//!
//! Mapping entries are `key: value` lines, nested two spaces per level.
//! Sequences are written in flow form `[a, b, c]` unless an element is
//! itself a mapping, in which case the sequence switches to block form
//! (`- key: value`, continuation keys aligned under the first). Strings
//! are unquoted when they look like a bare identifier and double-quoted
//! otherwise. A typed mapping is tagged `!Alias { ... }`.
//!
//! The scanner (line splitting, indent tracking, comment stripping) is
//! grounded in the teacher's `stream::ascii_reader::Scanner` peek/advance
//! style, adapted from a single flat token stream to an indent-aware line
//! stream since this dialect's structure is whitespace-significant.

use crate::alias::AliasRegistry;
use crate::bytes::{Bytes, BytesMut};
use crate::dictionary::{Dictionary, Key};
use crate::document::{Framer, TextFramer};
use crate::error::{Error, Result};
use crate::value::{Integer, TimeConversion, Timestamp, Value, Width};
use crate::wire::{is_identifier_like, quote_text, unquote_text, DocumentInfo, Wire};

pub struct TextWire {
    bytes: BytesMut,
    framer: TextFramer,
    registry: AliasRegistry,
    verbose_types: bool,
    open_header: Option<u64>,
    open_meta: bool,
    chain_depth: u32,
    current_entries: Option<Vec<(Key, Value)>>,
    current_bare: Option<Value>,
    pending_key: Option<Key>,
    read_doc: Option<ReadDoc>,
}

struct ReadDoc {
    entries: std::vec::IntoIter<(Key, Value)>,
    current_value: Option<Value>,
    remaining: usize,
    bare_value: Option<Value>,
}

impl TextWire {
    pub fn new() -> TextWire {
        TextWire {
            bytes: BytesMut::new(),
            framer: TextFramer::new(),
            registry: AliasRegistry::new(),
            verbose_types: false,
            open_header: None,
            open_meta: false,
            chain_depth: 0,
            current_entries: None,
            current_bare: None,
            pending_key: None,
            read_doc: None,
        }
    }

    pub fn from_bytes(bytes: BytesMut) -> TextWire {
        let mut wire = TextWire::new();
        wire.bytes = bytes;
        wire
    }

    pub fn bytes(&self) -> &BytesMut {
        &self.bytes
    }

    pub fn into_bytes(self) -> BytesMut {
        self.bytes
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.bytes.as_slice())
    }
}

impl Default for TextWire {
    fn default() -> Self {
        TextWire::new()
    }
}

// ---------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------

fn render_entries(entries: &[(Key, Value)]) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        render_entry(&mut out, 0, &key.to_string(), value);
    }
    out
}

fn render_entry(out: &mut String, indent: usize, key: &str, value: &Value) {
    push_indent(out, indent);
    out.push_str(&render_scalar_key(key));
    out.push(':');
    match value {
        Value::Mapping(dict) if !dict.is_empty() => {
            out.push('\n');
            render_mapping_block(out, indent + 2, dict, None);
        }
        Value::Typed(alias, dict) if !dict.is_empty() => {
            out.push(' ');
            out.push('!');
            out.push_str(alias);
            out.push('\n');
            render_mapping_block(out, indent + 2, dict, None);
        }
        Value::Sequence(items) if needs_block_sequence(items) => {
            out.push('\n');
            render_block_sequence(out, indent, items);
        }
        other => {
            out.push(' ');
            out.push_str(&render_inline(other));
            out.push('\n');
        }
    }
}

fn render_mapping_block(out: &mut String, indent: usize, dict: &Dictionary, _unused: Option<()>) {
    if dict.is_empty() {
        // An empty nested mapping still needs a line; represent it as an
        // explicit empty flow mapping so the block isn't silently dropped.
        push_indent(out, indent);
        out.push_str("{}\n");
        return;
    }
    for (key, value) in dict {
        render_entry(out, indent, &key.to_string(), value);
    }
}

fn needs_block_sequence(items: &[Value]) -> bool {
    items.iter().any(|v| matches!(v, Value::Mapping(d) if !d.is_empty()) || matches!(v, Value::Typed(_, d) if !d.is_empty()))
}

fn render_block_sequence(out: &mut String, indent: usize, items: &[Value]) {
    for item in items {
        push_indent(out, indent);
        out.push_str("- ");
        match item {
            Value::Mapping(dict) if !dict.is_empty() => {
                let mut first = true;
                for (key, value) in dict {
                    if first {
                        out.push_str(&render_scalar_key(&key.to_string()));
                        out.push(':');
                        render_entry_value_same_line_or_block(out, indent + 2, value);
                        first = false;
                    } else {
                        render_entry(out, indent + 2, &key.to_string(), value);
                    }
                }
            }
            other => {
                out.push_str(&render_inline(other));
                out.push('\n');
            }
        }
    }
}

fn render_entry_value_same_line_or_block(out: &mut String, indent: usize, value: &Value) {
    match value {
        Value::Mapping(dict) if !dict.is_empty() => {
            out.push('\n');
            render_mapping_block(out, indent + 2, dict, None);
        }
        Value::Sequence(items) if needs_block_sequence(items) => {
            out.push('\n');
            render_block_sequence(out, indent, items);
        }
        other => {
            out.push(' ');
            out.push_str(&render_inline(other));
            out.push('\n');
        }
    }
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push(' ');
    }
}

fn render_scalar_key(key: &str) -> String {
    if is_identifier_like(key) {
        key.to_owned()
    } else {
        quote_text(key)
    }
}

/// Renders a value that fits entirely on the remainder of its line: a
/// scalar, a flow sequence, or a flow mapping/typed-object.
fn render_inline(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.value().to_string(),
        Value::Float32(f) => render_float(*f as f64),
        Value::Float64(f) => render_float(*f),
        Value::Text(s) => {
            if is_identifier_like(s) {
                s.clone()
            } else {
                quote_text(s)
            }
        }
        Value::RawText(s) => s.clone(),
        Value::Blob(b) => quote_text(&crate::base64_encode(b)),
        Value::Timestamp(ts) => quote_text(&render_timestamp(ts)),
        Value::Sequence(items) => {
            let parts: Vec<String> = items.iter().map(render_inline).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Mapping(dict) => render_flow_mapping(dict, None),
        Value::Typed(alias, dict) => render_flow_mapping(dict, Some(alias)),
    }
}

fn render_flow_mapping(dict: &Dictionary, typed: Option<&str>) -> String {
    let body = dict
        .iter()
        .map(|(k, v)| format!("{}: {}", render_scalar_key(&k.to_string()), render_inline(v)))
        .collect::<Vec<_>>()
        .join(", ");
    match typed {
        Some(alias) => format!("!{} {{ {} }}", alias, body),
        None => format!("{{ {} }}", body),
    }
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        ".nan".to_owned()
    } else if f.is_infinite() {
        if f > 0.0 { ".inf".to_owned() } else { "-.inf".to_owned() }
    } else if f == f.trunc() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn render_timestamp(ts: &Timestamp) -> String {
    let unit = match ts.conversion {
        TimeConversion::Seconds => "s",
        TimeConversion::Millis => "ms",
        TimeConversion::Micros => "us",
        TimeConversion::Nanos => "ns",
    };
    format!("{}{}", ts.since_epoch, unit)
}

// ---------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Line {
    indent: usize,
    text: String,
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == '#' {
            return &line[..i];
        }
    }
    line
}

fn tokenize(body: &str) -> Vec<Line> {
    body.lines()
        .filter_map(|raw| {
            let stripped = strip_comment(raw);
            let trimmed_end = stripped.trim_end();
            if trimmed_end.trim().is_empty() {
                return None;
            }
            let indent = trimmed_end.len() - trimmed_end.trim_start().len();
            Some(Line {
                indent,
                text: trimmed_end.trim_start().to_owned(),
            })
        })
        .collect()
}

fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == needle {
            return Some(i);
        }
    }
    None
}

fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(text[start..i].trim().to_owned());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail.to_owned());
    }
    parts
}

fn parse_scalar(token: &str) -> Result<Value> {
    let token = token.trim();
    if token.is_empty() || token == "null" || token == "~" {
        return Ok(Value::Null);
    }
    if token == "true" {
        return Ok(Value::Bool(true));
    }
    if token == "false" {
        return Ok(Value::Bool(false));
    }
    if token.starts_with('"') && token.ends_with('"') && token.len() >= 2 {
        return Ok(Value::Text(unquote_text(&token[1..token.len() - 1])?));
    }
    if let Ok(i) = token.parse::<i64>() {
        return Ok(Value::Int(Integer::with_width(i, Width::smallest_for(i))));
    }
    if let Ok(f) = token.parse::<f64>() {
        if token.contains('.') || token.contains('e') || token.contains('E') {
            return Ok(Value::Float64(f));
        }
    }
    Ok(Value::Text(token.to_owned()))
}

fn parse_inline_value(token: &str) -> Result<Value> {
    let token = token.trim();
    if let Some(rest) = token.strip_prefix('!') {
        let (alias, body) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim()),
            None => (rest, ""),
        };
        let dict = if body.is_empty() {
            Dictionary::new()
        } else {
            parse_flow_mapping(body)?
        };
        return Ok(Value::Typed(alias.to_owned(), Box::new(dict)));
    }
    if token.starts_with('[') && token.ends_with(']') {
        let inner = &token[1..token.len() - 1];
        let mut items = Vec::new();
        for part in split_top_level(inner, ',') {
            if part.is_empty() {
                continue;
            }
            items.push(parse_inline_value(&part)?);
        }
        return Ok(Value::Sequence(items));
    }
    if token.starts_with('{') && token.ends_with('}') {
        return Ok(Value::Mapping(parse_flow_mapping(&token[1..token.len() - 1])?));
    }
    parse_scalar(token)
}

fn parse_flow_mapping(body: &str) -> Result<Dictionary> {
    let mut dict = Dictionary::new();
    for part in split_top_level(body, ',') {
        if part.is_empty() {
            continue;
        }
        let colon = find_unquoted(&part, ':')
            .ok_or_else(|| Error::protocol_violation(format!("expected `key: value`, found {:?}", part)))?;
        let key = parse_key(part[..colon].trim())?;
        let value = parse_inline_value(part[colon + 1..].trim())?;
        dict.insert(key, value);
    }
    Ok(dict)
}

fn parse_key(token: &str) -> Result<Key> {
    let token = token.trim();
    if token.starts_with('"') && token.ends_with('"') && token.len() >= 2 {
        return Ok(Key::Name(unquote_text(&token[1..token.len() - 1])?));
    }
    if let Ok(id) = token.parse::<i64>() {
        return Ok(Key::Id(id));
    }
    Ok(Key::Name(token.to_owned()))
}

/// Splits a `key: rest` line at the first unquoted `:` followed by a
/// space or end of line (so `http://` inside a quoted string isn't
/// mistaken for a mapping separator).
fn split_key_line(text: &str) -> Option<(&str, &str)> {
    if let Some(rest) = text.strip_prefix("- ") {
        let _ = rest;
    }
    let colon = find_unquoted(text, ':')?;
    let after = &text[colon + 1..];
    if !after.is_empty() && !after.starts_with(' ') {
        return None;
    }
    Some((&text[..colon], after.trim_start()))
}

fn parse_block(lines: &[Line], pos: &mut usize, indent: usize) -> Result<Value> {
    if *pos < lines.len() && lines[pos].indent == indent && (lines[*pos].text == "-" || lines[*pos].text.starts_with("- ")) {
        Ok(Value::Sequence(parse_sequence(lines, pos, indent)?))
    } else {
        Ok(Value::Mapping(parse_mapping(lines, pos, indent)?))
    }
}

/// Parses everything after a mapping entry's `:` — empty (nested block or
/// null), a bare `!Alias` tag whose body is a nested block on the
/// following deeper-indented lines, a flow `!Alias { ... }` tag, or a
/// plain inline scalar/flow value.
fn parse_value_after_colon(rest: &str, lines: &[Line], pos: &mut usize, base_indent: usize) -> Result<Value> {
    if rest.is_empty() {
        return if *pos < lines.len() && lines[*pos].indent > base_indent {
            let child_indent = lines[*pos].indent;
            parse_block(lines, pos, child_indent)
        } else {
            Ok(Value::Null)
        };
    }
    if let Some(alias) = rest.strip_prefix('!') {
        if is_identifier_like(alias) {
            return if *pos < lines.len() && lines[*pos].indent > base_indent {
                let child_indent = lines[*pos].indent;
                let dict = parse_mapping(lines, pos, child_indent)?;
                Ok(Value::Typed(alias.to_owned(), Box::new(dict)))
            } else {
                Ok(Value::Typed(alias.to_owned(), Box::new(Dictionary::new())))
            };
        }
    }
    parse_inline_value(rest)
}

fn parse_mapping(lines: &[Line], pos: &mut usize, indent: usize) -> Result<Dictionary> {
    let mut dict = Dictionary::new();
    while *pos < lines.len() && lines[*pos].indent == indent {
        let line = lines[*pos].clone();
        if line.text.starts_with("- ") || line.text == "-" {
            break;
        }
        let (key_str, rest) = split_key_line(&line.text).ok_or_else(|| {
            Error::protocol_violation(format!("expected a mapping entry, found {:?}", line.text))
        })?;
        *pos += 1;
        let key = parse_key(key_str)?;
        let value = parse_value_after_colon(rest, lines, pos, indent)?;
        dict.insert(key, value);
    }
    Ok(dict)
}

fn parse_sequence(lines: &[Line], pos: &mut usize, indent: usize) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    while *pos < lines.len() && lines[*pos].indent == indent && (lines[*pos].text == "-" || lines[*pos].text.starts_with("- ")) {
        let dash_indent = lines[*pos].indent;
        let rest = if lines[*pos].text == "-" {
            String::new()
        } else {
            lines[*pos].text[2..].to_owned()
        };
        *pos += 1;
        if rest.is_empty() {
            if *pos < lines.len() && lines[*pos].indent > dash_indent {
                let child_indent = lines[*pos].indent;
                items.push(parse_block(lines, pos, child_indent)?);
            } else {
                items.push(Value::Null);
            }
            continue;
        }
        if let Some((key_str, val_str)) = split_key_line(&rest) {
            let mut dict = Dictionary::new();
            let key = parse_key(key_str)?;
            let item_indent = dash_indent + 2;
            let value = parse_value_after_colon(val_str, lines, pos, dash_indent)?;
            dict.insert(key, value);
            while *pos < lines.len() && lines[*pos].indent == item_indent {
                let line = lines[*pos].clone();
                let (k, v) = split_key_line(&line.text).ok_or_else(|| {
                    Error::protocol_violation("expected a continuation mapping entry")
                })?;
                *pos += 1;
                let key = parse_key(k)?;
                let value = parse_value_after_colon(v, lines, pos, item_indent)?;
                dict.insert(key, value);
            }
            items.push(Value::Mapping(dict));
        } else {
            items.push(parse_inline_value(&rest)?);
        }
    }
    Ok(items)
}

fn parse_entries(body: &str) -> Result<Vec<(Key, Value)>> {
    let lines = tokenize(body);
    let mut pos = 0usize;
    let mut entries = Vec::new();
    while pos < lines.len() {
        let indent = lines[pos].indent;
        let line = lines[pos].clone();
        let (key_str, rest) = split_key_line(&line.text).ok_or_else(|| {
            Error::protocol_violation(format!("expected a top-level event entry, found {:?}", line.text))
        })?;
        pos += 1;
        let key = parse_key(key_str)?;
        let value = parse_value_after_colon(rest, &lines, &mut pos, indent)?;
        entries.push((key, value));
    }
    Ok(entries)
}

impl Wire for TextWire {
    fn reset(&mut self) {
        self.bytes = BytesMut::new();
        self.open_header = None;
        self.chain_depth = 0;
        self.current_entries = None;
        self.current_bare = None;
        self.pending_key = None;
        self.read_doc = None;
    }

    fn set_use_padding(&mut self, _on: bool) {
        // The text dialect's lines are never byte-aligned; accepted as a
        // no-op for uniformity with the other dialects.
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
            // current value; see the matching note in `wire::binary`.
            return Ok(self.chain_depth);
        }
        let pos = self.framer.begin(&mut self.bytes, meta)?;
        self.open_header = Some(pos);
        self.open_meta = meta;
        self.chain_depth = 1;
        self.current_entries = Some(Vec::new());
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
        let text = if let Some(bare) = self.current_bare.take() {
            let mut s = render_inline(&bare);
            s.push('\n');
            s
        } else {
            let entries = self.current_entries.take().unwrap_or_default();
            render_entries(&entries)
        };
        self.bytes.write_all(text.as_bytes())?;
        self.framer.commit(&mut self.bytes, header_pos, self.open_meta, true)
    }

    fn rollback_document(&mut self) {
        if let Some(header_pos) = self.open_header.take() {
            self.framer.rollback(&mut self.bytes, header_pos);
        }
        self.chain_depth = 0;
        self.current_entries = None;
        self.current_bare = None;
    }

    fn write_event_name(&mut self, name: &str) -> Result<()> {
        self.pending_key = Some(Key::Name(name.to_owned()));
        Ok(())
    }

    fn write_event_id(&mut self, id: i64) -> Result<()> {
        self.pending_key = Some(Key::Name(id.to_string()));
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| Error::protocol_violation("write_value with no pending event key"))?;
        self.current_entries.get_or_insert_with(Vec::new).push((key, value.clone()));
        Ok(())
    }

    fn write_document_value(&mut self, value: &Value) -> Result<()> {
        if self.pending_key.is_some() {
            return Err(Error::protocol_violation(
                "cannot write a bare document value with a pending event key",
            ));
        }
        self.current_bare = Some(value.clone());
        Ok(())
    }

    fn read_document_value(&mut self) -> Result<Value> {
        let doc = self
            .read_doc
            .as_mut()
            .ok_or_else(|| Error::protocol_violation("no document open for reading"))?;
        let value = doc
            .bare_value
            .take()
            .ok_or_else(|| Error::protocol_violation("read_document_value with no bare value"))?;
        doc.remaining = 0;
        Ok(value)
    }

    fn has_next_document(&mut self) -> Result<bool> {
        let saved = self.bytes.read_position();
        let result = self.framer.read_header(&mut self.bytes);
        self.bytes.set_read_position(saved);
        match result {
            Ok(Some(header)) => Ok(header.ready),
            Ok(None) => Ok(false),
            Err(_) => Ok(false),
        }
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
        let end = self.bytes.read_position();
        let body_end = end.saturating_sub(4); // trailing "...\n"
        let body_start = body_end.saturating_sub(header.body_len);
        let raw = &self.bytes.as_slice()[body_start as usize..body_end as usize];
        let text = std::str::from_utf8(raw).map_err(|_| Error::new(crate::error::ErrorKind::InvalidUtf8))?;
        let lines = tokenize(text);
        let (entries, bare_value, remaining) =
            if lines.len() == 1 && find_unquoted(&lines[0].text, ':').is_none() {
                // A single line with no top-level `key: value` colon at
                // all is a bare scalar document body (§3 "value tree"),
                // not an event record.
                (Vec::new(), Some(parse_inline_value(&lines[0].text)?), 1)
            } else {
                let entries = parse_entries(text)?;
                let remaining = entries.len();
                (entries, None, remaining)
            };
        self.read_doc = Some(ReadDoc {
            entries: entries.into_iter(),
            current_value: None,
            remaining,
            bare_value,
        });
        Ok(DocumentInfo {
            is_meta_data: header.meta,
            index: start,
        })
    }

    fn read_event_key(&mut self) -> Result<Option<Key>> {
        let doc = self
            .read_doc
            .as_mut()
            .ok_or_else(|| Error::protocol_violation("no document open for reading"))?;
        match doc.entries.next() {
            Some((key, value)) => {
                doc.current_value = Some(value);
                doc.remaining -= 1;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    fn read_value(&mut self) -> Result<Value> {
        let doc = self
            .read_doc
            .as_mut()
            .ok_or_else(|| Error::protocol_violation("no document open for reading"))?;
        doc.current_value
            .take()
            .ok_or_else(|| Error::protocol_violation("read_value with no pending entry"))
    }

    fn end_reading_document(&mut self) -> Result<()> {
        self.read_doc = None;
        Ok(())
    }

    fn at_document_end(&self) -> bool {
        match &self.read_doc {
            Some(doc) => doc.remaining == 0,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) -> Value {
        let mut wire = TextWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("x").unwrap();
        wire.write_value(&value).unwrap();
        wire.commit_document().unwrap();

        wire.bytes.set_read_position(0);
        assert!(wire.has_next_document().unwrap());
        wire.begin_reading_document().unwrap();
        wire.read_event_key().unwrap();
        let out = wire.read_value().unwrap();
        wire.end_reading_document().unwrap();
        out
    }

    #[test]
    fn round_trips_scalars() {
        assert_eq!(roundtrip(Value::Int(Integer::new(17))), Value::Int(Integer::new(17)));
        assert_eq!(roundtrip(Value::Text("bark".into())), Value::Text("bark".into()));
        assert_eq!(roundtrip(Value::Float64(3.14)), Value::Float64(3.14));
        assert_eq!(roundtrip(Value::Bool(true)), Value::Bool(true));
        assert_eq!(roundtrip(Value::Null), Value::Null);
    }

    #[test]
    fn round_trips_quoted_string_with_special_chars() {
        let v = Value::Text("has space and \"quotes\"".into());
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn round_trips_flow_sequence() {
        let v = Value::Sequence(vec![Value::Int(Integer::new(1)), Value::Int(Integer::new(2))]);
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn round_trips_nested_mapping() {
        let mut inner = Dictionary::new();
        inner.insert("electric", Value::Bool(true));
        let mut outer = Dictionary::new();
        outer.insert("engine", Value::Mapping(inner));
        let v = Value::Mapping(outer);
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn round_trips_typed_object() {
        let mut dict = Dictionary::new();
        dict.insert("electric", Value::Bool(true));
        let v = Value::Typed("Engine".into(), Box::new(dict));
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn round_trips_block_sequence_of_mappings() {
        let mut a = Dictionary::new();
        a.insert("name", Value::Text("alice".into()));
        a.insert("age", Value::Int(Integer::new(30)));
        let mut b = Dictionary::new();
        b.insert("name", Value::Text("bob".into()));
        b.insert("age", Value::Int(Integer::new(40)));
        let v = Value::Sequence(vec![Value::Mapping(a), Value::Mapping(b)]);
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn not_ready_document_is_invisible_until_committed() {
        let mut wire = TextWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("pending").unwrap();
        wire.write_value(&Value::Null).unwrap();
        wire.rollback_document();
        wire.bytes.set_read_position(0);
        assert!(!wire.has_next_document().unwrap());
    }

    #[test]
    fn bare_document_value_round_trips_with_no_event_key() {
        let mut wire = TextWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_document_value(&Value::Int(Integer::new(17))).unwrap();
        wire.commit_document().unwrap();

        wire.bytes.set_read_position(0);
        wire.begin_reading_document().unwrap();
        assert_eq!(wire.read_document_value().unwrap(), Value::Int(Integer::new(17)));
        assert!(wire.at_document_end());
    }

    #[test]
    fn comments_are_stripped_on_parse() {
        let mut wire = TextWire::new();
        wire.bytes = BytesMut::from_vec(
            b"--- !!data\nx: 1 # a trailing comment\n...\n".to_vec(),
        );
        wire.begin_reading_document().unwrap();
        assert_eq!(wire.read_event_key().unwrap(), Some(Key::Name("x".into())));
        assert_eq!(wire.read_value().unwrap(), Value::Int(Integer::new(1)));
    }
}
