//! Self-delimiting document framing shared by every dialect.
//!
//! A document is a length-prefixed unit written in one of two flavours —
//! `data` (a value a consumer should read) or `meta` (padding, comments,
//! or protocol bookkeeping a consumer may skip) — plus a ready/not-ready
//! bit. A not-ready document reserves space for a header now and has its
//! ready bit flipped once the writer actually has content for it,
//! matching a producer that must claim a slot in a shared log before it
//! knows what it will write there.
//!
//! [`DocumentWriter`] is the RAII guard around this: dropping it without
//! calling [`DocumentWriter::commit`] rolls the write cursor back to where
//! the document began, so a write aborted partway through (by an error or
//! an early return) never leaves a half-written document on the wire.

use crate::bytes::Bytes;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentHeader {
    pub meta: bool,
    pub ready: bool,
    pub body_len: u64,
}

/// A physical framing scheme: binary length-prefix, text marker lines, or
/// newline-delimited JSON with no framing glyphs at all.
pub trait Framer {
    /// Writes a placeholder header and returns its byte offset.
    fn begin<B: Bytes>(&mut self, bytes: &mut B, meta: bool) -> Result<u64>;

    /// Patches the header at `header_pos` in place, now that the body
    /// (everything written between `header_pos` and the buffer's current
    /// write position) is known. Does not move the write cursor.
    fn commit<B: BytesPatch>(
        &mut self,
        bytes: &mut B,
        header_pos: u64,
        meta: bool,
        ready: bool,
    ) -> Result<()>;

    /// Flips a previously not-ready header to ready, in place, without
    /// touching the body.
    fn set_ready<B: BytesPatch>(&mut self, bytes: &mut B, header_pos: u64, meta: bool) -> Result<()>;

    /// Discards everything written since `header_pos`, truncating the
    /// buffer back to it.
    fn rollback<B: Bytes>(&mut self, bytes: &mut B, header_pos: u64) {
        bytes.truncate(header_pos);
    }

    /// Reads the next document's header, leaving the read cursor at the
    /// start of its body. Returns `None` at a clean end of input.
    fn read_header<B: Bytes>(&mut self, bytes: &mut B) -> Result<Option<DocumentHeader>>;
}

/// `write_at` is the one extra primitive document framing needs beyond
/// plain sequential `Bytes::write_all`: patching a header after the body
/// that follows it has already been written.
pub trait BytesPatch: Bytes {
    fn write_at(&mut self, pos: u64, data: &[u8]) -> Result<()>;
}

impl BytesPatch for crate::bytes::BytesMut {
    fn write_at(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        let write_pos = self.write_position();
        if pos + data.len() as u64 > write_pos {
            return Err(Error::protocol_violation(
                "cannot patch past the current write position",
            ));
        }
        // set_write_position never discards bytes past it, so moving the
        // cursor back to patch in place and then restoring it leaves the
        // body untouched.
        let saved = write_pos;
        self.set_write_position(pos);
        self.write_all(data)?;
        self.set_write_position(saved);
        Ok(())
    }
}

/// 4-byte binary header: bit 31 marks `meta`, bit 30 marks `not-ready`,
/// the low 30 bits carry the body length.
#[derive(Default)]
pub struct BinaryFramer;

const META_BIT: u32 = 1 << 31;
const NOT_READY_BIT: u32 = 1 << 30;
const LEN_MASK: u32 = NOT_READY_BIT - 1;

fn encode_header(body_len: u32, meta: bool, ready: bool) -> u32 {
    let mut header = body_len & LEN_MASK;
    if meta {
        header |= META_BIT;
    }
    if !ready {
        header |= NOT_READY_BIT;
    }
    header
}

fn decode_header(raw: u32) -> (bool, bool, u32) {
    (raw & META_BIT != 0, raw & NOT_READY_BIT == 0, raw & LEN_MASK)
}

impl Framer for BinaryFramer {
    fn begin<B: Bytes>(&mut self, bytes: &mut B, meta: bool) -> Result<u64> {
        let pos = bytes.write_position();
        let header = encode_header(0, meta, false);
        bytes.write_all(&header.to_be_bytes())?;
        Ok(pos)
    }

    fn commit<B: BytesPatch>(
        &mut self,
        bytes: &mut B,
        header_pos: u64,
        meta: bool,
        ready: bool,
    ) -> Result<()> {
        let body_len = bytes.write_position() - header_pos - 4;
        if body_len > LEN_MASK as u64 {
            return Err(Error::protocol_violation("document body too large to frame"));
        }
        let header = encode_header(body_len as u32, meta, ready);
        bytes.write_at(header_pos, &header.to_be_bytes())
    }

    fn set_ready<B: BytesPatch>(&mut self, bytes: &mut B, header_pos: u64, meta: bool) -> Result<()> {
        let mut raw = [0u8; 4];
        let saved_read = bytes.read_position();
        bytes.set_read_position(header_pos);
        bytes.read_exact(&mut raw)?;
        bytes.set_read_position(saved_read);
        let (_, _, body_len) = decode_header(u32::from_be_bytes(raw));
        let header = encode_header(body_len, meta, true);
        bytes.write_at(header_pos, &header.to_be_bytes())
    }

    fn read_header<B: Bytes>(&mut self, bytes: &mut B) -> Result<Option<DocumentHeader>> {
        if bytes.peek_unsigned_byte().is_none() {
            return Ok(None);
        }
        let mut raw = [0u8; 4];
        bytes.read_exact(&mut raw)?;
        let (meta, ready, body_len) = decode_header(u32::from_be_bytes(raw));
        Ok(Some(DocumentHeader {
            meta,
            ready,
            body_len: body_len as u64,
        }))
    }
}

/// Text-dialect markers. `DATA_MARKER` is padded with trailing spaces to
/// the same byte width as `NOT_READY_MARKER` so a not-ready document can
/// have its marker line flipped to ready in place, without rewriting the
/// body that follows it.
const NOT_READY_MARKER: &str = "--- !!not-ready-data";
const DATA_MARKER: &str = "--- !!data";
const META_MARKER: &str = "--- !!meta-data";

fn padded_marker(marker: &str) -> String {
    let width = NOT_READY_MARKER.len();
    let mut s = marker.to_owned();
    while s.len() < width {
        s.push(' ');
    }
    s
}

/// `--- !!data` / `...` framing with a `# position: N, header: K` comment
/// line written ahead of each document, recording the document's byte
/// offset and its ordinal among documents this framer has written — the
/// same bookkeeping a tailing reader uses to resume from a known offset.
#[derive(Default)]
pub struct TextFramer {
    header_count: u64,
}

impl TextFramer {
    pub fn new() -> TextFramer {
        TextFramer { header_count: 0 }
    }
}

impl Framer for TextFramer {
    fn begin<B: Bytes>(&mut self, bytes: &mut B, meta: bool) -> Result<u64> {
        // The position/header comment records where to resume a tailing
        // read from; it sits between documents, not before the first one.
        if self.header_count > 0 {
            let comment = format!(
                "# position: {}, header: {}\n",
                bytes.write_position(),
                self.header_count
            );
            bytes.write_all(comment.as_bytes())?;
        }
        self.header_count += 1;

        let pos = bytes.write_position();
        let marker = if meta {
            padded_marker(META_MARKER)
        } else {
            padded_marker(DATA_MARKER)
        };
        bytes.write_all(marker.as_bytes())?;
        bytes.write_all(b"\n")?;
        Ok(pos)
    }

    fn commit<B: BytesPatch>(
        &mut self,
        bytes: &mut B,
        header_pos: u64,
        meta: bool,
        ready: bool,
    ) -> Result<()> {
        bytes.write_all(b"...\n")?;
        rewrite_marker_line::<B>(bytes, header_pos, meta, ready)
    }

    fn set_ready<B: BytesPatch>(&mut self, bytes: &mut B, header_pos: u64, meta: bool) -> Result<()> {
        rewrite_marker_line::<B>(bytes, header_pos, meta, true)
    }

    fn read_header<B: Bytes>(&mut self, bytes: &mut B) -> Result<Option<DocumentHeader>> {
        loop {
            if bytes.peek_unsigned_byte().is_none() {
                return Ok(None);
            }
            let line = read_line(bytes)?;
            let trimmed = line.trim_end();
            if trimmed.starts_with('#') || trimmed.is_empty() {
                continue;
            }
            let meta = trimmed.starts_with(META_MARKER.trim_end());
            let ready = !trimmed.starts_with(NOT_READY_MARKER);
            if !meta && !trimmed.starts_with(DATA_MARKER) && !trimmed.starts_with(NOT_READY_MARKER)
            {
                return Err(Error::protocol_violation(format!(
                    "expected a document marker, found {:?}",
                    trimmed
                )));
            }
            let mut body_len = 0u64;
            loop {
                if bytes.peek_unsigned_byte().is_none() {
                    break;
                }
                let saved = bytes.read_position();
                let next_line = read_line(bytes)?;
                if next_line.trim_end() == "..." {
                    break;
                }
                body_len += (bytes.read_position() - saved) as u64;
            }
            return Ok(Some(DocumentHeader {
                meta,
                ready,
                body_len,
            }));
        }
    }
}

fn rewrite_marker_line<B: BytesPatch>(
    bytes: &mut B,
    header_pos: u64,
    meta: bool,
    ready: bool,
) -> Result<()> {
    let marker = match (meta, ready) {
        (true, _) => padded_marker(META_MARKER),
        (false, true) => padded_marker(DATA_MARKER),
        (false, false) => NOT_READY_MARKER.to_owned(),
    };
    bytes.write_at(header_pos, marker.as_bytes())
}

fn read_line<B: Bytes>(bytes: &mut B) -> Result<String> {
    let mut line = Vec::new();
    loop {
        match bytes.read_u8() {
            Ok(b'\n') => break,
            Ok(b) => line.push(b),
            Err(_) => break,
        }
    }
    String::from_utf8(line).map_err(|_| Error::new(crate::error::ErrorKind::InvalidUtf8))
}

/// Newline-delimited JSON: each document is exactly one line, with no
/// framing glyphs. `meta` documents are JSON objects tagged
/// `{"@meta":true, ...}` at the outer level so a reader can still tell
/// them apart from data documents without a distinct wire marker.
#[derive(Default)]
pub struct JsonFramer;

impl Framer for JsonFramer {
    fn begin<B: Bytes>(&mut self, bytes: &mut B, _meta: bool) -> Result<u64> {
        Ok(bytes.write_position())
    }

    fn commit<B: Bytes>(
        &mut self,
        bytes: &mut B,
        _header_pos: u64,
        _meta: bool,
        _ready: bool,
    ) -> Result<()> {
        bytes.write_all(b"\n")
    }

    fn set_ready<B: Bytes>(&mut self, _bytes: &mut B, _header_pos: u64, _meta: bool) -> Result<()> {
        // The JSON dialect has no not-ready representation on the wire;
        // a document is either present or it isn't written yet.
        Ok(())
    }

    fn read_header<B: Bytes>(&mut self, bytes: &mut B) -> Result<Option<DocumentHeader>> {
        if bytes.peek_unsigned_byte().is_none() {
            return Ok(None);
        }
        let start = bytes.read_position();
        loop {
            match bytes.read_u8() {
                Ok(b'\n') => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        let end = bytes.read_position();
        Ok(Some(DocumentHeader {
            meta: false,
            ready: true,
            body_len: end - start,
        }))
    }
}

/// RAII guard around one document write. Rolls the write cursor back to
/// where the document began unless `commit` or `commit_not_ready` runs.
pub struct DocumentWriter<'b, B, F> {
    bytes: &'b mut B,
    framer: F,
    header_pos: u64,
    meta: bool,
    closed: bool,
}

impl<'b, B: BytesPatch, F: Framer> DocumentWriter<'b, B, F> {
    pub fn begin(bytes: &'b mut B, mut framer: F, meta: bool) -> Result<Self> {
        let header_pos = framer.begin(bytes, meta)?;
        Ok(DocumentWriter {
            bytes,
            framer,
            header_pos,
            meta,
            closed: false,
        })
    }

    pub fn bytes_mut(&mut self) -> &mut B {
        self.bytes
    }

    pub fn header_position(&self) -> u64 {
        self.header_pos
    }

    /// Finalizes the document as ready.
    pub fn commit(mut self) -> Result<()> {
        self.framer.commit(self.bytes, self.header_pos, self.meta, true)?;
        self.closed = true;
        Ok(())
    }

    /// Finalizes the document's framing but marks it not-ready: readers
    /// skip it until a later call to `Framer::set_ready` at this same
    /// header position.
    pub fn commit_not_ready(mut self) -> Result<u64> {
        self.framer
            .commit(self.bytes, self.header_pos, self.meta, false)?;
        self.closed = true;
        Ok(self.header_pos)
    }

    /// Discards everything written since this document began.
    pub fn rollback(mut self) {
        self.framer.rollback(self.bytes, self.header_pos);
        self.closed = true;
    }
}

impl<'b, B: BytesPatch, F: Framer> Drop for DocumentWriter<'b, B, F> {
    fn drop(&mut self) {
        if !self.closed {
            self.framer.rollback(self.bytes, self.header_pos);
        }
    }
}
