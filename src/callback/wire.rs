//! Event stream wire format.
//!
//! Records share the output stream with plain display text, so each record is
//! hidden inside terminal escape sequences that a terminal renders as nothing:
//!
//! ```text
//! ESC[K <b64 chunk> ESC[<len>D <b64 chunk> ESC[<len>D ... ESC[K    begin record
//! ESC[K ESC[K                                                      end of event
//! ```
//!
//! The payload is the record's JSON, base64 encoded (standard alphabet,
//! padded) and split into chunks of at most `chunk_width` bytes. Every chunk
//! is followed by a cursor-back sequence carrying its exact length, which the
//! reader checks instead of scanning for a delimiter.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde_json::Value as JsonValue;
use tracing::trace;

use super::config::{EventsConfig, DEFAULT_CHUNK_WIDTH};
use super::record::EventRecord;
use super::types::Attributes;
use crate::error::{Error, Result};

const ESC: u8 = 0x1b;

/// Erase-line sequence opening and closing every frame.
pub const FRAME_MARKER: &[u8] = b"\x1b[K";

/// The zero-length frame written by `dump_end`.
pub const END_FRAME: &[u8] = b"\x1b[K\x1b[K";

/// Encode `payload` as a begin frame.
pub fn encode_frame(payload: &[u8], chunk_width: usize) -> Vec<u8> {
    let width = chunk_width.max(1);
    let encoded = STANDARD.encode(payload);
    let mut frame = Vec::with_capacity(encoded.len() + encoded.len() / width * 6 + 16);
    frame.extend_from_slice(FRAME_MARKER);
    for chunk in encoded.as_bytes().chunks(width) {
        frame.extend_from_slice(chunk);
        frame.extend_from_slice(format!("\x1b[{}D", chunk.len()).as_bytes());
    }
    frame.extend_from_slice(FRAME_MARKER);
    frame
}

// ============================================================================
// Writer
// ============================================================================

/// The shared output stream behind an [`EventWriter`].
pub type Stream = RefCell<Box<dyn Write + Send>>;

/// Exclusive hold on the output stream, taken for a whole event scope.
///
/// The lock is reentrant: frames and display output written by the holding
/// thread, including nested scopes, go through without blocking.
pub type StreamGuard<'a> = ReentrantMutexGuard<'a, Stream>;

/// Framing writer over the shared output stream.
///
/// Every write takes the stream lock for the whole frame, so frames from
/// concurrent hosts never interleave byte-wise. An event scope holds the
/// lock through [`EventWriter::lock`] from its begin frame to its end frame,
/// keeping another host's events out of the middle. Writes block when the
/// consumer is slow; nothing is buffered beyond the underlying writer.
pub struct EventWriter {
    inner: ReentrantMutex<Stream>,
    chunk_width: usize,
}

impl std::fmt::Debug for EventWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("chunk_width", &self.chunk_width)
            .finish_non_exhaustive()
    }
}

impl EventWriter {
    /// Wrap an arbitrary writer.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Box::new(writer))),
            chunk_width: DEFAULT_CHUNK_WIDTH,
        }
    }

    /// Write to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write to standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Write to a newly created file.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "cannot create event output '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }

    /// Open the destination named by the configuration.
    pub fn from_config(config: &EventsConfig) -> Result<Self> {
        let writer = match config.output.as_str() {
            "stdout" | "-" => Self::stdout(),
            "stderr" => Self::stderr(),
            path => Self::file(path)?,
        };
        Ok(writer.with_chunk_width(config.chunk_width))
    }

    /// Set the base64 chunk width.
    pub fn with_chunk_width(mut self, chunk_width: usize) -> Self {
        self.chunk_width = chunk_width.max(1);
        self
    }

    /// Configured base64 chunk width.
    pub fn chunk_width(&self) -> usize {
        self.chunk_width
    }

    /// Write a begin frame for `record`.
    pub fn write_record(&self, record: &EventRecord) -> Result<()> {
        let payload = record.to_json_bytes()?;
        let frame = encode_frame(&payload, self.chunk_width);
        trace!(event = record.event(), bytes = frame.len(), "write begin frame");
        self.write_raw(&frame)
    }

    /// Write the end-of-event frame.
    pub fn write_end(&self) -> Result<()> {
        self.write_raw(END_FRAME)
    }

    /// Take the stream lock until the guard is dropped.
    pub fn lock(&self) -> StreamGuard<'_> {
        self.inner.lock()
    }

    /// Write bytes as-is and flush.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.write_all(bytes)?;
        inner.flush()?;
        Ok(())
    }

    /// Run display code against the locked stream.
    ///
    /// `f` must not write through this writer again.
    pub fn display<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        f(&mut **inner)?;
        inner.flush()?;
        Ok(())
    }
}

// ============================================================================
// Reader
// ============================================================================

/// One decoded element of an event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A begin record
    Event(Attributes),
    /// The end of the preceding event's output
    EventEnd,
    /// Plain display text between frames
    Output(String),
}

enum Escape {
    Incomplete,
    EraseLine,
    /// Cursor-back with its count and the sequence length
    CursorBack(usize, usize),
    Other,
}

enum Parsed {
    Item(StreamItem, usize),
    Incomplete,
    NotFrame,
}

/// Incremental decoder for a captured event stream.
///
/// Bytes can be fed in arbitrary pieces; a frame split across reads is held
/// back until it is complete. An erase-line sequence that does not start a
/// well-formed frame is passed through as plain output.
#[derive(Debug, Default)]
pub struct EventStreamReader {
    buf: Vec<u8>,
    consumed: usize,
    pending: Vec<StreamItem>,
}

impl EventStreamReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes and return every item they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamItem>> {
        self.buf.extend_from_slice(bytes);
        let mut items = std::mem::take(&mut self.pending);

        loop {
            let Some(pos) = find(&self.buf, FRAME_MARKER) else {
                let keep = partial_marker_len(&self.buf);
                let text_len = self.buf.len() - keep;
                let text_len = text_len - incomplete_utf8_tail(&self.buf[..text_len]);
                self.emit_output(text_len, &mut items);
                break;
            };
            self.emit_output(pos, &mut items);

            match parse_frame(&self.buf, self.consumed) {
                Ok(Parsed::Item(item, len)) => {
                    self.drain(len);
                    items.push(item);
                }
                Ok(Parsed::Incomplete) => break,
                Ok(Parsed::NotFrame) => self.emit_output(FRAME_MARKER.len(), &mut items),
                Err(e) => {
                    // Skip the opener so the next feed resynchronizes.
                    self.drain(FRAME_MARKER.len());
                    self.pending = items;
                    return Err(e);
                }
            }
        }

        Ok(items)
    }

    /// Flush what is left at end of stream.
    ///
    /// Trailing text is returned as output; a frame cut after its first
    /// length marker is an error.
    pub fn finish(&mut self) -> Result<Vec<StreamItem>> {
        let mut items = std::mem::take(&mut self.pending);
        let inside_frame = self.buf.starts_with(FRAME_MARKER)
            && find(&self.buf[FRAME_MARKER.len()..], b"\x1b[").is_some();
        if inside_frame {
            let offset = self.consumed;
            self.buf.clear();
            return Err(Error::framing(offset, "stream ended inside a frame"));
        }
        let len = self.buf.len();
        self.emit_output(len, &mut items);
        Ok(items)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.consumed
    }

    fn emit_output(&mut self, len: usize, items: &mut Vec<StreamItem>) {
        if len == 0 {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf[..len]).into_owned();
        self.drain(len);
        match items.last_mut() {
            Some(StreamItem::Output(prev)) => prev.push_str(&text),
            _ => items.push(StreamItem::Output(text)),
        }
    }

    fn drain(&mut self, len: usize) {
        self.buf.drain(..len);
        self.consumed += len;
    }
}

/// Decode a complete captured stream.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<StreamItem>> {
    let mut reader = EventStreamReader::new();
    let mut items = reader.feed(bytes)?;
    items.extend(reader.finish()?);
    Ok(items)
}

fn parse_frame(buf: &[u8], offset: usize) -> Result<Parsed> {
    let mut i = FRAME_MARKER.len();
    let mut encoded: Vec<u8> = Vec::new();

    loop {
        let start = i;
        while i < buf.len() && is_base64(buf[i]) {
            i += 1;
        }
        if i == buf.len() {
            return Ok(Parsed::Incomplete);
        }
        if buf[i] != ESC {
            return Ok(Parsed::NotFrame);
        }
        let chunk = &buf[start..i];

        match parse_escape(&buf[i..]) {
            Escape::Incomplete => return Ok(Parsed::Incomplete),
            Escape::Other => return Ok(Parsed::NotFrame),
            Escape::EraseLine if chunk.is_empty() => {
                let end = i + FRAME_MARKER.len();
                if encoded.is_empty() {
                    return Ok(Parsed::Item(StreamItem::EventEnd, end));
                }
                let attrs = decode_payload(&encoded, offset)?;
                return Ok(Parsed::Item(StreamItem::Event(attrs), end));
            }
            Escape::EraseLine => return Ok(Parsed::NotFrame),
            Escape::CursorBack(_, _) if chunk.is_empty() => return Ok(Parsed::NotFrame),
            Escape::CursorBack(count, len) => {
                if count != chunk.len() {
                    return Err(Error::framing(
                        offset + start,
                        format!("chunk length {} does not match marker {}", chunk.len(), count),
                    ));
                }
                encoded.extend_from_slice(chunk);
                i += len;
            }
        }
    }
}

fn parse_escape(b: &[u8]) -> Escape {
    if b.len() < 2 {
        return Escape::Incomplete;
    }
    if b[1] != b'[' {
        return Escape::Other;
    }
    let mut j = 2;
    while j < b.len() && b[j].is_ascii_digit() {
        j += 1;
        if j - 2 > 10 {
            return Escape::Other;
        }
    }
    if j == b.len() {
        return Escape::Incomplete;
    }
    match b[j] {
        b'K' if j == 2 => Escape::EraseLine,
        b'D' if j > 2 => std::str::from_utf8(&b[2..j])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .map_or(Escape::Other, |count| Escape::CursorBack(count, j + 1)),
        _ => Escape::Other,
    }
}

fn decode_payload(encoded: &[u8], offset: usize) -> Result<Attributes> {
    let json = STANDARD.decode(encoded)?;
    match serde_json::from_slice::<JsonValue>(&json)? {
        JsonValue::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(Error::framing(offset, "event payload is not a JSON object")),
    }
}

fn is_base64(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Bytes of a multi-byte character cut off at the end of `bytes`.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        let needed = match bytes[i] {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        let have = bytes.len() - i;
        return if have < needed { have } else { 0 };
    }
    0
}

/// Length of a trailing prefix of the frame marker (an opener cut by a read).
fn partial_marker_len(buf: &[u8]) -> usize {
    (1..FRAME_MARKER.len())
        .rev()
        .find(|&n| buf.len() >= n && buf.ends_with(&FRAME_MARKER[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::test_support::SharedBuffer;
    use serde_json::json;

    fn frame_for(value: serde_json::Value, width: usize) -> Vec<u8> {
        encode_frame(&serde_json::to_vec(&value).unwrap(), width)
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(b"{}", 78);
        // "{}" encodes to "e30=".
        assert_eq!(frame, b"\x1b[Ke30=\x1b[4D\x1b[K".to_vec());
    }

    #[test]
    fn test_chunks_respect_width() {
        let frame = frame_for(json!({"event": "verbose", "stdout": "x".repeat(200)}), 10);
        let text = String::from_utf8(frame).unwrap();
        assert!(text.contains("\x1b[10D"));
        assert!(!text.contains("\x1b[11D"));
    }

    #[test]
    fn test_decode_event_end_and_output() {
        let mut stream = b"PLAY [site]\n".to_vec();
        stream.extend(frame_for(json!({"event": "playbook_on_play_start"}), 8));
        stream.extend_from_slice(b"ok: [web1]\n");
        stream.extend_from_slice(END_FRAME);

        let items = decode_stream(&stream).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], StreamItem::Output("PLAY [site]\n".into()));
        match &items[1] {
            StreamItem::Event(attrs) => assert_eq!(attrs["event"], json!("playbook_on_play_start")),
            other => panic!("expected event, got {:?}", other),
        }
        assert_eq!(items[2], StreamItem::Output("ok: [web1]\n".into()));
        assert_eq!(items[3], StreamItem::EventEnd);
    }

    #[test]
    fn test_split_feeds() {
        let mut stream = frame_for(json!({"event": "runner_on_ok", "host": "web1"}), 6);
        stream.extend_from_slice(END_FRAME);

        let mut reader = EventStreamReader::new();
        let mut items = Vec::new();
        for byte in &stream {
            items.extend(reader.feed(std::slice::from_ref(byte)).unwrap());
        }
        items.extend(reader.finish().unwrap());

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], StreamItem::Event(a) if a["host"] == json!("web1")));
        assert_eq!(items[1], StreamItem::EventEnd);
    }

    #[test]
    fn test_length_mismatch_is_framing_error() {
        let stream = b"\x1b[Ke30=\x1b[5D\x1b[K";
        let err = decode_stream(stream).unwrap_err();
        assert!(matches!(err, Error::Framing { offset: 3, .. }));
    }

    #[test]
    fn test_stray_erase_line_is_output() {
        let stream = b"progress\x1b[K done\n";
        let items = decode_stream(stream).unwrap();
        assert_eq!(items, vec![StreamItem::Output("progress\x1b[K done\n".into())]);
    }

    #[test]
    fn test_split_character_is_held_back() {
        let text = "ok: [wéb1]\n".as_bytes();
        let mut reader = EventStreamReader::new();
        let mut items = reader.feed(&text[..7]).unwrap();
        assert_eq!(items, vec![StreamItem::Output("ok: [w".into())]);
        items.extend(reader.feed(&text[7..]).unwrap());
        assert_eq!(items[1], StreamItem::Output("éb1]\n".into()));
    }

    #[test]
    fn test_truncated_frame_fails_on_finish() {
        let frame = frame_for(json!({"event": "verbose"}), 78);
        let mut reader = EventStreamReader::new();
        assert!(reader.feed(&frame[..frame.len() - 2]).unwrap().is_empty());
        assert!(reader.finish().is_err());
    }

    #[test]
    fn test_writer_frames_and_display() {
        let sink = SharedBuffer::new();
        let writer = EventWriter::new(sink.clone()).with_chunk_width(4);
        let record = EventRecord::begin(
            [("event".to_string(), json!("verbose"))].into_iter().collect(),
            1,
            &Default::default(),
        );
        writer.write_record(&record).unwrap();
        writer.display(|out| writeln!(out, "hello")).unwrap();
        writer.write_end().unwrap();

        let bytes = sink.bytes();
        let items = decode_stream(&bytes).unwrap();
        assert!(matches!(&items[0], StreamItem::Event(a) if a["event"] == json!("verbose")));
        assert_eq!(items[1], StreamItem::Output("hello\n".into()));
        assert_eq!(items[2], StreamItem::EventEnd);
    }
}
