//! Incremental decoding of streamed JSON records.
//!
//! Backends deliver records in arbitrary byte slices: one record may span
//! several deliveries and one delivery may carry several records. The decoder
//! keeps the unconsumed tail between calls, so the sequence of decoded
//! records does not depend on where the transport split the bytes.
//!
//! Records that are malformed, or well-formed JSON that does not match the
//! expected record type, are dropped and counted rather than treated as
//! fatal.

use std::marker::PhantomData;

use memchr::memchr;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// JSON records back to back, normally newline separated.
    Ndjson,
    /// Server-sent events carrying JSON in `data:` lines, ended by `[DONE]`.
    Sse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Record(T),
    /// End-of-stream sentinel (SSE `[DONE]`).
    Done,
}

pub struct ChunkDecoder<T> {
    framing: Framing,
    buffer: Vec<u8>,
    dropped: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> ChunkDecoder<T> {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
            dropped: 0,
            _record: PhantomData,
        }
    }

    pub fn ndjson() -> Self {
        Self::new(Framing::Ndjson)
    }

    pub fn sse() -> Self {
        Self::new(Framing::Sse)
    }

    /// Number of records discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Bytes held back waiting for the rest of a record.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a delivery and return every record it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame<T>> {
        self.buffer.extend_from_slice(bytes);
        self.drain(false)
    }

    /// Flush at end of stream. A trailing record that never completed is
    /// dropped.
    pub fn finish(&mut self) -> Vec<Frame<T>> {
        let frames = self.drain(true);
        self.buffer.clear();
        frames
    }

    fn drain(&mut self, at_end: bool) -> Vec<Frame<T>> {
        let mut frames = Vec::new();
        let consumed = match self.framing {
            Framing::Ndjson => self.drain_ndjson(at_end, &mut frames),
            Framing::Sse => self.drain_sse(at_end, &mut frames),
        };
        self.buffer.drain(..consumed);
        frames
    }

    fn drain_ndjson(&mut self, at_end: bool, frames: &mut Vec<Frame<T>>) -> usize {
        let len = self.buffer.len();
        let mut consumed = 0;

        loop {
            let rest = &self.buffer[consumed..];
            let Some(start) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
                return len;
            };
            let rest = &rest[start..];
            let self_delimited = matches!(rest[0], b'{' | b'[');

            let mut values = serde_json::Deserializer::from_slice(rest).into_iter::<Value>();
            match values.next() {
                Some(Ok(value)) => {
                    let end = values.byte_offset();
                    // A scalar touching the end of the buffer may still grow
                    // (`12` then `3`, or `true` then `x`).
                    if !self_delimited && end == rest.len() && !at_end {
                        return consumed + start;
                    }
                    match serde_json::from_value::<T>(value) {
                        Ok(record) => frames.push(Frame::Record(record)),
                        Err(err) => {
                            self.dropped += 1;
                            debug!(error = %err, "Dropping stream record with unexpected shape");
                        }
                    }
                    consumed += start + end;
                }
                Some(Err(err)) if err.is_eof() => {
                    if at_end {
                        self.dropped += 1;
                        debug!(bytes = rest.len(), "Dropping truncated trailing stream record");
                        return len;
                    }
                    return consumed + start;
                }
                Some(Err(err)) => match memchr(b'\n', rest) {
                    Some(newline) => {
                        self.dropped += 1;
                        debug!(error = %err, "Dropping malformed stream record");
                        consumed += start + newline + 1;
                    }
                    None if at_end => {
                        self.dropped += 1;
                        debug!(error = %err, "Dropping malformed trailing stream record");
                        return len;
                    }
                    None => return consumed + start,
                },
                None => return len,
            }
        }
    }

    fn drain_sse(&mut self, at_end: bool, frames: &mut Vec<Frame<T>>) -> usize {
        let len = self.buffer.len();
        let mut consumed = 0;

        while let Some(newline) = memchr(b'\n', &self.buffer[consumed..]) {
            let line = &self.buffer[consumed..consumed + newline];
            decode_sse_line(line, &mut self.dropped, frames);
            consumed += newline + 1;
        }

        if at_end && consumed < len {
            let line = &self.buffer[consumed..];
            decode_sse_line(line, &mut self.dropped, frames);
            consumed = len;
        }

        consumed
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn decode_sse_line<T: DeserializeOwned>(
    line: &[u8],
    dropped: &mut usize,
    frames: &mut Vec<Frame<T>>,
) {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim(),
        Err(err) => {
            *dropped += 1;
            debug!(error = %err, "Dropping stream line with invalid UTF-8");
            return;
        }
    };

    let Some(payload) = extract_data_payload(line) else {
        return;
    };

    if payload == "[DONE]" {
        frames.push(Frame::Done);
        return;
    }
    if payload.is_empty() {
        return;
    }

    match serde_json::from_str::<T>(payload) {
        Ok(record) => frames.push(Frame::Record(record)),
        Err(err) => {
            *dropped += 1;
            debug!(error = %err, "Dropping malformed stream event");
        }
    }
}
